//! Watch command: keep a printer connected until interrupted.

use anyhow::Result;
use posprint_core::{PrinterEvent, SupervisorState};
use tokio::sync::broadcast::error::RecvError;

use crate::cli::OutputFormat;
use crate::util::Session;

pub async fn cmd_watch(session: &mut Session, format: OutputFormat) -> Result<()> {
    let mut events = session.supervisor.subscribe();
    session.supervisor.start();
    session.note("Watching printer connection (Ctrl-C to stop)...");

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                eprintln!("\nShutting down...");
                break;
            }
            event = events.recv() => match event {
                Ok(event) => {
                    if matches!(event, PrinterEvent::Connected { .. })
                        && let Err(e) = session.remember_connected()
                    {
                        tracing::warn!("Could not save last printer: {:#}", e);
                    }
                    let line = match format {
                        OutputFormat::Text => format_event(&event),
                        OutputFormat::Json => serde_json::to_string(&event)?,
                    };
                    println!("{}", line);
                    if let PrinterEvent::StateChanged { to: SupervisorState::Unsupported, .. } = event {
                        break;
                    }
                }
                Err(RecvError::Lagged(n)) => {
                    tracing::warn!("Dropped {} printer events", n);
                }
                Err(RecvError::Closed) => break,
            },
        }
    }

    session.supervisor.shutdown().await;
    session.supervisor.disconnect().await;
    Ok(())
}

fn format_event(event: &PrinterEvent) -> String {
    match event {
        PrinterEvent::Connected { printer, method } => format!(
            "connected     {} ({:?})",
            printer.name.as_deref().unwrap_or(&printer.id),
            method
        ),
        PrinterEvent::Disconnected { printer, reason } => format!(
            "disconnected  {} ({:?})",
            printer.name.as_deref().unwrap_or(&printer.id),
            reason
        ),
        PrinterEvent::ConnectFailed { message, .. } => format!("connect failed: {}", message),
        PrinterEvent::AutoConnectAttempt {
            attempt,
            max_retries,
        } => format!("auto-connect  retry {}/{}", attempt, max_retries),
        PrinterEvent::RetriesExhausted { attempts } => format!(
            "gave up after {} retries; run `posprint connect` to pick a printer",
            attempts
        ),
        PrinterEvent::StateChanged { from, to } => format!("state         {:?} -> {:?}", from, to),
        other => format!("{:?}", other),
    }
}
