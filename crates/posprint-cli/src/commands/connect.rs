//! Connect and status commands.

use anyhow::{Context, Result};
use posprint_core::SupervisorStatus;

use crate::cli::OutputFormat;
use crate::util::Session;

pub async fn cmd_connect(session: &mut Session) -> Result<()> {
    let device = session
        .supervisor
        .connect()
        .await
        .context("Failed to connect to a printer")?;
    session.note(format!(
        "Connected to {} ({}), {} bytes per write",
        device.display_name(),
        device.id,
        device.max_write_len
    ));
    session.remember_connected()?;
    session.supervisor.disconnect().await;
    Ok(())
}

pub async fn cmd_status(session: &mut Session, format: OutputFormat) -> Result<()> {
    if session.supervisor.is_supported() {
        match session.supervisor.auto_discover_and_connect().await {
            Ok(true) => session.remember_connected()?,
            Ok(false) => {}
            Err(e) => tracing::debug!("Auto-connect failed: {}", e),
        }
    }

    let status = session.supervisor.status();
    let content = match format {
        OutputFormat::Text => format_status_text(&status),
        OutputFormat::Json => serde_json::to_string_pretty(&status)?,
    };
    println!("{}", content);
    session.supervisor.disconnect().await;
    Ok(())
}

fn yes_no(value: bool) -> &'static str {
    if value { "yes" } else { "no" }
}

fn format_status_text(status: &SupervisorStatus) -> String {
    let printer = status
        .printer
        .as_ref()
        .map(|p| match &p.name {
            Some(name) => format!("{} ({})", name, p.id),
            None => p.id.clone(),
        })
        .unwrap_or_else(|| "none".to_string());
    format!(
        "State:      {:?}\nBluetooth:  {}\nConnected:  {}\nPrinter:    {}\nRetries:    {}",
        status.state,
        if status.is_supported {
            "available"
        } else {
            "unavailable"
        },
        yes_no(status.is_connected),
        printer,
        status.policy.retry_count
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use posprint_core::{ConnectionPolicyState, PrinterId, SupervisorState};

    #[test]
    fn test_format_status_text() {
        let status = SupervisorStatus {
            state: SupervisorState::Connected,
            is_supported: true,
            is_connected: true,
            is_connecting: false,
            is_printing: false,
            policy: ConnectionPolicyState::default(),
            printer: Some(PrinterId::new("AA:BB", Some("RPP02N".into()))),
        };
        let text = format_status_text(&status);
        assert!(text.contains("State:      Connected"));
        assert!(text.contains("Connected:  yes"));
        assert!(text.contains("RPP02N (AA:BB)"));
    }

    #[test]
    fn test_format_status_without_printer() {
        let status = SupervisorStatus {
            state: SupervisorState::Unsupported,
            is_supported: false,
            is_connected: false,
            is_connecting: false,
            is_printing: false,
            policy: ConnectionPolicyState::default(),
            printer: None,
        };
        let text = format_status_text(&status);
        assert!(text.contains("Bluetooth:  unavailable"));
        assert!(text.contains("Printer:    none"));
    }
}
