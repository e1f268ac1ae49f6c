//! Terminal printer picker.

use std::io::{self, IsTerminal};

use async_trait::async_trait;
use dialoguer::{Select, theme::ColorfulTheme};
use posprint_core::{DeviceCandidate, DeviceChooser, StrongestSignalChooser};

/// Prompts on the terminal. Falls back to the strongest signal when stdin or
/// stderr is not a terminal.
#[derive(Debug, Default, Clone, Copy)]
pub struct TerminalChooser;

fn describe(candidate: &DeviceCandidate) -> String {
    match (candidate.name.as_deref(), candidate.rssi) {
        (Some(name), Some(rssi)) => format!("{} ({}, {} dBm)", name, candidate.id, rssi),
        (Some(name), None) => format!("{} ({})", name, candidate.id),
        (None, Some(rssi)) => format!("{} ({} dBm)", candidate.id, rssi),
        (None, None) => candidate.id.clone(),
    }
}

#[async_trait]
impl DeviceChooser for TerminalChooser {
    async fn choose(&self, candidates: &[DeviceCandidate]) -> Option<DeviceCandidate> {
        if candidates.is_empty() {
            return None;
        }
        if !io::stdin().is_terminal() || !io::stderr().is_terminal() {
            return StrongestSignalChooser.choose(candidates).await;
        }

        let items: Vec<String> = candidates.iter().map(describe).collect();
        let selection = tokio::task::spawn_blocking(move || {
            Select::with_theme(&ColorfulTheme::default())
                .with_prompt("Select a printer")
                .items(&items)
                .default(0)
                .interact_opt()
        })
        .await;

        match selection {
            Ok(Ok(Some(index))) => candidates.get(index).cloned(),
            Ok(Ok(None)) => None,
            Ok(Err(e)) => {
                tracing::warn!("Printer prompt failed: {}", e);
                None
            }
            Err(e) => {
                tracing::warn!("Printer prompt task failed: {}", e);
                None
            }
        }
    }
}
