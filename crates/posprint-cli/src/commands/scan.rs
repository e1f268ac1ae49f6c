//! Scan command implementation.

use anyhow::{Context, Result, bail};
use posprint_core::DeviceCandidate;
use serde_json::json;

use crate::cli::OutputFormat;
use crate::util::Session;

pub async fn cmd_scan(session: &Session, format: OutputFormat) -> Result<()> {
    if !session.backend.is_supported() {
        bail!("Bluetooth is not available on this system");
    }
    session.note("Scanning for printers...");

    let services: Vec<_> = session
        .supervisor
        .manager()
        .config()
        .profiles
        .iter()
        .map(|p| p.service)
        .collect();
    let mut printers = session
        .backend
        .scan(&services)
        .await
        .context("Failed to scan for printers")?;
    printers.sort_by_key(|p| std::cmp::Reverse(p.rssi.unwrap_or(i16::MIN)));

    let content = match format {
        OutputFormat::Text => format_scan_text(&printers, session.config.last_printer.as_deref()),
        OutputFormat::Json => format_scan_json(&printers)?,
    };
    println!("{}", content);
    Ok(())
}

fn format_scan_text(printers: &[DeviceCandidate], last: Option<&str>) -> String {
    if printers.is_empty() {
        return "No printers found. Make sure the printer is on and not paired elsewhere."
            .to_string();
    }
    let mut out = format!("Found {} printer(s):\n", printers.len());
    for printer in printers {
        let rssi = printer
            .rssi
            .map(|r| format!("{} dBm", r))
            .unwrap_or_else(|| "-".to_string());
        let marker = if Some(printer.id.as_str()) == last {
            "  (last used)"
        } else {
            ""
        };
        out.push_str(&format!(
            "  {:<20} {:<38} {:>8}{}\n",
            printer.display_name(),
            printer.id,
            rssi,
            marker
        ));
    }
    out.trim_end().to_string()
}

fn format_scan_json(printers: &[DeviceCandidate]) -> Result<String> {
    let entries: Vec<_> = printers
        .iter()
        .map(|p| json!({ "id": p.id, "name": p.name, "rssi": p.rssi }))
        .collect();
    Ok(serde_json::to_string_pretty(&entries)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn printers() -> Vec<DeviceCandidate> {
        let mut a = DeviceCandidate::new("AA:BB", Some("RPP02N".into()));
        a.rssi = Some(-52);
        let b = DeviceCandidate::new("CC:DD", None);
        vec![a, b]
    }

    #[test]
    fn test_format_scan_text() {
        let text = format_scan_text(&printers(), Some("CC:DD"));
        assert!(text.starts_with("Found 2 printer(s):"));
        assert!(text.contains("RPP02N"));
        assert!(text.contains("-52 dBm"));
        let last = text.lines().find(|l| l.contains("CC:DD")).unwrap();
        assert!(last.ends_with("(last used)"));
    }

    #[test]
    fn test_format_scan_text_empty() {
        assert!(format_scan_text(&[], None).starts_with("No printers found"));
    }

    #[test]
    fn test_format_scan_json() {
        let json = format_scan_json(&printers()).unwrap();
        let parsed: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed[0]["id"], "AA:BB");
        assert_eq!(parsed[0]["rssi"], -52);
        assert!(parsed[1]["name"].is_null());
    }
}
