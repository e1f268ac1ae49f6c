//! Print and preview commands.

use std::path::Path;

use anyhow::{Context, Result};
use posprint_core::{DocumentEncoder, PrintReport};
use posprint_types::{
    Invoice, InvoiceLine, KotItem, KotTicket, Money, Outlet, PrintableDocument, TestPage,
};

use crate::cli::DocumentKind;
use crate::util::{Session, hex_dump, read_document};

pub async fn cmd_print(session: &mut Session, document: PrintableDocument) -> Result<()> {
    let label = document.label();
    let report = session
        .supervisor
        .print(&document)
        .await
        .with_context(|| format!("Failed to print {}", label))?;
    finish(session, &report).await
}

pub async fn cmd_print_test(session: &mut Session) -> Result<()> {
    let report = session
        .supervisor
        .print_test()
        .await
        .context("Failed to print test page")?;
    finish(session, &report).await
}

async fn finish(session: &mut Session, report: &PrintReport) -> Result<()> {
    session.note(format_report(report));
    session.remember_connected()?;
    session.supervisor.disconnect().await;
    Ok(())
}

/// Load a document file of the given kind.
pub fn load_document(
    path: &Path,
    kind: DocumentKind,
    compute_totals: bool,
) -> Result<PrintableDocument> {
    Ok(match kind {
        DocumentKind::Kot => PrintableDocument::Kot(read_document::<KotTicket>(path)?),
        DocumentKind::Invoice => {
            let invoice: Invoice = read_document(path)?;
            if compute_totals {
                invoice.with_computed_totals()?.into()
            } else {
                invoice.into()
            }
        }
        DocumentKind::Test => PrintableDocument::TestPage(read_document::<TestPage>(path)?),
    })
}

/// Render without a printer. With no file, renders a built-in sample.
pub fn cmd_preview(
    encoder: &DocumentEncoder,
    file: Option<&Path>,
    kind: DocumentKind,
    hex: bool,
) -> Result<()> {
    let document = match file {
        Some(path) => load_document(path, kind, false)?,
        None => sample(kind)?,
    };
    let payload = encoder.encode(&document);
    if hex {
        println!("{}", hex_dump(payload.as_bytes()));
    } else {
        let width = encoder.columns();
        println!("+{}+", "-".repeat(width));
        for line in payload.preview_text().lines() {
            println!("|{:<width$}|", line, width = width);
        }
        println!("+{}+", "-".repeat(width));
        eprintln!("{} bytes", payload.len());
    }
    Ok(())
}

fn sample(kind: DocumentKind) -> Result<PrintableDocument> {
    let outlet = Outlet::new("Sample Kitchen")
        .address("1 Example Street")
        .phone("555-0100");
    Ok(match kind {
        DocumentKind::Kot => KotTicket::new(outlet, "K-1")
            .table("4")
            .item(KotItem::new("Paneer Butter Masala", 1).notes("less spicy"))
            .item(KotItem::new("Garlic Naan", 3))
            .into(),
        DocumentKind::Invoice => Invoice::new(outlet, "INV-1")
            .table("4")
            .line(InvoiceLine::new("Paneer Butter Masala", 1, Money::from_major(280)))
            .line(InvoiceLine::new("Garlic Naan", 3, Money::from_major(60)))
            .payment_method("Cash")
            .with_computed_totals()?
            .into(),
        DocumentKind::Test => TestPage::default().into(),
    })
}

fn format_report(report: &PrintReport) -> String {
    format!(
        "Printed {} ({} bytes in {} writes)",
        report.document, report.bytes, report.chunks
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn test_samples_render() {
        let encoder = DocumentEncoder::default();
        for kind in [DocumentKind::Kot, DocumentKind::Invoice, DocumentKind::Test] {
            let payload = encoder.encode(&sample(kind).unwrap());
            assert!(payload.ends_with_cut());
        }
    }

    #[test]
    fn test_load_invoice_with_computed_totals() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("invoice.json");
        fs::write(
            &path,
            r#"{
                "outlet": {"name": "Spice Route"},
                "invoice_number": "INV-9",
                "lines": [{"name": "Naan", "quantity": 2, "unit_price": 40.0, "line_total": 80.0}],
                "subtotal": 0.0,
                "total": 0.0
            }"#,
        )
        .unwrap();

        let raw = load_document(&path, DocumentKind::Invoice, false).unwrap();
        let computed = load_document(&path, DocumentKind::Invoice, true).unwrap();
        match (raw, computed) {
            (PrintableDocument::Invoice(raw), PrintableDocument::Invoice(computed)) => {
                assert_eq!(raw.total.minor(), 0);
                assert_eq!(computed.total.minor(), 8_000);
            }
            other => panic!("unexpected documents: {:?}", other),
        }
    }

    #[test]
    fn test_load_invoice_total_overflow_fails() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("invoice.json");
        let line = r#"{"name": "Gold", "quantity": 1, "unit_price": 4e16, "line_total": 4e16}"#;
        fs::write(
            &path,
            format!(
                r#"{{"outlet": {{"name": "Spice Route"}}, "invoice_number": "INV-10",
                    "lines": [{line}, {line}, {line}], "subtotal": 0.0, "total": 0.0}}"#
            ),
        )
        .unwrap();

        assert!(load_document(&path, DocumentKind::Invoice, false).is_ok());
        let err = load_document(&path, DocumentKind::Invoice, true).unwrap_err();
        assert!(err.to_string().contains("overflow"), "{:#}", err);
    }

    #[test]
    fn test_format_report() {
        let report = PrintReport {
            document: "KOT K-1".to_string(),
            bytes: 240,
            chunks: 12,
        };
        assert_eq!(format_report(&report), "Printed KOT K-1 (240 bytes in 12 writes)");
    }
}
