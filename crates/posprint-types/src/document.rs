//! Printable document shapes.
//!
//! These are produced by the order/invoice store and consumed once by the
//! encoder. They carry everything the layout needs, including timestamps,
//! so encoding the same value twice yields the same bytes.

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::error::DocumentError;
use crate::money::Money;

/// Outlet identity printed in document headers.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Outlet {
    /// Trading name, printed bold at the top.
    pub name: String,
    /// Street address. Embedded newlines start new lines.
    #[cfg_attr(feature = "serde", serde(default, skip_serializing_if = "Option::is_none"))]
    pub address: Option<String>,
    /// Contact phone number.
    #[cfg_attr(feature = "serde", serde(default, skip_serializing_if = "Option::is_none"))]
    pub phone: Option<String>,
    /// Tax registration number (GSTIN, VAT number, ...).
    #[cfg_attr(feature = "serde", serde(default, skip_serializing_if = "Option::is_none"))]
    pub tax_id: Option<String>,
}

impl Outlet {
    /// Create an outlet with only a name.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    /// Set the address.
    #[must_use]
    pub fn address(mut self, address: impl Into<String>) -> Self {
        self.address = Some(address.into());
        self
    }

    /// Set the phone number.
    #[must_use]
    pub fn phone(mut self, phone: impl Into<String>) -> Self {
        self.phone = Some(phone.into());
        self
    }

    /// Set the tax registration number.
    #[must_use]
    pub fn tax_id(mut self, tax_id: impl Into<String>) -> Self {
        self.tax_id = Some(tax_id.into());
        self
    }
}

/// One line on a kitchen order ticket. Kitchen tickets never carry prices.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct KotItem {
    pub name: String,
    pub quantity: u32,
    /// Preparation instructions ("no onion", "extra spicy").
    #[cfg_attr(feature = "serde", serde(default, skip_serializing_if = "Option::is_none"))]
    pub notes: Option<String>,
}

impl KotItem {
    pub fn new(name: impl Into<String>, quantity: u32) -> Self {
        Self {
            name: name.into(),
            quantity,
            notes: None,
        }
    }

    #[must_use]
    pub fn notes(mut self, notes: impl Into<String>) -> Self {
        self.notes = Some(notes.into());
        self
    }
}

/// Kitchen order ticket.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct KotTicket {
    pub outlet: Outlet,
    pub ticket_number: String,
    #[cfg_attr(feature = "serde", serde(default, skip_serializing_if = "Option::is_none"))]
    pub table: Option<String>,
    /// Dine-in, takeaway, delivery, ...
    #[cfg_attr(feature = "serde", serde(default, skip_serializing_if = "Option::is_none"))]
    pub order_type: Option<String>,
    #[cfg_attr(feature = "serde", serde(default, skip_serializing_if = "Option::is_none"))]
    pub server: Option<String>,
    #[cfg_attr(
        feature = "serde",
        serde(
            default,
            with = "time::serde::rfc3339::option",
            skip_serializing_if = "Option::is_none"
        )
    )]
    pub created_at: Option<OffsetDateTime>,
    #[cfg_attr(feature = "serde", serde(default))]
    pub items: Vec<KotItem>,
    #[cfg_attr(feature = "serde", serde(default, skip_serializing_if = "Option::is_none"))]
    pub notes: Option<String>,
}

impl KotTicket {
    /// Create an empty ticket.
    pub fn new(outlet: Outlet, ticket_number: impl Into<String>) -> Self {
        Self {
            outlet,
            ticket_number: ticket_number.into(),
            table: None,
            order_type: None,
            server: None,
            created_at: None,
            items: Vec::new(),
            notes: None,
        }
    }

    #[must_use]
    pub fn table(mut self, table: impl Into<String>) -> Self {
        self.table = Some(table.into());
        self
    }

    #[must_use]
    pub fn order_type(mut self, order_type: impl Into<String>) -> Self {
        self.order_type = Some(order_type.into());
        self
    }

    #[must_use]
    pub fn server(mut self, server: impl Into<String>) -> Self {
        self.server = Some(server.into());
        self
    }

    #[must_use]
    pub fn created_at(mut self, at: OffsetDateTime) -> Self {
        self.created_at = Some(at);
        self
    }

    #[must_use]
    pub fn item(mut self, item: KotItem) -> Self {
        self.items.push(item);
        self
    }

    #[must_use]
    pub fn notes(mut self, notes: impl Into<String>) -> Self {
        self.notes = Some(notes.into());
        self
    }

    /// Sum of item quantities.
    pub fn total_quantity(&self) -> u64 {
        self.items.iter().map(|i| u64::from(i.quantity)).sum()
    }
}

/// One priced line on an invoice.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct InvoiceLine {
    pub name: String,
    pub quantity: u32,
    pub unit_price: Money,
    pub line_total: Money,
}

impl InvoiceLine {
    /// Create a line whose total is `unit_price * quantity`.
    pub fn new(name: impl Into<String>, quantity: u32, unit_price: Money) -> Self {
        Self {
            name: name.into(),
            quantity,
            unit_price,
            line_total: unit_price * quantity,
        }
    }
}

/// A named tax amount ("CGST 2.5%", "VAT").
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct TaxLine {
    pub label: String,
    pub amount: Money,
}

impl TaxLine {
    pub fn new(label: impl Into<String>, amount: Money) -> Self {
        Self {
            label: label.into(),
            amount,
        }
    }
}

/// Customer invoice. Totals are computed upstream and printed as given.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Invoice {
    pub outlet: Outlet,
    pub invoice_number: String,
    #[cfg_attr(feature = "serde", serde(default, skip_serializing_if = "Option::is_none"))]
    pub table: Option<String>,
    #[cfg_attr(feature = "serde", serde(default, skip_serializing_if = "Option::is_none"))]
    pub customer: Option<String>,
    #[cfg_attr(feature = "serde", serde(default, skip_serializing_if = "Option::is_none"))]
    pub order_type: Option<String>,
    #[cfg_attr(feature = "serde", serde(default, skip_serializing_if = "Option::is_none"))]
    pub server: Option<String>,
    #[cfg_attr(
        feature = "serde",
        serde(
            default,
            with = "time::serde::rfc3339::option",
            skip_serializing_if = "Option::is_none"
        )
    )]
    pub issued_at: Option<OffsetDateTime>,
    #[cfg_attr(feature = "serde", serde(default))]
    pub lines: Vec<InvoiceLine>,
    pub subtotal: Money,
    #[cfg_attr(feature = "serde", serde(default, skip_serializing_if = "Option::is_none"))]
    pub discount: Option<Money>,
    #[cfg_attr(feature = "serde", serde(default))]
    pub taxes: Vec<TaxLine>,
    pub total: Money,
    #[cfg_attr(feature = "serde", serde(default, skip_serializing_if = "Option::is_none"))]
    pub payment_method: Option<String>,
    /// Payment URI. Printed as a placeholder line, not as a QR image.
    #[cfg_attr(feature = "serde", serde(default, skip_serializing_if = "Option::is_none"))]
    pub payment_qr: Option<String>,
    #[cfg_attr(feature = "serde", serde(default, skip_serializing_if = "Option::is_none"))]
    pub notes: Option<String>,
}

impl Invoice {
    /// Create an invoice with no lines and zero totals.
    pub fn new(outlet: Outlet, invoice_number: impl Into<String>) -> Self {
        Self {
            outlet,
            invoice_number: invoice_number.into(),
            table: None,
            customer: None,
            order_type: None,
            server: None,
            issued_at: None,
            lines: Vec::new(),
            subtotal: Money::ZERO,
            discount: None,
            taxes: Vec::new(),
            total: Money::ZERO,
            payment_method: None,
            payment_qr: None,
            notes: None,
        }
    }

    #[must_use]
    pub fn table(mut self, table: impl Into<String>) -> Self {
        self.table = Some(table.into());
        self
    }

    #[must_use]
    pub fn customer(mut self, customer: impl Into<String>) -> Self {
        self.customer = Some(customer.into());
        self
    }

    #[must_use]
    pub fn issued_at(mut self, at: OffsetDateTime) -> Self {
        self.issued_at = Some(at);
        self
    }

    #[must_use]
    pub fn line(mut self, line: InvoiceLine) -> Self {
        self.lines.push(line);
        self
    }

    #[must_use]
    pub fn discount(mut self, discount: Money) -> Self {
        self.discount = Some(discount);
        self
    }

    #[must_use]
    pub fn tax(mut self, tax: TaxLine) -> Self {
        self.taxes.push(tax);
        self
    }

    #[must_use]
    pub fn payment_method(mut self, method: impl Into<String>) -> Self {
        self.payment_method = Some(method.into());
        self
    }

    #[must_use]
    pub fn payment_qr(mut self, uri: impl Into<String>) -> Self {
        self.payment_qr = Some(uri.into());
        self
    }

    /// Recompute subtotal and total from the lines, discount and taxes.
    ///
    /// Upstream normally supplies totals; this is for callers assembling an
    /// invoice by hand. Fails if any sum leaves the amount range.
    pub fn with_computed_totals(mut self) -> Result<Self, DocumentError> {
        self.subtotal = Money::checked_sum(self.lines.iter().map(|l| l.line_total))
            .ok_or(DocumentError::AmountOverflow("subtotal"))?;
        let tax = Money::checked_sum(self.taxes.iter().map(|t| t.amount))
            .ok_or(DocumentError::AmountOverflow("tax"))?;
        self.total = self
            .subtotal
            .checked_sub(self.discount.unwrap_or(Money::ZERO))
            .and_then(|t| t.checked_add(tax))
            .ok_or(DocumentError::AmountOverflow("total"))?;
        Ok(self)
    }
}

/// Fixed diagnostic page.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct TestPage {
    /// Printer name shown on the page, when known.
    #[cfg_attr(feature = "serde", serde(default, skip_serializing_if = "Option::is_none"))]
    pub printer_name: Option<String>,
}

/// Any document the encoder can render.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(tag = "kind", rename_all = "snake_case"))]
pub enum PrintableDocument {
    Kot(KotTicket),
    Invoice(Invoice),
    TestPage(TestPage),
}

impl PrintableDocument {
    /// Short label for logs and events.
    pub fn label(&self) -> String {
        match self {
            PrintableDocument::Kot(k) => format!("KOT {}", k.ticket_number),
            PrintableDocument::Invoice(i) => format!("invoice {}", i.invoice_number),
            PrintableDocument::TestPage(_) => "test page".to_string(),
        }
    }
}

impl From<KotTicket> for PrintableDocument {
    fn from(value: KotTicket) -> Self {
        PrintableDocument::Kot(value)
    }
}

impl From<Invoice> for PrintableDocument {
    fn from(value: Invoice) -> Self {
        PrintableDocument::Invoice(value)
    }
}

impl From<TestPage> for PrintableDocument {
    fn from(value: TestPage) -> Self {
        PrintableDocument::TestPage(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invoice_line_total() {
        let line = InvoiceLine::new("Dal Makhani", 3, Money::from_minor(24_000));
        assert_eq!(line.line_total, Money::from_minor(72_000));
    }

    #[test]
    fn test_computed_totals() {
        let invoice = Invoice::new(Outlet::new("Spice Route"), "INV-9")
            .line(InvoiceLine::new("Naan", 4, Money::from_major(40)))
            .line(InvoiceLine::new("Paneer Tikka", 1, Money::from_major(280)))
            .discount(Money::from_major(20))
            .tax(TaxLine::new("CGST 2.5%", Money::from_minor(1050)))
            .tax(TaxLine::new("SGST 2.5%", Money::from_minor(1050)))
            .with_computed_totals()
            .unwrap();
        assert_eq!(invoice.subtotal, Money::from_major(440));
        assert_eq!(invoice.total, Money::from_major(441));
    }

    #[test]
    fn test_computed_totals_overflow_is_an_error() {
        let big = Money::try_from_f64(4e16).unwrap();
        let line = |name: &str| InvoiceLine {
            name: name.to_string(),
            quantity: 1,
            unit_price: big,
            line_total: big,
        };
        let result = Invoice::new(Outlet::new("Spice Route"), "INV-10")
            .line(line("A"))
            .line(line("B"))
            .line(line("C"))
            .with_computed_totals();
        assert_eq!(result, Err(DocumentError::AmountOverflow("subtotal")));
    }

    #[test]
    fn test_total_quantity_exceeds_item_range() {
        let ticket = KotTicket::new(Outlet::new("Spice Route"), "K-2")
            .item(KotItem::new("Naan", u32::MAX))
            .item(KotItem::new("Dal", 2));
        assert_eq!(ticket.total_quantity(), u64::from(u32::MAX) + 2);
    }

    #[test]
    fn test_document_label() {
        let kot: PrintableDocument = KotTicket::new(Outlet::new("A"), "K-1").into();
        assert_eq!(kot.label(), "KOT K-1");
        let page: PrintableDocument = TestPage::default().into();
        assert_eq!(page.label(), "test page");
    }

    #[cfg(feature = "serde")]
    #[test]
    fn test_deserialize_kot_from_store_json() {
        let json = r#"{
            "kind": "kot",
            "outlet": {"name": "Spice Route"},
            "ticket_number": "K-104",
            "table": "5",
            "created_at": "2026-10-17T12:30:00+05:30",
            "items": [
                {"name": "Paneer Tikka", "quantity": 2},
                {"name": "Naan", "quantity": 4, "notes": "butter"}
            ]
        }"#;
        let doc: PrintableDocument = serde_json::from_str(json).unwrap();
        let PrintableDocument::Kot(kot) = doc else {
            panic!("expected a KOT");
        };
        assert_eq!(kot.ticket_number, "K-104");
        assert_eq!(kot.items.len(), 2);
        assert_eq!(kot.items[1].notes.as_deref(), Some("butter"));
        assert!(kot.created_at.is_some());
    }

    #[cfg(feature = "serde")]
    #[test]
    fn test_deserialize_invoice_amounts() {
        let json = r#"{
            "kind": "invoice",
            "outlet": {"name": "Spice Route", "tax_id": "29ABCDE1234F1Z5"},
            "invoice_number": "INV-001",
            "lines": [{"name": "Naan", "quantity": 2, "unit_price": 40, "line_total": 80}],
            "subtotal": 80,
            "taxes": [{"label": "GST 5%", "amount": 4}],
            "total": 84.0
        }"#;
        let doc: PrintableDocument = serde_json::from_str(json).unwrap();
        let PrintableDocument::Invoice(invoice) = doc else {
            panic!("expected an invoice");
        };
        assert_eq!(invoice.total, Money::from_major(84));
        assert_eq!(invoice.lines[0].unit_price.to_string(), "40.00");
        assert!(invoice.discount.is_none());
    }
}
