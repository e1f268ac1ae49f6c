//! Document encoder: [`PrintableDocument`] to ESC/POS bytes.
//!
//! Encoding is a pure function of the document and the [`EncoderConfig`].
//! Nothing time- or randomness-dependent is added, so the same document
//! always yields the same bytes.
//!
//! # Example
//!
//! ```
//! use posprint_core::{DocumentEncoder, EncoderConfig};
//! use posprint_types::{KotItem, KotTicket, Outlet};
//!
//! let kot = KotTicket::new(Outlet::new("Spice Route"), "K-104")
//!     .table("5")
//!     .item(KotItem::new("Paneer Tikka", 2))
//!     .item(KotItem::new("Naan", 4));
//!
//! let encoder = DocumentEncoder::new(EncoderConfig::default()).unwrap();
//! let payload = encoder.encode(&kot.into());
//! assert!(payload.ends_with_cut());
//! assert!(payload.preview_text().contains("K-104"));
//! ```

use bytes::{BufMut, Bytes, BytesMut};
use time::OffsetDateTime;
use time::format_description::BorrowedFormatItem;
use time::macros::format_description;

use posprint_types::{Invoice, KotTicket, Money, PrintableDocument, TestPage};

use crate::config::{EncoderConfig, TextEncoding};
use crate::error::Result;
use crate::escpos::{self, Alignment, LF};
use crate::layout::{Table, label_value, rule, wrap};

const DATE_FORMAT: &[BorrowedFormatItem<'static>] =
    format_description!("[day]/[month]/[year] [hour]:[minute]");

/// Placeholder printed instead of an empty item table.
pub const NO_ITEMS: &str = "*** No items ***";

/// A rendered printer command stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedPayload(Bytes);

impl EncodedPayload {
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Split into consecutive slices of at most `size` bytes without copying.
    pub fn chunks(&self, size: usize) -> impl Iterator<Item = Bytes> + '_ {
        let size = size.max(1);
        (0..self.0.len())
            .step_by(size)
            .map(move |start| self.0.slice(start..(start + size).min(self.0.len())))
    }

    /// The printable text with control sequences removed.
    pub fn preview_text(&self) -> String {
        escpos::strip_commands(&self.0)
    }

    /// Whether the stream ends with a paper cut.
    pub fn ends_with_cut(&self) -> bool {
        self.0.ends_with(&escpos::cut())
    }

    pub fn into_bytes(self) -> Bytes {
        self.0
    }
}

impl AsRef<[u8]> for EncodedPayload {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl From<EncodedPayload> for Bytes {
    fn from(payload: EncodedPayload) -> Self {
        payload.0
    }
}

/// Builds the byte stream for one document.
struct Writer {
    buf: BytesMut,
    encoding: TextEncoding,
}

impl Writer {
    fn new(encoding: TextEncoding) -> Self {
        let mut buf = BytesMut::with_capacity(512);
        buf.put_slice(&escpos::init());
        Self { buf, encoding }
    }

    fn command(&mut self, bytes: &[u8]) -> &mut Self {
        self.buf.put_slice(bytes);
        self
    }

    fn bold(&mut self, on: bool) -> &mut Self {
        self.command(&escpos::bold(on))
    }

    fn align(&mut self, alignment: Alignment) -> &mut Self {
        self.command(&escpos::align(alignment))
    }

    fn size(&mut self, width: u8, height: u8) -> &mut Self {
        self.command(&escpos::size(width, height))
    }

    fn line(&mut self, text: &str) -> &mut Self {
        for ch in text.chars() {
            match self.encoding {
                TextEncoding::Ascii if ch.is_ascii() && !ch.is_ascii_control() => {
                    self.buf.put_u8(ch as u8)
                }
                TextEncoding::Utf8 if !ch.is_control() => {
                    let mut utf8 = [0u8; 4];
                    self.buf.put_slice(ch.encode_utf8(&mut utf8).as_bytes());
                }
                _ => self.buf.put_u8(b'?'),
            }
        }
        self.buf.put_u8(LF);
        self
    }

    fn lines<I, S>(&mut self, lines: I) -> &mut Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        for line in lines {
            self.line(line.as_ref());
        }
        self
    }

    fn finish(mut self, feed_lines: u8) -> EncodedPayload {
        self.buf.put_slice(&escpos::feed(feed_lines));
        self.buf.put_slice(&escpos::cut());
        EncodedPayload(self.buf.freeze())
    }
}

/// Renders documents for one paper width.
#[derive(Debug, Clone)]
pub struct DocumentEncoder {
    config: EncoderConfig,
}

impl Default for DocumentEncoder {
    fn default() -> Self {
        Self {
            config: EncoderConfig::default(),
        }
    }
}

impl DocumentEncoder {
    /// Create an encoder, validating the configuration.
    pub fn new(config: EncoderConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &EncoderConfig {
        &self.config
    }

    /// Characters per line.
    pub fn columns(&self) -> usize {
        self.config.paper.columns()
    }

    /// Render any document.
    pub fn encode(&self, document: &PrintableDocument) -> EncodedPayload {
        match document {
            PrintableDocument::Kot(kot) => self.encode_kot(kot),
            PrintableDocument::Invoice(invoice) => self.encode_invoice(invoice),
            PrintableDocument::TestPage(page) => self.encode_test_page(page),
        }
    }

    fn amount(&self, money: Money) -> String {
        format!("{}{}", self.config.currency_prefix, money)
    }

    /// Centered, bold, double-size outlet or page title.
    fn banner(&self, w: &mut Writer, title: &str) {
        w.align(Alignment::Center)
            .bold(true)
            .size(2, 2)
            .lines(wrap(title, self.columns() / 2))
            .size(1, 1)
            .bold(false);
    }

    fn field(&self, w: &mut Writer, label: &str, value: Option<&str>) {
        if let Some(value) = value {
            w.lines(wrap(&format!("{}: {}", label, value), self.columns()));
        }
    }

    fn timestamp(&self, w: &mut Writer, at: Option<OffsetDateTime>) {
        let formatted = at.and_then(|at| at.format(DATE_FORMAT).ok());
        self.field(w, "Date", formatted.as_deref());
    }

    fn no_items(&self, w: &mut Writer) {
        w.align(Alignment::Center)
            .line(NO_ITEMS)
            .align(Alignment::Left);
    }

    /// Kitchen order ticket: item names and quantities only.
    pub fn encode_kot(&self, kot: &KotTicket) -> EncodedPayload {
        let cols = self.columns();
        let mut w = Writer::new(self.config.text_encoding);

        self.banner(&mut w, &kot.outlet.name);
        w.bold(true)
            .line("KITCHEN ORDER TICKET")
            .bold(false)
            .align(Alignment::Left);

        let ticket = format!("KOT #{}", kot.ticket_number);
        match &kot.table {
            Some(table) => w.lines(label_value(&ticket, &format!("Table {}", table), cols)),
            None => w.lines(wrap(&ticket, cols)),
        };
        self.field(&mut w, "Type", kot.order_type.as_deref());
        self.field(&mut w, "Server", kot.server.as_deref());
        self.timestamp(&mut w, kot.created_at);

        let quantities: Vec<String> = kot.items.iter().map(|i| i.quantity.to_string()).collect();
        let table = quantities
            .iter()
            .fold(Table::new(cols, &[3]), |t, q| t.fit(&[q]));

        w.line(&rule('-', cols))
            .bold(true)
            .lines(table.row("Item", &["Qty"]))
            .bold(false)
            .line(&rule('-', cols));

        if kot.items.is_empty() {
            self.no_items(&mut w);
        }
        for (item, quantity) in kot.items.iter().zip(&quantities) {
            w.lines(table.row(&item.name, &[quantity]));
            if let Some(notes) = &item.notes {
                for (i, note) in wrap(notes, cols.saturating_sub(4)).iter().enumerate() {
                    let prefix = if i == 0 { "  - " } else { "    " };
                    w.line(&format!("{}{}", prefix, note));
                }
            }
        }

        w.line(&rule('-', cols)).bold(true).lines(label_value(
            "Total quantity",
            &kot.total_quantity().to_string(),
            cols,
        ));
        w.bold(false);

        if let Some(notes) = &kot.notes {
            w.line("Notes:").lines(wrap(notes, cols));
        }
        w.finish(self.config.feed_lines)
    }

    /// Customer invoice with prices, taxes and totals.
    pub fn encode_invoice(&self, invoice: &Invoice) -> EncodedPayload {
        let cols = self.columns();
        let mut w = Writer::new(self.config.text_encoding);

        self.banner(&mut w, &invoice.outlet.name);
        w.align(Alignment::Center);
        if let Some(address) = &invoice.outlet.address {
            for part in address.lines() {
                w.lines(wrap(part, cols));
            }
        }
        self.field(&mut w, "Ph", invoice.outlet.phone.as_deref());
        self.field(&mut w, "Tax ID", invoice.outlet.tax_id.as_deref());
        w.bold(true)
            .line("INVOICE")
            .bold(false)
            .align(Alignment::Left);

        self.field(&mut w, "Bill No", Some(invoice.invoice_number.as_str()));
        self.timestamp(&mut w, invoice.issued_at);
        self.field(&mut w, "Table", invoice.table.as_deref());
        self.field(&mut w, "Customer", invoice.customer.as_deref());
        self.field(&mut w, "Type", invoice.order_type.as_deref());
        self.field(&mut w, "Server", invoice.server.as_deref());

        let header = ["Qty", "Rate", "Amount"];
        let rows: Vec<[String; 3]> = invoice
            .lines
            .iter()
            .map(|l| {
                [
                    l.quantity.to_string(),
                    l.unit_price.to_string(),
                    l.line_total.to_string(),
                ]
            })
            .collect();
        let table = rows
            .iter()
            .fold(Table::new(cols, &[3, 7, 8]).fit(&header), |t, r| t.fit(r));

        w.line(&rule('-', cols))
            .bold(true)
            .lines(table.row("Item", &header))
            .bold(false)
            .line(&rule('-', cols));

        if invoice.lines.is_empty() {
            self.no_items(&mut w);
        }
        for (line, row) in invoice.lines.iter().zip(&rows) {
            w.lines(table.row(&line.name, row));
        }

        w.line(&rule('-', cols))
            .lines(label_value("Subtotal", &self.amount(invoice.subtotal), cols));
        if let Some(discount) = invoice.discount {
            let shown = if discount.is_negative() {
                discount
            } else {
                -discount
            };
            w.lines(label_value("Discount", &self.amount(shown), cols));
        }
        for tax in &invoice.taxes {
            w.lines(label_value(&tax.label, &self.amount(tax.amount), cols));
        }
        w.line(&rule('=', cols))
            .bold(true)
            .size(1, 2)
            .lines(label_value("TOTAL", &self.amount(invoice.total), cols))
            .size(1, 1)
            .bold(false)
            .line(&rule('=', cols));

        if let Some(method) = &invoice.payment_method {
            w.lines(label_value("Paid by", method, cols));
        }
        if let Some(qr) = &invoice.payment_qr {
            w.align(Alignment::Center)
                .line("Scan to pay")
                .lines(wrap(&format!("[QR: {}]", qr), cols))
                .align(Alignment::Left);
        }
        if let Some(notes) = &invoice.notes {
            w.line("Notes:").lines(wrap(notes, cols));
        }
        if let Some(footer) = &self.config.footer {
            w.align(Alignment::Center)
                .line("")
                .lines(wrap(footer, cols))
                .align(Alignment::Left);
        }
        w.finish(self.config.feed_lines)
    }

    /// Fixed diagnostic page: grid ruler, text styles and an aligned amount.
    pub fn encode_test_page(&self, page: &TestPage) -> EncodedPayload {
        let cols = self.columns();
        let mut w = Writer::new(self.config.text_encoding);

        self.banner(&mut w, "TEST PAGE");
        self.field(&mut w, "Printer", page.printer_name.as_deref());
        w.line(&format!("Paper width: {} columns", cols))
            .align(Alignment::Left)
            .line(&rule('-', cols));

        let ruler: String = "1234567890".chars().cycle().take(cols).collect();
        w.line(&ruler)
            .line("Normal text")
            .bold(true)
            .line("Bold text")
            .bold(false)
            .size(1, 2)
            .line("Double height")
            .size(1, 1)
            .align(Alignment::Right)
            .line("Right aligned")
            .align(Alignment::Left)
            .lines(label_value(
                "Sample amount",
                &self.amount(Money::from_minor(12_345)),
                cols,
            ))
            .line(&rule('-', cols))
            .align(Alignment::Center)
            .lines(wrap("If you can read this, the printer works.", cols))
            .align(Alignment::Left);
        w.finish(self.config.feed_lines)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PaperWidth;
    use crate::layout::width;
    use posprint_types::{InvoiceLine, KotItem, Outlet, TaxLine};

    fn kot() -> KotTicket {
        KotTicket::new(Outlet::new("Spice Route"), "K-104")
            .table("5")
            .item(KotItem::new("Paneer Tikka", 2).notes("less spicy"))
            .item(KotItem::new("Naan", 4))
            .item(KotItem::new("Dal Makhani", 1))
    }

    fn invoice() -> Invoice {
        Invoice::new(
            Outlet::new("Spice Route")
                .address("12 MG Road, Bengaluru")
                .phone("080-555-0101"),
            "INV-2041",
        )
        .table("5")
        .line(InvoiceLine::new("Paneer Tikka", 2, Money::from_major(240)))
        .line(InvoiceLine::new("Butter Naan", 4, Money::from_major(45)))
        .tax(TaxLine::new("CGST 2.5%", Money::from_minor(1_650)))
        .tax(TaxLine::new("SGST 2.5%", Money::from_minor(1_650)))
        .payment_method("UPI")
        .with_computed_totals()
        .unwrap()
    }

    fn printed_lines(payload: &EncodedPayload) -> Vec<String> {
        payload.preview_text().lines().map(str::to_string).collect()
    }

    #[test]
    fn test_starts_with_init_ends_with_cut() {
        let payload = DocumentEncoder::default().encode_kot(&kot());
        assert!(payload.as_bytes().starts_with(&escpos::init()));
        assert!(payload.ends_with_cut());
    }

    #[test]
    fn test_kot_has_quantities_and_no_prices() {
        let text = DocumentEncoder::default().encode_kot(&kot()).preview_text();
        assert!(text.contains("KOT #K-104"));
        assert!(text.contains("Table 5"));
        assert!(text.contains("Paneer Tikka"));
        assert!(text.contains("- less spicy"));
        assert!(!text.contains('.'));
    }

    #[test]
    fn test_kot_header_is_bold() {
        let bytes = DocumentEncoder::default().encode_kot(&kot()).into_bytes();
        let bold_on = escpos::bold(true);
        let at = bytes
            .windows(3)
            .position(|w| w == bold_on)
            .expect("bold command present");
        let name_at = bytes
            .windows(5)
            .position(|w| w == b"Spice")
            .expect("outlet name present");
        assert!(at < name_at);
    }

    #[test]
    fn test_invoice_contents() {
        let text = DocumentEncoder::default()
            .encode_invoice(&invoice())
            .preview_text();
        for expected in [
            "INV-2041", "480.00", "180.00", "660.00", "CGST 2.5%", "693.00", "UPI",
        ] {
            assert!(text.contains(expected), "missing {}", expected);
        }
        assert!(text.contains("Thank you! Visit again."));
    }

    #[test]
    fn test_invoice_address_newlines_start_lines() {
        let mut invoice = invoice();
        invoice.outlet.address = Some("12 MG Road\nBengaluru 560001".to_string());
        let lines = printed_lines(&DocumentEncoder::default().encode_invoice(&invoice));
        assert!(lines.iter().any(|l| l.trim() == "12 MG Road"));
        assert!(lines.iter().any(|l| l.trim() == "Bengaluru 560001"));
    }

    #[test]
    fn test_kot_total_quantity_beyond_item_range() {
        let kot = KotTicket::new(Outlet::new("Spice Route"), "K-9")
            .item(KotItem::new("Naan", u32::MAX))
            .item(KotItem::new("Dal", 2));
        let text = DocumentEncoder::default().encode_kot(&kot).preview_text();
        assert!(text.contains("4294967297"));
    }

    #[test]
    fn test_invoice_currency_prefix_on_totals() {
        let config = EncoderConfig {
            currency_prefix: "Rs.".into(),
            ..Default::default()
        };
        let text = DocumentEncoder::new(config)
            .unwrap()
            .encode_invoice(&invoice())
            .preview_text();
        assert!(text.contains("Rs.693.00"));
    }

    #[test]
    fn test_invoice_discount_shown_negative() {
        let invoice = invoice().discount(Money::from_major(60))
            .with_computed_totals()
            .unwrap();
        let text = DocumentEncoder::default()
            .encode_invoice(&invoice)
            .preview_text();
        assert!(text.contains("-60.00"));
        assert!(text.contains("633.00"));
    }

    #[test]
    fn test_payment_qr_placeholder() {
        let invoice = invoice().payment_qr("upi://pay?pa=spice@bank");
        let text = DocumentEncoder::default()
            .encode_invoice(&invoice)
            .preview_text();
        assert!(text.contains("Scan to pay"));
        assert!(text.contains("[QR:"));
    }

    #[test]
    fn test_empty_documents_print_placeholder() {
        let encoder = DocumentEncoder::default();
        let kot = KotTicket::new(Outlet::new("Spice Route"), "K-1");
        let text = encoder.encode_kot(&kot).preview_text();
        assert!(text.contains(NO_ITEMS));
        assert!(text.contains("Spice Route"));

        let invoice = Invoice::new(Outlet::new("Spice Route"), "INV-1");
        let payload = encoder.encode_invoice(&invoice);
        assert!(payload.preview_text().contains(NO_ITEMS));
        assert!(payload.ends_with_cut());
    }

    #[test]
    fn test_lines_fit_both_paper_widths() {
        let long = "Hyderabadi Dum Biryani with Extra Raita and Salan on the side";
        let kot = kot().item(KotItem::new(long, 12));
        let invoice = invoice().line(InvoiceLine::new(long, 3, Money::from_minor(99_999_99)));

        for paper in [PaperWidth::Mm58, PaperWidth::Mm80] {
            let encoder = DocumentEncoder::new(EncoderConfig::for_paper(paper)).unwrap();
            let cols = encoder.columns();
            for payload in [
                encoder.encode_kot(&kot),
                encoder.encode_invoice(&invoice),
                encoder.encode_test_page(&TestPage::default()),
            ] {
                for line in printed_lines(&payload) {
                    assert!(width(&line) <= cols, "{:?} exceeds {}", line, cols);
                }
            }
            let text = encoder.encode_kot(&kot).preview_text();
            for word in long.split_whitespace() {
                assert!(text.contains(word), "dropped {}", word);
            }
        }
    }

    #[test]
    fn test_encoding_is_idempotent() {
        let encoder = DocumentEncoder::default();
        let document = PrintableDocument::from(kot());
        assert_eq!(encoder.encode(&document), encoder.encode(&document));
        let document = PrintableDocument::from(invoice());
        assert_eq!(encoder.encode(&document), encoder.encode(&document));
    }

    #[test]
    fn test_ascii_encoding_replaces_non_ascii() {
        let kot = KotTicket::new(Outlet::new("Café"), "K-1");
        let ascii = DocumentEncoder::default().encode_kot(&kot);
        assert!(ascii.preview_text().contains("Caf?"));

        let config = EncoderConfig {
            text_encoding: TextEncoding::Utf8,
            ..Default::default()
        };
        let utf8 = DocumentEncoder::new(config).unwrap().encode_kot(&kot);
        assert!(utf8.preview_text().contains("Café"));
    }

    #[test]
    fn test_control_characters_in_input_are_neutralised() {
        let kot = KotTicket::new(Outlet::new("Spice"), "K-1")
            .item(KotItem::new("Tea\u{1b}@", 1));
        let payload = DocumentEncoder::default().encode_kot(&kot);
        // Only the leading init may appear.
        let inits = payload
            .as_bytes()
            .windows(2)
            .filter(|w| *w == escpos::init())
            .count();
        assert_eq!(inits, 1);
    }

    #[test]
    fn test_test_page() {
        let page = TestPage {
            printer_name: Some("MPT-II".into()),
        };
        let text = DocumentEncoder::default().encode_test_page(&page).preview_text();
        assert!(text.contains("TEST PAGE"));
        assert!(text.contains("MPT-II"));
        assert!(text.contains("12345678901234567890123456789012"));
    }

    #[test]
    fn test_payload_chunks() {
        let payload = DocumentEncoder::default().encode_kot(&kot());
        let chunks: Vec<Bytes> = payload.chunks(20).collect();
        assert!(chunks.iter().all(|c| c.len() <= 20));
        assert_eq!(chunks.concat(), payload.as_bytes());
    }
}
