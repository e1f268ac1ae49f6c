//! Platform-agnostic types for Bluetooth thermal receipt printing.
//!
//! This crate holds the shapes shared between the printer client
//! (`posprint-core`) and whatever produces orders and invoices upstream:
//!
//! - [`PrintableDocument`] and its variants ([`KotTicket`], [`Invoice`], [`TestPage`])
//! - [`Money`], a fixed-point currency amount
//! - GATT service/characteristic UUIDs used by common BLE thermal printers
//!
//! Documents are read-only inputs. Nothing in this crate performs I/O.
//!
//! # Example
//!
//! ```
//! use posprint_types::{KotItem, KotTicket, Outlet};
//!
//! let ticket = KotTicket::new(Outlet::new("Spice Route"), "K-104")
//!     .table("5")
//!     .item(KotItem::new("Paneer Tikka", 2))
//!     .item(KotItem::new("Naan", 4));
//! assert_eq!(ticket.total_quantity(), 6);
//! ```

pub mod document;
pub mod error;
pub mod money;
pub mod uuid;

pub use document::{
    Invoice, InvoiceLine, KotItem, KotTicket, Outlet, PrintableDocument, TaxLine, TestPage,
};
pub use error::{DocumentError, DocumentResult};
pub use money::Money;
pub use uuid::GattProfile;
