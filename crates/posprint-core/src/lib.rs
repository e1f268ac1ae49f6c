//! Bluetooth thermal printer client for restaurant point-of-sale.
//!
//! This crate connects to BLE receipt printers, renders kitchen order tickets
//! (KOTs), invoices and test pages as ESC/POS byte streams, and keeps a
//! printer connected for the lifetime of the application.
//!
//! # Layers
//!
//! - **Connection manager** ([`PrinterManager`]): silent reconnect to known
//!   printers, service-filtered scan, interactive chooser, chunked ordered writes
//! - **Document encoder** ([`DocumentEncoder`]): pure document-to-bytes
//!   rendering on a fixed 32 or 48 column grid
//! - **Connection supervisor** ([`PrinterSupervisor`]): startup auto-connect,
//!   bounded scheduled retries, health polling, connect-on-print
//!
//! The host Bluetooth stack sits behind [`BluetoothBackend`]. [`btle`] talks to
//! real hardware through btleplug; [`mock`] is an in-memory stand-in for tests.
//!
//! # Platform Differences
//!
//! - **macOS**: printers are identified by a CoreBluetooth UUID, stable for a
//!   given printer on a given Mac only.
//! - **Linux/Windows**: printers are identified by their MAC address.
//!
//! # Quick Start
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use posprint_core::btle::BtleplugBackend;
//! use posprint_core::{
//!     ConnectionConfig, DocumentEncoder, EncoderConfig, PrinterManager, PrinterSupervisor,
//!     StrongestSignalChooser, SupervisorConfig,
//! };
//! use posprint_types::{KotItem, KotTicket, Outlet};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = ConnectionConfig::default();
//!     let backend = BtleplugBackend::new(&config, Arc::new(StrongestSignalChooser)).await;
//!     let manager = Arc::new(PrinterManager::new(Arc::new(backend), config)?);
//!     let encoder = DocumentEncoder::new(EncoderConfig::default())?;
//!     let supervisor = PrinterSupervisor::new(manager, encoder, SupervisorConfig::default())?;
//!     supervisor.start();
//!
//!     let kot = KotTicket::new(Outlet::new("Spice Route"), "K-104")
//!         .table("5")
//!         .item(KotItem::new("Paneer Tikka", 2));
//!     supervisor.print_kot(&kot).await?;
//!
//!     supervisor.shutdown().await;
//!     Ok(())
//! }
//! ```

pub mod btle;
pub mod config;
pub mod encoder;
pub mod error;
pub mod escpos;
pub mod events;
pub mod layout;
pub mod manager;
pub mod mock;
pub mod supervisor;
pub mod traits;
pub mod util;

pub use posprint_types::uuid;

pub use config::{
    ConnectionConfig, EncoderConfig, PaperWidth, SupervisorConfig, TextEncoding,
};
pub use encoder::{DocumentEncoder, EncodedPayload};
pub use error::{Error, ErrorKind, NotFoundReason, Result};
pub use events::{
    ConnectMethod, DisconnectReason, EventDispatcher, EventReceiver, EventSender, PrinterEvent,
    PrinterId,
};
pub use manager::{ConnectionStatus, PrinterDevice, PrinterManager};
pub use mock::{ChooserOutcome, MockBackend};
pub use supervisor::{
    ConnectionPolicyState, PrintReport, PrinterSupervisor, SupervisorState, SupervisorStatus,
};
pub use traits::{
    BluetoothBackend, DeviceCandidate, DeviceChooser, PrinterLink, StrongestSignalChooser,
};

// Re-export domain types
pub use posprint_types::{
    Invoice, InvoiceLine, KotItem, KotTicket, Money, Outlet, PrintableDocument, TaxLine, TestPage,
};
