//! Trait abstractions over the host Bluetooth stack.
//!
//! [`BluetoothBackend`] covers discovery and GATT connection, [`PrinterLink`]
//! covers one open connection to a writable characteristic. The btleplug
//! implementation lives in [`crate::btle`], the in-memory one used by tests
//! in [`crate::mock`].

use std::sync::Arc;

use async_trait::async_trait;
use uuid::Uuid;

use posprint_types::GattProfile;

use crate::error::Result;

/// A printer seen by discovery but not yet connected.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceCandidate {
    /// Platform identifier used to reconnect later.
    pub id: String,
    /// Advertised name.
    pub name: Option<String>,
    /// Signal strength at discovery time.
    pub rssi: Option<i16>,
}

impl DeviceCandidate {
    pub fn new(id: impl Into<String>, name: Option<String>) -> Self {
        Self {
            id: id.into(),
            name,
            rssi: None,
        }
    }

    /// Name for display, falling back to the identifier.
    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or(&self.id)
    }
}

/// Host Bluetooth capabilities the connection manager relies on.
///
/// Errors must already be classified into [`crate::Error`] variants; the
/// manager does not inspect platform error strings.
#[async_trait]
pub trait BluetoothBackend: Send + Sync {
    /// Whether the host exposes Bluetooth at all. No side effects.
    fn is_supported(&self) -> bool;

    /// Devices this host was granted before. Must not prompt the user.
    async fn known_devices(&self) -> Result<Vec<DeviceCandidate>>;

    /// Silent scan for devices advertising any of `services`.
    async fn scan(&self, services: &[Uuid]) -> Result<Vec<DeviceCandidate>>;

    /// Ask the user to pick a device. Cancelling yields `Error::NotFound`.
    async fn request_device(&self, services: &[Uuid]) -> Result<DeviceCandidate>;

    /// Connect to `candidate` and resolve a writable characteristic from `profiles`.
    async fn open(
        &self,
        candidate: &DeviceCandidate,
        profiles: &[GattProfile],
    ) -> Result<Arc<dyn PrinterLink>>;
}

/// An open GATT connection with a resolved write characteristic.
#[async_trait]
pub trait PrinterLink: Send + Sync {
    /// Identity of the connected printer.
    fn candidate(&self) -> &DeviceCandidate;

    /// The characteristic bytes are written to.
    fn characteristic(&self) -> Uuid;

    /// Platform-reported link state, updated by disconnect notifications.
    fn is_connected(&self) -> bool;

    /// Ask the platform directly whether the link is still up.
    async fn probe(&self) -> bool;

    /// Largest payload accepted by one [`write_chunk`](Self::write_chunk) call.
    fn max_write_len(&self) -> usize;

    /// Write one chunk and wait for the platform to accept it.
    async fn write_chunk(&self, chunk: &[u8]) -> Result<()>;

    /// Tear down the GATT connection. Safe to call twice.
    async fn close(&self) -> Result<()>;
}

/// Interactive device picker supplied by the application shell.
#[async_trait]
pub trait DeviceChooser: Send + Sync {
    /// Return the chosen device, or `None` if the user cancelled.
    async fn choose(&self, candidates: &[DeviceCandidate]) -> Option<DeviceCandidate>;
}

/// A chooser that always picks the strongest signal. Used when no one is
/// around to answer a prompt.
#[derive(Debug, Default, Clone, Copy)]
pub struct StrongestSignalChooser;

#[async_trait]
impl DeviceChooser for StrongestSignalChooser {
    async fn choose(&self, candidates: &[DeviceCandidate]) -> Option<DeviceCandidate> {
        candidates
            .iter()
            .max_by_key(|c| c.rssi.unwrap_or(i16::MIN))
            .cloned()
    }
}
