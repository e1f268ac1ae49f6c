//! [`BluetoothBackend`] on top of btleplug.
//!
//! Peripherals seen during discovery are cached by identifier so a later
//! [`open`](BluetoothBackend::open) can reach them without scanning again.
//! Each open link runs a small watcher task on the adapter event stream that
//! flips the link to disconnected when the platform reports the device gone.

use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use btleplug::api::{
    Central, CentralEvent, CharPropFlags, Characteristic, Manager as _, Peripheral as _,
    ScanFilter, WriteType,
};
use btleplug::platform::{Adapter, Manager, Peripheral};
use futures::StreamExt;
use tokio::task::JoinHandle;
use tokio::time::{sleep, timeout};
use tracing::{debug, info, warn};
use uuid::Uuid;

use posprint_types::GattProfile;

use crate::config::ConnectionConfig;
use crate::error::{Error, NotFoundReason, Result};
use crate::traits::{BluetoothBackend, DeviceCandidate, DeviceChooser, PrinterLink};
use crate::util::create_identifier;

/// Bluetooth backend for the host's first adapter.
pub struct BtleplugBackend {
    adapter: Option<Adapter>,
    peripherals: Mutex<HashMap<String, Peripheral>>,
    chooser: Arc<dyn DeviceChooser>,
    remembered: Vec<String>,
    scan_duration: Duration,
    connect_timeout: Duration,
    discovery_timeout: Duration,
    chunk_size: usize,
}

impl std::fmt::Debug for BtleplugBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BtleplugBackend")
            .field("has_adapter", &self.adapter.is_some())
            .field("remembered", &self.remembered)
            .finish_non_exhaustive()
    }
}

impl BtleplugBackend {
    /// Bind to the first Bluetooth adapter.
    ///
    /// A host without an adapter still yields a backend; it reports
    /// [`is_supported`](BluetoothBackend::is_supported) as `false`.
    pub async fn new(config: &ConnectionConfig, chooser: Arc<dyn DeviceChooser>) -> Self {
        let adapter = match first_adapter().await {
            Ok(adapter) => adapter,
            Err(e) => {
                warn!("Bluetooth unavailable: {}", e);
                None
            }
        };
        Self {
            adapter,
            peripherals: Mutex::new(HashMap::new()),
            chooser,
            remembered: config.remembered.clone(),
            scan_duration: config.scan_duration,
            connect_timeout: config.connect_timeout,
            discovery_timeout: config.discovery_timeout,
            chunk_size: config.chunk_size,
        }
    }

    fn adapter(&self) -> Result<&Adapter> {
        self.adapter
            .as_ref()
            .ok_or_else(|| Error::Unsupported("no Bluetooth adapter found".to_string()))
    }

    fn cache(&self, identifier: &str, peripheral: Peripheral) {
        self.peripherals
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(identifier.to_string(), peripheral);
    }

    fn cached(&self, identifier: &str) -> Option<Peripheral> {
        self.peripherals
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(identifier)
            .cloned()
    }

    /// Describe every peripheral the adapter currently knows, caching each.
    async fn list_peripherals(&self) -> Result<Vec<(DeviceCandidate, Vec<Uuid>)>> {
        let adapter = self.adapter()?;
        let mut listed = Vec::new();
        for peripheral in adapter.peripherals().await? {
            let properties = match peripheral.properties().await {
                Ok(Some(p)) => p,
                Ok(None) => continue,
                Err(e) => {
                    debug!("Error reading peripheral properties: {}", e);
                    continue;
                }
            };
            let identifier = create_identifier(&properties.address.to_string(), &peripheral.id());
            let candidate = DeviceCandidate {
                id: identifier.clone(),
                name: properties.local_name.clone(),
                rssi: properties.rssi,
            };
            self.cache(&identifier, peripheral);
            listed.push((candidate, properties.services));
        }
        Ok(listed)
    }
}

async fn first_adapter() -> Result<Option<Adapter>> {
    let manager = Manager::new().await?;
    Ok(manager.adapters().await?.into_iter().next())
}

#[async_trait]
impl BluetoothBackend for BtleplugBackend {
    fn is_supported(&self) -> bool {
        self.adapter.is_some()
    }

    async fn known_devices(&self) -> Result<Vec<DeviceCandidate>> {
        if self.remembered.is_empty() {
            return Ok(Vec::new());
        }
        let known: Vec<DeviceCandidate> = self
            .list_peripherals()
            .await?
            .into_iter()
            .map(|(candidate, _)| candidate)
            .filter(|c| self.remembered.contains(&c.id))
            .collect();
        debug!("{} remembered printer(s) available", known.len());
        Ok(known)
    }

    async fn scan(&self, services: &[Uuid]) -> Result<Vec<DeviceCandidate>> {
        let adapter = self.adapter()?;
        info!(
            "Scanning for printers for {} seconds...",
            self.scan_duration.as_secs()
        );
        adapter
            .start_scan(ScanFilter {
                services: services.to_vec(),
            })
            .await?;
        sleep(self.scan_duration).await;
        adapter.stop_scan().await?;

        // Some platforms ignore the scan filter, so filter again here.
        let found: Vec<DeviceCandidate> = self
            .list_peripherals()
            .await?
            .into_iter()
            .filter(|(candidate, advertised)| {
                advertised.iter().any(|s| services.contains(s))
                    || self.remembered.contains(&candidate.id)
            })
            .map(|(candidate, _)| candidate)
            .collect();
        info!("Scan complete. Found {} printer(s)", found.len());
        Ok(found)
    }

    async fn request_device(&self, services: &[Uuid]) -> Result<DeviceCandidate> {
        let candidates = self.scan(services).await?;
        if candidates.is_empty() {
            return Err(Error::NotFound(NotFoundReason::NoPrintersInRange));
        }
        self.chooser
            .choose(&candidates)
            .await
            .ok_or(Error::NotFound(NotFoundReason::ChooserCancelled))
    }

    #[tracing::instrument(level = "info", skip_all, fields(printer = %candidate.display_name()))]
    async fn open(
        &self,
        candidate: &DeviceCandidate,
        profiles: &[GattProfile],
    ) -> Result<Arc<dyn PrinterLink>> {
        let adapter = self.adapter()?.clone();
        let peripheral = match self.cached(&candidate.id) {
            Some(p) => p,
            None => {
                self.list_peripherals().await?;
                self.cached(&candidate.id).ok_or_else(|| {
                    Error::NotFound(NotFoundReason::Device {
                        identifier: candidate.id.clone(),
                    })
                })?
            }
        };

        info!("Connecting to printer...");
        timeout(self.connect_timeout, peripheral.connect())
            .await
            .map_err(|_| Error::timeout("connect to printer", self.connect_timeout))??;

        let setup = self.resolve_write_target(&peripheral, profiles).await;
        let (characteristic, write_type) =
            disconnect_on_error(setup, || peripheral.disconnect()).await?;
        info!(
            "Connected, writing to {} ({:?})",
            characteristic.uuid, write_type
        );

        let connected = Arc::new(AtomicBool::new(true));
        let watcher = spawn_disconnect_watcher(adapter, &peripheral, Arc::clone(&connected)).await;

        Ok(Arc::new(BtleplugLink {
            candidate: candidate.clone(),
            peripheral,
            characteristic,
            write_type,
            max_write_len: self.chunk_size,
            connected,
            watcher: Mutex::new(watcher),
        }))
    }
}

impl BtleplugBackend {
    /// Discover services on a connected peripheral and pick how to write.
    async fn resolve_write_target(
        &self,
        peripheral: &Peripheral,
        profiles: &[GattProfile],
    ) -> Result<(Characteristic, WriteType)> {
        timeout(self.discovery_timeout, peripheral.discover_services())
            .await
            .map_err(|_| Error::timeout("discover services", self.discovery_timeout))??;

        let services = peripheral.services();
        debug!("Found {} services", services.len());
        let characteristic = resolve_characteristic(peripheral, profiles).ok_or(
            Error::CharacteristicNotFound {
                service_count: services.len(),
            },
        )?;
        let write_type = if characteristic.properties.contains(CharPropFlags::WRITE) {
            WriteType::WithResponse
        } else {
            WriteType::WithoutResponse
        };
        Ok((characteristic, write_type))
    }
}

/// Disconnect a freshly connected peripheral when the setup after connect
/// fails, so no GATT session outlives the error.
async fn disconnect_on_error<T, F, Fut>(setup: Result<T>, disconnect: F) -> Result<T>
where
    F: FnOnce() -> Fut,
    Fut: Future<Output = std::result::Result<(), btleplug::Error>>,
{
    if let Err(e) = &setup {
        debug!("Printer setup failed ({}), disconnecting", e);
        match disconnect().await {
            Ok(()) | Err(btleplug::Error::NotConnected) => {}
            Err(err) => warn!("Failed to disconnect after setup error: {}", err),
        }
    }
    setup
}

/// Pick the write characteristic: configured profiles in order, then any
/// writable characteristic.
fn resolve_characteristic(
    peripheral: &Peripheral,
    profiles: &[GattProfile],
) -> Option<Characteristic> {
    let characteristics = peripheral.characteristics();
    let writable = |c: &Characteristic| {
        c.properties
            .intersects(CharPropFlags::WRITE | CharPropFlags::WRITE_WITHOUT_RESPONSE)
    };

    for profile in profiles {
        if let Some(c) = characteristics.iter().find(|c| {
            c.service_uuid == profile.service
                && c.uuid == profile.write_characteristic
                && writable(c)
        }) {
            return Some(c.clone());
        }
    }
    let fallback = characteristics.iter().find(|c| writable(c)).cloned();
    if let Some(c) = &fallback {
        debug!("No known printer profile, falling back to {}", c.uuid);
    }
    fallback
}

async fn spawn_disconnect_watcher(
    adapter: Adapter,
    peripheral: &Peripheral,
    connected: Arc<AtomicBool>,
) -> Option<JoinHandle<()>> {
    let mut events = match adapter.events().await {
        Ok(events) => events,
        Err(e) => {
            warn!("Cannot watch for disconnects: {}", e);
            return None;
        }
    };
    let id = peripheral.id();
    Some(tokio::spawn(async move {
        while let Some(event) = events.next().await {
            if let CentralEvent::DeviceDisconnected(gone) = event
                && gone == id
            {
                info!("Printer reported disconnected");
                connected.store(false, Ordering::SeqCst);
                break;
            }
        }
    }))
}

/// An open btleplug connection.
pub struct BtleplugLink {
    candidate: DeviceCandidate,
    peripheral: Peripheral,
    characteristic: Characteristic,
    write_type: WriteType,
    max_write_len: usize,
    connected: Arc<AtomicBool>,
    watcher: Mutex<Option<JoinHandle<()>>>,
}

impl std::fmt::Debug for BtleplugLink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BtleplugLink")
            .field("candidate", &self.candidate)
            .field("characteristic", &self.characteristic.uuid)
            .field("write_type", &self.write_type)
            .finish_non_exhaustive()
    }
}

impl BtleplugLink {
    fn stop_watcher(&self) {
        if let Some(handle) = self.watcher.lock().unwrap_or_else(|e| e.into_inner()).take() {
            handle.abort();
        }
    }
}

#[async_trait]
impl PrinterLink for BtleplugLink {
    fn candidate(&self) -> &DeviceCandidate {
        &self.candidate
    }

    fn characteristic(&self) -> Uuid {
        self.characteristic.uuid
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    async fn probe(&self) -> bool {
        let alive = self.peripheral.is_connected().await.unwrap_or(false);
        if !alive {
            self.connected.store(false, Ordering::SeqCst);
        }
        alive
    }

    fn max_write_len(&self) -> usize {
        // btleplug does not report the negotiated MTU.
        self.max_write_len
    }

    async fn write_chunk(&self, chunk: &[u8]) -> Result<()> {
        self.peripheral
            .write(&self.characteristic, chunk, self.write_type)
            .await?;
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        self.stop_watcher();
        if self.connected.swap(false, Ordering::SeqCst) {
            info!("Disconnecting from printer...");
            match self.peripheral.disconnect().await {
                Ok(()) | Err(btleplug::Error::NotConnected) => {}
                Err(e) => return Err(e.into()),
            }
        }
        Ok(())
    }
}

impl Drop for BtleplugLink {
    fn drop(&mut self) {
        self.stop_watcher();
        if self.connected.swap(false, Ordering::SeqCst) {
            warn!(
                printer = %self.candidate.display_name(),
                "Printer link dropped without close() - performing best-effort cleanup"
            );
            let peripheral = self.peripheral.clone();
            if let Ok(runtime) = tokio::runtime::Handle::try_current() {
                runtime.spawn(async move {
                    let _ = peripheral.disconnect().await;
                });
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[tokio::test]
    async fn test_failed_setup_disconnects() {
        let calls = AtomicUsize::new(0);
        let setup: Result<()> = Err(Error::timeout("discover services", Duration::from_secs(5)));
        let result = disconnect_on_error(setup, || async {
            calls.fetch_add(1, Ordering::SeqCst);
            Ok(())
        })
        .await;
        assert!(matches!(result, Err(Error::Timeout { .. })));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_disconnect_failure_keeps_setup_error() {
        let setup: Result<()> = Err(Error::CharacteristicNotFound { service_count: 2 });
        let result =
            disconnect_on_error(setup, || async { Err(btleplug::Error::DeviceNotFound) }).await;
        assert!(matches!(
            result,
            Err(Error::CharacteristicNotFound { service_count: 2 })
        ));
    }

    #[tokio::test]
    async fn test_successful_setup_stays_connected() {
        let calls = AtomicUsize::new(0);
        let result = disconnect_on_error(Ok(7), || async {
            calls.fetch_add(1, Ordering::SeqCst);
            Ok(())
        })
        .await;
        assert_eq!(result.unwrap(), 7);
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }
}
