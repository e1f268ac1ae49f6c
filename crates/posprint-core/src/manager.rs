//! Connection manager for a single thermal printer.
//!
//! [`PrinterManager`] owns at most one live [`PrinterLink`]. It finds a
//! printer without user interaction when it can, falls back to the chooser
//! when asked to, and streams payloads in chunks no larger than the link
//! accepts.
//!
//! Connect attempts are serialized: a second caller waits for the attempt in
//! flight and reuses its result instead of opening another GATT session.
//! Writes are serialized too, so two documents never interleave on paper.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};

use tokio::sync::{Mutex, MutexGuard};
use tokio::time::timeout;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::ConnectionConfig;
use crate::error::{Error, Result};
use crate::events::{
    ConnectMethod, DisconnectReason, EventDispatcher, EventReceiver, PrinterEvent, PrinterId,
};
use crate::traits::{BluetoothBackend, DeviceCandidate, PrinterLink};
use crate::util::chunk_count;

/// Connection state of the managed printer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionStatus {
    #[default]
    Disconnected,
    Connecting,
    Connected,
    /// The last attempt failed for a reason other than "nothing found".
    Error,
}

/// Snapshot of the connected printer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrinterDevice {
    /// Platform identifier.
    pub id: String,
    /// Advertised name.
    pub name: Option<String>,
    /// Characteristic payloads are written to.
    pub characteristic: Uuid,
    /// Bytes per write on this link.
    pub max_write_len: usize,
    pub status: ConnectionStatus,
}

impl PrinterDevice {
    fn from_link(link: &dyn PrinterLink, status: ConnectionStatus) -> Self {
        let candidate = link.candidate();
        Self {
            id: candidate.id.clone(),
            name: candidate.name.clone(),
            characteristic: link.characteristic(),
            max_write_len: link.max_write_len(),
            status,
        }
    }

    /// Name for display, falling back to the identifier.
    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or(&self.id)
    }
}

fn printer_id(candidate: &DeviceCandidate) -> PrinterId {
    PrinterId::new(candidate.id.clone(), candidate.name.clone())
}

/// Clears the connecting flag when a connect attempt ends, however it ends.
struct ConnectingFlag<'a>(&'a AtomicBool);

impl<'a> ConnectingFlag<'a> {
    fn raise(flag: &'a AtomicBool) -> Self {
        flag.store(true, Ordering::SeqCst);
        Self(flag)
    }
}

impl Drop for ConnectingFlag<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

/// Manager for the printer connection.
pub struct PrinterManager {
    backend: Arc<dyn BluetoothBackend>,
    config: ConnectionConfig,
    events: EventDispatcher,
    link: RwLock<Option<Arc<dyn PrinterLink>>>,
    status: RwLock<ConnectionStatus>,
    connecting: AtomicBool,
    connect_gate: Mutex<()>,
    write_gate: Mutex<()>,
}

impl std::fmt::Debug for PrinterManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PrinterManager")
            .field("status", &self.status())
            .field("device", &self.device())
            .finish_non_exhaustive()
    }
}

impl PrinterManager {
    /// Create a manager over `backend`.
    ///
    /// Returns [`Error::InvalidConfig`] if `config` does not validate.
    pub fn new(backend: Arc<dyn BluetoothBackend>, config: ConnectionConfig) -> Result<Self> {
        Self::with_events(backend, config, EventDispatcher::default())
    }

    /// Create a manager that publishes on an existing dispatcher.
    pub fn with_events(
        backend: Arc<dyn BluetoothBackend>,
        config: ConnectionConfig,
        events: EventDispatcher,
    ) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            backend,
            config,
            events,
            link: RwLock::new(None),
            status: RwLock::new(ConnectionStatus::Disconnected),
            connecting: AtomicBool::new(false),
            connect_gate: Mutex::new(()),
            write_gate: Mutex::new(()),
        })
    }

    /// Subscribe to connection and print events.
    pub fn subscribe(&self) -> EventReceiver {
        self.events.subscribe()
    }

    /// The dispatcher this manager publishes on.
    pub fn events(&self) -> &EventDispatcher {
        &self.events
    }

    pub fn config(&self) -> &ConnectionConfig {
        &self.config
    }

    /// Whether the host exposes a usable Bluetooth API. No side effects.
    pub fn is_supported(&self) -> bool {
        self.backend.is_supported()
    }

    /// Whether a printer link is live right now.
    pub fn is_connected(&self) -> bool {
        self.current_link().is_some_and(|link| link.is_connected())
    }

    /// Whether a connect attempt is in flight.
    pub fn is_connecting(&self) -> bool {
        self.connecting.load(Ordering::SeqCst)
    }

    pub fn status(&self) -> ConnectionStatus {
        *self.status.read().unwrap_or_else(|e| e.into_inner())
    }

    /// The connected printer, if any.
    pub fn device(&self) -> Option<PrinterDevice> {
        let link = self.current_link()?;
        Some(PrinterDevice::from_link(link.as_ref(), self.status()))
    }

    fn current_link(&self) -> Option<Arc<dyn PrinterLink>> {
        self.link.read().unwrap_or_else(|e| e.into_inner()).clone()
    }

    fn set_status(&self, status: ConnectionStatus) {
        *self.status.write().unwrap_or_else(|e| e.into_inner()) = status;
    }

    fn services(&self) -> Vec<Uuid> {
        self.config.profiles.iter().map(|p| p.service).collect()
    }

    /// Take the connect gate. The flag is `true` if another attempt held it.
    async fn enter_connect(&self) -> (MutexGuard<'_, ()>, bool) {
        match self.connect_gate.try_lock() {
            Ok(guard) => (guard, false),
            Err(_) => {
                debug!("Connect already in flight, waiting for it");
                (self.connect_gate.lock().await, true)
            }
        }
    }

    fn install(&self, link: Arc<dyn PrinterLink>, method: ConnectMethod) -> PrinterDevice {
        let device = PrinterDevice::from_link(link.as_ref(), ConnectionStatus::Connected);
        let printer = printer_id(link.candidate());
        *self.link.write().unwrap_or_else(|e| e.into_inner()) = Some(link);
        self.set_status(ConnectionStatus::Connected);
        info!(
            printer = %device.display_name(),
            characteristic = %device.characteristic,
            ?method,
            "Printer connected"
        );
        self.events.send(PrinterEvent::Connected { printer, method });
        device
    }

    /// Remove `link` if it is still the active one, close it and announce why.
    async fn release(&self, link: &Arc<dyn PrinterLink>, reason: DisconnectReason) {
        let removed = {
            let mut slot = self.link.write().unwrap_or_else(|e| e.into_inner());
            match slot.as_ref() {
                Some(current) if Arc::ptr_eq(current, link) => slot.take(),
                _ => None,
            }
        };
        if removed.is_none() {
            return;
        }
        if let Err(e) = link.close().await {
            warn!("Error closing printer link: {}", e);
        }
        self.set_status(ConnectionStatus::Disconnected);
        info!(printer = %link.candidate().display_name(), ?reason, "Printer disconnected");
        self.events.send(PrinterEvent::Disconnected {
            printer: printer_id(link.candidate()),
            reason,
        });
    }

    /// Release a link the platform already reports as gone, so a new one
    /// never silently overwrites it.
    async fn release_stale(&self) {
        if let Some(link) = self.current_link().filter(|link| !link.is_connected()) {
            debug!("Releasing stale printer link before reconnecting");
            self.release(&link, DisconnectReason::ConnectionLost).await;
        }
    }

    fn report_failure(&self, err: &Error) {
        self.set_status(match err.kind() {
            crate::ErrorKind::NotFound => ConnectionStatus::Disconnected,
            _ => ConnectionStatus::Error,
        });
        self.events.send(PrinterEvent::ConnectFailed {
            kind: err.kind(),
            message: err.to_string(),
        });
    }

    /// Connect without user interaction.
    ///
    /// Tries remembered printers first, then a silent scan filtered by the
    /// configured printer services. Returns `Ok(true)` when a printer is
    /// connected (including one that already was), `Ok(false)` when nothing
    /// could be reached. Never opens the chooser.
    #[tracing::instrument(level = "info", skip(self))]
    pub async fn auto_discover_and_connect(&self) -> Result<bool> {
        if !self.is_supported() {
            return Err(Error::Unsupported("no Bluetooth adapter available".into()));
        }
        let (_gate, _waited) = self.enter_connect().await;
        if self.is_connected() {
            return Ok(true);
        }
        self.release_stale().await;
        let _flag = ConnectingFlag::raise(&self.connecting);
        self.set_status(ConnectionStatus::Connecting);

        match self.discover_silently().await {
            Ok(Some(device)) => {
                debug!("Auto-connected to {}", device.display_name());
                Ok(true)
            }
            Ok(None) => {
                info!("No printer reachable without prompting");
                self.set_status(ConnectionStatus::Disconnected);
                Ok(false)
            }
            Err(e) => {
                self.report_failure(&e);
                Err(e)
            }
        }
    }

    async fn discover_silently(&self) -> Result<Option<PrinterDevice>> {
        let known = self.backend.known_devices().await?;
        let mut tried: Vec<String> = Vec::new();
        for candidate in known {
            tried.push(candidate.id.clone());
            if let Some(device) = self.try_open(&candidate, ConnectMethod::Known).await? {
                return Ok(Some(device));
            }
        }

        let scanned = self.backend.scan(&self.services()).await?;
        for candidate in scanned {
            if tried.contains(&candidate.id) {
                continue;
            }
            tried.push(candidate.id.clone());
            if let Some(device) = self.try_open(&candidate, ConnectMethod::Scan).await? {
                return Ok(Some(device));
            }
        }
        Ok(None)
    }

    /// Open one candidate. Retryable failures are logged and skipped.
    async fn try_open(
        &self,
        candidate: &DeviceCandidate,
        method: ConnectMethod,
    ) -> Result<Option<PrinterDevice>> {
        match self.backend.open(candidate, &self.config.profiles).await {
            Ok(link) => Ok(Some(self.install(link, method))),
            Err(e) if e.is_retryable() => {
                warn!(printer = %candidate.display_name(), "Could not open printer: {}", e);
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    /// Connect through the device chooser.
    ///
    /// Replaces any current connection with the chosen printer. If another
    /// connect was in flight and left a live printer behind, that printer is
    /// returned without prompting.
    #[tracing::instrument(level = "info", skip(self))]
    pub async fn connect(&self) -> Result<PrinterDevice> {
        if !self.is_supported() {
            return Err(Error::Unsupported("no Bluetooth adapter available".into()));
        }
        let (_gate, waited) = self.enter_connect().await;
        if waited && let Some(device) = self.device().filter(|_| self.is_connected()) {
            return Ok(device);
        }
        self.release_stale().await;
        let _flag = ConnectingFlag::raise(&self.connecting);
        let previous = self.status();
        self.set_status(ConnectionStatus::Connecting);

        let candidate = match self.backend.request_device(&self.services()).await {
            Ok(candidate) => candidate,
            Err(e) => {
                if self.is_connected() {
                    // Nothing chosen, the existing printer stays.
                    self.set_status(previous);
                    self.events.send(PrinterEvent::ConnectFailed {
                        kind: e.kind(),
                        message: e.to_string(),
                    });
                } else {
                    self.report_failure(&e);
                }
                return Err(e);
            }
        };

        if let Some(old) = self.current_link() {
            self.release(&old, DisconnectReason::Replaced).await;
            self.set_status(ConnectionStatus::Connecting);
        }

        match self.backend.open(&candidate, &self.config.profiles).await {
            Ok(link) => Ok(self.install(link, ConnectMethod::Chooser)),
            Err(e) => {
                self.report_failure(&e);
                Err(e)
            }
        }
    }

    /// Close the active link. A no-op when nothing is connected.
    pub async fn disconnect(&self) {
        match self.current_link() {
            Some(link) => self.release(&link, DisconnectReason::UserRequested).await,
            None => self.set_status(ConnectionStatus::Disconnected),
        }
    }

    /// Ask the platform whether the link is still up.
    ///
    /// A dead link is dropped and announced with
    /// [`DisconnectReason::ConnectionLost`].
    pub async fn check_connection(&self) -> bool {
        let Some(link) = self.current_link() else {
            return false;
        };
        let alive = link.is_connected() && link.probe().await;
        if !alive {
            self.release(&link, DisconnectReason::ConnectionLost).await;
        }
        alive
    }

    /// Write `data` to the printer in order, one chunk at a time.
    ///
    /// Returns the number of chunks delivered. The first failed chunk aborts
    /// the rest of the payload, drops the link, and yields
    /// [`Error::WriteFailed`] carrying its 1-based index.
    pub async fn write(&self, data: &[u8]) -> Result<usize> {
        let _serial = self.write_gate.lock().await;
        let link = self
            .current_link()
            .filter(|link| link.is_connected())
            .ok_or(Error::NotConnected)?;

        let size = link.max_write_len().min(self.config.chunk_size).max(1);
        let total = chunk_count(data.len(), size);
        debug!("Writing {} bytes in {} chunk(s) of {}", data.len(), total, size);

        for (index, chunk) in data.chunks(size).enumerate() {
            let reason = if !link.is_connected() {
                Some("printer disconnected".to_string())
            } else {
                match timeout(self.config.write_timeout, link.write_chunk(chunk)).await {
                    Ok(Ok(())) => None,
                    Ok(Err(e)) => Some(e.to_string()),
                    Err(_) => Some(format!("timed out after {:?}", self.config.write_timeout)),
                }
            };
            if let Some(reason) = reason {
                warn!("Write failed at chunk {}/{}: {}", index + 1, total, reason);
                self.release(&link, DisconnectReason::WriteFailed).await;
                return Err(Error::WriteFailed {
                    chunk: index + 1,
                    total,
                    reason,
                });
            }
        }
        Ok(total)
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::error::NotFoundReason;
    use crate::mock::{ChooserOutcome, MockBackend};

    fn printer(id: &str) -> DeviceCandidate {
        DeviceCandidate::new(id, Some(format!("Printer {}", id)))
    }

    fn manager(backend: &MockBackend) -> PrinterManager {
        PrinterManager::new(Arc::new(backend.clone()), ConnectionConfig::default()).unwrap()
    }

    #[tokio::test]
    async fn test_auto_connect_prefers_known() {
        let backend = MockBackend::new()
            .with_known(printer("known"))
            .with_scannable(printer("scanned"));
        let manager = manager(&backend);
        let mut rx = manager.subscribe();

        assert!(manager.auto_discover_and_connect().await.unwrap());
        assert_eq!(manager.device().unwrap().id, "known");
        assert_eq!(manager.status(), ConnectionStatus::Connected);
        assert_eq!(backend.chooser_calls(), 0);
        match rx.recv().await.unwrap() {
            PrinterEvent::Connected { method, .. } => assert_eq!(method, ConnectMethod::Known),
            other => panic!("unexpected event: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_auto_connect_falls_back_to_scan() {
        let backend = MockBackend::new()
            .with_known(printer("known"))
            .with_scannable(printer("scanned"));
        backend.refuse("known");
        let manager = manager(&backend);

        assert!(manager.auto_discover_and_connect().await.unwrap());
        assert_eq!(manager.device().unwrap().id, "scanned");
    }

    #[tokio::test]
    async fn test_auto_connect_nothing_found() {
        let backend = MockBackend::new();
        let manager = manager(&backend);
        assert!(!manager.auto_discover_and_connect().await.unwrap());
        assert!(!manager.is_connected());
        assert_eq!(manager.status(), ConnectionStatus::Disconnected);
        assert_eq!(backend.chooser_calls(), 0);
    }

    #[tokio::test]
    async fn test_auto_connect_when_connected_is_noop() {
        let backend = MockBackend::new().with_known(printer("A"));
        let manager = manager(&backend);
        assert!(manager.auto_discover_and_connect().await.unwrap());
        assert!(manager.auto_discover_and_connect().await.unwrap());
        assert_eq!(backend.open_calls(), 1);
    }

    #[tokio::test]
    async fn test_unsupported() {
        let backend = MockBackend::new().unsupported();
        let manager = manager(&backend);
        assert!(!manager.is_supported());
        let err = manager.auto_discover_and_connect().await.unwrap_err();
        assert_eq!(err.kind(), crate::ErrorKind::Unsupported);
        let err = manager.connect().await.unwrap_err();
        assert_eq!(err.kind(), crate::ErrorKind::Unsupported);
    }

    #[tokio::test]
    async fn test_manual_connect_cancelled() {
        let backend = MockBackend::new();
        let manager = manager(&backend);
        let err = manager.connect().await.unwrap_err();
        assert!(matches!(err, Error::NotFound(NotFoundReason::ChooserCancelled)));
        assert!(!manager.is_connected());
        assert!(!manager.is_connecting());
    }

    #[tokio::test]
    async fn test_manual_connect_replaces_existing() {
        let backend = MockBackend::new()
            .with_known(printer("A"))
            .with_chooser(ChooserOutcome::Pick(printer("B")));
        let manager = manager(&backend);
        manager.auto_discover_and_connect().await.unwrap();

        let device = manager.connect().await.unwrap();
        assert_eq!(device.id, "B");
        assert_eq!(backend.live_links(), 1);
        assert_eq!(backend.close_calls(), 1);
    }

    #[tokio::test]
    async fn test_cancelled_chooser_keeps_existing() {
        let backend = MockBackend::new().with_known(printer("A"));
        let manager = manager(&backend);
        manager.auto_discover_and_connect().await.unwrap();

        assert!(manager.connect().await.is_err());
        assert!(manager.is_connected());
        assert_eq!(manager.status(), ConnectionStatus::Connected);
    }

    #[tokio::test]
    async fn test_chooser_connect_releases_dropped_link() {
        let backend = MockBackend::new()
            .with_known(printer("A"))
            .with_chooser(ChooserOutcome::Pick(printer("B")));
        let manager = manager(&backend);
        manager.auto_discover_and_connect().await.unwrap();
        let mut rx = manager.subscribe();

        backend.drop_connections();
        let device = manager.connect().await.unwrap();
        assert_eq!(device.id, "B");
        assert_eq!(backend.close_calls(), 1);
        let lost = std::iter::from_fn(|| rx.try_recv().ok()).any(|e| {
            matches!(
                e,
                PrinterEvent::Disconnected {
                    reason: DisconnectReason::ConnectionLost,
                    ..
                }
            )
        });
        assert!(lost);
    }

    #[tokio::test]
    async fn test_disconnect_is_idempotent() {
        let backend = MockBackend::new().with_known(printer("A"));
        let manager = manager(&backend);
        manager.disconnect().await;
        manager.auto_discover_and_connect().await.unwrap();
        manager.disconnect().await;
        manager.disconnect().await;
        assert!(!manager.is_connected());
        assert!(manager.device().is_none());
        assert_eq!(backend.close_calls(), 1);
    }

    #[tokio::test]
    async fn test_write_chunks_in_order() {
        let backend = MockBackend::new().with_known(printer("A"));
        let manager = manager(&backend);
        manager.auto_discover_and_connect().await.unwrap();

        let data: Vec<u8> = (0..=99).collect();
        assert_eq!(manager.write(&data).await.unwrap(), 5);
        let chunks = backend.written_chunks();
        assert_eq!(chunks.len(), 5);
        assert!(chunks.iter().all(|c| c.len() <= 20));
        assert_eq!(backend.written_bytes(), data);
    }

    #[tokio::test]
    async fn test_write_not_connected() {
        let backend = MockBackend::new();
        let manager = manager(&backend);
        assert!(matches!(
            manager.write(b"x").await,
            Err(Error::NotConnected)
        ));
    }

    #[tokio::test]
    async fn test_write_failure_aborts_and_disconnects() {
        let backend = MockBackend::new().with_known(printer("A"));
        let manager = manager(&backend);
        manager.auto_discover_and_connect().await.unwrap();
        backend.fail_write_at(2);

        let data = vec![0xAA; 100];
        match manager.write(&data).await {
            Err(Error::WriteFailed { chunk, total, .. }) => {
                assert_eq!(chunk, 2);
                assert_eq!(total, 5);
            }
            other => panic!("unexpected result: {:?}", other),
        }
        assert_eq!(backend.written_chunks().len(), 1);
        assert_eq!(backend.write_attempts(), 2);
        assert!(!manager.is_connected());
    }

    #[tokio::test]
    async fn test_check_connection_detects_drop() {
        let backend = MockBackend::new().with_known(printer("A"));
        let manager = manager(&backend);
        manager.auto_discover_and_connect().await.unwrap();
        let mut rx = manager.subscribe();

        assert!(manager.check_connection().await);
        backend.drop_connections();
        assert!(!manager.check_connection().await);
        assert!(manager.device().is_none());
        match rx.recv().await.unwrap() {
            PrinterEvent::Disconnected { reason, .. } => {
                assert_eq!(reason, DisconnectReason::ConnectionLost)
            }
            other => panic!("unexpected event: {:?}", other),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_connects_share_one_session() {
        let backend = MockBackend::new().with_known(printer("A"));
        backend.set_open_latency(Duration::from_millis(500));
        let manager = Arc::new(manager(&backend));

        let a = tokio::spawn({
            let m = Arc::clone(&manager);
            async move { m.auto_discover_and_connect().await }
        });
        let b = tokio::spawn({
            let m = Arc::clone(&manager);
            async move { m.auto_discover_and_connect().await }
        });
        assert!(a.await.unwrap().unwrap());
        assert!(b.await.unwrap().unwrap());
        assert_eq!(backend.open_calls(), 1);
        assert_eq!(backend.max_concurrent_opens(), 1);
    }
}
