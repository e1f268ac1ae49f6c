//! Mock Bluetooth backend for testing.
//!
//! [`MockBackend`] implements [`BluetoothBackend`] entirely in memory, so the
//! manager and supervisor can be exercised without a printer.
//!
//! # Features
//!
//! - **Discovery control**: choose which devices are "known", which show up in
//!   a scan, and what the user picks in the chooser
//! - **Failure injection**: refuse opens, fail the Nth chunk write, drop the
//!   link silently, deny permission
//! - **Latency simulation**: delay opens and writes to widen race windows
//! - **Recording**: every delivered chunk, open/close counts and the highest
//!   number of concurrent opens and writes observed

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use uuid::Uuid;

use posprint_types::GattProfile;

use crate::error::{Error, NotFoundReason, Result};
use crate::traits::{BluetoothBackend, DeviceCandidate, PrinterLink};

/// What the simulated user does when the chooser opens.
#[derive(Debug, Clone)]
pub enum ChooserOutcome {
    /// Pick this device.
    Pick(DeviceCandidate),
    /// Dismiss the chooser.
    Cancel,
    /// The platform denies Bluetooth access.
    Deny,
}

#[derive(Debug)]
struct MockState {
    supported: AtomicBool,
    known: Mutex<Vec<DeviceCandidate>>,
    scannable: Mutex<Vec<DeviceCandidate>>,
    chooser: Mutex<ChooserOutcome>,
    refused: Mutex<HashSet<String>>,
    max_write_len: AtomicUsize,
    open_latency_ms: AtomicU64,
    write_latency_ms: AtomicU64,
    /// Absolute write-attempt number that fails (0 = none).
    fail_write_at: AtomicU32,
    write_attempts: AtomicU32,
    written: Mutex<Vec<Vec<u8>>>,
    links: Mutex<Vec<Arc<MockLink>>>,
    discovery_calls: AtomicU32,
    chooser_calls: AtomicU32,
    open_calls: AtomicU32,
    close_calls: AtomicU32,
    opens_in_flight: AtomicU32,
    max_opens_in_flight: AtomicU32,
    writes_in_flight: AtomicU32,
    max_writes_in_flight: AtomicU32,
}

fn lock<T>(m: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|e| e.into_inner())
}

fn enter(in_flight: &AtomicU32, max: &AtomicU32) {
    let now = in_flight.fetch_add(1, Ordering::SeqCst) + 1;
    max.fetch_max(now, Ordering::SeqCst);
}

/// An in-memory Bluetooth stack.
///
/// # Example
///
/// ```
/// use posprint_core::mock::MockBackend;
/// use posprint_core::traits::{BluetoothBackend, DeviceCandidate};
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() {
/// let backend = MockBackend::new()
///     .with_known(DeviceCandidate::new("AA:BB", Some("MPT-II".into())));
/// assert_eq!(backend.known_devices().await.unwrap().len(), 1);
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct MockBackend {
    state: Arc<MockState>,
}

impl Default for MockBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl MockBackend {
    /// A supported backend with no devices and a chooser that cancels.
    pub fn new() -> Self {
        Self {
            state: Arc::new(MockState {
                supported: AtomicBool::new(true),
                known: Mutex::new(Vec::new()),
                scannable: Mutex::new(Vec::new()),
                chooser: Mutex::new(ChooserOutcome::Cancel),
                refused: Mutex::new(HashSet::new()),
                max_write_len: AtomicUsize::new(20),
                open_latency_ms: AtomicU64::new(0),
                write_latency_ms: AtomicU64::new(0),
                fail_write_at: AtomicU32::new(0),
                write_attempts: AtomicU32::new(0),
                written: Mutex::new(Vec::new()),
                links: Mutex::new(Vec::new()),
                discovery_calls: AtomicU32::new(0),
                chooser_calls: AtomicU32::new(0),
                open_calls: AtomicU32::new(0),
                close_calls: AtomicU32::new(0),
                opens_in_flight: AtomicU32::new(0),
                max_opens_in_flight: AtomicU32::new(0),
                writes_in_flight: AtomicU32::new(0),
                max_writes_in_flight: AtomicU32::new(0),
            }),
        }
    }

    /// A printer the host was granted before.
    #[must_use]
    pub fn with_known(self, candidate: DeviceCandidate) -> Self {
        lock(&self.state.known).push(candidate);
        self
    }

    /// A printer that answers a silent scan.
    #[must_use]
    pub fn with_scannable(self, candidate: DeviceCandidate) -> Self {
        lock(&self.state.scannable).push(candidate);
        self
    }

    /// What the chooser returns.
    #[must_use]
    pub fn with_chooser(self, outcome: ChooserOutcome) -> Self {
        self.set_chooser(outcome);
        self
    }

    /// Bytes accepted per write.
    #[must_use]
    pub fn with_max_write_len(self, len: usize) -> Self {
        self.state.max_write_len.store(len, Ordering::SeqCst);
        self
    }

    /// Pretend the host has no Bluetooth.
    #[must_use]
    pub fn unsupported(self) -> Self {
        self.state.supported.store(false, Ordering::SeqCst);
        self
    }

    // --- Test control methods ---

    pub fn set_chooser(&self, outcome: ChooserOutcome) {
        *lock(&self.state.chooser) = outcome;
    }

    /// Make `open` fail for this identifier.
    pub fn refuse(&self, id: &str) {
        lock(&self.state.refused).insert(id.to_string());
    }

    /// Let `open` succeed again for this identifier.
    pub fn accept(&self, id: &str) {
        lock(&self.state.refused).remove(id);
    }

    /// Replace the scan results.
    pub fn set_scannable(&self, candidates: Vec<DeviceCandidate>) {
        *lock(&self.state.scannable) = candidates;
    }

    pub fn set_open_latency(&self, latency: Duration) {
        self.state
            .open_latency_ms
            .store(latency.as_millis() as u64, Ordering::SeqCst);
    }

    pub fn set_write_latency(&self, latency: Duration) {
        self.state
            .write_latency_ms
            .store(latency.as_millis() as u64, Ordering::SeqCst);
    }

    /// Fail the `n`th chunk write from now (1-based).
    pub fn fail_write_at(&self, n: u32) {
        let base = self.state.write_attempts.load(Ordering::SeqCst);
        self.state.fail_write_at.store(base + n, Ordering::SeqCst);
    }

    /// Silently drop every open link, as when a printer is switched off.
    pub fn drop_connections(&self) {
        for link in lock(&self.state.links).iter() {
            link.connected.store(false, Ordering::SeqCst);
        }
    }

    // --- Recordings ---

    /// Chunks successfully written, in order.
    pub fn written_chunks(&self) -> Vec<Vec<u8>> {
        lock(&self.state.written).clone()
    }

    /// All successfully written bytes concatenated.
    pub fn written_bytes(&self) -> Vec<u8> {
        lock(&self.state.written).concat()
    }

    pub fn clear_written(&self) {
        lock(&self.state.written).clear();
    }

    /// Chunk writes attempted, including failed ones.
    pub fn write_attempts(&self) -> u32 {
        self.state.write_attempts.load(Ordering::SeqCst)
    }

    /// Calls to `known_devices` plus calls to `scan`.
    pub fn discovery_calls(&self) -> u32 {
        self.state.discovery_calls.load(Ordering::SeqCst)
    }

    pub fn chooser_calls(&self) -> u32 {
        self.state.chooser_calls.load(Ordering::SeqCst)
    }

    pub fn open_calls(&self) -> u32 {
        self.state.open_calls.load(Ordering::SeqCst)
    }

    pub fn close_calls(&self) -> u32 {
        self.state.close_calls.load(Ordering::SeqCst)
    }

    /// Links currently reporting connected.
    pub fn live_links(&self) -> usize {
        lock(&self.state.links)
            .iter()
            .filter(|l| l.connected.load(Ordering::SeqCst))
            .count()
    }

    pub fn max_concurrent_opens(&self) -> u32 {
        self.state.max_opens_in_flight.load(Ordering::SeqCst)
    }

    pub fn max_concurrent_writes(&self) -> u32 {
        self.state.max_writes_in_flight.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl BluetoothBackend for MockBackend {
    fn is_supported(&self) -> bool {
        self.state.supported.load(Ordering::SeqCst)
    }

    async fn known_devices(&self) -> Result<Vec<DeviceCandidate>> {
        self.state.discovery_calls.fetch_add(1, Ordering::SeqCst);
        Ok(lock(&self.state.known).clone())
    }

    async fn scan(&self, _services: &[Uuid]) -> Result<Vec<DeviceCandidate>> {
        self.state.discovery_calls.fetch_add(1, Ordering::SeqCst);
        Ok(lock(&self.state.scannable).clone())
    }

    async fn request_device(&self, _services: &[Uuid]) -> Result<DeviceCandidate> {
        self.state.chooser_calls.fetch_add(1, Ordering::SeqCst);
        let outcome = lock(&self.state.chooser).clone();
        match outcome {
            ChooserOutcome::Pick(candidate) => Ok(candidate),
            ChooserOutcome::Cancel => Err(Error::NotFound(NotFoundReason::ChooserCancelled)),
            ChooserOutcome::Deny => Err(Error::PermissionDenied(
                "mock platform denied access".to_string(),
            )),
        }
    }

    async fn open(
        &self,
        candidate: &DeviceCandidate,
        profiles: &[GattProfile],
    ) -> Result<Arc<dyn PrinterLink>> {
        self.state.open_calls.fetch_add(1, Ordering::SeqCst);
        enter(&self.state.opens_in_flight, &self.state.max_opens_in_flight);

        let latency = self.state.open_latency_ms.load(Ordering::SeqCst);
        if latency > 0 {
            tokio::time::sleep(Duration::from_millis(latency)).await;
        }
        self.state.opens_in_flight.fetch_sub(1, Ordering::SeqCst);

        if lock(&self.state.refused).contains(&candidate.id) {
            return Err(Error::connection_failed(
                Some(candidate.id.clone()),
                "mock device refused connection",
            ));
        }
        let characteristic = profiles
            .first()
            .map(|p| p.write_characteristic)
            .ok_or(Error::CharacteristicNotFound { service_count: 0 })?;

        let link = Arc::new(MockLink {
            candidate: candidate.clone(),
            characteristic,
            connected: AtomicBool::new(true),
            closed: AtomicBool::new(false),
            state: Arc::clone(&self.state),
        });
        lock(&self.state.links).push(Arc::clone(&link));
        Ok(link)
    }
}

/// A link produced by [`MockBackend::open`].
#[derive(Debug)]
pub struct MockLink {
    candidate: DeviceCandidate,
    characteristic: Uuid,
    connected: AtomicBool,
    closed: AtomicBool,
    state: Arc<MockState>,
}

#[async_trait]
impl PrinterLink for MockLink {
    fn candidate(&self) -> &DeviceCandidate {
        &self.candidate
    }

    fn characteristic(&self) -> Uuid {
        self.characteristic
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    async fn probe(&self) -> bool {
        self.is_connected()
    }

    fn max_write_len(&self) -> usize {
        self.state.max_write_len.load(Ordering::SeqCst)
    }

    async fn write_chunk(&self, chunk: &[u8]) -> Result<()> {
        if !self.is_connected() {
            return Err(Error::ConnectionLost);
        }
        let attempt = self.state.write_attempts.fetch_add(1, Ordering::SeqCst) + 1;
        enter(&self.state.writes_in_flight, &self.state.max_writes_in_flight);

        let latency = self.state.write_latency_ms.load(Ordering::SeqCst);
        if latency > 0 {
            tokio::time::sleep(Duration::from_millis(latency)).await;
        }
        self.state.writes_in_flight.fetch_sub(1, Ordering::SeqCst);

        if self.state.fail_write_at.load(Ordering::SeqCst) == attempt {
            return Err(Error::connection_failed(
                Some(self.candidate.id.clone()),
                "mock write rejected",
            ));
        }
        if chunk.len() > self.max_write_len() {
            return Err(Error::connection_failed(
                Some(self.candidate.id.clone()),
                format!("chunk of {} bytes exceeds write length", chunk.len()),
            ));
        }
        lock(&self.state.written).push(chunk.to_vec());
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        self.connected.store(false, Ordering::SeqCst);
        // Counted once per link, whether or not it had already dropped.
        if !self.closed.swap(true, Ordering::SeqCst) {
            self.state.close_calls.fetch_add(1, Ordering::SeqCst);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use posprint_types::uuid::KNOWN_PROFILES;

    fn printer(id: &str) -> DeviceCandidate {
        DeviceCandidate::new(id, Some(format!("Printer {}", id)))
    }

    #[tokio::test]
    async fn test_open_and_write() {
        let backend = MockBackend::new();
        let link = backend.open(&printer("A"), &KNOWN_PROFILES).await.unwrap();
        assert!(link.is_connected());
        assert_eq!(link.characteristic(), KNOWN_PROFILES[0].write_characteristic);
        link.write_chunk(b"hello").await.unwrap();
        assert_eq!(backend.written_bytes(), b"hello");
    }

    #[tokio::test]
    async fn test_refused_open() {
        let backend = MockBackend::new();
        backend.refuse("A");
        assert!(backend.open(&printer("A"), &KNOWN_PROFILES).await.is_err());
        backend.accept("A");
        assert!(backend.open(&printer("A"), &KNOWN_PROFILES).await.is_ok());
    }

    #[tokio::test]
    async fn test_chooser_outcomes() {
        let backend = MockBackend::new();
        let err = backend.request_device(&[]).await.unwrap_err();
        assert!(matches!(err, Error::NotFound(NotFoundReason::ChooserCancelled)));

        backend.set_chooser(ChooserOutcome::Deny);
        let err = backend.request_device(&[]).await.unwrap_err();
        assert!(matches!(err, Error::PermissionDenied(_)));

        backend.set_chooser(ChooserOutcome::Pick(printer("B")));
        assert_eq!(backend.request_device(&[]).await.unwrap().id, "B");
        assert_eq!(backend.chooser_calls(), 3);
    }

    #[tokio::test]
    async fn test_fail_write_at() {
        let backend = MockBackend::new();
        let link = backend.open(&printer("A"), &KNOWN_PROFILES).await.unwrap();
        backend.fail_write_at(2);
        assert!(link.write_chunk(b"1").await.is_ok());
        assert!(link.write_chunk(b"2").await.is_err());
        assert!(link.write_chunk(b"3").await.is_ok());
        assert_eq!(backend.written_chunks(), vec![b"1".to_vec(), b"3".to_vec()]);
    }

    #[tokio::test]
    async fn test_drop_connections() {
        let backend = MockBackend::new();
        let link = backend.open(&printer("A"), &KNOWN_PROFILES).await.unwrap();
        backend.drop_connections();
        assert!(!link.is_connected());
        assert!(!link.probe().await);
        assert!(matches!(
            link.write_chunk(b"x").await,
            Err(Error::ConnectionLost)
        ));
    }

    #[tokio::test]
    async fn test_close_is_idempotent() {
        let backend = MockBackend::new();
        let link = backend.open(&printer("A"), &KNOWN_PROFILES).await.unwrap();
        link.close().await.unwrap();
        link.close().await.unwrap();
        assert_eq!(backend.close_calls(), 1);
        assert_eq!(backend.live_links(), 0);
    }

    #[tokio::test]
    async fn test_close_counts_dropped_link() {
        let backend = MockBackend::new();
        let link = backend.open(&printer("A"), &KNOWN_PROFILES).await.unwrap();
        backend.drop_connections();
        link.close().await.unwrap();
        assert_eq!(backend.close_calls(), 1);
    }
}
