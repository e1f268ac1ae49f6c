//! Connection supervisor.
//!
//! [`PrinterSupervisor`] wraps a [`PrinterManager`] with the application's
//! connection policy: an auto-connect attempt at startup, a bounded number of
//! scheduled retries while disconnected, a health poll while connected, and
//! connect-on-demand when something is printed. It is also the contract the
//! UI layer talks to.
//!
//! ```text
//!            start()
//!   Idle ──────────────▶ AutoConnecting ──ok──▶ Connected
//!                            │    ▲                 │
//!                      failed│    │retry timer      │poll finds link down
//!                            ▼    │                 │
//!                        AwaitingManual ◀───────────┘
//!
//!   any state ── disconnect() ──▶ Disconnected
//! ```
//!
//! The background task is owned by the supervisor. [`shutdown`](PrinterSupervisor::shutdown)
//! cancels it and waits for it; dropping the supervisor cancels it too.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use posprint_types::{Invoice, KotTicket, PrintableDocument, TestPage};

use crate::config::SupervisorConfig;
use crate::encoder::{DocumentEncoder, EncodedPayload};
use crate::error::{Error, ErrorKind, NotFoundReason, Result};
use crate::events::{EventReceiver, PrinterEvent, PrinterId};
use crate::manager::{PrinterDevice, PrinterManager};

/// Supervisor state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SupervisorState {
    /// Not started yet.
    #[default]
    Idle,
    /// An automatic connect attempt is running.
    AutoConnecting,
    /// Not connected; retries run on a timer while budget remains.
    AwaitingManual,
    Connected,
    /// The user disconnected. Nothing is scheduled until the next explicit action.
    Disconnected,
    /// The host has no Bluetooth. Nothing is ever scheduled.
    Unsupported,
}

/// Retry bookkeeping for the current session.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ConnectionPolicyState {
    pub has_attempted_auto_connect: bool,
    /// Scheduled retries used since the last live connection.
    pub retry_count: u32,
    pub is_connecting: bool,
}

/// Everything a UI needs to draw the printer affordance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SupervisorStatus {
    pub state: SupervisorState,
    pub is_supported: bool,
    pub is_connected: bool,
    pub is_connecting: bool,
    pub is_printing: bool,
    pub policy: ConnectionPolicyState,
    pub printer: Option<PrinterId>,
}

/// Outcome of a successful print.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrintReport {
    pub document: String,
    pub bytes: usize,
    pub chunks: usize,
}

struct Inner {
    manager: Arc<PrinterManager>,
    encoder: DocumentEncoder,
    config: SupervisorConfig,
    state: RwLock<SupervisorState>,
    policy: Mutex<ConnectionPolicyState>,
    printing: AtomicUsize,
    wake: Notify,
}

struct Background {
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

/// Application-lifetime connection policy around one [`PrinterManager`].
pub struct PrinterSupervisor {
    inner: Arc<Inner>,
    background: Mutex<Option<Background>>,
}

impl std::fmt::Debug for PrinterSupervisor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PrinterSupervisor")
            .field("status", &self.status())
            .finish_non_exhaustive()
    }
}

/// Decrements the in-flight print count when a print ends.
struct PrintingGuard<'a>(&'a AtomicUsize);

impl<'a> PrintingGuard<'a> {
    fn enter(count: &'a AtomicUsize) -> Self {
        count.fetch_add(1, Ordering::SeqCst);
        Self(count)
    }
}

impl Drop for PrintingGuard<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

impl PrinterSupervisor {
    /// Create a supervisor. Nothing runs until [`start`](Self::start).
    pub fn new(
        manager: Arc<PrinterManager>,
        encoder: DocumentEncoder,
        config: SupervisorConfig,
    ) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            inner: Arc::new(Inner {
                manager,
                encoder,
                config,
                state: RwLock::new(SupervisorState::Idle),
                policy: Mutex::new(ConnectionPolicyState::default()),
                printing: AtomicUsize::new(0),
                wake: Notify::new(),
            }),
            background: Mutex::new(None),
        })
    }

    pub fn manager(&self) -> &Arc<PrinterManager> {
        &self.inner.manager
    }

    pub fn encoder(&self) -> &DocumentEncoder {
        &self.inner.encoder
    }

    /// Subscribe to connection, state and print events.
    pub fn subscribe(&self) -> EventReceiver {
        self.inner.manager.subscribe()
    }

    /// Start the background task: one auto-connect attempt, then retries and
    /// health polls. Calling it again while running does nothing.
    pub fn start(&self) {
        let mut background = self.background.lock().unwrap_or_else(|e| e.into_inner());
        if background.as_ref().is_some_and(|b| !b.handle.is_finished()) {
            return;
        }
        let cancel = CancellationToken::new();
        let handle = tokio::spawn(run(Arc::clone(&self.inner), cancel.clone()));
        *background = Some(Background { cancel, handle });
    }

    /// Whether the background task is alive.
    pub fn is_running(&self) -> bool {
        self.background
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .as_ref()
            .is_some_and(|b| !b.handle.is_finished())
    }

    /// Cancel all scheduled work and wait for the background task to exit.
    /// The printer connection itself is left as it is.
    pub async fn shutdown(&self) {
        let background = self
            .background
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take();
        if let Some(Background { cancel, handle }) = background {
            cancel.cancel();
            if let Err(e) = handle.await
                && !e.is_cancelled()
            {
                warn!("Supervisor task ended abnormally: {}", e);
            }
        }
    }

    pub fn state(&self) -> SupervisorState {
        self.inner.state()
    }

    pub fn policy(&self) -> ConnectionPolicyState {
        let mut policy = *self.inner.policy();
        policy.is_connecting = self.is_connecting();
        policy
    }

    pub fn is_supported(&self) -> bool {
        self.inner.manager.is_supported()
    }

    pub fn is_connected(&self) -> bool {
        self.inner.manager.is_connected()
    }

    pub fn is_connecting(&self) -> bool {
        self.inner.manager.is_connecting()
    }

    pub fn is_printing(&self) -> bool {
        self.inner.printing.load(Ordering::SeqCst) > 0
    }

    /// Snapshot for the UI.
    pub fn status(&self) -> SupervisorStatus {
        let printer = self
            .inner
            .manager
            .device()
            .map(|d| PrinterId::new(d.id, d.name));
        SupervisorStatus {
            state: self.state(),
            is_supported: self.is_supported(),
            is_connected: self.is_connected(),
            is_connecting: self.is_connecting(),
            is_printing: self.is_printing(),
            policy: self.policy(),
            printer,
        }
    }

    /// Run one automatic connect attempt now. Does not use the retry budget.
    pub async fn auto_discover_and_connect(&self) -> Result<bool> {
        let inner = &self.inner;
        inner.set_state(SupervisorState::AutoConnecting);
        let result = inner.manager.auto_discover_and_connect().await;
        inner.policy().has_attempted_auto_connect = true;
        match &result {
            Ok(true) => inner.set_state(SupervisorState::Connected),
            Ok(false) => inner.set_state(SupervisorState::AwaitingManual),
            Err(e) => inner.set_state(failure_state(e)),
        };
        inner.wake.notify_one();
        result
    }

    /// Connect through the device chooser. Unlimited, regardless of the retry budget.
    pub async fn connect(&self) -> Result<PrinterDevice> {
        let inner = &self.inner;
        let result = inner.manager.connect().await;
        match &result {
            Ok(_) => {
                inner.policy().retry_count = 0;
                inner.set_state(SupervisorState::Connected);
            }
            Err(e) if !inner.manager.is_connected() => inner.set_state(failure_state(e)),
            Err(_) => {}
        }
        inner.wake.notify_one();
        result
    }

    /// Disconnect and stop automatic activity until the next explicit action.
    pub async fn disconnect(&self) {
        self.inner.set_state(SupervisorState::Disconnected);
        self.inner.manager.disconnect().await;
        self.inner.wake.notify_one();
    }

    /// Print the diagnostic page, naming the printer it was sent to.
    pub async fn print_test(&self) -> Result<PrintReport> {
        let manager = &self.inner.manager;
        self.print_with("test page".to_string(), |e| {
            let page = TestPage {
                printer_name: manager.device().map(|d| d.display_name().to_string()),
            };
            e.encode_test_page(&page)
        })
        .await
    }

    /// Print a kitchen order ticket.
    pub async fn print_kot(&self, kot: &KotTicket) -> Result<PrintReport> {
        self.print_with(format!("KOT {}", kot.ticket_number), |e| e.encode_kot(kot))
            .await
    }

    /// Print a customer invoice.
    pub async fn print_invoice(&self, invoice: &Invoice) -> Result<PrintReport> {
        self.print_with(format!("invoice {}", invoice.invoice_number), |e| {
            e.encode_invoice(invoice)
        })
        .await
    }

    /// Print any document.
    pub async fn print(&self, document: &PrintableDocument) -> Result<PrintReport> {
        self.print_with(document.label(), |e| e.encode(document))
            .await
    }

    #[tracing::instrument(level = "info", skip(self, encode))]
    async fn print_with<F>(&self, document: String, encode: F) -> Result<PrintReport>
    where
        F: FnOnce(&DocumentEncoder) -> EncodedPayload,
    {
        let _printing = PrintingGuard::enter(&self.inner.printing);
        let events = self.inner.manager.events();

        if let Err(e) = self.ensure_connected().await {
            events.send(PrinterEvent::PrintFailed {
                document,
                kind: e.kind(),
                message: e.to_string(),
            });
            return Err(e);
        }

        let payload = encode(&self.inner.encoder);
        events.send(PrinterEvent::PrintStarted {
            document: document.clone(),
            bytes: payload.len(),
        });
        match self.inner.manager.write(payload.as_bytes()).await {
            Ok(chunks) => {
                info!("Printed {} ({} bytes, {} chunks)", document, payload.len(), chunks);
                events.send(PrinterEvent::PrintCompleted {
                    document: document.clone(),
                    chunks,
                });
                Ok(PrintReport {
                    document,
                    bytes: payload.len(),
                    chunks,
                })
            }
            Err(e) => {
                warn!("Printing {} failed: {}", document, e);
                if !self.inner.manager.is_connected() {
                    self.inner.connection_lost();
                }
                events.send(PrinterEvent::PrintFailed {
                    document,
                    kind: e.kind(),
                    message: e.to_string(),
                });
                Err(e)
            }
        }
    }

    /// Make sure a printer is connected: auto first, then the chooser if allowed.
    async fn ensure_connected(&self) -> Result<()> {
        let inner = &self.inner;
        if inner.manager.is_connected() {
            return Ok(());
        }
        debug!("No live printer, connecting before print");

        inner.set_state(SupervisorState::AutoConnecting);
        match inner.manager.auto_discover_and_connect().await {
            Ok(true) => {
                inner.policy().retry_count = 0;
                inner.set_state(SupervisorState::Connected);
                inner.wake.notify_one();
                return Ok(());
            }
            Ok(false) => {}
            Err(e) if e.is_retryable() => warn!("Auto-connect before print failed: {}", e),
            Err(e) => {
                inner.set_state(failure_state(&e));
                return Err(e);
            }
        }

        if !inner.config.prompt_on_print {
            inner.set_state(SupervisorState::AwaitingManual);
            inner.wake.notify_one();
            return Err(Error::NotFound(NotFoundReason::NoPrintersInRange));
        }
        let result = self.connect().await.map(|_| ());
        if result.is_err() && inner.state() == SupervisorState::AutoConnecting {
            inner.set_state(SupervisorState::AwaitingManual);
        }
        result
    }
}

impl Drop for PrinterSupervisor {
    fn drop(&mut self) {
        if let Some(background) = self
            .background
            .get_mut()
            .unwrap_or_else(|e| e.into_inner())
            .take()
        {
            background.cancel.cancel();
        }
    }
}

/// State to land in after a failed connect.
fn failure_state(err: &Error) -> SupervisorState {
    match err.kind() {
        ErrorKind::Unsupported => SupervisorState::Unsupported,
        _ => SupervisorState::AwaitingManual,
    }
}

impl Inner {
    fn state(&self) -> SupervisorState {
        *self.state.read().unwrap_or_else(|e| e.into_inner())
    }

    fn policy(&self) -> std::sync::MutexGuard<'_, ConnectionPolicyState> {
        self.policy.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn set_state(&self, to: SupervisorState) {
        let from = {
            let mut state = self.state.write().unwrap_or_else(|e| e.into_inner());
            std::mem::replace(&mut *state, to)
        };
        if from != to {
            debug!("Supervisor state {:?} -> {:?}", from, to);
            self.manager
                .events()
                .send(PrinterEvent::StateChanged { from, to });
        }
    }

    /// Set `to` only if the state is still `expected`.
    fn transition(&self, expected: SupervisorState, to: SupervisorState) -> bool {
        {
            let mut state = self.state.write().unwrap_or_else(|e| e.into_inner());
            if *state != expected {
                return false;
            }
            *state = to;
        }
        if expected != to {
            debug!("Supervisor state {:?} -> {:?}", expected, to);
            self.manager
                .events()
                .send(PrinterEvent::StateChanged { from: expected, to });
        }
        true
    }

    /// A live connection went away: resume the retry schedule from scratch.
    fn connection_lost(&self) {
        self.policy().retry_count = 0;
        if self.transition(SupervisorState::Connected, SupervisorState::AwaitingManual) {
            self.wake.notify_one();
        }
    }

    fn retries_left(&self) -> bool {
        self.policy().retry_count < self.config.max_retries
    }

    /// How long to sleep before the next tick, or `None` to wait for a wake-up.
    fn next_delay(&self) -> Option<Duration> {
        match self.state() {
            SupervisorState::Connected => Some(self.config.next_poll_delay()),
            SupervisorState::AwaitingManual if self.retries_left() => {
                Some(self.config.retry_interval)
            }
            _ => None,
        }
    }

    /// One automatic attempt. `retry` is the 1-based retry number, `None` at startup.
    async fn auto_attempt(&self, retry: Option<u32>) {
        let max_retries = self.config.max_retries;
        if let Some(attempt) = retry {
            info!("Auto-connect retry {}/{}", attempt, max_retries);
            self.manager
                .events()
                .send(PrinterEvent::AutoConnectAttempt {
                    attempt,
                    max_retries,
                });
        }
        self.set_state(SupervisorState::AutoConnecting);

        let result = self.manager.auto_discover_and_connect().await;
        self.policy().has_attempted_auto_connect = true;
        let connected = match result {
            Ok(connected) => connected,
            Err(e) if e.kind() == ErrorKind::Unsupported => {
                self.set_state(SupervisorState::Unsupported);
                return;
            }
            Err(e) => {
                warn!("Auto-connect failed: {}", e);
                false
            }
        };

        if connected {
            if !self.transition(SupervisorState::AutoConnecting, SupervisorState::Connected)
                && self.state() == SupervisorState::Disconnected
            {
                // The user disconnected while the attempt was running.
                self.manager.disconnect().await;
            } else {
                self.policy().retry_count = 0;
            }
            return;
        }

        self.transition(
            SupervisorState::AutoConnecting,
            SupervisorState::AwaitingManual,
        );
        if retry.unwrap_or(0) >= max_retries {
            info!("Auto-connect retries exhausted, waiting for manual connect");
            self.manager
                .events()
                .send(PrinterEvent::RetriesExhausted {
                    attempts: max_retries,
                });
        }
    }

    async fn tick(&self) {
        match self.state() {
            SupervisorState::Connected => {
                if !self.manager.check_connection().await {
                    warn!("Printer connection lost");
                    self.connection_lost();
                }
            }
            SupervisorState::AwaitingManual => {
                if self.manager.is_connected() {
                    self.transition(SupervisorState::AwaitingManual, SupervisorState::Connected);
                    return;
                }
                let attempt = {
                    let mut policy = self.policy();
                    if policy.retry_count >= self.config.max_retries {
                        return;
                    }
                    policy.retry_count += 1;
                    policy.retry_count
                };
                self.auto_attempt(Some(attempt)).await;
            }
            _ => {}
        }
    }
}

async fn run(inner: Arc<Inner>, cancel: CancellationToken) {
    if !inner.manager.is_supported() {
        info!("Bluetooth not supported, supervisor idle");
        inner.set_state(SupervisorState::Unsupported);
        return;
    }

    if inner.manager.is_connected() {
        inner.set_state(SupervisorState::Connected);
    } else if inner.state() == SupervisorState::Idle {
        tokio::select! {
            _ = cancel.cancelled() => return,
            _ = inner.auto_attempt(None) => {}
        }
    }

    loop {
        let delay = inner.next_delay();
        let timer = async move {
            match delay {
                Some(delay) => tokio::time::sleep(delay).await,
                None => std::future::pending::<()>().await,
            }
        };
        tokio::select! {
            _ = cancel.cancelled() => {
                info!("Supervisor cancelled, shutting down");
                break;
            }
            _ = inner.wake.notified() => continue,
            _ = timer => {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = inner.tick() => {}
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ConnectionConfig;
    use crate::mock::{ChooserOutcome, MockBackend};
    use crate::traits::DeviceCandidate;

    fn supervisor(backend: &MockBackend, config: SupervisorConfig) -> PrinterSupervisor {
        let manager =
            PrinterManager::new(Arc::new(backend.clone()), ConnectionConfig::default()).unwrap();
        PrinterSupervisor::new(Arc::new(manager), DocumentEncoder::default(), config).unwrap()
    }

    #[tokio::test(start_paused = true)]
    async fn test_startup_connects() {
        let backend =
            MockBackend::new().with_known(DeviceCandidate::new("A", Some("MPT-II".into())));
        let sup = supervisor(&backend, SupervisorConfig::default());
        assert_eq!(sup.state(), SupervisorState::Idle);

        sup.start();
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(sup.state(), SupervisorState::Connected);
        assert!(sup.policy().has_attempted_auto_connect);
        sup.shutdown().await;
        assert!(!sup.is_running());
    }

    #[tokio::test(start_paused = true)]
    async fn test_unsupported_host() {
        let backend = MockBackend::new().unsupported();
        let sup = supervisor(&backend, SupervisorConfig::default());
        sup.start();
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(sup.state(), SupervisorState::Unsupported);
        assert!(!sup.is_running());
        assert_eq!(backend.discovery_calls(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_disconnect_stops_scheduling() {
        let backend = MockBackend::new();
        let sup = supervisor(&backend, SupervisorConfig::default());
        sup.start();
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(sup.state(), SupervisorState::AwaitingManual);

        sup.disconnect().await;
        let calls = backend.discovery_calls();
        tokio::time::sleep(Duration::from_secs(600)).await;
        assert_eq!(sup.state(), SupervisorState::Disconnected);
        assert_eq!(backend.discovery_calls(), calls);
        sup.shutdown().await;
    }

    #[tokio::test]
    async fn test_print_without_prompt_fails_not_found() {
        let backend = MockBackend::new();
        let sup = supervisor(&backend, SupervisorConfig::default().prompt_on_print(false));
        let err = sup.print_test().await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
        assert_eq!(backend.chooser_calls(), 0);
        assert!(!sup.is_printing());
    }

    #[tokio::test]
    async fn test_print_falls_back_to_chooser() {
        let backend = MockBackend::new().with_chooser(ChooserOutcome::Pick(DeviceCandidate::new(
            "B", None,
        )));
        let sup = supervisor(&backend, SupervisorConfig::default());
        let report = sup.print_test().await.unwrap();
        assert_eq!(backend.chooser_calls(), 1);
        assert_eq!(report.bytes, backend.written_bytes().len());
        assert_eq!(sup.state(), SupervisorState::Connected);
    }

    #[tokio::test]
    async fn test_manual_connect_failure_keeps_affordance() {
        let backend = MockBackend::new().with_chooser(ChooserOutcome::Deny);
        let sup = supervisor(&backend, SupervisorConfig::default());
        let err = sup.connect().await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::PermissionDenied);
        assert_eq!(sup.state(), SupervisorState::AwaitingManual);
    }

    #[test]
    fn test_status_serializes() {
        let status = SupervisorStatus {
            state: SupervisorState::AwaitingManual,
            is_supported: true,
            is_connected: false,
            is_connecting: false,
            is_printing: false,
            policy: ConnectionPolicyState::default(),
            printer: None,
        };
        let json = serde_json::to_string(&status).unwrap();
        assert!(json.contains("\"awaiting_manual\""));
    }
}
