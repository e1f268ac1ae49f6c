//! Printer event system.
//!
//! The manager and supervisor publish [`PrinterEvent`]s on a broadcast
//! channel. UI layers subscribe to drive their connection affordance and
//! print notifications.

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use crate::error::ErrorKind;
use crate::supervisor::SupervisorState;

/// Printer identity for events.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrinterId {
    /// Platform identifier (MAC address, or peripheral UUID on macOS).
    pub id: String,
    /// Advertised name, if any.
    pub name: Option<String>,
}

impl PrinterId {
    /// Create a printer ID.
    pub fn new(id: impl Into<String>, name: Option<String>) -> Self {
        Self {
            id: id.into(),
            name,
        }
    }
}

/// How a connection was established.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectMethod {
    /// Reconnected to a remembered printer without prompting.
    Known,
    /// Found by a silent service-filtered scan.
    Scan,
    /// Picked by the user in the chooser.
    Chooser,
}

/// Events emitted by the printer client.
///
/// All events are serializable for logging and IPC.
///
/// This enum is marked `#[non_exhaustive]` to allow adding new event types
/// in future versions without breaking downstream code.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
#[non_exhaustive]
pub enum PrinterEvent {
    /// A printer is connected and writable.
    Connected {
        printer: PrinterId,
        method: ConnectMethod,
    },
    /// The active printer went away.
    Disconnected {
        printer: PrinterId,
        reason: DisconnectReason,
    },
    /// A connect attempt failed.
    ConnectFailed { kind: ErrorKind, message: String },
    /// The supervisor started an automatic connect attempt.
    AutoConnectAttempt { attempt: u32, max_retries: u32 },
    /// Automatic retries are used up; only manual connect remains.
    RetriesExhausted { attempts: u32 },
    /// The supervisor changed state.
    StateChanged {
        from: SupervisorState,
        to: SupervisorState,
    },
    /// A document started printing.
    PrintStarted { document: String, bytes: usize },
    /// A document was fully delivered.
    PrintCompleted { document: String, chunks: usize },
    /// A document failed to print.
    PrintFailed {
        document: String,
        kind: ErrorKind,
        message: String,
    },
}

/// Reason for disconnection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[non_exhaustive]
pub enum DisconnectReason {
    /// Explicit disconnect requested by the user.
    UserRequested,
    /// Replaced by a newer connection.
    Replaced,
    /// The platform reported the link down, or a poll found it down.
    ConnectionLost,
    /// A write failed and the link was torn down.
    WriteFailed,
}

/// Sender for printer events.
pub type EventSender = broadcast::Sender<PrinterEvent>;

/// Receiver for printer events.
pub type EventReceiver = broadcast::Receiver<PrinterEvent>;

/// Event dispatcher for sending events to multiple receivers.
#[derive(Debug, Clone)]
pub struct EventDispatcher {
    sender: EventSender,
}

impl EventDispatcher {
    /// Create a new event dispatcher.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Subscribe to events.
    pub fn subscribe(&self) -> EventReceiver {
        self.sender.subscribe()
    }

    /// Send an event.
    pub fn send(&self, event: PrinterEvent) {
        // No receivers is fine
        let _ = self.sender.send(event);
    }

    /// Get the number of active receivers.
    pub fn receiver_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventDispatcher {
    fn default() -> Self {
        Self::new(100)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_dispatch_without_receivers() {
        let dispatcher = EventDispatcher::new(4);
        dispatcher.send(PrinterEvent::RetriesExhausted { attempts: 5 });
        assert_eq!(dispatcher.receiver_count(), 0);
    }

    #[tokio::test]
    async fn test_subscribe_receives() {
        let dispatcher = EventDispatcher::default();
        let mut rx = dispatcher.subscribe();
        dispatcher.send(PrinterEvent::PrintCompleted {
            document: "KOT K-1".into(),
            chunks: 3,
        });
        match rx.recv().await.unwrap() {
            PrinterEvent::PrintCompleted { chunks, .. } => assert_eq!(chunks, 3),
            other => panic!("unexpected event: {:?}", other),
        }
    }

    #[test]
    fn test_event_serializes_tagged() {
        let event = PrinterEvent::Disconnected {
            printer: PrinterId::new("AA:BB", Some("MPT-II".into())),
            reason: DisconnectReason::ConnectionLost,
        };
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("\"type\":\"disconnected\""));
        assert!(json.contains("\"connection_lost\""));
    }
}
