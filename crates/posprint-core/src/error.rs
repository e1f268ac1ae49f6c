//! Error types for posprint-core.
//!
//! Every failure that leaves the connection manager is one of the variants
//! below, and every variant maps onto a closed [`ErrorKind`]. Platform error
//! identifiers are translated exactly once, in `From<btleplug::Error>`, so
//! the supervisor and UI never match on platform strings.
//!
//! # Error Recovery
//!
//! | Kind | Strategy | UI treatment |
//! |------|----------|--------------|
//! | [`ErrorKind::Unsupported`] | Never retry | Hide the Bluetooth affordance |
//! | [`ErrorKind::NotFound`] | Manual retry later | "Tap to connect" |
//! | [`ErrorKind::PermissionDenied`] | User action outside the app | Point at system settings |
//! | [`ErrorKind::ConnectionLost`] | Supervisor resumes retries | "Printer disconnected" |
//! | [`ErrorKind::WriteFailure`] | Fail the whole print | "Print failed, check paper" |
//! | [`ErrorKind::Failed`] | Manual retry | Generic message |

use std::time::Duration;

use thiserror::Error;

/// Closed classification of printer errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// The host has no usable Bluetooth stack.
    Unsupported,
    /// No printer was found or the user cancelled the chooser.
    NotFound,
    /// The OS or user refused Bluetooth access.
    PermissionDenied,
    /// A live connection dropped.
    ConnectionLost,
    /// Bytes could not be delivered mid-document.
    WriteFailure,
    /// Anything else.
    Failed,
}

/// Errors that can occur while talking to a thermal printer.
///
/// This enum is marked `#[non_exhaustive]` to allow adding new error variants
/// in future versions without breaking downstream code.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    /// No Bluetooth adapter or API on this host.
    #[error("Bluetooth is not supported: {0}")]
    Unsupported(String),

    /// No printer found, or the chooser was dismissed.
    #[error("Printer not found: {0}")]
    NotFound(NotFoundReason),

    /// Bluetooth access was denied.
    #[error("Bluetooth permission denied: {0}")]
    PermissionDenied(String),

    /// The link dropped underneath an operation.
    #[error("Connection to printer lost")]
    ConnectionLost,

    /// Operation attempted while no printer is connected.
    #[error("No printer connected")]
    NotConnected,

    /// A chunk failed to transmit. Earlier chunks may already be on paper.
    #[error("Write failed at chunk {chunk}/{total}: {reason}")]
    WriteFailed {
        /// 1-based index of the failed chunk.
        chunk: usize,
        /// Number of chunks in the payload.
        total: usize,
        /// Platform description.
        reason: String,
    },

    /// GATT connect or service resolution failed.
    #[error("Connection failed: {reason}")]
    ConnectionFailed {
        /// The device that failed, when known.
        device_id: Option<String>,
        /// Platform description.
        reason: String,
    },

    /// The device has none of the configured writable characteristics.
    #[error("No writable printer characteristic (searched {service_count} services)")]
    CharacteristicNotFound {
        /// Number of services that were searched.
        service_count: usize,
    },

    /// Operation timed out.
    #[error("Operation '{operation}' timed out after {duration:?}")]
    Timeout {
        /// The operation that timed out.
        operation: String,
        /// The timeout duration.
        duration: Duration,
    },

    /// Invalid configuration provided.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

/// Reason a printer could not be found.
#[derive(Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum NotFoundReason {
    /// The user dismissed the device chooser.
    ChooserCancelled,
    /// Nothing advertising a printer service was in range.
    NoPrintersInRange,
    /// A specific device disappeared.
    Device { identifier: String },
}

impl std::fmt::Display for NotFoundReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::ChooserCancelled => write!(f, "no printer was chosen"),
            Self::NoPrintersInRange => write!(f, "no printers in range"),
            Self::Device { identifier } => write!(f, "printer '{}' not found", identifier),
        }
    }
}

impl Error {
    /// Create a connection failure for a device.
    pub fn connection_failed(device_id: Option<String>, reason: impl Into<String>) -> Self {
        Self::ConnectionFailed {
            device_id,
            reason: reason.into(),
        }
    }

    /// Create a timeout error with operation context.
    pub fn timeout(operation: impl Into<String>, duration: Duration) -> Self {
        Self::Timeout {
            operation: operation.into(),
            duration,
        }
    }

    /// Create a configuration error.
    pub fn invalid_config(message: impl Into<String>) -> Self {
        Self::InvalidConfig(message.into())
    }

    /// Classify this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::Unsupported(_) => ErrorKind::Unsupported,
            Error::NotFound(_) => ErrorKind::NotFound,
            Error::PermissionDenied(_) => ErrorKind::PermissionDenied,
            Error::ConnectionLost | Error::NotConnected => ErrorKind::ConnectionLost,
            Error::WriteFailed { .. } => ErrorKind::WriteFailure,
            Error::ConnectionFailed { .. }
            | Error::CharacteristicNotFound { .. }
            | Error::Timeout { .. }
            | Error::InvalidConfig(_) => ErrorKind::Failed,
        }
    }

    /// Whether an automatic retry could plausibly succeed later.
    pub fn is_retryable(&self) -> bool {
        !matches!(
            self.kind(),
            ErrorKind::Unsupported | ErrorKind::PermissionDenied
        ) && !matches!(self, Error::InvalidConfig(_))
    }

    /// User-facing next step.
    pub fn guidance(&self) -> &'static str {
        match self.kind() {
            ErrorKind::Unsupported => {
                "Bluetooth printing is not available on this device. Use another print method."
            }
            ErrorKind::NotFound => {
                "No printer found. Turn the printer on, keep it nearby, then tap connect."
            }
            ErrorKind::PermissionDenied => {
                "Bluetooth access is blocked. Enable Bluetooth for this app in system settings."
            }
            ErrorKind::ConnectionLost => "The printer disconnected. Tap connect to reconnect.",
            ErrorKind::WriteFailure => {
                "Printing stopped part way. Check the printer and paper, then print again."
            }
            ErrorKind::Failed => "Could not talk to the printer. Restart it and try again.",
        }
    }
}

impl From<btleplug::Error> for Error {
    fn from(err: btleplug::Error) -> Self {
        match err {
            btleplug::Error::PermissionDenied => {
                Error::PermissionDenied("the Bluetooth stack refused access".to_string())
            }
            btleplug::Error::DeviceNotFound => Error::NotFound(NotFoundReason::NoPrintersInRange),
            btleplug::Error::NotConnected => Error::ConnectionLost,
            btleplug::Error::NotSupported(msg) => Error::Unsupported(msg),
            btleplug::Error::NoSuchCharacteristic => {
                Error::CharacteristicNotFound { service_count: 0 }
            }
            btleplug::Error::TimedOut(duration) => Error::timeout("bluetooth operation", duration),
            other => Error::connection_failed(None, other.to_string()),
        }
    }
}

/// Result type alias using posprint-core's Error type.
pub type Result<T> = std::result::Result<T, Error>;
