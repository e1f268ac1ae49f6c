//! Error types for document input in posprint-types.

use thiserror::Error;

/// Errors raised while building or deserializing documents.
///
/// This enum is marked `#[non_exhaustive]` to allow adding new error variants
/// in future versions without breaking downstream code.
#[derive(Debug, Error, PartialEq)]
#[non_exhaustive]
pub enum DocumentError {
    /// A currency amount was NaN, infinite, or out of range.
    #[error("Invalid amount: {0}")]
    InvalidAmount(String),

    /// A textual amount could not be parsed.
    #[error("Cannot parse amount '{0}'")]
    UnparsableAmount(String),

    /// A computed total does not fit in the amount range.
    #[error("Amount overflow while computing {0}")]
    AmountOverflow(&'static str),
}

/// Result type alias using posprint-types' DocumentError type.
pub type DocumentResult<T> = std::result::Result<T, DocumentError>;
