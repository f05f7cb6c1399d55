//! Errors raised by auxiliary backends (rate-limit counters, response cache).

use thiserror::Error;

/// Failure talking to a counter or cache backend.
///
/// Callers treat every variant as recoverable: the limiter fails open and
/// the cache falls through to live execution.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum BackendError {
    #[error("Backend unavailable: {0}")]
    Unavailable(String),

    #[error("Invalid key pattern {pattern:?}: {reason}")]
    InvalidPattern { pattern: String, reason: String },

    #[error("Stored value could not be decoded: {0}")]
    Corrupt(String),
}

/// Result type for backend operations.
pub type BackendResult<T> = Result<T, BackendError>;
