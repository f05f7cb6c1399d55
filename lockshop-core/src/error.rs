//! Error types for record store operations

use thiserror::Error;

/// Record store errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StoreError {
    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: String },

    #[error("{entity} conflict: {reason}")]
    Conflict { entity: &'static str, reason: String },

    #[error("Insufficient {currency} balance for {growid}")]
    InsufficientBalance { growid: String, currency: String },

    #[error("Invalid stored data: {reason}")]
    InvalidData { reason: String },

    #[error("Store backend error: {reason}")]
    Backend { reason: String },

    #[error("Store operation timed out")]
    Timeout,
}

impl StoreError {
    pub fn not_found(entity: &'static str, id: impl ToString) -> Self {
        StoreError::NotFound {
            entity,
            id: id.to_string(),
        }
    }

    pub fn conflict(entity: &'static str, reason: impl Into<String>) -> Self {
        StoreError::Conflict {
            entity,
            reason: reason.into(),
        }
    }

    pub fn backend(reason: impl Into<String>) -> Self {
        StoreError::Backend {
            reason: reason.into(),
        }
    }
}

/// Result type for record store operations.
pub type StoreResult<T> = Result<T, StoreError>;
