//! Store error types.

use certvault_core::ContextError;
use std::time::Duration;
use thiserror::Error;

/// Record store and lock manager errors.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("key is locked: {0}")]
    Locked(String),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error(transparent)]
    Context(#[from] ContextError),

    #[error("statement timed out after {0:?}")]
    Timeout(Duration),

    #[error("invalid key: {0}")]
    InvalidKey(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("internal error: {0}")]
    Internal(String),
}

impl StoreError {
    /// Whether this error reports an absent key.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }

    /// Whether this error reports an unexpired lease held on the key.
    pub fn is_locked(&self) -> bool {
        matches!(self, Self::Locked(_))
    }
}

impl From<certvault_core::Error> for StoreError {
    fn from(err: certvault_core::Error) -> Self {
        match err {
            certvault_core::Error::Config(msg) => Self::Config(msg),
            certvault_core::Error::InvalidKey(msg) => Self::InvalidKey(msg),
        }
    }
}

/// Result type for store operations.
pub type StoreResult<T> = std::result::Result<T, StoreError>;
