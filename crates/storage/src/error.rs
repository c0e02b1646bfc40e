//! Storage contract error types.

use certvault_core::ContextError;
use certvault_store::StoreError;
use std::time::Duration;
use thiserror::Error;

/// Storage contract errors.
///
/// Conditions callers branch on have their own variants; everything else
/// from the backend arrives as `Backend`.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("key not found: {0}")]
    NotFound(String),

    #[error("key is locked: {0}")]
    Locked(String),

    #[error("invalid key: {0}")]
    InvalidKey(String),

    #[error("operation canceled")]
    Canceled,

    #[error("deadline exceeded")]
    DeadlineExceeded,

    #[error("query timed out after {0:?}")]
    QueryTimeout(Duration),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("backend error: {0}")]
    Backend(#[source] StoreError),
}

impl StorageError {
    /// Whether this error reports an absent key.
    ///
    /// Best-effort cleanup callers can ignore exactly this failure.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }
}

impl From<ContextError> for StorageError {
    fn from(err: ContextError) -> Self {
        match err {
            ContextError::Canceled => Self::Canceled,
            ContextError::DeadlineExceeded => Self::DeadlineExceeded,
        }
    }
}

impl From<StoreError> for StorageError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound(key) => Self::NotFound(key),
            StoreError::Locked(key) => Self::Locked(key),
            StoreError::InvalidKey(msg) => Self::InvalidKey(msg),
            StoreError::Context(err) => err.into(),
            StoreError::Timeout(after) => Self::QueryTimeout(after),
            StoreError::Config(msg) => Self::Config(msg),
            other => Self::Backend(other),
        }
    }
}

impl From<certvault_core::Error> for StorageError {
    fn from(err: certvault_core::Error) -> Self {
        StoreError::from(err).into()
    }
}

/// Result type for storage operations.
pub type StorageResult<T> = std::result::Result<T, StorageError>;
