//! Error types for the core crate.

use thiserror::Error;

/// Why a [`Context`](crate::Context) ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ContextError {
    #[error("context canceled")]
    Canceled,

    #[error("context deadline exceeded")]
    DeadlineExceeded,
}

/// Core error type.
#[derive(Debug, Error)]
pub enum Error {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("invalid key: {0}")]
    InvalidKey(String),
}

/// Result type alias for core operations.
pub type Result<T> = std::result::Result<T, Error>;
