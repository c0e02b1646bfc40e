//! Core types shared by the certvault crates.
//!
//! - Configuration for the backend connection and the storage contract
//! - Request-scoped [`Context`] carrying cancellation and a deadline
//! - Key validation and prefix-listing helpers

pub mod config;
pub mod context;
pub mod error;
pub mod key;

pub use config::{BackendConfig, Config, PgSslMode, StorageOptions};
pub use context::Context;
pub use error::{ContextError, Error, Result};
pub use key::KeyInfo;
