//! Certificate-manager storage contract for certvault.
//!
//! This crate provides:
//! - The [`Storage`] trait: the fixed method set a certificate manager calls
//! - [`SqlStorage`]: its implementation over a SQLite or PostgreSQL store

pub mod error;
pub mod sql;
pub mod traits;

pub use certvault_core::{Config, Context, KeyInfo, StorageOptions};
pub use error::{StorageError, StorageResult};
pub use sql::SqlStorage;
pub use traits::Storage;
