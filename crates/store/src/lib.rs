//! Record store and lease lock manager for certvault.
//!
//! This crate provides the persistence core:
//! - Idempotent schema creation
//! - Named byte blobs with database-clock modification times
//! - Lease rows with lazy expiry and atomic conditional acquisition
//! - Backends: SQLite and PostgreSQL

pub mod bounded;
pub mod error;
pub mod lock;
pub mod models;
pub mod postgres;
pub mod repos;
pub mod store;

pub use bounded::bounded;
pub use error::{StoreError, StoreResult};
pub use lock::LockManager;
pub use postgres::{PgParams, PostgresStore};
pub use repos::{LockRepo, RecordRepo};
pub use store::{CertStore, SqliteStore};

use certvault_core::config::BackendConfig;
use std::sync::Arc;
use std::time::Duration;

/// Create a store from configuration.
pub async fn from_config(config: &BackendConfig) -> StoreResult<Arc<dyn CertStore>> {
    config.validate().map_err(StoreError::Config)?;

    match config {
        BackendConfig::Sqlite {
            path,
            busy_timeout_secs,
        } => {
            let store = SqliteStore::new(path, Duration::from_secs(*busy_timeout_secs)).await?;
            Ok(Arc::new(store) as Arc<dyn CertStore>)
        }
        BackendConfig::Postgres {
            url,
            host,
            port,
            username,
            password,
            database,
            ssl_mode,
            max_connections,
        } => {
            let store = if let Some(url) = url {
                // URL takes precedence over individual fields
                tracing::info!("Connecting to PostgreSQL using connection URL");
                PostgresStore::from_url(url, *max_connections).await?
            } else if let (Some(host), Some(database)) = (host, database) {
                let params = PgParams {
                    host,
                    port: port.unwrap_or(5432),
                    database,
                    username: username.as_deref(),
                    password: password.as_deref(),
                    ssl_mode: *ssl_mode,
                };
                PostgresStore::from_params(params, *max_connections).await?
            } else {
                return Err(StoreError::Config(
                    "postgres backend needs 'url', or 'host' and 'database'".to_string(),
                ));
            };
            Ok(Arc::new(store) as Arc<dyn CertStore>)
        }
    }
}
