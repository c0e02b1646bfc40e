//! Test storage fixtures for SQLite and PostgreSQL.

use certvault_core::StorageOptions;
use certvault_storage::{SqlStorage, StorageError, StorageResult};
use certvault_store::{CertStore, PostgresStore, SqliteStore};
use std::path::PathBuf;
use std::sync::{Arc, Once};
use std::time::Duration;
use tempfile::TempDir;
use testcontainers::{ContainerAsync, ImageExt, runners::AsyncRunner};
use testcontainers_modules::postgres::Postgres;

/// Stable prefix for Docker/container startup failures in Postgres test setup.
/// Tests use this marker to decide whether to skip due to unavailable Docker.
pub const POSTGRES_CONTAINER_START_ERR_PREFIX: &str = "postgres-container-start:";

static TRACING: Once = Once::new();

/// Install a test-writer subscriber once; honours `RUST_LOG`.
pub fn init_tracing() {
    TRACING.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    });
}

/// Options tuned for tests: short poll interval, long lease.
pub fn test_options() -> StorageOptions {
    StorageOptions::default()
        .with_poll_interval(Duration::from_millis(25))
        .with_lock_timeout(Duration::from_secs(60))
}

/// A SQLite-backed storage on a temporary database file.
///
/// [`TestStorage::instance`] opens further independent pools on the same
/// file, standing in for separate processes sharing one database.
#[allow(dead_code)]
pub struct TestStorage {
    pub storage: Arc<SqlStorage>,
    db_path: PathBuf,
    _temp_dir: TempDir,
}

#[allow(dead_code)]
impl TestStorage {
    pub async fn new() -> StorageResult<Self> {
        Self::with_options(test_options()).await
    }

    pub async fn with_options(options: StorageOptions) -> StorageResult<Self> {
        init_tracing();
        let temp_dir = tempfile::tempdir().expect("Failed to create temp directory");
        let db_path = temp_dir.path().join("certvault.db");
        let store = SqliteStore::new(&db_path, Duration::from_secs(5)).await?;
        let storage = SqlStorage::new(Arc::new(store), options)?;

        Ok(Self {
            storage: Arc::new(storage),
            db_path,
            _temp_dir: temp_dir,
        })
    }

    /// Open another independent storage on the same database file.
    pub async fn instance(&self, options: StorageOptions) -> StorageResult<Arc<SqlStorage>> {
        let store = SqliteStore::new(&self.db_path, Duration::from_secs(5)).await?;
        Ok(Arc::new(SqlStorage::new(Arc::new(store), options)?))
    }

    pub fn storage(&self) -> Arc<SqlStorage> {
        self.storage.clone()
    }
}

/// PostgreSQL-backed storage running in a testcontainer.
#[allow(dead_code)]
pub struct PostgresTestStorage {
    pub storage: Arc<SqlStorage>,
    url: String,
    _container: ContainerAsync<Postgres>,
}

#[allow(dead_code)]
impl PostgresTestStorage {
    pub async fn new() -> StorageResult<Self> {
        Self::with_options(test_options()).await
    }

    pub async fn with_options(options: StorageOptions) -> StorageResult<Self> {
        init_tracing();
        let container = Postgres::default()
            .with_tag("15-alpine")
            .start()
            .await
            .map_err(|e| {
                StorageError::Config(format!(
                    "{} Failed to start PostgreSQL container: {e}",
                    POSTGRES_CONTAINER_START_ERR_PREFIX
                ))
            })?;

        let host = container.get_host().await.expect("Failed to get host");
        let port = container
            .get_host_port_ipv4(5432)
            .await
            .expect("Failed to get port");

        // Default credentials from testcontainers-modules postgres
        let url = format!("postgres://postgres:postgres@{}:{}/postgres", host, port);

        let store = PostgresStore::from_url(&url, 5).await?;
        let storage = SqlStorage::new(Arc::new(store), options)?;

        Ok(Self {
            storage: Arc::new(storage),
            url,
            _container: container,
        })
    }

    /// Open another independent pool on the same database.
    pub async fn instance(&self, options: StorageOptions) -> StorageResult<Arc<SqlStorage>> {
        let store = PostgresStore::from_url(&self.url, 5).await?;
        Ok(Arc::new(SqlStorage::new(Arc::new(store), options)?))
    }

    pub fn storage(&self) -> Arc<SqlStorage> {
        self.storage.clone()
    }

    pub fn backend(&self) -> Arc<dyn CertStore> {
        self.storage.backend().clone()
    }
}

/// Run a test against both SQLite and PostgreSQL backends.
#[allow(dead_code)]
pub async fn run_storage_test_both<F, Fut>(test_fn: F)
where
    F: Fn(Arc<SqlStorage>) -> Fut + Clone,
    Fut: std::future::Future<Output = ()>,
{
    let sqlite = TestStorage::new()
        .await
        .expect("Failed to create SQLite test storage");
    test_fn.clone()(sqlite.storage()).await;

    // PostgreSQL requires Docker
    if std::env::var("SKIP_POSTGRES_TESTS").is_err() {
        match PostgresTestStorage::new().await {
            Ok(postgres) => {
                test_fn(postgres.storage()).await;
            }
            Err(err) => {
                eprintln!("Skipping PostgreSQL storage tests: {err}");
            }
        }
    }
}
