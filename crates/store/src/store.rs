//! Certificate store trait and the SQLite implementation.

use crate::error::{StoreError, StoreResult};
use crate::repos::{LockRepo, RecordRepo};
use async_trait::async_trait;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{Pool, Sqlite};
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

/// Combined store trait: records, leases and schema management.
#[async_trait]
pub trait CertStore: RecordRepo + LockRepo + Send + Sync {
    /// Create the backing tables if they do not exist. Safe to run on every start.
    async fn migrate(&self) -> StoreResult<()>;

    /// Check database connectivity.
    async fn health_check(&self) -> StoreResult<()>;

    /// Short backend identifier for logs.
    fn backend_name(&self) -> &'static str;
}

/// Current database time as integer Unix milliseconds.
///
/// `julianday('now')` is fixed for the duration of one statement, so every use
/// inside a statement sees the same instant.
const SQLITE_NOW_MS: &str = "CAST(ROUND((julianday('now') - 2440587.5) * 86400000.0) AS INTEGER)";

/// SQLite-based store.
///
/// Several processes may share one database file; SQLite serializes their
/// writes, which makes every single-statement upsert atomic.
pub struct SqliteStore {
    pool: Pool<Sqlite>,
}

impl SqliteStore {
    /// Open (creating if needed) a database file and ensure the schema.
    pub async fn new(path: impl AsRef<Path>, busy_timeout: Duration) -> StoreResult<Self> {
        let path = path.as_ref();
        let in_memory = path == Path::new(":memory:");

        if !in_memory
            && let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent)?;
        }

        let opts = SqliteConnectOptions::from_str(&format!("sqlite:{}?mode=rwc", path.display()))?
            .create_if_missing(true)
            .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal)
            .synchronous(sqlx::sqlite::SqliteSynchronous::Normal)
            // Writers from other processes hold the file lock briefly; wait instead of failing.
            .busy_timeout(busy_timeout);

        // One connection per process: SQLite admits one writer at a time anyway.
        let mut pool_opts = SqlitePoolOptions::new().max_connections(1);
        if in_memory {
            // The database vanishes with its last connection, so never let
            // the pool reap it.
            pool_opts = pool_opts
                .min_connections(1)
                .idle_timeout(None)
                .max_lifetime(None);
        }
        let pool = pool_opts.connect_with(opts).await?;

        tracing::info!(path = %path.display(), "Opened SQLite certificate store");
        Self::from_pool(pool).await
    }

    /// Open a private in-memory database (tests and single-process use).
    pub async fn in_memory() -> StoreResult<Self> {
        Self::new(":memory:", Duration::from_secs(5)).await
    }

    /// Wrap an existing pool and ensure the schema.
    pub async fn from_pool(pool: Pool<Sqlite>) -> StoreResult<Self> {
        let store = Self { pool };
        store.migrate().await?;
        Ok(store)
    }

    /// Get a reference to the connection pool.
    pub fn pool(&self) -> &Pool<Sqlite> {
        &self.pool
    }
}

#[async_trait]
impl CertStore for SqliteStore {
    async fn migrate(&self) -> StoreResult<()> {
        sqlx::query(SCHEMA_SQL).execute(&self.pool).await?;
        Ok(())
    }

    async fn health_check(&self) -> StoreResult<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }

    fn backend_name(&self) -> &'static str {
        "sqlite"
    }
}

mod sqlite_impl {
    use super::*;
    use crate::models::{LeaseRow, SqliteKeyInfoRow, from_unix_millis};
    use certvault_core::KeyInfo;
    use certvault_core::key::in_listing;

    #[async_trait]
    impl RecordRepo for SqliteStore {
        async fn store(&self, key: &str, content: &[u8]) -> StoreResult<()> {
            // Bumping past the previous value keeps `modified` strictly increasing
            // when two writes land in the same millisecond.
            let sql = format!(
                r#"
                INSERT INTO certvault_data (key, content, modified_ms)
                VALUES (?1, ?2, {SQLITE_NOW_MS})
                ON CONFLICT(key) DO UPDATE SET
                    content = excluded.content,
                    modified_ms = MAX(excluded.modified_ms, certvault_data.modified_ms + 1)
                "#
            );
            sqlx::query(&sql)
                .bind(key)
                .bind(content)
                .execute(&self.pool)
                .await?;
            Ok(())
        }

        async fn load(&self, key: &str) -> StoreResult<Vec<u8>> {
            let content: Option<Vec<u8>> =
                sqlx::query_scalar("SELECT content FROM certvault_data WHERE key = ?")
                    .bind(key)
                    .fetch_optional(&self.pool)
                    .await?;
            content.ok_or_else(|| StoreError::NotFound(key.to_string()))
        }

        async fn exists(&self, key: &str) -> StoreResult<bool> {
            let exists: bool =
                sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM certvault_data WHERE key = ?)")
                    .bind(key)
                    .fetch_one(&self.pool)
                    .await?;
            Ok(exists)
        }

        async fn delete(&self, key: &str) -> StoreResult<()> {
            let result = sqlx::query("DELETE FROM certvault_data WHERE key = ?")
                .bind(key)
                .execute(&self.pool)
                .await?;
            if result.rows_affected() == 0 {
                return Err(StoreError::NotFound(key.to_string()));
            }
            Ok(())
        }

        async fn stat(&self, key: &str) -> StoreResult<KeyInfo> {
            let row = sqlx::query_as::<_, SqliteKeyInfoRow>(
                "SELECT key, modified_ms, length(content) AS size FROM certvault_data WHERE key = ?",
            )
            .bind(key)
            .fetch_optional(&self.pool)
            .await?;
            match row {
                Some(row) => KeyInfo::try_from(row),
                None => Err(StoreError::NotFound(key.to_string())),
            }
        }

        async fn list(&self, prefix: &str, recursive: bool) -> StoreResult<Vec<String>> {
            // substr() rather than LIKE: LIKE treats `%`/`_` as wildcards and
            // ignores ASCII case in SQLite.
            let keys: Vec<String> = sqlx::query_scalar(
                "SELECT key FROM certvault_data WHERE substr(key, 1, length(?1)) = ?1",
            )
            .bind(prefix)
            .fetch_all(&self.pool)
            .await?;
            Ok(keys
                .into_iter()
                .filter(|key| in_listing(prefix, key, recursive))
                .collect())
        }
    }

    #[async_trait]
    impl LockRepo for SqliteStore {
        async fn try_acquire(&self, key: &str, lease: Duration) -> StoreResult<bool> {
            let lease_ms = i64::try_from(lease.as_millis()).unwrap_or(i64::MAX);
            let sql = format!(
                r#"
                INSERT INTO certvault_locks (key, expires_ms)
                VALUES (?1, {SQLITE_NOW_MS} + ?2)
                ON CONFLICT(key) DO UPDATE SET expires_ms = excluded.expires_ms
                WHERE certvault_locks.expires_ms <= {SQLITE_NOW_MS}
                "#
            );
            let result = sqlx::query(&sql)
                .bind(key)
                .bind(lease_ms)
                .execute(&self.pool)
                .await?;
            Ok(result.rows_affected() > 0)
        }

        async fn is_locked(&self, key: &str) -> StoreResult<()> {
            let sql = format!(
                "SELECT EXISTS(SELECT 1 FROM certvault_locks WHERE key = ? AND expires_ms > {SQLITE_NOW_MS})"
            );
            let locked: bool = sqlx::query_scalar(&sql)
                .bind(key)
                .fetch_one(&self.pool)
                .await?;
            if locked {
                return Err(StoreError::Locked(key.to_string()));
            }
            Ok(())
        }

        async fn lease(&self, key: &str) -> StoreResult<Option<LeaseRow>> {
            let sql = format!(
                "SELECT expires_ms FROM certvault_locks WHERE key = ? AND expires_ms > {SQLITE_NOW_MS}"
            );
            let expires_ms: Option<i64> = sqlx::query_scalar(&sql)
                .bind(key)
                .fetch_optional(&self.pool)
                .await?;
            expires_ms
                .map(|ms| {
                    Ok(LeaseRow {
                        key: key.to_string(),
                        expires_at: from_unix_millis(ms)?,
                    })
                })
                .transpose()
        }

        async fn release(&self, key: &str) -> StoreResult<()> {
            sqlx::query("DELETE FROM certvault_locks WHERE key = ?")
                .bind(key)
                .execute(&self.pool)
                .await?;
            Ok(())
        }

        async fn purge_expired(&self) -> StoreResult<u64> {
            let sql = format!("DELETE FROM certvault_locks WHERE expires_ms <= {SQLITE_NOW_MS}");
            let result = sqlx::query(&sql).execute(&self.pool).await?;
            Ok(result.rows_affected())
        }
    }
}

const SCHEMA_SQL: &str = r#"
-- Named blobs
CREATE TABLE IF NOT EXISTS certvault_data (
    key TEXT PRIMARY KEY,
    content BLOB NOT NULL,
    modified_ms INTEGER NOT NULL
);

-- Leases; a row whose expires_ms has passed is free
CREATE TABLE IF NOT EXISTS certvault_locks (
    key TEXT PRIMARY KEY,
    expires_ms INTEGER NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_certvault_locks_expires ON certvault_locks(expires_ms);
"#;
