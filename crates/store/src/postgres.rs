//! PostgreSQL-based store implementation.

use crate::error::{StoreError, StoreResult};
use crate::models::{KeyInfoRow, LeaseRow};
use crate::repos::{LockRepo, RecordRepo};
use crate::store::CertStore;
use async_trait::async_trait;
use certvault_core::KeyInfo;
use certvault_core::config::PgSslMode;
use certvault_core::key::in_listing;
use sqlx::postgres::{PgConnectOptions, PgPoolOptions, PgSslMode as SqlxPgSslMode};
use sqlx::PgPool;
use std::str::FromStr;
use std::time::Duration;
use time::OffsetDateTime;

/// Schema statements, `;`-separated.
const POSTGRES_SCHEMA: &str = include_str!("postgres_schema.sql");

/// Split a schema script into executable statements, dropping `--` comment
/// lines and fragments left empty by them.
fn schema_statements(script: &str) -> Vec<String> {
    let code: String = script
        .lines()
        .filter(|line| !line.trim_start().starts_with("--"))
        .collect::<Vec<_>>()
        .join("\n");
    code.split(';')
        .map(str::trim)
        .filter(|statement| !statement.is_empty())
        .map(str::to_string)
        .collect()
}

fn sqlx_ssl_mode(mode: PgSslMode) -> SqlxPgSslMode {
    match mode {
        PgSslMode::Disable => SqlxPgSslMode::Disable,
        PgSslMode::Prefer => SqlxPgSslMode::Prefer,
        PgSslMode::Require => SqlxPgSslMode::Require,
    }
}

/// Discrete connection settings, for deployments that keep the password
/// out of the URL.
#[derive(Clone, Copy, Debug)]
pub struct PgParams<'a> {
    pub host: &'a str,
    pub port: u16,
    pub database: &'a str,
    pub username: Option<&'a str>,
    pub password: Option<&'a str>,
    pub ssl_mode: Option<PgSslMode>,
}

impl PgParams<'_> {
    fn connect_options(&self) -> PgConnectOptions {
        let base = PgConnectOptions::new()
            .host(self.host)
            .port(self.port)
            .database(self.database);
        let base = match self.username {
            Some(user) => base.username(user),
            None => base,
        };
        let base = match self.password {
            Some(pass) => base.password(pass),
            None => base,
        };
        match self.ssl_mode {
            Some(mode) => base.ssl_mode(sqlx_ssl_mode(mode)),
            None => base,
        }
    }
}

/// PostgreSQL-based store.
///
/// The production backend: any number of processes on any number of hosts
/// may share one database.
pub struct PostgresStore {
    pool: PgPool,
}

impl PostgresStore {
    /// Connect with a `postgres://` URL and ensure the schema.
    pub async fn from_url(url: &str, max_connections: u32) -> StoreResult<Self> {
        Self::connect(PgConnectOptions::from_str(url)?, max_connections).await
    }

    /// Connect with discrete settings and ensure the schema.
    pub async fn from_params(params: PgParams<'_>, max_connections: u32) -> StoreResult<Self> {
        tracing::info!(
            host = params.host,
            port = params.port,
            database = params.database,
            username = params.username.unwrap_or("<none>"),
            ssl_mode = ?params.ssl_mode,
            "Connecting to PostgreSQL"
        );
        Self::connect(params.connect_options(), max_connections).await
    }

    /// Wrap a pool the caller already manages and ensure the schema.
    pub async fn from_pool(pool: PgPool) -> StoreResult<Self> {
        let this = Self { pool };
        this.migrate().await?;
        Ok(this)
    }

    async fn connect(options: PgConnectOptions, max_connections: u32) -> StoreResult<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect_with(options)
            .await?;
        Self::from_pool(pool).await
    }

    /// The underlying pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl CertStore for PostgresStore {
    async fn migrate(&self) -> StoreResult<()> {
        // One prepared statement per query on Postgres.
        let mut tx = self.pool.begin().await?;
        for statement in schema_statements(POSTGRES_SCHEMA) {
            sqlx::query(&statement).execute(&mut *tx).await?;
        }
        tx.commit().await?;
        tracing::debug!("PostgreSQL schema ensured");
        Ok(())
    }

    async fn health_check(&self) -> StoreResult<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }

    fn backend_name(&self) -> &'static str {
        "postgres"
    }
}

#[async_trait]
impl RecordRepo for PostgresStore {
    async fn store(&self, key: &str, content: &[u8]) -> StoreResult<()> {
        // now() has microsecond resolution; the GREATEST keeps `modified`
        // strictly increasing even if the clock has not moved.
        sqlx::query(
            r#"
            INSERT INTO certvault_data (key, content, modified)
            VALUES ($1, $2, now())
            ON CONFLICT (key) DO UPDATE SET
                content = EXCLUDED.content,
                modified = GREATEST(EXCLUDED.modified, certvault_data.modified + interval '1 microsecond')
            "#,
        )
        .bind(key)
        .bind(content)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn load(&self, key: &str) -> StoreResult<Vec<u8>> {
        let content: Option<Vec<u8>> =
            sqlx::query_scalar("SELECT content FROM certvault_data WHERE key = $1")
                .bind(key)
                .fetch_optional(&self.pool)
                .await?;
        content.ok_or_else(|| StoreError::NotFound(key.to_string()))
    }

    async fn exists(&self, key: &str) -> StoreResult<bool> {
        let exists: bool =
            sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM certvault_data WHERE key = $1)")
                .bind(key)
                .fetch_one(&self.pool)
                .await?;
        Ok(exists)
    }

    async fn delete(&self, key: &str) -> StoreResult<()> {
        let result = sqlx::query("DELETE FROM certvault_data WHERE key = $1")
            .bind(key)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound(key.to_string()));
        }
        Ok(())
    }

    async fn stat(&self, key: &str) -> StoreResult<KeyInfo> {
        let row = sqlx::query_as::<_, KeyInfoRow>(
            "SELECT key, modified, octet_length(content)::BIGINT AS size FROM certvault_data WHERE key = $1",
        )
        .bind(key)
        .fetch_optional(&self.pool)
        .await?;
        row.map(KeyInfo::from)
            .ok_or_else(|| StoreError::NotFound(key.to_string()))
    }

    async fn list(&self, prefix: &str, recursive: bool) -> StoreResult<Vec<String>> {
        // left() rather than LIKE so `%` and `_` in keys match literally.
        let keys: Vec<String> = sqlx::query_scalar(
            "SELECT key FROM certvault_data WHERE left(key, char_length($1)) = $1",
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
impl LockRepo for PostgresStore {
    async fn try_acquire(&self, key: &str, lease: Duration) -> StoreResult<bool> {
        // A concurrent inserter blocks on the primary key until the first
        // commits, then re-evaluates the WHERE against the committed row.
        let result = sqlx::query(
            r#"
            INSERT INTO certvault_locks (key, expires_at)
            VALUES ($1, now() + make_interval(secs => $2))
            ON CONFLICT (key) DO UPDATE SET expires_at = EXCLUDED.expires_at
            WHERE certvault_locks.expires_at <= now()
            "#,
        )
        .bind(key)
        .bind(lease.as_secs_f64())
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn is_locked(&self, key: &str) -> StoreResult<()> {
        let locked: bool = sqlx::query_scalar(
            "SELECT EXISTS(SELECT 1 FROM certvault_locks WHERE key = $1 AND expires_at > now())",
        )
        .bind(key)
        .fetch_one(&self.pool)
        .await?;
        if locked {
            return Err(StoreError::Locked(key.to_string()));
        }
        Ok(())
    }

    async fn lease(&self, key: &str) -> StoreResult<Option<LeaseRow>> {
        let expires_at: Option<OffsetDateTime> = sqlx::query_scalar(
            "SELECT expires_at FROM certvault_locks WHERE key = $1 AND expires_at > now()",
        )
        .bind(key)
        .fetch_optional(&self.pool)
        .await?;
        Ok(expires_at.map(|expires_at| LeaseRow {
            key: key.to_string(),
            expires_at,
        }))
    }

    async fn release(&self, key: &str) -> StoreResult<()> {
        sqlx::query("DELETE FROM certvault_locks WHERE key = $1")
            .bind(key)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn purge_expired(&self) -> StoreResult<u64> {
        let result = sqlx::query("DELETE FROM certvault_locks WHERE expires_at <= now()")
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }
}
