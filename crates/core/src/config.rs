//! Configuration types shared across crates.

use figment::Figment;
use figment::providers::{Env, Format, Toml};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Environment variable prefix for configuration overrides.
///
/// Nested fields use `__` as the separator, e.g.
/// `CERTVAULT_OPTIONS__LOCK_TIMEOUT_MS=30000`.
pub const ENV_PREFIX: &str = "CERTVAULT_";

/// Tunables for the storage contract.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct StorageOptions {
    /// Lease duration of an acquired lock, in milliseconds.
    /// A holder that crashes keeps the key locked for at most this long.
    #[serde(default = "default_lock_timeout_ms")]
    pub lock_timeout_ms: u64,
    /// Upper bound for a single backend statement, in milliseconds.
    #[serde(default = "default_query_timeout_ms")]
    pub query_timeout_ms: u64,
    /// Delay between acquisition attempts while a lock is contended, in milliseconds.
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
}

fn default_lock_timeout_ms() -> u64 {
    60_000 // 1 minute
}

fn default_query_timeout_ms() -> u64 {
    3_000
}

fn default_poll_interval_ms() -> u64 {
    1_000
}

impl Default for StorageOptions {
    fn default() -> Self {
        Self {
            lock_timeout_ms: default_lock_timeout_ms(),
            query_timeout_ms: default_query_timeout_ms(),
            poll_interval_ms: default_poll_interval_ms(),
        }
    }
}

impl StorageOptions {
    /// Override the lock lease duration.
    pub fn with_lock_timeout(mut self, lease: Duration) -> Self {
        self.lock_timeout_ms = saturating_millis(lease);
        self
    }

    /// Override the per-statement timeout.
    pub fn with_query_timeout(mut self, timeout: Duration) -> Self {
        self.query_timeout_ms = saturating_millis(timeout);
        self
    }

    /// Override the contention poll interval.
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval_ms = saturating_millis(interval);
        self
    }

    /// Lock lease duration.
    pub fn lock_timeout(&self) -> Duration {
        Duration::from_millis(self.lock_timeout_ms)
    }

    /// Per-statement timeout.
    pub fn query_timeout(&self) -> Duration {
        Duration::from_millis(self.query_timeout_ms)
    }

    /// Contention poll interval.
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    /// Validate option invariants.
    pub fn validate(&self) -> Result<(), String> {
        if self.lock_timeout_ms == 0 {
            return Err("lock_timeout_ms must be greater than zero".to_string());
        }
        if self.query_timeout_ms == 0 {
            return Err("query_timeout_ms must be greater than zero".to_string());
        }
        if self.poll_interval_ms == 0 {
            return Err("poll_interval_ms must be greater than zero".to_string());
        }
        Ok(())
    }
}

fn saturating_millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

/// TLS policy for PostgreSQL connections.
#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum PgSslMode {
    /// Plaintext only.
    Disable,
    /// TLS when the server offers it.
    #[default]
    Prefer,
    /// Fail unless TLS is negotiated.
    Require,
}

/// Relational backend configuration.
#[derive(Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum BackendConfig {
    /// SQLite database. Only safe when every instance runs on the same host.
    Sqlite {
        /// Database file path (`:memory:` for a private in-memory database).
        path: PathBuf,
        /// How long a writer waits on SQLite's file lock before failing.
        #[serde(default = "default_busy_timeout_secs")]
        busy_timeout_secs: u64,
    },
    /// PostgreSQL database, shareable across hosts.
    ///
    /// Either `url`, or `host` plus `database`; `url` wins when both are set.
    Postgres {
        url: Option<String>,
        host: Option<String>,
        #[serde(default = "default_pg_port")]
        port: Option<u16>,
        username: Option<String>,
        /// Prefer CERTVAULT_BACKEND__PASSWORD over storing it in a file.
        password: Option<String>,
        database: Option<String>,
        ssl_mode: Option<PgSslMode>,
        /// Pool size per process.
        #[serde(default = "default_max_connections")]
        max_connections: u32,
    },
}

fn default_busy_timeout_secs() -> u64 {
    5
}

fn default_pg_port() -> Option<u16> {
    Some(5432)
}

fn default_max_connections() -> u32 {
    10
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self::Sqlite {
            path: PathBuf::from("./data/certvault.db"),
            busy_timeout_secs: default_busy_timeout_secs(),
        }
    }
}

impl fmt::Debug for BackendConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Sqlite {
                path,
                busy_timeout_secs,
            } => f
                .debug_struct("Sqlite")
                .field("path", path)
                .field("busy_timeout_secs", busy_timeout_secs)
                .finish(),
            Self::Postgres {
                url,
                host,
                port,
                username,
                password,
                database,
                ssl_mode,
                max_connections,
            } => f
                .debug_struct("Postgres")
                .field("url", &url.as_ref().map(|_| "<redacted>"))
                .field("host", host)
                .field("port", port)
                .field("username", username)
                .field("password", &password.as_ref().map(|_| "<redacted>"))
                .field("database", database)
                .field("ssl_mode", ssl_mode)
                .field("max_connections", max_connections)
                .finish(),
        }
    }
}

impl BackendConfig {
    /// Validate backend configuration invariants.
    pub fn validate(&self) -> Result<(), String> {
        match self {
            BackendConfig::Sqlite { path, .. } => {
                if path.as_os_str().is_empty() {
                    return Err("sqlite config requires a non-empty 'path'".to_string());
                }
                Ok(())
            }
            BackendConfig::Postgres {
                url,
                host,
                database,
                max_connections,
                ..
            } => {
                if *max_connections == 0 {
                    return Err("postgres 'max_connections' must be greater than zero".to_string());
                }
                if url.is_some() {
                    return Ok(());
                }
                match (host, database) {
                    (Some(_), Some(_)) => Ok(()),
                    (None, _) => Err("postgres backend needs 'url', or 'host' and 'database'".to_string()),
                    (Some(_), None) => {
                        Err("postgres backend with 'host' also needs 'database'".to_string())
                    }
                }
            }
        }
    }
}

/// Complete configuration.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Config {
    /// Backend connection settings.
    #[serde(default)]
    pub backend: BackendConfig,
    /// Storage contract tunables.
    #[serde(default)]
    pub options: StorageOptions,
}

impl Config {
    /// Load configuration from an optional TOML file, overridden by
    /// `CERTVAULT_`-prefixed environment variables.
    pub fn load(path: impl AsRef<Path>) -> crate::Result<Self> {
        let path = path.as_ref();
        let mut figment = Figment::new();
        if path.exists() {
            figment = figment.merge(Toml::file(path));
        }
        Self::extract(figment.merge(Env::prefixed(ENV_PREFIX).split("__")))
    }

    /// Extract and validate a configuration from a prepared figment.
    pub fn extract(figment: Figment) -> crate::Result<Self> {
        let config: Config = figment
            .extract()
            .map_err(|e| crate::Error::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Validate every section.
    pub fn validate(&self) -> crate::Result<()> {
        self.backend.validate().map_err(crate::Error::Config)?;
        self.options.validate().map_err(crate::Error::Config)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_storage_options_defaults() {
        let options = StorageOptions::default();
        assert_eq!(options.lock_timeout(), Duration::from_secs(60));
        assert_eq!(options.query_timeout(), Duration::from_secs(3));
        assert_eq!(options.poll_interval(), Duration::from_secs(1));
        assert!(options.validate().is_ok());
    }

    #[test]
    fn test_storage_options_deserialize_partial() {
        let json = r#"{"lock_timeout_ms": 100}"#;
        let options: StorageOptions = serde_json::from_str(json).unwrap();
        assert_eq!(options.lock_timeout(), Duration::from_millis(100));
        assert_eq!(options.query_timeout_ms, 3_000);
        assert_eq!(options.poll_interval_ms, 1_000);
    }

    #[test]
    fn test_storage_options_rejects_zero() {
        let options = StorageOptions::default().with_poll_interval(Duration::ZERO);
        let err = options.validate().unwrap_err();
        assert!(err.contains("poll_interval_ms"));
    }

    #[test]
    fn test_postgres_config_requires_url_or_host() {
        let config = BackendConfig::Postgres {
            url: None,
            host: None,
            port: None,
            username: None,
            password: None,
            database: Some("certs".to_string()),
            ssl_mode: None,
            max_connections: 10,
        };
        assert!(config.validate().is_err());

        let config = BackendConfig::Postgres {
            url: None,
            host: Some("db".to_string()),
            port: Some(5432),
            username: None,
            password: None,
            database: None,
            ssl_mode: None,
            max_connections: 10,
        };
        let err = config.validate().unwrap_err();
        assert!(err.contains("'database'"));
    }

    #[test]
    fn test_postgres_debug_redacts_secrets() {
        let config = BackendConfig::Postgres {
            url: Some("postgres://user:hunter2@db/certs".to_string()),
            host: None,
            port: None,
            username: Some("user".to_string()),
            password: Some("hunter2".to_string()),
            database: None,
            ssl_mode: Some(PgSslMode::Require),
            max_connections: 4,
        };
        let rendered = format!("{config:?}");
        assert!(!rendered.contains("hunter2"));
        assert!(rendered.contains("<redacted>"));
    }

    #[test]
    fn test_config_load_from_toml_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("certvault.toml");
        std::fs::write(
            &path,
            r#"
            [backend]
            type = "postgres"
            url = "postgres://localhost/certs"

            [options]
            lock_timeout_ms = 30000
            "#,
        )
        .unwrap();

        let config = Config::load(&path).unwrap();
        assert!(matches!(config.backend, BackendConfig::Postgres { .. }));
        assert_eq!(config.options.lock_timeout(), Duration::from_secs(30));
        assert_eq!(config.options.poll_interval(), Duration::from_secs(1));
    }

    #[test]
    fn test_config_load_missing_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::load(dir.path().join("absent.toml")).unwrap();
        assert!(matches!(config.backend, BackendConfig::Sqlite { .. }));
        assert_eq!(config.options, StorageOptions::default());
    }

    #[test]
    fn test_config_extract_rejects_invalid_options() {
        let figment = Figment::new().merge(Toml::string(
            r#"
            [options]
            query_timeout_ms = 0
            "#,
        ));
        match Config::extract(figment) {
            Err(crate::Error::Config(msg)) => assert!(msg.contains("query_timeout_ms")),
            other => panic!("unexpected result: {other:?}"),
        }
    }
}
