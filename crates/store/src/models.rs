//! Database rows.
//!
//! PostgreSQL keeps timestamps as `TIMESTAMPTZ`; SQLite has no native
//! timestamp type, so its rows carry integer Unix milliseconds taken from
//! the database clock and are converted here.

use crate::error::{StoreError, StoreResult};
use certvault_core::KeyInfo;
use sqlx::FromRow;
use time::OffsetDateTime;

/// Key metadata read from `certvault_data` on PostgreSQL.
#[derive(Debug, Clone, FromRow)]
pub struct KeyInfoRow {
    pub key: String,
    pub modified: OffsetDateTime,
    pub size: i64,
}

impl From<KeyInfoRow> for KeyInfo {
    fn from(row: KeyInfoRow) -> Self {
        KeyInfo {
            key: row.key,
            modified: row.modified,
            size: u64::try_from(row.size).unwrap_or(0),
            is_terminal: true,
        }
    }
}

/// Key metadata read from `certvault_data` on SQLite.
#[derive(Debug, Clone, FromRow)]
pub struct SqliteKeyInfoRow {
    pub key: String,
    pub modified_ms: i64,
    pub size: i64,
}

impl TryFrom<SqliteKeyInfoRow> for KeyInfo {
    type Error = StoreError;

    fn try_from(row: SqliteKeyInfoRow) -> StoreResult<Self> {
        Ok(KeyInfo {
            modified: from_unix_millis(row.modified_ms)?,
            key: row.key,
            size: u64::try_from(row.size).unwrap_or(0),
            is_terminal: true,
        })
    }
}

/// An unexpired lease.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LeaseRow {
    pub key: String,
    pub expires_at: OffsetDateTime,
}

/// Convert integer Unix milliseconds into a timestamp.
pub fn from_unix_millis(ms: i64) -> StoreResult<OffsetDateTime> {
    OffsetDateTime::from_unix_timestamp_nanos(i128::from(ms) * 1_000_000)
        .map_err(|e| StoreError::Internal(format!("timestamp {ms}ms out of range: {e}")))
}
