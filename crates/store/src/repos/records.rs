//! Record repository.

use crate::error::StoreResult;
use async_trait::async_trait;
use certvault_core::KeyInfo;

/// Repository for named byte blobs.
///
/// Every method is a single statement and atomic for the one row it touches.
#[async_trait]
pub trait RecordRepo: Send + Sync {
    /// Insert or fully replace the content of `key`, setting its modification
    /// time from the database clock. The time strictly advances on every call,
    /// even when the content is unchanged.
    async fn store(&self, key: &str, content: &[u8]) -> StoreResult<()>;

    /// Get the content of `key`. Fails with `NotFound` if absent.
    async fn load(&self, key: &str) -> StoreResult<Vec<u8>>;

    /// Check whether `key` has a row.
    async fn exists(&self, key: &str) -> StoreResult<bool>;

    /// Delete `key`. Fails with `NotFound` if there was no row.
    async fn delete(&self, key: &str) -> StoreResult<()>;

    /// Get key metadata from one consistent read. Fails with `NotFound` if absent.
    async fn stat(&self, key: &str) -> StoreResult<KeyInfo>;

    /// List keys starting with `prefix`, in no particular order.
    /// See [`certvault_core::key::in_listing`] for the non-recursive rule.
    async fn list(&self, prefix: &str, recursive: bool) -> StoreResult<Vec<String>>;
}
