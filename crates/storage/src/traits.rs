//! Storage contract definition.

use crate::error::StorageResult;
use async_trait::async_trait;
use bytes::Bytes;
use certvault_core::{Context, KeyInfo};

/// Storage contract expected by the certificate manager.
///
/// Every method takes the caller's [`Context`]; only [`lock`](Storage::lock)
/// waits on other callers, the rest issue one backend statement each.
#[async_trait]
pub trait Storage: Send + Sync {
    /// Insert or fully replace the value at `key`.
    async fn store(&self, ctx: &Context, key: &str, value: Bytes) -> StorageResult<()>;

    /// Get the value at `key`.
    ///
    /// # Errors
    ///
    /// `StorageError::NotFound` if the key does not exist.
    async fn load(&self, ctx: &Context, key: &str) -> StorageResult<Bytes>;

    /// Delete `key`.
    ///
    /// # Errors
    ///
    /// `StorageError::NotFound` if the key did not exist.
    async fn delete(&self, ctx: &Context, key: &str) -> StorageResult<()>;

    /// Check whether `key` exists. A failed check reports `false`.
    async fn exists(&self, ctx: &Context, key: &str) -> bool;

    /// Get metadata for `key`.
    async fn stat(&self, ctx: &Context, key: &str) -> StorageResult<KeyInfo>;

    /// List keys starting with `prefix`, in no particular order.
    ///
    /// Non-recursive listings only return keys with no `/` after the first
    /// path segment following the prefix. No match is an empty list, not an error.
    async fn list(&self, ctx: &Context, prefix: &str, recursive: bool)
    -> StorageResult<Vec<String>>;

    /// Acquire the lock on `key`, waiting while another caller holds it.
    ///
    /// The lease expires on its own after the configured lock timeout.
    ///
    /// # Errors
    ///
    /// `StorageError::Canceled` or `StorageError::DeadlineExceeded` when `ctx`
    /// ends before the lock could be taken.
    /// `ctx` is observed between attempts; once an acquiring statement has
    /// been issued it runs to completion under the query timeout, and a
    /// granted lease returns `Ok` even if `ctx` ended meanwhile.
    async fn lock(&self, ctx: &Context, key: &str) -> StorageResult<()>;

    /// Release the lock on `key`. Releasing a free key succeeds.
    ///
    /// The caller is not checked against the holder.
    async fn unlock(&self, ctx: &Context, key: &str) -> StorageResult<()>;
}
