//! Lease repository.

use crate::error::StoreResult;
use crate::models::LeaseRow;
use async_trait::async_trait;
use std::time::Duration;

/// Repository for lease rows.
///
/// Expiry is evaluated lazily against the database clock: an expired row is
/// treated exactly like a missing one, and nothing sweeps it in the background.
#[async_trait]
pub trait LockRepo: Send + Sync {
    /// Take the lease on `key` for `lease` if it is free or its previous lease
    /// has expired. Returns `false` while another unexpired lease exists.
    /// Check and write happen in one statement.
    async fn try_acquire(&self, key: &str, lease: Duration) -> StoreResult<bool>;

    /// `Ok(())` if `key` is free, `Err(Locked)` if an unexpired lease exists.
    async fn is_locked(&self, key: &str) -> StoreResult<()>;

    /// Get the unexpired lease on `key`, if any.
    async fn lease(&self, key: &str) -> StoreResult<Option<LeaseRow>>;

    /// Drop the lease on `key`. A no-op if it is absent or expired.
    async fn release(&self, key: &str) -> StoreResult<()>;

    /// Delete expired lease rows, returning how many were removed.
    async fn purge_expired(&self) -> StoreResult<u64>;
}
