//! Lease-based lock manager.
//!
//! Acquisition is a loop over [`LockRepo::try_acquire`]: each attempt is one
//! atomic statement, and contention is absorbed by sleeping `poll_interval`
//! until the caller's [`Context`] ends. There is no holder identity, so
//! [`LockManager::unlock`] releases whoever holds the key, and a holder that
//! stalls past its lease can be preempted by the next acquirer.

use crate::bounded::bounded;
use crate::error::{StoreError, StoreResult};
use crate::repos::LockRepo;
use certvault_core::Context;
use std::sync::Arc;
use std::time::Duration;

/// Blocking, cancelable lock acquisition over a [`LockRepo`].
pub struct LockManager<L: LockRepo + ?Sized> {
    locks: Arc<L>,
    lease: Duration,
    poll_interval: Duration,
    statement_timeout: Option<Duration>,
}

impl<L: LockRepo + ?Sized> Clone for LockManager<L> {
    fn clone(&self) -> Self {
        Self {
            locks: Arc::clone(&self.locks),
            lease: self.lease,
            poll_interval: self.poll_interval,
            statement_timeout: self.statement_timeout,
        }
    }
}

impl<L: LockRepo + ?Sized> LockManager<L> {
    /// Create a manager granting leases of `lease`, retrying every `poll_interval`.
    pub fn new(locks: Arc<L>, lease: Duration, poll_interval: Duration) -> Self {
        Self {
            locks,
            lease,
            poll_interval,
            statement_timeout: None,
        }
    }

    /// Bound every backend statement issued by the manager.
    pub fn with_statement_timeout(mut self, timeout: Duration) -> Self {
        self.statement_timeout = Some(timeout);
        self
    }

    /// Lease duration granted on acquisition.
    pub fn lease(&self) -> Duration {
        self.lease
    }

    /// Acquire the lock on `key`, waiting while another lease is live.
    ///
    /// Returns `StoreError::Context` once `ctx` is cancelled or past its
    /// deadline; backend failures end the wait immediately. An acquiring
    /// statement already in flight is allowed to finish, so a lease granted
    /// just as `ctx` ends is still reported as acquired.
    pub async fn lock(&self, key: &str, ctx: &Context) -> StoreResult<()> {
        let lease_ms = u64::try_from(self.lease.as_millis()).unwrap_or(u64::MAX);
        let mut attempts: u32 = 0;
        loop {
            attempts = attempts.saturating_add(1);
            if self.attempt(key, ctx).await? {
                tracing::debug!(key = %key, attempts, lease_ms, "Lock acquired");
                return Ok(());
            }

            tracing::debug!(key = %key, attempts, "Lock contended, waiting");
            if let Err(err) = ctx.run(tokio::time::sleep(self.poll_interval)).await {
                tracing::debug!(key = %key, attempts, error = %err, "Gave up waiting for lock");
                return Err(err.into());
            }
        }
    }

    /// Release the lock on `key`. Idempotent.
    pub async fn unlock(&self, key: &str, ctx: &Context) -> StoreResult<()> {
        bounded(ctx, self.statement_timeout, self.locks.release(key)).await
    }

    /// `Ok(())` if `key` is free, `Err(Locked)` while a lease is live.
    pub async fn is_locked(&self, key: &str, ctx: &Context) -> StoreResult<()> {
        bounded(ctx, self.statement_timeout, self.locks.is_locked(key)).await
    }

    /// One acquisition attempt. The read-only check first avoids a write
    /// while the lease is plainly live.
    ///
    /// The acquiring statement is bounded by the statement timeout only: once
    /// it is issued, ending `ctx` must not discard a lease the database has
    /// already granted.
    async fn attempt(&self, key: &str, ctx: &Context) -> StoreResult<bool> {
        match self.is_locked(key, ctx).await {
            Ok(()) => {}
            Err(StoreError::Locked(_)) => return Ok(false),
            Err(err) => return Err(err),
        }
        bounded(
            &Context::background(),
            self.statement_timeout,
            self.locks.try_acquire(key, self.lease),
        )
        .await
    }
}
