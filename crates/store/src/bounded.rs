//! Request-scoped bounds for single backend statements.

use crate::error::{StoreError, StoreResult};
use certvault_core::Context;
use std::future::Future;
use std::time::Duration;

/// Run one backend statement under `ctx` and an optional per-statement timeout.
///
/// Whichever ends first wins: the statement's own result, `StoreError::Timeout`,
/// or `StoreError::Context` with the reason the context ended. Statements are
/// never retried here.
pub async fn bounded<T>(
    ctx: &Context,
    timeout: Option<Duration>,
    fut: impl Future<Output = StoreResult<T>>,
) -> StoreResult<T> {
    let result = match timeout {
        Some(timeout) => {
            ctx.run(async {
                tokio::time::timeout(timeout, fut)
                    .await
                    .map_err(|_| StoreError::Timeout(timeout))?
            })
            .await
        }
        None => ctx.run(fut).await,
    };
    result?
}
