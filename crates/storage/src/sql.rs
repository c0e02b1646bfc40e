//! Storage contract over a relational [`CertStore`].

use crate::error::{StorageError, StorageResult};
use crate::traits::Storage;
use async_trait::async_trait;
use bytes::Bytes;
use certvault_core::key::validate_key;
use certvault_core::{Config, Context, KeyInfo, StorageOptions};
use certvault_store::{CertStore, LockManager, StoreResult, bounded};
use std::future::Future;
use std::sync::Arc;

/// [`Storage`] backed by SQLite or PostgreSQL.
///
/// Holds no lock state of its own; every instance sharing a database
/// coordinates through it alone.
pub struct SqlStorage {
    store: Arc<dyn CertStore>,
    locks: LockManager<dyn CertStore>,
    options: StorageOptions,
}

impl SqlStorage {
    /// Wrap an open store.
    pub fn new(store: Arc<dyn CertStore>, options: StorageOptions) -> StorageResult<Self> {
        options.validate().map_err(StorageError::Config)?;
        let locks = LockManager::new(
            Arc::clone(&store),
            options.lock_timeout(),
            options.poll_interval(),
        )
        .with_statement_timeout(options.query_timeout());
        Ok(Self {
            store,
            locks,
            options,
        })
    }

    /// Connect to the configured backend, ensure the schema and wrap it.
    pub async fn from_config(config: &Config) -> StorageResult<Self> {
        config.validate()?;
        let store = certvault_store::from_config(&config.backend).await?;
        tracing::info!(
            backend = store.backend_name(),
            lock_timeout_ms = config.options.lock_timeout_ms,
            query_timeout_ms = config.options.query_timeout_ms,
            "Certificate storage ready"
        );
        Self::new(store, config.options.clone())
    }

    /// The underlying store.
    pub fn backend(&self) -> &Arc<dyn CertStore> {
        &self.store
    }

    /// Options in effect.
    pub fn options(&self) -> &StorageOptions {
        &self.options
    }

    /// `Ok(())` if `key` is free, `Err(StorageError::Locked)` while a lease is live.
    pub async fn is_locked(&self, ctx: &Context, key: &str) -> StorageResult<()> {
        validate_key(key)?;
        Ok(self.locks.is_locked(key, ctx).await?)
    }

    /// Delete expired lease rows. Never needed for correctness.
    pub async fn purge_expired_locks(&self, ctx: &Context) -> StorageResult<u64> {
        let purged = self.bounded(ctx, self.store.purge_expired()).await?;
        if purged > 0 {
            tracing::debug!(purged, "Purged expired locks");
        }
        Ok(purged)
    }

    async fn bounded<T>(
        &self,
        ctx: &Context,
        fut: impl Future<Output = StoreResult<T>>,
    ) -> StorageResult<T> {
        Ok(bounded(ctx, Some(self.options.query_timeout()), fut).await?)
    }
}

#[async_trait]
impl Storage for SqlStorage {
    async fn store(&self, ctx: &Context, key: &str, value: Bytes) -> StorageResult<()> {
        validate_key(key)?;
        self.bounded(ctx, self.store.store(key, &value)).await
    }

    async fn load(&self, ctx: &Context, key: &str) -> StorageResult<Bytes> {
        validate_key(key)?;
        let content = self.bounded(ctx, self.store.load(key)).await?;
        Ok(Bytes::from(content))
    }

    async fn delete(&self, ctx: &Context, key: &str) -> StorageResult<()> {
        validate_key(key)?;
        self.bounded(ctx, self.store.delete(key)).await
    }

    async fn exists(&self, ctx: &Context, key: &str) -> bool {
        if validate_key(key).is_err() {
            return false;
        }
        match self.bounded(ctx, self.store.exists(key)).await {
            Ok(exists) => exists,
            Err(err) => {
                tracing::warn!(
                    key = %key,
                    backend = self.store.backend_name(),
                    error = %err,
                    "Existence check failed, reporting key as absent"
                );
                false
            }
        }
    }

    async fn stat(&self, ctx: &Context, key: &str) -> StorageResult<KeyInfo> {
        validate_key(key)?;
        self.bounded(ctx, self.store.stat(key)).await
    }

    async fn list(
        &self,
        ctx: &Context,
        prefix: &str,
        recursive: bool,
    ) -> StorageResult<Vec<String>> {
        self.bounded(ctx, self.store.list(prefix, recursive)).await
    }

    async fn lock(&self, ctx: &Context, key: &str) -> StorageResult<()> {
        validate_key(key)?;
        Ok(self.locks.lock(key, ctx).await?)
    }

    async fn unlock(&self, ctx: &Context, key: &str) -> StorageResult<()> {
        validate_key(key)?;
        Ok(self.locks.unlock(key, ctx).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use certvault_store::SqliteStore;
    use std::time::Duration;

    async fn memory_storage(options: StorageOptions) -> SqlStorage {
        let store = SqliteStore::in_memory().await.unwrap();
        SqlStorage::new(Arc::new(store), options).unwrap()
    }

    #[tokio::test]
    async fn test_new_rejects_invalid_options() {
        let store = SqliteStore::in_memory().await.unwrap();
        let options = StorageOptions::default().with_lock_timeout(Duration::ZERO);
        match SqlStorage::new(Arc::new(store), options) {
            Err(StorageError::Config(msg)) => assert!(msg.contains("lock_timeout_ms")),
            Err(other) => panic!("unexpected error: {other:?}"),
            Ok(_) => panic!("expected error"),
        }
    }

    #[tokio::test]
    async fn test_empty_key_is_rejected() {
        let storage = memory_storage(StorageOptions::default()).await;
        let ctx = Context::background();

        let err = storage
            .store(&ctx, "", Bytes::from_static(b"x"))
            .await
            .unwrap_err();
        assert!(matches!(err, StorageError::InvalidKey(_)));
        assert!(!storage.exists(&ctx, "").await);
        assert!(matches!(
            storage.lock(&ctx, "").await,
            Err(StorageError::InvalidKey(_))
        ));
    }

    #[tokio::test]
    async fn test_cancelled_context_fails_without_touching_backend() {
        let storage = memory_storage(StorageOptions::default()).await;
        let ctx = Context::background();
        ctx.cancel();

        let err = storage
            .store(&ctx, "k", Bytes::from_static(b"x"))
            .await
            .unwrap_err();
        assert!(matches!(err, StorageError::Canceled));
        assert!(!storage.exists(&Context::background(), "k").await);
    }

    #[tokio::test]
    async fn test_exists_reports_false_when_backend_is_gone() {
        let store = Arc::new(SqliteStore::in_memory().await.unwrap());
        let storage = SqlStorage::new(store.clone(), StorageOptions::default()).unwrap();
        let ctx = Context::background();
        storage
            .store(&ctx, "k", Bytes::from_static(b"x"))
            .await
            .unwrap();

        store.pool().close().await;
        assert!(!storage.exists(&ctx, "k").await);
        assert!(matches!(
            storage.load(&ctx, "k").await,
            Err(StorageError::Backend(_))
        ));
    }

    #[tokio::test]
    async fn test_purge_expired_locks() {
        let options = StorageOptions::default().with_lock_timeout(Duration::from_millis(20));
        let storage = memory_storage(options).await;
        let ctx = Context::background();

        storage.lock(&ctx, "a").await.unwrap();
        storage.lock(&ctx, "b").await.unwrap();
        tokio::time::sleep(Duration::from_millis(60)).await;

        assert_eq!(storage.purge_expired_locks(&ctx).await.unwrap(), 2);
        assert_eq!(storage.purge_expired_locks(&ctx).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_options_reflect_configuration() {
        let options = StorageOptions::default()
            .with_lock_timeout(Duration::from_secs(90))
            .with_query_timeout(Duration::from_millis(500));
        let storage = memory_storage(options).await;

        assert_eq!(storage.options().lock_timeout(), Duration::from_secs(90));
        assert_eq!(storage.options().query_timeout(), Duration::from_millis(500));
        assert_eq!(storage.backend().backend_name(), "sqlite");
    }
}
