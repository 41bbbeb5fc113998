//! Wall-clock ceiling for storage operations.

use crate::traits::{Storage, StorageError, StorageResult};
use crate::StorageBackend;
use async_trait::async_trait;
use bytes::Bytes;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

/// Decorator that bounds every call on the inner storage by `timeout`.
///
/// An exceeded ceiling surfaces as [`StorageError::Timeout`], which callers treat as
/// retryable. The inner operation is dropped, so a write may or may not have landed.
pub struct TimedStorage {
    inner: Arc<dyn Storage>,
    timeout: Duration,
}

impl TimedStorage {
    pub fn new(inner: Arc<dyn Storage>, timeout: Duration) -> Self {
        Self { inner, timeout }
    }

    async fn bounded<T>(
        &self,
        op: &str,
        key: &str,
        fut: impl Future<Output = StorageResult<T>>,
    ) -> StorageResult<T> {
        match tokio::time::timeout(self.timeout, fut).await {
            Ok(result) => result,
            Err(_) => {
                tracing::warn!(
                    op = op,
                    key = %key,
                    timeout_secs = self.timeout.as_secs(),
                    "Storage operation timed out"
                );
                Err(StorageError::Timeout(format!("{} {}", op, key)))
            }
        }
    }
}

#[async_trait]
impl Storage for TimedStorage {
    async fn put(&self, key: &str, data: Bytes, content_type: &str) -> StorageResult<()> {
        self.bounded("put", key, self.inner.put(key, data, content_type))
            .await
    }

    async fn put_if_absent(
        &self,
        key: &str,
        data: Bytes,
        content_type: &str,
    ) -> StorageResult<bool> {
        self.bounded(
            "put_if_absent",
            key,
            self.inner.put_if_absent(key, data, content_type),
        )
        .await
    }

    async fn get(&self, key: &str) -> StorageResult<Bytes> {
        self.bounded("get", key, self.inner.get(key)).await
    }

    async fn exists(&self, key: &str) -> StorageResult<bool> {
        self.bounded("exists", key, self.inner.exists(key)).await
    }

    async fn delete(&self, key: &str) -> StorageResult<()> {
        self.bounded("delete", key, self.inner.delete(key)).await
    }

    fn backend_type(&self) -> StorageBackend {
        self.inner.backend_type()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ObjectStoreStorage;

    struct StalledStorage;

    #[async_trait]
    impl Storage for StalledStorage {
        async fn put(&self, _key: &str, _data: Bytes, _ct: &str) -> StorageResult<()> {
            std::future::pending().await
        }
        async fn put_if_absent(&self, _key: &str, _data: Bytes, _ct: &str) -> StorageResult<bool> {
            std::future::pending().await
        }
        async fn get(&self, _key: &str) -> StorageResult<Bytes> {
            std::future::pending().await
        }
        async fn exists(&self, _key: &str) -> StorageResult<bool> {
            std::future::pending().await
        }
        async fn delete(&self, _key: &str) -> StorageResult<()> {
            std::future::pending().await
        }
        fn backend_type(&self) -> StorageBackend {
            StorageBackend::Memory
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_stalled_backend_times_out() {
        let storage = TimedStorage::new(Arc::new(StalledStorage), Duration::from_secs(30));
        let result = storage.get("uploads/slow").await;
        assert!(matches!(result, Err(StorageError::Timeout(_))));
    }

    #[tokio::test]
    async fn test_fast_backend_passes_through() {
        let storage = TimedStorage::new(
            Arc::new(ObjectStoreStorage::in_memory()),
            Duration::from_secs(30),
        );
        storage
            .put("uploads/fast", Bytes::from_static(b"ok"), "image/png")
            .await
            .unwrap();
        assert!(storage.exists("uploads/fast").await.unwrap());
    }
}
