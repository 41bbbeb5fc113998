use crate::keys::validate_key;
use crate::traits::{Storage, StorageError, StorageResult};
use crate::StorageBackend;
use async_trait::async_trait;
use bytes::Bytes;
use object_store::aws::AmazonS3Builder;
use object_store::gcp::GoogleCloudStorageBuilder;
use object_store::memory::InMemory;
use object_store::path::Path;
use object_store::Error as ObjectStoreError;
use object_store::{
    Attribute, AttributeValue, Attributes, ObjectStore, ObjectStoreExt, PutMode, PutOptions,
    PutPayload,
};
use std::sync::Arc;

/// Storage backed by any `object_store` implementation (S3, GCS, in-memory)
#[derive(Clone)]
pub struct ObjectStoreStorage {
    store: Arc<dyn ObjectStore>,
    backend: StorageBackend,
    bucket: String,
}

impl ObjectStoreStorage {
    pub fn new(store: Arc<dyn ObjectStore>, backend: StorageBackend, bucket: String) -> Self {
        Self {
            store,
            backend,
            bucket,
        }
    }

    /// Create an S3 storage
    ///
    /// Credentials come from the standard AWS environment variables. `endpoint_url` is set
    /// for S3-compatible providers (e.g. "http://localhost:9000" for MinIO).
    pub fn s3(bucket: String, region: String, endpoint_url: Option<String>) -> StorageResult<Self> {
        let mut builder = AmazonS3Builder::from_env()
            .with_region(region)
            .with_bucket_name(bucket.clone());

        if let Some(endpoint) = endpoint_url {
            let allow_http = endpoint.starts_with("http://");
            builder = builder.with_endpoint(endpoint).with_allow_http(allow_http);
        }

        let store = builder
            .build()
            .map_err(|e| StorageError::ConfigError(e.to_string()))?;

        Ok(Self::new(Arc::new(store), StorageBackend::S3, bucket))
    }

    /// Create a Google Cloud Storage storage using application default credentials
    pub fn gcs(bucket: String) -> StorageResult<Self> {
        let store = GoogleCloudStorageBuilder::from_env()
            .with_bucket_name(bucket.clone())
            .build()
            .map_err(|e| StorageError::ConfigError(e.to_string()))?;

        Ok(Self::new(Arc::new(store), StorageBackend::Gcs, bucket))
    }

    /// Create a process-local in-memory storage
    pub fn in_memory() -> Self {
        Self::new(
            Arc::new(InMemory::new()),
            StorageBackend::Memory,
            "memory".to_string(),
        )
    }

    fn location(key: &str) -> StorageResult<Path> {
        validate_key(key)?;
        Ok(Path::from(key))
    }

    fn put_options(mode: PutMode, content_type: &str) -> PutOptions {
        let mut attributes = Attributes::new();
        attributes.insert(
            Attribute::ContentType,
            AttributeValue::from(content_type.to_string()),
        );
        PutOptions {
            mode,
            attributes,
            ..Default::default()
        }
    }
}

#[async_trait]
impl Storage for ObjectStoreStorage {
    async fn put(&self, key: &str, data: Bytes, content_type: &str) -> StorageResult<()> {
        let location = Self::location(key)?;
        let size = data.len();
        let start = std::time::Instant::now();

        self.store
            .put_opts(
                &location,
                PutPayload::from(data),
                Self::put_options(PutMode::Overwrite, content_type),
            )
            .await
            .map_err(|e| {
                tracing::error!(
                    error = %e,
                    bucket = %self.bucket,
                    key = %key,
                    size_bytes = size,
                    duration_ms = start.elapsed().as_secs_f64() * 1000.0,
                    "Object put failed"
                );
                StorageError::UploadFailed(e.to_string())
            })?;

        tracing::info!(
            bucket = %self.bucket,
            key = %key,
            size_bytes = size,
            duration_ms = start.elapsed().as_secs_f64() * 1000.0,
            "Object put successful"
        );

        Ok(())
    }

    async fn put_if_absent(
        &self,
        key: &str,
        data: Bytes,
        content_type: &str,
    ) -> StorageResult<bool> {
        let location = Self::location(key)?;
        let size = data.len();
        let start = std::time::Instant::now();

        let result = self
            .store
            .put_opts(
                &location,
                PutPayload::from(data),
                Self::put_options(PutMode::Create, content_type),
            )
            .await;

        match result {
            Ok(_) => {
                tracing::info!(
                    bucket = %self.bucket,
                    key = %key,
                    size_bytes = size,
                    duration_ms = start.elapsed().as_secs_f64() * 1000.0,
                    "Object create successful"
                );
                Ok(true)
            }
            Err(ObjectStoreError::AlreadyExists { .. })
            | Err(ObjectStoreError::Precondition { .. }) => {
                tracing::debug!(bucket = %self.bucket, key = %key, "Object already exists");
                Ok(false)
            }
            Err(e) => {
                tracing::error!(
                    error = %e,
                    bucket = %self.bucket,
                    key = %key,
                    "Object create failed"
                );
                Err(StorageError::UploadFailed(e.to_string()))
            }
        }
    }

    async fn get(&self, key: &str) -> StorageResult<Bytes> {
        let location = Self::location(key)?;
        let start = std::time::Instant::now();

        let map_err = |e: ObjectStoreError| match e {
            ObjectStoreError::NotFound { .. } => StorageError::NotFound(key.to_string()),
            other => {
                tracing::error!(
                    error = %other,
                    bucket = %self.bucket,
                    key = %key,
                    "Object get failed"
                );
                StorageError::DownloadFailed(other.to_string())
            }
        };

        let result = self.store.get(&location).await.map_err(map_err)?;
        let bytes = result.bytes().await.map_err(map_err)?;

        tracing::debug!(
            bucket = %self.bucket,
            key = %key,
            size_bytes = bytes.len(),
            duration_ms = start.elapsed().as_secs_f64() * 1000.0,
            "Object get successful"
        );

        Ok(bytes)
    }

    async fn exists(&self, key: &str) -> StorageResult<bool> {
        let location = Self::location(key)?;
        match self.store.head(&location).await {
            Ok(_) => Ok(true),
            Err(ObjectStoreError::NotFound { .. }) => Ok(false),
            Err(e) => Err(StorageError::BackendError(e.to_string())),
        }
    }

    async fn delete(&self, key: &str) -> StorageResult<()> {
        let location = Self::location(key)?;
        match self.store.delete(&location).await {
            Ok(()) | Err(ObjectStoreError::NotFound { .. }) => {
                tracing::info!(bucket = %self.bucket, key = %key, "Object delete successful");
                Ok(())
            }
            Err(e) => Err(StorageError::DeleteFailed(e.to_string())),
        }
    }

    fn backend_type(&self) -> StorageBackend {
        self.backend
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_in_memory_put_if_absent() {
        let storage = ObjectStoreStorage::in_memory();

        assert!(storage
            .put_if_absent("processed/u1", Bytes::from_static(b"one"), "image/jpeg")
            .await
            .unwrap());
        assert!(!storage
            .put_if_absent("processed/u1", Bytes::from_static(b"two"), "image/jpeg")
            .await
            .unwrap());
        assert_eq!(
            storage.get("processed/u1").await.unwrap(),
            Bytes::from_static(b"one")
        );
    }

    #[tokio::test]
    async fn test_in_memory_get_missing_is_not_found() {
        let storage = ObjectStoreStorage::in_memory();
        assert!(matches!(
            storage.get("uploads/none").await,
            Err(StorageError::NotFound(_))
        ));
        assert!(!storage.exists("uploads/none").await.unwrap());
    }

    #[tokio::test]
    async fn test_in_memory_delete() {
        let storage = ObjectStoreStorage::in_memory();
        storage
            .put("uploads/u2", Bytes::from_static(b"x"), "image/png")
            .await
            .unwrap();
        storage.delete("uploads/u2").await.unwrap();
        assert!(!storage.exists("uploads/u2").await.unwrap());
        assert_eq!(storage.backend_type(), StorageBackend::Memory);
    }
}
