use crate::{
    LocalStorage, ObjectStoreStorage, Storage, StorageBackend, StorageError, StorageResult,
    TimedStorage,
};
use imagepipe_core::StorageConfig;
use std::sync::Arc;
use std::time::Duration;

/// Create the configured storage backend, bounded by the configured I/O timeout
pub async fn create_storage(config: &StorageConfig) -> StorageResult<Arc<dyn Storage>> {
    let storage: Arc<dyn Storage> = match config.backend {
        StorageBackend::S3 => {
            let bucket = config
                .s3_bucket
                .clone()
                .ok_or_else(|| StorageError::ConfigError("S3_BUCKET not configured".to_string()))?;
            let region = config.s3_region.clone().ok_or_else(|| {
                StorageError::ConfigError("S3_REGION or AWS_REGION not configured".to_string())
            })?;
            Arc::new(ObjectStoreStorage::s3(
                bucket,
                region,
                config.s3_endpoint.clone(),
            )?)
        }
        StorageBackend::Gcs => {
            let bucket = config
                .gcs_bucket
                .clone()
                .ok_or_else(|| StorageError::ConfigError("GCS_BUCKET not configured".to_string()))?;
            Arc::new(ObjectStoreStorage::gcs(bucket)?)
        }
        StorageBackend::Local => {
            let base_path = config.local_storage_path.clone().ok_or_else(|| {
                StorageError::ConfigError("LOCAL_STORAGE_PATH not configured".to_string())
            })?;
            Arc::new(LocalStorage::new(base_path).await?)
        }
        StorageBackend::Memory => Arc::new(ObjectStoreStorage::in_memory()),
    };

    tracing::info!(
        backend = %config.backend,
        timeout_secs = config.timeout_secs,
        "Storage backend initialized"
    );

    Ok(Arc::new(TimedStorage::new(
        storage,
        Duration::from_secs(config.timeout_secs),
    )))
}
