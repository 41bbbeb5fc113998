//! Processing worker
//!
//! Consumes processing requests, transforms the source image and publishes exactly one
//! terminal result per upload. Every step is idempotent on `upload_id`:
//!
//! 1. An existing result manifest is republished as-is.
//! 2. An existing processed object (crash between the two writes) becomes a success result.
//! 3. Otherwise the source is fetched, transformed and written create-if-absent.
//!
//! The manifest is written create-if-absent as well; a worker that loses that race
//! publishes the winner's manifest instead of its own.

use async_trait::async_trait;
use imagepipe_core::constants::{ATTR_STATUS, ATTR_UPLOAD_ID};
use imagepipe_core::models::{ProcessedResult, ProcessingMessage};
use imagepipe_core::{AppError, WorkerConfig};
use imagepipe_processing::{ImageTransform, TransformError, TransformedImage};
use imagepipe_storage::keys::{processed_key, result_manifest_key};
use imagepipe_storage::{Storage, StorageError};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::handler::MessageHandler;
use crate::queue::{publish_json, Attributes, Delivery, MessageQueue};

const MANIFEST_CONTENT_TYPE: &str = "application/json";

#[derive(Debug, Clone)]
pub struct ProcessingWorkerConfig {
    /// Ceiling for one transformation attempt
    pub transform_timeout: Duration,
    /// Transformation attempts before the upload is recorded as failed
    pub local_attempts: u32,
    pub publish_timeout: Duration,
}

impl Default for ProcessingWorkerConfig {
    fn default() -> Self {
        Self {
            transform_timeout: Duration::from_secs(120),
            local_attempts: 2,
            publish_timeout: Duration::from_secs(10),
        }
    }
}

impl ProcessingWorkerConfig {
    pub fn from_config(worker: &WorkerConfig, publish_timeout_secs: u64) -> Self {
        Self {
            transform_timeout: Duration::from_secs(worker.transform_timeout_secs),
            local_attempts: worker.transform_local_attempts.max(1),
            publish_timeout: Duration::from_secs(publish_timeout_secs),
        }
    }
}

pub struct ProcessingWorker {
    storage: Arc<dyn Storage>,
    results: Arc<dyn MessageQueue>,
    transform: Arc<dyn ImageTransform>,
    config: ProcessingWorkerConfig,
}

impl ProcessingWorker {
    pub fn new(
        storage: Arc<dyn Storage>,
        results: Arc<dyn MessageQueue>,
        transform: Arc<dyn ImageTransform>,
        config: ProcessingWorkerConfig,
    ) -> Self {
        Self {
            storage,
            results,
            transform,
            config,
        }
    }

    /// Produce the terminal result for `message`, writing the processed object and the
    /// manifest as needed. Returns the result that must be published.
    #[tracing::instrument(skip(self, message), fields(upload_id = %message.upload_id))]
    pub async fn process(&self, message: &ProcessingMessage) -> Result<ProcessedResult, AppError> {
        let manifest_key = result_manifest_key(message.upload_id);

        if let Some(existing) = self.load_manifest(&manifest_key).await? {
            tracing::info!(
                status = %existing.status,
                "Result manifest already exists, republishing"
            );
            return Ok(existing);
        }

        let output_key = processed_key(message.upload_id);
        let result = if self.storage.exists(&output_key).await? {
            tracing::info!(key = %output_key, "Processed object already exists, skipping transform");
            ProcessedResult::success(message, &output_key, "image/jpeg")
        } else {
            self.transform_source(message, &output_key).await?
        };

        self.commit_manifest(&manifest_key, result).await
    }

    async fn transform_source(
        &self,
        message: &ProcessingMessage,
        output_key: &str,
    ) -> Result<ProcessedResult, AppError> {
        let source = self
            .storage
            .get(&message.source_object_key)
            .await
            .map_err(|e| match e {
                StorageError::NotFound(_) => {
                    AppError::SourceMissing(message.source_object_key.clone())
                }
                other => other.into(),
            })?;

        tracing::debug!(
            key = %message.source_object_key,
            size = source.len(),
            "Fetched source image"
        );

        match self.transform_with_retry(source).await? {
            Ok(transformed) => {
                let created = self
                    .storage
                    .put_if_absent(output_key, transformed.data, transformed.content_type)
                    .await?;
                if !created {
                    tracing::info!(key = %output_key, "Processed object written concurrently");
                }
                tracing::info!(
                    key = %output_key,
                    width = transformed.width,
                    height = transformed.height,
                    "Stored processed image"
                );
                Ok(ProcessedResult::success(
                    message,
                    output_key,
                    transformed.content_type,
                ))
            }
            Err(e) => {
                tracing::warn!(
                    error = %e,
                    attempts = self.config.local_attempts,
                    "Transformation failed, recording failed result"
                );
                Ok(ProcessedResult::failed(message, e.to_string()))
            }
        }
    }

    /// Run the transform up to `local_attempts` times on the blocking pool.
    ///
    /// The outer error is a delivery-level failure (timeout); the inner one is the
    /// application-level transform failure after the last attempt.
    async fn transform_with_retry(
        &self,
        source: bytes::Bytes,
    ) -> Result<Result<TransformedImage, TransformError>, AppError> {
        let attempts = self.config.local_attempts.max(1);
        let mut last_error = None;

        for attempt in 1..=attempts {
            let transform = self.transform.clone();
            let data = source.clone();
            let start = Instant::now();
            let task = tokio::task::spawn_blocking(move || transform.transform(&data));

            let outcome = match tokio::time::timeout(self.config.transform_timeout, task).await {
                Err(_) => {
                    return Err(AppError::Timeout(format!(
                        "{} transform exceeded {:?}",
                        self.transform.name(),
                        self.config.transform_timeout
                    )))
                }
                Ok(Err(join_error)) => Err(TransformError::Decode(format!(
                    "transform task aborted: {}",
                    join_error
                ))),
                Ok(Ok(outcome)) => outcome,
            };

            match outcome {
                Ok(transformed) => {
                    tracing::debug!(
                        transform = self.transform.name(),
                        attempt = attempt,
                        duration_ms = start.elapsed().as_millis() as u64,
                        "Transformation succeeded"
                    );
                    return Ok(Ok(transformed));
                }
                Err(e) => {
                    tracing::debug!(attempt = attempt, error = %e, "Transformation attempt failed");
                    last_error = Some(e);
                }
            }
        }

        Ok(Err(last_error.unwrap_or_else(|| {
            TransformError::Unsupported("no transform attempts".to_string())
        })))
    }

    async fn load_manifest(&self, key: &str) -> Result<Option<ProcessedResult>, AppError> {
        let bytes = match self.storage.get(key).await {
            Ok(bytes) => bytes,
            Err(StorageError::NotFound(_)) => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        serde_json::from_slice(&bytes)
            .map(Some)
            .map_err(|e| AppError::Internal(format!("Corrupt result manifest {}: {}", key, e)))
    }

    async fn commit_manifest(
        &self,
        key: &str,
        result: ProcessedResult,
    ) -> Result<ProcessedResult, AppError> {
        let body = serde_json::to_vec(&result)
            .map_err(|e| AppError::Internal(format!("Failed to serialize result: {}", e)))?;

        if self
            .storage
            .put_if_absent(key, body.into(), MANIFEST_CONTENT_TYPE)
            .await?
        {
            return Ok(result);
        }

        tracing::info!(key = %key, "Lost result manifest race, using the stored manifest");
        self.load_manifest(key)
            .await?
            .ok_or_else(|| AppError::Storage(format!("Result manifest {} vanished", key)))
    }
}

#[async_trait]
impl MessageHandler for ProcessingWorker {
    fn name(&self) -> &'static str {
        "processing"
    }

    async fn handle(&self, delivery: &Delivery) -> Result<(), AppError> {
        let message: ProcessingMessage = delivery.decode()?;
        if message.source_object_key.trim().is_empty() {
            return Err(AppError::MalformedMessage(format!(
                "message {}: empty source_object_key",
                delivery.message_id
            )));
        }

        let result = self.process(&message).await?;

        let mut attributes = Attributes::new();
        attributes.insert(ATTR_UPLOAD_ID.to_string(), result.upload_id.to_string());
        attributes.insert(ATTR_STATUS.to_string(), result.status.to_string());

        let message_id = publish_json(
            self.results.as_ref(),
            &result,
            attributes,
            self.config.publish_timeout,
        )
        .await?;

        tracing::info!(
            upload_id = %result.upload_id,
            status = %result.status,
            result_message_id = %message_id,
            "Published processing result"
        );
        Ok(())
    }
}
