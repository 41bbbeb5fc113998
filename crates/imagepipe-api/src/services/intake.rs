//! Intake service
//!
//! Accepts an authenticated upload: validates it, rejects a reused `upload_id`, applies
//! the per-caller rate limit, stores the bytes under `uploads/{upload_id}`
//! (create-if-absent) and only then publishes the processing request. Once the write has
//! started, any failure or cancellation before the publish completes deletes the object
//! in the background.

use bytes::Bytes;
use imagepipe_core::constants::ATTR_UPLOAD_ID;
use imagepipe_core::models::{ProcessingMessage, UploadAccepted, UploadRequest};
use imagepipe_core::{AppError, Config};
use imagepipe_infra::RateLimiter;
use imagepipe_processing::{normalize_content_type, UploadValidator};
use imagepipe_storage::keys::upload_key;
use imagepipe_storage::Storage;
use imagepipe_worker::{publish_json, Attributes, MessageQueue};
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

use crate::auth::{authenticate, Caller, KeyStore};

/// Raw upload as read from the request
#[derive(Debug, Clone)]
pub struct IncomingUpload {
    pub data: Bytes,
    pub content_type: String,
    pub filename: Option<String>,
    /// Client-supplied id; generated when absent
    pub upload_id: Option<String>,
}

pub struct IntakeService {
    storage: Arc<dyn Storage>,
    requests: Arc<dyn MessageQueue>,
    key_store: Arc<dyn KeyStore>,
    rate_limiter: Arc<RateLimiter>,
    validator: UploadValidator,
    publish_timeout: Duration,
    upload_timeout: Duration,
}

impl IntakeService {
    pub fn new(
        config: &Config,
        storage: Arc<dyn Storage>,
        requests: Arc<dyn MessageQueue>,
        key_store: Arc<dyn KeyStore>,
        rate_limiter: Arc<RateLimiter>,
    ) -> Self {
        let intake = config.intake();
        Self {
            storage,
            requests,
            key_store,
            rate_limiter,
            validator: UploadValidator::new(
                intake.max_file_size_bytes,
                intake.allowed_extensions.clone(),
                intake.allowed_content_types.clone(),
            ),
            publish_timeout: Duration::from_secs(config.queue().publish_timeout_secs),
            upload_timeout: Duration::from_secs(intake.upload_timeout_secs),
        }
    }

    /// Wall-clock ceiling for one upload, reading the body included
    pub fn upload_timeout(&self) -> Duration {
        self.upload_timeout
    }

    pub fn max_file_size(&self) -> usize {
        self.validator.max_file_size()
    }

    pub async fn authenticate(&self, api_key: Option<&str>) -> Result<Caller, AppError> {
        authenticate(self.key_store.as_ref(), api_key).await
    }

    /// Validate, rate limit, store and enqueue one upload
    #[tracing::instrument(
        skip(self, caller, upload),
        fields(caller = %caller.fingerprint, size = upload.data.len())
    )]
    pub async fn accept(
        &self,
        caller: &Caller,
        upload: IncomingUpload,
    ) -> Result<UploadAccepted, AppError> {
        self.validator.validate_all(
            upload.filename.as_deref(),
            &upload.content_type,
            &upload.data,
        )?;

        let upload_id = match upload.upload_id.as_deref().map(str::trim) {
            Some(raw) if !raw.is_empty() => {
                let upload_id = Uuid::parse_str(raw)?;
                // Checked before admission; put_if_absent below stays authoritative.
                if self.storage.exists(&upload_key(upload_id)).await? {
                    return Err(already_used(upload_id));
                }
                upload_id
            }
            _ => Uuid::new_v4(),
        };

        self.rate_limiter
            .check_rate_limit(&caller.fingerprint)
            .await
            .map_err(|retry_after| AppError::RateLimited {
                // Rounded up to whole seconds.
                retry_after_secs: retry_after.as_secs()
                    + u64::from(retry_after.subsec_nanos() > 0),
            })?;

        let request = UploadRequest {
            upload_id,
            object_key: upload_key(upload_id),
            content_type: normalize_content_type(&upload.content_type),
            original_filename: upload.filename,
            data: upload.data,
        };

        let guard = OrphanGuard::new(self.storage.clone(), request.object_key.clone());
        if !self.store(&request).await? {
            guard.keep();
            return Err(already_used(request.upload_id));
        }
        self.enqueue(&request).await?;
        guard.keep();

        tracing::info!(
            upload_id = %request.upload_id,
            key = %request.object_key,
            content_type = %request.content_type,
            "Upload accepted"
        );

        Ok(UploadAccepted::new(request.upload_id, request.object_key))
    }

    /// Returns `false` when an object already exists under the key
    async fn store(&self, request: &UploadRequest) -> Result<bool, AppError> {
        let created = self
            .storage
            .put_if_absent(
                &request.object_key,
                request.data.clone(),
                &request.content_type,
            )
            .await?;

        if created {
            tracing::debug!(key = %request.object_key, size = request.size(), "Stored source image");
        }
        Ok(created)
    }

    async fn enqueue(&self, request: &UploadRequest) -> Result<(), AppError> {
        let message = ProcessingMessage::from_upload(request);
        let mut attributes = Attributes::new();
        attributes.insert(ATTR_UPLOAD_ID.to_string(), request.upload_id.to_string());

        match publish_json(
            self.requests.as_ref(),
            &message,
            attributes,
            self.publish_timeout,
        )
        .await
        {
            Ok(message_id) => {
                tracing::debug!(message_id = %message_id, "Processing request published");
                Ok(())
            }
            Err(e) => {
                tracing::error!(
                    upload_id = %request.upload_id,
                    error = %e,
                    "Failed to publish processing request, removing stored image"
                );
                Err(AppError::Queue(e.to_string()))
            }
        }
    }
}

fn already_used(upload_id: Uuid) -> AppError {
    AppError::BadRequest(format!("upload_id {} already used", upload_id))
}

/// Deletes the upload object on drop unless [`OrphanGuard::keep`] was called.
///
/// Covers every exit between starting the write and a successful publish: errors, a
/// write that timed out after landing, and cancellation of the whole request.
struct OrphanGuard {
    storage: Arc<dyn Storage>,
    key: Option<String>,
}

impl OrphanGuard {
    fn new(storage: Arc<dyn Storage>, key: String) -> Self {
        Self {
            storage,
            key: Some(key),
        }
    }

    fn keep(mut self) {
        self.key = None;
    }
}

impl Drop for OrphanGuard {
    fn drop(&mut self) {
        let Some(key) = self.key.take() else {
            return;
        };
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            tracing::warn!(key = %key, "No runtime to remove orphaned upload");
            return;
        };

        let storage = self.storage.clone();
        runtime.spawn(async move {
            match storage.delete(&key).await {
                Ok(()) => tracing::info!(key = %key, "Removed orphaned upload"),
                Err(e) => tracing::warn!(
                    error = %e,
                    key = %key,
                    "Failed to remove orphaned upload"
                ),
            }
        });
    }
}
