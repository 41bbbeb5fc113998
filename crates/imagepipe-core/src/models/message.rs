use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use super::UploadRequest;

/// Request to process one stored upload, published on the request channel.
///
/// Consumed at-least-once; handlers must be idempotent on `upload_id`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct ProcessingMessage {
    pub upload_id: Uuid,
    pub source_object_key: String,
    pub uploaded_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub original_filename: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_type: Option<String>,
}

impl ProcessingMessage {
    pub fn from_upload(request: &UploadRequest) -> Self {
        Self {
            upload_id: request.upload_id,
            source_object_key: request.object_key.clone(),
            uploaded_at: Utc::now(),
            original_filename: request.original_filename.clone(),
            content_type: Some(request.content_type.clone()),
        }
    }
}
