use bytes::Bytes;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::constants::{ACCEPTED_MESSAGE, STATUS_PROCESSING};

/// An image accepted by intake validation, ready to be stored.
///
/// Immutable once stored: the object key is derived from `upload_id` and written
/// create-if-absent.
#[derive(Debug, Clone)]
pub struct UploadRequest {
    pub upload_id: Uuid,
    pub data: Bytes,
    pub content_type: String,
    pub original_filename: Option<String>,
    pub object_key: String,
}

impl UploadRequest {
    pub fn size(&self) -> usize {
        self.data.len()
    }
}

/// Response body for an accepted upload (HTTP 202)
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct UploadAccepted {
    pub upload_id: Uuid,
    /// Object key of the stored source image
    pub object_name: String,
    pub message: String,
    pub status: String,
}

impl UploadAccepted {
    pub fn new(upload_id: Uuid, object_name: impl Into<String>) -> Self {
        Self {
            upload_id,
            object_name: object_name.into(),
            message: ACCEPTED_MESSAGE.to_string(),
            status: STATUS_PROCESSING.to_string(),
        }
    }
}
