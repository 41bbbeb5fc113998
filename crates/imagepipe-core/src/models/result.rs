use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter, Result as FmtResult};
use utoipa::ToSchema;
use uuid::Uuid;

use super::ProcessingMessage;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum ResultStatus {
    Success,
    Failed,
}

impl Display for ResultStatus {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        match self {
            ResultStatus::Success => write!(f, "success"),
            ResultStatus::Failed => write!(f, "failed"),
        }
    }
}

/// Terminal outcome of processing one upload.
///
/// Stored as the result manifest and published on the result channel. At most one
/// exists per `upload_id`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct ProcessedResult {
    pub upload_id: Uuid,
    pub source_object_key: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result_object_key: Option<String>,
    pub status: ResultStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_detail: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub original_filename: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result_content_type: Option<String>,
    pub processed_at: DateTime<Utc>,
}

impl ProcessedResult {
    pub fn success(
        message: &ProcessingMessage,
        result_object_key: impl Into<String>,
        result_content_type: impl Into<String>,
    ) -> Self {
        Self {
            upload_id: message.upload_id,
            source_object_key: message.source_object_key.clone(),
            result_object_key: Some(result_object_key.into()),
            status: ResultStatus::Success,
            error_detail: None,
            original_filename: message.original_filename.clone(),
            result_content_type: Some(result_content_type.into()),
            processed_at: Utc::now(),
        }
    }

    pub fn failed(message: &ProcessingMessage, error_detail: impl Into<String>) -> Self {
        Self {
            upload_id: message.upload_id,
            source_object_key: message.source_object_key.clone(),
            result_object_key: None,
            status: ResultStatus::Failed,
            error_detail: Some(error_detail.into()),
            original_filename: message.original_filename.clone(),
            result_content_type: None,
            processed_at: Utc::now(),
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == ResultStatus::Success
    }
}
