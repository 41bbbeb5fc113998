use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{ProcessedResult, ResultStatus};
use crate::constants::COMPLETION_EVENT_TYPE;

/// One line of the completion log, keyed by `upload_id`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompletionRecord {
    pub event_type: String,
    pub upload_id: Uuid,
    pub status: ResultStatus,
    pub source_object_key: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result_object_key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_detail: Option<String>,
    pub processed_at: DateTime<Utc>,
    pub pipeline_completed_at: DateTime<Utc>,
    pub message_id: String,
}

impl CompletionRecord {
    pub fn from_result(result: &ProcessedResult, message_id: impl Into<String>) -> Self {
        Self {
            event_type: COMPLETION_EVENT_TYPE.to_string(),
            upload_id: result.upload_id,
            status: result.status,
            source_object_key: result.source_object_key.clone(),
            result_object_key: result.result_object_key.clone(),
            error_detail: result.error_detail.clone(),
            processed_at: result.processed_at,
            pipeline_completed_at: Utc::now(),
            message_id: message_id.into(),
        }
    }
}
