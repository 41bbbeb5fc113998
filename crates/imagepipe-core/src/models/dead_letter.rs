use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use utoipa::ToSchema;

/// A message moved to a channel's dead-letter list. Never retried automatically.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct DeadLetterRecord {
    pub message_id: String,
    pub channel: String,
    /// Original payload; JSON when it decodes, otherwise the lossy UTF-8 text
    #[schema(value_type = Object)]
    pub payload: serde_json::Value,
    pub attributes: HashMap<String, String>,
    pub delivery_attempts: u32,
    pub first_published_at: DateTime<Utc>,
    pub dead_lettered_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
}

impl DeadLetterRecord {
    pub fn payload_from_bytes(data: &[u8]) -> serde_json::Value {
        serde_json::from_slice(data)
            .unwrap_or_else(|_| serde_json::Value::String(String::from_utf8_lossy(data).into()))
    }
}

/// Response body for the dead-letter listing endpoint
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct DeadLetterList {
    pub total: usize,
    pub records: Vec<DeadLetterRecord>,
}
