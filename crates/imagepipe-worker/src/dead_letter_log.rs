//! Durable dead-letter store
//!
//! Queue channels hand every dead-lettered message to a [`DeadLetterLog`] so the records
//! survive a restart and can be inspected or replayed by an operator.

use async_trait::async_trait;
use imagepipe_core::models::DeadLetterRecord;
use imagepipe_core::AppError;
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;

use crate::jsonl::JsonlFile;

#[async_trait]
pub trait DeadLetterLog: Send + Sync {
    async fn record(&self, record: &DeadLetterRecord) -> Result<(), AppError>;

    /// Records dead-lettered on `channel`, oldest first
    async fn list(&self, channel: &str) -> Result<Vec<DeadLetterRecord>, AppError>;
}

struct LogState {
    file: JsonlFile,
    records: Vec<DeadLetterRecord>,
}

/// Append-only JSON-lines dead-letter log shared by all channels
pub struct JsonlDeadLetterLog {
    path: PathBuf,
    state: Mutex<LogState>,
}

impl JsonlDeadLetterLog {
    pub async fn open(path: impl AsRef<Path>) -> Result<Self, AppError> {
        let (file, records) = JsonlFile::open::<DeadLetterRecord>(path).await?;
        let path = file.path().to_path_buf();

        tracing::info!(
            path = %path.display(),
            records = records.len(),
            "Dead-letter log opened"
        );

        Ok(Self {
            path,
            state: Mutex::new(LogState { file, records }),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl DeadLetterLog for JsonlDeadLetterLog {
    async fn record(&self, record: &DeadLetterRecord) -> Result<(), AppError> {
        let mut state = self.state.lock().await;
        state.file.append(record).await?;
        state.records.push(record.clone());
        Ok(())
    }

    async fn list(&self, channel: &str) -> Result<Vec<DeadLetterRecord>, AppError> {
        Ok(self
            .state
            .lock()
            .await
            .records
            .iter()
            .filter(|r| r.channel == channel)
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use std::collections::HashMap;
    use tempfile::TempDir;

    fn record(channel: &str, message_id: &str) -> DeadLetterRecord {
        DeadLetterRecord {
            message_id: message_id.to_string(),
            channel: channel.to_string(),
            payload: serde_json::json!({ "upload_id": "u" }),
            attributes: HashMap::new(),
            delivery_attempts: 5,
            first_published_at: Utc::now(),
            dead_lettered_at: Utc::now(),
            last_error: Some("boom".to_string()),
        }
    }

    #[tokio::test]
    async fn test_records_survive_reopen() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("dead-letters.jsonl");

        {
            let log = JsonlDeadLetterLog::open(&path).await.unwrap();
            log.record(&record("requests", "m-1")).await.unwrap();
            log.record(&record("results", "m-2")).await.unwrap();
        }

        let log = JsonlDeadLetterLog::open(&path).await.unwrap();
        let requests = log.list("requests").await.unwrap();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].message_id, "m-1");
        assert_eq!(requests[0].last_error.as_deref(), Some("boom"));
        assert_eq!(log.list("results").await.unwrap().len(), 1);
    }
}
