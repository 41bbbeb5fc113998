//! Notification worker: records each terminal result once in the completion log.

use async_trait::async_trait;
use imagepipe_core::models::{CompletionRecord, ProcessedResult};
use imagepipe_core::AppError;
use std::sync::Arc;

use crate::completion_log::CompletionLog;
use crate::handler::MessageHandler;
use crate::queue::Delivery;

pub struct NotificationWorker {
    log: Arc<dyn CompletionLog>,
}

impl NotificationWorker {
    pub fn new(log: Arc<dyn CompletionLog>) -> Self {
        Self { log }
    }
}

#[async_trait]
impl MessageHandler for NotificationWorker {
    fn name(&self) -> &'static str {
        "notification"
    }

    async fn handle(&self, delivery: &Delivery) -> Result<(), AppError> {
        let result: ProcessedResult = delivery.decode()?;
        let record = CompletionRecord::from_result(&result, delivery.message_id.clone());

        if self.log.append_if_absent(record.clone()).await? {
            tracing::info!(
                event_type = %record.event_type,
                upload_id = %record.upload_id,
                status = %record.status,
                source_object_key = %record.source_object_key,
                result_object_key = record.result_object_key.as_deref(),
                error_detail = record.error_detail.as_deref(),
                processed_at = %record.processed_at,
                pipeline_completed_at = %record.pipeline_completed_at,
                "Image processing complete"
            );
        } else {
            tracing::debug!(
                upload_id = %record.upload_id,
                message_id = %delivery.message_id,
                "Completion already recorded, ignoring duplicate"
            );
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::completion_log::JsonlCompletionLog;
    use crate::queue::Attributes;
    use bytes::Bytes;
    use chrono::Utc;
    use imagepipe_core::models::{ProcessingMessage, ResultStatus};
    use tempfile::TempDir;
    use uuid::Uuid;

    fn result_delivery(result: &ProcessedResult, message_id: &str) -> Delivery {
        Delivery {
            ack_id: format!("ack-{}", message_id),
            message_id: message_id.to_string(),
            data: Bytes::from(serde_json::to_vec(result).unwrap()),
            attributes: Attributes::new(),
            delivery_attempt: 1,
            published_at: Utc::now(),
        }
    }

    fn failed_result() -> ProcessedResult {
        let upload_id = Uuid::new_v4();
        let message = ProcessingMessage {
            upload_id,
            source_object_key: format!("uploads/{}", upload_id),
            uploaded_at: Utc::now(),
            original_filename: None,
            content_type: None,
        };
        ProcessedResult::failed(&message, "cannot decode")
    }

    #[tokio::test]
    async fn test_records_completion_once() {
        let dir = TempDir::new().unwrap();
        let log = Arc::new(
            JsonlCompletionLog::open(dir.path().join("completions.jsonl"))
                .await
                .unwrap(),
        );
        let worker = NotificationWorker::new(log.clone());
        let result = failed_result();

        worker.handle(&result_delivery(&result, "m-1")).await.unwrap();
        worker.handle(&result_delivery(&result, "m-2")).await.unwrap();

        assert_eq!(log.len().await, 1);
        let record = log.get(result.upload_id).await.unwrap().unwrap();
        assert_eq!(record.status, ResultStatus::Failed);
        assert_eq!(record.message_id, "m-1");
        assert_eq!(record.event_type, "IMAGE_PROCESSING_COMPLETE");
    }

    #[tokio::test]
    async fn test_undecodable_result_is_malformed() {
        let dir = TempDir::new().unwrap();
        let log = Arc::new(
            JsonlCompletionLog::open(dir.path().join("completions.jsonl"))
                .await
                .unwrap(),
        );
        let worker = NotificationWorker::new(log);
        let mut delivery = result_delivery(&failed_result(), "m-1");
        delivery.data = Bytes::from_static(b"{\"upload_id\": 7}");

        let err = worker.handle(&delivery).await.unwrap_err();
        assert!(matches!(err, AppError::MalformedMessage(_)));
    }
}
