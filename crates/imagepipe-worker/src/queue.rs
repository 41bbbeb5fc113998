//! Message queue boundary: at-least-once channels with bounded redelivery.
//!
//! A channel hands out [`Delivery`] values that stay invisible to other receivers until
//! they are acknowledged, negatively acknowledged or their ack deadline expires. Each
//! failed delivery counts as one attempt; once a message has used
//! [`RedeliveryPolicy::max_delivery_attempts`] it is moved to the channel's dead-letter
//! list and never delivered again.

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use imagepipe_core::models::DeadLetterRecord;
use imagepipe_core::{AppError, QueueConfig};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::HashMap;
use std::time::Duration;

/// Message attributes (string key/value metadata delivered alongside the payload)
pub type Attributes = HashMap<String, String>;

#[derive(Debug, thiserror::Error)]
pub enum QueueError {
    #[error("Publish timed out after {0:?}")]
    PublishTimeout(Duration),

    #[error("Unknown or expired ack id: {0}")]
    UnknownAckId(String),

    #[error("Failed to serialize message: {0}")]
    Serialization(String),

    #[error("Queue backend error: {0}")]
    Backend(String),
}

impl From<QueueError> for AppError {
    fn from(err: QueueError) -> Self {
        match err {
            QueueError::PublishTimeout(after) => {
                AppError::Timeout(format!("queue publish after {:?}", after))
            }
            other => AppError::Queue(other.to_string()),
        }
    }
}

/// One delivery of a message to a consumer
#[derive(Debug, Clone)]
pub struct Delivery {
    /// Handle for ack/nack; unique per delivery
    pub ack_id: String,
    /// Stable across redeliveries of the same message
    pub message_id: String,
    pub data: Bytes,
    pub attributes: Attributes,
    /// 1 for the first delivery, incremented on every redelivery
    pub delivery_attempt: u32,
    pub published_at: DateTime<Utc>,
}

impl Delivery {
    /// Decode the JSON payload. Undecodable payloads are [`AppError::MalformedMessage`].
    pub fn decode<T: DeserializeOwned>(&self) -> Result<T, AppError> {
        serde_json::from_slice(&self.data).map_err(|e| {
            AppError::MalformedMessage(format!("message {}: {}", self.message_id, e))
        })
    }
}

/// Result of a negative acknowledgement
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NackOutcome {
    /// Message will be delivered again after the backoff
    Redelivered { after: Duration },
    /// Attempt budget exhausted; message moved to the dead-letter list
    DeadLettered,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct QueueStats {
    pub channel: String,
    /// Messages waiting for delivery, including those in backoff
    pub ready: usize,
    pub in_flight: usize,
    pub dead_lettered: usize,
    pub published: u64,
    pub acked: u64,
}

/// Redelivery budget and backoff between attempts
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RedeliveryPolicy {
    pub max_delivery_attempts: u32,
    pub min_backoff: Duration,
    pub max_backoff: Duration,
}

impl Default for RedeliveryPolicy {
    fn default() -> Self {
        Self {
            max_delivery_attempts: 5,
            min_backoff: Duration::from_secs(10),
            max_backoff: Duration::from_secs(300),
        }
    }
}

impl From<&QueueConfig> for RedeliveryPolicy {
    fn from(config: &QueueConfig) -> Self {
        Self {
            max_delivery_attempts: config.max_delivery_attempts,
            min_backoff: Duration::from_secs(config.min_backoff_secs),
            max_backoff: Duration::from_secs(config.max_backoff_secs),
        }
    }
}

impl RedeliveryPolicy {
    /// Whether a message that just failed its `attempt`-th delivery is out of budget
    pub fn should_dead_letter(&self, attempt: u32) -> bool {
        attempt >= self.max_delivery_attempts
    }

    /// Delay before redelivering after the `attempt`-th failed delivery:
    /// `min(min_backoff * 2^(attempt-1), max_backoff)`
    pub fn backoff(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(31);
        self.min_backoff
            .checked_mul(1u32 << exponent)
            .unwrap_or(self.max_backoff)
            .min(self.max_backoff)
    }
}

/// A queue channel with dead-letter support
#[async_trait]
pub trait MessageQueue: Send + Sync {
    /// Channel name, used in logs and dead-letter records
    fn channel(&self) -> &str;

    /// Publish a message and return its id
    async fn publish(&self, data: Bytes, attributes: Attributes) -> Result<String, QueueError>;

    /// Take up to `max_messages` deliverable messages
    async fn receive(&self, max_messages: usize) -> Result<Vec<Delivery>, QueueError>;

    /// Acknowledge a delivery; the message is gone for good
    async fn ack(&self, ack_id: &str) -> Result<(), QueueError>;

    /// Report a failed delivery; counts one attempt against the redelivery budget
    async fn nack(&self, ack_id: &str, reason: &str) -> Result<NackOutcome, QueueError>;

    /// Move a delivery straight to the dead-letter list regardless of remaining budget
    async fn dead_letter(&self, ack_id: &str, reason: &str) -> Result<(), QueueError>;

    /// Messages currently in the dead-letter list
    async fn dead_letters(&self) -> Result<Vec<DeadLetterRecord>, QueueError>;

    /// Move every ready and in-flight message to the dead-letter list. Called once
    /// consumers have stopped so nothing is silently dropped. Returns how many moved.
    async fn dead_letter_undelivered(&self, _reason: &str) -> Result<usize, QueueError> {
        Ok(0)
    }

    async fn stats(&self) -> Result<QueueStats, QueueError>;

    /// Treat deliveries whose ack deadline expired as failed attempts. Returns how many
    /// were reclaimed.
    async fn reclaim_expired(&self) -> Result<usize, QueueError>;

    /// Wait until a message may be available, or `max_wait` elapses
    async fn wait_for_messages(&self, max_wait: Duration) {
        tokio::time::sleep(max_wait).await;
    }
}

/// Serialize `payload` as JSON and publish it, bounded by `timeout`
pub async fn publish_json<T: Serialize + Sync>(
    queue: &dyn MessageQueue,
    payload: &T,
    attributes: Attributes,
    timeout: Duration,
) -> Result<String, QueueError> {
    let data = serde_json::to_vec(payload).map_err(|e| QueueError::Serialization(e.to_string()))?;

    match tokio::time::timeout(timeout, queue.publish(Bytes::from(data), attributes)).await {
        Ok(result) => result,
        Err(_) => {
            tracing::warn!(
                channel = %queue.channel(),
                timeout_secs = timeout.as_secs(),
                "Queue publish timed out"
            );
            Err(QueueError::PublishTimeout(timeout))
        }
    }
}
