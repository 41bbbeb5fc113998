//! Imagepipe Worker Library
//!
//! Message queue channels with redelivery and dead-lettering, the consumer pool that
//! drives handlers, and the two pipeline workers:
//!
//! - [`ProcessingWorker`]: consumes processing requests, transforms and stores images,
//!   publishes results
//! - [`NotificationWorker`]: consumes results and records completions idempotently

pub mod completion_log;
pub mod consumer;
pub mod dead_letter_log;
pub mod handler;
mod jsonl;
pub mod memory;
pub mod notification;
pub mod processing;
pub mod queue;

pub use completion_log::{CompletionLog, JsonlCompletionLog};
pub use consumer::{ConsumerConfig, DeliveryOutcome, QueueConsumer};
pub use dead_letter_log::{DeadLetterLog, JsonlDeadLetterLog};
pub use handler::MessageHandler;
pub use memory::MemoryQueue;
pub use notification::NotificationWorker;
pub use processing::{ProcessingWorker, ProcessingWorkerConfig};
pub use queue::{
    publish_json, Attributes, Delivery, MessageQueue, NackOutcome, QueueError, QueueStats,
    RedeliveryPolicy,
};
