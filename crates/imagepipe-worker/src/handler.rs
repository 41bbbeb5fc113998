//! Message handler trait
//!
//! Workers implement this trait; the consumer calls `handle` for every delivery and turns
//! the result into an ack, a redelivery or a dead-letter.

use async_trait::async_trait;
use imagepipe_core::AppError;

use crate::queue::Delivery;

#[async_trait]
pub trait MessageHandler: Send + Sync {
    /// Short name for logs
    fn name(&self) -> &'static str;

    /// Handle one delivery.
    ///
    /// `Ok` acknowledges the message. A recoverable error leaves it for redelivery; an
    /// unrecoverable one dead-letters it immediately.
    async fn handle(&self, delivery: &Delivery) -> Result<(), AppError>;
}
