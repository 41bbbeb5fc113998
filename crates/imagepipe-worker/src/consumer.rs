//! Queue consumer: worker pool, wake-up or polling, ack-deadline reaper, and shutdown.
//!
//! Each consumer drives one channel. Deliveries are handled concurrently up to
//! `max_concurrency`, each bounded by the handler timeout. [`QueueConsumer::shutdown`]
//! stops receiving and waits (bounded) for in-flight handlers to finish.

use imagepipe_core::{AppError, ErrorMetadata, WorkerConfig};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Semaphore};
use tokio::task::JoinHandle;

use crate::handler::MessageHandler;
use crate::queue::{Delivery, MessageQueue, NackOutcome};

#[derive(Debug, Clone)]
pub struct ConsumerConfig {
    pub max_concurrency: usize,
    pub poll_interval: Duration,
    pub handler_timeout: Duration,
    /// Interval between ack-deadline reaper runs. Zero disables the reaper.
    pub reap_interval: Duration,
    /// How long shutdown waits for in-flight handlers
    pub drain_timeout: Duration,
}

impl Default for ConsumerConfig {
    fn default() -> Self {
        Self {
            max_concurrency: 4,
            poll_interval: Duration::from_millis(1000),
            handler_timeout: Duration::from_secs(540),
            reap_interval: Duration::from_secs(30),
            drain_timeout: Duration::from_secs(30),
        }
    }
}

impl From<&WorkerConfig> for ConsumerConfig {
    fn from(config: &WorkerConfig) -> Self {
        Self {
            max_concurrency: config.max_concurrency,
            poll_interval: Duration::from_millis(config.poll_interval_ms),
            handler_timeout: Duration::from_secs(config.handler_timeout_secs),
            ..Default::default()
        }
    }
}

/// What happened to a delivery after its handler ran
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryOutcome {
    Acked,
    Redelivered { after: Duration },
    DeadLettered,
    /// The delivery expired before it could be settled; the queue already reclaimed it
    Stale,
}

pub struct QueueConsumer {
    name: &'static str,
    shutdown_tx: mpsc::Sender<()>,
    join: JoinHandle<()>,
    semaphore: Arc<Semaphore>,
    config: ConsumerConfig,
}

impl QueueConsumer {
    /// Start consuming `queue` with `handler` on a background task
    pub fn spawn(
        queue: Arc<dyn MessageQueue>,
        handler: Arc<dyn MessageHandler>,
        config: ConsumerConfig,
    ) -> Self {
        let (shutdown_tx, shutdown_rx) = mpsc::channel(1);
        let semaphore = Arc::new(Semaphore::new(config.max_concurrency.max(1)));
        let name = handler.name();

        let join = tokio::spawn(Self::worker_pool(
            queue,
            handler,
            config.clone(),
            semaphore.clone(),
            shutdown_rx,
        ));

        Self {
            name,
            shutdown_tx,
            join,
            semaphore,
            config,
        }
    }

    async fn worker_pool(
        queue: Arc<dyn MessageQueue>,
        handler: Arc<dyn MessageHandler>,
        config: ConsumerConfig,
        semaphore: Arc<Semaphore>,
        mut shutdown_rx: mpsc::Receiver<()>,
    ) {
        tracing::info!(
            channel = %queue.channel(),
            handler = handler.name(),
            max_concurrency = config.max_concurrency,
            poll_interval_ms = config.poll_interval.as_millis() as u64,
            "Queue consumer started"
        );

        let mut reaper = if config.reap_interval.is_zero() {
            None
        } else {
            let mut interval = tokio::time::interval(config.reap_interval);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            Some(interval)
        };

        loop {
            tokio::select! {
                _ = shutdown_rx.recv() => {
                    tracing::info!(channel = %queue.channel(), "Queue consumer shutting down");
                    break;
                }
                _ = async {
                    match reaper.as_mut() {
                        Some(interval) => { interval.tick().await; }
                        None => std::future::pending::<()>().await,
                    }
                } => {
                    if let Err(e) = queue.reclaim_expired().await {
                        tracing::error!(channel = %queue.channel(), error = %e, "Ack deadline reaper failed");
                    }
                }
                _ = queue.wait_for_messages(config.poll_interval) => {
                    Self::receive_and_dispatch(&queue, &handler, &semaphore, config.handler_timeout).await;
                }
            }
        }

        tracing::info!(channel = %queue.channel(), "Queue consumer stopped");
    }

    async fn receive_and_dispatch(
        queue: &Arc<dyn MessageQueue>,
        handler: &Arc<dyn MessageHandler>,
        semaphore: &Arc<Semaphore>,
        handler_timeout: Duration,
    ) {
        let available = semaphore.available_permits();
        if available == 0 {
            tracing::debug!(channel = %queue.channel(), "No workers available, skipping receive");
            return;
        }

        let deliveries = match queue.receive(available).await {
            Ok(deliveries) => deliveries,
            Err(e) => {
                tracing::error!(channel = %queue.channel(), error = %e, "Failed to receive messages");
                return;
            }
        };

        for delivery in deliveries {
            let permit = match semaphore.clone().acquire_owned().await {
                Ok(permit) => permit,
                Err(_) => return,
            };
            let queue = queue.clone();
            let handler = handler.clone();
            tokio::spawn(async move {
                let _permit = permit;
                Self::handle_delivery(queue.as_ref(), handler.as_ref(), delivery, handler_timeout)
                    .await;
            });
        }
    }

    /// Run `handler` on one delivery and settle it on `queue`.
    ///
    /// Success acks. Recoverable errors and timeouts nack, which counts against the
    /// redelivery budget. Unrecoverable errors dead-letter the message immediately.
    #[tracing::instrument(
        skip(queue, handler, delivery, handler_timeout),
        fields(
            channel = %queue.channel(),
            message_id = %delivery.message_id,
            delivery_attempt = delivery.delivery_attempt
        )
    )]
    pub async fn handle_delivery(
        queue: &dyn MessageQueue,
        handler: &dyn MessageHandler,
        delivery: Delivery,
        handler_timeout: Duration,
    ) -> DeliveryOutcome {
        let start = std::time::Instant::now();
        let result = tokio::time::timeout(handler_timeout, handler.handle(&delivery)).await;

        let failure = match result {
            Ok(Ok(())) => {
                return match queue.ack(&delivery.ack_id).await {
                    Ok(()) => {
                        tracing::info!(
                            handler = handler.name(),
                            duration_ms = start.elapsed().as_millis() as u64,
                            "Message handled"
                        );
                        DeliveryOutcome::Acked
                    }
                    Err(e) => {
                        tracing::warn!(error = %e, "Handled message could not be acked");
                        DeliveryOutcome::Stale
                    }
                };
            }
            Ok(Err(e)) => e,
            Err(_) => AppError::Timeout(format!(
                "{} handler exceeded {:?}",
                handler.name(),
                handler_timeout
            )),
        };

        if failure.is_recoverable() {
            tracing::warn!(
                handler = handler.name(),
                error = %failure,
                error_type = failure.error_type(),
                "Message handling failed, releasing for redelivery"
            );
            match queue.nack(&delivery.ack_id, &failure.to_string()).await {
                Ok(NackOutcome::Redelivered { after }) => DeliveryOutcome::Redelivered { after },
                Ok(NackOutcome::DeadLettered) => DeliveryOutcome::DeadLettered,
                Err(e) => {
                    tracing::warn!(error = %e, "Failed message could not be nacked");
                    DeliveryOutcome::Stale
                }
            }
        } else {
            tracing::error!(
                handler = handler.name(),
                error = %failure,
                error_type = failure.error_type(),
                "Message handling failed permanently, dead-lettering"
            );
            match queue.dead_letter(&delivery.ack_id, &failure.to_string()).await {
                Ok(()) => DeliveryOutcome::DeadLettered,
                Err(e) => {
                    tracing::warn!(error = %e, "Failed message could not be dead-lettered");
                    DeliveryOutcome::Stale
                }
            }
        }
    }

    /// Stop receiving and wait up to the drain timeout for in-flight handlers.
    ///
    /// Handlers still running after the drain timeout are abandoned; their deliveries
    /// are reclaimed by the queue once the ack deadline passes.
    pub async fn shutdown(self) {
        tracing::info!(handler = self.name, "Initiating queue consumer shutdown");
        let _ = self.shutdown_tx.send(()).await;
        let _ = self.join.await;

        let permits = self.config.max_concurrency.max(1) as u32;
        match tokio::time::timeout(self.config.drain_timeout, self.semaphore.acquire_many(permits))
            .await
        {
            Ok(_) => tracing::info!(handler = self.name, "Queue consumer drained"),
            Err(_) => tracing::warn!(
                handler = self.name,
                "Queue consumer drain timed out with handlers still running"
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryQueue;
    use crate::queue::{Attributes, RedeliveryPolicy};
    use async_trait::async_trait;
    use bytes::Bytes;
    use std::sync::atomic::{AtomicU32, Ordering};

    struct ScriptedHandler {
        calls: AtomicU32,
        result: fn(u32) -> Result<(), AppError>,
    }

    #[async_trait]
    impl MessageHandler for ScriptedHandler {
        fn name(&self) -> &'static str {
            "scripted"
        }

        async fn handle(&self, _delivery: &Delivery) -> Result<(), AppError> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            (self.result)(call)
        }
    }

    struct SlowHandler;

    #[async_trait]
    impl MessageHandler for SlowHandler {
        fn name(&self) -> &'static str {
            "slow"
        }

        async fn handle(&self, _delivery: &Delivery) -> Result<(), AppError> {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            Ok(())
        }
    }

    async fn queue_with_message() -> MemoryQueue {
        let queue = MemoryQueue::new("requests", RedeliveryPolicy::default());
        queue
            .publish(Bytes::from_static(b"{}"), Attributes::new())
            .await
            .unwrap();
        queue
    }

    fn handler(result: fn(u32) -> Result<(), AppError>) -> ScriptedHandler {
        ScriptedHandler {
            calls: AtomicU32::new(0),
            result,
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_success_acks() {
        let queue = queue_with_message().await;
        let handler = handler(|_| Ok(()));
        let delivery = queue.receive(1).await.unwrap().remove(0);

        let outcome =
            QueueConsumer::handle_delivery(&queue, &handler, delivery, Duration::from_secs(5)).await;
        assert_eq!(outcome, DeliveryOutcome::Acked);
        assert_eq!(queue.stats().await.unwrap().acked, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_recoverable_error_redelivers() {
        let queue = queue_with_message().await;
        let handler = handler(|_| Err(AppError::Storage("unavailable".to_string())));
        let delivery = queue.receive(1).await.unwrap().remove(0);

        let outcome =
            QueueConsumer::handle_delivery(&queue, &handler, delivery, Duration::from_secs(5)).await;
        assert_eq!(
            outcome,
            DeliveryOutcome::Redelivered {
                after: Duration::from_secs(10)
            }
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_malformed_message_dead_letters_immediately() {
        let queue = queue_with_message().await;
        let handler = handler(|_| Err(AppError::MalformedMessage("bad json".to_string())));
        let delivery = queue.receive(1).await.unwrap().remove(0);

        let outcome =
            QueueConsumer::handle_delivery(&queue, &handler, delivery, Duration::from_secs(5)).await;
        assert_eq!(outcome, DeliveryOutcome::DeadLettered);
        assert_eq!(queue.dead_letters().await.unwrap()[0].delivery_attempts, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_handler_timeout_is_retryable() {
        let queue = queue_with_message().await;
        let delivery = queue.receive(1).await.unwrap().remove(0);

        let outcome =
            QueueConsumer::handle_delivery(&queue, &SlowHandler, delivery, Duration::from_secs(540))
                .await;
        assert!(matches!(outcome, DeliveryOutcome::Redelivered { .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn test_consumer_stops_after_five_failed_deliveries() {
        let queue: Arc<MemoryQueue> = Arc::new(queue_with_message().await);
        let handler = Arc::new(handler(|_| Err(AppError::Timeout("stall".to_string()))));

        let consumer = QueueConsumer::spawn(
            queue.clone(),
            handler.clone(),
            ConsumerConfig {
                poll_interval: Duration::from_millis(100),
                ..Default::default()
            },
        );

        // Total backoff for attempts 1..4 is 10+20+40+80s.
        tokio::time::sleep(Duration::from_secs(400)).await;
        consumer.shutdown().await;

        assert_eq!(handler.calls.load(Ordering::SeqCst), 5);
        let dead = queue.dead_letters().await.unwrap();
        assert_eq!(dead.len(), 1);
        assert_eq!(dead[0].delivery_attempts, 5);
    }

    #[tokio::test(start_paused = true)]
    async fn test_consumer_recovers_after_transient_failure() {
        let queue: Arc<MemoryQueue> = Arc::new(queue_with_message().await);
        let handler = Arc::new(handler(|call| {
            if call == 1 {
                Err(AppError::SourceMissing("uploads/x".to_string()))
            } else {
                Ok(())
            }
        }));

        let consumer = QueueConsumer::spawn(queue.clone(), handler.clone(), ConsumerConfig::default());
        tokio::time::sleep(Duration::from_secs(30)).await;
        consumer.shutdown().await;

        assert_eq!(handler.calls.load(Ordering::SeqCst), 2);
        let stats = queue.stats().await.unwrap();
        assert_eq!((stats.acked, stats.dead_lettered), (1, 0));
    }
}
