//! Service initialization: storage, queue channels, workers and application state

use anyhow::{Context, Result};
use imagepipe_core::Config;
use imagepipe_infra::RateLimiter;
use imagepipe_processing::GrayscaleTransform;
use imagepipe_storage::{create_storage, Storage};
use imagepipe_worker::{
    CompletionLog, ConsumerConfig, DeadLetterLog, JsonlCompletionLog, JsonlDeadLetterLog,
    MemoryQueue, MessageQueue, NotificationWorker, ProcessingWorker, ProcessingWorkerConfig, QueueConsumer, RedeliveryPolicy,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;

use crate::auth::StaticKeyStore;
use crate::services::IntakeService;
use crate::state::AppState;

pub const REQUESTS_CHANNEL: &str = "image-processing-requests";
pub const RESULTS_CHANNEL: &str = "image-processing-results";

const RATE_LIMIT_CLEANUP_INTERVAL: Duration = Duration::from_secs(300);
const UNDELIVERED_AT_SHUTDOWN: &str = "undelivered at shutdown";

/// Running pipeline: shared state plus the background consumers
pub struct Pipeline {
    pub state: Arc<AppState>,
    consumers: Vec<QueueConsumer>,
    background: Vec<JoinHandle<()>>,
}

impl Pipeline {
    /// Start the processing and notification consumers
    pub fn start_workers(&mut self) {
        if !self.consumers.is_empty() {
            return;
        }

        let state = &self.state;
        let worker_config = state.config.worker();
        let consumer_config = ConsumerConfig::from(worker_config);

        let processing = ProcessingWorker::new(
            state.storage.clone(),
            state.results.clone(),
            Arc::new(GrayscaleTransform::default()),
            ProcessingWorkerConfig::from_config(
                worker_config,
                state.config.queue().publish_timeout_secs,
            ),
        );
        let notification = NotificationWorker::new(state.completion_log.clone());

        self.consumers.push(QueueConsumer::spawn(
            state.requests.clone(),
            Arc::new(processing),
            consumer_config.clone(),
        ));
        self.consumers.push(QueueConsumer::spawn(
            state.results.clone(),
            Arc::new(notification),
            consumer_config,
        ));

        tracing::info!(
            max_concurrency = worker_config.max_concurrency,
            "Pipeline workers started"
        );
    }

    /// Stop consumers (draining in-flight handlers) and background tasks, then move any
    /// message still queued to the dead-letter log
    pub async fn shutdown(self) {
        for consumer in self.consumers {
            consumer.shutdown().await;
        }
        for task in self.background {
            task.abort();
        }
        for queue in [&self.state.requests, &self.state.results] {
            if let Err(e) = queue.dead_letter_undelivered(UNDELIVERED_AT_SHUTDOWN).await {
                tracing::error!(
                    channel = %queue.channel(),
                    error = %e,
                    "Failed to dead-letter undelivered messages"
                );
            }
        }
        tracing::info!("Pipeline stopped");
    }
}

/// Build the pipeline from configuration: storage backend and completion log per config
pub async fn initialize_services(config: &Config) -> Result<Pipeline> {
    let storage = create_storage(config.storage())
        .await
        .context("Failed to initialize object storage")?;

    let completion_log: Arc<dyn CompletionLog> = Arc::new(
        JsonlCompletionLog::open(&config.worker().completion_log_path)
            .await
            .context("Failed to open completion log")?,
    );

    let dead_letter_log: Arc<dyn DeadLetterLog> = Arc::new(
        JsonlDeadLetterLog::open(&config.worker().dead_letter_log_path)
            .await
            .context("Failed to open dead-letter log")?,
    );

    Ok(assemble(config, storage, completion_log, dead_letter_log))
}

/// Wire the pipeline around an existing storage backend and the two durable logs.
///
/// Workers are not started; call [`Pipeline::start_workers`].
pub fn assemble(
    config: &Config,
    storage: Arc<dyn Storage>,
    completion_log: Arc<dyn CompletionLog>,
    dead_letter_log: Arc<dyn DeadLetterLog>,
) -> Pipeline {
    let policy = RedeliveryPolicy::from(config.queue());
    let ack_deadline = Duration::from_secs(config.queue().ack_deadline_secs);

    let requests: Arc<dyn MessageQueue> = Arc::new(
        MemoryQueue::with_ack_deadline(REQUESTS_CHANNEL, policy, ack_deadline)
            .with_dead_letter_log(dead_letter_log.clone()),
    );
    let results: Arc<dyn MessageQueue> = Arc::new(
        MemoryQueue::with_ack_deadline(RESULTS_CHANNEL, policy, ack_deadline)
            .with_dead_letter_log(dead_letter_log),
    );

    let intake_config = config.intake();
    let key_store = Arc::new(StaticKeyStore::new(&intake_config.api_keys));
    tracing::info!(api_keys = key_store.len(), "Key store loaded");

    let rate_limiter = Arc::new(RateLimiter::with_shards(
        intake_config.rate_limit_per_minute,
        intake_config.rate_limit_shards,
    ));
    let cleanup = rate_limiter.clone().spawn_cleanup(RATE_LIMIT_CLEANUP_INTERVAL);

    let intake = IntakeService::new(
        config,
        storage.clone(),
        requests.clone(),
        key_store.clone(),
        rate_limiter,
    );

    let state = Arc::new(AppState {
        config: config.clone(),
        intake: Arc::new(intake),
        storage,
        requests,
        results,
        key_store,
        completion_log,
    });

    Pipeline {
        state,
        consumers: Vec::new(),
        background: vec![cleanup],
    }
}
