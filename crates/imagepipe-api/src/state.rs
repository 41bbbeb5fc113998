//! Shared application state

use imagepipe_core::Config;
use imagepipe_storage::Storage;
use imagepipe_worker::{CompletionLog, MessageQueue};
use std::sync::Arc;

use crate::auth::KeyStore;
use crate::services::IntakeService;

#[derive(Clone)]
pub struct AppState {
    pub config: Config,
    pub intake: Arc<IntakeService>,
    pub storage: Arc<dyn Storage>,
    /// Processing requests, consumed by the processing worker
    pub requests: Arc<dyn MessageQueue>,
    /// Processing results, consumed by the notification worker
    pub results: Arc<dyn MessageQueue>,
    pub key_store: Arc<dyn KeyStore>,
    pub completion_log: Arc<dyn CompletionLog>,
}
