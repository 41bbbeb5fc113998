//! Application setup and initialization
//!
//! Everything `main` does before serving, split out so integration tests can build the
//! same router around in-memory storage.

pub mod routes;
pub mod server;
pub mod services;

pub use services::{assemble, Pipeline};

use anyhow::{Context, Result};
use imagepipe_core::Config;

/// Initialize the entire application: telemetry, storage, queues, workers and routes
pub async fn initialize_app(config: Config) -> Result<(Pipeline, axum::Router)> {
    // Validate configuration first - fail fast on misconfiguration
    config
        .validate()
        .context("Configuration validation failed")?;

    imagepipe_infra::init_telemetry(config.log_format(), config.environment())
        .context("Failed to initialize telemetry")?;

    tracing::info!(
        environment = %config.environment(),
        storage_backend = %config.storage().backend,
        "Configuration loaded and validated successfully"
    );

    let mut pipeline = services::initialize_services(&config).await?;
    pipeline.start_workers();

    let router = routes::setup_routes(&config, pipeline.state.clone())?;

    Ok((pipeline, router))
}
