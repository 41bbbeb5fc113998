use std::sync::Arc;
use std::time::Duration;

use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use serde::Serialize;
use utoipa::ToSchema;

use crate::state::AppState;

const CHECK_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Serialize, ToSchema)]
pub struct HealthResponse {
    pub status: String,
    pub storage: String,
    /// Per-channel depth and counters
    #[schema(value_type = Vec<Object>)]
    pub queues: Vec<imagepipe_worker::QueueStats>,
    pub completions: usize,
}

/// Health check with queue depths
#[utoipa::path(
    get,
    path = "/health",
    tag = "operations",
    responses(
        (status = 200, description = "Service healthy", body = HealthResponse),
        (status = 503, description = "A dependency is unhealthy", body = HealthResponse)
    )
)]
pub async fn health_check(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let mut healthy = true;

    // Existence check only; creates nothing.
    let storage = match tokio::time::timeout(
        CHECK_TIMEOUT,
        state.storage.exists("uploads/health-check"),
    )
    .await
    {
        Ok(Ok(_)) => "healthy".to_string(),
        Ok(Err(e)) => {
            tracing::warn!(error = %e, "Storage health check failed");
            healthy = false;
            format!("unhealthy: {}", e)
        }
        Err(_) => {
            tracing::warn!("Storage health check timed out");
            healthy = false;
            "timeout".to_string()
        }
    };

    let mut queues = Vec::with_capacity(2);
    for queue in [&state.requests, &state.results] {
        match queue.stats().await {
            Ok(stats) => queues.push(stats),
            Err(e) => {
                tracing::warn!(channel = %queue.channel(), error = %e, "Queue health check failed");
                healthy = false;
            }
        }
    }

    let response = HealthResponse {
        status: if healthy { "healthy" } else { "unhealthy" }.to_string(),
        storage,
        queues,
        completions: state.completion_log.len().await,
    };
    let status = if healthy {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (status, Json(response))
}
