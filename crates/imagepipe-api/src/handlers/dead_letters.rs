use std::sync::Arc;

use axum::{extract::State, http::HeaderMap, Json};
use imagepipe_core::models::DeadLetterList;

use crate::error::{ErrorResponse, HttpAppError};
use crate::handlers::image_upload::api_key;
use crate::state::AppState;

/// List dead-lettered messages of both channels, oldest first
#[utoipa::path(
    get,
    path = "/v1/dead-letters",
    tag = "operations",
    params(
        ("x-api-key" = String, Header, description = "Caller API key")
    ),
    responses(
        (status = 200, description = "Dead-letter records", body = DeadLetterList),
        (status = 401, description = "Missing or invalid API key", body = ErrorResponse),
        (status = 500, description = "Internal server error", body = ErrorResponse)
    )
)]
pub async fn list_dead_letters(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Json<DeadLetterList>, HttpAppError> {
    state.intake.authenticate(api_key(&headers)).await?;

    let mut records = state.requests.dead_letters().await?;
    records.extend(state.results.dead_letters().await?);
    records.sort_by_key(|r| r.dead_lettered_at);

    Ok(Json(DeadLetterList {
        total: records.len(),
        records,
    }))
}
