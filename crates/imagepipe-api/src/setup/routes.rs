//! Route configuration and setup

use crate::api_doc::ApiDoc;
use crate::constants::{
    DEAD_LETTERS_PATH, HEALTH_PATH, HTTP_CONCURRENCY_LIMIT, MULTIPART_OVERHEAD_BYTES,
    OPENAPI_PATH, UPLOAD_PATH,
};
use crate::handlers;
use crate::state::AppState;
use axum::{
    extract::DefaultBodyLimit,
    http::{header, HeaderName, HeaderValue, Method},
    routing::{get, post},
    Json, Router,
};
use imagepipe_core::constants::API_KEY_HEADER;
use imagepipe_core::Config;
use imagepipe_infra::request_id_middleware;
use std::sync::Arc;
use tower::limit::ConcurrencyLimitLayer;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use utoipa::OpenApi;

/// Setup all application routes
pub fn setup_routes(config: &Config, state: Arc<AppState>) -> Result<Router<()>, anyhow::Error> {
    let cors = setup_cors(config)?;
    let body_limit = config.intake().max_file_size_bytes + MULTIPART_OVERHEAD_BYTES;

    let upload_routes = Router::new()
        .route(UPLOAD_PATH, post(handlers::image_upload::upload_image))
        .layer(DefaultBodyLimit::max(body_limit));

    let app = Router::new()
        .route(HEALTH_PATH, get(handlers::health::health_check))
        .route(
            DEAD_LETTERS_PATH,
            get(handlers::dead_letters::list_dead_letters),
        )
        .route(OPENAPI_PATH, get(|| async { Json(ApiDoc::openapi()) }))
        .merge(upload_routes)
        .layer(ConcurrencyLimitLayer::new(HTTP_CONCURRENCY_LIMIT))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .layer(axum::middleware::from_fn(request_id_middleware))
        .with_state(state);

    Ok(app)
}

/// CORS: browsers may POST uploads with `Content-Type` and the API key header
fn setup_cors(config: &Config) -> Result<CorsLayer, anyhow::Error> {
    let methods = [Method::GET, Method::POST, Method::OPTIONS];
    let headers = [header::CONTENT_TYPE, HeaderName::from_static(API_KEY_HEADER)];

    let origins = config.cors_origins();
    let cors = if origins.iter().any(|o| o == "*") {
        tracing::warn!("CORS configured to allow all origins - not recommended for production");
        CorsLayer::new().allow_origin(Any)
    } else {
        let origins = origins
            .iter()
            .map(|o| o.parse::<HeaderValue>())
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| anyhow::anyhow!("Invalid CORS origin: {}", e))?;
        CorsLayer::new().allow_origin(origins)
    };

    Ok(cors.allow_methods(methods).allow_headers(headers))
}
