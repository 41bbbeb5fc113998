//! Health, OpenAPI document and CORS preflight.

mod helpers;

use axum::http::{Method, StatusCode};
use helpers::{setup_test_app, upload_png};
use serde_json::Value;

#[tokio::test]
async fn test_health_reports_queues() {
    let app = setup_test_app().await;
    upload_png(app.client()).await;

    let response = app.client().get("/health").await;

    assert_eq!(response.status_code(), StatusCode::OK);
    let body: Value = response.json();
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["storage"], "healthy");

    let queues = body["queues"].as_array().unwrap();
    assert_eq!(queues.len(), 2);
    let requests = queues
        .iter()
        .find(|q| q["channel"] == "image-processing-requests")
        .unwrap();
    assert_eq!(requests["published"], 1);
}

#[tokio::test]
async fn test_health_needs_no_api_key() {
    let app = setup_test_app().await;
    let response = app.client().get("/health").await;
    assert_eq!(response.status_code(), StatusCode::OK);
}

#[tokio::test]
async fn test_openapi_document_served() {
    let app = setup_test_app().await;

    let response = app.client().get("/openapi.json").await;

    assert_eq!(response.status_code(), StatusCode::OK);
    let doc: Value = response.json();
    assert!(doc["paths"]["/v1/images/upload"].is_object());
    assert!(doc["paths"]["/v1/dead-letters"].is_object());
}

#[tokio::test]
async fn test_cors_preflight_allows_api_key_header() {
    let app = setup_test_app().await;

    let response = app
        .client()
        .method(Method::OPTIONS, "/v1/images/upload")
        .add_header("origin", "https://app.example.com")
        .add_header("access-control-request-method", "POST")
        .add_header("access-control-request-headers", "x-api-key")
        .await;

    assert_eq!(response.status_code(), StatusCode::OK);
    let allowed = response
        .headers()
        .get("access-control-allow-headers")
        .unwrap()
        .to_str()
        .unwrap()
        .to_lowercase();
    assert!(allowed.contains("x-api-key"));
}
