//! End-to-end: upload through processing to the completion record.

mod helpers;

use axum::http::StatusCode;
use chrono::Utc;
use helpers::fixtures::create_test_jpeg_100kb;
use helpers::{image_form, setup_test_app_with_workers, upload, wait_for_condition, TestApp};
use imagepipe_core::models::{ProcessedResult, ProcessingMessage, ResultStatus};
use imagepipe_storage::keys::{processed_key, result_manifest_key, upload_key};
use imagepipe_worker::{publish_json, Attributes};
use serde_json::Value;
use std::time::Duration;
use uuid::Uuid;

const PIPELINE_TIMEOUT: Duration = Duration::from_secs(20);

async fn upload_jpeg(app: &TestApp) -> Uuid {
    let response = upload(
        app.client(),
        image_form(create_test_jpeg_100kb(), "image/jpeg", Some("photo.jpg"), None),
    )
    .await;
    assert_eq!(response.status_code(), StatusCode::ACCEPTED);

    let body: Value = response.json();
    body["upload_id"].as_str().unwrap().parse().unwrap()
}

async fn wait_for_completion(app: &TestApp, upload_id: Uuid) -> bool {
    let log = app.state().completion_log.clone();
    wait_for_condition(
        || {
            let log = log.clone();
            async move { matches!(log.get(upload_id).await, Ok(Some(_))) }
        },
        PIPELINE_TIMEOUT,
    )
    .await
}

#[tokio::test]
async fn test_upload_is_processed_to_grayscale() {
    let app = setup_test_app_with_workers().await;
    let upload_id = upload_jpeg(&app).await;

    assert!(
        wait_for_completion(&app, upload_id).await,
        "pipeline did not complete within {:?}",
        PIPELINE_TIMEOUT
    );

    let record = app
        .state()
        .completion_log
        .get(upload_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(record.status, ResultStatus::Success);
    assert_eq!(record.event_type, "IMAGE_PROCESSING_COMPLETE");
    assert_eq!(record.source_object_key, upload_key(upload_id));
    assert_eq!(
        record.result_object_key.as_deref(),
        Some(processed_key(upload_id).as_str())
    );
    assert!(record.error_detail.is_none());
    assert!(record.pipeline_completed_at <= Utc::now());

    let processed = app.storage().get(&processed_key(upload_id)).await.unwrap();
    let img = image::load_from_memory(&processed).unwrap().to_rgb8();
    assert_eq!(img.dimensions(), (256, 256));
    assert!(img.pixels().all(|p| p[0] == p[1] && p[1] == p[2]));

    let manifest = app
        .storage()
        .get(&result_manifest_key(upload_id))
        .await
        .unwrap();
    let manifest: ProcessedResult = serde_json::from_slice(&manifest).unwrap();
    assert!(manifest.is_success());
    assert_eq!(manifest.original_filename.as_deref(), Some("photo.jpg"));
}

#[tokio::test]
async fn test_duplicate_request_completes_once() {
    let app = setup_test_app_with_workers().await;
    let upload_id = upload_jpeg(&app).await;

    // Simulate an at-least-once redelivery of the same request
    let message = ProcessingMessage {
        upload_id,
        source_object_key: upload_key(upload_id),
        uploaded_at: Utc::now(),
        original_filename: Some("photo.jpg".to_string()),
        content_type: Some("image/jpeg".to_string()),
    };
    publish_json(
        app.state().requests.as_ref(),
        &message,
        Attributes::new(),
        Duration::from_secs(5),
    )
    .await
    .unwrap();

    let results = app.state().results.clone();
    let both_handled = wait_for_condition(
        || {
            let results = results.clone();
            async move {
                results
                    .stats()
                    .await
                    .map(|s| s.acked == 2)
                    .unwrap_or(false)
            }
        },
        PIPELINE_TIMEOUT,
    )
    .await;
    assert!(both_handled, "both result messages should be consumed");

    assert_eq!(app.state().completion_log.len().await, 1);
    let requests = app.state().requests.stats().await.unwrap();
    assert_eq!(requests.acked, 2);
    assert_eq!(requests.dead_lettered, 0);
}

#[tokio::test]
async fn test_undecodable_image_records_failure() {
    let app = setup_test_app_with_workers().await;

    // Valid PNG signature, garbage after it
    let mut data = b"\x89PNG\r\n\x1a\n".to_vec();
    data.extend(std::iter::repeat(0xAB).take(512));

    let response = upload(
        app.client(),
        image_form(data, "image/png", Some("broken.png"), None),
    )
    .await;
    assert_eq!(response.status_code(), StatusCode::ACCEPTED);
    let body: Value = response.json();
    let upload_id: Uuid = body["upload_id"].as_str().unwrap().parse().unwrap();

    assert!(wait_for_completion(&app, upload_id).await);

    let record = app
        .state()
        .completion_log
        .get(upload_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(record.status, ResultStatus::Failed);
    assert!(record.result_object_key.is_none());
    assert!(record.error_detail.is_some());

    assert!(!app.storage().exists(&processed_key(upload_id)).await.unwrap());
    let requests = app.state().requests.stats().await.unwrap();
    assert_eq!(requests.dead_lettered, 0);
}
