//! Dead-letter listing and the redelivery budget seen through the API.

mod helpers;

use axum::http::StatusCode;
use bytes::Bytes;
use chrono::Utc;
use helpers::{
    build_test_app, setup_test_app, test_config, upload_png, wait_for_condition,
    DEAD_LETTER_LOG_FILE, TEST_API_KEY,
};
use imagepipe_core::models::{DeadLetterList, ProcessingMessage};
use imagepipe_storage::keys::upload_key;
use imagepipe_worker::{publish_json, Attributes, DeadLetterLog, JsonlDeadLetterLog};
use std::time::Duration;
use uuid::Uuid;

const DEAD_LETTERS_PATH: &str = "/v1/dead-letters";

#[tokio::test]
async fn test_lists_dead_lettered_messages() {
    let app = setup_test_app().await;
    let requests = app.state().requests.clone();

    let message_id = requests
        .publish(Bytes::from_static(b"not json"), Attributes::new())
        .await
        .unwrap();
    let delivery = requests.receive(1).await.unwrap().remove(0);
    requests
        .dead_letter(&delivery.ack_id, "malformed message")
        .await
        .unwrap();

    let response = app
        .client()
        .get(DEAD_LETTERS_PATH)
        .add_header("x-api-key", TEST_API_KEY)
        .await;

    assert_eq!(response.status_code(), StatusCode::OK);
    let list: DeadLetterList = response.json();
    assert_eq!(list.total, 1);
    let record = &list.records[0];
    assert_eq!(record.message_id, message_id);
    assert_eq!(record.channel, "image-processing-requests");
    assert_eq!(record.delivery_attempts, 1);
    assert_eq!(record.last_error.as_deref(), Some("malformed message"));
}

#[tokio::test]
async fn test_dead_letters_require_api_key() {
    let app = setup_test_app().await;

    let response = app.client().get(DEAD_LETTERS_PATH).await;

    assert_eq!(response.status_code(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_missing_source_dead_letters_after_five_attempts() {
    let mut config = test_config();
    config.0.queue.min_backoff_secs = 0;
    config.0.queue.max_backoff_secs = 0;
    let app = build_test_app(config, true).await;

    // Request for an upload whose source object was never stored
    let upload_id = Uuid::new_v4();
    let message = ProcessingMessage {
        upload_id,
        source_object_key: upload_key(upload_id),
        uploaded_at: Utc::now(),
        original_filename: None,
        content_type: Some("image/png".to_string()),
    };
    publish_json(
        app.state().requests.as_ref(),
        &message,
        Attributes::new(),
        Duration::from_secs(5),
    )
    .await
    .unwrap();

    let requests = app.state().requests.clone();
    let dead_lettered = wait_for_condition(
        || {
            let requests = requests.clone();
            async move {
                requests
                    .stats()
                    .await
                    .map(|s| s.dead_lettered == 1)
                    .unwrap_or(false)
            }
        },
        Duration::from_secs(20),
    )
    .await;
    assert!(dead_lettered, "message should be dead-lettered");

    let response = app
        .client()
        .get(DEAD_LETTERS_PATH)
        .add_header("x-api-key", TEST_API_KEY)
        .await;
    let list: DeadLetterList = response.json();
    assert_eq!(list.total, 1);
    assert_eq!(list.records[0].delivery_attempts, 5);
    assert_eq!(list.records[0].payload["upload_id"], upload_id.to_string());

    // Nothing reached the results channel
    assert!(app.state().completion_log.get(upload_id).await.unwrap().is_none());
}

#[tokio::test]
async fn test_shutdown_persists_undelivered_requests() {
    let app = setup_test_app().await;

    let response = upload_png(app.client()).await;
    assert_eq!(response.status_code(), StatusCode::ACCEPTED);
    let body: serde_json::Value = response.json();
    let upload_id = body["upload_id"].as_str().unwrap().to_string();

    let helpers::TestApp {
        pipeline,
        _temp_dir: temp_dir,
        ..
    } = app;
    pipeline.shutdown().await;

    let log = JsonlDeadLetterLog::open(temp_dir.path().join(DEAD_LETTER_LOG_FILE))
        .await
        .unwrap();
    let records = log.list("image-processing-requests").await.unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].payload["upload_id"], upload_id);
    assert_eq!(records[0].delivery_attempts, 0);
    assert_eq!(
        records[0].last_error.as_deref(),
        Some("undelivered at shutdown")
    );
}
