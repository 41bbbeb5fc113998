//! Per-caller upload rate limiting.

mod helpers;

use axum::http::StatusCode;
use helpers::{build_test_app, test_config, upload_png};
use serde_json::Value;

#[tokio::test]
async fn test_twenty_first_upload_in_a_minute_is_limited() {
    let app = build_test_app(test_config(), false).await;

    for i in 0..20 {
        let response = upload_png(app.client()).await;
        assert_eq!(
            response.status_code(),
            StatusCode::ACCEPTED,
            "upload {} should be accepted",
            i + 1
        );
    }

    let response = upload_png(app.client()).await;
    assert_eq!(response.status_code(), StatusCode::TOO_MANY_REQUESTS);

    let retry_after: u64 = response
        .headers()
        .get("retry-after")
        .expect("Retry-After header missing")
        .to_str()
        .unwrap()
        .parse()
        .unwrap();
    assert!((1..=60).contains(&retry_after));

    let body: Value = response.json();
    assert_eq!(body["recoverable"], true);

    // Limited requests are neither stored nor queued
    let stats = app.state().requests.stats().await.unwrap();
    assert_eq!(stats.published, 20);
}

#[tokio::test]
async fn test_limits_are_per_caller() {
    let mut config = test_config();
    config.0.intake.rate_limit_per_minute = 1;
    config.0.intake.api_keys.push("second-caller-key".to_string());
    let app = build_test_app(config, false).await;

    assert_eq!(upload_png(app.client()).await.status_code(), StatusCode::ACCEPTED);
    assert_eq!(
        upload_png(app.client()).await.status_code(),
        StatusCode::TOO_MANY_REQUESTS
    );

    let response = app
        .client()
        .post(helpers::UPLOAD_PATH)
        .add_header("x-api-key", "second-caller-key")
        .multipart(helpers::image_form(
            helpers::fixtures::create_test_png(8, 8),
            "image/png",
            Some("other.png"),
            None,
        ))
        .await;
    assert_eq!(response.status_code(), StatusCode::ACCEPTED);
}
