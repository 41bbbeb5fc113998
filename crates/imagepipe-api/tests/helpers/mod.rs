//! Test helpers: build the pipeline and router for integration tests.
//!
//! Run from workspace root: `cargo test -p imagepipe-api`. Storage and both logs live in
//! a per-test temp directory; queues are in-memory.

#![allow(dead_code)]

pub mod fixtures;

use axum_test::multipart::{MultipartForm, Part};
use axum_test::{TestResponse, TestServer};
use imagepipe_api::setup::{assemble, routes, Pipeline};
use imagepipe_api::AppState;
use imagepipe_core::constants::API_KEY_HEADER;
use imagepipe_core::Config;
use imagepipe_storage::{LocalStorage, Storage};
use imagepipe_worker::{CompletionLog, DeadLetterLog, JsonlCompletionLog, JsonlDeadLetterLog};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tokio::time::sleep;

pub const TEST_API_KEY: &str = "test-api-key-0123456789";
pub const UPLOAD_PATH: &str = "/v1/images/upload";
pub const DEAD_LETTER_LOG_FILE: &str = "dead-letters.jsonl";

/// Test application: server, pipeline and owned resources.
pub struct TestApp {
    pub server: TestServer,
    pub pipeline: Pipeline,
    pub _temp_dir: TempDir,
}

impl TestApp {
    pub fn client(&self) -> &TestServer {
        &self.server
    }

    pub fn state(&self) -> &Arc<AppState> {
        &self.pipeline.state
    }

    pub fn storage(&self) -> &Arc<dyn Storage> {
        &self.pipeline.state.storage
    }
}

/// Configuration used by every test unless adjusted.
pub fn test_config() -> Config {
    let mut config = Config::default();
    config.0.intake.api_keys = vec![TEST_API_KEY.to_string()];
    config.0.worker.poll_interval_ms = 50;
    config
}

/// Test app with the default test configuration and no workers running.
pub async fn setup_test_app() -> TestApp {
    build_test_app(test_config(), false).await
}

/// Test app with the processing and notification workers running.
pub async fn setup_test_app_with_workers() -> TestApp {
    build_test_app(test_config(), true).await
}

pub async fn build_test_app(config: Config, start_workers: bool) -> TestApp {
    let temp_dir = tempfile::tempdir().expect("Failed to create temp directory");

    let storage: Arc<dyn Storage> = Arc::new(
        LocalStorage::new(temp_dir.path().join("objects"))
            .await
            .expect("Failed to create local storage"),
    );
    let completion_log: Arc<dyn CompletionLog> = Arc::new(
        JsonlCompletionLog::open(temp_dir.path().join("completions.jsonl"))
            .await
            .expect("Failed to open completion log"),
    );
    let dead_letter_log: Arc<dyn DeadLetterLog> = Arc::new(
        JsonlDeadLetterLog::open(temp_dir.path().join(DEAD_LETTER_LOG_FILE))
            .await
            .expect("Failed to open dead-letter log"),
    );

    let mut pipeline = assemble(&config, storage, completion_log, dead_letter_log);
    if start_workers {
        pipeline.start_workers();
    }

    let app = routes::setup_routes(&config, pipeline.state.clone())
        .expect("Failed to setup routes");
    let server = TestServer::new(app.into_make_service()).expect("Failed to create test server");

    TestApp {
        server,
        pipeline,
        _temp_dir: temp_dir,
    }
}

/// Multipart form with the `image` part and, optionally, a client-chosen `upload_id`.
pub fn image_form(
    data: Vec<u8>,
    mime_type: &str,
    file_name: Option<&str>,
    upload_id: Option<&str>,
) -> MultipartForm {
    let mut part = Part::bytes(bytes::Bytes::from(data)).mime_type(mime_type);
    if let Some(name) = file_name {
        part = part.file_name(name);
    }
    let mut form = MultipartForm::new().add_part("image", part);
    if let Some(id) = upload_id {
        form = form.add_text("upload_id", id);
    }
    form
}

/// POST an upload with the test API key.
pub async fn upload(client: &TestServer, form: MultipartForm) -> TestResponse {
    client
        .post(UPLOAD_PATH)
        .add_header(API_KEY_HEADER, TEST_API_KEY)
        .multipart(form)
        .await
}

/// POST a PNG upload with the test API key.
pub async fn upload_png(client: &TestServer) -> TestResponse {
    upload(
        client,
        image_form(fixtures::create_test_png(16, 16), "image/png", Some("pixel.png"), None),
    )
    .await
}

/// Wait for a condition with timeout.
pub async fn wait_for_condition<F, Fut>(mut condition: F, timeout: Duration) -> bool
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        if condition().await {
            return true;
        }
        if tokio::time::Instant::now() >= deadline {
            return false;
        }
        sleep(Duration::from_millis(25)).await;
    }
}
