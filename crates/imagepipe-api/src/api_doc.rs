//! OpenAPI documentation, served at `/openapi.json`.

use utoipa::OpenApi;

use crate::error;
use crate::handlers;
use imagepipe_core::models;

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Imagepipe API",
        version = "0.1.0",
        description = "Image intake for the asynchronous processing pipeline. Uploads are stored, queued and processed in the background; results are recorded by the notification worker."
    ),
    paths(
        handlers::image_upload::upload_image,
        handlers::dead_letters::list_dead_letters,
        handlers::health::health_check,
    ),
    components(schemas(
        models::UploadAccepted,
        models::DeadLetterList,
        models::DeadLetterRecord,
        models::ProcessingMessage,
        models::ProcessedResult,
        models::ResultStatus,
        handlers::health::HealthResponse,
        error::ErrorResponse,
    )),
    tags(
        (name = "images", description = "Image upload"),
        (name = "operations", description = "Health and dead-letter inspection")
    )
)]
pub struct ApiDoc;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_openapi_lists_all_routes() {
        let doc = ApiDoc::openapi();
        for path in ["/v1/images/upload", "/v1/dead-letters", "/health"] {
            assert!(doc.paths.paths.contains_key(path), "missing {}", path);
        }
    }
}
