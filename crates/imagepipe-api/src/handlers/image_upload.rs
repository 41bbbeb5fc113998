use std::sync::Arc;

use axum::{
    extract::{Multipart, State},
    http::{HeaderMap, StatusCode},
    Json,
};
use imagepipe_core::constants::{API_KEY_HEADER, UPLOAD_FIELD_NAME, UPLOAD_ID_FIELD_NAME};
use imagepipe_core::models::UploadAccepted;
use imagepipe_core::AppError;

use crate::error::{multipart_error, ErrorResponse, HttpAppError};
use crate::services::IncomingUpload;
use crate::state::AppState;

pub(crate) fn api_key(headers: &HeaderMap) -> Option<&str> {
    headers.get(API_KEY_HEADER).and_then(|v| v.to_str().ok())
}

/// Read the `image` file part and the optional `upload_id` text part
async fn read_upload(mut multipart: Multipart) -> Result<IncomingUpload, HttpAppError> {
    let mut image = None;
    let mut upload_id = None;

    while let Some(field) = multipart.next_field().await.map_err(multipart_error)? {
        let name = field.name().unwrap_or_default().to_string();
        if name == UPLOAD_FIELD_NAME {
            let filename = field
                .file_name()
                .filter(|f| !f.trim().is_empty())
                .map(String::from);
            let content_type = field.content_type().map(String::from);
            let data = field.bytes().await.map_err(multipart_error)?;
            image = Some((data, content_type, filename));
        } else if name == UPLOAD_ID_FIELD_NAME {
            upload_id = Some(field.text().await.map_err(multipart_error)?);
        } else {
            tracing::debug!(field = %name, "Ignoring unknown multipart field");
        }
    }

    let (data, content_type, filename) = image.ok_or_else(|| {
        AppError::BadRequest(format!("No '{}' file provided", UPLOAD_FIELD_NAME))
    })?;
    let content_type = content_type
        .ok_or_else(|| AppError::BadRequest("Image part has no Content-Type".to_string()))?;

    Ok(IncomingUpload {
        data,
        content_type,
        filename,
        upload_id,
    })
}

/// Upload image handler
///
/// Authenticates the caller, then validates, stores and enqueues the image for
/// asynchronous processing. Processing results are not returned here.
#[utoipa::path(
    post,
    path = "/v1/images/upload",
    tag = "images",
    params(
        ("x-api-key" = String, Header, description = "Caller API key")
    ),
    request_body(content = inline(Object), content_type = "multipart/form-data",
        description = "Field `image` (file) and optional field `upload_id` (UUID)"),
    responses(
        (status = 202, description = "Image accepted for processing", body = UploadAccepted),
        (status = 400, description = "Invalid or missing file", body = ErrorResponse),
        (status = 401, description = "Missing or invalid API key", body = ErrorResponse),
        (status = 413, description = "File too large", body = ErrorResponse),
        (status = 429, description = "Rate limit exceeded", body = ErrorResponse),
        (status = 500, description = "Internal server error", body = ErrorResponse)
    )
)]
#[tracing::instrument(skip(state, headers, multipart), fields(operation = "upload_image"))]
pub async fn upload_image(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    multipart: Multipart,
) -> Result<(StatusCode, Json<UploadAccepted>), HttpAppError> {
    let intake = state.intake.clone();
    let caller = intake.authenticate(api_key(&headers)).await?;
    let timeout = intake.upload_timeout();

    let accepted = tokio::time::timeout(timeout, async {
        let upload = read_upload(multipart).await?;
        intake
            .accept(&caller, upload)
            .await
            .map_err(HttpAppError::from)
    })
    .await
    .map_err(|_| AppError::Timeout(format!("upload exceeded {:?}", timeout)))??;

    Ok((StatusCode::ACCEPTED, Json(accepted)))
}
