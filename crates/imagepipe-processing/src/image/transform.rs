use bytes::Bytes;
use imagepipe_core::AppError;

/// Errors raised while transforming an image.
///
/// These are application-level failures: retrying the same bytes gives the same result.
#[derive(Debug, thiserror::Error)]
pub enum TransformError {
    #[error("Failed to decode image: {0}")]
    Decode(String),

    #[error("Failed to encode image: {0}")]
    Encode(String),

    #[error("Unsupported image: {0}")]
    Unsupported(String),
}

impl From<TransformError> for AppError {
    fn from(err: TransformError) -> Self {
        AppError::TransformationFailed(err.to_string())
    }
}

/// Output of a transformation
#[derive(Debug, Clone)]
pub struct TransformedImage {
    pub data: Bytes,
    pub content_type: &'static str,
    pub width: u32,
    pub height: u32,
}

/// A pure bytes-to-bytes image transformation.
///
/// Implementations are CPU bound and synchronous; the worker runs them on the blocking
/// thread pool.
pub trait ImageTransform: Send + Sync {
    /// Short name for logs
    fn name(&self) -> &'static str;

    fn transform(&self, data: &[u8]) -> Result<TransformedImage, TransformError>;
}
