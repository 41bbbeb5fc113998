//! Route paths and HTTP limits

pub const UPLOAD_PATH: &str = "/v1/images/upload";
pub const DEAD_LETTERS_PATH: &str = "/v1/dead-letters";
pub const HEALTH_PATH: &str = "/health";
pub const OPENAPI_PATH: &str = "/openapi.json";

/// Allowance on top of the maximum file size for multipart framing and text fields
pub const MULTIPART_OVERHEAD_BYTES: usize = 64 * 1024;

/// Server-level concurrency limit
pub const HTTP_CONCURRENCY_LIMIT: usize = 1024;
