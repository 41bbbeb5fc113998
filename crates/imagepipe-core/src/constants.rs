//! Shared constants: accepted formats, object key prefixes, message attributes.

/// Content types accepted at intake.
pub const ALLOWED_CONTENT_TYPES: &[&str] = &[
    "image/jpeg",
    "image/png",
    "image/gif",
    "image/bmp",
    "image/webp",
];

/// File extensions accepted at intake.
pub const ALLOWED_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "gif", "bmp", "webp"];

pub const UPLOAD_PREFIX: &str = "uploads/";
pub const PROCESSED_PREFIX: &str = "processed/";
pub const RESULTS_PREFIX: &str = "results/";

/// Multipart field carrying the image.
pub const UPLOAD_FIELD_NAME: &str = "image";
/// Optional multipart field carrying a client-supplied upload id.
pub const UPLOAD_ID_FIELD_NAME: &str = "upload_id";

pub const API_KEY_HEADER: &str = "x-api-key";

pub const ACCEPTED_MESSAGE: &str = "Image accepted and queued for processing.";
pub const STATUS_PROCESSING: &str = "PROCESSING";

pub const COMPLETION_EVENT_TYPE: &str = "IMAGE_PROCESSING_COMPLETE";

/// Message attribute names set on published messages.
pub const ATTR_UPLOAD_ID: &str = "upload_id";
pub const ATTR_STATUS: &str = "status";

pub const DEFAULT_LOCAL_STORAGE_PATH: &str = "./data/objects";
pub const DEFAULT_COMPLETION_LOG_PATH: &str = "./data/completions.jsonl";
pub const DEFAULT_DEAD_LETTER_LOG_PATH: &str = "./data/dead-letters.jsonl";
