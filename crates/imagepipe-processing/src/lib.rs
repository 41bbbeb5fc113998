//! Imagepipe Processing Library
//!
//! Upload validation (size, extension, content type, magic bytes) and the pluggable
//! image transformation applied by the processing worker.

pub mod image;
pub mod validator;

pub use crate::image::{GrayscaleTransform, ImageTransform, TransformError, TransformedImage};
pub use validator::{normalize_content_type, UploadValidator, ValidationError};
