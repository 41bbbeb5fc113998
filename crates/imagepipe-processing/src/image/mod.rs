//! Image transformation module
//!
//! - `transform`: the `ImageTransform` capability and its result/error types
//! - `grayscale`: grayscale conversion with JPEG output

pub mod grayscale;
pub mod transform;

pub use grayscale::GrayscaleTransform;
pub use transform::{ImageTransform, TransformError, TransformedImage};
