use std::io::Cursor;

use bytes::Bytes;
use image::codecs::jpeg::JpegEncoder;

use super::transform::{ImageTransform, TransformError, TransformedImage};

pub const DEFAULT_JPEG_QUALITY: u8 = 90;

/// Converts any decodable image to 8-bit grayscale and re-encodes it as JPEG.
#[derive(Debug, Clone)]
pub struct GrayscaleTransform {
    quality: u8,
}

impl GrayscaleTransform {
    pub fn new(quality: u8) -> Self {
        Self {
            quality: quality.clamp(1, 100),
        }
    }
}

impl Default for GrayscaleTransform {
    fn default() -> Self {
        Self::new(DEFAULT_JPEG_QUALITY)
    }
}

impl ImageTransform for GrayscaleTransform {
    fn name(&self) -> &'static str {
        "grayscale"
    }

    fn transform(&self, data: &[u8]) -> Result<TransformedImage, TransformError> {
        let reader = image::ImageReader::new(Cursor::new(data))
            .with_guessed_format()
            .map_err(|e| TransformError::Decode(e.to_string()))?;

        let source_format = reader.format();
        if source_format.is_none() {
            return Err(TransformError::Unsupported(
                "unrecognized image format".to_string(),
            ));
        }

        let img = reader
            .decode()
            .map_err(|e| TransformError::Decode(e.to_string()))?;

        let gray = img.to_luma8();
        let (width, height) = gray.dimensions();

        let mut buffer = Vec::with_capacity(width as usize * height as usize / 4);
        let mut encoder = JpegEncoder::new_with_quality(&mut buffer, self.quality);
        encoder
            .encode_image(&gray)
            .map_err(|e| TransformError::Encode(e.to_string()))?;

        tracing::debug!(
            source_format = ?source_format,
            width = width,
            height = height,
            input_bytes = data.len(),
            output_bytes = buffer.len(),
            "Converted image to grayscale"
        );

        Ok(TransformedImage {
            data: Bytes::from(buffer),
            content_type: "image/jpeg",
            width,
            height,
        })
    }
}
