//! Frame preparation for upload
//!
//! The backend caps payload size, so frames are downscaled to fit a
//! bounding box and re-encoded as JPEG before sending.

use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;
use image::DynamicImage;

pub const UPLOAD_MIME_TYPE: &str = "image/jpeg";

/// Upload limits
#[derive(Debug, Clone)]
pub struct ImageLimits {
    /// Longest allowed width
    pub max_width: u32,
    /// Longest allowed height
    pub max_height: u32,
    /// Largest allowed encoded size in bytes
    pub max_bytes: usize,
    /// JPEG quality steps, tried in order until the result fits
    pub quality_steps: Vec<u8>,
}

impl Default for ImageLimits {
    fn default() -> Self {
        Self {
            max_width: 1024,
            max_height: 1024,
            max_bytes: 4 * 1024 * 1024,
            quality_steps: vec![85, 70, 55, 40],
        }
    }
}

/// Encoded upload image
#[derive(Debug, Clone)]
pub struct PreparedImage {
    pub data: Vec<u8>,
    pub width: u32,
    pub height: u32,
    pub quality: u8,
}

#[derive(Debug, thiserror::Error)]
pub enum ImagePrepError {
    #[error("frame could not be decoded: {0}")]
    Decode(image::ImageError),

    #[error("JPEG encoding failed: {0}")]
    Encode(image::ImageError),

    #[error("encoded image is {size} bytes, over the {limit} byte limit")]
    TooLarge { size: usize, limit: usize },
}

/// Decode, fit inside the bounding box, and re-encode as JPEG
pub fn prepare_for_upload(raw: &[u8], limits: &ImageLimits) -> Result<PreparedImage, ImagePrepError> {
    let decoded = image::load_from_memory(raw).map_err(ImagePrepError::Decode)?;

    let fitted = if decoded.width() > limits.max_width || decoded.height() > limits.max_height {
        decoded.resize(limits.max_width, limits.max_height, FilterType::Lanczos3)
    } else {
        decoded
    };
    let rgb = DynamicImage::ImageRgb8(fitted.to_rgb8());

    let mut last_size = 0;
    for &quality in &limits.quality_steps {
        let mut data = Vec::new();
        let encoder = JpegEncoder::new_with_quality(&mut data, quality);
        rgb.write_with_encoder(encoder).map_err(ImagePrepError::Encode)?;

        if data.len() <= limits.max_bytes {
            return Ok(PreparedImage {
                data,
                width: rgb.width(),
                height: rgb.height(),
                quality,
            });
        }

        tracing::debug!(
            quality = quality,
            size = data.len(),
            limit = limits.max_bytes,
            "Encoded frame over limit, lowering quality"
        );
        last_size = data.len();
    }

    Err(ImagePrepError::TooLarge {
        size: last_size,
        limit: limits.max_bytes,
    })
}
