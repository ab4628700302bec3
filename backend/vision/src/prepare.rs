use std::io::Cursor;

use bilbot_config::ModelConfig;
use bilbot_core::{BilboError, ImagePayload};
use image::imageops::FilterType;
use image::{DynamicImage, GenericImageView, ImageOutputFormat};
use tracing::{debug, warn};

use crate::enhance;

const JPEG_QUALITY: u8 = 90;

/// What happens to an image before it is sent to a model.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PrepareOptions {
    /// Longest side after downscaling, in pixels.
    pub max_dimension: u32,
    pub enhance: bool,
    pub deskew: bool,
}

impl Default for PrepareOptions {
    fn default() -> Self {
        Self { max_dimension: 1200, enhance: false, deskew: false }
    }
}

impl PrepareOptions {
    pub fn from_config(config: &ModelConfig) -> Self {
        Self {
            max_dimension: config.max_image_dimension,
            enhance: config.preprocessing.enhance,
            deskew: config.preprocessing.deskew,
        }
    }
}

/// Downscale, optionally deskew and enhance, and re-encode as JPEG.
///
/// Bytes that do not decode as an image are passed through unchanged; the
/// model gets to decide what to make of them.
pub async fn prepare_image(image: &ImagePayload, options: &PrepareOptions) -> ImagePayload {
    let bytes = image.bytes.clone();
    let options = *options;
    let result = tokio::task::spawn_blocking(move || preprocess_bytes(&bytes, &options)).await;

    match result {
        Ok(Ok(jpeg)) => ImagePayload::jpeg(jpeg),
        Ok(Err(e)) => {
            warn!(error = %e, size = image.len(), "Image preparation failed; sending original bytes");
            image.clone()
        }
        Err(e) => {
            warn!(error = %e, "Image preparation task panicked; sending original bytes");
            image.clone()
        }
    }
}

/// Blocking body of [`prepare_image`], also used by `bilbot preprocess`.
pub fn preprocess_bytes(bytes: &[u8], options: &PrepareOptions) -> Result<Vec<u8>, BilboError> {
    let mut img = downscale(decode(bytes)?, options.max_dimension);
    if options.deskew {
        img = enhance::deskew(&img);
    }
    if options.enhance {
        img = enhance::enhance(&img);
    }
    encode_jpeg(&img)
}

pub(crate) fn decode(bytes: &[u8]) -> Result<DynamicImage, BilboError> {
    image::load_from_memory(bytes).map_err(|e| BilboError::Image(format!("failed to decode image: {e}")))
}

pub(crate) fn downscale(img: DynamicImage, max_dimension: u32) -> DynamicImage {
    let (width, height) = img.dimensions();
    if width > max_dimension || height > max_dimension {
        debug!(width, height, max_dimension, "Downscaling image");
        img.resize(max_dimension, max_dimension, FilterType::Lanczos3)
    } else {
        img
    }
}

pub(crate) fn encode_jpeg(img: &DynamicImage) -> Result<Vec<u8>, BilboError> {
    // The JPEG encoder only takes RGB / luma.
    let rgb = DynamicImage::ImageRgb8(img.to_rgb8());
    let mut cursor = Cursor::new(Vec::new());
    rgb.write_to(&mut cursor, ImageOutputFormat::Jpeg(JPEG_QUALITY))
        .map_err(|e| BilboError::Image(format!("failed to encode JPEG: {e}")))?;
    Ok(cursor.into_inner())
}
