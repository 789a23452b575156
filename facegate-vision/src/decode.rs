//! Base64 image decoding for captured frames.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use image::{DynamicImage, RgbImage};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ImageDecodeError {
    #[error("image data is empty")]
    EmptyData,

    #[error("invalid base64 encoding: {0}")]
    InvalidBase64(#[from] base64::DecodeError),

    #[error("unreadable image data: {0}")]
    Unreadable(#[from] image::ImageError),
}

/// Strip an optional data-URL header (`data:image/png;base64,`).
///
/// Everything up to and including the first comma is dropped.
pub fn strip_data_url(input: &str) -> &str {
    match input.split_once(',') {
        Some((_, payload)) => payload,
        None => input,
    }
}

/// Decode raw image bytes into 8-bit RGB, detecting the container format.
pub fn decode_image_bytes(bytes: &[u8]) -> Result<RgbImage, ImageDecodeError> {
    if bytes.is_empty() {
        return Err(ImageDecodeError::EmptyData);
    }
    let img = image::load_from_memory(bytes)?;
    Ok(img.to_rgb8())
}

/// Decode a base64 (optionally data-URL prefixed) image into 8-bit RGB.
///
/// ASCII whitespace anywhere in the payload is ignored, so line-wrapped
/// base64 is accepted. Alpha is dropped and grayscale is expanded. The
/// embedding pipeline packs the result into the BGR planes the models expect.
pub fn decode_base64_image(input: &str) -> Result<DynamicImage, ImageDecodeError> {
    let payload: String = strip_data_url(input)
        .chars()
        .filter(|c| !c.is_ascii_whitespace())
        .collect();
    if payload.is_empty() {
        return Err(ImageDecodeError::EmptyData);
    }
    let bytes = STANDARD.decode(&payload)?;
    Ok(DynamicImage::ImageRgb8(decode_image_bytes(&bytes)?))
}
