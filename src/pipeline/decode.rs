//! Decoding: raw source bytes → owned RGBA [`Bitmap`].
//!
//! The container format is sniffed from magic bytes; the declared content
//! type is only consulted when sniffing fails. Width and height are checked
//! against a limit from the header, before any pixel buffer is allocated.

use crate::error::ItemError;
use image::{ImageFormat, ImageReader, Limits, RgbaImage};
use std::io::Cursor;
use tracing::debug;

/// Default per-side limit used by [`decode`].
pub const DEFAULT_MAX_DIMENSION: u32 = 16_384;

/// A decoded, pixel-addressable image.
#[derive(Debug, Clone, PartialEq)]
pub struct Bitmap(RgbaImage);

impl Bitmap {
    pub fn width(&self) -> u32 {
        self.0.width()
    }

    pub fn height(&self) -> u32 {
        self.0.height()
    }

    pub fn dimensions(&self) -> (u32, u32) {
        self.0.dimensions()
    }

    pub fn pixels(&self) -> &RgbaImage {
        &self.0
    }
}

impl From<RgbaImage> for Bitmap {
    fn from(img: RgbaImage) -> Self {
        Self(img)
    }
}

/// Decode with the default dimension limit.
pub fn decode(bytes: &[u8], declared_content_type: &str) -> Result<Bitmap, ItemError> {
    decode_with_limit(bytes, declared_content_type, DEFAULT_MAX_DIMENSION)
}

/// Decode `bytes` into a bitmap, rejecting images wider or taller than
/// `max_dimension` pixels.
///
/// # Errors
/// [`ItemError::Decode`] for empty input, unrecognised or corrupt data, and
/// codecs not compiled into this build (AVIF without the `avif-decode` feature).
pub fn decode_with_limit(
    bytes: &[u8],
    declared_content_type: &str,
    max_dimension: u32,
) -> Result<Bitmap, ItemError> {
    if bytes.is_empty() {
        return Err(decode_error("empty input"));
    }

    let format = image::guess_format(bytes)
        .ok()
        .or_else(|| ImageFormat::from_mime_type(declared_content_type))
        .ok_or_else(|| {
            decode_error(format!(
                "unrecognised image data (declared as '{declared_content_type}')"
            ))
        })?;

    let mut limits = Limits::default();
    limits.max_image_width = Some(max_dimension);
    limits.max_image_height = Some(max_dimension);

    let mut reader = ImageReader::with_format(Cursor::new(bytes), format);
    reader.limits(limits);

    let img = reader
        .decode()
        .map_err(|e| decode_error(format!("{format:?}: {e}")))?;

    debug!(
        "Decoded {:?} {}x{} ({:?})",
        format,
        img.width(),
        img.height(),
        img.color()
    );

    Ok(Bitmap(img.into_rgba8()))
}

fn decode_error(detail: impl Into<String>) -> ItemError {
    ItemError::Decode {
        detail: detail.into(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgba, RgbaImage};

    fn encoded(img: &RgbaImage, format: ImageFormat) -> Vec<u8> {
        let mut buf = Vec::new();
        img.write_to(&mut Cursor::new(&mut buf), format).unwrap();
        buf
    }

    #[test]
    fn decodes_png_with_dimensions() {
        let img = RgbaImage::from_pixel(7, 3, Rgba([1, 2, 3, 4]));
        let bitmap = decode(&encoded(&img, ImageFormat::Png), "image/png").unwrap();
        assert_eq!(bitmap.dimensions(), (7, 3));
        assert_eq!(bitmap.pixels().get_pixel(0, 0), &Rgba([1, 2, 3, 4]));
    }

    #[test]
    fn declared_type_is_advisory() {
        let img = RgbaImage::from_pixel(2, 2, Rgba([9, 9, 9, 255]));
        let bytes = encoded(&img, ImageFormat::Png);
        // Magic bytes win over a wrong label.
        let bitmap = decode(&bytes, "image/jpeg").unwrap();
        assert_eq!(bitmap.dimensions(), (2, 2));
    }

    #[test]
    fn empty_input_fails() {
        let err = decode(&[], "image/png").unwrap_err();
        assert_eq!(
            err,
            ItemError::Decode {
                detail: "empty input".into()
            }
        );
    }

    #[test]
    fn unrecognised_bytes_fail() {
        let err = decode(b"definitely not pixels", "text/plain").unwrap_err();
        assert!(matches!(err, ItemError::Decode { ref detail } if detail.contains("text/plain")));
    }

    #[test]
    fn truncated_png_fails() {
        let img = RgbaImage::from_pixel(16, 16, Rgba([200, 0, 0, 255]));
        let bytes = encoded(&img, ImageFormat::Png);
        let err = decode(&bytes[..bytes.len() / 2], "image/png").unwrap_err();
        assert!(matches!(err, ItemError::Decode { .. }));
    }

    #[test]
    fn oversized_image_rejected() {
        let img = RgbaImage::from_pixel(32, 8, Rgba([0, 0, 0, 255]));
        let bytes = encoded(&img, ImageFormat::Png);
        assert!(decode_with_limit(&bytes, "image/png", 16).is_err());
        assert!(decode_with_limit(&bytes, "image/png", 32).is_ok());
    }
}
