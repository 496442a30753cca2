//! Pipeline stages for re-encoding one image.
//!
//! Each submodule implements exactly one transformation step, so each is
//! independently testable.
//!
//! ## Data Flow
//!
//! ```text
//! input ──▶ decode ──▶ composite ──▶ encode
//! (path/URL/bytes) (Bitmap)  (Surface)    (bytes)
//! ```
//!
//! 1. [`input`]     — turn a path, URL or buffer into a [`SourceImage`] and
//!    admit at most [`crate::config::MAX_BATCH_ITEMS`] of them
//! 2. [`decode`]    — sniff and decode the source into an RGBA [`Bitmap`]
//! 3. [`composite`] — draw the bitmap onto a fresh [`Surface`], flattening
//!    onto white for formats without alpha
//! 4. [`encode`]    — serialise the surface in the target format
//!
//! Stages 2–4 are CPU-bound and synchronous; the batch runs
//! [`convert_image`] inside `spawn_blocking`.

pub mod composite;
pub mod decode;
pub mod encode;
pub mod input;

pub use composite::{composite, Surface};
pub use decode::{decode, Bitmap};
pub use encode::encode;
pub use input::{admit, Admission, AdmissionNotice, SourceImage};

use crate::config::{ConverterConfig, Quality};
use crate::error::ItemError;
use crate::format::SupportedFormat;
use crate::output::ConvertedImage;
use std::time::Instant;
use tracing::debug;

/// Run decode → composite → encode for a single source image.
///
/// Strictly sequential; the bitmap and surface are dropped as soon as the
/// next stage has consumed them, on success and on every error path.
pub fn convert_image(
    source: &SourceImage,
    format: SupportedFormat,
    quality: Quality,
    config: &ConverterConfig,
) -> Result<ConvertedImage, ItemError> {
    let start = Instant::now();

    let bitmap = decode::decode_with_limit(
        source.bytes(),
        source.content_type(),
        config.max_decode_dimension,
    )?;
    let (width, height) = bitmap.dimensions();

    let surface = composite(&bitmap, format);
    drop(bitmap);

    let bytes = encode::encode_with_speed(&surface, format, quality, config.avif_speed)?;

    debug!(
        "{}: {}x{} → {} ({} bytes) in {:?}",
        source.name(),
        width,
        height,
        format,
        bytes.len(),
        start.elapsed()
    );

    Ok(ConvertedImage {
        bytes,
        format,
        width,
        height,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgba, RgbaImage};
    use std::io::Cursor;

    fn png_source(name: &str, img: &RgbaImage) -> SourceImage {
        let mut buf = Vec::new();
        img.write_to(&mut Cursor::new(&mut buf), image::ImageFormat::Png)
            .unwrap();
        SourceImage::new(name, "image/png", buf)
    }

    #[test]
    fn converts_png_to_jpeg() {
        let img = RgbaImage::from_pixel(6, 4, Rgba([10, 200, 30, 255]));
        let source = png_source("leaf.png", &img);

        let out = convert_image(
            &source,
            SupportedFormat::Jpeg,
            Quality::MAX,
            &ConverterConfig::default(),
        )
        .expect("conversion should succeed");

        assert_eq!(out.format, SupportedFormat::Jpeg);
        assert_eq!((out.width, out.height), (6, 4));
        assert_eq!(
            image::guess_format(&out.bytes).unwrap(),
            image::ImageFormat::Jpeg
        );
    }

    #[test]
    fn corrupt_source_is_decode_error() {
        let source = SourceImage::new("broken.png", "image/png", b"not an image".to_vec());
        let err = convert_image(
            &source,
            SupportedFormat::Png,
            Quality::MAX,
            &ConverterConfig::default(),
        )
        .unwrap_err();
        assert!(matches!(err, ItemError::Decode { .. }), "got {err:?}");
    }
}
