//! Encoding: composited [`Surface`] → file bytes in the target format.
//!
//! One encoder per [`SupportedFormat`]. WEBP goes through libwebp (the `webp`
//! crate) for its lossy mode; everything else uses the `image` crate:
//!
//! | Format | Encoder | Quality |
//! |--------|---------|---------|
//! | PNG    | `PngEncoder`, RGBA8 | ignored |
//! | JPEG   | `JpegEncoder`, RGB8 | 1–100 |
//! | WEBP   | `webp::Encoder` lossy, RGBA8, alpha kept lossless | 0–100 |
//! | BMP    | `BmpEncoder`, RGB8 | ignored |
//! | GIF    | `GifEncoder`, RGBA8 quantised to 256 colours | ignored |
//! | AVIF   | `AvifEncoder` (rav1e), RGBA8 | 1–100 |
//!
//! An encoder failure is reported as [`ItemError::Encode`] for the requested
//! format. Nothing here ever falls back to a different format.

use crate::config::Quality;
use crate::error::ItemError;
use crate::format::SupportedFormat;
use crate::pipeline::composite::Surface;
use image::codecs::avif::AvifEncoder;
use image::codecs::bmp::BmpEncoder;
use image::codecs::gif::GifEncoder;
use image::codecs::jpeg::JpegEncoder;
use image::codecs::png::PngEncoder;
use image::{ExtendedColorType, ImageEncoder, ImageError, Rgb, RgbImage};
use tracing::debug;

/// rav1e speed preset used by [`encode`].
pub const DEFAULT_AVIF_SPEED: u8 = 8;

/// Encode `surface` as `format` at `quality`.
pub fn encode(
    surface: &Surface,
    format: SupportedFormat,
    quality: Quality,
) -> Result<Vec<u8>, ItemError> {
    encode_with_speed(surface, format, quality, DEFAULT_AVIF_SPEED)
}

/// Like [`encode`], with an explicit AVIF speed preset (1–10).
pub fn encode_with_speed(
    surface: &Surface,
    format: SupportedFormat,
    quality: Quality,
    avif_speed: u8,
) -> Result<Vec<u8>, ItemError> {
    let (width, height) = surface.dimensions();
    let rgba = surface.pixels().as_raw();
    let mut buf = Vec::new();

    let result = match format {
        SupportedFormat::Png => {
            PngEncoder::new(&mut buf).write_image(rgba, width, height, ExtendedColorType::Rgba8)
        }
        SupportedFormat::Jpeg => {
            let rgb = drop_alpha(surface);
            JpegEncoder::new_with_quality(&mut buf, quality.percent()).write_image(
                rgb.as_raw(),
                width,
                height,
                ExtendedColorType::Rgb8,
            )
        }
        SupportedFormat::Webp => {
            buf = encode_webp(rgba, width, height, quality).map_err(|detail| {
                ItemError::Encode { format, detail }
            })?;
            Ok(())
        }
        SupportedFormat::Bmp => {
            let rgb = drop_alpha(surface);
            BmpEncoder::new(&mut buf).write_image(
                rgb.as_raw(),
                width,
                height,
                ExtendedColorType::Rgb8,
            )
        }
        SupportedFormat::Gif => encode_gif(&mut buf, rgba, width, height),
        SupportedFormat::Avif => AvifEncoder::new_with_speed_quality(
            &mut buf,
            avif_speed.clamp(1, 10),
            quality.percent(),
        )
        .write_image(rgba, width, height, ExtendedColorType::Rgba8),
    };

    result.map_err(|e| ItemError::Encode {
        format,
        detail: e.to_string(),
    })?;

    if buf.is_empty() {
        return Err(ItemError::Encode {
            format,
            detail: "encoder produced no output".into(),
        });
    }

    debug!(
        "Encoded {}x{} as {} (q={:.2}) → {} bytes",
        width,
        height,
        format,
        quality.value(),
        buf.len()
    );
    Ok(buf)
}

fn encode_webp(rgba: &[u8], width: u32, height: u32, quality: Quality) -> Result<Vec<u8>, String> {
    let memory = webp::Encoder::from_rgba(rgba, width, height)
        .encode_simple(false, quality.value() * 100.0)
        .map_err(|e| format!("libwebp: {e:?}"))?;
    Ok(memory.to_vec())
}

// The GIF trailer is written when the encoder drops.
fn encode_gif(buf: &mut Vec<u8>, rgba: &[u8], width: u32, height: u32) -> Result<(), ImageError> {
    let mut encoder = GifEncoder::new(buf);
    encoder.encode(rgba, width, height, ExtendedColorType::Rgba8)
}

/// Only called for surfaces already flattened onto white.
fn drop_alpha(surface: &Surface) -> RgbImage {
    let px = surface.pixels();
    RgbImage::from_fn(px.width(), px.height(), |x, y| {
        let p = px.get_pixel(x, y);
        Rgb([p[0], p[1], p[2]])
    })
}
