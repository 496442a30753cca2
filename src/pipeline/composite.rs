//! Compositing: draw a decoded bitmap onto a fresh surface for the target.
//!
//! Formats without reliable alpha (JPEG, BMP, GIF) get an opaque white
//! background first and the bitmap is blended on top with source-over.
//! Skipping that fill leaves transparent regions black (or whatever the
//! encoder makes of discarded alpha), never white.

use crate::format::SupportedFormat;
use crate::pipeline::decode::Bitmap;
use image::{imageops, Rgba, RgbaImage};

const OPAQUE_WHITE: Rgba<u8> = Rgba([255, 255, 255, 255]);

/// A freshly allocated RGBA pixel buffer, ready to encode.
#[derive(Debug, Clone, PartialEq)]
pub struct Surface(RgbaImage);

impl Surface {
    pub fn dimensions(&self) -> (u32, u32) {
        self.0.dimensions()
    }

    pub fn pixels(&self) -> &RgbaImage {
        &self.0
    }

    /// Whether every pixel is fully opaque.
    pub fn is_opaque(&self) -> bool {
        self.0.pixels().all(|p| p[3] == u8::MAX)
    }
}

/// Composite `bitmap` onto a new surface of the same size for `target`.
pub fn composite(bitmap: &Bitmap, target: SupportedFormat) -> Surface {
    let (width, height) = bitmap.dimensions();

    if target.supports_alpha() {
        // Source-over onto a fully transparent surface is the identity.
        return Surface(bitmap.pixels().clone());
    }

    let mut surface = RgbaImage::from_pixel(width, height, OPAQUE_WHITE);
    imageops::overlay(&mut surface, bitmap.pixels(), 0, 0);
    Surface(surface)
}
