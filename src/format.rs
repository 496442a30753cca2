//! Format registry: the closed set of target formats and their mappings.
//!
//! Every variant maps to exactly one encoder identifier (its MIME type) and
//! one canonical file extension. The mappings are total `match`es, so adding
//! a variant without filling them in fails to compile.

use crate::error::ConvertError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// An image format the converter can encode to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SupportedFormat {
    /// Lossless, alpha-capable. (default)
    #[default]
    Png,
    Jpeg,
    Webp,
    Bmp,
    Avif,
    Gif,
}

impl SupportedFormat {
    /// Every supported format, in the order the UI lists them.
    pub const ALL: [SupportedFormat; 6] = [
        SupportedFormat::Jpeg,
        SupportedFormat::Png,
        SupportedFormat::Webp,
        SupportedFormat::Avif,
        SupportedFormat::Gif,
        SupportedFormat::Bmp,
    ];

    /// Canonical file extension, without the dot.
    pub fn extension(self) -> &'static str {
        match self {
            SupportedFormat::Png => "png",
            SupportedFormat::Jpeg => "jpg",
            SupportedFormat::Webp => "webp",
            SupportedFormat::Bmp => "bmp",
            SupportedFormat::Avif => "avif",
            SupportedFormat::Gif => "gif",
        }
    }

    /// Encoder identifier. Doubles as the MIME type of the encoded bytes.
    pub fn mime_type(self) -> &'static str {
        match self {
            SupportedFormat::Png => "image/png",
            SupportedFormat::Jpeg => "image/jpeg",
            SupportedFormat::Webp => "image/webp",
            SupportedFormat::Bmp => "image/bmp",
            SupportedFormat::Avif => "image/avif",
            SupportedFormat::Gif => "image/gif",
        }
    }

    /// Whether the encoded file keeps per-pixel transparency.
    ///
    /// Formats returning `false` are flattened onto opaque white before
    /// encoding; see [`crate::pipeline::composite`].
    pub fn supports_alpha(self) -> bool {
        matches!(
            self,
            SupportedFormat::Png | SupportedFormat::Webp | SupportedFormat::Avif
        )
    }

    /// Whether the quality scalar changes the encoder's output.
    pub fn has_quality_axis(self) -> bool {
        matches!(
            self,
            SupportedFormat::Jpeg | SupportedFormat::Webp | SupportedFormat::Avif
        )
    }

    /// The matching `image` crate format.
    pub fn image_format(self) -> image::ImageFormat {
        match self {
            SupportedFormat::Png => image::ImageFormat::Png,
            SupportedFormat::Jpeg => image::ImageFormat::Jpeg,
            SupportedFormat::Webp => image::ImageFormat::WebP,
            SupportedFormat::Bmp => image::ImageFormat::Bmp,
            SupportedFormat::Avif => image::ImageFormat::Avif,
            SupportedFormat::Gif => image::ImageFormat::Gif,
        }
    }

    /// Reverse of [`Self::image_format`]; `None` for formats outside the set.
    pub fn from_image_format(format: image::ImageFormat) -> Option<Self> {
        match format {
            image::ImageFormat::Png => Some(SupportedFormat::Png),
            image::ImageFormat::Jpeg => Some(SupportedFormat::Jpeg),
            image::ImageFormat::WebP => Some(SupportedFormat::Webp),
            image::ImageFormat::Bmp => Some(SupportedFormat::Bmp),
            image::ImageFormat::Avif => Some(SupportedFormat::Avif),
            image::ImageFormat::Gif => Some(SupportedFormat::Gif),
            _ => None,
        }
    }

    fn label(self) -> &'static str {
        match self {
            SupportedFormat::Png => "PNG",
            SupportedFormat::Jpeg => "JPEG",
            SupportedFormat::Webp => "WEBP",
            SupportedFormat::Bmp => "BMP",
            SupportedFormat::Avif => "AVIF",
            SupportedFormat::Gif => "GIF",
        }
    }
}

impl fmt::Display for SupportedFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for SupportedFormat {
    type Err = ConvertError;

    /// Accepts extensions (`jpg`, `.webp`), names (`JPEG`) and MIME types
    /// (`image/avif`), case-insensitively.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalised = s.trim().to_ascii_lowercase();
        let name = normalised
            .strip_prefix("image/")
            .or_else(|| normalised.strip_prefix('.'))
            .unwrap_or(&normalised);

        match name {
            "png" => Ok(SupportedFormat::Png),
            "jpg" | "jpeg" => Ok(SupportedFormat::Jpeg),
            "webp" => Ok(SupportedFormat::Webp),
            "bmp" => Ok(SupportedFormat::Bmp),
            "avif" => Ok(SupportedFormat::Avif),
            "gif" => Ok(SupportedFormat::Gif),
            _ => Err(ConvertError::UnknownFormat {
                input: s.to_string(),
            }),
        }
    }
}
