//! Error types for the fchanger library.
//!
//! Three error types reflect three distinct failure modes:
//!
//! * [`ConvertError`] — **Fatal**: the caller's request cannot proceed at all
//!   (quality out of range, unknown format, no usable input, unwritable
//!   output directory). Returned as `Err(ConvertError)`.
//!
//! * [`ItemError`] — **Non-fatal**: a single image failed to decode or encode
//!   but the rest of the batch is fine. Stored inside
//!   [`crate::batch::ItemStatus::Error`] so callers see partial success
//!   instead of losing the whole batch to one corrupt file.
//!
//! * [`EnrichmentError`] — the external metadata call failed. Always absorbed
//!   by the batch: it is reported for display and never touches an item's
//!   conversion status.

use crate::format::SupportedFormat;
use std::path::PathBuf;
use thiserror::Error;

/// All fatal errors returned by the fchanger library.
///
/// Per-image failures use [`ItemError`] and live in the item's status rather
/// than being propagated here.
#[derive(Debug, Error)]
pub enum ConvertError {
    // ── Options errors ────────────────────────────────────────────────────
    /// Quality scalar is outside `[0.0, 1.0]` (or NaN).
    #[error("Invalid quality {value}: must be between 0.0 and 1.0")]
    InvalidQuality { value: f32 },

    /// Format name not in the supported set.
    #[error("Unknown image format '{input}'\nSupported: png, jpg, webp, bmp, avif, gif")]
    UnknownFormat { input: String },

    // ── Input errors ──────────────────────────────────────────────────────
    /// None of the supplied inputs was an image.
    #[error("No valid image files in input ({rejected} rejected)\nPlease select PNG, JPEG, WEBP, BMP, AVIF or GIF files.")]
    NoValidImages { rejected: usize },

    /// Input file was not found at the given path.
    #[error("Image file not found: '{path}'\nCheck the path exists and is readable.")]
    FileNotFound { path: PathBuf },

    /// Process does not have read permission on the file.
    #[error("Permission denied reading '{path}'\nTry: chmod +r {path:?}")]
    PermissionDenied { path: PathBuf },

    /// HTTP URL was syntactically valid but download failed.
    #[error("Failed to download '{url}': {reason}\nCheck your internet connection.")]
    DownloadFailed { url: String, reason: String },

    /// Download exceeded the configured timeout.
    #[error("Download timed out after {secs}s for '{url}'\nIncrease --download-timeout.")]
    DownloadTimeout { url: String, secs: u64 },

    // ── Enrichment setup errors ───────────────────────────────────────────
    /// The configured provider is not initialised (missing API key etc.).
    #[error("LLM provider '{provider}' is not configured.\n{hint}")]
    ProviderNotConfigured { provider: String, hint: String },

    // ── I/O errors ────────────────────────────────────────────────────────
    /// Could not create or write a converted image.
    #[error("Failed to write output file '{path}': {source}")]
    OutputWriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// A non-fatal error for a single image in a batch.
///
/// Stored in [`crate::batch::ItemStatus::Error`]. The batch run continues and
/// completes normally; the next run re-targets the item.
#[derive(Debug, Clone, PartialEq, Error, serde::Serialize, serde::Deserialize)]
pub enum ItemError {
    /// Source bytes are empty, corrupt, or in a codec this build cannot read.
    #[error("decode failed: {detail}")]
    Decode { detail: String },

    /// The target encoder could not produce output.
    #[error("{format} encode failed: {detail}")]
    Encode {
        format: SupportedFormat,
        detail: String,
    },

    /// The blocking conversion task panicked or was cancelled by the runtime.
    #[error("conversion task failed: {detail}")]
    TaskFailed { detail: String },
}

/// Failure of the external metadata enrichment call.
///
/// Never marks an item as failed; see [`crate::batch::Batch::complete_enrichment`].
#[derive(Debug, Clone, PartialEq, Error)]
pub enum EnrichmentError {
    /// Network, quota, auth or any other provider-side failure.
    #[error("enrichment request failed: {0}")]
    Transport(String),

    /// The provider did not answer within the configured timeout.
    #[error("enrichment timed out after {secs}s")]
    Timeout { secs: u64 },

    /// The provider answered with an empty body.
    #[error("no response from enrichment provider")]
    EmptyResponse,

    /// The response was not the expected JSON object.
    #[error("malformed enrichment response: {0}")]
    Malformed(String),

    /// A required field was absent or empty.
    #[error("enrichment response missing required field '{0}'")]
    MissingField(&'static str),
}
