//! # fchanger
//!
//! Re-encode small batches of images into another format, with optional
//! vision-LLM suggestions for filenames, alt text and descriptions.
//!
//! ## Pipeline Overview
//!
//! ```text
//! paths / URLs / bytes
//!  │
//!  ├─ 1. Input      sniff content types, drop non-images, keep at most 5
//!  ├─ 2. Decode     magic-byte sniffing → RGBA bitmap (spawn_blocking)
//!  ├─ 3. Composite  flatten onto white for JPEG / BMP / GIF
//!  ├─ 4. Encode     PNG, JPEG, WEBP, BMP, GIF or AVIF at a quality scalar
//!  └─ 5. Output     per-item status, download names, atomic file writes
//!
//!  (optional, independent) Enrich  image → vision LLM → filename / alt text
//! ```
//!
//! Every image converts on its own: one corrupt file ends in an error status
//! for that item while the rest of the batch completes normally.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use fchanger::{convert_files, write_artifacts, ConversionOptions, ConverterConfig, SupportedFormat};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let options = ConversionOptions::new(SupportedFormat::Webp, 0.9);
//!     let (batch, notice, report) =
//!         convert_files(&["cat.png", "dog.jpg"], options, &ConverterConfig::default(), 120).await?;
//!     for warning in notice.warnings() {
//!         eprintln!("warning: {warning}");
//!     }
//!     eprintln!("{} converted, {} failed", report.stats.converted, report.stats.failed);
//!     write_artifacts(&batch, "out")?;
//!     Ok(())
//! }
//! ```
//!
//! ## Smart names
//!
//! ```rust,no_run
//! use fchanger::{Batch, EnrichmentConfig, LlmEnricher, SourceImage};
//!
//! # #[tokio::main]
//! # async fn main() -> Result<(), Box<dyn std::error::Error>> {
//! // Provider auto-detected from OPENAI_API_KEY / ANTHROPIC_API_KEY / GEMINI_API_KEY
//! let enricher = LlmEnricher::from_config(EnrichmentConfig::default())?;
//! let bytes = std::fs::read("IMG_0042.png")?;
//! let (mut batch, _) = Batch::accept(vec![SourceImage::from_bytes("IMG_0042.png", bytes)])?;
//! batch.enrich_all(&enricher).await;
//! println!("{}", batch.items()[0].base_name());
//! # Ok(())
//! # }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `fchanger` binary (clap + anyhow + tracing-subscriber + indicatif) |
//! | `avif-decode` | off | Accepts AVIF sources via `image`'s dav1d backend (needs system libdav1d) |
//!
//! Disable `cli` when using only the library:
//! ```toml
//! fchanger = { version = "0.1", default-features = false }
//! ```

// ── Modules ──────────────────────────────────────────────────────────────

pub mod batch;
pub mod config;
pub mod convert;
pub mod enrich;
pub mod error;
pub mod format;
pub mod output;
pub mod pipeline;
pub mod progress;
pub mod prompts;
pub mod stream;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use batch::{
    Batch, ConversionItem, EnrichmentOutcome, EnrichmentTicket, ItemId, ItemOutcome, ItemStatus,
    RunId, RunOutcome, RunPlan,
};
pub use config::{
    ConversionOptions, ConverterConfig, ConverterConfigBuilder, EnrichmentConfig,
    EnrichmentConfigBuilder, Quality, MAX_BATCH_ITEMS, MAX_RETRIES,
};
pub use convert::{convert_files, convert_sync, load_batch, write_artifacts};
pub use enrich::{LlmEnricher, MetadataEnricher, MetadataRecord};
pub use error::{ConvertError, EnrichmentError, ItemError};
pub use format::SupportedFormat;
pub use output::{BatchReport, BatchStats, ConvertedImage, DownloadArtifact, ItemReport, StatusKind};
pub use pipeline::{AdmissionNotice, SourceImage};
pub use progress::{BatchProgressCallback, NoopProgressCallback, ProgressCallback};
pub use stream::{convert_stream, OutcomeStream};
