//! Output types: converted images, download artifacts and run reports.

use crate::enrich::MetadataRecord;
use crate::format::SupportedFormat;
use serde::Serialize;

/// Bytes produced by a successful conversion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConvertedImage {
    /// Encoded file content.
    pub bytes: Vec<u8>,
    /// The format `bytes` are actually encoded in.
    pub format: SupportedFormat,
    pub width: u32,
    pub height: u32,
}

impl ConvertedImage {
    pub fn mime_type(&self) -> &'static str {
        self.format.mime_type()
    }

    pub fn size(&self) -> usize {
        self.bytes.len()
    }
}

/// What a caller needs to save one converted image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadArtifact<'a> {
    pub filename: String,
    pub bytes: &'a [u8],
    pub mime_type: &'static str,
}

/// Coarse item status, for reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StatusKind {
    Idle,
    Converting,
    Success,
    Error,
}

/// Snapshot of one item after a run.
#[derive(Debug, Clone, Serialize)]
pub struct ItemReport {
    pub id: u64,
    pub name: String,
    pub status: StatusKind,
    pub input_bytes: usize,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub output_bytes: Option<usize>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub format: Option<SupportedFormat>,

    /// Pixel dimensions of the converted image.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dimensions: Option<(u32, u32)>,

    /// Download filename, present on success.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub filename: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<MetadataRecord>,

    pub use_smart_name: bool,
}

/// Counters for a single run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BatchStats {
    /// Items in the batch when the run was applied.
    pub total_items: usize,
    /// Items this run converted successfully.
    pub converted: usize,
    /// Items this run left in the error state.
    pub failed: usize,
    /// Items the run did not dispatch (already converted or in flight).
    pub skipped: usize,
    /// Outcomes dropped because their item was gone.
    pub stale: usize,
    pub input_bytes: u64,
    pub output_bytes: u64,
    pub duration_ms: u64,
}

/// Result of a batch run. Partial failure is reported here, not as `Err`.
#[derive(Debug, Clone, Serialize)]
pub struct BatchReport {
    pub format: SupportedFormat,
    pub items: Vec<ItemReport>,
    pub stats: BatchStats,
}

impl BatchReport {
    pub fn has_failures(&self) -> bool {
        self.stats.failed > 0
    }
}

/// Human-readable byte size: `0 Bytes`, `512 Bytes`, `1.5 KB`, `2.25 MB`.
pub fn format_file_size(bytes: u64) -> String {
    const UNITS: [&str; 4] = ["Bytes", "KB", "MB", "GB"];
    if bytes == 0 {
        return "0 Bytes".to_string();
    }

    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }

    // Two decimals, trailing zeros trimmed.
    let rounded = (value * 100.0).round() / 100.0;
    format!("{} {}", rounded, UNITS[unit])
}
