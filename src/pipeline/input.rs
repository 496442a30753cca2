//! Input boundary: turn user-supplied paths, URLs or buffers into
//! [`SourceImage`]s and decide which of them enter a batch.
//!
//! Content types are sniffed from magic bytes first and fall back to the file
//! extension, the way a browser labels a dropped file. Only inputs whose
//! content type is `image/*` are admitted; a corrupt file with an image
//! extension still gets in and fails later, in the decoder, as its own item.

use crate::config::MAX_BATCH_ITEMS;
use crate::error::ConvertError;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

const UNKNOWN_CONTENT_TYPE: &str = "application/octet-stream";

/// An immutable source image: raw bytes, declared content type, display name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceImage {
    name: String,
    content_type: String,
    bytes: Vec<u8>,
}

impl SourceImage {
    pub fn new(name: impl Into<String>, content_type: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            name: name.into(),
            content_type: content_type.into(),
            bytes,
        }
    }

    /// Build a source from bytes, inferring the content type from the data
    /// and then from the name's extension.
    pub fn from_bytes(name: impl Into<String>, bytes: Vec<u8>) -> Self {
        let name = name.into();
        let content_type = sniff_content_type(&bytes, &name).to_string();
        Self::new(name, content_type, bytes)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn content_type(&self) -> &str {
        &self.content_type
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn size(&self) -> usize {
        self.bytes.len()
    }

    /// Whether the declared content type is an image type.
    pub fn is_image(&self) -> bool {
        self.content_type.starts_with("image/")
    }
}

/// Guess a MIME type from magic bytes, then from the name's extension.
pub fn sniff_content_type(bytes: &[u8], name: &str) -> &'static str {
    image::guess_format(bytes)
        .or_else(|_| image::ImageFormat::from_path(name))
        .map(|f| f.to_mime_type())
        .unwrap_or(UNKNOWN_CONTENT_TYPE)
}

// ── Admission ────────────────────────────────────────────────────────────

/// The result of admitting a set of inputs into a batch.
#[derive(Debug)]
pub struct Admission {
    /// Sources that enter the batch, in input order.
    pub accepted: Vec<SourceImage>,
    /// Number of valid images dropped because the batch was full.
    pub truncated: usize,
    /// Names of inputs rejected as non-images.
    pub rejected: Vec<String>,
}

impl Admission {
    /// Separate the admitted sources from what the caller should be told.
    pub fn split(self) -> (Vec<SourceImage>, AdmissionNotice) {
        let notice = AdmissionNotice {
            accepted: self.accepted.len(),
            truncated: self.truncated,
            rejected: self.rejected,
        };
        (self.accepted, notice)
    }
}

/// What a caller should report after inputs were admitted into a batch.
#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize)]
pub struct AdmissionNotice {
    pub accepted: usize,
    pub truncated: usize,
    pub rejected: Vec<String>,
}

impl AdmissionNotice {
    pub fn has_warnings(&self) -> bool {
        self.truncated > 0 || !self.rejected.is_empty()
    }

    /// One line per warning, ready for display.
    pub fn warnings(&self) -> Vec<String> {
        let mut out: Vec<String> = self
            .rejected
            .iter()
            .map(|name| format!("'{name}' is not an image and was skipped"))
            .collect();
        if self.truncated > 0 {
            out.push(format!(
                "You can only convert up to {MAX_BATCH_ITEMS} images at a time; {} dropped",
                self.truncated
            ));
        }
        out
    }
}

/// Filter out non-image inputs and keep at most [`MAX_BATCH_ITEMS`].
///
/// # Errors
/// [`ConvertError::NoValidImages`] when nothing image-like remains.
pub fn admit(sources: Vec<SourceImage>) -> Result<Admission, ConvertError> {
    let (mut images, others): (Vec<_>, Vec<_>) =
        sources.into_iter().partition(SourceImage::is_image);

    let rejected: Vec<String> = others.into_iter().map(|s| s.name).collect();
    for name in &rejected {
        warn!("Skipping '{}': not an image", name);
    }

    if images.is_empty() {
        return Err(ConvertError::NoValidImages {
            rejected: rejected.len(),
        });
    }

    let truncated = images.len().saturating_sub(MAX_BATCH_ITEMS);
    if truncated > 0 {
        warn!(
            "You can only convert up to {} images at a time; dropping the last {}",
            MAX_BATCH_ITEMS, truncated
        );
        images.truncate(MAX_BATCH_ITEMS);
    }

    Ok(Admission {
        accepted: images,
        truncated,
        rejected,
    })
}

// ── Loading ──────────────────────────────────────────────────────────────

/// Check if the input string looks like a URL.
pub fn is_url(input: &str) -> bool {
    input.starts_with("http://") || input.starts_with("https://")
}

/// Load a local file or HTTP(S) URL into a [`SourceImage`].
pub async fn load_source(input: &str, timeout_secs: u64) -> Result<SourceImage, ConvertError> {
    if is_url(input) {
        download_url(input, timeout_secs).await
    } else {
        load_local(input).await
    }
}

async fn load_local(path_str: &str) -> Result<SourceImage, ConvertError> {
    let path = PathBuf::from(path_str);

    let bytes = tokio::fs::read(&path).await.map_err(|e| match e.kind() {
        std::io::ErrorKind::PermissionDenied => ConvertError::PermissionDenied { path: path.clone() },
        _ => ConvertError::FileNotFound { path: path.clone() },
    })?;

    let name = file_name(&path);
    debug!("Loaded '{}' ({} bytes)", path.display(), bytes.len());
    Ok(SourceImage::from_bytes(name, bytes))
}

async fn download_url(url: &str, timeout_secs: u64) -> Result<SourceImage, ConvertError> {
    info!("Downloading image from: {}", url);

    let client = reqwest::Client::builder()
        .timeout(std::time::Duration::from_secs(timeout_secs))
        .build()
        .map_err(|e| ConvertError::DownloadFailed {
            url: url.to_string(),
            reason: e.to_string(),
        })?;

    let response = client.get(url).send().await.map_err(|e| {
        if e.is_timeout() {
            ConvertError::DownloadTimeout {
                url: url.to_string(),
                secs: timeout_secs,
            }
        } else {
            ConvertError::DownloadFailed {
                url: url.to_string(),
                reason: e.to_string(),
            }
        }
    })?;

    if !response.status().is_success() {
        return Err(ConvertError::DownloadFailed {
            url: url.to_string(),
            reason: format!("HTTP {}", response.status()),
        });
    }

    let declared = response
        .headers()
        .get(reqwest::header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.split(';').next().unwrap_or(v).trim().to_string());

    let bytes = response
        .bytes()
        .await
        .map_err(|e| ConvertError::DownloadFailed {
            url: url.to_string(),
            reason: e.to_string(),
        })?
        .to_vec();

    let name = extract_filename(url);
    info!("Downloaded '{}' ({} bytes)", name, bytes.len());

    // A server's `image/*` header wins; anything else is re-sniffed.
    match declared {
        Some(ct) if ct.starts_with("image/") => Ok(SourceImage::new(name, ct, bytes)),
        _ => Ok(SourceImage::from_bytes(name, bytes)),
    }
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

/// Extract a reasonable filename from the URL path.
fn extract_filename(url: &str) -> String {
    if let Ok(parsed) = reqwest::Url::parse(url) {
        if let Some(mut segments) = parsed.path_segments() {
            if let Some(last) = segments.next_back() {
                if !last.is_empty() {
                    return last.to_string();
                }
            }
        }
    }

    "downloaded".to_string()
}
