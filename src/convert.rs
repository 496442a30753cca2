//! Eager entry points: load inputs, run a batch, write the results.
//!
//! These wrap the [`Batch`] phases for callers that want one call per step.
//! Use the batch directly when enrichment should overlap a run, and
//! [`crate::stream::convert_stream`] for outcomes as they complete.

use crate::batch::Batch;
use crate::config::{ConversionOptions, ConverterConfig};
use crate::error::ConvertError;
use crate::output::BatchReport;
use crate::pipeline::input::{load_source, AdmissionNotice};
use futures::future::try_join_all;
use std::collections::HashSet;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Load local paths and HTTP(S) URLs and admit them into a new batch.
///
/// # Errors
/// The first input that cannot be read or downloaded, or
/// [`ConvertError::NoValidImages`] when nothing loaded is an image.
pub async fn load_batch(
    inputs: &[impl AsRef<str>],
    download_timeout_secs: u64,
) -> Result<(Batch, AdmissionNotice), ConvertError> {
    let sources = try_join_all(
        inputs
            .iter()
            .map(|input| load_source(input.as_ref(), download_timeout_secs)),
    )
    .await?;
    debug!("Loaded {} input(s)", sources.len());
    Batch::accept(sources)
}

/// Load `inputs` and convert them all with `options`.
///
/// # Returns
/// The batch (for downloads), what admission dropped (inputs past the
/// fifth, non-images) and the run report. Items that failed are in the
/// report; they do not make this call fail.
pub async fn convert_files(
    inputs: &[impl AsRef<str>],
    options: ConversionOptions,
    config: &ConverterConfig,
    download_timeout_secs: u64,
) -> Result<(Batch, AdmissionNotice, BatchReport), ConvertError> {
    // Checked before any input is read.
    options.validate()?;
    let (mut batch, notice) = load_batch(inputs, download_timeout_secs).await?;
    let report = batch.run(options, config).await?;
    Ok((batch, notice, report))
}

/// Synchronous wrapper around [`convert_files`].
///
/// Creates a temporary tokio runtime internally.
pub fn convert_sync(
    inputs: &[impl AsRef<str>],
    options: ConversionOptions,
    config: &ConverterConfig,
    download_timeout_secs: u64,
) -> Result<(Batch, AdmissionNotice, BatchReport), ConvertError> {
    tokio::runtime::Runtime::new()
        .map_err(|e| ConvertError::Internal(format!("Failed to create tokio runtime: {}", e)))?
        .block_on(convert_files(inputs, options, config, download_timeout_secs))
}

/// Write every successful item of `batch` into `dir`.
///
/// Each file is written to a temporary file in `dir` and renamed into place,
/// so a crash never leaves a partial image behind. Two items that would get
/// the same name are told apart with `-1`, `-2`, … before the extension.
///
/// # Returns
/// The written paths, in batch order.
pub fn write_artifacts(batch: &Batch, dir: impl AsRef<Path>) -> Result<Vec<PathBuf>, ConvertError> {
    let dir = dir.as_ref();
    std::fs::create_dir_all(dir).map_err(|e| ConvertError::OutputWriteFailed {
        path: dir.to_path_buf(),
        source: e,
    })?;

    let mut used = HashSet::new();
    let mut written = Vec::new();

    for artifact in batch.artifacts() {
        let filename = unique_name(&artifact.filename, &mut used);
        let path = dir.join(&filename);
        let write_err = |source: std::io::Error| ConvertError::OutputWriteFailed {
            path: path.clone(),
            source,
        };

        let mut tmp = tempfile::NamedTempFile::new_in(dir).map_err(write_err)?;
        tmp.write_all(artifact.bytes).map_err(write_err)?;
        tmp.flush().map_err(write_err)?;
        tmp.persist(&path).map_err(|e| write_err(e.error))?;

        info!("Wrote {} ({} bytes)", path.display(), artifact.bytes.len());
        written.push(path);
    }

    Ok(written)
}

/// `name`, or `stem-N.ext` for the smallest N that is still free.
fn unique_name(name: &str, used: &mut HashSet<String>) -> String {
    if used.insert(name.to_ascii_lowercase()) {
        return name.to_string();
    }

    let (stem, ext) = match name.rsplit_once('.') {
        Some((stem, ext)) if !stem.is_empty() => (stem, Some(ext)),
        _ => (name, None),
    };

    let mut n = 1;
    loop {
        let candidate = match ext {
            Some(ext) => format!("{stem}-{n}.{ext}"),
            None => format!("{stem}-{n}"),
        };
        if used.insert(candidate.to_ascii_lowercase()) {
            return candidate;
        }
        n += 1;
    }
}
