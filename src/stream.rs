//! Streaming run API: emit item outcomes as they complete.
//!
//! [`crate::batch::RunPlan::execute`] waits for every item; this module
//! yields each [`ItemOutcome`] as soon as its image is done, so callers can
//! apply results or update a display progressively. Outcomes arrive in
//! completion order, not batch order.
//!
//! Per-item progress events (`on_item_start`, `on_item_complete`,
//! `on_item_error`) fire from here. The batch-level start and completion
//! events are fired by `execute`; callers driving the stream themselves
//! fire them as they see fit.
//!
//! # Example
//! ```rust,no_run
//! use fchanger::{Batch, ConversionOptions, ConverterConfig, SourceImage, SupportedFormat};
//! use futures::StreamExt;
//!
//! # #[tokio::main]
//! # async fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let bytes = std::fs::read("photo.png")?;
//! let (mut batch, _) = Batch::accept(vec![SourceImage::from_bytes("photo.png", bytes)])?;
//! let plan = batch.prepare_run(ConversionOptions::new(SupportedFormat::Webp, 1.0), false)?;
//!
//! let mut outcomes = fchanger::convert_stream(plan, &ConverterConfig::default());
//! while let Some(outcome) = outcomes.next().await {
//!     println!("{}: {}", outcome.name, if outcome.result.is_ok() { "ok" } else { "failed" });
//!     batch.apply_outcome(outcome);
//! }
//! # Ok(())
//! # }
//! ```

use crate::batch::{ItemOutcome, RunId, RunJob, RunPlan};
use crate::config::{ConverterConfig, Quality};
use crate::error::ItemError;
use crate::format::SupportedFormat;
use crate::pipeline;
use futures::stream::{self, StreamExt};
use std::pin::Pin;
use std::sync::Arc;
use tokio_stream::Stream;
use tracing::{debug, warn};

/// A boxed stream of item outcomes.
pub type OutcomeStream = Pin<Box<dyn Stream<Item = ItemOutcome> + Send>>;

/// Convert every job in `plan`, at most `config.concurrency` at a time,
/// yielding outcomes as they complete.
pub fn convert_stream(plan: RunPlan, config: &ConverterConfig) -> OutcomeStream {
    let RunPlan {
        run,
        live,
        jobs,
        format,
        quality,
        ..
    } = plan;
    let concurrency = config.concurrency.max(1);
    let config = config.clone();

    let s = stream::iter(jobs.into_iter().map(move |job| {
        let cfg = config.clone();
        async move { convert_job(run, job, format, quality, cfg).await }
    }))
    .buffer_unordered(concurrency)
    // The items stay claimed for as long as the stream exists.
    .map(move |outcome| {
        let _claim = &live;
        outcome
    });

    Box::pin(s)
}

/// Run one job's decode → composite → encode on the blocking pool.
async fn convert_job(
    run: RunId,
    job: RunJob,
    format: SupportedFormat,
    quality: Quality,
    config: ConverterConfig,
) -> ItemOutcome {
    let RunJob { index, id, source } = job;
    let name = source.name().to_string();

    if let Some(ref cb) = config.progress_callback {
        cb.on_item_start(index, &name);
    }
    debug!("Item {} '{}': start", index, name);

    let task_source = Arc::clone(&source);
    let task_config = config.clone();
    let result = tokio::task::spawn_blocking(move || {
        pipeline::convert_image(&task_source, format, quality, &task_config)
    })
    .await
    .unwrap_or_else(|e| {
        Err(ItemError::TaskFailed {
            detail: e.to_string(),
        })
    });

    match &result {
        Ok(out) => {
            if let Some(ref cb) = config.progress_callback {
                cb.on_item_complete(index, &name, out.size());
            }
        }
        Err(e) => {
            warn!("Item {} '{}': {}", index, name, e);
            if let Some(ref cb) = config.progress_callback {
                cb.on_item_error(index, &name, e.to_string());
            }
        }
    }

    ItemOutcome {
        run,
        id,
        index,
        name,
        result,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::batch::Batch;
    use crate::config::ConversionOptions;
    use crate::pipeline::SourceImage;
    use image::{Rgba, RgbaImage};
    use std::io::Cursor;

    fn png(w: u32, h: u32) -> Vec<u8> {
        let img = RgbaImage::from_pixel(w, h, Rgba([1, 2, 3, 255]));
        let mut buf = Vec::new();
        img.write_to(&mut Cursor::new(&mut buf), image::ImageFormat::Png)
            .unwrap();
        buf
    }

    #[tokio::test]
    async fn stream_yields_one_outcome_per_job() {
        let sources = vec![
            SourceImage::new("a.png", "image/png", png(3, 3)),
            SourceImage::new("b.png", "image/png", b"junk".to_vec()),
        ];
        let (mut batch, _) = Batch::accept(sources).unwrap();
        let plan = batch
            .prepare_run(ConversionOptions::new(SupportedFormat::Bmp, 1.0), false)
            .unwrap();

        let config = ConverterConfig::builder().concurrency(1).build().unwrap();
        let mut outcomes: Vec<ItemOutcome> = convert_stream(plan, &config).collect().await;
        outcomes.sort_by_key(|o| o.index);

        assert_eq!(outcomes.len(), 2);
        assert!(outcomes[0].result.is_ok());
        assert!(matches!(outcomes[1].result, Err(ItemError::Decode { .. })));
    }

    #[tokio::test]
    async fn empty_plan_yields_nothing() {
        let mut batch = Batch::new();
        let plan = batch.prepare_run(ConversionOptions::default(), false).unwrap();
        let outcomes: Vec<ItemOutcome> = convert_stream(plan, &ConverterConfig::default())
            .collect()
            .await;
        assert!(outcomes.is_empty());
    }
}
