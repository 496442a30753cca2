//! Batch orchestration: independent failure, re-runs, enrichment, downloads.
//!
//! Enrichment is exercised with a scripted [`MetadataEnricher`]; no network.

use fchanger::{
    write_artifacts, Batch, BatchProgressCallback, ConversionOptions, ConverterConfig,
    ConvertError, EnrichmentError, ItemError, ItemStatus, MetadataEnricher, MetadataRecord,
    SourceImage, StatusKind, SupportedFormat, MAX_BATCH_ITEMS,
};
use futures::future::BoxFuture;
use futures::FutureExt;
use image::{ImageFormat, Rgba, RgbaImage};
use std::io::Cursor;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

// ── Helpers ──────────────────────────────────────────────────────────────────

fn png_bytes(w: u32, h: u32, px: Rgba<u8>) -> Vec<u8> {
    let mut buf = Vec::new();
    RgbaImage::from_pixel(w, h, px)
        .write_to(&mut Cursor::new(&mut buf), ImageFormat::Png)
        .unwrap();
    buf
}

fn valid(name: &str) -> SourceImage {
    SourceImage::new(name, "image/png", png_bytes(4, 4, Rgba([200, 100, 50, 255])))
}

/// Declared as an image, but the bytes are garbage.
fn corrupt(name: &str) -> SourceImage {
    SourceImage::new(name, "image/png", b"\x89PNG but not really".to_vec())
}

fn options(format: SupportedFormat) -> ConversionOptions {
    ConversionOptions::new(format, 0.9)
}

/// Scripted enricher: answers from a closure, optionally after a delay.
struct ScriptedEnricher {
    calls: AtomicUsize,
    delay: Duration,
    answer: Box<dyn Fn(&[u8]) -> Result<MetadataRecord, EnrichmentError> + Send + Sync>,
}

impl ScriptedEnricher {
    fn ok(name: &'static str) -> Self {
        Self {
            calls: AtomicUsize::new(0),
            delay: Duration::ZERO,
            answer: Box::new(move |_: &[u8]| {
                MetadataRecord::new(name, "Alt text", "A description.")
            }),
        }
    }

    fn failing() -> Self {
        Self {
            calls: AtomicUsize::new(0),
            delay: Duration::ZERO,
            answer: Box::new(|_: &[u8]| Err(EnrichmentError::Transport("quota exceeded".into()))),
        }
    }

    fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }
}

impl MetadataEnricher for ScriptedEnricher {
    fn analyze<'a>(
        &'a self,
        image: &'a [u8],
        _content_type: &'a str,
    ) -> BoxFuture<'a, Result<MetadataRecord, EnrichmentError>> {
        Box::pin(async move {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            (self.answer)(image)
        })
    }
}

#[derive(Default)]
struct RecordingCallback {
    events: Mutex<Vec<String>>,
}

impl BatchProgressCallback for RecordingCallback {
    fn on_batch_start(&self, total_items: usize) {
        self.events.lock().unwrap().push(format!("start {total_items}"));
    }
    fn on_item_complete(&self, index: usize, _name: &str, _output_bytes: usize) {
        self.events.lock().unwrap().push(format!("ok {index}"));
    }
    fn on_item_error(&self, index: usize, _name: &str, _error: String) {
        self.events.lock().unwrap().push(format!("err {index}"));
    }
    fn on_batch_complete(&self, total_items: usize, success_count: usize) {
        self.events
            .lock()
            .unwrap()
            .push(format!("done {success_count}/{total_items}"));
    }
}

// ── Admission ────────────────────────────────────────────────────────────────

#[test]
fn seven_inputs_are_clamped_to_five() {
    let sources: Vec<_> = (0..7).map(|i| valid(&format!("img{i}.png"))).collect();
    let (batch, notice) = Batch::accept(sources).unwrap();

    assert_eq!(batch.len(), MAX_BATCH_ITEMS);
    assert_eq!(notice.truncated, 2);
    assert!(notice.has_warnings());
    let names: Vec<_> = batch.items().iter().map(|i| i.name()).collect();
    assert_eq!(names, ["img0.png", "img1.png", "img2.png", "img3.png", "img4.png"]);
}

#[test]
fn non_images_are_filtered_before_the_decoder() {
    let sources = vec![
        SourceImage::from_bytes("notes.txt", b"hello".to_vec()),
        valid("a.png"),
    ];
    let (batch, notice) = Batch::accept(sources).unwrap();
    assert_eq!(batch.len(), 1);
    assert_eq!(notice.rejected, ["notes.txt"]);
}

#[test]
fn replace_keeps_batch_when_nothing_is_admissible() {
    let (mut batch, _) = Batch::accept(vec![valid("a.png")]).unwrap();
    let err = batch
        .replace(vec![SourceImage::from_bytes("x.txt", b"x".to_vec())])
        .unwrap_err();
    assert!(matches!(err, ConvertError::NoValidImages { rejected: 1 }));
    assert_eq!(batch.len(), 1);
}

// ── Runs ─────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn one_corrupt_item_does_not_affect_the_others() {
    let (mut batch, _) =
        Batch::accept(vec![valid("a.png"), corrupt("b.png"), valid("c.png")]).unwrap();

    let callback = Arc::new(RecordingCallback::default());
    let config = ConverterConfig::builder()
        .progress_callback(callback.clone() as Arc<dyn BatchProgressCallback>)
        .build()
        .unwrap();

    let report = batch
        .run(options(SupportedFormat::Jpeg), &config)
        .await
        .unwrap();

    let statuses: Vec<_> = batch.items().iter().map(|i| i.status().kind()).collect();
    assert_eq!(
        statuses,
        [StatusKind::Success, StatusKind::Error, StatusKind::Success]
    );
    assert!(matches!(
        batch.items()[1].status(),
        ItemStatus::Error(ItemError::Decode { .. })
    ));

    assert_eq!(report.stats.converted, 2);
    assert_eq!(report.stats.failed, 1);
    assert!(report.has_failures());
    assert!(!batch.is_converting());

    let events = callback.events.lock().unwrap();
    assert_eq!(events.first().map(String::as_str), Some("start 3"));
    assert_eq!(events.last().map(String::as_str), Some("done 2/3"));
    assert!(events.contains(&"err 1".to_string()));
}

#[tokio::test]
async fn invalid_quality_leaves_every_item_idle() {
    let (mut batch, _) = Batch::accept(vec![valid("a.png"), valid("b.png")]).unwrap();

    for q in [1.5, -0.1] {
        let err = batch
            .run(
                ConversionOptions::new(SupportedFormat::Jpeg, q),
                &ConverterConfig::default(),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, ConvertError::InvalidQuality { .. }));
        assert!(batch
            .items()
            .iter()
            .all(|i| *i.status() == ItemStatus::Idle));
    }
}

#[tokio::test]
async fn rerun_with_new_format_keeps_successes_unless_forced() {
    let (mut batch, _) = Batch::accept(vec![valid("a.png"), corrupt("b.png")]).unwrap();
    let config = ConverterConfig::default();

    batch.run(options(SupportedFormat::Png), &config).await.unwrap();
    assert_eq!(batch.items()[0].output().unwrap().format, SupportedFormat::Png);

    // Switching format re-targets only the failed item.
    let report = batch.run(options(SupportedFormat::Webp), &config).await.unwrap();
    assert_eq!(report.stats.skipped, 1);
    assert_eq!(report.stats.failed, 1);
    assert_eq!(batch.items()[0].output().unwrap().format, SupportedFormat::Png);
    assert_eq!(batch.items()[0].download().filename, "a.png");

    // An explicit re-conversion re-encodes it.
    let report = batch
        .reconvert(options(SupportedFormat::Webp), &config)
        .await
        .unwrap();
    assert_eq!(report.stats.skipped, 0);
    assert_eq!(batch.items()[0].output().unwrap().format, SupportedFormat::Webp);
    assert_eq!(batch.items()[0].download().filename, "a.webp");
}

#[tokio::test]
async fn outcomes_for_a_cleared_batch_are_ignored() {
    let (mut batch, _) = Batch::accept(vec![valid("a.png")]).unwrap();
    let plan = batch
        .prepare_run(options(SupportedFormat::Bmp), false)
        .unwrap();

    batch.clear();
    batch.replace(vec![valid("b.png")]).unwrap();

    let outcome = plan.execute(&ConverterConfig::default()).await;
    let report = batch.apply(outcome);

    assert_eq!(report.stats.stale, 1);
    assert_eq!(report.stats.converted, 0);
    assert_eq!(*batch.items()[0].status(), ItemStatus::Idle);
}

#[tokio::test]
async fn dropped_run_does_not_strand_items() {
    let (mut batch, _) = Batch::accept(vec![valid("a.png"), valid("b.png")]).unwrap();
    let config = ConverterConfig::default();

    // Polled once and dropped while the blocking tasks are in flight.
    let _ = batch
        .run(options(SupportedFormat::Png), &config)
        .now_or_never();
    assert!(!batch.is_converting());

    let report = batch
        .reconvert(options(SupportedFormat::Bmp), &config)
        .await
        .unwrap();
    assert_eq!(report.stats.converted, 2);
    assert_eq!(report.stats.skipped, 0);
    assert!(batch.items().iter().all(|i| i.status().is_success()));
    assert_eq!(batch.items()[0].download().filename, "a.bmp");
}

#[tokio::test]
async fn dropped_plan_is_reclaimed_by_the_next_run() {
    let (mut batch, _) = Batch::accept(vec![valid("a.png")]).unwrap();
    let plan = batch
        .prepare_run(options(SupportedFormat::Gif), false)
        .unwrap();
    drop(plan);

    let report = batch
        .run(options(SupportedFormat::Gif), &ConverterConfig::default())
        .await
        .unwrap();
    assert_eq!(report.stats.converted, 1);
    assert_eq!(report.stats.skipped, 0);
    assert!(!batch.is_converting());
}

// ── Enrichment ───────────────────────────────────────────────────────────────

#[tokio::test]
async fn failing_enrichment_changes_nothing_but_the_flag() {
    let (mut batch, _) = Batch::accept(vec![valid("a.png")]).unwrap();
    let config = ConverterConfig::default();
    batch.run(options(SupportedFormat::Jpeg), &config).await.unwrap();
    let before = batch.items()[0].status().clone();

    let id = batch.items()[0].id();
    let result = batch.enrich(id, &ScriptedEnricher::failing()).await;
    assert!(matches!(result, Some(Err(EnrichmentError::Transport(_)))));

    let item = &batch.items()[0];
    assert_eq!(*item.status(), before);
    assert!(!item.is_analyzing());
    assert!(!item.use_smart_name());
    assert!(item.metadata().is_none());
    assert_eq!(item.download().filename, "a.jpg");
}

#[tokio::test]
async fn smart_name_is_used_for_download() {
    let (mut batch, _) = Batch::accept(vec![valid("IMG_0042.png")]).unwrap();
    let config = ConverterConfig::default();

    let enricher = ScriptedEnricher::ok("sunset-ocean");
    let failures = batch.enrich_all(&enricher).await;
    assert!(failures.is_empty());
    batch.run(options(SupportedFormat::Webp), &config).await.unwrap();

    let item = &batch.items()[0];
    assert!(item.use_smart_name());
    let artifact = item.download();
    assert_eq!(artifact.filename, "sunset-ocean.webp");
    assert_eq!(artifact.mime_type, "image/webp");

    // Toggling back restores the original stem.
    let id = item.id();
    assert_eq!(batch.toggle_smart_name(id), Some(false));
    assert_eq!(batch.items()[0].download().filename, "IMG_0042.webp");
}

#[tokio::test]
async fn enrichment_is_not_repeated_once_metadata_exists() {
    let (mut batch, _) = Batch::accept(vec![valid("a.png"), valid("b.png")]).unwrap();
    let enricher = ScriptedEnricher::ok("thing");

    batch.enrich_all(&enricher).await;
    batch.enrich_all(&enricher).await;
    assert_eq!(enricher.calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn enrichment_overlaps_a_run_without_conflict() {
    let (mut batch, _) =
        Batch::accept(vec![valid("a.png"), corrupt("b.png"), valid("c.png")]).unwrap();
    let config = ConverterConfig::default();
    let enricher = ScriptedEnricher::ok("overlap").with_delay(Duration::from_millis(20));

    let plan = batch
        .prepare_run(options(SupportedFormat::Gif), false)
        .unwrap();
    let (outcome, failures) = tokio::join!(plan.execute(&config), batch.enrich_all(&enricher));
    let report = batch.apply(outcome);

    assert!(failures.is_empty());
    assert_eq!(report.stats.converted, 2);
    assert_eq!(report.stats.failed, 1);
    for item in batch.items() {
        assert!(item.metadata().is_some());
        assert!(!item.is_analyzing());
    }
    // Enrichment never rescues a failed conversion.
    assert!(batch.items()[1].artifact().is_none());
    assert_eq!(batch.items()[0].download().filename, "overlap.gif");
}

#[tokio::test]
async fn enrichment_result_after_clear_is_dropped() {
    let (mut batch, _) = Batch::accept(vec![valid("a.png")]).unwrap();
    let id = batch.items()[0].id();
    let ticket = batch.begin_enrichment(id).unwrap();

    batch.replace(vec![valid("b.png")]).unwrap();

    let enricher = ScriptedEnricher::ok("late");
    let outcome = ticket.run(&enricher).await;
    assert_eq!(batch.complete_enrichment(outcome), Ok(false));
    assert!(batch.items()[0].metadata().is_none());
}

// ── Output ───────────────────────────────────────────────────────────────────

#[tokio::test]
async fn write_artifacts_writes_successes_with_unique_names() {
    let (mut batch, _) = Batch::accept(vec![
        valid("photo.png"),
        valid("photo.bmp"),
        corrupt("broken.png"),
    ])
    .unwrap();
    batch
        .run(options(SupportedFormat::Jpeg), &ConverterConfig::default())
        .await
        .unwrap();

    let dir = tempfile::tempdir().unwrap();
    let written = write_artifacts(&batch, dir.path()).unwrap();

    let names: Vec<_> = written
        .iter()
        .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
        .collect();
    assert_eq!(names, ["photo.jpg", "photo-1.jpg"]);

    for path in &written {
        let bytes = std::fs::read(path).unwrap();
        assert_eq!(image::guess_format(&bytes).unwrap(), ImageFormat::Jpeg);
    }
    // No temp files left behind.
    assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 2);
}

#[tokio::test]
async fn report_serialises_to_json() {
    let (mut batch, _) = Batch::accept(vec![valid("a.png"), corrupt("b.png")]).unwrap();
    let report = batch
        .run(options(SupportedFormat::Webp), &ConverterConfig::default())
        .await
        .unwrap();

    let json: serde_json::Value = serde_json::to_value(&report).unwrap();
    assert_eq!(json["format"], "webp");
    assert_eq!(json["items"][0]["status"], "success");
    assert_eq!(json["items"][0]["filename"], "a.webp");
    assert_eq!(json["items"][1]["status"], "error");
    assert!(json["items"][1]["error"]
        .as_str()
        .unwrap()
        .starts_with("decode failed"));
    assert_eq!(json["stats"]["converted"], 1);
}
