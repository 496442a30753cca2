//! Batch orchestration: the owning collection of conversion items.
//!
//! ## Item state machine
//!
//! ```text
//!            prepare_run            apply(outcome)
//!   Idle ───────────────▶ Converting ─────────────▶ Success | Error
//!   Error ──────────────▶ Converting                   │
//!   Success ─(forced)───▶ Converting ◀─────────────────┘ (next run)
//! ```
//!
//! A run has three phases so that enrichment can proceed while images are
//! converting without two writers touching the same item:
//!
//! 1. [`Batch::prepare_run`] validates the options, marks eligible items
//!    `Converting` and returns a [`RunPlan`] holding shared handles to their
//!    sources. Nothing else borrows the batch afterwards.
//! 2. [`RunPlan::execute`] (or [`crate::stream::convert_stream`]) converts
//!    the items concurrently and yields one [`ItemOutcome`] per item.
//! 3. [`Batch::apply`] writes each outcome to its own item.
//!
//! Enrichment follows the same shape with [`Batch::begin_enrichment`],
//! [`EnrichmentTicket::run`] and [`Batch::complete_enrichment`]. Conversion
//! writes only status and output; enrichment writes only metadata and the
//! two flags.
//!
//! Item ids are unique for the life of the process, so results that come
//! back after [`Batch::clear`] or [`Batch::replace`] find no item and are
//! dropped.
//!
//! Every run claims its items under a fresh [`RunId`]. The claim stays live
//! while the plan, its outcome stream or its [`RunOutcome`] exists. Items
//! left `Converting` by a plan or run future that was dropped are taken
//! back by the next [`Batch::prepare_run`], and outcomes carrying another
//! run's id are ignored.

use crate::config::{ConversionOptions, ConverterConfig, Quality};
use crate::enrich::{MetadataEnricher, MetadataRecord};
use crate::error::{ConvertError, EnrichmentError, ItemError};
use crate::format::SupportedFormat;
use crate::output::{
    BatchReport, BatchStats, ConvertedImage, DownloadArtifact, ItemReport, StatusKind,
};
use crate::pipeline::input::{admit, AdmissionNotice, SourceImage};
use futures::future::join_all;
use futures::StreamExt;
use serde::Serialize;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Instant;
use tracing::{debug, info, warn};

static NEXT_ITEM_ID: AtomicU64 = AtomicU64::new(1);
static NEXT_RUN_ID: AtomicU64 = AtomicU64::new(1);

/// Process-unique identity of a [`ConversionItem`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct ItemId(u64);

impl ItemId {
    fn next() -> Self {
        Self(NEXT_ITEM_ID.fetch_add(1, Ordering::Relaxed))
    }

    pub fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ItemId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Process-unique identity of one conversion run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RunId(u64);

impl RunId {
    fn next() -> Self {
        Self(NEXT_RUN_ID.fetch_add(1, Ordering::Relaxed))
    }
}

/// The run an item was dispatched to. `live` dies with the run.
#[derive(Debug, Clone)]
struct RunClaim {
    run: RunId,
    live: Weak<()>,
}

/// Conversion status of one item.
#[derive(Debug, Clone, PartialEq)]
pub enum ItemStatus {
    Idle,
    Converting,
    Success(ConvertedImage),
    Error(ItemError),
}

impl ItemStatus {
    pub fn kind(&self) -> StatusKind {
        match self {
            ItemStatus::Idle => StatusKind::Idle,
            ItemStatus::Converting => StatusKind::Converting,
            ItemStatus::Success(_) => StatusKind::Success,
            ItemStatus::Error(_) => StatusKind::Error,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, ItemStatus::Success(_))
    }
}

// ── ConversionItem ───────────────────────────────────────────────────────

/// One image in a batch. Mutated only through its owning [`Batch`].
#[derive(Debug, Clone)]
pub struct ConversionItem {
    id: ItemId,
    source: Arc<SourceImage>,
    status: ItemStatus,
    metadata: Option<MetadataRecord>,
    use_smart_name: bool,
    analyzing: bool,
    claim: Option<RunClaim>,
}

impl ConversionItem {
    fn new(source: SourceImage) -> Self {
        Self {
            id: ItemId::next(),
            source: Arc::new(source),
            status: ItemStatus::Idle,
            metadata: None,
            use_smart_name: false,
            analyzing: false,
            claim: None,
        }
    }

    pub fn id(&self) -> ItemId {
        self.id
    }

    pub fn source(&self) -> &SourceImage {
        &self.source
    }

    pub fn name(&self) -> &str {
        self.source.name()
    }

    pub fn status(&self) -> &ItemStatus {
        &self.status
    }

    pub fn output(&self) -> Option<&ConvertedImage> {
        match &self.status {
            ItemStatus::Success(out) => Some(out),
            _ => None,
        }
    }

    pub fn metadata(&self) -> Option<&MetadataRecord> {
        self.metadata.as_ref()
    }

    pub fn use_smart_name(&self) -> bool {
        self.use_smart_name
    }

    pub fn is_analyzing(&self) -> bool {
        self.analyzing
    }

    /// `Converting` and owned by a run that still exists.
    pub fn is_converting(&self) -> bool {
        matches!(self.status, ItemStatus::Converting)
            && self
                .claim
                .as_ref()
                .is_some_and(|c| c.live.strong_count() > 0)
    }

    /// Filename stem for downloads: the suggested name when it is switched on
    /// and present, otherwise the source name without its last extension.
    pub fn base_name(&self) -> &str {
        match (&self.metadata, self.use_smart_name) {
            (Some(meta), true) => meta.suggested_filename(),
            _ => strip_extension(self.source.name()),
        }
    }

    /// The converted file, or `None` unless the item succeeded.
    pub fn artifact(&self) -> Option<DownloadArtifact<'_>> {
        let out = self.output()?;
        Some(DownloadArtifact {
            filename: format!("{}.{}", self.base_name(), out.format.extension()),
            bytes: &out.bytes,
            mime_type: out.mime_type(),
        })
    }

    /// The converted file.
    ///
    /// The extension is that of the format the bytes were actually encoded
    /// in. A succeeded item skipped by a later run with another target keeps
    /// its old output, and its filename stays consistent with those bytes.
    ///
    /// # Panics
    /// If the item has not converted successfully. Check
    /// [`ItemStatus::is_success`] or use [`Self::artifact`].
    pub fn download(&self) -> DownloadArtifact<'_> {
        match self.artifact() {
            Some(artifact) => artifact,
            None => panic!(
                "download() called on item {} ('{}') with status {:?}",
                self.id,
                self.name(),
                self.status.kind()
            ),
        }
    }

    pub fn report(&self) -> ItemReport {
        let output = self.output();
        ItemReport {
            id: self.id.get(),
            name: self.name().to_string(),
            status: self.status.kind(),
            input_bytes: self.source.size(),
            output_bytes: output.map(ConvertedImage::size),
            format: output.map(|o| o.format),
            dimensions: output.map(|o| (o.width, o.height)),
            filename: self.artifact().map(|a| a.filename),
            error: match &self.status {
                ItemStatus::Error(e) => Some(e.to_string()),
                _ => None,
            },
            metadata: self.metadata.clone(),
            use_smart_name: self.use_smart_name,
        }
    }
}

/// `photo.final.png` → `photo.final`; `README` → `README`; `.hidden` → `.hidden`.
fn strip_extension(name: &str) -> &str {
    match name.rfind('.') {
        Some(0) | None => name,
        Some(idx) => &name[..idx],
    }
}

// ── Run phases ───────────────────────────────────────────────────────────

/// One item dispatched by a run.
#[derive(Debug, Clone)]
pub struct RunJob {
    pub index: usize,
    pub id: ItemId,
    pub source: Arc<SourceImage>,
}

/// Items marked `Converting` by [`Batch::prepare_run`], ready to execute.
#[derive(Debug)]
pub struct RunPlan {
    pub(crate) run: RunId,
    pub(crate) live: Arc<()>,
    pub(crate) jobs: Vec<RunJob>,
    pub(crate) format: SupportedFormat,
    pub(crate) quality: Quality,
    skipped: usize,
}

impl RunPlan {
    pub fn run_id(&self) -> RunId {
        self.run
    }

    pub fn format(&self) -> SupportedFormat {
        self.format
    }

    pub fn quality(&self) -> Quality {
        self.quality
    }

    pub fn jobs(&self) -> &[RunJob] {
        &self.jobs
    }

    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }

    /// Items left alone because they had already converted or were in flight.
    pub fn skipped(&self) -> usize {
        self.skipped
    }

    /// Convert every job concurrently and wait for all of them.
    pub async fn execute(self, config: &ConverterConfig) -> RunOutcome {
        let start = Instant::now();
        let total = self.jobs.len();
        let run = self.run;
        let live = Arc::clone(&self.live);
        let format = self.format;
        let skipped = self.skipped;

        info!(
            "Converting {} image(s) to {} (q={:.2}), {} skipped",
            total,
            format,
            self.quality.value(),
            skipped
        );
        if let Some(ref cb) = config.progress_callback {
            cb.on_batch_start(total);
        }

        let outcomes: Vec<ItemOutcome> = crate::stream::convert_stream(self, config).collect().await;

        let succeeded = outcomes.iter().filter(|o| o.result.is_ok()).count();
        if let Some(ref cb) = config.progress_callback {
            cb.on_batch_complete(total, succeeded);
        }

        let duration_ms = start.elapsed().as_millis() as u64;
        info!(
            "Run complete: {}/{} converted in {}ms",
            succeeded, total, duration_ms
        );

        RunOutcome {
            run,
            format,
            outcomes,
            skipped,
            duration_ms,
            live,
        }
    }
}

/// Result of converting one item.
#[derive(Debug, Clone)]
pub struct ItemOutcome {
    pub run: RunId,
    pub id: ItemId,
    pub index: usize,
    pub name: String,
    pub result: Result<ConvertedImage, ItemError>,
}

/// Every outcome of one executed [`RunPlan`].
///
/// Holds the run's claim on its items until it is applied or dropped.
#[derive(Debug, Clone)]
pub struct RunOutcome {
    pub run: RunId,
    pub format: SupportedFormat,
    pub outcomes: Vec<ItemOutcome>,
    pub skipped: usize,
    pub duration_ms: u64,
    live: Arc<()>,
}

// ── Enrichment phases ────────────────────────────────────────────────────

/// Permission to analyse one item, issued by [`Batch::begin_enrichment`].
#[derive(Debug, Clone)]
pub struct EnrichmentTicket {
    id: ItemId,
    source: Arc<SourceImage>,
}

impl EnrichmentTicket {
    pub fn id(&self) -> ItemId {
        self.id
    }

    /// Call the enricher on the item's source bytes.
    pub async fn run(self, enricher: &dyn MetadataEnricher) -> EnrichmentOutcome {
        debug!("Analyzing '{}'", self.source.name());
        let result = enricher
            .analyze(self.source.bytes(), self.source.content_type())
            .await;
        EnrichmentOutcome {
            id: self.id,
            result,
        }
    }
}

/// What came back from one enrichment call.
#[derive(Debug, Clone)]
pub struct EnrichmentOutcome {
    pub id: ItemId,
    pub result: Result<MetadataRecord, EnrichmentError>,
}

// ── Batch ────────────────────────────────────────────────────────────────

/// The active batch: at most [`crate::config::MAX_BATCH_ITEMS`] items.
#[derive(Debug, Default)]
pub struct Batch {
    items: Vec<ConversionItem>,
}

impl Batch {
    pub fn new() -> Self {
        Self::default()
    }

    /// Admit `sources` into a new batch.
    ///
    /// # Errors
    /// [`ConvertError::NoValidImages`] when none of the sources is an image.
    pub fn accept(sources: Vec<SourceImage>) -> Result<(Self, AdmissionNotice), ConvertError> {
        let mut batch = Self::new();
        let notice = batch.replace(sources)?;
        Ok((batch, notice))
    }

    /// Discard the current items and admit `sources` in their place.
    ///
    /// On error the current items are kept.
    pub fn replace(&mut self, sources: Vec<SourceImage>) -> Result<AdmissionNotice, ConvertError> {
        let (accepted, notice) = admit(sources)?.split();
        if !self.items.is_empty() {
            debug!("Replacing batch of {} item(s)", self.items.len());
        }
        self.items = accepted.into_iter().map(ConversionItem::new).collect();
        info!("Batch holds {} image(s)", self.items.len());
        Ok(notice)
    }

    /// Drop every item. Outcomes still in flight are ignored on arrival.
    pub fn clear(&mut self) {
        debug!("Clearing batch of {} item(s)", self.items.len());
        self.items.clear();
    }

    pub fn items(&self) -> &[ConversionItem] {
        &self.items
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn get(&self, id: ItemId) -> Option<&ConversionItem> {
        self.items.iter().find(|i| i.id == id)
    }

    fn get_mut(&mut self, id: ItemId) -> Option<&mut ConversionItem> {
        self.items.iter_mut().find(|i| i.id == id)
    }

    /// Whether any item is mid-conversion in a run that still exists.
    pub fn is_converting(&self) -> bool {
        self.items.iter().any(ConversionItem::is_converting)
    }

    /// Download artifacts for every successful item, in batch order.
    pub fn artifacts(&self) -> Vec<DownloadArtifact<'_>> {
        self.items.iter().filter_map(ConversionItem::artifact).collect()
    }

    /// Flip whether downloads use the suggested name. Returns the new value,
    /// or `None` for an unknown id.
    pub fn toggle_smart_name(&mut self, id: ItemId) -> Option<bool> {
        let item = self.get_mut(id)?;
        item.use_smart_name = !item.use_smart_name;
        Some(item.use_smart_name)
    }

    // ── Conversion ───────────────────────────────────────────────────────

    /// Validate `options` and mark the items this run will convert.
    ///
    /// Idle and failed items are dispatched. Succeeded items are dispatched
    /// only when `force` is set. Items converting in a live run are never
    /// dispatched twice; items whose run was dropped are dispatched again.
    ///
    /// # Errors
    /// [`ConvertError::InvalidQuality`], before any item changes state.
    pub fn prepare_run(
        &mut self,
        options: ConversionOptions,
        force: bool,
    ) -> Result<RunPlan, ConvertError> {
        let quality = options.validate()?;
        let run = RunId::next();
        let live = Arc::new(());

        let mut jobs = Vec::new();
        let mut skipped = 0;
        for (index, item) in self.items.iter_mut().enumerate() {
            let eligible = match item.status {
                ItemStatus::Idle | ItemStatus::Error(_) => true,
                ItemStatus::Success(_) => force,
                ItemStatus::Converting => {
                    let abandoned = !item.is_converting();
                    if abandoned {
                        debug!("Reclaiming {} from a dropped run", item.id);
                    }
                    abandoned
                }
            };
            if !eligible {
                skipped += 1;
                continue;
            }
            item.status = ItemStatus::Converting;
            item.claim = Some(RunClaim {
                run,
                live: Arc::downgrade(&live),
            });
            jobs.push(RunJob {
                index,
                id: item.id,
                source: Arc::clone(&item.source),
            });
        }

        Ok(RunPlan {
            run,
            live,
            jobs,
            format: options.format,
            quality,
            skipped,
        })
    }

    /// Write one outcome to its item. Returns `false` when the item is gone
    /// or no longer converting under the outcome's run.
    pub fn apply_outcome(&mut self, outcome: ItemOutcome) -> bool {
        let Some(item) = self.get_mut(outcome.id) else {
            debug!("Dropping stale outcome for {}", outcome.id);
            return false;
        };
        let claimed_by_run = item.claim.as_ref().map(|c| c.run) == Some(outcome.run);
        if !matches!(item.status, ItemStatus::Converting) || !claimed_by_run {
            debug!("Ignoring outcome for {}: not converting in that run", outcome.id);
            return false;
        }
        item.claim = None;

        item.status = match outcome.result {
            Ok(out) => ItemStatus::Success(out),
            Err(e) => {
                warn!("'{}' failed: {}", item.name(), e);
                ItemStatus::Error(e)
            }
        };
        true
    }

    /// Apply a finished run and summarise it.
    pub fn apply(&mut self, run: RunOutcome) -> BatchReport {
        let mut stats = BatchStats {
            skipped: run.skipped,
            duration_ms: run.duration_ms,
            ..BatchStats::default()
        };

        for outcome in run.outcomes {
            let ok = outcome.result.is_ok();
            if !self.apply_outcome(outcome) {
                stats.stale += 1;
            } else if ok {
                stats.converted += 1;
            } else {
                stats.failed += 1;
            }
        }

        stats.total_items = self.items.len();
        stats.input_bytes = self.items.iter().map(|i| i.source.size() as u64).sum();
        stats.output_bytes = self
            .items
            .iter()
            .filter_map(ConversionItem::output)
            .map(|o| o.size() as u64)
            .sum();

        BatchReport {
            format: run.format,
            items: self.items.iter().map(ConversionItem::report).collect(),
            stats,
        }
    }

    /// Convert every idle or failed item and wait for all of them.
    ///
    /// # Errors
    /// Only [`ConvertError::InvalidQuality`]. Per-image failures are in the
    /// report and the items' statuses.
    pub async fn run(
        &mut self,
        options: ConversionOptions,
        config: &ConverterConfig,
    ) -> Result<BatchReport, ConvertError> {
        let plan = self.prepare_run(options, false)?;
        let outcome = plan.execute(config).await;
        Ok(self.apply(outcome))
    }

    /// Like [`Self::run`], but also re-converts succeeded items.
    pub async fn reconvert(
        &mut self,
        options: ConversionOptions,
        config: &ConverterConfig,
    ) -> Result<BatchReport, ConvertError> {
        let plan = self.prepare_run(options, true)?;
        let outcome = plan.execute(config).await;
        Ok(self.apply(outcome))
    }

    // ── Enrichment ───────────────────────────────────────────────────────

    /// Mark `id` as analyzing and hand out a ticket for the call.
    ///
    /// `None` if the item is unknown, already analyzing, or already has
    /// metadata.
    pub fn begin_enrichment(&mut self, id: ItemId) -> Option<EnrichmentTicket> {
        let item = self.get_mut(id)?;
        if item.analyzing || item.metadata.is_some() {
            debug!("Enrichment for {} already done or in flight", id);
            return None;
        }
        item.analyzing = true;
        Some(EnrichmentTicket {
            id,
            source: Arc::clone(&item.source),
        })
    }

    /// Apply an enrichment result.
    ///
    /// On success the record is attached and the suggested name switched on.
    /// On failure only the analyzing flag is cleared and the error is handed
    /// back for display. Returns `Ok(false)` for results whose item is gone.
    pub fn complete_enrichment(
        &mut self,
        outcome: EnrichmentOutcome,
    ) -> Result<bool, EnrichmentError> {
        let Some(item) = self.get_mut(outcome.id) else {
            debug!("Dropping stale enrichment result for {}", outcome.id);
            return Ok(false);
        };
        if !item.analyzing {
            debug!("Ignoring enrichment result for {}: not analyzing", outcome.id);
            return Ok(false);
        }
        item.analyzing = false;

        match outcome.result {
            Ok(record) => {
                info!(
                    "'{}' → suggested name '{}'",
                    item.name(),
                    record.suggested_filename()
                );
                item.metadata = Some(record);
                item.use_smart_name = true;
                Ok(true)
            }
            Err(e) => {
                warn!("Enrichment failed for '{}': {}", item.name(), e);
                Err(e)
            }
        }
    }

    /// Analyze one item end to end. `None` if no call was made.
    pub async fn enrich(
        &mut self,
        id: ItemId,
        enricher: &dyn MetadataEnricher,
    ) -> Option<Result<bool, EnrichmentError>> {
        let ticket = self.begin_enrichment(id)?;
        let outcome = ticket.run(enricher).await;
        Some(self.complete_enrichment(outcome))
    }

    /// Analyze every eligible item concurrently.
    ///
    /// Failures are returned per item; they never change conversion state.
    pub async fn enrich_all(
        &mut self,
        enricher: &dyn MetadataEnricher,
    ) -> Vec<(ItemId, EnrichmentError)> {
        let ids: Vec<ItemId> = self.items.iter().map(|i| i.id).collect();
        let tickets: Vec<EnrichmentTicket> = ids
            .into_iter()
            .filter_map(|id| self.begin_enrichment(id))
            .collect();

        let outcomes = join_all(tickets.into_iter().map(|t| t.run(enricher))).await;

        outcomes
            .into_iter()
            .filter_map(|outcome| {
                let id = outcome.id;
                self.complete_enrichment(outcome).err().map(|e| (id, e))
            })
            .collect()
    }
}
