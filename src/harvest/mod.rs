//! Incremental harvest orchestration
//!
//! A run walks a fixed sequence of stages:
//!
//! `Init → DiscoverListings → DiffAgainstCheckpoint → ProcessBatch(*) → Done`
//!
//! The checkpoint only ever grows with identifiers whose rows are already
//! remote: after a batch has been published, or after seeding from the
//! remote table on a first run. The single window where local and remote
//! state can disagree is a crash between a publish and the checkpoint save
//! that follows it. A publish
//! failure ends the run; earlier batches stay published and checkpointed.

mod progress;
mod report;

pub use progress::HarvestProgress;
pub use report::HarvestReport;

use std::collections::BTreeSet;
use std::fmt;
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::{debug, error, info, warn};
use url::Url;

use crate::celex::CelexNumber;
use crate::checkpoint::{CheckpointSet, CheckpointStore};
use crate::config::HarvestConfig;
use crate::dataset::{DatasetError, DatasetSink, RemoteTable};
use crate::scraping::{ContentResolver, ListingScanner, PageFetcher, Throttle};
use crate::types::Record;

/// Errors that end a harvest run
#[derive(Debug, Error)]
pub enum HarvestError {
    #[error("Invalid listing URL '{url}': {source}")]
    InvalidListingUrl {
        url: String,
        #[source]
        source: url::ParseError,
    },
    #[error("Batch size must be positive")]
    ZeroBatchSize,
    #[error("Publishing batch {batch} failed: {source}")]
    Publish {
        batch: usize,
        #[source]
        source: DatasetError,
        /// What the run achieved before the failing batch
        report: Box<HarvestReport>,
    },
}

/// Where a run currently is
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HarvestStage {
    Init,
    DiscoverListings,
    DiffAgainstCheckpoint,
    ProcessBatch { index: usize, total: usize },
    Done,
}

impl fmt::Display for HarvestStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Init => write!(f, "init"),
            Self::DiscoverListings => write!(f, "discover-listings"),
            Self::DiffAgainstCheckpoint => write!(f, "diff-against-checkpoint"),
            Self::ProcessBatch { index, total } => write!(f, "process-batch {}/{}", index, total),
            Self::Done => write!(f, "done"),
        }
    }
}

/// Run parameters, parsed and checked
#[derive(Debug, Clone)]
pub struct HarvestOptions {
    /// Scanned on first runs only
    pub static_listing_urls: Vec<Url>,
    /// Scanned on every run
    pub dynamic_listing_urls: Vec<Url>,
    pub batch_size: usize,
    pub max_per_run: Option<usize>,
    pub request_delay: Duration,
    pub source_label: String,
    pub sectors: Vec<char>,
    pub seed_from_remote: bool,
}

impl HarvestOptions {
    pub fn from_config(config: &HarvestConfig) -> Result<Self, HarvestError> {
        let parse = |urls: &[String]| -> Result<Vec<Url>, HarvestError> {
            urls.iter()
                .map(|raw| {
                    Url::parse(raw).map_err(|source| HarvestError::InvalidListingUrl {
                        url: raw.clone(),
                        source,
                    })
                })
                .collect()
        };

        if config.batch_size == 0 {
            return Err(HarvestError::ZeroBatchSize);
        }

        Ok(Self {
            static_listing_urls: parse(&config.static_listing_urls)?,
            dynamic_listing_urls: parse(&config.dynamic_listing_urls)?,
            batch_size: config.batch_size,
            max_per_run: config.max_per_run,
            request_delay: Duration::from_millis(config.request_delay_ms),
            source_label: config.source_label.clone(),
            sectors: config.sector_chars(),
            seed_from_remote: config.seed_from_remote,
        })
    }

    /// Listing pages for a run; static pages are only included on a first run
    pub fn listing_urls(&self, first_run: bool) -> Vec<&Url> {
        let statics = self.static_listing_urls.iter().filter(|_| first_run);
        statics.chain(self.dynamic_listing_urls.iter()).collect()
    }
}

/// Scan listing pages in order and union their identifiers
pub async fn discover<F>(
    fetcher: &F,
    scanner: &ListingScanner,
    urls: &[&Url],
    throttle: &mut Throttle,
) -> BTreeSet<CelexNumber>
where
    F: PageFetcher + ?Sized,
{
    let mut found = BTreeSet::new();
    for url in urls {
        throttle.wait().await;
        found.extend(scanner.scan(fetcher, url).await);
    }
    info!("Discovered {} unique CELEX numbers across {} listing pages", found.len(), urls.len());
    found
}

/// Identifiers not yet ingested, sorted, capped to `max`.
///
/// Returns the selected work queue and the number of new identifiers left
/// out by the cap.
pub fn pending(
    discovered: &BTreeSet<CelexNumber>,
    ingested: &CheckpointSet,
    max: Option<usize>,
) -> (Vec<CelexNumber>, usize) {
    let mut queue: Vec<CelexNumber> = discovered.difference(ingested).cloned().collect();
    let total = queue.len();
    if let Some(max) = max {
        queue.truncate(max);
    }
    let deferred = total - queue.len();
    (queue, deferred)
}

/// Drives one incremental harvest run
pub struct Harvester<F, C, T> {
    fetcher: F,
    checkpoint: C,
    sink: DatasetSink<T>,
    scanner: ListingScanner,
    resolver: ContentResolver,
    options: HarvestOptions,
    throttle: Throttle,
    stage: HarvestStage,
    quiet: bool,
}

impl<F, C, T> Harvester<F, C, T>
where
    F: PageFetcher,
    C: CheckpointStore,
    T: RemoteTable,
{
    pub fn new(
        fetcher: F,
        checkpoint: C,
        sink: DatasetSink<T>,
        resolver: ContentResolver,
        options: HarvestOptions,
    ) -> Self {
        Self {
            fetcher,
            checkpoint,
            sink,
            scanner: ListingScanner::new(options.sectors.clone()),
            resolver,
            throttle: Throttle::new(options.request_delay),
            options,
            stage: HarvestStage::Init,
            quiet: true,
        }
    }

    /// Show a progress bar while resolving (off by default)
    pub fn with_progress(mut self, show: bool) -> Self {
        self.quiet = !show;
        self
    }

    pub fn stage(&self) -> HarvestStage {
        self.stage
    }

    pub fn fetcher(&self) -> &F {
        &self.fetcher
    }

    pub fn checkpoint(&self) -> &C {
        &self.checkpoint
    }

    pub fn sink(&self) -> &DatasetSink<T> {
        &self.sink
    }

    fn enter(&mut self, stage: HarvestStage) {
        debug!(from = %self.stage, to = %stage, "stage transition");
        self.stage = stage;
    }

    /// Run every stage to completion or to the first publish failure
    pub async fn run(&mut self) -> Result<HarvestReport, HarvestError> {
        let started = Instant::now();
        let mut report = HarvestReport::default();

        // Init
        self.enter(HarvestStage::Init);
        let mut ingested = self.checkpoint.load();
        report.first_run = ingested.is_empty();
        if report.first_run {
            info!("Checkpoint is empty, treating this as a first run");
            if self.options.seed_from_remote {
                let seeded = self.seed_from_remote().await;
                report.seeded_from_remote = seeded.len();
                if !seeded.is_empty() {
                    // Rows already published count as ingested from now on
                    ingested.extend(seeded);
                    self.save_checkpoint(&ingested, &mut report, "seed");
                }
            }
        } else {
            info!("Checkpoint holds {} already-ingested identifiers", ingested.len());
        }

        // DiscoverListings
        self.enter(HarvestStage::DiscoverListings);
        let urls = self.options.listing_urls(report.first_run);
        report.listing_pages = urls.len();
        let discovered = discover(&self.fetcher, &self.scanner, &urls, &mut self.throttle).await;
        report.discovered = discovered.len();

        // DiffAgainstCheckpoint
        self.enter(HarvestStage::DiffAgainstCheckpoint);
        let (queue, deferred) = pending(&discovered, &ingested, self.options.max_per_run);
        report.pending = queue.len();
        report.deferred = deferred;
        report.checkpoint_size = ingested.len();

        if queue.is_empty() {
            info!("No new documents to process");
            self.enter(HarvestStage::Done);
            report.elapsed_seconds = started.elapsed().as_secs_f64();
            return Ok(report);
        }
        if deferred > 0 {
            info!("Processing {} new documents, {} deferred by the per-run cap", queue.len(), deferred);
        } else {
            info!("Processing {} new documents", queue.len());
        }

        // ProcessBatch
        let total = queue.len().div_ceil(self.options.batch_size);
        let progress = HarvestProgress::new(queue.len(), self.quiet);

        for (offset, chunk) in queue.chunks(self.options.batch_size).enumerate() {
            let index = offset + 1;
            self.enter(HarvestStage::ProcessBatch { index, total });
            info!(batch = index, "Processing batch {}/{} ({} identifiers)", index, total, chunk.len());

            let mut buffer = Vec::with_capacity(chunk.len());
            let mut batch_ids = Vec::with_capacity(chunk.len());
            for celex in chunk {
                match self.resolver.resolve(&self.fetcher, &mut self.throttle, celex).await {
                    Ok(doc) => {
                        buffer.push(Record::new(doc.url.as_str(), doc.content, self.options.source_label.as_str()));
                        batch_ids.push(doc.celex);
                        report.resolved += 1;
                        progress.document_done(celex, true);
                    }
                    Err(e) => {
                        warn!(celex = %celex, batch = index, "Skipping document: {}", e);
                        report.skipped += 1;
                        progress.document_done(celex, false);
                    }
                }
            }

            if buffer.is_empty() {
                warn!(batch = index, "No documents resolved in batch, nothing to publish");
                continue;
            }

            let outcome = match self.sink.publish(index, buffer).await {
                Ok(outcome) => outcome,
                Err(source) => {
                    error!(batch = index, "Publish failed, batch not checkpointed: {}", source);
                    progress.abandon("publish failed");
                    report.checkpoint_size = ingested.len();
                    report.elapsed_seconds = started.elapsed().as_secs_f64();
                    return Err(HarvestError::Publish {
                        batch: index,
                        source,
                        report: Box::new(report),
                    });
                }
            };
            report.batches_published += 1;
            report.records_published += outcome.published;
            report.already_present += outcome.already_present;
            progress.batch_published(index, total);

            ingested.extend(batch_ids);
            self.save_checkpoint(&ingested, &mut report, &format!("batch {}", index));
        }

        progress.finish();
        self.enter(HarvestStage::Done);
        report.checkpoint_size = ingested.len();
        report.elapsed_seconds = started.elapsed().as_secs_f64();
        Ok(report)
    }

    /// Persist the checkpoint; a failure is logged and counted, never fatal
    fn save_checkpoint(&self, ingested: &CheckpointSet, report: &mut HarvestReport, after: &str) {
        match self.checkpoint.save(ingested) {
            Ok(()) => info!("Checkpoint updated after {} ({} identifiers)", after, ingested.len()),
            Err(e) => {
                report.checkpoint_save_failures += 1;
                error!(
                    "Checkpoint save failed after {}; these documents may be re-fetched next run: {}",
                    after, e
                );
            }
        }
    }

    /// Identifiers embedded in the URLs already present remotely
    async fn seed_from_remote(&self) -> BTreeSet<CelexNumber> {
        match self.sink.load().await {
            Ok(state) => {
                let seeded: BTreeSet<CelexNumber> = state.records().iter().filter_map(Record::celex).collect();
                info!("Seeded {} identifiers from the remote dataset", seeded.len());
                seeded
            }
            Err(e) => {
                warn!("Could not read remote dataset for seeding: {}", e);
                BTreeSet::new()
            }
        }
    }
}
