//! Run coordinator - one daily run from gate to commit
//!
//! This module ties the pieces together for a single invocation:
//! - Holding the run lock and recording the run in the history
//! - Applying the once-a-day gate
//! - Locating the next unprocessed vehicle with the crawl cursor
//! - Fetching and extracting the detail page, retrieving photos
//! - Persisting artifacts and only then committing the identifier
//!
//! Nothing below the coordinator is allowed to abort the process: every
//! failure is classified into a [`RunReport`].

use crate::config::{Config, ImageMode, SiteConfig};
use crate::crawler::cursor::{CrawlCursor, CursorOutcome, ExhaustionReason};
use crate::crawler::fetcher::{HttpFetcher, PageFetcher};
use crate::crawler::parser::{identifier_from_url, ListingExtractor, StockListExtractor};
use crate::output::{ArtifactSink, ArtifactSummary, FsArtifactWriter};
use crate::state::{canonical_identifier, CrawlState, RunLock, StateError, StateStore};
use crate::storage::{open_history, RunHistory, RunRecord, RunStatus};
use crate::vehicle::{
    folder_name, format_post, BeForwardDetailExtractor, DetailExtractor, ImagePipeline,
    VehicleRecord,
};
use crate::{ConfigError, DailyError};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use url::Url;

/// What the caller asks a run to do
///
/// Deserializes from the `/scrape` request body, where every field is optional.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct RunRequest {
    /// Ignore the daily gate
    pub force: bool,

    /// Process this detail page instead of asking the cursor
    #[serde(rename = "url")]
    pub explicit_listing: Option<Url>,

    /// Overrides the configured image mode
    #[serde(rename = "mode")]
    pub image_mode: Option<ImageMode>,

    pub skip_images: bool,
    pub no_crop: bool,

    /// Overrides the configured stock country
    pub country: Option<String>,
}

/// How a run ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RunOutcome {
    /// Already ran today
    Skipped,
    /// One vehicle processed and committed
    Processed,
    /// No unprocessed vehicle within the walk bounds
    Exhausted,
    Failed,
}

impl RunOutcome {
    pub fn is_success(&self) -> bool {
        !matches!(self, Self::Failed)
    }

    fn history_status(&self) -> RunStatus {
        match self {
            Self::Skipped => RunStatus::Skipped,
            Self::Processed => RunStatus::Processed,
            Self::Exhausted => RunStatus::Exhausted,
            Self::Failed => RunStatus::Failed,
        }
    }
}

/// Step of a run, reported with failures
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunPhase {
    CheckToday,
    LocateNext,
    FetchDetail,
    ExtractArtifacts,
    PersistArtifacts,
    CommitState,
}

/// Result of one run
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub outcome: RunOutcome,
    pub identifier: Option<String>,
    pub artifacts: Option<ArtifactSummary>,
    pub message: Option<String>,

    /// Where a failed run stopped
    pub failed_phase: Option<RunPhase>,

    /// Why the cursor came back empty
    pub exhaustion: Option<ExhaustionReason>,

    /// Whether the state file reflects this run
    pub state_persisted: bool,

    /// Processed vehicles after the run
    pub processed: usize,
    pub estimated_total: u64,
}

impl RunReport {
    fn new(outcome: RunOutcome, state: Option<&CrawlState>) -> Self {
        Self {
            outcome,
            identifier: None,
            artifacts: None,
            message: None,
            failed_phase: None,
            exhaustion: None,
            state_persisted: true,
            processed: state.map(|s| s.processed_identifiers.len()).unwrap_or(0),
            estimated_total: state.map(|s| s.estimated_total).unwrap_or(0),
        }
    }

    fn failed(phase: RunPhase, message: impl Into<String>, state: Option<&CrawlState>) -> Self {
        let message = message.into();
        tracing::error!(phase = ?phase, "Run failed: {}", message);
        Self {
            failed_phase: Some(phase),
            message: Some(message),
            ..Self::new(RunOutcome::Failed, state)
        }
    }

    fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    fn with_identifier(mut self, identifier: impl Into<String>) -> Self {
        self.identifier = Some(identifier.into());
        self
    }

    /// Process exit code: 0 unless the run failed
    pub fn exit_code(&self) -> i32 {
        if self.outcome.is_success() {
            0
        } else {
            1
        }
    }
}

/// Where the detail page to process came from
struct Target {
    detail_url: Url,

    /// Identifier read from the listing link, possibly empty
    listing_identifier: Option<String>,
}

/// Main run coordinator structure
pub struct Coordinator {
    config: Config,
    config_hash: String,
    fetcher: Arc<dyn PageFetcher>,
    listing_extractor: Box<dyn ListingExtractor>,
    detail_extractor: Box<dyn DetailExtractor>,
    sink: Box<dyn ArtifactSink>,
    store: StateStore,
    history: Option<Mutex<Box<dyn RunHistory>>>,
}

impl Coordinator {
    /// Creates a coordinator with the HTTP fetcher and the SQLite history
    ///
    /// # Arguments
    ///
    /// * `config` - The validated configuration
    /// * `config_hash` - Hash of the configuration file, recorded per run
    ///
    /// # Returns
    ///
    /// * `Ok(Coordinator)` - Successfully created coordinator
    /// * `Err(DailyError)` - The HTTP client or the history could not be set up
    pub fn new(config: Config, config_hash: impl Into<String>) -> Result<Self, DailyError> {
        let fetcher = Arc::new(HttpFetcher::new(&config.fetcher)?);
        let history = open_history(&config.output.history_path)?;
        tracing::debug!(
            "Run history at {}",
            config.output.history_path.display()
        );

        Ok(Self::from_parts(config, config_hash, fetcher).with_history(Box::new(history)))
    }

    /// Creates a coordinator around `fetcher` with the default extractors,
    /// the filesystem artifact writer and no run history
    pub fn from_parts(
        config: Config,
        config_hash: impl Into<String>,
        fetcher: Arc<dyn PageFetcher>,
    ) -> Self {
        let store = StateStore::new(config.output.state_path.clone());
        let sink = FsArtifactWriter::new(config.output.vehicles_dir.clone());
        Self {
            config,
            config_hash: config_hash.into(),
            fetcher,
            listing_extractor: Box::new(StockListExtractor),
            detail_extractor: Box::new(BeForwardDetailExtractor),
            sink: Box::new(sink),
            store,
            history: None,
        }
    }

    pub fn with_listing_extractor(mut self, extractor: Box<dyn ListingExtractor>) -> Self {
        self.listing_extractor = extractor;
        self
    }

    pub fn with_detail_extractor(mut self, extractor: Box<dyn DetailExtractor>) -> Self {
        self.detail_extractor = extractor;
        self
    }

    pub fn with_sink(mut self, sink: Box<dyn ArtifactSink>) -> Self {
        self.sink = sink;
        self
    }

    pub fn with_store(mut self, store: StateStore) -> Self {
        self.store = store;
        self
    }

    pub fn with_history(mut self, history: Box<dyn RunHistory>) -> Self {
        self.history = Some(Mutex::new(history));
        self
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn store(&self) -> &StateStore {
        &self.store
    }

    /// Executes one run
    ///
    /// The run lock is held for the whole call. A run that finds the lock
    /// taken fails without touching the state or the history.
    pub async fn run(&self, request: &RunRequest) -> RunReport {
        let mut lock = match RunLock::open(self.store.path()) {
            Ok(lock) => lock,
            Err(e) => {
                return RunReport::failed(
                    RunPhase::CheckToday,
                    format!("Could not open run lock: {e}"),
                    None,
                )
            }
        };
        let _guard = match lock.try_acquire() {
            Ok(guard) => guard,
            Err(StateError::Busy) => {
                return RunReport::failed(
                    RunPhase::CheckToday,
                    "another run is in progress",
                    None,
                )
            }
            Err(e) => {
                return RunReport::failed(
                    RunPhase::CheckToday,
                    format!("Could not take run lock: {e}"),
                    None,
                )
            }
        };

        let run_id = self.start_history();
        let report = self.run_locked(request).await;
        self.finish_history(run_id, &report);

        tracing::info!(
            outcome = ?report.outcome,
            identifier = report.identifier.as_deref().unwrap_or("-"),
            processed = report.processed,
            "Run finished"
        );
        report
    }

    async fn run_locked(&self, request: &RunRequest) -> RunReport {
        let site = match self.site_for(request) {
            Ok(site) => site,
            Err(e) => return RunReport::failed(RunPhase::CheckToday, e.to_string(), None),
        };

        let mut state = self.store.load();

        // CheckToday
        if request.explicit_listing.is_none()
            && !request.force
            && self.store.already_ran_today(&state)
        {
            tracing::info!(
                "Already ran today ({}), skipping",
                state.last_identifier.as_deref().unwrap_or("-")
            );
            let mut report = RunReport::new(RunOutcome::Skipped, Some(&state))
                .with_message("Already ran today");
            report.identifier = state.last_identifier.clone();
            return report;
        }

        if request.force {
            tracing::info!("Forced run, clearing today's gate");
            state = self.store.reset_today(state).state;
        }

        // LocateNext
        let target = match &request.explicit_listing {
            Some(url) => {
                tracing::info!("Processing requested vehicle {}", url);
                Target {
                    detail_url: url.clone(),
                    listing_identifier: identifier_from_url(url.as_str()),
                }
            }
            None => {
                let cursor = CrawlCursor::new(
                    &site,
                    self.fetcher.as_ref(),
                    self.listing_extractor.as_ref(),
                );
                match cursor.next_unprocessed(&state.processed_set()).await {
                    Err(e) => {
                        return RunReport::failed(RunPhase::LocateNext, e.to_string(), Some(&state))
                    }
                    Ok(CursorOutcome::Exhausted {
                        reason,
                        pages_walked,
                    }) => {
                        let message = match reason {
                            ExhaustionReason::IndexEnd => {
                                format!("Every listed vehicle is processed ({pages_walked} pages)")
                            }
                            ExhaustionReason::PageCeiling => {
                                format!("No unprocessed vehicle within {pages_walked} pages")
                            }
                        };
                        tracing::info!("{}", message);
                        let mut report = RunReport::new(RunOutcome::Exhausted, Some(&state))
                            .with_message(message);
                        report.exhaustion = Some(reason);
                        return report;
                    }
                    Ok(CursorOutcome::Found { listing, page }) => {
                        let estimate = u64::from(page) * u64::from(site.page_size);
                        state = self.store.raise_estimate(state, estimate).state;
                        Target {
                            detail_url: listing.detail_link,
                            listing_identifier: Some(listing.identifier),
                        }
                    }
                }
            }
        };

        self.process(request, target, state).await
    }

    /// FetchDetail through CommitState for one detail page
    async fn process(&self, request: &RunRequest, target: Target, state: CrawlState) -> RunReport {
        let detail_url = target.detail_url;

        // FetchDetail
        let Some(html) = self.fetcher.fetch_text(&detail_url).await else {
            return RunReport::failed(
                RunPhase::FetchDetail,
                DailyError::PageUnavailable {
                    url: detail_url.to_string(),
                }
                .to_string(),
                Some(&state),
            );
        };

        // ExtractArtifacts
        let detail = match self.detail_extractor.extract(&html, &detail_url) {
            Ok(detail) => detail,
            Err(e) => {
                return RunReport::failed(RunPhase::ExtractArtifacts, e.to_string(), Some(&state))
            }
        };

        let listing_identifier = target
            .listing_identifier
            .map(|id| canonical_identifier(&id))
            .filter(|id| !id.is_empty());
        let detail_identifier = detail.specs.identifier().map(|id| canonical_identifier(&id));
        let identifier = match (listing_identifier, detail_identifier) {
            (Some(listed), Some(found)) => {
                if listed != found {
                    tracing::warn!(
                        "Listing says {} but the detail page says {}, keeping {}",
                        listed,
                        found,
                        listed
                    );
                }
                listed
            }
            (Some(listed), None) => listed,
            (None, Some(found)) => found,
            (None, None) => {
                return RunReport::failed(
                    RunPhase::ExtractArtifacts,
                    DailyError::MissingIdentifier {
                        url: detail_url.to_string(),
                    }
                    .to_string(),
                    Some(&state),
                )
            }
        };

        let folder = folder_name(&detail.title, &identifier);
        let vehicle_dir = match self.sink.vehicle_dir(&folder) {
            Ok(dir) => dir,
            Err(e) => {
                return RunReport::failed(RunPhase::PersistArtifacts, e.to_string(), Some(&state))
                    .with_identifier(identifier)
            }
        };
        tracing::info!("Processing {} into {}", identifier, vehicle_dir.display());

        let images: Vec<PathBuf> = if request.skip_images {
            tracing::info!("Skipping photos");
            Vec::new()
        } else {
            let mode = request.image_mode.unwrap_or(self.config.images.mode);
            let crop = self.config.images.crop && !request.no_crop;
            let pipeline = ImagePipeline::new(self.fetcher.clone(), self.config.images.clone());
            match pipeline.retrieve(&detail, &vehicle_dir, mode, crop).await {
                Ok(images) => images,
                Err(e) => {
                    return RunReport::failed(
                        RunPhase::ExtractArtifacts,
                        format!("Photo retrieval failed: {e}"),
                        Some(&state),
                    )
                    .with_identifier(identifier)
                }
            }
        };

        let post = format_post(&detail, &identifier, &folder, &images, &self.config.post);
        let record = VehicleRecord {
            identifier: identifier.clone(),
            detail,
            folder_name: folder,
            images,
            post,
        };

        // PersistArtifacts
        let artifacts = match self.sink.persist(&record) {
            Ok(summary) => summary,
            Err(e) => {
                return RunReport::failed(RunPhase::PersistArtifacts, e.to_string(), Some(&state))
                    .with_identifier(identifier)
            }
        };

        // CommitState
        let update = self.store.commit(state, &identifier, None);
        if !update.durable {
            let mut report = RunReport::failed(
                RunPhase::CommitState,
                format!("Artifacts for {identifier} were written but the state file could not be saved"),
                Some(&update.state),
            )
            .with_identifier(identifier);
            report.artifacts = Some(artifacts);
            report.state_persisted = false;
            return report;
        }

        tracing::info!(
            "Processed {} ({} vehicles so far)",
            identifier,
            update.state.position_index
        );
        let mut report = RunReport::new(RunOutcome::Processed, Some(&update.state))
            .with_message(format!("Processed {identifier}"))
            .with_identifier(identifier);
        report.artifacts = Some(artifacts);
        report
    }

    /// Site settings with the request's country override applied
    fn site_for(&self, request: &RunRequest) -> Result<SiteConfig, ConfigError> {
        let mut site = self.config.site.clone();
        if let Some(country) = request.country.as_deref().filter(|c| !c.trim().is_empty()) {
            site.country = country.to_string();
        }
        site.country_code()?;
        Ok(site)
    }

    /// Most recent run in the history, if one is attached
    pub fn latest_run(&self) -> Option<RunRecord> {
        let history = self.history.as_ref()?;
        let history = match history.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        match history.latest_run() {
            Ok(run) => run,
            Err(e) => {
                tracing::warn!("Could not read run history: {}", e);
                None
            }
        }
    }

    fn start_history(&self) -> Option<i64> {
        let history = self.history.as_ref()?;
        let mut history = match history.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };

        match history.mark_interrupted() {
            Ok(0) => {}
            Ok(n) => tracing::warn!("Marked {} unfinished run(s) as interrupted", n),
            Err(e) => tracing::warn!("Could not update run history: {}", e),
        }
        match history.start_run(&self.config_hash) {
            Ok(id) => Some(id),
            Err(e) => {
                tracing::warn!("Could not record run start: {}", e);
                None
            }
        }
    }

    fn finish_history(&self, run_id: Option<i64>, report: &RunReport) {
        let (Some(run_id), Some(history)) = (run_id, self.history.as_ref()) else {
            return;
        };
        let mut history = match history.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        if let Err(e) = history.finish_run(
            run_id,
            report.outcome.history_status(),
            report.identifier.as_deref(),
            report.message.as_deref(),
        ) {
            tracing::warn!("Could not record run end: {}", e);
        }
    }
}
