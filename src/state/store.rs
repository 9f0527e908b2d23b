//! File-backed state store
//!
//! Loading never fails: a missing, unreadable or malformed file degrades to an
//! empty state. Saving is atomic (temp file, fsync, rename). A failed save is
//! reported to the caller as a non-durable update but the in-memory state is
//! still returned, so the overall pipeline is at-least-once.

use crate::state::crawl_state::CrawlState;
use crate::state::StateError;
use chrono::{Local, NaiveDate, Utc};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// State files larger than this are treated as corrupt
pub const MAX_STATE_FILE_SIZE: u64 = 10 * 1024 * 1024;

/// Result of a state mutation
#[derive(Debug, Clone)]
pub struct StateUpdate {
    /// The updated state, valid for the rest of the run either way
    pub state: CrawlState,

    /// Whether the update reached disk
    pub durable: bool,
}

type Today = Arc<dyn Fn() -> NaiveDate + Send + Sync>;

/// Loads, mutates and persists the crawl state file
#[derive(Clone)]
pub struct StateStore {
    path: PathBuf,
    today: Today,
}

impl std::fmt::Debug for StateStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StateStore").field("path", &self.path).finish()
    }
}

impl StateStore {
    /// Creates a store for the given file; "today" is the local calendar date
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            today: Arc::new(|| Local::now().date_naive()),
        }
    }

    /// Replaces the calendar used by the daily gate and by commits
    pub fn with_today<F>(mut self, today: F) -> Self
    where
        F: Fn() -> NaiveDate + Send + Sync + 'static,
    {
        self.today = Arc::new(today);
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn today(&self) -> NaiveDate {
        (self.today)()
    }

    /// Reads the persisted state, falling back to an empty one
    ///
    /// A corrupt file is copied aside (`<name>.corrupt-<timestamp>`) before the
    /// fallback so its contents can be recovered by hand.
    pub fn load(&self) -> CrawlState {
        match self.try_load() {
            Ok(Some(state)) => {
                info!(
                    path = %self.path.display(),
                    processed = state.position_index,
                    last = ?state.last_identifier,
                    "Loaded crawl state"
                );
                state
            }
            Ok(None) => {
                info!(path = %self.path.display(), "No state file yet, starting fresh");
                CrawlState::new()
            }
            Err(e) => {
                warn!(
                    path = %self.path.display(),
                    error = %e,
                    "Could not load state file, starting fresh"
                );
                self.preserve_corrupt_file();
                CrawlState::new()
            }
        }
    }

    fn try_load(&self) -> Result<Option<CrawlState>, StateError> {
        let metadata = match std::fs::metadata(&self.path) {
            Ok(m) => m,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        if metadata.len() > MAX_STATE_FILE_SIZE {
            return Err(StateError::TooLarge {
                size: metadata.len(),
                max: MAX_STATE_FILE_SIZE,
            });
        }

        let contents = std::fs::read_to_string(&self.path)?;
        let state: CrawlState = serde_json::from_str(&contents)?;

        if state.schema_version > crate::state::SCHEMA_VERSION {
            warn!(
                found = state.schema_version,
                supported = crate::state::SCHEMA_VERSION,
                "State file written by a newer version, unknown fields are ignored"
            );
        }

        Ok(Some(state.normalized()))
    }

    fn preserve_corrupt_file(&self) {
        if !self.path.exists() {
            return;
        }
        let mut name = self.path.as_os_str().to_owned();
        name.push(format!(".corrupt-{}", Utc::now().format("%Y%m%d%H%M%S")));
        let backup = PathBuf::from(name);
        match std::fs::copy(&self.path, &backup) {
            Ok(_) => warn!(backup = %backup.display(), "Kept a copy of the unreadable state file"),
            Err(e) => warn!(error = %e, "Could not copy the unreadable state file aside"),
        }
    }

    /// True iff the last completed run happened today
    pub fn already_ran_today(&self, state: &CrawlState) -> bool {
        state.ran_on(self.today())
    }

    /// Marks `identifier` processed and persists
    ///
    /// The single commit point of a run: adds the canonical identifier (a no-op
    /// on the set if present), sets the last identifier and today's date,
    /// optionally raises the estimate, then writes synchronously.
    pub fn commit(
        &self,
        mut state: CrawlState,
        identifier: &str,
        estimated_total: Option<u64>,
    ) -> StateUpdate {
        state.record(identifier, estimated_total, self.today());
        info!(
            identifier = %state.last_identifier.as_deref().unwrap_or_default(),
            processed = state.position_index,
            estimated_total = state.estimated_total,
            "Committing processed vehicle"
        );
        self.persist(state)
    }

    /// Clears `last_run_date` so a forced run is not gated; the processed set is untouched
    pub fn reset_today(&self, mut state: CrawlState) -> StateUpdate {
        state.last_run_date = None;
        debug!("Reset last run date");
        self.persist(state)
    }

    /// Raises the total estimate; only writes when the value changed
    pub fn raise_estimate(&self, mut state: CrawlState, estimate: u64) -> StateUpdate {
        if state.raise_estimate(estimate) {
            debug!(estimated_total = estimate, "Raised total estimate");
            self.persist(state)
        } else {
            StateUpdate {
                state,
                durable: true,
            }
        }
    }

    fn persist(&self, state: CrawlState) -> StateUpdate {
        match self.save(&state) {
            Ok(()) => StateUpdate {
                state,
                durable: true,
            },
            Err(e) => {
                warn!(
                    path = %self.path.display(),
                    error = %e,
                    "Could not save crawl state, progress is only held in memory"
                );
                StateUpdate {
                    state,
                    durable: false,
                }
            }
        }
    }

    /// Writes the state atomically
    pub fn save(&self, state: &CrawlState) -> Result<(), StateError> {
        let parent = match self.path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
            _ => PathBuf::from("."),
        };
        std::fs::create_dir_all(&parent)?;

        let json = serde_json::to_string_pretty(state)?;

        let mut temp_file = tempfile::NamedTempFile::new_in(&parent)?;
        temp_file.write_all(json.as_bytes())?;
        temp_file.flush()?;
        temp_file.as_file().sync_all()?;
        temp_file
            .persist(&self.path)
            .map_err(|e| StateError::Io(e.error))?;

        // Make the rename itself durable
        if let Ok(dir) = std::fs::File::open(&parent) {
            let _ = dir.sync_all();
        }

        debug!(path = %self.path.display(), "Crawl state saved");
        Ok(())
    }
}
