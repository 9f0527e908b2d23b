//! Run history trait and error types

use crate::storage::{RunRecord, RunStatus};
use std::collections::HashMap;
use thiserror::Error;

/// Errors that can occur while reading or writing the run history
#[derive(Debug, Error)]
pub enum HistoryError {
    #[error("Run not found: {0}")]
    RunNotFound(i64),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
}

/// Result type for run history operations
pub type HistoryResult<T> = Result<T, HistoryError>;

/// Log of daily runs
///
/// The history is informational: the crawl state file stays the source of
/// truth for progress, and a history failure never fails a run.
pub trait RunHistory: Send {
    /// Records the start of a run and returns its ID
    ///
    /// # Arguments
    ///
    /// * `config_hash` - Hash of the configuration file
    fn start_run(&mut self, config_hash: &str) -> HistoryResult<i64>;

    /// Records how a run ended
    fn finish_run(
        &mut self,
        run_id: i64,
        status: RunStatus,
        identifier: Option<&str>,
        message: Option<&str>,
    ) -> HistoryResult<()>;

    /// Marks runs left in `running` by a killed process as interrupted
    ///
    /// Only meaningful while the run lock is held. Returns the number of rows
    /// changed.
    fn mark_interrupted(&mut self) -> HistoryResult<usize>;

    fn get_run(&self, run_id: i64) -> HistoryResult<RunRecord>;

    fn latest_run(&self) -> HistoryResult<Option<RunRecord>>;

    /// Most recent runs first
    fn recent_runs(&self, limit: usize) -> HistoryResult<Vec<RunRecord>>;

    fn count_by_status(&self) -> HistoryResult<HashMap<RunStatus, u64>>;
}
