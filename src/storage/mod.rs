//! Storage module for the run history
//!
//! Every invocation is logged to a small SQLite database: when it started and
//! finished, the configuration it ran with, and how it ended. The `--status`
//! mode and the `/health` endpoint read it back.

mod schema;
mod sqlite;
mod traits;

pub use sqlite::SqliteRunHistory;
pub use traits::{HistoryError, HistoryResult, RunHistory};

use serde::Serialize;
use std::path::Path;

/// Opens (creating if needed) the run history database
///
/// # Arguments
///
/// * `path` - Path to the SQLite database file
///
/// # Returns
///
/// * `Ok(SqliteRunHistory)` - Successfully opened history
/// * `Err(HistoryError)` - Failed to open the database
pub fn open_history(path: &Path) -> HistoryResult<SqliteRunHistory> {
    SqliteRunHistory::new(path)
}

/// Represents one daily run
#[derive(Debug, Clone, Serialize)]
pub struct RunRecord {
    pub id: i64,
    pub started_at: String,
    pub finished_at: Option<String>,
    pub config_hash: String,
    pub status: RunStatus,
    pub identifier: Option<String>,
    pub message: Option<String>,
}

/// Status of a daily run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    Running,
    Processed,
    Skipped,
    Exhausted,
    Failed,
    Interrupted,
}

impl RunStatus {
    pub fn to_db_string(&self) -> &'static str {
        match self {
            Self::Running => "running",
            Self::Processed => "processed",
            Self::Skipped => "skipped",
            Self::Exhausted => "exhausted",
            Self::Failed => "failed",
            Self::Interrupted => "interrupted",
        }
    }

    pub fn from_db_string(s: &str) -> Option<Self> {
        match s {
            "running" => Some(Self::Running),
            "processed" => Some(Self::Processed),
            "skipped" => Some(Self::Skipped),
            "exhausted" => Some(Self::Exhausted),
            "failed" => Some(Self::Failed),
            "interrupted" => Some(Self::Interrupted),
            _ => None,
        }
    }
}
