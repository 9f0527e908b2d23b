//! Status report from the crawl state and the run history
//!
//! This module backs the `--status` command.

use crate::state::CrawlState;
use crate::storage::{HistoryError, RunHistory, RunRecord, RunStatus};
use chrono::NaiveDate;
use std::collections::HashMap;

/// Progress and run statistics
#[derive(Debug, Clone)]
pub struct RunStatistics {
    /// Number of vehicles processed so far
    pub processed: usize,

    pub last_identifier: Option<String>,
    pub last_run_date: Option<NaiveDate>,
    pub estimated_total: u64,

    /// Total number of recorded invocations
    pub total_runs: u64,

    /// Count of invocations by outcome
    pub runs_by_status: HashMap<RunStatus, u64>,

    /// Most recent invocations, newest first
    pub recent_runs: Vec<RunRecord>,
}

/// Loads statistics from the state and the history
///
/// # Arguments
///
/// * `state` - The current crawl state
/// * `history` - The run history to query
/// * `recent` - How many recent runs to include
///
/// # Returns
///
/// * `Ok(RunStatistics)` - Successfully loaded statistics
/// * `Err(HistoryError)` - Failed to query the history
pub fn load_statistics(
    state: &CrawlState,
    history: &dyn RunHistory,
    recent: usize,
) -> Result<RunStatistics, HistoryError> {
    let runs_by_status = history.count_by_status()?;
    let total_runs = runs_by_status.values().sum();

    Ok(RunStatistics {
        processed: state.processed_identifiers.len(),
        last_identifier: state.last_identifier.clone(),
        last_run_date: state.last_run_date,
        estimated_total: state.estimated_total,
        total_runs,
        runs_by_status,
        recent_runs: history.recent_runs(recent)?,
    })
}

/// Formats statistics for the terminal
pub fn format_statistics(stats: &RunStatistics) -> String {
    let mut out = String::from("=== BE FORWARD Daily Status ===\n\n");

    out.push_str("Progress:\n");
    out.push_str(&format!("  Vehicles processed: {}\n", stats.processed));
    if stats.estimated_total > 0 {
        let percentage = stats.processed as f64 / stats.estimated_total as f64 * 100.0;
        out.push_str(&format!(
            "  Estimated stock: {} ({:.1}% covered)\n",
            stats.estimated_total, percentage
        ));
    }
    out.push_str(&format!(
        "  Last vehicle: {}\n",
        stats.last_identifier.as_deref().unwrap_or("-")
    ));
    out.push_str(&format!(
        "  Last run date: {}\n\n",
        stats
            .last_run_date
            .map(|d| d.to_string())
            .unwrap_or_else(|| "-".to_string())
    ));

    out.push_str(&format!("Runs ({} total):\n", stats.total_runs));
    let mut counts: Vec<_> = stats.runs_by_status.iter().collect();
    counts.sort_by(|a, b| b.1.cmp(a.1).then(a.0.to_db_string().cmp(b.0.to_db_string())));
    for (status, count) in counts {
        out.push_str(&format!("  {}: {}\n", status.to_db_string(), count));
    }

    if !stats.recent_runs.is_empty() {
        out.push_str("\nRecent runs:\n");
        for run in &stats.recent_runs {
            out.push_str(&format!(
                "  #{} {} {}{}\n",
                run.id,
                run.started_at,
                run.status.to_db_string(),
                run.identifier
                    .as_deref()
                    .map(|id| format!(" {id}"))
                    .unwrap_or_default()
            ));
        }
    }

    out
}

/// Prints statistics to stdout
pub fn print_statistics(stats: &RunStatistics) {
    print!("{}", format_statistics(stats));
}
