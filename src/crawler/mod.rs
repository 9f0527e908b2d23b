//! Crawler module for the stock list walk and the daily run
//!
//! This module contains the core crawling logic, including:
//! - HTTP fetching with retry, backoff and polite pacing
//! - Stock list parsing and pagination detection
//! - The crawl cursor that finds the next unprocessed vehicle
//! - Overall run coordination

mod coordinator;
mod cursor;
mod fetcher;
mod parser;

pub use coordinator::{Coordinator, RunOutcome, RunPhase, RunReport, RunRequest};
pub use cursor::{CrawlCursor, CursorOutcome, ExhaustionReason};
pub use fetcher::{
    build_http_client, Clock, FetchError, HttpFetcher, Pacing, PageFetcher, RetryPolicy,
    TokioClock,
};
pub use parser::{identifier_from_url, ListingExtractor, ListingRef, StockListExtractor};

pub(crate) use parser::resolve_link;

use crate::config::Config;
use crate::DailyError;

/// Runs one daily scrape with the given configuration
///
/// # Arguments
///
/// * `config` - The validated configuration
/// * `config_hash` - Hash recorded with the run
/// * `request` - Per-run options
///
/// # Returns
///
/// * `Ok(RunReport)` - The run finished, successfully or not
/// * `Err(DailyError)` - The coordinator could not be set up
pub async fn run_daily(
    config: Config,
    config_hash: &str,
    request: &RunRequest,
) -> Result<RunReport, DailyError> {
    let coordinator = Coordinator::new(config, config_hash)?;
    Ok(coordinator.run(request).await)
}
