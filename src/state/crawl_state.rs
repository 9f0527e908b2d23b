//! The durable crawl record
//!
//! One `CrawlState` exists per state file. It is the only source of truth for
//! which vehicles were processed and when the last run happened.

use chrono::{DateTime, Local, NaiveDate, NaiveDateTime, TimeZone, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::HashSet;

/// Current state file schema version
pub const SCHEMA_VERSION: u32 = 1;

/// Canonical form of a vehicle reference number (trimmed, uppercase)
pub fn canonical_identifier(identifier: &str) -> String {
    identifier.trim().to_uppercase()
}

/// Progress record persisted between runs
///
/// Unknown fields are ignored and missing fields take their defaults, so older
/// and newer state files stay readable. The field names of the first-generation
/// state file are accepted as aliases.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CrawlState {
    pub schema_version: u32,

    /// Processed reference numbers in commit order, without duplicates
    #[serde(alias = "scraped_vehicles")]
    pub processed_identifiers: Vec<String>,

    #[serde(alias = "last_scraped_ref")]
    pub last_identifier: Option<String>,

    #[serde(alias = "last_scraped_date", deserialize_with = "lenient_date")]
    pub last_run_date: Option<NaiveDate>,

    /// Number of processed vehicles; always `processed_identifiers.len()`
    #[serde(alias = "current_index")]
    pub position_index: usize,

    /// Running upper bound on the vehicles available in the stock list
    #[serde(alias = "total_available")]
    pub estimated_total: u64,

    #[serde(deserialize_with = "lenient_timestamp")]
    pub created_at: DateTime<Utc>,
}

impl CrawlState {
    /// Creates an empty state
    pub fn new() -> Self {
        Self {
            schema_version: SCHEMA_VERSION,
            processed_identifiers: Vec::new(),
            last_identifier: None,
            last_run_date: None,
            position_index: 0,
            estimated_total: 0,
            created_at: Utc::now(),
        }
    }

    /// Restores the invariants after deserializing a file that may have been
    /// written by hand or by an older version
    pub(crate) fn normalized(mut self) -> Self {
        let mut seen = HashSet::new();
        self.processed_identifiers = self
            .processed_identifiers
            .iter()
            .map(|id| canonical_identifier(id))
            .filter(|id| !id.is_empty() && seen.insert(id.clone()))
            .collect();
        self.last_identifier = self
            .last_identifier
            .as_deref()
            .map(canonical_identifier)
            .filter(|id| !id.is_empty());
        self.position_index = self.processed_identifiers.len();
        self
    }

    /// Set view of the processed identifiers for cursor lookups
    pub fn processed_set(&self) -> HashSet<String> {
        self.processed_identifiers.iter().cloned().collect()
    }

    /// Case-insensitive membership test
    pub fn is_processed(&self, identifier: &str) -> bool {
        let canonical = canonical_identifier(identifier);
        self.processed_identifiers.iter().any(|id| *id == canonical)
    }

    /// Whether the last completed run happened on `date`
    pub fn ran_on(&self, date: NaiveDate) -> bool {
        self.last_run_date == Some(date)
    }

    /// Records a fully processed vehicle
    ///
    /// Inserting an identifier that is already present leaves the set unchanged
    /// but still moves `last_identifier` and `last_run_date`.
    pub fn record(&mut self, identifier: &str, estimated_total: Option<u64>, today: NaiveDate) {
        let canonical = canonical_identifier(identifier);
        if !self.processed_identifiers.contains(&canonical) {
            self.processed_identifiers.push(canonical.clone());
        }
        self.position_index = self.processed_identifiers.len();
        self.last_identifier = Some(canonical);
        self.last_run_date = Some(today);
        if let Some(estimate) = estimated_total {
            self.raise_estimate(estimate);
        }
    }

    /// Raises `estimated_total`, returning true if it changed
    pub fn raise_estimate(&mut self, estimate: u64) -> bool {
        if estimate > self.estimated_total {
            self.estimated_total = estimate;
            true
        } else {
            false
        }
    }
}

impl Default for CrawlState {
    fn default() -> Self {
        Self::new()
    }
}

/// Accepts ISO dates, full timestamps, null, or garbage (treated as absent)
fn lenient_date<'de, D>(deserializer: D) -> Result<Option<NaiveDate>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<String>::deserialize(deserializer)?;
    Ok(raw.and_then(|s| parse_date(&s)))
}

fn parse_date(raw: &str) -> Option<NaiveDate> {
    let raw = raw.trim();
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .or_else(|| parse_timestamp(raw).map(|ts| ts.with_timezone(&Local).date_naive()))
}

/// Accepts RFC 3339 or "YYYY-MM-DD HH:MM:SS[.f]" local time; anything else becomes now
fn lenient_timestamp<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<String>::deserialize(deserializer)?;
    Ok(raw.as_deref().and_then(parse_timestamp).unwrap_or_else(Utc::now))
}

fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Some(ts.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S%.f")
        .ok()
        .and_then(|naive| Local.from_local_datetime(&naive).earliest())
        .map(|ts| ts.with_timezone(&Utc))
}
