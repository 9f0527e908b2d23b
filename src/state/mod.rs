//! State module for tracking daily crawl progress
//!
//! # Components
//!
//! - `CrawlState`: the durable record of processed vehicles and the last run
//! - `StateStore`: load / commit / reset against the JSON state file
//! - `RunLock`: keeps two runs from working on the same state file at once
//! - `PostedLedger`: vehicles already handed to the posting webhook

mod crawl_state;
mod lock;
mod posted;
mod store;

// Re-export main types
pub use crawl_state::{canonical_identifier, CrawlState, SCHEMA_VERSION};
pub use lock::RunLock;
pub use posted::PostedLedger;
pub use store::{StateStore, StateUpdate, MAX_STATE_FILE_SIZE};

use thiserror::Error;

/// Errors raised while reading or writing the state file
#[derive(Debug, Error)]
pub enum StateError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Malformed state file: {0}")]
    Malformed(#[from] serde_json::Error),

    #[error("State file too large: {size} bytes (max: {max} bytes)")]
    TooLarge { size: u64, max: u64 },

    #[error("Another run is already in progress")]
    Busy,
}
