//! BE FORWARD daily: a one-vehicle-a-day stock scraper
//!
//! This crate walks the paginated BE FORWARD stock list, picks the first
//! vehicle that has not been processed yet, extracts its specification and
//! photos, writes the post-ready artifacts and then records the vehicle as
//! processed in a durable state file.

pub mod config;
pub mod crawler;
pub mod output;
pub mod server;
pub mod state;
pub mod storage;
pub mod vehicle;

use thiserror::Error;

/// Main error type for beforward-daily operations
#[derive(Debug, Error)]
pub enum DailyError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("State error: {0}")]
    State(#[from] state::StateError),

    #[error("Run history error: {0}")]
    History(#[from] storage::HistoryError),

    #[error("Image error: {0}")]
    Image(#[from] vehicle::ImageError),

    #[error("Artifact error: {0}")]
    Artifact(#[from] output::ArtifactError),

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("URL parse error: {0}")]
    UrlParse(#[from] ::url::ParseError),

    #[error("HTTP client error: {0}")]
    Reqwest(#[from] reqwest::Error),

    #[error("Page unavailable: {url}")]
    PageUnavailable { url: String },

    #[error("No reference number found for {url}")]
    MissingIdentifier { url: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Configuration-specific errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Invalid URL in config: {0}")]
    InvalidUrl(String),

    #[error("Unknown stock country: {0}")]
    UnknownCountry(String),
}

/// Result type alias for beforward-daily operations
pub type Result<T> = std::result::Result<T, DailyError>;

/// Result type alias for configuration operations
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

// Re-export commonly used types
pub use config::{Config, ImageMode};
pub use crawler::{Coordinator, RunOutcome, RunReport, RunRequest};
pub use state::{CrawlState, StateStore};
