//! Configuration module for beforward-daily
//!
//! This module handles loading, parsing, and validating TOML configuration files.
//! Every field has a default, so running without a configuration file is valid.
//!
//! # Example
//!
//! ```no_run
//! use beforward_daily::config::load_config;
//! use std::path::Path;
//!
//! let config = load_config(Path::new("config.toml")).unwrap();
//! println!("Walking at most {} index pages", config.site.max_pages);
//! ```

mod country;
mod parser;
mod types;
mod validation;

// Re-export types
pub use country::{country_name, resolve_country, COUNTRY_CODES};
pub use types::{
    Config, FetcherConfig, ImageConfig, ImageMode, OutputConfig, PostConfig, ServerConfig,
    SiteConfig,
};

// Re-export parser functions
pub use parser::{compute_config_hash, load_config, load_config_with_hash, DEFAULT_CONFIG_HASH};
pub use validation::validate;
