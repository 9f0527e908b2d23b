//! Output module for vehicle artifacts and status reports
//!
//! This module handles:
//! - Writing the per-vehicle files (`data.json`, `facebook.json`, `metadata.txt`)
//! - Reading persisted vehicles back for the HTTP API
//! - Summarizing progress and run history for `--status`

mod artifacts;
mod catalog;
pub mod stats;
mod traits;

pub use artifacts::{
    FsArtifactWriter, VehicleData, DATA_FILE, IMAGES_DIR, METADATA_FILE, POST_FILE,
};
pub use catalog::{Catalog, CatalogEntry, ImageListing};
pub use stats::{format_statistics, load_statistics, print_statistics, RunStatistics};
pub use traits::{ArtifactError, ArtifactResult, ArtifactSink, ArtifactSummary};
