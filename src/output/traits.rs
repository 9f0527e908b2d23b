//! Artifact sink trait and types
//!
//! This module defines the trait interface for persisting a processed
//! vehicle and the data structures written for it.

use crate::vehicle::VehicleRecord;
use serde::Serialize;
use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur while persisting artifacts
#[derive(Debug, Error)]
pub enum ArtifactError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to encode JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Refusing to write outside the vehicles directory: {0}")]
    InvalidFolder(String),
}

/// Result type for artifact operations
pub type ArtifactResult<T> = Result<T, ArtifactError>;

/// What was written for one vehicle
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ArtifactSummary {
    /// Vehicle folder
    pub folder: PathBuf,

    /// Files written into the folder, in write order
    pub files: Vec<PathBuf>,

    pub image_count: usize,
}

/// Trait for artifact persistence backends
///
/// The orchestrator commits an identifier only after `persist` returns `Ok`,
/// so an implementation must not report success before every file is durable.
pub trait ArtifactSink: Send + Sync {
    /// Folder that holds everything for `folder_name`
    fn vehicle_dir(&self, folder_name: &str) -> ArtifactResult<PathBuf>;

    /// Writes the record files for one vehicle
    ///
    /// # Arguments
    ///
    /// * `record` - The fully assembled vehicle
    ///
    /// # Returns
    ///
    /// * `Ok(ArtifactSummary)` - All files durably written
    /// * `Err(ArtifactError)` - Nothing may be assumed about partial files
    fn persist(&self, record: &VehicleRecord) -> ArtifactResult<ArtifactSummary>;
}
