//! Filesystem artifact writer
//!
//! Each vehicle gets one folder under the vehicles directory:
//!
//! ```text
//! <vehicles_dir>/<folder_name>/
//!     data.json        specification record
//!     facebook.json    post-ready content
//!     metadata.txt     human readable summary
//!     images/          photos
//! ```

use crate::output::traits::{ArtifactError, ArtifactResult, ArtifactSink, ArtifactSummary};
use crate::vehicle::{VehicleRecord, VehicleSpecs, SPEC_SCHEMA_VERSION};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::io::Write;
use std::path::{Path, PathBuf};

pub const DATA_FILE: &str = "data.json";
pub const POST_FILE: &str = "facebook.json";
pub const METADATA_FILE: &str = "metadata.txt";
pub const IMAGES_DIR: &str = "images";

/// Contents of `data.json`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VehicleData {
    #[serde(default)]
    pub spec_schema_version: u32,
    pub title: String,
    pub ref_no: String,
    pub detail_url: String,
    pub folder_name: String,
    pub scraped_at: DateTime<Utc>,
    #[serde(default)]
    pub specs: VehicleSpecs,
    #[serde(default)]
    pub price: Option<String>,
    #[serde(default)]
    pub image_count: usize,
    #[serde(default)]
    pub image_folder: String,
}

impl VehicleData {
    pub fn from_record(record: &VehicleRecord, vehicle_dir: &Path, scraped_at: DateTime<Utc>) -> Self {
        Self {
            spec_schema_version: SPEC_SCHEMA_VERSION,
            title: record.detail.title.clone(),
            ref_no: record.identifier.clone(),
            detail_url: record.detail.detail_url.to_string(),
            folder_name: record.folder_name.clone(),
            scraped_at,
            specs: record.detail.specs.clone(),
            price: record.detail.price.clone(),
            image_count: record.images.len(),
            image_folder: vehicle_dir.join(IMAGES_DIR).display().to_string(),
        }
    }
}

/// Rejects folder names that would escape the vehicles directory
pub(crate) fn check_folder_name(folder_name: &str) -> ArtifactResult<()> {
    let valid = !folder_name.is_empty()
        && !folder_name.starts_with('.')
        && !folder_name.contains(['/', '\\']);
    if valid {
        Ok(())
    } else {
        Err(ArtifactError::InvalidFolder(folder_name.to_string()))
    }
}

/// Writes `bytes` to `path` through a synced temp file in the same directory
fn write_atomic(path: &Path, bytes: &[u8]) -> ArtifactResult<()> {
    let parent = path.parent().unwrap_or_else(|| Path::new("."));
    let mut temp_file = tempfile::NamedTempFile::new_in(parent)?;
    temp_file.write_all(bytes)?;
    temp_file.flush()?;
    temp_file.as_file().sync_all()?;
    temp_file.persist(path).map_err(|e| ArtifactError::Io(e.error))?;
    Ok(())
}

fn metadata_text(data: &VehicleData) -> String {
    format!(
        "Scraped at: {}\nRef No: {}\nTitle: {}\nURL: {}\nImage count: {}\nFolder: {}\n",
        data.scraped_at.to_rfc3339(),
        data.ref_no,
        data.title,
        data.detail_url,
        data.image_count,
        data.folder_name,
    )
}

/// Artifact sink writing JSON and text files to disk
#[derive(Debug, Clone)]
pub struct FsArtifactWriter {
    root: PathBuf,
}

impl FsArtifactWriter {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

impl ArtifactSink for FsArtifactWriter {
    fn vehicle_dir(&self, folder_name: &str) -> ArtifactResult<PathBuf> {
        check_folder_name(folder_name)?;
        Ok(self.root.join(folder_name))
    }

    fn persist(&self, record: &VehicleRecord) -> ArtifactResult<ArtifactSummary> {
        let folder = self.vehicle_dir(&record.folder_name)?;
        std::fs::create_dir_all(&folder)?;

        let data = VehicleData::from_record(record, &folder, Utc::now());

        let data_path = folder.join(DATA_FILE);
        write_atomic(&data_path, serde_json::to_string_pretty(&data)?.as_bytes())?;

        let post_path = folder.join(POST_FILE);
        write_atomic(&post_path, serde_json::to_string_pretty(&record.post)?.as_bytes())?;

        let metadata_path = folder.join(METADATA_FILE);
        write_atomic(&metadata_path, metadata_text(&data).as_bytes())?;

        if let Ok(dir) = std::fs::File::open(&folder) {
            let _ = dir.sync_all();
        }

        tracing::info!(
            folder = %folder.display(),
            images = record.images.len(),
            "Saved vehicle artifacts"
        );

        Ok(ArtifactSummary {
            folder,
            files: vec![data_path, post_path, metadata_path],
            image_count: record.images.len(),
        })
    }
}
