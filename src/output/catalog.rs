//! Read-side view of persisted vehicles
//!
//! The crawl state decides what "latest" and "recent" mean. Folder
//! modification times are never consulted.

use crate::output::artifacts::{VehicleData, DATA_FILE, IMAGES_DIR, POST_FILE};
use crate::state::{canonical_identifier, StateStore};
use crate::vehicle::SocialPost;
use serde::Serialize;
use std::path::{Path, PathBuf};

const IMAGE_EXTENSIONS: [&str; 4] = ["jpg", "jpeg", "png", "gif"];

/// One persisted vehicle
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CatalogEntry {
    pub folder: String,
    pub data: VehicleData,
    pub post: Option<SocialPost>,

    /// Photo file names, sorted
    pub images: Vec<String>,
}

/// Photo listing for one vehicle
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ImageListing {
    pub ref_no: String,
    pub folder: String,
    pub images: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct Catalog {
    vehicles_dir: PathBuf,
    store: StateStore,
}

impl Catalog {
    pub fn new(vehicles_dir: impl Into<PathBuf>, store: StateStore) -> Self {
        Self {
            vehicles_dir: vehicles_dir.into(),
            store,
        }
    }

    pub fn vehicles_dir(&self) -> &Path {
        &self.vehicles_dir
    }

    /// The vehicle committed last
    pub fn latest(&self) -> Option<CatalogEntry> {
        let state = self.store.load();
        let identifier = state
            .last_identifier
            .or_else(|| state.processed_identifiers.last().cloned())?;
        self.by_ref(&identifier)
    }

    /// Up to `limit` vehicles, most recently committed first
    pub fn recent(&self, limit: usize) -> Vec<CatalogEntry> {
        let state = self.store.load();
        state
            .processed_identifiers
            .iter()
            .rev()
            .filter_map(|id| self.by_ref(id))
            .take(limit)
            .collect()
    }

    /// Looks a vehicle up by reference number
    ///
    /// A folder ending in `_<REF>` wins over one that merely contains the
    /// reference. Matching ignores case.
    pub fn by_ref(&self, ref_no: &str) -> Option<CatalogEntry> {
        let wanted = canonical_identifier(ref_no);
        if wanted.is_empty() {
            return None;
        }

        let folders = self.folders();
        let suffix = format!("_{wanted}");
        let exact = folders
            .iter()
            .filter(|name| name.to_uppercase().ends_with(&suffix) || name.to_uppercase() == wanted);
        let partial = folders
            .iter()
            .filter(|name| name.to_uppercase().contains(&wanted));

        exact
            .chain(partial)
            .find_map(|name| self.load_entry(name))
    }

    /// Photo file names of a vehicle
    pub fn images(&self, ref_no: &str) -> Option<ImageListing> {
        let entry = self.by_ref(ref_no)?;
        Some(ImageListing {
            ref_no: entry.data.ref_no,
            folder: entry.folder,
            images: entry.images,
        })
    }

    /// Path of one photo, if it exists
    ///
    /// `filename` must be a bare file name: separators, `..` and hidden names
    /// are rejected.
    pub fn image_path(&self, ref_no: &str, filename: &str) -> Option<PathBuf> {
        if filename.is_empty() || filename.starts_with('.') || filename.contains(['/', '\\']) {
            tracing::warn!("Rejected image name {:?}", filename);
            return None;
        }

        let entry = self.by_ref(ref_no)?;
        let path = self
            .vehicles_dir
            .join(&entry.folder)
            .join(IMAGES_DIR)
            .join(filename);
        path.is_file().then_some(path)
    }

    fn folders(&self) -> Vec<String> {
        let Ok(entries) = std::fs::read_dir(&self.vehicles_dir) else {
            return Vec::new();
        };

        let mut folders: Vec<String> = entries
            .filter_map(|e| e.ok())
            .filter(|e| e.file_type().map(|t| t.is_dir()).unwrap_or(false))
            .filter_map(|e| e.file_name().into_string().ok())
            .filter(|name| !name.starts_with('.'))
            .collect();
        folders.sort();
        folders
    }

    fn load_entry(&self, folder: &str) -> Option<CatalogEntry> {
        let dir = self.vehicles_dir.join(folder);

        let raw = std::fs::read_to_string(dir.join(DATA_FILE)).ok()?;
        let data: VehicleData = match serde_json::from_str(&raw) {
            Ok(data) => data,
            Err(e) => {
                tracing::warn!(folder, "Unreadable {}: {}", DATA_FILE, e);
                return None;
            }
        };

        let post = std::fs::read_to_string(dir.join(POST_FILE))
            .ok()
            .and_then(|raw| serde_json::from_str(&raw).ok());

        Some(CatalogEntry {
            folder: folder.to_string(),
            data,
            post,
            images: list_images(&dir.join(IMAGES_DIR)),
        })
    }
}

fn list_images(dir: &Path) -> Vec<String> {
    let Ok(entries) = std::fs::read_dir(dir) else {
        return Vec::new();
    };

    let mut images: Vec<String> = entries
        .filter_map(|e| e.ok())
        .filter_map(|e| e.file_name().into_string().ok())
        .filter(|name| {
            Path::new(name)
                .extension()
                .and_then(|ext| ext.to_str())
                .map(|ext| IMAGE_EXTENSIONS.contains(&ext.to_lowercase().as_str()))
                .unwrap_or(false)
        })
        .collect();
    images.sort();
    images
}
