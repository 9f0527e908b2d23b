//! Vehicles already handed to the posting webhook
//!
//! A second durable set next to the crawl state. The crawl state answers
//! "which vehicle comes next", this one answers "has the latest vehicle been
//! sent out for posting yet".

use crate::state::crawl_state::canonical_identifier;
use crate::state::StateError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::{debug, warn};

#[derive(Debug, Default, Serialize, Deserialize)]
struct PostedFile {
    #[serde(default)]
    posted_vehicles: BTreeSet<String>,
}

/// File-backed set of posted reference numbers
#[derive(Debug)]
pub struct PostedLedger {
    path: PathBuf,
    guard: Mutex<()>,
}

impl PostedLedger {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            guard: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Posted references, canonical; a missing or unreadable file is empty
    pub fn load(&self) -> BTreeSet<String> {
        let contents = match std::fs::read_to_string(&self.path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return BTreeSet::new(),
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "Could not read posted ledger");
                return BTreeSet::new();
            }
        };

        match serde_json::from_str::<PostedFile>(&contents) {
            Ok(file) => file
                .posted_vehicles
                .iter()
                .map(|r| canonical_identifier(r))
                .filter(|r| !r.is_empty())
                .collect(),
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "Malformed posted ledger, treating as empty");
                BTreeSet::new()
            }
        }
    }

    pub fn is_posted(&self, ref_no: &str) -> bool {
        self.load().contains(&canonical_identifier(ref_no))
    }

    /// Marks `ref_no` as posted
    ///
    /// # Returns
    ///
    /// * `Ok(true)` - Newly marked; the caller should post it
    /// * `Ok(false)` - Already posted earlier
    /// * `Err(StateError)` - The ledger could not be written
    pub fn claim(&self, ref_no: &str) -> Result<bool, StateError> {
        let _guard = match self.guard.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };

        let mut posted = self.load();
        if !posted.insert(canonical_identifier(ref_no)) {
            return Ok(false);
        }
        self.save(&PostedFile {
            posted_vehicles: posted,
        })?;
        Ok(true)
    }

    fn save(&self, file: &PostedFile) -> Result<(), StateError> {
        let parent = match self.path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
            _ => PathBuf::from("."),
        };
        std::fs::create_dir_all(&parent)?;

        let json = serde_json::to_string_pretty(file)?;
        let mut temp_file = tempfile::NamedTempFile::new_in(&parent)?;
        temp_file.write_all(json.as_bytes())?;
        temp_file.flush()?;
        temp_file.as_file().sync_all()?;
        temp_file
            .persist(&self.path)
            .map_err(|e| StateError::Io(e.error))?;

        debug!(path = %self.path.display(), "Posted ledger saved");
        Ok(())
    }
}
