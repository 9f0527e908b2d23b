//! Single-run guard
//!
//! An advisory lock on `<state file>.lock` held from the daily check to the
//! final commit. A second invocation against the same state file fails fast
//! instead of scraping the same vehicle twice.

use crate::state::StateError;
use fd_lock::{RwLock, RwLockWriteGuard};
use std::fs::{File, OpenOptions};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

/// Exclusive lock shared by every process using one state file
pub struct RunLock {
    path: PathBuf,
    lock: RwLock<File>,
}

impl RunLock {
    /// Opens (creating if needed) the lock file that sits next to `state_path`
    pub fn open(state_path: &Path) -> Result<Self, StateError> {
        if let Some(parent) = state_path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let path = state_path.with_extension("lock");
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&path)?;

        Ok(Self {
            path,
            lock: RwLock::new(file),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Takes the lock without blocking; released when the guard drops
    pub fn try_acquire(&mut self) -> Result<RwLockWriteGuard<'_, File>, StateError> {
        self.lock.try_write().map_err(|e| {
            if e.kind() == ErrorKind::WouldBlock {
                StateError::Busy
            } else {
                StateError::Io(e)
            }
        })
    }
}
