//! File-backed last-run store.

use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use cloudsoc_core::LastRun;
use tempfile::NamedTempFile;
use tracing::{debug, info};

use crate::StoreError;

/// Last-run state persisted as a single JSON document.
///
/// The host reads it once before a cycle and writes it once after the
/// cycle's records were delivered. Writes go to a temporary file in the
/// same directory that is then renamed over the old one, so a crash
/// mid-write leaves the previous state intact.
pub struct StateStore {
    path: PathBuf,
}

impl StateStore {
    pub fn open(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the last-run map. A missing or empty file is an empty map.
    pub fn load(&self) -> Result<LastRun, StoreError> {
        let text = match std::fs::read_to_string(&self.path) {
            Ok(text) => text,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!(path = %self.path.display(), "no state file, starting fresh");
                return Ok(LastRun::default());
            }
            Err(e) => return Err(e.into()),
        };
        if text.trim().is_empty() {
            return Ok(LastRun::default());
        }
        let last_run: LastRun =
            serde_json::from_str(&text).map_err(|source| StoreError::Corrupt {
                path: self.path.clone(),
                source,
            })?;
        info!(path = %self.path.display(), categories = last_run.len(), "loaded state");
        Ok(last_run)
    }

    /// Atomically replace the stored map.
    pub fn save(&self, last_run: &LastRun) -> Result<(), StoreError> {
        let dir = match self.path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p,
            _ => Path::new("."),
        };
        std::fs::create_dir_all(dir)?;

        let mut tmp = NamedTempFile::new_in(dir)?;
        serde_json::to_writer_pretty(&mut tmp, last_run)?;
        tmp.write_all(b"\n")?;
        tmp.as_file().sync_all()?;
        tmp.persist(&self.path)?;

        info!(path = %self.path.display(), categories = last_run.len(), "saved state");
        Ok(())
    }
}
