//! Filesystem area for artifacts and raster images.
use crate::error::{ProcessFileError, Result};
use crate::utils;
use dashmap::DashMap;
use parking_lot::Mutex;
use std::fs;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, warn};

#[derive(Debug, Clone)]
pub struct DocumentStore {
    root: PathBuf,
}

impl DocumentStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Absolute location of a stored path. Escaping the root is refused.
    pub fn resolve(&self, relative: &str) -> Result<PathBuf> {
        let path = Path::new(relative);
        let escapes = path
            .components()
            .any(|c| !matches!(c, Component::Normal(_) | Component::CurDir));
        if relative.is_empty() || escapes {
            return Err(ProcessFileError::Io(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                format!("stored path {relative:?} leaves the document root"),
            )));
        }
        Ok(self.root.join(path))
    }

    pub fn exists(&self, relative: &str) -> bool {
        self.resolve(relative).is_ok_and(|p| p.is_file())
    }

    pub fn read(&self, relative: &str) -> Result<Vec<u8>> {
        Ok(fs::read(self.resolve(relative)?)?)
    }

    /// Writes through a temporary sibling and renames it into place, so
    /// readers see either the old or the new content. Returns the size.
    pub fn write(&self, relative: &str, bytes: &[u8]) -> Result<u64> {
        let target = self.resolve(relative)?;
        let dir = target
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| self.root.clone());
        fs::create_dir_all(&dir)?;
        let name = target
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let temp = dir.join(utils::temp_file_name(&name));
        fs::write(&temp, bytes)?;
        if let Err(err) = fs::rename(&temp, &target) {
            let _ = fs::remove_file(&temp);
            return Err(err.into());
        }
        Ok(bytes.len() as u64)
    }

    /// Deletes a stored file. A file that is already gone is not an error.
    pub fn remove(&self, relative: &str) -> Result<()> {
        match fs::remove_file(self.resolve(relative)?) {
            Err(err) if err.kind() != std::io::ErrorKind::NotFound => Err(err.into()),
            _ => Ok(()),
        }
    }

    /// Removes a file written for a record that was never committed.
    /// Failure only leaves an orphan behind, so it is logged.
    pub fn discard(&self, relative: &str) {
        match self.remove(relative) {
            Ok(()) => debug!(path = relative, "discarded uncommitted file"),
            Err(err) => warn!(path = relative, error = %err, "uncommitted file left behind"),
        }
    }
}

/// One mutex per file id serializing writes to that file's artifact.
#[derive(Debug, Clone, Default)]
pub struct ArtifactLocks {
    locks: Arc<DashMap<u64, Arc<Mutex<()>>>>,
}

impl ArtifactLocks {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn for_file(&self, file_id: u64) -> Arc<Mutex<()>> {
        self.locks.entry(file_id).or_default().clone()
    }
}
