//! Flat JSON file backend.
//!
//! The record is written to a sibling temp file and renamed over the target,
//! so a crash mid-write leaves the previous record intact.

use std::fs::{create_dir_all, rename, File};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use crate::core::{ProgressBackend, ProgressRecord, StoreError};

/// Progress backend persisting to a single JSON file.
#[derive(Debug, Clone)]
pub struct JsonFileBackend {
    path: PathBuf,
}

impl JsonFileBackend {
    /// Backend for the file at `path`. Nothing is touched until the first
    /// read or write.
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    /// Target file path.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_else(|| "progress.json".into());
        name.push(".tmp");
        self.path.with_file_name(name)
    }

    fn io_error(&self, source: std::io::Error) -> StoreError {
        StoreError::Io {
            path: self.path.clone(),
            source,
        }
    }
}

impl ProgressBackend for JsonFileBackend {
    fn read(&self) -> Result<Option<ProgressRecord>, StoreError> {
        let bytes = match std::fs::read(&self.path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(self.io_error(e)),
        };
        serde_json::from_slice(&bytes)
            .map(Some)
            .map_err(|e| StoreError::Corrupt {
                path: self.path.clone(),
                message: e.to_string(),
            })
    }

    fn write(&mut self, record: &ProgressRecord) -> Result<(), StoreError> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            create_dir_all(parent).map_err(|e| self.io_error(e))?;
        }
        let json = serde_json::to_vec_pretty(record)?;
        let tmp = self.temp_path();
        let mut file = File::create(&tmp).map_err(|e| self.io_error(e))?;
        file.write_all(&json).map_err(|e| self.io_error(e))?;
        file.sync_all().map_err(|e| self.io_error(e))?;
        drop(file);
        rename(&tmp, &self.path).map_err(|e| self.io_error(e))
    }

    fn location(&self) -> String {
        self.path.display().to_string()
    }
}
