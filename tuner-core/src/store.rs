//! # Store Module
//!
//! The key-value text store the tuning collections are persisted to.
//!
//! - `FileStore`: one `<key>.json` file per key inside a directory
//! - `MemoryStore`: in-process map, for tests and throwaway sessions

use std::collections::HashMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};
use tracing::debug;

use crate::error::StoreError;

/// Text storage addressed by key. Implementations must be usable from the
/// background persistence thread.
pub trait KeyValueStore: Send + Sync {
    /// The stored text, or `None` if nothing was ever written under `key`.
    fn read(&self, key: &str) -> Option<String>;

    /// Replaces the text stored under `key`.
    fn write(&self, key: &str, text: &str) -> Result<(), StoreError>;
}

/// Stores each key as a JSON file in a directory.
#[derive(Debug, Clone)]
pub struct FileStore {
    dir: PathBuf,
}

impl FileStore {
    /// Uses `dir`, creating it if needed.
    pub fn new(dir: impl Into<PathBuf>) -> std::io::Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{}.json", key))
    }
}

impl KeyValueStore for FileStore {
    fn read(&self, key: &str) -> Option<String> {
        fs::read_to_string(self.path_for(key)).ok()
    }

    /// Writes to a temporary file first and renames it over the old one, so
    /// an interrupted write never leaves a truncated file behind.
    fn write(&self, key: &str, text: &str) -> Result<(), StoreError> {
        let path = self.path_for(key);
        let tmp = path.with_extension("json.tmp");
        let to_store_error = |e: std::io::Error| StoreError {
            key: key.to_string(),
            reason: e.to_string(),
        };

        let mut file = fs::File::create(&tmp).map_err(to_store_error)?;
        file.write_all(text.as_bytes()).map_err(to_store_error)?;
        file.sync_all().map_err(to_store_error)?;
        fs::rename(&tmp, &path).map_err(to_store_error)?;
        debug!("Wrote {} bytes to {}", text.len(), path.display());
        Ok(())
    }
}

/// Keeps everything in memory.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pre-populates `key`, e.g. with data from an earlier session.
    pub fn with_entry(self, key: &str, text: &str) -> Self {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key.to_string(), text.to_string());
        self
    }
}

impl KeyValueStore for MemoryStore {
    fn read(&self, key: &str) -> Option<String> {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .cloned()
    }

    fn write(&self, key: &str, text: &str) -> Result<(), StoreError> {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key.to_string(), text.to_string());
        Ok(())
    }
}
