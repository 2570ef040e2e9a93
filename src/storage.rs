//! Durable key/value storage for settings and queue snapshots.
//!
//! The library never touches the file system behind the caller's back: both
//! [`crate::settings::SettingsStore`] and [`crate::queue::JobQueue`] take an
//! `Arc<dyn KeyValueStore>` and read/write whole JSON blobs through it. Two
//! implementations ship with the crate:
//!
//! * [`MemoryStore`] — process-local, used by tests and embedders that
//!   persist elsewhere;
//! * [`FileStore`] — one `<key>.json` file per record in a directory, written
//!   atomically (temp file + rename) so a crash mid-write never leaves a
//!   truncated record behind.

use crate::error::Pdf2MdError;
use serde_json::Value;
use std::collections::HashMap;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::debug;

/// Get/set/remove of JSON-serialisable blobs by key.
pub trait KeyValueStore: Send + Sync {
    /// Read a record; `Ok(None)` when the key has never been written.
    fn get(&self, key: &str) -> Result<Option<Value>, Pdf2MdError>;

    /// Replace a record.
    fn set(&self, key: &str, value: &Value) -> Result<(), Pdf2MdError>;

    /// Delete a record. Removing a missing key is not an error.
    fn remove(&self, key: &str) -> Result<(), Pdf2MdError>;
}

/// In-memory store.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<String, Value>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether a record exists under `key`.
    pub fn contains(&self, key: &str) -> bool {
        self.entries
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .contains_key(key)
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<Value>, Pdf2MdError> {
        Ok(self
            .entries
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(key)
            .cloned())
    }

    fn set(&self, key: &str, value: &Value) -> Result<(), Pdf2MdError> {
        self.entries
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(key.to_string(), value.clone());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), Pdf2MdError> {
        self.entries
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(key);
        Ok(())
    }
}

/// Directory-backed store: each key lives in `<dir>/<key>.json`.
#[derive(Debug, Clone)]
pub struct FileStore {
    dir: PathBuf,
}

impl FileStore {
    /// Create a store rooted at `dir`. The directory is created lazily on
    /// the first write.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, key: &str) -> PathBuf {
        let safe: String = key
            .chars()
            .map(|c| {
                if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                    c
                } else {
                    '_'
                }
            })
            .collect();
        self.dir.join(format!("{safe}.json"))
    }
}

fn storage_error(key: &str, detail: impl ToString) -> Pdf2MdError {
    Pdf2MdError::Storage {
        key: key.to_string(),
        detail: detail.to_string(),
    }
}

impl KeyValueStore for FileStore {
    fn get(&self, key: &str) -> Result<Option<Value>, Pdf2MdError> {
        let path = self.path_for(key);
        let text = match std::fs::read_to_string(&path) {
            Ok(text) => text,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(storage_error(key, e)),
        };
        serde_json::from_str(&text)
            .map(Some)
            .map_err(|e| storage_error(key, format!("corrupt record {}: {e}", path.display())))
    }

    fn set(&self, key: &str, value: &Value) -> Result<(), Pdf2MdError> {
        std::fs::create_dir_all(&self.dir).map_err(|e| storage_error(key, e))?;
        let path = self.path_for(key);

        let mut tmp =
            tempfile::NamedTempFile::new_in(&self.dir).map_err(|e| storage_error(key, e))?;
        serde_json::to_writer_pretty(&mut tmp, value).map_err(|e| storage_error(key, e))?;
        tmp.flush().map_err(|e| storage_error(key, e))?;
        tmp.persist(&path)
            .map_err(|e| storage_error(key, e.error))?;

        debug!("Wrote {}", path.display());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), Pdf2MdError> {
        match std::fs::remove_file(self.path_for(key)) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(storage_error(key, e)),
        }
    }
}
