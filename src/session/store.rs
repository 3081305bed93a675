//! Key-value stores that keep session state across process restarts.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{AppError, AppResult};

pub trait StateStore: Send {
    fn get(&self, key: &str) -> Option<Value>;
    fn set(&mut self, key: &str, value: Value) -> AppResult<()>;
}

/// Process-local store. Clones share the same map, which lets a test hand
/// one clone to a controller and inspect the other.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    values: Arc<Mutex<BTreeMap<String, Value>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl StateStore for MemoryStore {
    fn get(&self, key: &str) -> Option<Value> {
        self.values
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .cloned()
    }

    fn set(&mut self, key: &str, value: Value) -> AppResult<()> {
        self.values
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key.to_string(), value);
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct StoreFile {
    version: u32,
    #[serde(default)]
    values: BTreeMap<String, Value>,
}

impl Default for StoreFile {
    fn default() -> Self {
        Self {
            version: 1,
            values: BTreeMap::new(),
        }
    }
}

/// JSON file store rewritten atomically (temp file + rename) on every change.
///
/// ```json
/// { "version": 1, "values": { "search.page": 3, "search.query": "beef" } }
/// ```
#[derive(Debug)]
pub struct JsonFileStore {
    path: PathBuf,
    data: StoreFile,
}

impl JsonFileStore {
    /// Opens `path`, creating parent directories as needed.
    ///
    /// A file that cannot be parsed is treated as empty and replaced on the
    /// next write; restoration is best effort.
    pub fn open(path: impl Into<PathBuf>) -> AppResult<Self> {
        let path = path.into();
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent).map_err(|source| {
                AppError::io_with_context(
                    source,
                    format!("failed to create state directory: {}", parent.display()),
                )
            })?;
        }

        let data = if path.exists() {
            let raw = fs::read_to_string(&path).map_err(|source| {
                AppError::io_with_context(
                    source,
                    format!("failed to read state file: {}", path.display()),
                )
            })?;
            match serde_json::from_str::<StoreFile>(&raw) {
                Ok(data) => data,
                Err(err) => {
                    tracing::warn!(path = %path.display(), error = %err, "discarding unreadable state file");
                    StoreFile::default()
                }
            }
        } else {
            StoreFile::default()
        };

        tracing::debug!(path = %path.display(), keys = data.values.len(), "opened state file");
        Ok(Self { path, data })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn flush(&self) -> AppResult<()> {
        let encoded = serde_json::to_vec_pretty(&self.data)
            .map_err(|err| AppError::internal(format!("failed to encode state: {err}")))?;
        let mut tmp = self.path.clone().into_os_string();
        tmp.push(".tmp");
        let tmp = PathBuf::from(tmp);

        fs::write(&tmp, encoded).map_err(|source| {
            AppError::io_with_context(source, format!("failed to write {}", tmp.display()))
        })?;
        fs::rename(&tmp, &self.path).map_err(|source| {
            AppError::io_with_context(
                source,
                format!("failed to replace state file: {}", self.path.display()),
            )
        })
    }
}

impl StateStore for JsonFileStore {
    fn get(&self, key: &str) -> Option<Value> {
        self.data.values.get(key).cloned()
    }

    fn set(&mut self, key: &str, value: Value) -> AppResult<()> {
        if self.data.values.get(key) == Some(&value) {
            return Ok(());
        }
        self.data.values.insert(key.to_string(), value);
        self.flush()
    }
}
