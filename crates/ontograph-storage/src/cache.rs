//! Per-project local cache.
//!
//! A key/value store of JSON documents addressed by [`CacheKey`]. Entries are
//! kept in memory and, when the cache is opened on a directory, mirrored to
//! one file per key. File writes go through a temp file and a rename so a
//! reader never observes a half-written entry.

use crate::key::CacheKey;
use crate::StorageError;
use parking_lot::RwLock;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

pub struct LocalCache {
    root: Option<PathBuf>,
    entries: RwLock<HashMap<CacheKey, serde_json::Value>>,
    writes: AtomicU64,
}

impl LocalCache {
    pub fn in_memory() -> Self {
        Self {
            root: None,
            entries: RwLock::new(HashMap::new()),
            writes: AtomicU64::new(0),
        }
    }

    /// Open (creating if needed) a cache directory.
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self, StorageError> {
        let root = dir.into();
        std::fs::create_dir_all(&root).map_err(|e| StorageError::io(&root, e))?;
        Ok(Self {
            root: Some(root),
            entries: RwLock::new(HashMap::new()),
            writes: AtomicU64::new(0),
        })
    }

    pub fn root(&self) -> Option<&Path> {
        self.root.as_deref()
    }

    fn path_for(&self, key: &CacheKey) -> Option<PathBuf> {
        self.root.as_ref().map(|root| root.join(key.storage_name()))
    }

    /// Raw JSON of an entry, loading it from disk on first access.
    pub fn get_raw(&self, key: &CacheKey) -> Result<Option<serde_json::Value>, StorageError> {
        if let Some(value) = self.entries.read().get(key) {
            return Ok(Some(value.clone()));
        }
        let Some(path) = self.path_for(key) else {
            return Ok(None);
        };
        if !path.exists() {
            return Ok(None);
        }
        let contents = std::fs::read_to_string(&path).map_err(|e| StorageError::io(&path, e))?;
        let value: serde_json::Value = serde_json::from_str(&contents)?;
        self.entries.write().insert(key.clone(), value.clone());
        Ok(Some(value))
    }

    pub fn get<T: DeserializeOwned>(&self, key: &CacheKey) -> Result<Option<T>, StorageError> {
        match self.get_raw(key)? {
            Some(value) => Ok(Some(serde_json::from_value(value)?)),
            None => Ok(None),
        }
    }

    pub fn put<T: Serialize>(&self, key: &CacheKey, value: &T) -> Result<(), StorageError> {
        let value = serde_json::to_value(value)?;
        let mut entries = self.entries.write();
        if let Some(path) = self.path_for(key) {
            let tmp = path.with_extension("json.tmp");
            let json = serde_json::to_string_pretty(&value)?;
            std::fs::write(&tmp, json).map_err(|e| StorageError::io(&tmp, e))?;
            std::fs::rename(&tmp, &path).map_err(|e| StorageError::io(&path, e))?;
        }
        entries.insert(key.clone(), value);
        self.writes.fetch_add(1, Ordering::SeqCst);
        tracing::trace!(key = %key, "cache entry written");
        Ok(())
    }

    /// Returns whether an entry existed.
    pub fn remove(&self, key: &CacheKey) -> Result<bool, StorageError> {
        let mut entries = self.entries.write();
        let mut existed = entries.remove(key).is_some();
        if let Some(path) = self.path_for(key) {
            if path.exists() {
                std::fs::remove_file(&path).map_err(|e| StorageError::io(&path, e))?;
                existed = true;
            }
        }
        Ok(existed)
    }

    /// Number of successful `put`s since this handle was created.
    pub fn write_count(&self) -> u64 {
        self.writes.load(Ordering::SeqCst)
    }

    /// File names of the on-disk entries, sorted.
    pub fn list_files(&self) -> Result<Vec<String>, StorageError> {
        let Some(root) = &self.root else {
            return Ok(Vec::new());
        };
        let mut names = Vec::new();
        for entry in std::fs::read_dir(root).map_err(|e| StorageError::io(root, e))? {
            let entry = entry.map_err(|e| StorageError::io(root, e))?;
            let name = entry.file_name().to_string_lossy().to_string();
            if name.ends_with(".json") {
                names.push(name);
            }
        }
        names.sort();
        Ok(names)
    }
}
