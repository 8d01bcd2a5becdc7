//! Persistent key-value storage for the authentication entry.
//!
//! `MemoryStorage` keeps entries for the life of the process (and is cheap to
//! clone, so a test can hold a handle onto the same map the token manager
//! writes). `FileStorage` persists a flat JSON object on disk and rewrites it
//! on every mutation.

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::rc::Rc;

use crate::error::ApiError;

/// Synchronous string key-value store.
pub trait Storage {
    fn get(&self, key: &str) -> Result<Option<String>, ApiError>;
    fn set(&self, key: &str, value: &str) -> Result<(), ApiError>;
    fn remove(&self, key: &str) -> Result<(), ApiError>;
}

#[derive(Debug, Clone, Default)]
pub struct MemoryStorage {
    entries: Rc<RefCell<BTreeMap<String, String>>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Storage for MemoryStorage {
    fn get(&self, key: &str) -> Result<Option<String>, ApiError> {
        Ok(self.entries.borrow().get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<(), ApiError> {
        self.entries
            .borrow_mut()
            .insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), ApiError> {
        self.entries.borrow_mut().remove(key);
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct FileStorage {
    path: PathBuf,
}

impl FileStorage {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn load(&self) -> Result<BTreeMap<String, String>, ApiError> {
        if !self.path.exists() {
            return Ok(BTreeMap::new());
        }
        let raw = fs::read_to_string(&self.path).map_err(|e| ApiError::Storage(e.to_string()))?;
        if raw.trim().is_empty() {
            return Ok(BTreeMap::new());
        }
        serde_json::from_str(&raw).map_err(|e| ApiError::Storage(e.to_string()))
    }

    fn save(&self, entries: &BTreeMap<String, String>) -> Result<(), ApiError> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).map_err(|e| ApiError::Storage(e.to_string()))?;
            }
        }
        let raw = serde_json::to_string_pretty(entries)
            .map_err(|e| ApiError::SerializationError(e.to_string()))?;
        fs::write(&self.path, raw).map_err(|e| ApiError::Storage(e.to_string()))
    }
}

impl Storage for FileStorage {
    fn get(&self, key: &str) -> Result<Option<String>, ApiError> {
        Ok(self.load()?.remove(key))
    }

    fn set(&self, key: &str, value: &str) -> Result<(), ApiError> {
        let mut entries = self.load()?;
        entries.insert(key.to_string(), value.to_string());
        self.save(&entries)
    }

    fn remove(&self, key: &str) -> Result<(), ApiError> {
        let mut entries = self.load()?;
        if entries.remove(key).is_some() {
            self.save(&entries)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn memory_storage_clones_share_entries() {
        let storage = MemoryStorage::new();
        let handle = storage.clone();
        storage.set("jwt", "{}").unwrap();
        assert_eq!(handle.get("jwt").unwrap().as_deref(), Some("{}"));
        handle.remove("jwt").unwrap();
        assert!(storage.get("jwt").unwrap().is_none());
    }

    #[test]
    fn file_storage_persists_across_instances() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("storage.json");

        FileStorage::new(&path).set("jwt", r#"{"token":"a.b.c"}"#).unwrap();
        let reopened = FileStorage::new(&path);
        assert_eq!(
            reopened.get("jwt").unwrap().as_deref(),
            Some(r#"{"token":"a.b.c"}"#)
        );

        reopened.remove("jwt").unwrap();
        assert!(FileStorage::new(&path).get("jwt").unwrap().is_none());
    }

    #[test]
    fn file_storage_missing_file_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let storage = FileStorage::new(dir.path().join("absent.json"));
        assert!(storage.get("jwt").unwrap().is_none());
        storage.remove("jwt").unwrap();
        assert!(!storage.path().exists());
    }

    #[test]
    fn file_storage_rejects_corrupt_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("storage.json");
        fs::write(&path, "not json").unwrap();
        let err = FileStorage::new(&path).get("jwt").unwrap_err();
        assert!(matches!(err, ApiError::Storage(_)));
    }
}
