//! Persistence for settings bundles.
//!
//! Every registered setting owns exactly one record in an [`OptionStore`],
//! keyed by the setting identifier. The record is opaque to the store: it is
//! usually a JSON object mapping field names to sanitized values, with `multi`
//! fields held as JSON-encoded strings.

use std::collections::HashMap;
use std::fs;

use camino::{Utf8Path, Utf8PathBuf};
use serde_json::{Map, Value};

use crate::error::StoreError;

/// A key-value store holding one record per setting identifier.
pub trait OptionStore {
    /// Returns the record stored under `key`, if any.
    fn get(&self, key: &str) -> Result<Option<Value>, StoreError>;

    /// Replaces the record stored under `key`.
    fn set(&mut self, key: &str, value: Value) -> Result<(), StoreError>;

    /// Checks whether a record exists under `key`.
    fn exists(&self, key: &str) -> Result<bool, StoreError> {
        Ok(self.get(key)?.is_some())
    }
}

/// An in-memory store, useful for tests and for short-lived request scopes.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    records: HashMap<String, Value>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl OptionStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<Value>, StoreError> {
        Ok(self.records.get(key).cloned())
    }

    fn set(&mut self, key: &str, value: Value) -> Result<(), StoreError> {
        self.records.insert(key.to_string(), value);
        Ok(())
    }

    fn exists(&self, key: &str) -> Result<bool, StoreError> {
        Ok(self.records.contains_key(key))
    }
}

/// A store persisted as a single JSON document on disk.
///
/// The whole document is loaded on [`FileStore::open`] and rewritten on every
/// [`OptionStore::set`].
#[derive(Debug)]
pub struct FileStore {
    path: Utf8PathBuf,
    records: Map<String, Value>,
}

impl FileStore {
    /// Opens the store at `path`, starting empty when the file doesn't exist.
    pub fn open(path: impl Into<Utf8PathBuf>) -> Result<Self, StoreError> {
        let path = path.into();

        let records = match fs::read_to_string(&path) {
            Ok(text) if text.trim().is_empty() => Map::new(),
            Ok(text) => match serde_json::from_str(&text)? {
                Value::Object(map) => map,
                _ => return Err(StoreError::Malformed(path)),
            },
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Map::new(),
            Err(err) => return Err(err.into()),
        };

        tracing::debug!("opened option store {} with {} records", path, records.len());

        Ok(Self { path, records })
    }

    pub fn path(&self) -> &Utf8Path {
        &self.path
    }

    fn flush(&self) -> Result<(), StoreError> {
        if let Some(dir) = self.path.parent() {
            if !dir.as_str().is_empty() {
                fs::create_dir_all(dir)?;
            }
        }

        let text = serde_json::to_string_pretty(&self.records)?;
        fs::write(&self.path, text)?;

        Ok(())
    }
}

impl OptionStore for FileStore {
    fn get(&self, key: &str) -> Result<Option<Value>, StoreError> {
        Ok(self.records.get(key).cloned())
    }

    fn set(&mut self, key: &str, value: Value) -> Result<(), StoreError> {
        self.records.insert(key.to_string(), value);
        self.flush()
    }

    fn exists(&self, key: &str) -> Result<bool, StoreError> {
        Ok(self.records.contains_key(key))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_memory_store() {
        let mut store = MemoryStore::new();
        assert!(!store.exists("theme").unwrap());
        assert_eq!(store.get("theme").unwrap(), None);

        store.set("theme", json!({ "color": "red" })).unwrap();
        assert!(store.exists("theme").unwrap());
        assert_eq!(store.get("theme").unwrap(), Some(json!({ "color": "red" })));
    }

    #[test]
    fn test_file_store_persists() {
        let dir = tempfile::tempdir().unwrap();
        let path = Utf8PathBuf::from_path_buf(dir.path().join("nested/options.json")).unwrap();

        let mut store = FileStore::open(&path).unwrap();
        store.set("theme", json!({ "color": "red" })).unwrap();

        let reopened = FileStore::open(&path).unwrap();
        assert!(reopened.exists("theme").unwrap());
        assert_eq!(
            reopened.get("theme").unwrap(),
            Some(json!({ "color": "red" }))
        );
    }

    #[test]
    fn test_file_store_rejects_non_object() {
        let dir = tempfile::tempdir().unwrap();
        let path = Utf8PathBuf::from_path_buf(dir.path().join("options.json")).unwrap();
        fs::write(&path, "[1, 2, 3]").unwrap();

        assert!(matches!(
            FileStore::open(&path),
            Err(StoreError::Malformed(_))
        ));
    }
}
