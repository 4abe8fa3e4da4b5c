//! Persisted-record store contract and the bundled implementations.
//!
//! The engine depends only on the narrow [`HighlightStore`] trait, keyed by
//! normalized document URL. Writes are whole-collection read-modify-write;
//! last-writer-wins is the accepted semantics for this single-user workload.

use crate::record::HighlightRecord;
use std::collections::HashMap;
use std::fmt;
use std::fs;
use std::io;
use std::path::PathBuf;

/// Errors surfaced by a store implementation.
#[derive(Debug)]
pub enum StoreError {
    /// Reading or writing the backing file failed.
    Io(io::Error),
    /// The stored payload could not be encoded or decoded.
    Encoding(serde_json::Error),
    /// The backend rejected the operation.
    Unavailable(String),
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Io(err) => write!(f, "store file access failed: {err}"),
            Self::Encoding(err) => write!(f, "store payload could not be (de)serialized: {err}"),
            Self::Unavailable(reason) => write!(f, "store unavailable: {reason}"),
        }
    }
}

impl std::error::Error for StoreError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(err) => Some(err),
            Self::Encoding(err) => Some(err),
            Self::Unavailable(_) => None,
        }
    }
}

/// Ordered collection store for highlight records, keyed by document.
///
/// `get` on an unknown key yields an empty collection rather than an error;
/// callers cannot distinguish "never written" from "cleared", and do not need
/// to.
pub trait HighlightStore {
    /// Loads the collection for `key`, empty when absent.
    fn get(&self, key: &str) -> Result<Vec<HighlightRecord>, StoreError>;
    /// Replaces the collection for `key`.
    fn set(&mut self, key: &str, records: Vec<HighlightRecord>) -> Result<(), StoreError>;
    /// Drops the collection for `key` entirely.
    fn remove(&mut self, key: &str) -> Result<(), StoreError>;
    /// Drops every collection.
    fn clear(&mut self) -> Result<(), StoreError>;
}

/// Change notification emitted on any write, mirroring what a host storage
/// layer delivers to its subscribers.
#[derive(Debug, Clone, PartialEq)]
pub struct ChangeNotification {
    /// Document key the write touched.
    pub key: String,
    /// Collection before the write, `None` when the key was absent.
    pub old_value: Option<Vec<HighlightRecord>>,
    /// Collection after the write, `None` when the key was removed.
    pub new_value: Option<Vec<HighlightRecord>>,
}

/// In-memory store: the default for hosts without durable storage and the
/// fake the test suite runs against.
///
/// Every write is recorded as a [`ChangeNotification`]; hosts drain them with
/// [`MemoryStore::take_changes`] and feed them back to the orchestrator as
/// storage-change events.
#[derive(Debug, Default)]
pub struct MemoryStore {
    collections: HashMap<String, Vec<HighlightRecord>>,
    changes: Vec<ChangeNotification>,
    unavailable: bool,
}

impl MemoryStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Drains the change notifications accumulated since the last call.
    pub fn take_changes(&mut self) -> Vec<ChangeNotification> {
        std::mem::take(&mut self.changes)
    }

    /// Makes every subsequent operation fail, for exercising error paths.
    pub fn set_unavailable(&mut self, unavailable: bool) {
        self.unavailable = unavailable;
    }

    fn check_available(&self) -> Result<(), StoreError> {
        if self.unavailable {
            Err(StoreError::Unavailable("store marked unavailable".to_string()))
        } else {
            Ok(())
        }
    }

    fn record_change(
        &mut self,
        key: &str,
        old_value: Option<Vec<HighlightRecord>>,
        new_value: Option<Vec<HighlightRecord>>,
    ) {
        self.changes.push(ChangeNotification {
            key: key.to_string(),
            old_value,
            new_value,
        });
    }
}

impl HighlightStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Vec<HighlightRecord>, StoreError> {
        self.check_available()?;
        Ok(self.collections.get(key).cloned().unwrap_or_default())
    }

    fn set(&mut self, key: &str, records: Vec<HighlightRecord>) -> Result<(), StoreError> {
        self.check_available()?;
        let old = self.collections.insert(key.to_string(), records.clone());
        self.record_change(key, old, Some(records));
        Ok(())
    }

    fn remove(&mut self, key: &str) -> Result<(), StoreError> {
        self.check_available()?;
        if let Some(old) = self.collections.remove(key) {
            self.record_change(key, Some(old), None);
        }
        Ok(())
    }

    fn clear(&mut self) -> Result<(), StoreError> {
        self.check_available()?;
        let keys: Vec<String> = self.collections.keys().cloned().collect();
        for key in keys {
            if let Some(old) = self.collections.remove(&key) {
                self.record_change(&key, Some(old), None);
            }
        }
        Ok(())
    }
}

/// Store backed by a single JSON file holding every document's collection.
///
/// Each operation reads and rewrites the whole file; a missing file reads as
/// empty. Suits the CLI and small single-user setups, not concurrent writers.
#[derive(Debug, Clone)]
pub struct JsonFileStore {
    path: PathBuf,
}

impl JsonFileStore {
    /// Creates a store over the given file path; the file is created lazily
    /// on first write.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    fn load(&self) -> Result<HashMap<String, Vec<HighlightRecord>>, StoreError> {
        let raw = match fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(HashMap::new()),
            Err(err) => return Err(StoreError::Io(err)),
        };
        serde_json::from_str(&raw).map_err(StoreError::Encoding)
    }

    fn save(&self, collections: &HashMap<String, Vec<HighlightRecord>>) -> Result<(), StoreError> {
        let payload = serde_json::to_string_pretty(collections).map_err(StoreError::Encoding)?;
        fs::write(&self.path, payload).map_err(StoreError::Io)
    }
}

impl HighlightStore for JsonFileStore {
    fn get(&self, key: &str) -> Result<Vec<HighlightRecord>, StoreError> {
        Ok(self.load()?.remove(key).unwrap_or_default())
    }

    fn set(&mut self, key: &str, records: Vec<HighlightRecord>) -> Result<(), StoreError> {
        let mut collections = self.load()?;
        collections.insert(key.to_string(), records);
        self.save(&collections)
    }

    fn remove(&mut self, key: &str) -> Result<(), StoreError> {
        let mut collections = self.load()?;
        if collections.remove(key).is_some() {
            self.save(&collections)?;
        }
        Ok(())
    }

    fn clear(&mut self) -> Result<(), StoreError> {
        self.save(&HashMap::new())
    }
}
