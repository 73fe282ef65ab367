use std::collections::BTreeMap;
use std::fs;
use std::path::PathBuf;

use log::{info, warn};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;

/// Well-known keys shared with the web frontend of the product.
pub const IDENTITY_KEY: &str = "currentUserData";
pub const MASLACH_RESULT_KEY: &str = "lastMaslachResult";
pub const REACTION_RESULT_KEY: &str = "lastReactionResult";

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store I/O failed: {0}")]
    Io(#[from] std::io::Error),
    #[error("stored value is not valid JSON: {0}")]
    Serde(#[from] serde_json::Error),
}

/// String-keyed store for JSON-serialized values. Flows receive this
/// instead of touching any ambient global, so tests can swap in a
/// memory-backed double.
pub trait ResultStore: Send {
    fn get_raw(&self, key: &str) -> Option<Value>;
    fn set_raw(&mut self, key: &str, value: Value) -> Result<(), StoreError>;
    fn remove(&mut self, key: &str) -> Result<(), StoreError>;
}

pub fn get_typed<T: DeserializeOwned>(store: &dyn ResultStore, key: &str) -> Option<T> {
    let raw = store.get_raw(key)?;
    match serde_json::from_value(raw) {
        Ok(value) => Some(value),
        Err(e) => {
            warn!("Cached value under '{}' is unreadable, ignoring it: {}", key, e);
            None
        }
    }
}

pub fn set_typed<T: Serialize>(
    store: &mut dyn ResultStore,
    key: &str,
    value: &T,
) -> Result<(), StoreError> {
    store.set_raw(key, serde_json::to_value(value)?)
}

/// Single-file JSON store living in the Tauri app-data directory.
/// Every mutation is written through immediately; the data set is a
/// handful of small objects, so rewriting the whole file is fine.
pub struct JsonFileStore {
    path: PathBuf,
    entries: BTreeMap<String, Value>,
}

impl JsonFileStore {
    pub fn open(path: PathBuf) -> Result<Self, StoreError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let entries = match fs::read_to_string(&path) {
            Ok(contents) => match serde_json::from_str(&contents) {
                Ok(map) => map,
                Err(e) => {
                    warn!("Store file {:?} is corrupt, starting empty: {}", path, e);
                    BTreeMap::new()
                }
            },
            Err(_) => BTreeMap::new(),
        };

        info!("📦 Result store opened at {:?} ({} entries)", path, entries.len());
        Ok(Self { path, entries })
    }

    fn flush(&self) -> Result<(), StoreError> {
        let contents = serde_json::to_string_pretty(&self.entries)?;
        fs::write(&self.path, contents)?;
        Ok(())
    }
}

impl ResultStore for JsonFileStore {
    fn get_raw(&self, key: &str) -> Option<Value> {
        self.entries.get(key).cloned()
    }

    fn set_raw(&mut self, key: &str, value: Value) -> Result<(), StoreError> {
        self.entries.insert(key.to_string(), value);
        self.flush()
    }

    fn remove(&mut self, key: &str) -> Result<(), StoreError> {
        if self.entries.remove(key).is_some() {
            self.flush()?;
        }
        Ok(())
    }
}

/// In-memory store. Used as the test double and as the fallback when the
/// app-data directory cannot be resolved (results then live only for the
/// lifetime of the process).
#[derive(Default)]
pub struct MemoryStore {
    entries: BTreeMap<String, Value>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ResultStore for MemoryStore {
    fn get_raw(&self, key: &str) -> Option<Value> {
        self.entries.get(key).cloned()
    }

    fn set_raw(&mut self, key: &str, value: Value) -> Result<(), StoreError> {
        self.entries.insert(key.to_string(), value);
        Ok(())
    }

    fn remove(&mut self, key: &str) -> Result<(), StoreError> {
        self.entries.remove(key);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_memory_store_round_trip() {
        let mut store = MemoryStore::new();
        store
            .set_raw(MASLACH_RESULT_KEY, json!({"exhaustion": 12}))
            .unwrap();

        let value = store.get_raw(MASLACH_RESULT_KEY).unwrap();
        assert_eq!(value["exhaustion"], 12);

        store.remove(MASLACH_RESULT_KEY).unwrap();
        assert!(store.get_raw(MASLACH_RESULT_KEY).is_none());
    }

    #[test]
    fn test_typed_helpers_ignore_garbage() {
        let mut store = MemoryStore::new();
        store.set_raw(IDENTITY_KEY, json!("not an object")).unwrap();

        let parsed: Option<BTreeMap<String, i64>> = get_typed(&store, IDENTITY_KEY);
        assert!(parsed.is_none());
    }

    #[test]
    fn test_file_store_survives_reopen() {
        let dir = std::env::temp_dir().join("burnout-monitor-store-test");
        let _ = std::fs::remove_dir_all(&dir);
        let path = dir.join("store.json");

        {
            let mut store = JsonFileStore::open(path.clone()).unwrap();
            set_typed(&mut store, REACTION_RESULT_KEY, &json!({"avgTime": 231})).unwrap();
        }

        let store = JsonFileStore::open(path).unwrap();
        assert_eq!(store.get_raw(REACTION_RESULT_KEY).unwrap()["avgTime"], 231);

        let _ = std::fs::remove_dir_all(&dir);
    }
}
