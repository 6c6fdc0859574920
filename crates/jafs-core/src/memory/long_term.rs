//! Long-Term Memory
//!
//! Durable key-value memory behind a small persistence contract. The
//! in-memory index is a read-through/write-through cache; it changes lookup
//! latency, never results.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::RwLock;

use serde_json::Value;

use crate::error::{AgentError, Result};

/// Persistence capability backing long-term memory
pub trait PersistenceBackend: Send + Sync {
    /// Load a value
    fn get(&self, key: &str) -> Result<Option<Value>>;

    /// Store a value, replacing any previous one
    fn put(&self, key: &str, value: Value) -> Result<()>;

    /// Whether a value exists for `key`
    fn contains(&self, key: &str) -> Result<bool> {
        Ok(self.get(key)?.is_some())
    }
}

fn poisoned<T>(_: T) -> AgentError {
    AgentError::Memory("memory lock poisoned".into())
}

/// Process-lifetime backend (for development/testing)
#[derive(Default)]
pub struct InMemoryBackend {
    entries: RwLock<HashMap<String, Value>>,
}

impl InMemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }
}

impl PersistenceBackend for InMemoryBackend {
    fn get(&self, key: &str) -> Result<Option<Value>> {
        let entries = self.entries.read().map_err(poisoned)?;
        Ok(entries.get(key).cloned())
    }

    fn put(&self, key: &str, value: Value) -> Result<()> {
        let mut entries = self.entries.write().map_err(poisoned)?;
        entries.insert(key.to_string(), value);
        Ok(())
    }

    fn contains(&self, key: &str) -> Result<bool> {
        let entries = self.entries.read().map_err(poisoned)?;
        Ok(entries.contains_key(key))
    }
}

/// Single JSON document on disk holding every entry
pub struct JsonFileBackend {
    path: PathBuf,
    // Serializes read-modify-write cycles on the file
    lock: RwLock<()>,
}

impl JsonFileBackend {
    /// Open (or lazily create) the store at `path`
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        Ok(Self {
            path,
            lock: RwLock::new(()),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn load(&self) -> Result<HashMap<String, Value>> {
        if !self.path.exists() {
            return Ok(HashMap::new());
        }
        let raw = fs::read_to_string(&self.path)?;
        if raw.trim().is_empty() {
            return Ok(HashMap::new());
        }
        Ok(serde_json::from_str(&raw)?)
    }
}

impl PersistenceBackend for JsonFileBackend {
    fn get(&self, key: &str) -> Result<Option<Value>> {
        let _guard = self.lock.read().map_err(poisoned)?;
        Ok(self.load()?.remove(key))
    }

    fn put(&self, key: &str, value: Value) -> Result<()> {
        let _guard = self.lock.write().map_err(poisoned)?;
        let mut entries = self.load()?;
        entries.insert(key.to_string(), value);
        fs::write(&self.path, serde_json::to_string_pretty(&entries)?)?;
        Ok(())
    }
}

/// Durable memory with an optional in-memory index
pub struct LongTermMemory {
    backend: Box<dyn PersistenceBackend>,
    index: Option<RwLock<HashMap<String, Value>>>,
}

impl LongTermMemory {
    pub fn new(backend: Box<dyn PersistenceBackend>, index_in_memory: bool) -> Self {
        Self {
            backend,
            index: index_in_memory.then(|| RwLock::new(HashMap::new())),
        }
    }

    /// Backed by a JSON file when a path is given, otherwise by process memory
    pub fn open(storage_path: Option<&Path>, index_in_memory: bool) -> Result<Self> {
        let backend: Box<dyn PersistenceBackend> = match storage_path {
            Some(path) => {
                tracing::debug!(path = %path.display(), "Long-term memory stored on disk");
                Box::new(JsonFileBackend::open(path)?)
            }
            None => {
                tracing::debug!("Long-term memory kept in process memory");
                Box::new(InMemoryBackend::new())
            }
        };
        Ok(Self::new(backend, index_in_memory))
    }

    pub const fn is_indexed(&self) -> bool {
        self.index.is_some()
    }

    pub fn get(&self, key: &str) -> Result<Option<Value>> {
        if let Some(index) = &self.index {
            if let Some(hit) = index.read().map_err(poisoned)?.get(key) {
                return Ok(Some(hit.clone()));
            }
        }

        let value = self.backend.get(key)?;
        if let (Some(index), Some(value)) = (&self.index, &value) {
            index
                .write()
                .map_err(poisoned)?
                .insert(key.to_string(), value.clone());
        }
        Ok(value)
    }

    pub fn put(&self, key: &str, value: Value) -> Result<()> {
        self.backend.put(key, value.clone())?;
        if let Some(index) = &self.index {
            index.write().map_err(poisoned)?.insert(key.to_string(), value);
        }
        Ok(())
    }

    pub fn contains(&self, key: &str) -> Result<bool> {
        if let Some(index) = &self.index {
            if index.read().map_err(poisoned)?.contains_key(key) {
                return Ok(true);
            }
        }
        self.backend.contains(key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_in_memory_backend() {
        let memory = LongTermMemory::open(None, false).unwrap();
        assert!(!memory.contains("k").unwrap());

        memory.put("k", json!({"answer": 4})).unwrap();

        assert!(memory.contains("k").unwrap());
        assert_eq!(memory.get("k").unwrap(), Some(json!({"answer": 4})));
        assert_eq!(memory.get("missing").unwrap(), None);
    }

    #[test]
    fn test_file_backend_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("memory.json");

        {
            let memory = LongTermMemory::open(Some(&path), true).unwrap();
            memory.put("task:calculate 2 + 2", json!("4")).unwrap();
        }

        let reopened = LongTermMemory::open(Some(&path), false).unwrap();
        assert_eq!(reopened.get("task:calculate 2 + 2").unwrap(), Some(json!("4")));
        assert!(reopened.contains("task:calculate 2 + 2").unwrap());
    }

    #[test]
    fn test_index_does_not_change_results() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("memory.json");

        let indexed = LongTermMemory::open(Some(&path), true).unwrap();
        let plain = LongTermMemory::open(Some(&path), false).unwrap();
        assert!(indexed.is_indexed());
        assert!(!plain.is_indexed());

        indexed.put("a", json!(1)).unwrap();
        plain.put("b", json!(2)).unwrap();

        for key in ["a", "b", "c"] {
            assert_eq!(indexed.get(key).unwrap(), plain.get(key).unwrap());
        }
    }
}
