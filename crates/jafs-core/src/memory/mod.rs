//! Memory Subsystem
//!
//! ```text
//! ┌──────────────────────────── MemoryStore ─────────────────────────────┐
//! │  ShortTermMemory                    LongTermMemory (optional)        │
//! │  capacity + ttl, FIFO eviction      PersistenceBackend + index       │
//! │  tool results, role outputs         task answers across sessions     │
//! └──────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Agents share one store per orchestrator through [`SharedMemory`]; the
//! async mutex serializes writers so eviction order and TTL bookkeeping stay
//! consistent.

mod long_term;
mod short_term;

use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tokio::sync::Mutex;

use crate::config::MemorySettings;
use crate::error::Result;

pub use long_term::{InMemoryBackend, JsonFileBackend, LongTermMemory, PersistenceBackend};
pub use short_term::{MemoryRecord, ShortTermMemory};

/// Memory store shared between a primary agent and its specialists
pub type SharedMemory = Arc<Mutex<MemoryStore>>;

/// Short-term working memory plus optional durable memory
pub struct MemoryStore {
    short_term: ShortTermMemory,
    long_term: Option<LongTermMemory>,
}

impl MemoryStore {
    pub const fn new(short_term: ShortTermMemory, long_term: Option<LongTermMemory>) -> Self {
        Self {
            short_term,
            long_term,
        }
    }

    /// Build from the `memory` configuration section
    pub fn from_settings(settings: &MemorySettings) -> Result<Self> {
        let short = &settings.short_term;
        tracing::debug!(capacity = short.capacity, ttl = short.ttl, "Initializing short-term memory");
        let short_term = ShortTermMemory::new(short.capacity, Duration::from_secs(short.ttl));

        let long = &settings.long_term;
        let long_term = if long.enabled {
            Some(LongTermMemory::open(
                long.storage_path.as_deref(),
                long.index_in_memory,
            )?)
        } else {
            tracing::info!("Long-term memory disabled; nothing persists across sessions");
            None
        };

        Ok(Self::new(short_term, long_term))
    }

    pub fn shared(self) -> SharedMemory {
        Arc::new(Mutex::new(self))
    }

    /// Store a value in short-term memory
    pub fn remember(&mut self, key: impl Into<String>, value: Value) {
        self.short_term.put(key, value);
    }

    /// Look up a live short-term value
    pub fn recall(&self, key: &str) -> Option<&Value> {
        self.short_term.get(key)
    }

    /// Most recent live short-term entries, oldest first
    pub fn context(&self, limit: usize) -> Vec<(String, Value)> {
        self.short_term
            .recent(limit)
            .into_iter()
            .map(|r| (r.key.clone(), r.value.clone()))
            .collect()
    }

    /// Persist a value durably. A no-op when long-term memory is disabled.
    pub fn persist(&self, key: &str, value: Value) -> Result<()> {
        match &self.long_term {
            Some(long_term) => long_term.put(key, value),
            None => Ok(()),
        }
    }

    /// Durable lookup. `None` when long-term memory is disabled.
    pub fn recall_durable(&self, key: &str) -> Result<Option<Value>> {
        match &self.long_term {
            Some(long_term) => long_term.get(key),
            None => Ok(None),
        }
    }

    pub const fn has_long_term(&self) -> bool {
        self.long_term.is_some()
    }

    pub const fn short_term(&self) -> &ShortTermMemory {
        &self.short_term
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use serde_json::json;

    #[test]
    fn test_disabled_long_term_is_tolerated() {
        let mut settings = Config::default().memory;
        settings.long_term.enabled = false;

        let store = MemoryStore::from_settings(&settings).unwrap();

        assert!(!store.has_long_term());
        store.persist("task:x", json!("y")).unwrap();
        assert_eq!(store.recall_durable("task:x").unwrap(), None);
    }

    #[test]
    fn test_from_default_settings() {
        let mut store = MemoryStore::from_settings(&Config::default().memory).unwrap();

        assert_eq!(store.short_term().capacity(), 1000);
        assert_eq!(store.short_term().ttl(), Duration::from_secs(3600));
        assert!(store.has_long_term());

        store.remember("tool/jafs/1/call_0", json!({"success": true}));
        store.persist("task:x", json!("y")).unwrap();

        assert!(store.recall("tool/jafs/1/call_0").is_some());
        assert_eq!(store.recall_durable("task:x").unwrap(), Some(json!("y")));
        assert_eq!(store.context(5).len(), 1);
    }
}
