//! Short-Term Memory
//!
//! Bounded associative store with insertion-order (FIFO) eviction and a
//! uniform time-to-live. Expiry is checked on read, so a record past its TTL is
//! never handed out even if it has not been evicted yet.

use std::collections::{HashMap, VecDeque};
use std::time::{Duration, Instant};

use serde_json::Value;

/// A single stored value
#[derive(Clone, Debug)]
pub struct MemoryRecord {
    pub key: String,
    pub value: Value,
    pub inserted_at: Instant,
    pub ttl: Duration,
}

impl MemoryRecord {
    /// Logically expired once `now >= inserted_at + ttl`
    pub fn is_expired(&self, now: Instant) -> bool {
        now.saturating_duration_since(self.inserted_at) >= self.ttl
    }
}

/// Bounded, TTL-based key-value memory
#[derive(Debug)]
pub struct ShortTermMemory {
    capacity: usize,
    ttl: Duration,
    records: HashMap<String, MemoryRecord>,
    /// Keys in insertion order, oldest first
    order: VecDeque<String>,
}

impl ShortTermMemory {
    pub fn new(capacity: usize, ttl: Duration) -> Self {
        Self {
            capacity,
            ttl,
            records: HashMap::new(),
            order: VecDeque::new(),
        }
    }

    pub const fn capacity(&self) -> usize {
        self.capacity
    }

    pub const fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Insert or replace `key`, evicting the oldest record when full
    pub fn put(&mut self, key: impl Into<String>, value: Value) {
        self.put_at(key, value, Instant::now());
    }

    pub fn put_at(&mut self, key: impl Into<String>, value: Value, now: Instant) {
        let key = key.into();
        if self.capacity == 0 {
            return;
        }

        // Re-inserting a key refreshes its position and timestamp
        if self.records.remove(&key).is_some() {
            self.order.retain(|k| k != &key);
        }

        while self.records.len() >= self.capacity {
            let Some(oldest) = self.order.pop_front() else {
                break;
            };
            self.records.remove(&oldest);
            tracing::trace!(key = %oldest, "Evicted short-term record");
        }

        self.order.push_back(key.clone());
        self.records.insert(
            key.clone(),
            MemoryRecord {
                key,
                value,
                inserted_at: now,
                ttl: self.ttl,
            },
        );
    }

    /// Look up a live record
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.get_at(key, Instant::now())
    }

    pub fn get_at(&self, key: &str, now: Instant) -> Option<&Value> {
        self.records
            .get(key)
            .filter(|r| !r.is_expired(now))
            .map(|r| &r.value)
    }

    /// The `limit` most recently inserted live records, oldest first
    pub fn recent(&self, limit: usize) -> Vec<&MemoryRecord> {
        self.recent_at(limit, Instant::now())
    }

    pub fn recent_at(&self, limit: usize, now: Instant) -> Vec<&MemoryRecord> {
        let mut live: Vec<&MemoryRecord> = self
            .order
            .iter()
            .rev()
            .filter_map(|k| self.records.get(k))
            .filter(|r| !r.is_expired(now))
            .take(limit)
            .collect();
        live.reverse();
        live
    }

    /// Physically drop expired records. Returns how many were removed.
    pub fn purge_expired(&mut self, now: Instant) -> usize {
        let before = self.records.len();
        self.records.retain(|_, r| !r.is_expired(now));
        let records = &self.records;
        self.order.retain(|k| records.contains_key(k));
        before - self.records.len()
    }

    /// Number of stored records, including expired ones not yet purged
    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn clear(&mut self) {
        self.records.clear();
        self.order.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const HOUR: Duration = Duration::from_secs(3600);

    #[test]
    fn test_evicts_first_inserted() {
        let mut memory = ShortTermMemory::new(3, HOUR);
        for i in 0..4 {
            memory.put(format!("k{i}"), json!(i));
        }

        assert_eq!(memory.len(), 3);
        assert!(memory.get("k0").is_none());
        for i in 1..4 {
            assert_eq!(memory.get(&format!("k{i}")), Some(&json!(i)));
        }
    }

    #[test]
    fn test_reinsert_refreshes_position() {
        let mut memory = ShortTermMemory::new(2, HOUR);
        memory.put("a", json!(1));
        memory.put("b", json!(2));
        memory.put("a", json!(3));
        memory.put("c", json!(4));

        // "b" is now the oldest entry
        assert!(memory.get("b").is_none());
        assert_eq!(memory.get("a"), Some(&json!(3)));
        assert_eq!(memory.get("c"), Some(&json!(4)));
    }

    #[test]
    fn test_ttl_boundary() {
        let ttl = Duration::from_secs(10);
        let start = Instant::now();
        let mut memory = ShortTermMemory::new(10, ttl);
        memory.put_at("fact", json!("sky is blue"), start);

        assert!(memory.get_at("fact", start).is_some());
        assert!(memory.get_at("fact", start + Duration::from_secs(9)).is_some());
        assert!(memory.get_at("fact", start + ttl).is_none());
        assert!(memory.get_at("fact", start + Duration::from_secs(60)).is_none());

        // Not physically evicted until purged
        assert_eq!(memory.len(), 1);
        assert_eq!(memory.purge_expired(start + ttl), 1);
        assert!(memory.is_empty());
    }

    #[test]
    fn test_recent_skips_expired() {
        let start = Instant::now();
        let mut memory = ShortTermMemory::new(10, Duration::from_secs(5));
        memory.put_at("old", json!(1), start);
        memory.put_at("mid", json!(2), start + Duration::from_secs(3));
        memory.put_at("new", json!(3), start + Duration::from_secs(4));

        let keys: Vec<&str> = memory
            .recent_at(10, start + Duration::from_secs(6))
            .iter()
            .map(|r| r.key.as_str())
            .collect();
        assert_eq!(keys, vec!["mid", "new"]);

        let keys: Vec<&str> = memory
            .recent_at(1, start + Duration::from_secs(4))
            .iter()
            .map(|r| r.key.as_str())
            .collect();
        assert_eq!(keys, vec!["new"]);
    }

    #[test]
    fn test_zero_capacity_stores_nothing() {
        let mut memory = ShortTermMemory::new(0, HOUR);
        memory.put("a", json!(1));
        assert!(memory.get("a").is_none());
        assert!(memory.is_empty());
    }
}
