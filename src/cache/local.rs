//! Local Backend Module
//!
//! In-process cache engine: HashMap storage with a tag index and TTL
//! expiration. Entries are lost when the process exits.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::Value;
use tracing::{debug, info};

use crate::cache::backend::{CacheBackend, CacheStats};
use crate::cache::clock::{duration_ms, system_clock, SharedClock};
use crate::cache::entry::CacheEntry;
use crate::cache::tag_index::TagIndex;

pub const LOCAL_BACKEND_NAME: &str = "local";

// == Local State ==
/// Primary map and tag index, always mutated together under one lock.
#[derive(Debug)]
struct LocalState {
    entries: HashMap<String, CacheEntry>,
    index: TagIndex,
    version: u64,
}

impl LocalState {
    fn new() -> Self {
        Self {
            entries: HashMap::new(),
            index: TagIndex::new(),
            version: 1,
        }
    }

    // == Get ==
    /// Returns the value if present and not expired; expired entries are
    /// removed on the way out.
    fn get(&mut self, key: &str, now: u64) -> Option<Value> {
        let entry = self.entries.get_mut(key)?;

        if entry.is_expired_at(now) {
            self.remove(key);
            debug!(key, "Lazy expiry on read");
            return None;
        }

        entry.last_access_at = now;
        Some(entry.value.clone())
    }

    // == Set ==
    fn set(&mut self, key: &str, value: Value, ttl: Duration, tags: &[String], now: u64) {
        // Drop the previous entry and its residue before registering the new one.
        self.remove(key);

        // Under a millisecond rounds to an already-expired entry.
        if duration_ms(ttl) == 0 {
            return;
        }

        let entry = CacheEntry::new(key, value, ttl, tags, self.version, now);
        self.index.insert(key, &entry.tags);
        self.entries.insert(key.to_string(), entry);
    }

    // == Remove ==
    fn remove(&mut self, key: &str) -> bool {
        self.index.remove(key);
        self.entries.remove(key).is_some()
    }

    // == Invalidate By Tags ==
    fn invalidate_by_tags(&mut self, tags: &[String]) -> usize {
        let keys = self.index.keys_for(tags);
        keys.iter().filter(|key| self.remove(key)).count()
    }

    // == Clear ==
    fn clear(&mut self) -> usize {
        let size = self.entries.len();
        self.entries.clear();
        self.index.clear();
        self.version += 1;
        size
    }

    // == Cleanup Expired ==
    fn purge_expired(&mut self, now: u64) -> usize {
        let expired_keys: Vec<String> = self
            .entries
            .iter()
            .filter(|(_, entry)| entry.is_expired_at(now))
            .map(|(key, _)| key.clone())
            .collect();

        for key in &expired_keys {
            self.remove(key);
        }

        expired_keys.len()
    }

    fn is_consistent(&self) -> bool {
        self.index.is_consistent()
            && self.index.key_count() == self.entries.len()
            && self
                .entries
                .iter()
                .all(|(key, entry)| self.index.tags_of(key) == Some(&entry.tags))
    }
}

// == Local Backend ==
/// In-memory backend guarded by a single mutex.
#[derive(Debug)]
pub struct LocalBackend {
    state: Mutex<LocalState>,
    clock: SharedClock,
}

impl LocalBackend {
    // == Constructor ==
    /// Creates an empty backend on the wall clock.
    pub fn new() -> Self {
        Self::with_clock(system_clock())
    }

    pub fn with_clock(clock: SharedClock) -> Self {
        info!("In-memory cache initialized");
        Self {
            state: Mutex::new(LocalState::new()),
            clock,
        }
    }

    // == Length ==
    /// Number of stored entries, including expired ones not yet swept.
    pub fn len(&self) -> usize {
        self.state.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.state.lock().entries.is_empty()
    }

    /// Checks the primary map and the tag index against each other.
    pub fn is_consistent(&self) -> bool {
        self.state.lock().is_consistent()
    }
}

impl Default for LocalBackend {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CacheBackend for LocalBackend {
    fn name(&self) -> &'static str {
        LOCAL_BACKEND_NAME
    }

    async fn get(&self, key: &str) -> Option<Value> {
        let now = self.clock.now_ms();
        self.state.lock().get(key, now)
    }

    async fn set(&self, key: &str, value: Value, ttl: Duration, tags: &[String]) {
        let now = self.clock.now_ms();
        self.state.lock().set(key, value, ttl, tags, now);
        debug!(key, ttl_ms = duration_ms(ttl), "Cache set");
    }

    async fn invalidate_key(&self, key: &str) {
        if self.state.lock().remove(key) {
            debug!(key, "Cache key invalidated");
        }
    }

    async fn invalidate_by_tags(&self, tags: &[String]) {
        let removed = self.state.lock().invalidate_by_tags(tags);
        debug!(?tags, removed, "Cache invalidated by tags");
    }

    async fn clear(&self) {
        let size = self.state.lock().clear();
        info!("Cache CLEARED: {} entries removed", size);
    }

    async fn purge_expired(&self) -> usize {
        let now = self.clock.now_ms();
        let mut state = self.state.lock();
        let before = state.entries.len();
        let removed = state.purge_expired(now);

        if removed > 0 {
            info!(
                "Cache cleanup: removed {} expired entries ({} -> {})",
                removed,
                before,
                state.entries.len()
            );
        }
        removed
    }

    async fn stats(&self) -> CacheStats {
        let state = self.state.lock();
        CacheStats {
            size: state.entries.len(),
            tags: state.index.tags(),
            version: state.version,
            backend_name: LOCAL_BACKEND_NAME,
        }
    }
}
