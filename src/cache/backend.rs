//! Cache Backend Trait
//!
//! Contract shared by the in-process and Redis backends. Operations are
//! infallible by signature: an unavailable backend answers with a miss or
//! silently drops the write.

use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;

/// Point-in-time view of a backend.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CacheStats {
    /// Live entries
    pub size: usize,
    /// Tags present in the tag index
    pub tags: Vec<String>,
    /// Generation counter, bumped on clear
    pub version: u64,
    pub backend_name: &'static str,
}

#[async_trait]
pub trait CacheBackend: Send + Sync {
    /// Short name reported in stats ("local", "redis").
    fn name(&self) -> &'static str;

    /// Returns the live value under `key`, removing it if it has expired.
    async fn get(&self, key: &str) -> Option<Value>;

    /// Stores `value` for `ttl` under `key` with `tags` plus the key tag,
    /// replacing any previous entry and its tag residue.
    async fn set(&self, key: &str, value: Value, ttl: Duration, tags: &[String]);

    async fn invalidate_key(&self, key: &str);

    /// Removes every entry carrying at least one of `tags`.
    async fn invalidate_by_tags(&self, tags: &[String]);

    /// Drops everything and bumps the version.
    async fn clear(&self);

    /// Evicts expired entries, returning how many were removed.
    async fn purge_expired(&self) -> usize;

    async fn stats(&self) -> CacheStats;
}
