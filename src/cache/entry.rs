//! Cache Entry Module
//!
//! Defines the structure for individual cache entries with TTL and tags.
//! The same shape is stored in memory by the local backend and as JSON by
//! the Redis backend.

use std::collections::BTreeSet;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::cache::clock::duration_ms;

/// Prefix of the tag every entry carries for its own key.
pub const KEY_TAG_PREFIX: &str = "user:";

/// The tag implicitly attached to the entry stored under `key`.
pub fn key_tag(key: &str) -> String {
    format!("{}{}", KEY_TAG_PREFIX, key)
}

// == Cache Entry ==
/// Represents a single cache entry with value and metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheEntry {
    /// The stored payload
    pub value: Value,
    /// Expiration timestamp (Unix milliseconds)
    pub expires_at: u64,
    /// Last successful read (Unix milliseconds)
    pub last_access_at: u64,
    /// Cache generation at write time
    pub version: u64,
    /// Caller tags plus the key tag
    pub tags: BTreeSet<String>,
}

impl CacheEntry {
    // == Constructor ==
    /// Creates an entry written at `now` that lives for `ttl`.
    ///
    /// The key tag is always added to the caller's tags.
    pub fn new(
        key: &str,
        value: Value,
        ttl: Duration,
        tags: &[String],
        version: u64,
        now: u64,
    ) -> Self {
        let mut all_tags: BTreeSet<String> = tags.iter().cloned().collect();
        all_tags.insert(key_tag(key));

        Self {
            value,
            expires_at: now.saturating_add(duration_ms(ttl)),
            last_access_at: now,
            version,
            tags: all_tags,
        }
    }

    // == Is Expired ==
    /// An entry is expired once `now` reaches `expires_at`.
    pub fn is_expired_at(&self, now: u64) -> bool {
        now >= self.expires_at
    }

    // == Time To Live ==
    /// Remaining lifetime in milliseconds, 0 once expired.
    pub fn ttl_remaining_ms(&self, now: u64) -> u64 {
        self.expires_at.saturating_sub(now)
    }
}

// == Unit Tests ==
#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_entry_adds_key_tag() {
        let entry = CacheEntry::new(
            "42",
            json!({"name": "x"}),
            Duration::from_secs(60),
            &["accepted_users".to_string()],
            1,
            1_000,
        );

        assert!(entry.tags.contains("user:42"));
        assert!(entry.tags.contains("accepted_users"));
        assert_eq!(entry.tags.len(), 2);
        assert_eq!(entry.expires_at, 61_000);
        assert_eq!(entry.last_access_at, 1_000);
    }

    #[test]
    fn test_key_tag_not_duplicated() {
        let entry = CacheEntry::new(
            "42",
            json!(1),
            Duration::from_secs(1),
            &["user:42".to_string()],
            1,
            0,
        );
        assert_eq!(entry.tags.len(), 1);
    }

    #[test]
    fn test_expiration_boundary_condition() {
        let entry = CacheEntry::new("k", json!(null), Duration::from_millis(500), &[], 1, 1_000);

        assert!(!entry.is_expired_at(1_499));
        assert!(entry.is_expired_at(1_500), "Entry should be expired at boundary");
        assert!(entry.is_expired_at(2_000));
    }

    #[test]
    fn test_ttl_remaining() {
        let entry = CacheEntry::new("k", json!(null), Duration::from_secs(10), &[], 1, 0);

        assert_eq!(entry.ttl_remaining_ms(4_000), 6_000);
        assert_eq!(entry.ttl_remaining_ms(20_000), 0);
    }

    #[test]
    fn test_wire_format_is_camel_case() {
        let entry = CacheEntry::new("k", json!("v"), Duration::from_secs(1), &[], 3, 10);
        let json = serde_json::to_value(&entry).unwrap();

        assert_eq!(json["expiresAt"], 1_010);
        assert_eq!(json["lastAccessAt"], 10);
        assert_eq!(json["version"], 3);
        assert_eq!(json["tags"][0], "user:k");

        let back: CacheEntry = serde_json::from_value(json).unwrap();
        assert_eq!(back, entry);
    }
}
