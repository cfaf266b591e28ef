//! Tag Index Module
//!
//! Reverse mapping from tag to the keys carrying it, used for bulk
//! invalidation. Both directions are kept so a key's residue can be removed
//! without consulting the primary store.

use std::collections::{BTreeSet, HashMap, HashSet};

// == Tag Index ==
/// Tag -> keys, plus key -> tags.
///
/// Invariants: the two maps mirror each other exactly, and no tag bucket is
/// ever left empty.
#[derive(Debug, Default)]
pub struct TagIndex {
    by_tag: HashMap<String, HashSet<String>>,
    by_key: HashMap<String, BTreeSet<String>>,
}

impl TagIndex {
    pub fn new() -> Self {
        Self::default()
    }

    // == Insert ==
    /// Registers `key` under `tags`, replacing whatever it was registered
    /// under before.
    pub fn insert(&mut self, key: &str, tags: &BTreeSet<String>) {
        self.remove(key);

        for tag in tags {
            self.by_tag
                .entry(tag.clone())
                .or_default()
                .insert(key.to_string());
        }
        self.by_key.insert(key.to_string(), tags.clone());
    }

    // == Remove ==
    /// Drops all residue of `key`, pruning buckets that become empty.
    ///
    /// Returns the tags the key was registered under.
    pub fn remove(&mut self, key: &str) -> Option<BTreeSet<String>> {
        let tags = self.by_key.remove(key)?;

        for tag in &tags {
            if let Some(keys) = self.by_tag.get_mut(tag) {
                keys.remove(key);
                if keys.is_empty() {
                    self.by_tag.remove(tag);
                }
            }
        }

        Some(tags)
    }

    // == Keys For Tags ==
    /// Union of the keys registered under any of `tags`.
    pub fn keys_for(&self, tags: &[String]) -> HashSet<String> {
        tags.iter()
            .filter_map(|tag| self.by_tag.get(tag))
            .flat_map(|keys| keys.iter().cloned())
            .collect()
    }

    /// Tags registered for `key`.
    pub fn tags_of(&self, key: &str) -> Option<&BTreeSet<String>> {
        self.by_key.get(key)
    }

    /// All tags currently indexed, sorted.
    pub fn tags(&self) -> Vec<String> {
        let mut tags: Vec<String> = self.by_tag.keys().cloned().collect();
        tags.sort();
        tags
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.by_key.contains_key(key)
    }

    /// Number of indexed keys.
    pub fn key_count(&self) -> usize {
        self.by_key.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_key.is_empty()
    }

    pub fn clear(&mut self) {
        self.by_tag.clear();
        self.by_key.clear();
    }

    /// Checks that both directions agree and no bucket is empty.
    pub fn is_consistent(&self) -> bool {
        let forward_ok = self.by_tag.iter().all(|(tag, keys)| {
            !keys.is_empty()
                && keys
                    .iter()
                    .all(|key| self.by_key.get(key).is_some_and(|t| t.contains(tag)))
        });
        let backward_ok = self.by_key.iter().all(|(key, tags)| {
            tags.iter()
                .all(|tag| self.by_tag.get(tag).is_some_and(|k| k.contains(key)))
        });
        forward_ok && backward_ok
    }
}
