//! Hash index implementation for Tessera.
//!
//! Maps a key to the fact ids stored under it. Every id is indexed under at
//! most one key, and a slot cache remembers where each id sits so a single
//! id can be removed in O(1) with a swap-remove.

use crate::stats::IndexStats;
use core::hash::Hash;
use hashbrown::HashMap;
use tessera_core::FactId;

/// A hash-based index for O(1) point queries and removals.
#[derive(Debug, Clone)]
pub struct HashIndex<K> {
    /// The underlying map from keys to fact ids.
    map: HashMap<K, Vec<FactId>>,
    /// Position of each id: its key and offset in that key's bucket.
    slots: HashMap<FactId, (K, usize)>,
    /// Statistics for this index.
    stats: IndexStats,
}

impl<K: Eq + Hash + Clone> HashIndex<K> {
    /// Creates a new empty hash index.
    pub fn new() -> Self {
        Self {
            map: HashMap::new(),
            slots: HashMap::new(),
            stats: IndexStats::new(),
        }
    }

    /// Returns the statistics for this index.
    pub fn stats(&self) -> &IndexStats {
        &self.stats
    }

    /// Adds an id under a key. Returns false if the id is already indexed.
    pub fn add(&mut self, key: K, id: FactId) -> bool {
        if self.slots.contains_key(&id) {
            return false;
        }
        let bucket = self.map.entry(key.clone()).or_default();
        self.slots.insert(id, (key, bucket.len()));
        bucket.push(id);
        self.stats.add_entries(1);
        true
    }

    /// Removes an id wherever it is indexed. Returns false if it was absent.
    pub fn remove(&mut self, id: FactId) -> bool {
        let Some((key, offset)) = self.slots.remove(&id) else {
            return false;
        };
        if let Some(bucket) = self.map.get_mut(&key) {
            bucket.swap_remove(offset);
            if let Some(moved) = bucket.get(offset) {
                if let Some(slot) = self.slots.get_mut(moved) {
                    slot.1 = offset;
                }
            }
            if bucket.is_empty() {
                self.map.remove(&key);
            }
        }
        self.stats.remove_entries(1);
        true
    }

    /// Returns the ids stored under a key.
    pub fn get(&self, key: &K) -> &[FactId] {
        self.stats.record_lookup();
        self.map.get(key).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Returns the key an id is indexed under.
    pub fn key_of(&self, id: FactId) -> Option<&K> {
        self.slots.get(&id).map(|(key, _)| key)
    }

    /// Returns true if the id is indexed.
    pub fn contains(&self, id: FactId) -> bool {
        self.slots.contains_key(&id)
    }

    /// Returns true if any id is stored under the key.
    pub fn contains_key(&self, key: &K) -> bool {
        self.map.contains_key(key)
    }

    /// Returns the number of indexed ids.
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    /// Returns the number of distinct keys.
    pub fn key_count(&self) -> usize {
        self.map.len()
    }

    /// Returns true if nothing is indexed.
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Iterates over the distinct keys.
    pub fn keys(&self) -> impl Iterator<Item = &K> {
        self.map.keys()
    }

    /// Removes every entry.
    pub fn clear(&mut self) {
        self.map.clear();
        self.slots.clear();
        self.stats.clear();
    }
}

impl<K: Eq + Hash + Clone> Default for HashIndex<K> {
    fn default() -> Self {
        Self::new()
    }
}
