//! Index statistics for Tessera.

use core::sync::atomic::{AtomicUsize, Ordering};

/// Statistics for an index.
#[derive(Debug)]
pub struct IndexStats {
    /// Total number of ids in the index.
    total_entries: AtomicUsize,
    /// Number of point lookups served.
    lookups: AtomicUsize,
}

impl IndexStats {
    /// Creates a new empty stats instance.
    pub fn new() -> Self {
        Self {
            total_entries: AtomicUsize::new(0),
            lookups: AtomicUsize::new(0),
        }
    }

    /// Returns the total number of entries.
    pub fn total_entries(&self) -> usize {
        self.total_entries.load(Ordering::Relaxed)
    }

    /// Returns the number of lookups served so far.
    pub fn lookups(&self) -> usize {
        self.lookups.load(Ordering::Relaxed)
    }

    /// Increments the entry count by the given amount.
    pub fn add_entries(&self, count: usize) {
        self.total_entries.fetch_add(count, Ordering::Relaxed);
    }

    /// Decrements the entry count by the given amount.
    pub fn remove_entries(&self, count: usize) {
        self.total_entries.fetch_sub(count, Ordering::Relaxed);
    }

    /// Records one lookup.
    pub fn record_lookup(&self) {
        self.lookups.fetch_add(1, Ordering::Relaxed);
    }

    /// Resets the entry count to zero. Lookup counts survive.
    pub fn clear(&self) {
        self.total_entries.store(0, Ordering::Relaxed);
    }
}

impl Default for IndexStats {
    fn default() -> Self {
        Self::new()
    }
}

impl Clone for IndexStats {
    fn clone(&self) -> Self {
        Self {
            total_entries: AtomicUsize::new(self.total_entries()),
            lookups: AtomicUsize::new(self.lookups()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stats_new() {
        let stats = IndexStats::new();
        assert_eq!(stats.total_entries(), 0);
        assert_eq!(stats.lookups(), 0);
    }

    #[test]
    fn test_stats_add_remove_entries() {
        let stats = IndexStats::new();
        stats.add_entries(10);
        stats.remove_entries(3);
        assert_eq!(stats.total_entries(), 7);
    }

    #[test]
    fn test_stats_clear_keeps_lookups() {
        let stats = IndexStats::new();
        stats.add_entries(4);
        stats.record_lookup();
        stats.clear();
        assert_eq!(stats.total_entries(), 0);
        assert_eq!(stats.lookups(), 1);
    }
}
