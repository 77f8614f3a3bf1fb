//! Per-calculation memoization cache
//!
//! Each materialized calc owns one cache keyed by the exact argument tuple of
//! an invocation: the time value when the calc is time-dependent and the
//! reference-data handle identity when it consumes reference data. Bound
//! secondary dimensions are fixed per calc and therefore never part of the
//! key. Evaluation failures are never stored.

use std::collections::HashMap;
use std::fmt;

use serde::Serialize;

/// Exact argument tuple of one invocation, relative to a single calc
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) struct CacheKey {
    /// Time value, present iff the calc is time-dependent
    pub(crate) t: Option<i64>,
    /// Reference-data handle id, present iff the calc consumes reference data
    pub(crate) data: Option<u64>,
}

#[derive(Debug, Clone, Copy)]
struct Entry {
    value: f64,
    last_used: u64,
}

/// Bounded-or-unbounded memoizing store with hit/miss accounting
#[derive(Debug)]
pub(crate) struct MemoCache {
    capacity: Option<usize>,
    entries: HashMap<CacheKey, Entry>,
    tick: u64,
    hits: u64,
    misses: u64,
}

impl MemoCache {
    pub(crate) fn new(capacity: Option<usize>) -> Self {
        MemoCache {
            capacity,
            entries: HashMap::new(),
            tick: 0,
            hits: 0,
            misses: 0,
        }
    }

    /// Fetch a cached result, recording a hit or a miss
    pub(crate) fn lookup(&mut self, key: &CacheKey) -> Option<f64> {
        self.tick += 1;
        match self.entries.get_mut(key) {
            Some(entry) => {
                entry.last_used = self.tick;
                self.hits += 1;
                Some(entry.value)
            }
            None => {
                self.misses += 1;
                None
            }
        }
    }

    /// Store a computed result, evicting the least-recently-used entry when
    /// at capacity. A capacity of zero disables storage entirely.
    pub(crate) fn store(&mut self, key: CacheKey, value: f64) {
        if self.capacity == Some(0) {
            return;
        }
        if let Some(capacity) = self.capacity {
            if self.entries.len() >= capacity && !self.entries.contains_key(&key) {
                if let Some(oldest) = self
                    .entries
                    .iter()
                    .min_by_key(|(_, entry)| entry.last_used)
                    .map(|(key, _)| *key)
                {
                    self.entries.remove(&oldest);
                }
            }
        }
        self.tick += 1;
        self.entries.insert(
            key,
            Entry {
                value,
                last_used: self.tick,
            },
        );
    }

    pub(crate) fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits,
            misses: self.misses,
            len: self.entries.len(),
            capacity: self.capacity,
        }
    }
}

/// Observable cache statistics for one calc
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub len: usize,
    /// `None` means unbounded
    pub capacity: Option<usize>,
}

impl fmt::Display for CacheStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "hits={} misses={} size={}", self.hits, self.misses, self.len)?;
        match self.capacity {
            Some(capacity) => write!(f, " capacity={capacity}"),
            None => write!(f, " capacity=unbounded"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(t: i64) -> CacheKey {
        CacheKey {
            t: Some(t),
            data: Some(1),
        }
    }

    #[test]
    fn test_hit_and_miss_accounting() {
        let mut cache = MemoCache::new(None);

        assert_eq!(cache.lookup(&key(0)), None);
        cache.store(key(0), 1.0);
        assert_eq!(cache.lookup(&key(0)), Some(1.0));
        assert_eq!(cache.lookup(&key(1)), None);

        let stats = cache.stats();
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 2);
        assert_eq!(stats.len, 1);
        assert_eq!(stats.capacity, None);
    }

    #[test]
    fn test_distinct_handles_are_distinct_keys() {
        let mut cache = MemoCache::new(None);
        let a = CacheKey { t: Some(5), data: Some(1) };
        let b = CacheKey { t: Some(5), data: Some(2) };

        cache.store(a, 1.0);
        assert_eq!(cache.lookup(&b), None);
        assert_eq!(cache.lookup(&a), Some(1.0));
    }

    #[test]
    fn test_lru_eviction_at_capacity() {
        let mut cache = MemoCache::new(Some(2));

        cache.store(key(0), 0.0);
        cache.store(key(1), 1.0);
        // Touch key 0 so key 1 becomes the eviction candidate
        assert_eq!(cache.lookup(&key(0)), Some(0.0));

        cache.store(key(2), 2.0);
        assert_eq!(cache.stats().len, 2);
        assert_eq!(cache.lookup(&key(1)), None);
        assert_eq!(cache.lookup(&key(0)), Some(0.0));
        assert_eq!(cache.lookup(&key(2)), Some(2.0));
    }

    #[test]
    fn test_zero_capacity_disables_storage() {
        let mut cache = MemoCache::new(Some(0));
        cache.store(key(0), 1.0);
        assert_eq!(cache.lookup(&key(0)), None);
        assert_eq!(cache.stats().len, 0);
    }

    #[test]
    fn test_restore_existing_key_does_not_evict() {
        let mut cache = MemoCache::new(Some(2));
        cache.store(key(0), 0.0);
        cache.store(key(1), 1.0);
        cache.store(key(1), 1.5);

        assert_eq!(cache.stats().len, 2);
        assert_eq!(cache.lookup(&key(0)), Some(0.0));
        assert_eq!(cache.lookup(&key(1)), Some(1.5));
    }

    #[test]
    fn test_display_formats() {
        let cache = MemoCache::new(Some(16));
        assert_eq!(cache.stats().to_string(), "hits=0 misses=0 size=0 capacity=16");

        let unbounded = MemoCache::new(None);
        assert_eq!(
            unbounded.stats().to_string(),
            "hits=0 misses=0 size=0 capacity=unbounded"
        );
    }
}
