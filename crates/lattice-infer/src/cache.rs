//! Generation-validated inference cache
//!
//! Bounded TTL-LRU, sharded by edge type so one noisy type cannot evict
//! another's entries. Every value carries the store generation it was
//! computed at; a hit is only served while the store's per-type generation
//! still matches, otherwise the entry is dropped on the spot.

use std::num::NonZeroUsize;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use dashmap::DashMap;
use lru::LruCache;

use lattice_core::{EdgeId, NodeId};

/// What kind of traversal a cached value answers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum QueryKind {
    Transitive,
    Hierarchical,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    pub kind: QueryKind,
    pub start: NodeId,
    /// Fingerprint of the query options.
    pub params: u64,
}

/// A cached traversal: target node ids with depth and the underlying edge
/// ids that justify them.
#[derive(Debug, Clone, PartialEq)]
pub struct CachedTraversal {
    pub targets: Vec<(NodeId, u32, Vec<EdgeId>)>,
    pub cycle_detected: bool,
    pub truncated: bool,
    pub generation: u64,
}

struct CacheEntry {
    value: CachedTraversal,
    inserted: Instant,
}

#[derive(Debug, Clone, Copy)]
pub struct CacheConfig {
    pub capacity_per_shard: usize,
    pub ttl: Duration,
}

impl Default for CacheConfig {
    fn default() -> Self {
        CacheConfig {
            capacity_per_shard: 256,
            ttl: Duration::from_secs(60),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
    pub entries: usize,
}

pub struct InferenceCache {
    shards: DashMap<String, Mutex<LruCache<CacheKey, CacheEntry>>>,
    config: CacheConfig,
    hits: AtomicU64,
    misses: AtomicU64,
    evictions: AtomicU64,
}

impl InferenceCache {
    pub fn new(config: CacheConfig) -> Self {
        InferenceCache {
            shards: DashMap::new(),
            config,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            evictions: AtomicU64::new(0),
        }
    }

    /// A hit is valid iff the entry is inside its TTL and was computed at
    /// the current per-type generation; stale entries are evicted inline.
    pub fn get(
        &self,
        edge_type: &str,
        key: &CacheKey,
        current_generation: u64,
    ) -> Option<CachedTraversal> {
        let Some(shard) = self.shards.get(edge_type) else {
            self.misses.fetch_add(1, Ordering::Relaxed);
            return None;
        };
        let mut cache = shard.lock().unwrap();
        let entry_state = match cache.get(key) {
            Some(entry) => {
                if entry.inserted.elapsed() > self.config.ttl
                    || entry.value.generation != current_generation
                {
                    None
                } else {
                    Some(entry.value.clone())
                }
            }
            None => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                return None;
            }
        };
        match entry_state {
            Some(value) => {
                self.hits.fetch_add(1, Ordering::Relaxed);
                Some(value)
            }
            None => {
                cache.pop(key);
                self.evictions.fetch_add(1, Ordering::Relaxed);
                self.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
        }
    }

    pub fn insert(&self, edge_type: &str, key: CacheKey, value: CachedTraversal) {
        let shard = self.shards.entry(edge_type.to_string()).or_insert_with(|| {
            let capacity = NonZeroUsize::new(self.config.capacity_per_shard.max(1))
                .expect("capacity is at least 1");
            Mutex::new(LruCache::new(capacity))
        });
        let mut cache = shard.lock().unwrap();
        let at_capacity = cache.len() == cache.cap().get();
        let replaced = cache
            .put(
                key,
                CacheEntry {
                    value,
                    inserted: Instant::now(),
                },
            )
            .is_some();
        if at_capacity && !replaced {
            self.evictions.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Drop every entry for one edge type.
    pub fn invalidate_type(&self, edge_type: &str) {
        if let Some(shard) = self.shards.get(edge_type) {
            let mut cache = shard.lock().unwrap();
            let dropped = cache.len() as u64;
            cache.clear();
            self.evictions.fetch_add(dropped, Ordering::Relaxed);
        }
    }

    pub fn invalidate_all(&self) {
        for shard in self.shards.iter() {
            let mut cache = shard.lock().unwrap();
            let dropped = cache.len() as u64;
            cache.clear();
            self.evictions.fetch_add(dropped, Ordering::Relaxed);
        }
    }

    pub fn stats(&self) -> CacheStats {
        let entries = self
            .shards
            .iter()
            .map(|shard| shard.lock().unwrap().len())
            .sum();
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            evictions: self.evictions.load(Ordering::Relaxed),
            entries,
        }
    }
}

impl Default for InferenceCache {
    fn default() -> Self {
        Self::new(CacheConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn traversal(generation: u64) -> CachedTraversal {
        CachedTraversal {
            targets: vec![(NodeId(2), 1, vec![EdgeId(7)])],
            cycle_detected: false,
            truncated: false,
            generation,
        }
    }

    fn key() -> CacheKey {
        CacheKey {
            kind: QueryKind::Transitive,
            start: NodeId(1),
            params: 42,
        }
    }

    #[test]
    fn hit_requires_matching_generation() {
        let cache = InferenceCache::default();
        cache.insert("depends_on", key(), traversal(3));

        assert!(cache.get("depends_on", &key(), 3).is_some());
        assert!(cache.get("depends_on", &key(), 4).is_none(), "stale generation");
        // The stale entry was evicted, not kept around.
        assert!(cache.get("depends_on", &key(), 3).is_none());
    }

    #[test]
    fn shards_are_independent() {
        let cache = InferenceCache::default();
        cache.insert("depends_on", key(), traversal(1));
        cache.insert("extends", key(), traversal(1));

        cache.invalidate_type("depends_on");
        assert!(cache.get("depends_on", &key(), 1).is_none());
        assert!(cache.get("extends", &key(), 1).is_some());
    }

    #[test]
    fn counters_move() {
        let cache = InferenceCache::default();
        assert!(cache.get("depends_on", &key(), 1).is_none());
        cache.insert("depends_on", key(), traversal(1));
        cache.get("depends_on", &key(), 1);

        let stats = cache.stats();
        assert_eq!(stats.hits, 1);
        assert!(stats.misses >= 1);
        assert_eq!(stats.entries, 1);
    }

    #[test]
    fn ttl_expires_entries() {
        let cache = InferenceCache::new(CacheConfig {
            capacity_per_shard: 8,
            ttl: Duration::from_millis(0),
        });
        cache.insert("depends_on", key(), traversal(1));
        std::thread::sleep(Duration::from_millis(2));
        assert!(cache.get("depends_on", &key(), 1).is_none());
    }
}
