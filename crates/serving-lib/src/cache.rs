//! Thread-safe LRU cache for served predictions
//!
//! Every operation runs its full read-modify-write sequence under a single
//! mutex critical section, so concurrent callers can never observe a
//! partially-evicted or partially-reordered cache.

use crate::models::{CacheStats, CachedBundle};
use std::collections::HashMap;
use std::sync::Mutex;
use tracing::debug;

struct Slot {
    bundle: CachedBundle,
    /// Logical access time; higher means more recently used.
    last_used: u64,
}

struct CacheInner {
    entries: HashMap<String, Slot>,
    tick: u64,
    hits: u64,
    misses: u64,
}

/// Fixed-capacity least-recently-used cache of prediction bundles.
pub struct PredictionCache {
    capacity: usize,
    inner: Mutex<CacheInner>,
}

impl PredictionCache {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            inner: Mutex::new(CacheInner {
                entries: HashMap::new(),
                tick: 0,
                hits: 0,
                misses: 0,
            }),
        }
    }

    /// Look up a bundle. A hit refreshes recency and bumps the hit counter;
    /// a miss bumps the miss counter.
    pub fn get(&self, key: &str) -> Option<CachedBundle> {
        let mut guard = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        let inner = &mut *guard;
        inner.tick += 1;
        let tick = inner.tick;
        match inner.entries.get_mut(key) {
            Some(slot) => {
                slot.last_used = tick;
                inner.hits += 1;
                Some(slot.bundle.clone())
            }
            None => {
                inner.misses += 1;
                None
            }
        }
    }

    /// Insert or refresh a bundle. At capacity, the least-recently-used
    /// entry is evicted before the new one is inserted.
    pub fn put(&self, key: &str, bundle: CachedBundle) {
        let mut guard = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        let inner = &mut *guard;
        inner.tick += 1;
        let tick = inner.tick;

        if let Some(slot) = inner.entries.get_mut(key) {
            slot.bundle = bundle;
            slot.last_used = tick;
            return;
        }

        if inner.entries.len() >= self.capacity {
            let victim = inner
                .entries
                .iter()
                .min_by_key(|(_, slot)| slot.last_used)
                .map(|(k, _)| k.clone());
            if let Some(victim) = victim {
                inner.entries.remove(&victim);
                debug!(key = %victim, "Evicted least-recently-used cache entry");
            }
        }

        inner.entries.insert(
            key.to_string(),
            Slot {
                bundle,
                last_used: tick,
            },
        );
    }

    /// Drop every entry. Counters are preserved.
    pub fn clear(&self) {
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        inner.entries.clear();
    }

    pub fn stats(&self) -> CacheStats {
        let inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        let accesses = inner.hits + inner.misses;
        let hit_rate = if accesses == 0 {
            0.0
        } else {
            inner.hits as f64 / accesses as f64
        };
        CacheStats {
            size: inner.entries.len(),
            capacity: self.capacity,
            hits: inner.hits,
            misses: inner.misses,
            hit_rate,
        }
    }

    /// True when the key is currently resident. Does not touch recency or
    /// the hit/miss counters.
    #[cfg(test)]
    fn contains(&self, key: &str) -> bool {
        let inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        inner.entries.contains_key(key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::Arc;

    fn bundle(version: &str) -> CachedBundle {
        let mut predictions = HashMap::new();
        predictions.insert("views".to_string(), 100.0);
        CachedBundle {
            predictions,
            confidence: 0.7,
            model_version: version.to_string(),
        }
    }

    #[test]
    fn test_get_miss_returns_none() {
        let cache = PredictionCache::new(2);
        assert!(cache.get("absent").is_none());
        let stats = cache.stats();
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.hits, 0);
    }

    #[test]
    fn test_put_then_get() {
        let cache = PredictionCache::new(2);
        cache.put("a", bundle("v1"));
        let got = cache.get("a").unwrap();
        assert_eq!(got.model_version, "v1");
        assert_eq!(cache.stats().hits, 1);
    }

    #[test]
    fn test_capacity_evicts_exactly_one_lru_entry() {
        let cache = PredictionCache::new(3);
        cache.put("a", bundle("v1"));
        cache.put("b", bundle("v1"));
        cache.put("c", bundle("v1"));
        cache.put("d", bundle("v1"));

        let stats = cache.stats();
        assert_eq!(stats.size, 3);
        assert!(!cache.contains("a"));
        assert!(cache.contains("b"));
        assert!(cache.contains("c"));
        assert!(cache.contains("d"));
    }

    #[test]
    fn test_get_refreshes_recency() {
        // Capacity 2: put A, put B, get A, put C -> B is the LRU victim.
        let cache = PredictionCache::new(2);
        cache.put("a", bundle("v1"));
        cache.put("b", bundle("v1"));
        assert!(cache.get("a").is_some());
        cache.put("c", bundle("v1"));

        assert!(cache.contains("a"));
        assert!(!cache.contains("b"));
        assert!(cache.contains("c"));
    }

    #[test]
    fn test_put_existing_refreshes_without_eviction() {
        let cache = PredictionCache::new(2);
        cache.put("a", bundle("v1"));
        cache.put("b", bundle("v1"));
        cache.put("a", bundle("v2"));

        assert_eq!(cache.stats().size, 2);
        assert_eq!(cache.get("a").unwrap().model_version, "v2");

        // "b" is now least recently used.
        cache.put("c", bundle("v1"));
        assert!(!cache.contains("b"));
    }

    #[test]
    fn test_hit_rate_arithmetic() {
        let cache = PredictionCache::new(2);
        assert_eq!(cache.stats().hit_rate, 0.0);

        cache.put("a", bundle("v1"));
        cache.get("a");
        cache.get("a");
        cache.get("missing");

        let stats = cache.stats();
        assert_eq!(stats.hits, 2);
        assert_eq!(stats.misses, 1);
        assert!((stats.hit_rate - 2.0 / 3.0).abs() < 1e-9);
    }

    #[test]
    fn test_clear_preserves_counters() {
        let cache = PredictionCache::new(2);
        cache.put("a", bundle("v1"));
        cache.get("a");
        cache.clear();

        let stats = cache.stats();
        assert_eq!(stats.size, 0);
        assert_eq!(stats.hits, 1);
        assert!(cache.get("a").is_none());
    }

    #[test]
    fn test_concurrent_access_keeps_counters_consistent() {
        let cache = Arc::new(PredictionCache::new(8));
        let mut handles = Vec::new();
        for t in 0..4 {
            let cache = Arc::clone(&cache);
            handles.push(std::thread::spawn(move || {
                for i in 0..100 {
                    let key = format!("k{}", (t * 100 + i) % 16);
                    cache.put(&key, bundle("v1"));
                    cache.get(&key);
                }
            }));
        }
        for h in handles {
            h.join().unwrap();
        }

        let stats = cache.stats();
        assert_eq!(stats.hits + stats.misses, 400);
        assert!(stats.size <= 8);
    }
}
