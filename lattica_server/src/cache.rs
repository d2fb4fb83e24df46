//! Retrieval result memoization.
//!
//! Keyed by `(query_hash, plan_hash, store_generation)` with a TTL. The
//! store generation is a process-wide monotonic counter bumped by every
//! ingest, delete, clear, and rebuild, so any write invalidates all cached
//! retrievals without scanning them.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use sha2::{Digest, Sha256};

use lattica_core::RankedContext;

/// Cache key: query hash, plan fingerprint, store generation.
pub type CacheKey = (String, String, u64);

/// Hash the retrieval-relevant request parameters.
pub fn query_hash(query: &str, top_k: usize, domain: Option<&str>) -> String {
    let mut hasher = Sha256::new();
    hasher.update(query.as_bytes());
    hasher.update([0x1f]);
    hasher.update(top_k.to_le_bytes());
    hasher.update([0x1f]);
    hasher.update(domain.unwrap_or("").as_bytes());
    let digest = hasher.finalize();
    digest[..12].iter().map(|b| format!("{b:02x}")).collect()
}

/// TTL cache over ranked retrieval contexts.
pub struct RetrievalCache {
    enabled: bool,
    ttl: Duration,
    inner: Mutex<HashMap<CacheKey, (Instant, RankedContext)>>,
}

impl RetrievalCache {
    /// Create a cache. When disabled, `get` always misses and `put` is a
    /// no-op.
    pub fn new(enabled: bool, ttl: Duration) -> Self {
        Self {
            enabled,
            ttl,
            inner: Mutex::new(HashMap::new()),
        }
    }

    /// Fetch a live entry.
    pub fn get(&self, key: &CacheKey) -> Option<RankedContext> {
        if !self.enabled {
            return None;
        }
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        match inner.get(key) {
            Some((at, context)) if at.elapsed() < self.ttl => Some(context.clone()),
            Some(_) => {
                inner.remove(key);
                None
            }
            None => None,
        }
    }

    /// Store a retrieval result, evicting entries from older generations.
    pub fn put(&self, key: CacheKey, context: RankedContext) {
        if !self.enabled {
            return;
        }
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        let generation = key.2;
        inner.retain(|(_, _, g), (at, _)| *g == generation && at.elapsed() < self.ttl);
        inner.insert(key, (Instant::now(), context));
    }

    /// Number of live entries (for metrics).
    pub fn len(&self) -> usize {
        self.inner.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    /// Whether the cache holds no entries.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn context() -> RankedContext {
        RankedContext {
            chunks: vec![],
            entities: vec![],
            paths: vec![],
            degraded_strategies: vec![],
            partial: false,
            confidence: 0.9,
        }
    }

    #[test]
    fn test_hit_within_ttl() {
        let cache = RetrievalCache::new(true, Duration::from_secs(60));
        let key = (query_hash("q", 10, None), "plan".to_string(), 1);
        assert!(cache.get(&key).is_none());
        cache.put(key.clone(), context());
        assert!(cache.get(&key).is_some());
    }

    #[test]
    fn test_expiry() {
        let cache = RetrievalCache::new(true, Duration::from_millis(0));
        let key = (query_hash("q", 10, None), "plan".to_string(), 1);
        cache.put(key.clone(), context());
        assert!(cache.get(&key).is_none(), "zero TTL expires immediately");
    }

    #[test]
    fn test_generation_miss_and_eviction() {
        let cache = RetrievalCache::new(true, Duration::from_secs(60));
        let old = (query_hash("q", 10, None), "plan".to_string(), 1);
        cache.put(old.clone(), context());

        // Same query at a newer generation misses.
        let new = (old.0.clone(), old.1.clone(), 2);
        assert!(cache.get(&new).is_none());

        // Writing the new generation evicts the old one.
        cache.put(new.clone(), context());
        assert_eq!(cache.len(), 1);
        assert!(cache.get(&old).is_none());
        assert!(cache.get(&new).is_some());
    }

    #[test]
    fn test_disabled_cache_never_hits() {
        let cache = RetrievalCache::new(false, Duration::from_secs(60));
        let key = (query_hash("q", 10, None), "plan".to_string(), 1);
        cache.put(key.clone(), context());
        assert!(cache.get(&key).is_none());
        assert!(cache.is_empty());
    }

    #[test]
    fn test_query_hash_sensitivity() {
        assert_ne!(query_hash("a", 10, None), query_hash("b", 10, None));
        assert_ne!(query_hash("a", 10, None), query_hash("a", 5, None));
        assert_ne!(query_hash("a", 10, None), query_hash("a", 10, Some("general")));
        assert_eq!(query_hash("a", 10, Some("x")), query_hash("a", 10, Some("x")));
    }
}
