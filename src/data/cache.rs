use dashmap::DashMap;
use serde_json::Value;
use std::time::{Duration, Instant};

use crate::data::types::SourceKind;

/// Last good raw batch per source, used as a stale fallback when a
/// collaborator fails or times out mid-run.
pub struct SourceCache {
    cache: DashMap<SourceKind, CachedBatch>,
    ttl: Duration,
}

struct CachedBatch {
    payload: Value,
    stored_at: Instant,
}

impl SourceCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            cache: DashMap::new(),
            ttl,
        }
    }

    /// Store the latest successfully fetched payload for a source.
    pub fn store(&self, kind: SourceKind, payload: Value) {
        self.cache.insert(
            kind,
            CachedBatch {
                payload,
                stored_at: Instant::now(),
            },
        );
    }

    /// Get the cached payload if not expired (evict on read).
    pub fn get(&self, kind: SourceKind) -> Option<Value> {
        let expired = self
            .cache
            .get(&kind)
            .map(|entry| entry.stored_at.elapsed() > self.ttl)?;
        if expired {
            self.cache.remove(&kind);
            None
        } else {
            self.cache.get(&kind).map(|entry| entry.payload.clone())
        }
    }

    pub fn clear(&self) {
        self.cache.clear();
    }

    pub fn len(&self) -> usize {
        self.cache.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cache.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::thread;

    #[test]
    fn test_store_and_get() {
        let cache = SourceCache::new(Duration::from_secs(60));
        cache.store(SourceKind::Market, json!({"spot": 341.73}));

        assert_eq!(cache.get(SourceKind::Market), Some(json!({"spot": 341.73})));
        assert_eq!(cache.get(SourceKind::Climate), None);
    }

    #[test]
    fn test_ttl_expiration() {
        let cache = SourceCache::new(Duration::from_millis(50));
        cache.store(SourceKind::Climate, json!({"events": []}));

        assert!(cache.get(SourceKind::Climate).is_some());

        thread::sleep(Duration::from_millis(80));

        assert_eq!(cache.get(SourceKind::Climate), None);
        assert!(cache.is_empty());
    }

    #[test]
    fn test_store_replaces_previous_batch() {
        let cache = SourceCache::new(Duration::from_secs(60));
        cache.store(SourceKind::PriceSeries, json!({"instrument": "NQH2O"}));
        cache.store(SourceKind::PriceSeries, json!({"instrument": "Central Valley"}));

        assert_eq!(cache.len(), 1);
        assert_eq!(
            cache.get(SourceKind::PriceSeries),
            Some(json!({"instrument": "Central Valley"}))
        );
    }
}
