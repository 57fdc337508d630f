//! Search result cache
//!
//! Entries are JSON in the shared KV. When a write cannot reach the KV the
//! entry goes to an in-process moka cache with the same per-entry TTL, and
//! reads check it after the KV.

use std::sync::Arc;
use std::time::{Duration, Instant};

use moka::Expiry;
use moka::future::Cache;
use serde::{Deserialize, Serialize};

use super::types::{SearchResult, SearchSource};
use crate::core::constants::{
    CACHE_TTL_AI_SECS, CACHE_TTL_LOCAL_SECS, CACHE_TTL_WEB_SECS, LOCAL_CACHE_MAX_ENTRIES,
};
use crate::data::kv::KvClient;

/// Cached answer for one search fingerprint
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CachedSearch {
    pub source: SearchSource,
    pub items: Vec<SearchResult>,
}

/// How long results from each source stay cached
pub fn ttl_for(source: SearchSource) -> Duration {
    Duration::from_secs(match source {
        SearchSource::Local => CACHE_TTL_LOCAL_SECS,
        SearchSource::Tianxing => CACHE_TTL_WEB_SECS,
        SearchSource::Ai => CACHE_TTL_AI_SECS,
    })
}

#[derive(Clone)]
struct LocalEntry {
    value: Arc<CachedSearch>,
    ttl: Duration,
}

struct EntryTtl;

impl Expiry<String, LocalEntry> for EntryTtl {
    fn expire_after_create(
        &self,
        _key: &String,
        value: &LocalEntry,
        _created_at: Instant,
    ) -> Option<Duration> {
        Some(value.ttl)
    }

    fn expire_after_update(
        &self,
        _key: &String,
        value: &LocalEntry,
        _updated_at: Instant,
        _duration_until_expiry: Option<Duration>,
    ) -> Option<Duration> {
        Some(value.ttl)
    }
}

pub struct SearchCache {
    kv: Arc<KvClient>,
    local: Cache<String, LocalEntry>,
}

impl SearchCache {
    pub fn new(kv: Arc<KvClient>) -> Self {
        let local = Cache::builder()
            .max_capacity(LOCAL_CACHE_MAX_ENTRIES)
            .expire_after(EntryTtl)
            .build();
        Self { kv, local }
    }

    pub async fn get(&self, key: &str) -> Option<CachedSearch> {
        if let Some(raw) = self.kv.get(key).await {
            match serde_json::from_str::<CachedSearch>(&raw) {
                Ok(cached) => return Some(cached),
                Err(e) => tracing::warn!(%key, error = %e, "Discarding unreadable cache entry"),
            }
        }
        self.local.get(key).await.map(|e| (*e.value).clone())
    }

    /// Cache a non-empty answer; empty answers are never cached
    pub async fn put(&self, key: &str, source: SearchSource, items: &[SearchResult]) {
        if items.is_empty() {
            return;
        }
        let cached = CachedSearch {
            source,
            items: items.to_vec(),
        };
        let ttl = ttl_for(source);
        let stored = match serde_json::to_string(&cached) {
            Ok(json) => self.kv.set(key, &json, ttl).await,
            Err(e) => {
                tracing::warn!(%key, error = %e, "Failed to encode cache entry");
                false
            }
        };
        if !stored {
            self.local
                .insert(
                    key.to_string(),
                    LocalEntry {
                        value: Arc::new(cached),
                        ttl,
                    },
                )
                .await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::metrics::MetricsService;
    use crate::data::kv::{FaultInjection, KvBackend, MemoryKvBackend};

    fn cache(faults: FaultInjection) -> (SearchCache, Arc<MemoryKvBackend>) {
        let backend = Arc::new(MemoryKvBackend::new());
        let kv = Arc::new(KvClient::new(
            backend.clone(),
            faults,
            Duration::from_secs(5),
            Arc::new(MetricsService::new()),
        ));
        (SearchCache::new(kv), backend)
    }

    fn items() -> Vec<SearchResult> {
        vec![SearchResult::new("local_1", "番茄炒蛋", SearchSource::Local)]
    }

    #[test]
    fn test_ttl_per_source() {
        assert_eq!(ttl_for(SearchSource::Tianxing), Duration::from_secs(600));
        assert_eq!(ttl_for(SearchSource::Ai), Duration::from_secs(1800));
    }

    #[tokio::test]
    async fn test_put_then_get_via_kv() {
        let (cache, backend) = cache(FaultInjection::none());
        cache.put("k", SearchSource::Local, &items()).await;
        assert!(backend.calls() > 0);
        let hit = cache.get("k").await.unwrap();
        assert_eq!(hit.source, SearchSource::Local);
        assert_eq!(hit.items, items());
    }

    #[tokio::test]
    async fn test_empty_results_not_cached() {
        let (cache, backend) = cache(FaultInjection::none());
        cache.put("k", SearchSource::Ai, &[]).await;
        assert_eq!(backend.calls(), 0);
        assert!(cache.get("k").await.is_none());
    }

    #[tokio::test]
    async fn test_falls_back_to_local_cache() {
        let (cache, _) = cache(FaultInjection::all());
        cache.put("k", SearchSource::Tianxing, &items()).await;
        let hit = cache.get("k").await.unwrap();
        assert_eq!(hit.source, SearchSource::Tianxing);
    }

    #[tokio::test]
    async fn test_unreadable_entry_is_a_miss() {
        let (cache, backend) = cache(FaultInjection::none());
        backend
            .set("k", "not json", Duration::from_secs(60))
            .await
            .unwrap();
        assert!(cache.get("k").await.is_none());
    }
}
