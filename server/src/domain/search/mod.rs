//! Search routing
//!
//! A resolve walks the sources from cheapest to most expensive and stops at
//! the first non-empty answer:
//!
//! 1. blank query: empty `local` answer
//! 2. cache (skipped on `force_refresh` / `freshness_required`)
//! 3. local catalogue
//! 4. web adapter, after consuming `web` quota
//! 5. AI adapter, after consuming `ai` quota
//! 6. degraded: empty answer with `degrade_level = 2`
//!
//! Non-empty answers from steps 3-5 are cached. Paid routes run strictly in
//! sequence and only after the cheaper ones came back empty.

pub mod adapters;
pub mod cache;
pub mod types;

use std::sync::Arc;
use std::time::Instant;

use serde_json::{Value, json};

pub use adapters::{SearchAdapter, parse_ai_reply, parse_tianxing};
pub use cache::{CachedSearch, SearchCache};
pub use types::{
    DegradeReason, Ingredient, ResolveRequest, ResolveResponse, Route, SearchCaller, SearchResult,
    SearchSource,
};

use crate::core::metrics::MetricsService;
use crate::domain::quota::{QuotaService, RequestClass};

/// The three sources the router can call
pub struct SearchAdapters {
    pub local: Arc<dyn SearchAdapter>,
    pub web: Arc<dyn SearchAdapter>,
    pub ai: Arc<dyn SearchAdapter>,
}

pub struct SearchService {
    adapters: SearchAdapters,
    quota: Arc<QuotaService>,
    cache: Arc<SearchCache>,
    metrics: Arc<MetricsService>,
}

/// Cache key input combining the request context with its intent label
fn cache_context(request: &ResolveRequest) -> Option<Value> {
    let context = request.context.as_ref().filter(|c| !c.is_null());
    let intent = request
        .intent_type
        .as_deref()
        .map(str::trim)
        .filter(|i| !i.is_empty());
    match intent {
        None => context.cloned(),
        Some(intent) => Some(json!({ "context": context, "intent": intent })),
    }
}

impl SearchService {
    pub fn new(
        adapters: SearchAdapters,
        quota: Arc<QuotaService>,
        cache: Arc<SearchCache>,
        metrics: Arc<MetricsService>,
    ) -> Self {
        Self {
            adapters,
            quota,
            cache,
            metrics,
        }
    }

    pub fn adapter(&self, source: SearchSource) -> &Arc<dyn SearchAdapter> {
        match source {
            SearchSource::Local => &self.adapters.local,
            SearchSource::Tianxing => &self.adapters.web,
            SearchSource::Ai => &self.adapters.ai,
        }
    }

    /// Resolve a search through cache, local, web and AI in that order
    pub async fn resolve(&self, caller: &SearchCaller, request: &ResolveRequest) -> ResolveResponse {
        let started = Instant::now();
        let response = self.route(caller, request).await;
        self.metrics
            .record_search(response.route_used.as_str(), started.elapsed());
        if let Some(reason) = response.degrade_reason {
            self.metrics.record_degraded(reason.as_str());
        }
        tracing::debug!(
            user_id = %caller.user_id,
            tier = %caller.tier,
            route = response.route_used.as_str(),
            items = response.items.len(),
            degrade_level = response.degrade_level,
            "Search resolved"
        );
        response
    }

    /// Single keyword search with default options
    pub async fn search_keyword(&self, caller: &SearchCaller, keyword: &str) -> ResolveResponse {
        let request = ResolveRequest {
            query: keyword.to_string(),
            ..Default::default()
        };
        self.resolve(caller, &request).await
    }

    /// Call one adapter directly, bypassing cache and quota
    pub async fn search_source(&self, source: SearchSource, keyword: &str) -> Vec<SearchResult> {
        let keyword = keyword.trim();
        if keyword.is_empty() {
            return Vec::new();
        }
        let items = self.adapter(source).search(keyword).await;
        self.record_adapter(source, &items);
        items
    }

    async fn route(&self, caller: &SearchCaller, request: &ResolveRequest) -> ResolveResponse {
        let keyword = request.query.trim();
        if keyword.is_empty() {
            return ResolveResponse::answered(Vec::new(), Route::Local, 0);
        }

        let context = cache_context(request);
        let cache_key = self
            .quota
            .make_search_cache_key(keyword, context.as_ref(), caller.tier);

        if request.force_refresh || request.freshness_required {
            self.metrics.record_cache("bypass");
        } else if let Some(cached) = self.cache.get(&cache_key).await {
            self.metrics.record_cache("hit");
            return ResolveResponse::answered(cached.items, Route::Cache, 0);
        } else {
            self.metrics.record_cache("miss");
        }

        let local = self.search_source(SearchSource::Local, keyword).await;
        if !local.is_empty() {
            self.cache.put(&cache_key, SearchSource::Local, &local).await;
            return ResolveResponse::answered(local, Route::Local, 0);
        }

        let mut quota_denied = false;
        let paid = [
            (RequestClass::Web, SearchSource::Tianxing, Route::Web),
            (RequestClass::Ai, SearchSource::Ai, Route::Ai),
        ];
        for (class, source, route) in paid {
            let decision = self.quota.consume(&caller.user_id, caller.tier, class).await;
            if !decision.allowed {
                quota_denied = true;
                self.metrics.record_adapter(source.as_str(), "skipped");
                tracing::debug!(
                    user_id = %caller.user_id,
                    class = class.as_str(),
                    reason = decision.reason.map(|r| r.as_str()),
                    "Paid route skipped"
                );
                continue;
            }

            let items = self.search_source(source, keyword).await;
            if !items.is_empty() {
                self.cache.put(&cache_key, source, &items).await;
                let level = if quota_denied { 1 } else { 0 };
                return ResolveResponse::answered(items, route, level);
            }
        }

        let reason = if quota_denied {
            DegradeReason::QuotaExhausted
        } else {
            DegradeReason::NoMatch
        };
        ResolveResponse::degraded(reason)
    }

    fn record_adapter(&self, source: SearchSource, items: &[SearchResult]) {
        let outcome = if items.is_empty() { "empty" } else { "ok" };
        self.metrics.record_adapter(source.as_str(), outcome);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use async_trait::async_trait;

    use crate::data::kv::{FaultInjection, KeyBuilder, KvClient, MemoryKvBackend};
    use crate::domain::quota::{ClassLimits, QuotaLimits, Tier};

    struct FakeAdapter {
        source: SearchSource,
        names: Vec<&'static str>,
        calls: AtomicUsize,
    }

    impl FakeAdapter {
        fn new(source: SearchSource, names: Vec<&'static str>) -> Arc<Self> {
            Arc::new(Self {
                source,
                names,
                calls: AtomicUsize::new(0),
            })
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl SearchAdapter for FakeAdapter {
        fn source(&self) -> SearchSource {
            self.source
        }

        async fn search(&self, _keyword: &str) -> Vec<SearchResult> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.names
                .iter()
                .enumerate()
                .map(|(i, n)| SearchResult::new(format!("{}_{i}", self.source), *n, self.source))
                .collect()
        }
    }

    struct Harness {
        service: SearchService,
        local: Arc<FakeAdapter>,
        web: Arc<FakeAdapter>,
        ai: Arc<FakeAdapter>,
        quota: Arc<QuotaService>,
    }

    fn harness(
        local: Vec<&'static str>,
        web: Vec<&'static str>,
        ai: Vec<&'static str>,
        free: ClassLimits,
    ) -> Harness {
        let metrics = Arc::new(MetricsService::new());
        let kv = Arc::new(KvClient::new(
            Arc::new(MemoryKvBackend::new()),
            FaultInjection::none(),
            Duration::from_secs(5),
            metrics.clone(),
        ));
        let keys = KeyBuilder::new("test");
        let limits = QuotaLimits {
            free,
            ..Default::default()
        };
        let quota = Arc::new(QuotaService::new(limits, keys, kv.clone(), metrics.clone()));
        let cache = Arc::new(SearchCache::new(kv));

        let local = FakeAdapter::new(SearchSource::Local, local);
        let web = FakeAdapter::new(SearchSource::Tianxing, web);
        let ai = FakeAdapter::new(SearchSource::Ai, ai);
        let adapters = SearchAdapters {
            local: local.clone(),
            web: web.clone(),
            ai: ai.clone(),
        };
        Harness {
            service: SearchService::new(adapters, quota.clone(), cache, metrics),
            local,
            web,
            ai,
            quota,
        }
    }

    fn caller() -> SearchCaller {
        SearchCaller::new("u1", Tier::Free)
    }

    fn request(query: &str) -> ResolveRequest {
        ResolveRequest {
            query: query.to_string(),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_blank_query_is_empty_local() {
        let h = harness(vec!["a"], vec![], vec![], ClassLimits::new(5, 5));
        let response = h.service.resolve(&caller(), &request("   ")).await;
        assert_eq!(response.route_used, Route::Local);
        assert!(response.items.is_empty());
        assert_eq!(response.degrade_level, 0);
        assert_eq!(h.local.calls(), 0);
    }

    #[tokio::test]
    async fn test_local_hit_consumes_no_quota() {
        let h = harness(vec!["番茄炒蛋"], vec!["x"], vec!["y"], ClassLimits::new(5, 5));
        let response = h.service.resolve(&caller(), &request("番茄")).await;
        assert_eq!(response.route_used, Route::Local);
        assert_eq!(h.web.calls(), 0);
        assert_eq!(h.ai.calls(), 0);

        let status = h.quota.status("u1", Tier::Free).await;
        assert_eq!(status.user.web.used, 0);
        assert_eq!(status.user.ai.used, 0);
    }

    #[tokio::test]
    async fn test_web_answer_skips_ai() {
        let h = harness(vec![], vec!["麻婆豆腐"], vec!["y"], ClassLimits::new(5, 5));
        let response = h.service.resolve(&caller(), &request("豆腐")).await;
        assert_eq!(response.route_used, Route::Web);
        assert_eq!(response.degrade_level, 0);
        assert_eq!(h.ai.calls(), 0);
    }

    #[tokio::test]
    async fn test_second_request_hits_cache() {
        let h = harness(vec![], vec!["麻婆豆腐"], vec![], ClassLimits::new(5, 5));
        h.service.resolve(&caller(), &request("豆腐")).await;
        let response = h.service.resolve(&caller(), &request("  豆腐 ")).await;
        assert_eq!(response.route_used, Route::Cache);
        assert!(response.cache_hit);
        assert_eq!(response.items[0].name, "麻婆豆腐");
        assert_eq!(h.web.calls(), 1);
    }

    #[tokio::test]
    async fn test_force_refresh_bypasses_cache() {
        let h = harness(vec!["a"], vec![], vec![], ClassLimits::new(5, 5));
        h.service.resolve(&caller(), &request("a")).await;
        let mut req = request("a");
        req.force_refresh = true;
        let response = h.service.resolve(&caller(), &req).await;
        assert_eq!(response.route_used, Route::Local);
        assert_eq!(h.local.calls(), 2);
    }

    #[tokio::test]
    async fn test_intent_partitions_cache() {
        let h = harness(vec!["a"], vec![], vec![], ClassLimits::new(5, 5));
        h.service.resolve(&caller(), &request("a")).await;
        let mut req = request("a");
        req.intent_type = Some("shopping".to_string());
        let response = h.service.resolve(&caller(), &req).await;
        assert_eq!(response.route_used, Route::Local);
    }

    #[tokio::test]
    async fn test_web_quota_denied_falls_to_ai() {
        let h = harness(vec![], vec!["x"], vec!["ai dish"], ClassLimits::new(1, 5));
        h.quota.consume("u1", Tier::Free, RequestClass::Web).await;

        let response = h.service.resolve(&caller(), &request("dish")).await;
        assert_eq!(response.route_used, Route::Ai);
        assert_eq!(response.degrade_level, 1);
        assert_eq!(h.web.calls(), 0);
    }

    #[tokio::test]
    async fn test_everything_empty_is_no_match() {
        let h = harness(vec![], vec![], vec![], ClassLimits::new(5, 5));
        let response = h.service.resolve(&caller(), &request("nothing")).await;
        assert_eq!(response.route_used, Route::Degraded);
        assert_eq!(response.degrade_level, 2);
        assert_eq!(response.degrade_reason, Some(DegradeReason::NoMatch));
    }

    #[tokio::test]
    async fn test_quota_exhausted_degrades() {
        let h = harness(vec![], vec!["x"], vec!["y"], ClassLimits::new(1, 1));
        h.quota.consume("u1", Tier::Free, RequestClass::Web).await;
        h.quota.consume("u1", Tier::Free, RequestClass::Ai).await;

        let response = h.service.resolve(&caller(), &request("dish")).await;
        assert_eq!(response.route_used, Route::Degraded);
        assert_eq!(response.degrade_reason, Some(DegradeReason::QuotaExhausted));
        assert_eq!(h.web.calls() + h.ai.calls(), 0);
    }

    #[tokio::test]
    async fn test_empty_answers_are_not_cached() {
        let h = harness(vec![], vec![], vec![], ClassLimits::new(5, 5));
        h.service.resolve(&caller(), &request("dish")).await;
        let response = h.service.resolve(&caller(), &request("dish")).await;
        assert_eq!(response.route_used, Route::Degraded);
        assert_eq!(h.local.calls(), 2);
    }

    #[tokio::test]
    async fn test_search_source_bypasses_router() {
        let h = harness(vec!["a"], vec!["b"], vec!["c"], ClassLimits::new(0, 0));
        let items = h.service.search_source(SearchSource::Ai, "c").await;
        assert_eq!(items.len(), 1);
        assert_eq!(h.local.calls(), 0);
    }
}
