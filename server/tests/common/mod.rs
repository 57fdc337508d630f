//! Shared fixtures for integration tests
#![allow(dead_code)]

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;

use recipe_search_server::api::ApiServices;
use recipe_search_server::core::MetricsService;
use recipe_search_server::data::kv::{
    FaultInjection, KeyBuilder, KvClient, MemoryKvBackend, RateLimitBucket, RateLimiter,
};
use recipe_search_server::domain::quota::{ClassLimits, QuotaLimits};
use recipe_search_server::domain::search::{
    SearchAdapter, SearchAdapters, SearchCache, SearchResult, SearchSource,
};
use recipe_search_server::domain::{IdempotencyService, QuotaService, SearchService};

/// Adapter returning a fixed answer and counting calls
pub struct FakeAdapter {
    source: SearchSource,
    items: Vec<SearchResult>,
    calls: AtomicUsize,
}

impl FakeAdapter {
    pub fn new(source: SearchSource, names: &[&str]) -> Arc<Self> {
        let items = names
            .iter()
            .enumerate()
            .map(|(i, name)| SearchResult::new(format!("{}_{}", source, i), *name, source))
            .collect();
        Arc::new(Self {
            source,
            items,
            calls: AtomicUsize::new(0),
        })
    }

    pub fn empty(source: SearchSource) -> Arc<Self> {
        Self::new(source, &[])
    }

    pub fn calls(&self) -> usize {
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
        self.items.clone()
    }
}

/// How the shared KV behaves in a test
pub enum KvMode {
    /// Healthy in-process backend
    Ready,
    /// Backend present but every operation fails
    Faulted(FaultInjection),
    /// No backend configured
    Disabled,
}

pub struct Stack {
    pub metrics: Arc<MetricsService>,
    pub backend: Option<Arc<MemoryKvBackend>>,
    pub kv: Arc<KvClient>,
    pub quota: Arc<QuotaService>,
    pub idempotency: Arc<IdempotencyService>,
    pub search: Arc<SearchService>,
    pub rate_limiter: Arc<RateLimiter>,
    pub local: Arc<FakeAdapter>,
    pub web: Arc<FakeAdapter>,
    pub ai: Arc<FakeAdapter>,
}

pub fn limits(free_web: u64, free_ai: u64, global_web: u64, global_ai: u64) -> QuotaLimits {
    QuotaLimits {
        free: ClassLimits::new(free_web, free_ai),
        global: ClassLimits::new(global_web, global_ai),
        ..QuotaLimits::default()
    }
}

pub fn stack(
    mode: KvMode,
    limits: QuotaLimits,
    local: Arc<FakeAdapter>,
    web: Arc<FakeAdapter>,
    ai: Arc<FakeAdapter>,
) -> Stack {
    let metrics = Arc::new(MetricsService::new());
    let (backend, kv) = match mode {
        KvMode::Ready => {
            let backend = Arc::new(MemoryKvBackend::new());
            let kv = KvClient::new(
                backend.clone(),
                FaultInjection::none(),
                Duration::from_secs(5),
                metrics.clone(),
            );
            (Some(backend), kv)
        }
        KvMode::Faulted(faults) => {
            let backend = Arc::new(MemoryKvBackend::new());
            let kv = KvClient::new(
                backend.clone(),
                faults,
                Duration::from_secs(5),
                metrics.clone(),
            );
            (Some(backend), kv)
        }
        KvMode::Disabled => (None, KvClient::disabled(metrics.clone())),
    };
    let kv = Arc::new(kv);

    let keys = KeyBuilder::new("test");
    let quota = Arc::new(QuotaService::new(
        limits,
        keys.clone(),
        kv.clone(),
        metrics.clone(),
    ));
    let idempotency = Arc::new(IdempotencyService::new(
        keys.clone(),
        kv.clone(),
        metrics.clone(),
    ));
    let cache = Arc::new(SearchCache::new(kv.clone()));
    let search = Arc::new(SearchService::new(
        SearchAdapters {
            local: local.clone(),
            web: web.clone(),
            ai: ai.clone(),
        },
        quota.clone(),
        cache,
        metrics.clone(),
    ));
    let rate_limiter = Arc::new(RateLimiter::new(kv.clone(), keys));

    Stack {
        metrics,
        backend,
        kv,
        quota,
        idempotency,
        search,
        rate_limiter,
        local,
        web,
        ai,
    }
}

impl Stack {
    pub fn services(&self, rpm: Option<u32>) -> ApiServices {
        ApiServices {
            kv: self.kv.clone(),
            metrics: self.metrics.clone(),
            quota: self.quota.clone(),
            idempotency: self.idempotency.clone(),
            search: self.search.clone(),
            rate_limiter: self.rate_limiter.clone(),
            rate_limit: rpm.map(RateLimitBucket::search),
        }
    }
}
