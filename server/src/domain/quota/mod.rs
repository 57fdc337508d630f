//! Daily quotas for paid search routes
//!
//! Each consume call checks the caller's per-tier limit and the global
//! ceiling for one request class, and increments both counters only when
//! neither is exhausted. Counters live in the shared KV so every instance
//! sees the same numbers; when the KV cannot answer, the process-local
//! store takes over (allow-and-track) until it is reachable again.
//!
//! Counters are keyed by UTC day and expire an hour after the next UTC
//! midnight.

mod store;
mod types;

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde_json::Value;

pub use store::{AtomicCounterStore, CounterPair, LocalCounterStore, RemoteCounterStore};
pub use types::{
    ClassLimits, ClassUsage, QuotaDecision, QuotaLimits, QuotaReason, QuotaRecord, QuotaSnapshot,
    RequestClass, Tier,
};

use crate::core::constants::QUOTA_TTL_GRACE_SECS;
use crate::core::metrics::MetricsService;
use crate::data::kv::{CounterVerdict, KeyBuilder, KvClient};
use crate::utils::crypto::sha256_hex;
use crate::utils::json::canonical_json;
use crate::utils::time::{next_utc_midnight, seconds_until_utc_midnight, utc_day};

pub struct QuotaService {
    limits: QuotaLimits,
    keys: KeyBuilder,
    remote: Option<Arc<dyn AtomicCounterStore>>,
    local: LocalCounterStore,
    metrics: Arc<MetricsService>,
}

impl QuotaService {
    pub fn new(
        limits: QuotaLimits,
        keys: KeyBuilder,
        kv: Arc<KvClient>,
        metrics: Arc<MetricsService>,
    ) -> Self {
        let remote: Option<Arc<dyn AtomicCounterStore>> = if kv.is_enabled() {
            Some(Arc::new(RemoteCounterStore::new(kv)))
        } else {
            None
        };
        Self::with_store(limits, keys, remote, metrics)
    }

    /// Use a specific remote counter store (or none)
    pub fn with_store(
        limits: QuotaLimits,
        keys: KeyBuilder,
        remote: Option<Arc<dyn AtomicCounterStore>>,
        metrics: Arc<MetricsService>,
    ) -> Self {
        Self {
            limits,
            keys,
            remote,
            local: LocalCounterStore::new(),
            metrics,
        }
    }

    pub fn limits(&self) -> &QuotaLimits {
        &self.limits
    }

    /// Consume one unit of `class` for the caller
    pub async fn consume(&self, user_id: &str, tier: Tier, class: RequestClass) -> QuotaDecision {
        self.consume_at(user_id, tier, class, Utc::now()).await
    }

    pub async fn consume_at(
        &self,
        user_id: &str,
        tier: Tier,
        class: RequestClass,
        now: DateTime<Utc>,
    ) -> QuotaDecision {
        let day = utc_day(now);
        let user_key = self.keys.user_quota(user_id, class.as_str(), &day);
        let global_key = self.keys.global_quota(class.as_str(), &day);
        let pair = CounterPair {
            day: &day,
            user_key: &user_key,
            global_key: &global_key,
            user_limit: self.limits.for_tier(tier).get(class),
            global_limit: self.limits.global.get(class),
            ttl: Duration::from_secs(seconds_until_utc_midnight(now) + QUOTA_TTL_GRACE_SECS),
        };

        let (verdict, backend) = self.consume_pair(&pair).await;

        let outcome = match verdict.denied_by {
            None => "allowed",
            Some(QuotaReason::User) => "denied_user",
            Some(QuotaReason::Global) => "denied_global",
        };
        self.metrics.record_quota(class.as_str(), outcome, backend);
        tracing::debug!(
            %user_id,
            %tier,
            %class,
            outcome,
            backend,
            user_count = verdict.user_count,
            global_count = verdict.global_count,
            "Quota consume"
        );

        QuotaDecision {
            allowed: verdict.allowed,
            reason: verdict.denied_by,
            retry_after_secs: (!verdict.allowed).then(|| seconds_until_utc_midnight(now)),
            reset_at: next_utc_midnight(now),
            backend,
        }
    }

    async fn consume_pair(&self, pair: &CounterPair<'_>) -> (CounterVerdict, &'static str) {
        if let Some(remote) = &self.remote
            && let Some(verdict) = remote.consume_pair(pair).await
        {
            return (verdict, remote.name());
        }
        (self.local.consume_now(pair), "memory")
    }

    /// Current usage for the caller, read-only
    pub async fn status(&self, user_id: &str, tier: Tier) -> QuotaSnapshot {
        self.status_at(user_id, tier, Utc::now()).await
    }

    pub async fn status_at(&self, user_id: &str, tier: Tier, now: DateTime<Utc>) -> QuotaSnapshot {
        let day = utc_day(now);
        let keys = vec![
            self.keys.user_quota(user_id, RequestClass::Web.as_str(), &day),
            self.keys.user_quota(user_id, RequestClass::Ai.as_str(), &day),
            self.keys.global_quota(RequestClass::Web.as_str(), &day),
            self.keys.global_quota(RequestClass::Ai.as_str(), &day),
        ];

        // Local counts only grow while the KV is unusable, so the larger of
        // the two is what consume enforced
        let local = self.local.read_now(&day, &keys);
        let remote = match &self.remote {
            Some(remote) => remote.read(&day, &keys).await.map(|v| (v, remote.name())),
            None => None,
        };
        let (values, backend) = match remote {
            Some((remote, name)) => {
                let local_ahead = local.iter().zip(&remote).any(|(l, r)| l > r);
                let merged = local.iter().zip(&remote).map(|(l, r)| *l.max(r)).collect();
                (merged, if local_ahead { "memory" } else { name })
            }
            None => (local, "memory"),
        };
        let value = |i: usize| values.get(i).copied().unwrap_or(0);

        let reset_at = next_utc_midnight(now);
        let tier_limits = self.limits.for_tier(tier);
        QuotaSnapshot {
            user_id: user_id.to_string(),
            tier,
            day,
            user: ClassUsage {
                web: QuotaRecord::new(value(0), tier_limits.web, reset_at),
                ai: QuotaRecord::new(value(1), tier_limits.ai, reset_at),
            },
            global: ClassUsage {
                web: QuotaRecord::new(value(2), self.limits.global.web, reset_at),
                ai: QuotaRecord::new(value(3), self.limits.global.ai, reset_at),
            },
            backend,
        }
    }

    /// Cache key for a search request.
    ///
    /// The query is trimmed, lowercased and has internal whitespace
    /// collapsed; the context is canonicalized. Requests that differ only
    /// cosmetically share a key, while different tiers never do.
    pub fn make_search_cache_key(&self, query: &str, context: Option<&Value>, tier: Tier) -> String {
        let normalized = query
            .split_whitespace()
            .collect::<Vec<_>>()
            .join(" ")
            .to_lowercase();
        let context = match context {
            None | Some(Value::Null) => String::new(),
            Some(value) => canonical_json(value),
        };
        let fingerprint = sha256_hex(format!("{}\n{}\n{}", normalized, context, tier.as_str()));
        self.keys.cache_search(&fingerprint)
    }
}
