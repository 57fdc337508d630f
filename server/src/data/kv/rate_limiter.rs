//! Per-caller rate limiter backed by the shared KV
//!
//! Fixed window counter: the window index is `unix_secs / window_secs`, so
//! every instance agrees on window boundaries and the key for each window
//! expires on its own. When the KV is unavailable counting continues in a
//! process-local map with the same windows.
//!
//! # Known Limitations
//!
//! Fixed windows allow up to 2x the limit across a window boundary. That is
//! acceptable for protecting the search endpoints.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use dashmap::DashMap;

use super::KvClient;
use super::key::KeyBuilder;
use crate::core::constants::DEFAULT_RATE_LIMIT_WINDOW_SECS;

/// Rate limit bucket configuration
#[derive(Debug, Clone)]
pub struct RateLimitBucket {
    /// Bucket name used in keys and logs
    pub name: &'static str,
    /// Maximum requests per window
    pub requests_per_window: u32,
    /// Window duration in seconds
    pub window_secs: u64,
    /// Burst allowance (additional requests above limit)
    pub burst: u32,
}

impl RateLimitBucket {
    /// Bucket for the search endpoints
    pub fn search(rpm: u32) -> Self {
        Self {
            name: "search",
            requests_per_window: rpm,
            window_secs: DEFAULT_RATE_LIMIT_WINDOW_SECS,
            burst: rpm / 20, // 5% burst
        }
    }

    /// Get the total limit (requests + burst)
    pub fn total_limit(&self) -> u32 {
        self.requests_per_window.saturating_add(self.burst)
    }
}

/// Rate limit check result
#[derive(Debug, Clone)]
pub struct RateLimitResult {
    /// Whether the request is allowed
    pub allowed: bool,
    /// Requests remaining in window
    pub remaining: u32,
    /// Total limit (rpm + burst)
    pub limit: u32,
    /// Unix timestamp when window resets
    pub reset_at: u64,
    /// Seconds until retry (only if blocked)
    pub retry_after: Option<u64>,
}

struct LocalCounter {
    count: u64,
    expires_at: Instant,
}

pub struct RateLimiter {
    kv: Arc<KvClient>,
    keys: KeyBuilder,
    local: DashMap<String, LocalCounter>,
    cleanup_ops: AtomicU64,
}

impl RateLimiter {
    pub fn new(kv: Arc<KvClient>, keys: KeyBuilder) -> Self {
        Self {
            kv,
            keys,
            local: DashMap::new(),
            cleanup_ops: AtomicU64::new(0),
        }
    }

    /// Count one request for `identifier` and report whether it is allowed
    pub async fn check(&self, bucket: &RateLimitBucket, identifier: &str) -> RateLimitResult {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or_else(|e| {
                tracing::error!(error = %e, "System clock is before UNIX epoch");
                0
            });
        let window_secs = bucket.window_secs.max(1);
        let window = now / window_secs;
        let reset_at = (window + 1) * window_secs;
        let ttl = Duration::from_secs(reset_at.saturating_sub(now).max(1));

        let key = self.keys.rate_limit(bucket.name, identifier, window);
        let count = match self.kv.incr(&key, ttl).await {
            Some(c) => u64::try_from(c).unwrap_or(0),
            None => self.local_incr(&key, ttl),
        };

        let limit = bucket.total_limit();
        let allowed = count <= u64::from(limit);
        let remaining = u64::from(limit)
            .saturating_sub(count)
            .try_into()
            .unwrap_or(0u32);

        tracing::trace!(
            bucket = bucket.name,
            %identifier,
            count,
            limit,
            allowed,
            "Rate limit check"
        );

        RateLimitResult {
            allowed,
            remaining,
            limit,
            reset_at,
            retry_after: if allowed {
                None
            } else {
                Some(reset_at.saturating_sub(now))
            },
        }
    }

    fn local_incr(&self, key: &str, ttl: Duration) -> u64 {
        use dashmap::mapref::entry::Entry;

        let now = Instant::now();
        // Entry API holds the shard lock for the whole read-modify-write
        let count = match self.local.entry(key.to_string()) {
            Entry::Occupied(mut occupied) => {
                let counter = occupied.get_mut();
                if now >= counter.expires_at {
                    counter.count = 1;
                    counter.expires_at = now + ttl;
                } else {
                    counter.count += 1;
                }
                counter.count
            }
            Entry::Vacant(vacant) => {
                vacant.insert(LocalCounter {
                    count: 1,
                    expires_at: now + ttl,
                });
                1
            }
        };

        let ops = self.cleanup_ops.fetch_add(1, Ordering::Relaxed);
        if ops.is_multiple_of(256) {
            self.local.retain(|_, c| now < c.expires_at);
        }

        count
    }
}
