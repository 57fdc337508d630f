//! Shared KV client
//!
//! [`KvClient`] wraps a [`KvBackend`] and never returns errors: every
//! failure (connection, timeout, protocol, injected fault) becomes an absent
//! value or `false`, and callers fall back to in-process state.
//!
//! Health is tracked as a single state machine. The transition to
//! unavailable is logged once at WARN and recovery once at INFO; repeated
//! failures in between are DEBUG only. After a real failure the client
//! stops calling the backend for a cooldown period, then lets the next
//! operation probe it again.

mod backend;
mod error;
mod fault;
mod key;
mod memory;
mod rate_limiter;
mod redis;

use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicU8, Ordering};
use std::time::{Duration, Instant};

use parking_lot::Mutex;

pub use backend::{
    BeginState, CounterVerdict, IdempotencyRecord, KvBackend, LimitScope, RecordStatus,
};
pub use error::KvError;
pub use fault::{FaultInjection, KvOp};
pub use key::{KeyBuilder, escape_segment};
pub use memory::MemoryKvBackend;
pub use rate_limiter::{RateLimitBucket, RateLimitResult, RateLimiter};
pub use redis::{RedisKvBackend, sanitize_redis_url};

use crate::core::config::KvConfig;
use crate::core::metrics::MetricsService;

const STATE_UNKNOWN: u8 = 0;
const STATE_READY: u8 = 1;
const STATE_DOWN: u8 = 2;

/// Failure-tolerant KV client
pub struct KvClient {
    backend: Option<Arc<dyn KvBackend>>,
    faults: FaultInjection,
    retry_after: Duration,
    state: AtomicU8,
    down_since: Mutex<Option<Instant>>,
    metrics: Arc<MetricsService>,
}

impl KvClient {
    pub fn new(
        backend: Arc<dyn KvBackend>,
        faults: FaultInjection,
        retry_after: Duration,
        metrics: Arc<MetricsService>,
    ) -> Self {
        Self {
            backend: Some(backend),
            faults,
            retry_after,
            state: AtomicU8::new(STATE_UNKNOWN),
            down_since: Mutex::new(None),
            metrics,
        }
    }

    /// Client with no backend: every operation reports absent
    pub fn disabled(metrics: Arc<MetricsService>) -> Self {
        Self {
            backend: None,
            faults: FaultInjection::none(),
            retry_after: Duration::ZERO,
            state: AtomicU8::new(STATE_UNKNOWN),
            down_since: Mutex::new(None),
            metrics,
        }
    }

    /// Build from configuration. Pool creation does not connect, so an
    /// unreachable server only shows up on the first operation.
    pub fn from_config(config: &KvConfig, metrics: Arc<MetricsService>) -> Self {
        if !config.enabled {
            tracing::info!("Shared KV disabled, using in-process state only");
            return Self::disabled(metrics);
        }
        if config.faults.is_active() {
            tracing::warn!(faults = %config.faults, "KV fault injection active");
        }
        match RedisKvBackend::new(&config.url) {
            Ok(backend) => Self::new(
                Arc::new(backend),
                config.faults.clone(),
                Duration::from_secs(config.retry_secs),
                metrics,
            ),
            Err(e) => {
                tracing::warn!(error = %e, "Shared KV unusable, using in-process state only");
                Self::disabled(metrics)
            }
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.backend.is_some()
    }

    /// Whether the last real interaction with the backend succeeded
    pub fn is_ready(&self) -> bool {
        self.state.load(Ordering::SeqCst) == STATE_READY
    }

    pub fn backend_name(&self) -> &'static str {
        self.backend
            .as_ref()
            .map(|b| b.backend_name())
            .unwrap_or("disabled")
    }

    fn cooling_down(&self) -> bool {
        if self.state.load(Ordering::SeqCst) != STATE_DOWN {
            return false;
        }
        match *self.down_since.lock() {
            Some(since) => since.elapsed() < self.retry_after,
            None => false,
        }
    }

    fn mark_ready(&self) {
        let prev = self.state.swap(STATE_READY, Ordering::SeqCst);
        if prev == STATE_READY {
            return;
        }
        *self.down_since.lock() = None;
        self.metrics.set_kv_ready(true);
        if prev == STATE_DOWN {
            tracing::info!(backend = self.backend_name(), "Shared KV recovered");
        } else {
            tracing::debug!(backend = self.backend_name(), "Shared KV connected");
        }
    }

    fn mark_down(&self, op: KvOp, error: &KvError) {
        *self.down_since.lock() = Some(Instant::now());
        let prev = self.state.swap(STATE_DOWN, Ordering::SeqCst);
        if prev == STATE_DOWN {
            tracing::debug!(%op, %error, "Shared KV still unavailable");
            return;
        }
        self.metrics.set_kv_ready(false);
        tracing::warn!(
            %op,
            %error,
            retry_secs = self.retry_after.as_secs(),
            "Shared KV unavailable, falling back to in-process state"
        );
    }

    async fn run<T, F, Fut>(&self, op: KvOp, call: F) -> Option<T>
    where
        F: FnOnce(Arc<dyn KvBackend>) -> Fut,
        Fut: Future<Output = Result<T, KvError>>,
    {
        let backend = self.backend.as_ref()?;

        // Injected faults leave health state alone so that faulting one
        // operation does not flap readiness for the others.
        if self.faults.fails(op) {
            self.metrics.record_kv_error(op.as_str());
            tracing::trace!(%op, "Injected KV fault");
            return None;
        }

        if op != KvOp::Ping && self.cooling_down() {
            return None;
        }

        match call(backend.clone()).await {
            Ok(value) => {
                self.mark_ready();
                Some(value)
            }
            Err(e) => {
                self.metrics.record_kv_error(op.as_str());
                self.mark_down(op, &e);
                None
            }
        }
    }

    pub async fn get(&self, key: &str) -> Option<String> {
        self.run(KvOp::Get, |b| async move { b.get(key).await })
            .await
            .flatten()
    }

    /// Returns whether the value was stored
    pub async fn set(&self, key: &str, value: &str, ttl: Duration) -> bool {
        self.run(KvOp::Set, |b| async move { b.set(key, value, ttl).await })
            .await
            .is_some()
    }

    /// One slot per key, in order; `None` when the KV is unavailable
    pub async fn mget(&self, keys: &[String]) -> Option<Vec<Option<String>>> {
        self.run(KvOp::Mget, |b| async move { b.mget(keys).await })
            .await
    }

    pub async fn eval_quota_consume(
        &self,
        user_key: &str,
        global_key: &str,
        user_limit: u64,
        global_limit: u64,
        ttl: Duration,
    ) -> Option<CounterVerdict> {
        self.run(KvOp::Eval, |b| async move {
            b.quota_consume(user_key, global_key, user_limit, global_limit, ttl)
                .await
        })
        .await
    }

    pub async fn eval_idempotency_begin(
        &self,
        key: &str,
        fingerprint: &str,
        ttl: Duration,
    ) -> Option<BeginState> {
        self.run(KvOp::Eval, |b| async move {
            b.idempotency_begin(key, fingerprint, ttl).await
        })
        .await
    }

    pub async fn incr(&self, key: &str, ttl: Duration) -> Option<i64> {
        self.run(KvOp::Eval, |b| async move { b.incr(key, ttl).await })
            .await
    }

    /// Probe the backend, ignoring any cooldown
    pub async fn ping(&self) -> bool {
        self.run(KvOp::Ping, |b| async move { b.ping().await })
            .await
            .is_some()
    }
}
