//! Idempotent request handling
//!
//! A caller-supplied key is claimed atomically together with a fingerprint
//! of the request body. The first claim proceeds; a retry with the same body
//! after completion replays the stored response; anything else (still in
//! flight, or a different body under the same key) is a conflict.
//!
//! Records live in the shared KV when it answers and in a process-local map
//! otherwise. A live local record takes precedence over the KV, so a request
//! begun or completed during an outage keeps its state once the KV comes
//! back. Completed local records are pushed up to the KV on the next claim.

mod store;

use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;

pub use crate::data::kv::{BeginState, IdempotencyRecord, RecordStatus};
pub use store::{AtomicKeyStore, LocalKeyStore, RemoteKeyStore};

use crate::core::metrics::MetricsService;
use crate::data::kv::{KeyBuilder, KvClient};
use crate::utils::crypto::sha256_hex;
use crate::utils::json::canonical_body;

/// Stable fingerprint of a request body (JSON bodies are canonicalized first)
pub fn fingerprint(body: &[u8]) -> String {
    sha256_hex(canonical_body(body))
}

pub struct IdempotencyService {
    keys: KeyBuilder,
    remote: Option<Arc<dyn AtomicKeyStore>>,
    local: LocalKeyStore,
    metrics: Arc<MetricsService>,
}

impl IdempotencyService {
    pub fn new(keys: KeyBuilder, kv: Arc<KvClient>, metrics: Arc<MetricsService>) -> Self {
        let remote: Option<Arc<dyn AtomicKeyStore>> = if kv.is_enabled() {
            Some(Arc::new(RemoteKeyStore::new(kv)))
        } else {
            None
        };
        Self {
            keys,
            remote,
            local: LocalKeyStore::new(),
            metrics,
        }
    }

    /// Claim `key` within `namespace` for this request body
    pub async fn begin(&self, namespace: &str, key: &str, body: &[u8], ttl: Duration) -> BeginState {
        let fingerprint = fingerprint(body);
        let record_key = self.keys.idempotency(namespace, key);

        let (state, backend) = match self.local.load_now(&record_key) {
            Some(record) => {
                let state = record.begin_state(&fingerprint);
                if state == BeginState::Replay {
                    self.promote(&record_key, &record, ttl).await;
                }
                (state, "memory")
            }
            None => {
                let remote = match &self.remote {
                    Some(remote) => remote.begin(&record_key, &fingerprint, ttl).await,
                    None => None,
                };
                match remote {
                    Some(state) => (state, "kv"),
                    None => (self.local.begin_now(&record_key, &fingerprint, ttl), "memory"),
                }
            }
        };

        self.metrics.record_idempotency(state.as_str(), backend);
        tracing::debug!(%namespace, %key, state = state.as_str(), backend, "Idempotency begin");
        state
    }

    /// Store the response for a request that proceeded
    pub async fn complete(
        &self,
        namespace: &str,
        key: &str,
        body: &[u8],
        payload: &Value,
        ttl: Duration,
    ) {
        let record_key = self.keys.idempotency(namespace, key);
        let record = IdempotencyRecord::done(fingerprint(body), payload.clone());

        if let Some(remote) = &self.remote
            && remote.store(&record_key, &record, ttl).await
        {
            // A pending claim made during an outage must not shadow the result
            self.local.remove_now(&record_key);
            return;
        }
        self.local.store_now(&record_key, &record, ttl);
        tracing::debug!(%namespace, %key, "Idempotency record stored in-process");
    }

    /// Copy a locally completed record into the KV once it answers again
    async fn promote(&self, record_key: &str, record: &IdempotencyRecord, ttl: Duration) {
        if let Some(remote) = &self.remote
            && remote.store(record_key, record, ttl).await
        {
            self.local.remove_now(record_key);
            tracing::debug!(key = %record_key, "Idempotency record moved to shared KV");
        }
    }

    /// Stored response for a completed key
    pub async fn replay(&self, namespace: &str, key: &str) -> Option<Value> {
        let record_key = self.keys.idempotency(namespace, key);

        if let Some(remote) = &self.remote
            && let Some(record) = remote.load(&record_key).await
            && record.status == RecordStatus::Done
        {
            return record.payload;
        }
        self.local
            .load_now(&record_key)
            .filter(|r| r.status == RecordStatus::Done)
            .and_then(|r| r.payload)
    }
}
