//! Record stores behind the idempotency service

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::data::kv::{BeginState, IdempotencyRecord, KvClient};

#[async_trait]
pub trait AtomicKeyStore: Send + Sync {
    /// Claim `key` for `fingerprint`. `None` means the store could not answer.
    async fn begin(&self, key: &str, fingerprint: &str, ttl: Duration) -> Option<BeginState>;

    /// Overwrite the record; returns whether it was stored
    async fn store(&self, key: &str, record: &IdempotencyRecord, ttl: Duration) -> bool;

    async fn load(&self, key: &str) -> Option<IdempotencyRecord>;

    fn name(&self) -> &'static str;
}

/// Records in the shared KV
pub struct RemoteKeyStore {
    kv: Arc<KvClient>,
}

impl RemoteKeyStore {
    pub fn new(kv: Arc<KvClient>) -> Self {
        Self { kv }
    }
}

#[async_trait]
impl AtomicKeyStore for RemoteKeyStore {
    async fn begin(&self, key: &str, fingerprint: &str, ttl: Duration) -> Option<BeginState> {
        self.kv.eval_idempotency_begin(key, fingerprint, ttl).await
    }

    async fn store(&self, key: &str, record: &IdempotencyRecord, ttl: Duration) -> bool {
        match serde_json::to_string(record) {
            Ok(json) => self.kv.set(key, &json, ttl).await,
            Err(e) => {
                tracing::warn!(%key, error = %e, "Failed to encode idempotency record");
                false
            }
        }
    }

    async fn load(&self, key: &str) -> Option<IdempotencyRecord> {
        let raw = self.kv.get(key).await?;
        match serde_json::from_str(&raw) {
            Ok(record) => Some(record),
            Err(e) => {
                tracing::warn!(%key, error = %e, "Unreadable idempotency record");
                None
            }
        }
    }

    fn name(&self) -> &'static str {
        "kv"
    }
}

struct LocalEntry {
    record: IdempotencyRecord,
    expires_at: Instant,
}

/// Process-local records with explicit expiry.
///
/// An expired entry is evicted on the next lookup of its key.
#[derive(Default)]
pub struct LocalKeyStore {
    entries: Mutex<HashMap<String, LocalEntry>>,
}

impl LocalKeyStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn begin_now(&self, key: &str, fingerprint: &str, ttl: Duration) -> BeginState {
        let now = Instant::now();
        let mut entries = self.entries.lock();
        if let Some(entry) = entries.get(key).filter(|e| now < e.expires_at) {
            return entry.record.begin_state(fingerprint);
        }
        entries.insert(
            key.to_string(),
            LocalEntry {
                record: IdempotencyRecord::pending(fingerprint),
                expires_at: now + ttl,
            },
        );
        BeginState::Proceed
    }

    pub fn store_now(&self, key: &str, record: &IdempotencyRecord, ttl: Duration) {
        let now = Instant::now();
        let mut entries = self.entries.lock();
        entries.insert(
            key.to_string(),
            LocalEntry {
                record: record.clone(),
                expires_at: now + ttl,
            },
        );
    }

    pub fn remove_now(&self, key: &str) {
        self.entries.lock().remove(key);
    }

    pub fn load_now(&self, key: &str) -> Option<IdempotencyRecord> {
        let now = Instant::now();
        let mut entries = self.entries.lock();
        match entries.get(key).map(|e| now < e.expires_at) {
            Some(true) => entries.get(key).map(|e| e.record.clone()),
            Some(false) => {
                entries.remove(key);
                None
            }
            None => None,
        }
    }
}

#[async_trait]
impl AtomicKeyStore for LocalKeyStore {
    async fn begin(&self, key: &str, fingerprint: &str, ttl: Duration) -> Option<BeginState> {
        Some(self.begin_now(key, fingerprint, ttl))
    }

    async fn store(&self, key: &str, record: &IdempotencyRecord, ttl: Duration) -> bool {
        self.store_now(key, record, ttl);
        true
    }

    async fn load(&self, key: &str) -> Option<IdempotencyRecord> {
        self.load_now(key)
    }

    fn name(&self) -> &'static str {
        "memory"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const TTL: Duration = Duration::from_secs(60);

    #[test]
    fn test_local_begin_then_conflict_while_pending() {
        let store = LocalKeyStore::new();
        assert_eq!(store.begin_now("k", "fp", TTL), BeginState::Proceed);
        assert_eq!(store.begin_now("k", "fp", TTL), BeginState::Conflict);
    }

    #[test]
    fn test_local_replay_after_done() {
        let store = LocalKeyStore::new();
        store.begin_now("k", "fp", TTL);
        store.store_now("k", &IdempotencyRecord::done("fp", json!({"ok": true})), TTL);
        assert_eq!(store.begin_now("k", "fp", TTL), BeginState::Replay);
        assert_eq!(store.begin_now("k", "fp2", TTL), BeginState::Conflict);
    }

    #[test]
    fn test_local_expired_entry_is_reclaimable() {
        let store = LocalKeyStore::new();
        store.begin_now("k", "fp", Duration::ZERO);
        assert_eq!(store.load_now("k"), None);
        assert_eq!(store.begin_now("k", "other", TTL), BeginState::Proceed);
    }

    #[test]
    fn test_expired_entry_evicted_only_by_its_own_lookup() {
        let store = LocalKeyStore::new();
        store.begin_now("old", "fp", Duration::ZERO);
        for i in 0..300 {
            store.begin_now(&format!("k{}", i), "fp", TTL);
        }
        assert!(store.entries.lock().contains_key("old"));

        assert_eq!(store.load_now("old"), None);
        assert!(!store.entries.lock().contains_key("old"));
    }
}
