//! In-process KV backend
//!
//! Mirrors the semantics of the Redis scripts under a single lock. Used by
//! tests and for single-node runs where no shared KV is deployed; it can be
//! switched offline to simulate an outage.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use parking_lot::Mutex;

use super::backend::{BeginState, CounterVerdict, IdempotencyRecord, KvBackend, LimitScope};
use super::error::KvError;

struct Entry {
    value: String,
    expires_at: Instant,
}

impl Entry {
    fn is_live(&self, now: Instant) -> bool {
        now < self.expires_at
    }
}

/// In-process [`KvBackend`]
#[derive(Default)]
pub struct MemoryKvBackend {
    entries: Mutex<HashMap<String, Entry>>,
    offline: AtomicBool,
    calls: AtomicU64,
}

impl MemoryKvBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Simulate the backend going away (or coming back)
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    /// Number of operations attempted against this backend
    pub fn calls(&self) -> u64 {
        self.calls.load(Ordering::SeqCst)
    }

    fn check_online(&self) -> Result<(), KvError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.offline.load(Ordering::SeqCst) {
            return Err(KvError::Connection("memory backend offline".to_string()));
        }
        Ok(())
    }

    fn read_counter(entries: &HashMap<String, Entry>, key: &str, now: Instant) -> u64 {
        entries
            .get(key)
            .filter(|e| e.is_live(now))
            .and_then(|e| e.value.parse().ok())
            .unwrap_or(0)
    }

    fn bump(entries: &mut HashMap<String, Entry>, key: &str, ttl: Duration, now: Instant) -> u64 {
        match entries.get_mut(key) {
            Some(entry) if entry.is_live(now) => {
                let next = entry.value.parse::<u64>().unwrap_or(0) + 1;
                entry.value = next.to_string();
                next
            }
            _ => {
                entries.insert(
                    key.to_string(),
                    Entry {
                        value: "1".to_string(),
                        expires_at: now + ttl,
                    },
                );
                1
            }
        }
    }
}

#[async_trait]
impl KvBackend for MemoryKvBackend {
    async fn get(&self, key: &str) -> Result<Option<String>, KvError> {
        self.check_online()?;
        let now = Instant::now();
        let entries = self.entries.lock();
        Ok(entries
            .get(key)
            .filter(|e| e.is_live(now))
            .map(|e| e.value.clone()))
    }

    async fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<(), KvError> {
        self.check_online()?;
        self.entries.lock().insert(
            key.to_string(),
            Entry {
                value: value.to_string(),
                expires_at: Instant::now() + ttl,
            },
        );
        Ok(())
    }

    async fn mget(&self, keys: &[String]) -> Result<Vec<Option<String>>, KvError> {
        self.check_online()?;
        let now = Instant::now();
        let entries = self.entries.lock();
        Ok(keys
            .iter()
            .map(|k| {
                entries
                    .get(k)
                    .filter(|e| e.is_live(now))
                    .map(|e| e.value.clone())
            })
            .collect())
    }

    async fn quota_consume(
        &self,
        user_key: &str,
        global_key: &str,
        user_limit: u64,
        global_limit: u64,
        ttl: Duration,
    ) -> Result<CounterVerdict, KvError> {
        self.check_online()?;
        let now = Instant::now();
        let mut entries = self.entries.lock();
        let user = Self::read_counter(&entries, user_key, now);
        let global = Self::read_counter(&entries, global_key, now);

        let denied_by = if user >= user_limit {
            Some(LimitScope::User)
        } else if global >= global_limit {
            Some(LimitScope::Global)
        } else {
            None
        };
        if denied_by.is_some() {
            return Ok(CounterVerdict {
                allowed: false,
                denied_by,
                user_count: user,
                global_count: global,
            });
        }

        let user_count = Self::bump(&mut entries, user_key, ttl, now);
        let global_count = Self::bump(&mut entries, global_key, ttl, now);
        Ok(CounterVerdict {
            allowed: true,
            denied_by: None,
            user_count,
            global_count,
        })
    }

    async fn idempotency_begin(
        &self,
        key: &str,
        fingerprint: &str,
        ttl: Duration,
    ) -> Result<BeginState, KvError> {
        self.check_online()?;
        let now = Instant::now();
        let mut entries = self.entries.lock();
        if let Some(entry) = entries.get(key).filter(|e| e.is_live(now)) {
            return Ok(match serde_json::from_str::<IdempotencyRecord>(&entry.value) {
                Ok(record) => record.begin_state(fingerprint),
                Err(_) => BeginState::Conflict,
            });
        }

        let record = serde_json::to_string(&IdempotencyRecord::pending(fingerprint))
            .map_err(|e| KvError::Protocol(e.to_string()))?;
        entries.insert(
            key.to_string(),
            Entry {
                value: record,
                expires_at: now + ttl,
            },
        );
        Ok(BeginState::Proceed)
    }

    async fn incr(&self, key: &str, ttl: Duration) -> Result<i64, KvError> {
        self.check_online()?;
        let now = Instant::now();
        let mut entries = self.entries.lock();
        let count = Self::bump(&mut entries, key, ttl, now);
        Ok(i64::try_from(count).unwrap_or(i64::MAX))
    }

    async fn ping(&self) -> Result<(), KvError> {
        self.check_online()
    }

    fn backend_name(&self) -> &'static str {
        "memory"
    }
}
