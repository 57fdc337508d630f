//! Counter stores behind the quota service
//!
//! The remote store runs the paired check-and-increment as one KV script.
//! The local store does the same under a mutex and is what the service
//! falls back to whenever the remote store reports nothing.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::data::kv::{CounterVerdict, KvClient, LimitScope};

/// One user counter and one global counter consumed together
#[derive(Debug, Clone, Copy)]
pub struct CounterPair<'a> {
    pub day: &'a str,
    pub user_key: &'a str,
    pub global_key: &'a str,
    pub user_limit: u64,
    pub global_limit: u64,
    pub ttl: Duration,
}

#[async_trait]
pub trait AtomicCounterStore: Send + Sync {
    /// Check both limits and increment both counters only if neither is
    /// exhausted. `None` means the store could not answer.
    async fn consume_pair(&self, pair: &CounterPair<'_>) -> Option<CounterVerdict>;

    /// Current values (missing counters read as zero)
    async fn read(&self, day: &str, keys: &[String]) -> Option<Vec<u64>>;

    fn name(&self) -> &'static str;
}

/// Counters in the shared KV
pub struct RemoteCounterStore {
    kv: Arc<KvClient>,
}

impl RemoteCounterStore {
    pub fn new(kv: Arc<KvClient>) -> Self {
        Self { kv }
    }
}

#[async_trait]
impl AtomicCounterStore for RemoteCounterStore {
    async fn consume_pair(&self, pair: &CounterPair<'_>) -> Option<CounterVerdict> {
        self.kv
            .eval_quota_consume(
                pair.user_key,
                pair.global_key,
                pair.user_limit,
                pair.global_limit,
                pair.ttl,
            )
            .await
    }

    async fn read(&self, _day: &str, keys: &[String]) -> Option<Vec<u64>> {
        let values = self.kv.mget(keys).await?;
        Some(
            values
                .into_iter()
                .map(|v| v.and_then(|s| s.parse().ok()).unwrap_or(0))
                .collect(),
        )
    }

    fn name(&self) -> &'static str {
        "kv"
    }
}

/// Days kept in memory: today plus the one before it
const RETAINED_DAYS: usize = 2;

/// Counters bucketed by UTC day (`YYYY-MM-DD` sorts chronologically)
#[derive(Default)]
struct LocalCounters {
    days: BTreeMap<String, HashMap<String, u64>>,
}

impl LocalCounters {
    fn day_mut(&mut self, day: &str) -> &mut HashMap<String, u64> {
        self.days.entry(day.to_string()).or_default()
    }

    fn get(&self, day: &str, key: &str) -> u64 {
        self.days
            .get(day)
            .and_then(|counts| counts.get(key))
            .copied()
            .unwrap_or(0)
    }

    /// Drop the oldest days; a request stamped before midnight never
    /// clears counters of the day after it
    fn prune(&mut self) {
        while self.days.len() > RETAINED_DAYS {
            self.days.pop_first();
        }
    }
}

/// Process-local counters for the current UTC day
#[derive(Default)]
pub struct LocalCounterStore {
    inner: Mutex<LocalCounters>,
}

impl LocalCounterStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Same semantics as the KV script; never fails
    pub fn consume_now(&self, pair: &CounterPair<'_>) -> CounterVerdict {
        let mut counters = self.inner.lock();
        let user = counters.get(pair.day, pair.user_key);
        let global = counters.get(pair.day, pair.global_key);

        let denied_by = if user >= pair.user_limit {
            Some(LimitScope::User)
        } else if global >= pair.global_limit {
            Some(LimitScope::Global)
        } else {
            None
        };
        if denied_by.is_some() {
            return CounterVerdict {
                allowed: false,
                denied_by,
                user_count: user,
                global_count: global,
            };
        }

        let counts = counters.day_mut(pair.day);
        counts.insert(pair.user_key.to_string(), user + 1);
        counts.insert(pair.global_key.to_string(), global + 1);
        counters.prune();
        CounterVerdict {
            allowed: true,
            denied_by: None,
            user_count: user + 1,
            global_count: global + 1,
        }
    }

    pub fn read_now(&self, day: &str, keys: &[String]) -> Vec<u64> {
        let counters = self.inner.lock();
        keys.iter().map(|k| counters.get(day, k)).collect()
    }
}

#[async_trait]
impl AtomicCounterStore for LocalCounterStore {
    async fn consume_pair(&self, pair: &CounterPair<'_>) -> Option<CounterVerdict> {
        Some(self.consume_now(pair))
    }

    async fn read(&self, day: &str, keys: &[String]) -> Option<Vec<u64>> {
        Some(self.read_now(day, keys))
    }

    fn name(&self) -> &'static str {
        "memory"
    }
}
