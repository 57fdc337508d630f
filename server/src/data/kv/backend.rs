//! KV backend trait and the reply types its atomic scripts produce

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use super::error::KvError;

/// Which counter stopped a paired quota consume
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum LimitScope {
    User,
    Global,
}

impl LimitScope {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Global => "global",
        }
    }
}

/// Result of the paired check-and-increment script
///
/// Counts are the values after the call: incremented when allowed,
/// untouched when denied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CounterVerdict {
    pub allowed: bool,
    pub denied_by: Option<LimitScope>,
    pub user_count: u64,
    pub global_count: u64,
}

/// Outcome of claiming an idempotency key
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BeginState {
    /// Key was unclaimed and is now pending for this caller
    Proceed,
    /// A completed record with the same fingerprint exists
    Replay,
    /// In flight, or claimed with a different request body
    Conflict,
}

impl BeginState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Proceed => "proceed",
            Self::Replay => "replay",
            Self::Conflict => "conflict",
        }
    }

    pub fn from_reply(reply: &str) -> Result<Self, KvError> {
        match reply {
            "proceed" => Ok(Self::Proceed),
            "replay" => Ok(Self::Replay),
            "conflict" => Ok(Self::Conflict),
            other => Err(KvError::Protocol(format!("unknown begin state '{}'", other))),
        }
    }
}

/// Lifecycle of an idempotency record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecordStatus {
    Pending,
    Done,
}

/// Stored idempotency record (JSON in the KV, same shape in-process)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IdempotencyRecord {
    pub status: RecordStatus,
    pub fingerprint: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<serde_json::Value>,
}

impl IdempotencyRecord {
    pub fn pending(fingerprint: impl Into<String>) -> Self {
        Self {
            status: RecordStatus::Pending,
            fingerprint: fingerprint.into(),
            payload: None,
        }
    }

    pub fn done(fingerprint: impl Into<String>, payload: serde_json::Value) -> Self {
        Self {
            status: RecordStatus::Done,
            fingerprint: fingerprint.into(),
            payload: Some(payload),
        }
    }

    /// Decide a begin call against this existing record
    pub fn begin_state(&self, fingerprint: &str) -> BeginState {
        if self.fingerprint != fingerprint {
            return BeginState::Conflict;
        }
        match self.status {
            RecordStatus::Done => BeginState::Replay,
            RecordStatus::Pending => BeginState::Conflict,
        }
    }
}

/// Raw KV backend
///
/// Implementations report every failure as an error; the [`super::KvClient`]
/// wrapper turns those into absent values and tracks health.
#[async_trait]
pub trait KvBackend: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>, KvError>;

    async fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<(), KvError>;

    async fn mget(&self, keys: &[String]) -> Result<Vec<Option<String>>, KvError>;

    /// Atomically check both counters against their limits and increment
    /// both only if neither is exhausted. The user limit is checked first.
    async fn quota_consume(
        &self,
        user_key: &str,
        global_key: &str,
        user_limit: u64,
        global_limit: u64,
        ttl: Duration,
    ) -> Result<CounterVerdict, KvError>;

    /// Atomically claim an idempotency key (see [`BeginState`])
    async fn idempotency_begin(
        &self,
        key: &str,
        fingerprint: &str,
        ttl: Duration,
    ) -> Result<BeginState, KvError>;

    /// Increment a counter, setting its TTL when created
    async fn incr(&self, key: &str, ttl: Duration) -> Result<i64, KvError>;

    async fn ping(&self) -> Result<(), KvError>;

    fn backend_name(&self) -> &'static str;
}
