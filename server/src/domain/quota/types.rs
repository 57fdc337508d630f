//! Quota domain types

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::core::constants::{
    DEFAULT_QUOTA_ENTERPRISE, DEFAULT_QUOTA_FREE, DEFAULT_QUOTA_GLOBAL, DEFAULT_QUOTA_PRO,
};

pub use crate::data::kv::LimitScope as QuotaReason;

/// Subscription tier
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum Tier {
    #[default]
    Free,
    Pro,
    Enterprise,
}

impl Tier {
    /// Parse a tier name; unknown or missing values get the free tier
    pub fn parse_lenient(value: Option<&str>) -> Self {
        match value.map(|v| v.trim().to_lowercase()).as_deref() {
            Some("pro") => Self::Pro,
            Some("enterprise") => Self::Enterprise,
            _ => Self::Free,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Free => "free",
            Self::Pro => "pro",
            Self::Enterprise => "enterprise",
        }
    }
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Paid request class guarded by a daily quota
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum RequestClass {
    Web,
    Ai,
}

impl RequestClass {
    pub const ALL: [RequestClass; 2] = [RequestClass::Web, RequestClass::Ai];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Web => "web",
            Self::Ai => "ai",
        }
    }
}

impl fmt::Display for RequestClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Daily limits for both request classes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClassLimits {
    pub web: u64,
    pub ai: u64,
}

impl ClassLimits {
    pub const fn new(web: u64, ai: u64) -> Self {
        Self { web, ai }
    }

    const fn from_pair(pair: (u64, u64)) -> Self {
        Self::new(pair.0, pair.1)
    }

    pub fn get(&self, class: RequestClass) -> u64 {
        match class {
            RequestClass::Web => self.web,
            RequestClass::Ai => self.ai,
        }
    }
}

/// Per-tier and global daily limits
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QuotaLimits {
    pub free: ClassLimits,
    pub pro: ClassLimits,
    pub enterprise: ClassLimits,
    pub global: ClassLimits,
}

impl Default for QuotaLimits {
    fn default() -> Self {
        Self {
            free: ClassLimits::from_pair(DEFAULT_QUOTA_FREE),
            pro: ClassLimits::from_pair(DEFAULT_QUOTA_PRO),
            enterprise: ClassLimits::from_pair(DEFAULT_QUOTA_ENTERPRISE),
            global: ClassLimits::from_pair(DEFAULT_QUOTA_GLOBAL),
        }
    }
}

impl QuotaLimits {
    pub fn for_tier(&self, tier: Tier) -> ClassLimits {
        match tier {
            Tier::Free => self.free,
            Tier::Pro => self.pro,
            Tier::Enterprise => self.enterprise,
        }
    }
}

/// Outcome of one consume call
#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
pub struct QuotaDecision {
    pub allowed: bool,
    /// Which limit denied the request
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<QuotaReason>,
    /// Seconds until the quota resets; only set when denied
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retry_after_secs: Option<u64>,
    pub reset_at: DateTime<Utc>,
    /// Counter store that decided (`kv` or `memory`)
    pub backend: &'static str,
}

/// Usage of one counter
#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
pub struct QuotaRecord {
    pub used: u64,
    pub limit: u64,
    pub remaining: u64,
    pub reset_at: DateTime<Utc>,
}

impl QuotaRecord {
    pub fn new(used: u64, limit: u64, reset_at: DateTime<Utc>) -> Self {
        Self {
            used,
            limit,
            remaining: limit.saturating_sub(used),
            reset_at,
        }
    }
}

/// Usage for both request classes
#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
pub struct ClassUsage {
    pub web: QuotaRecord,
    pub ai: QuotaRecord,
}

/// Read-only view of a caller's quotas for the current UTC day
#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
pub struct QuotaSnapshot {
    pub user_id: String,
    pub tier: Tier,
    /// UTC day the counters belong to (`YYYY-MM-DD`)
    pub day: String,
    pub user: ClassUsage,
    pub global: ClassUsage,
    pub backend: &'static str,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tier_parse_lenient() {
        assert_eq!(Tier::parse_lenient(Some("PRO")), Tier::Pro);
        assert_eq!(Tier::parse_lenient(Some(" enterprise ")), Tier::Enterprise);
        assert_eq!(Tier::parse_lenient(Some("platinum")), Tier::Free);
        assert_eq!(Tier::parse_lenient(None), Tier::Free);
    }

    #[test]
    fn test_default_limits() {
        let limits = QuotaLimits::default();
        assert_eq!(limits.for_tier(Tier::Free).get(RequestClass::Ai), 5);
        assert_eq!(limits.for_tier(Tier::Pro).get(RequestClass::Web), 200);
        assert_eq!(limits.global.get(RequestClass::Ai), 1000);
    }

    #[test]
    fn test_quota_record_remaining_saturates() {
        let record = QuotaRecord::new(7, 5, Utc::now());
        assert_eq!(record.remaining, 0);
    }

    #[test]
    fn test_decision_serializes_reason_lowercase() {
        let decision = QuotaDecision {
            allowed: false,
            reason: Some(QuotaReason::Global),
            retry_after_secs: Some(10),
            reset_at: Utc::now(),
            backend: "kv",
        };
        let json = serde_json::to_value(&decision).unwrap();
        assert_eq!(json["reason"], "global");
        assert_eq!(json["retry_after_secs"], 10);
    }
}
