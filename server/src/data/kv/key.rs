//! Namespaced key builder
//!
//! Every key is `rs:<env>:<kind>:...`. Identifier segments are escaped
//! (`%` -> `%25`, `:` -> `%3A`) so a user id or idempotency key can never
//! spill into a neighbouring segment, and each kind has a fixed number of
//! segments. Two different logical tuples therefore never share a key.

use std::borrow::Cow;

use crate::core::constants::{CACHE_KEY_VERSION, KV_KEY_PREFIX};

/// Key builder partitioned by deployment environment
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyBuilder {
    env: String,
}

impl KeyBuilder {
    pub fn new(env: &str) -> Self {
        let env = env.trim();
        let env = if env.is_empty() { "default" } else { env };
        Self {
            env: escape_segment(env).into_owned(),
        }
    }

    pub fn env(&self) -> &str {
        &self.env
    }

    fn key(&self, kind: &str, segments: &[&str]) -> String {
        let mut key = format!("{}:{}:{}", KV_KEY_PREFIX, self.env, kind);
        for segment in segments {
            key.push(':');
            key.push_str(&escape_segment(segment));
        }
        key
    }

    // =========================================================================
    // Quotas
    // =========================================================================

    /// Per-user daily counter for one request class
    pub fn user_quota(&self, user_id: &str, class: &str, day: &str) -> String {
        self.key("quota:user", &[day, class, user_id])
    }

    /// Global daily counter for one request class
    pub fn global_quota(&self, class: &str, day: &str) -> String {
        self.key("quota:global", &[day, class])
    }

    // =========================================================================
    // Rate limiting
    // =========================================================================

    /// Fixed-window request counter
    pub fn rate_limit(&self, bucket: &str, identifier: &str, window: u64) -> String {
        self.key("rl", &[bucket, &window.to_string(), identifier])
    }

    // =========================================================================
    // Caches
    // =========================================================================

    /// Search result cache entry keyed by a request fingerprint
    pub fn cache_search(&self, fingerprint: &str) -> String {
        self.key("cache:search", &[CACHE_KEY_VERSION, fingerprint])
    }

    /// Recipe detail cache entry
    pub fn cache_recipe(&self, recipe_id: &str) -> String {
        self.key("cache:recipe", &[CACHE_KEY_VERSION, recipe_id])
    }

    /// Shopping list cache entry for a user
    pub fn cache_shopping(&self, user_id: &str) -> String {
        self.key("cache:shopping", &[CACHE_KEY_VERSION, user_id])
    }

    // =========================================================================
    // Idempotency
    // =========================================================================

    /// Idempotency record for a caller-supplied key within a namespace
    pub fn idempotency(&self, namespace: &str, key: &str) -> String {
        self.key("idem", &[namespace, key])
    }
}

/// Escape a key segment so it cannot contain the separator
pub fn escape_segment(segment: &str) -> Cow<'_, str> {
    if !segment.contains([':', '%']) {
        return Cow::Borrowed(segment);
    }
    let mut out = String::with_capacity(segment.len() + 8);
    for c in segment.chars() {
        match c {
            '%' => out.push_str("%25"),
            ':' => out.push_str("%3A"),
            _ => out.push(c),
        }
    }
    Cow::Owned(out)
}
