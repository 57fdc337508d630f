//! Search source adapters
//!
//! - `local` - the app's own recipe catalogue
//! - `web` - Tianxing recipe API
//! - `ai` - OpenAI-compatible chat completions
//!
//! Adapters never fail outward: every error is logged and turned into an
//! empty result so the router can move on to the next source.

mod ai;
mod local;
pub(crate) mod text;
mod usage;
mod web;

use std::time::Duration;

use async_trait::async_trait;

use super::types::{SearchResult, SearchSource};
use crate::core::constants::UPSTREAM_USER_AGENT;
use crate::data::recipes::RecipeStoreError;

pub use ai::{AiAdapter, parse_ai_reply};
pub use local::LocalAdapter;
pub use usage::DailyUsage;
pub use web::{TianxingAdapter, parse_tianxing};

#[async_trait]
pub trait SearchAdapter: Send + Sync {
    fn source(&self) -> SearchSource;

    /// Results for `keyword`; empty on any failure
    async fn search(&self, keyword: &str) -> Vec<SearchResult>;
}

#[derive(Debug, thiserror::Error)]
pub enum AdapterError {
    #[error("{0} credentials are not configured")]
    MissingCredentials(&'static str),

    #[error("{0} daily call cap reached")]
    DailyCapReached(&'static str),

    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Upstream returned HTTP {0}")]
    Status(u16),

    #[error("Upstream error {code}: {message}")]
    Upstream { code: i64, message: String },

    #[error("Invalid upstream response: {0}")]
    InvalidResponse(String),

    #[error("Recipe store error: {0}")]
    Store(#[from] RecipeStoreError),
}

/// Shared HTTP client for the paid upstreams
pub fn build_http_client(timeout: Duration) -> Result<reqwest::Client, AdapterError> {
    reqwest::Client::builder()
        .timeout(timeout)
        .user_agent(UPSTREAM_USER_AGENT)
        .build()
        .map_err(AdapterError::Http)
}

/// Log an adapter failure and degrade to an empty list
pub(crate) fn absorb(
    source: SearchSource,
    keyword: &str,
    result: Result<Vec<SearchResult>, AdapterError>,
) -> Vec<SearchResult> {
    match result {
        Ok(items) => items,
        Err(AdapterError::MissingCredentials(_) | AdapterError::DailyCapReached(_)) => {
            tracing::debug!(source = %source, %keyword, "Adapter skipped");
            Vec::new()
        }
        Err(e) => {
            tracing::warn!(source = %source, %keyword, error = %e, "Adapter search failed");
            Vec::new()
        }
    }
}
