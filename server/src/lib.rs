//! Recipe search routing and quota protection
//!
//! - `api` - HTTP surface (axum)
//! - `core` - configuration, CLI, metrics, shutdown
//! - `data` - shared KV client and the local recipe store
//! - `domain` - quota, idempotency and search routing
//! - `utils` - hashing, canonical JSON and UTC-day helpers

pub mod api;
pub mod app;
pub mod core;
pub mod data;
pub mod domain;
pub mod utils;
