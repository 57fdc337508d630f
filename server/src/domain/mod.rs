//! Domain logic for recipe search
//!
//! - `quota` - daily per-user and global quotas for paid routes
//! - `idempotency` - replay-safe request handling keyed by client keys
//! - `search` - source adapters, result cache and the search router

pub mod idempotency;
pub mod quota;
pub mod search;

pub use idempotency::IdempotencyService;
pub use quota::QuotaService;
pub use search::SearchService;
