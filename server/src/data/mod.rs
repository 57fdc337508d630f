//! Data layer
//!
//! - `kv` - shared key-value backend client with health tracking, key
//!   namespacing and the request rate limiter built on it
//! - `recipes` - the local recipe catalogue (SQLite)

pub mod kv;
pub mod recipes;

pub use kv::{KeyBuilder, KvClient};
pub use recipes::{RecipeStore, SqliteRecipeStore};
