//! Local recipe catalogue
//!
//! Read-only keyword lookup over the recipes the app already owns. List
//! columns (ingredients, steps, images, tags) are stored as text: JSON
//! arrays when written by this service, delimited strings in older rows.

mod error;
mod sqlite;

use async_trait::async_trait;

pub use error::RecipeStoreError;
pub use sqlite::SqliteRecipeStore;

/// A recipe row as stored
#[derive(Debug, Clone, Default, PartialEq, sqlx::FromRow)]
pub struct RecipeRecord {
    pub id: i64,
    pub name: String,
    pub category: Option<String>,
    pub prep_time: Option<i64>,
    pub difficulty: Option<String>,
    pub image_url: Option<String>,
    pub description: Option<String>,
    pub ingredients: Option<String>,
    pub steps: Option<String>,
    pub tags: Option<String>,
}

#[async_trait]
pub trait RecipeStore: Send + Sync {
    /// Recipes whose name, description or tags contain `keyword`.
    /// Exact name matches come first, then name prefix matches.
    async fn search(&self, keyword: &str, limit: u32)
    -> Result<Vec<RecipeRecord>, RecipeStoreError>;
}
