//! SQLite-backed recipe store

use std::str::FromStr;
use std::time::Duration;

use async_trait::async_trait;
use sqlx::SqlitePool;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};

use super::{RecipeRecord, RecipeStore, RecipeStoreError};
use crate::core::constants::SQLITE_MAX_CONNECTIONS;

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS recipes (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL,
    category TEXT,
    prep_time INTEGER,
    difficulty TEXT,
    image_url TEXT,
    description TEXT,
    ingredients TEXT,
    steps TEXT,
    tags TEXT,
    created_at TEXT NOT NULL DEFAULT (datetime('now'))
);
CREATE INDEX IF NOT EXISTS idx_recipes_name ON recipes(name);
"#;

const SEARCH_SQL: &str = r#"
SELECT id, name, category, prep_time, difficulty, image_url, description, ingredients, steps, tags
FROM recipes
WHERE name LIKE ? ESCAPE '\'
   OR description LIKE ? ESCAPE '\'
   OR tags LIKE ? ESCAPE '\'
ORDER BY CASE
    WHEN name = ? THEN 0
    WHEN name LIKE ? ESCAPE '\' THEN 1
    ELSE 2
END, id
LIMIT ?
"#;

pub struct SqliteRecipeStore {
    pool: SqlitePool,
}

impl SqliteRecipeStore {
    /// Open (creating if missing) the database at `url` and ensure the schema
    pub async fn connect(url: &str) -> Result<Self, RecipeStoreError> {
        if !url.starts_with("sqlite:") {
            return Err(RecipeStoreError::InvalidUrl(url.to_string()));
        }
        let options = SqliteConnectOptions::from_str(url)?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .busy_timeout(Duration::from_secs(5));

        let pool = SqlitePoolOptions::new()
            .max_connections(SQLITE_MAX_CONNECTIONS)
            .connect_with(options)
            .await?;

        let store = Self::from_pool(pool);
        store.ensure_schema().await?;
        tracing::debug!(%url, "Recipe store initialized");
        Ok(store)
    }

    /// Wrap an existing pool. Call [`Self::ensure_schema`] before use.
    pub fn from_pool(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn ensure_schema(&self) -> Result<(), RecipeStoreError> {
        sqlx::raw_sql(SCHEMA).execute(&self.pool).await?;
        Ok(())
    }

    /// Insert a recipe (seeding and fixtures); the record's `id` is ignored
    pub async fn insert(&self, recipe: &RecipeRecord) -> Result<i64, RecipeStoreError> {
        let result = sqlx::query(
            r#"
            INSERT INTO recipes (name, category, prep_time, difficulty, image_url, description, ingredients, steps, tags)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&recipe.name)
        .bind(&recipe.category)
        .bind(recipe.prep_time)
        .bind(&recipe.difficulty)
        .bind(&recipe.image_url)
        .bind(&recipe.description)
        .bind(&recipe.ingredients)
        .bind(&recipe.steps)
        .bind(&recipe.tags)
        .execute(&self.pool)
        .await?;
        Ok(result.last_insert_rowid())
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }
}

/// Escape LIKE wildcards so the keyword matches literally
fn escape_like(keyword: &str) -> String {
    let mut out = String::with_capacity(keyword.len() + 4);
    for c in keyword.chars() {
        if matches!(c, '%' | '_' | '\\') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

#[async_trait]
impl RecipeStore for SqliteRecipeStore {
    async fn search(
        &self,
        keyword: &str,
        limit: u32,
    ) -> Result<Vec<RecipeRecord>, RecipeStoreError> {
        let keyword = keyword.trim();
        if keyword.is_empty() || limit == 0 {
            return Ok(Vec::new());
        }
        let escaped = escape_like(keyword);
        let contains = format!("%{}%", escaped);
        let prefix = format!("{}%", escaped);

        let rows = sqlx::query_as::<_, RecipeRecord>(SEARCH_SQL)
            .bind(&contains)
            .bind(&contains)
            .bind(&contains)
            .bind(keyword)
            .bind(&prefix)
            .bind(i64::from(limit))
            .fetch_all(&self.pool)
            .await?;

        tracing::trace!(%keyword, count = rows.len(), "Local recipe search");
        Ok(rows)
    }
}
