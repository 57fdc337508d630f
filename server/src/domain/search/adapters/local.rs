use std::sync::Arc;

use async_trait::async_trait;

use super::text::{parse_ingredients, split_list, split_steps};
use super::{AdapterError, SearchAdapter, absorb};
use crate::data::recipes::{RecipeRecord, RecipeStore};
use crate::domain::search::types::{SearchResult, SearchSource};

/// Keyword search over the app's own recipes
pub struct LocalAdapter {
    store: Arc<dyn RecipeStore>,
    limit: u32,
}

impl LocalAdapter {
    pub fn new(store: Arc<dyn RecipeStore>, limit: u32) -> Self {
        Self { store, limit }
    }

    async fn fetch(&self, keyword: &str) -> Result<Vec<SearchResult>, AdapterError> {
        let rows = self.store.search(keyword, self.limit).await?;
        Ok(rows.into_iter().map(to_result).collect())
    }
}

fn to_result(row: RecipeRecord) -> SearchResult {
    let mut result = SearchResult::new(format!("local_{}", row.id), row.name, SearchSource::Local);
    result.category = row.category.filter(|c| !c.trim().is_empty());
    result.prep_time = row.prep_time.and_then(|m| u32::try_from(m).ok());
    result.difficulty = row.difficulty.filter(|d| !d.trim().is_empty());
    result.image_url = row.image_url.as_deref().map(split_list).unwrap_or_default();
    result.description = row.description.filter(|d| !d.trim().is_empty());
    result.ingredients = row
        .ingredients
        .as_deref()
        .map(parse_ingredients)
        .unwrap_or_default();
    result.steps = row.steps.as_deref().map(split_steps).unwrap_or_default();
    result.tags = row.tags.as_deref().map(split_list).unwrap_or_default();
    result
}

#[async_trait]
impl SearchAdapter for LocalAdapter {
    fn source(&self) -> SearchSource {
        SearchSource::Local
    }

    async fn search(&self, keyword: &str) -> Vec<SearchResult> {
        absorb(SearchSource::Local, keyword, self.fetch(keyword).await)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::recipes::RecipeStoreError;

    struct FixedStore(Vec<RecipeRecord>);

    #[async_trait]
    impl RecipeStore for FixedStore {
        async fn search(
            &self,
            _keyword: &str,
            limit: u32,
        ) -> Result<Vec<RecipeRecord>, RecipeStoreError> {
            Ok(self.0.iter().take(limit as usize).cloned().collect())
        }
    }

    struct BrokenStore;

    #[async_trait]
    impl RecipeStore for BrokenStore {
        async fn search(
            &self,
            _keyword: &str,
            _limit: u32,
        ) -> Result<Vec<RecipeRecord>, RecipeStoreError> {
            Err(RecipeStoreError::InvalidUrl("nope".to_string()))
        }
    }

    fn row() -> RecipeRecord {
        RecipeRecord {
            id: 7,
            name: "番茄炒蛋".to_string(),
            category: Some("家常菜".to_string()),
            prep_time: Some(15),
            ingredients: Some(r#"[{"name":"番茄","amount":"2个"},{"name":"鸡蛋","amount":"3个"}]"#.to_string()),
            steps: Some("1.番茄切块。2.鸡蛋打散炒熟。3.合炒调味".to_string()),
            tags: Some("快手,下饭".to_string()),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_maps_rows() {
        let adapter = LocalAdapter::new(Arc::new(FixedStore(vec![row()])), 20);
        let items = adapter.search("番茄").await;
        assert_eq!(items.len(), 1);
        let item = &items[0];
        assert_eq!(item.id, "local_7");
        assert_eq!(item.source, SearchSource::Local);
        assert_eq!(item.prep_time, Some(15));
        assert_eq!(item.ingredients.len(), 2);
        assert_eq!(item.steps.len(), 3);
        assert_eq!(item.tags, vec!["快手", "下饭"]);
        assert!(item.image_url.is_empty());
    }

    #[tokio::test]
    async fn test_negative_prep_time_is_dropped() {
        let mut r = row();
        r.prep_time = Some(-5);
        let adapter = LocalAdapter::new(Arc::new(FixedStore(vec![r])), 20);
        assert_eq!(adapter.search("x").await[0].prep_time, None);
    }

    #[tokio::test]
    async fn test_store_error_is_empty() {
        let adapter = LocalAdapter::new(Arc::new(BrokenStore), 20);
        assert!(adapter.search("番茄").await.is_empty());
    }
}
