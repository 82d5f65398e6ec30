//! In-memory catalog, mutable while a generator is using it

use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::sync::RwLock;

use super::{page_slice, ProductSource};
use crate::errors::{AppResult, SourceError};
use crate::models::RawProduct;

#[derive(Default)]
struct Faults {
    failing_page: Option<u32>,
    failing_live_ids: bool,
}

#[derive(Default)]
pub struct InMemorySource {
    products: RwLock<Vec<Value>>,
    faults: RwLock<Faults>,
    page_fetches: AtomicUsize,
}

impl InMemorySource {
    pub fn new(products: Vec<Value>) -> Self {
        Self {
            products: RwLock::new(products),
            ..Default::default()
        }
    }

    pub async fn push(&self, product: Value) {
        self.products.write().await.push(product);
    }

    /// Replace the product whose `id` equals `id`; returns false when absent
    pub async fn replace(&self, id: &str, product: Value) -> bool {
        let mut products = self.products.write().await;
        match products.iter_mut().find(|p| id_of(p).as_deref() == Some(id)) {
            Some(slot) => {
                *slot = product;
                true
            }
            None => false,
        }
    }

    pub async fn remove(&self, id: &str) -> bool {
        let mut products = self.products.write().await;
        let before = products.len();
        products.retain(|p| id_of(p).as_deref() != Some(id));
        products.len() != before
    }

    /// Make every fetch of `page` fail until cleared
    pub async fn fail_page(&self, page: Option<u32>) {
        self.faults.write().await.failing_page = page;
    }

    pub async fn fail_live_ids(&self, failing: bool) {
        self.faults.write().await.failing_live_ids = failing;
    }

    /// Number of `list_page` calls served so far, failures included
    pub fn page_fetches(&self) -> usize {
        self.page_fetches.load(Ordering::SeqCst)
    }
}

fn id_of(product: &Value) -> Option<String> {
    RawProduct::from_value(product.clone())?.id()
}

#[async_trait]
impl ProductSource for InMemorySource {
    async fn list_page(&self, page: u32, page_size: u32) -> AppResult<Vec<Value>> {
        self.page_fetches.fetch_add(1, Ordering::SeqCst);
        if self.faults.read().await.failing_page == Some(page) {
            return Err(SourceError::page_fetch(page, "injected failure").into());
        }
        Ok(page_slice(&self.products.read().await, page, page_size))
    }

    async fn list_live_ids(&self) -> AppResult<HashSet<String>> {
        if self.faults.read().await.failing_live_ids {
            return Err(SourceError::live_ids("injected failure").into());
        }
        Ok(self.products.read().await.iter().filter_map(id_of).collect())
    }

    async fn total(&self) -> AppResult<usize> {
        Ok(self.products.read().await.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_mutations() {
        let source = InMemorySource::new(vec![json!({"id": 1}), json!({"id": "2"})]);

        assert!(source.replace("2", json!({"id": "2", "name": "Chair"})).await);
        assert!(!source.replace("9", json!({"id": 9})).await);
        source.push(json!({"id": 3})).await;
        assert!(source.remove("1").await);
        assert!(!source.remove("1").await);

        assert_eq!(source.total().await.unwrap(), 2);
        let page = source.list_page(1, 10).await.unwrap();
        assert_eq!(page[0]["name"], json!("Chair"));
    }

    #[tokio::test]
    async fn test_injected_failures() {
        let source = InMemorySource::new(vec![json!({"id": 1})]);
        source.fail_page(Some(1)).await;
        source.fail_live_ids(true).await;

        assert!(source.list_page(1, 10).await.is_err());
        assert!(source.list_page(2, 10).await.unwrap().is_empty());
        assert!(source.list_live_ids().await.is_err());
        assert_eq!(source.page_fetches(), 2);

        source.fail_page(None).await;
        assert_eq!(source.list_page(1, 10).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_sample_is_first_product() {
        let empty = InMemorySource::default();
        assert!(empty.sample().await.unwrap().is_none());

        let source = InMemorySource::new(vec![json!({"id": 1}), json!({"id": 2})]);
        assert_eq!(source.sample().await.unwrap(), Some(json!({"id": 1})));
    }
}
