//! Catalog exported as a JSON array of product objects
//!
//! The file is re-read on every call so a running `watch` picks up
//! catalog changes without a restart.

use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use tracing::debug;

use super::{page_slice, ProductSource};
use crate::config::SourceConfig;
use crate::errors::{AppResult, SourceError};
use crate::models::RawProduct;

/// Status value of products visible in the shop
pub const PUBLISHED_STATUS: &str = "publish";

pub struct JsonFileSource {
    path: PathBuf,
    published_only: bool,
}

impl JsonFileSource {
    pub fn new<P: Into<PathBuf>>(path: P, published_only: bool) -> Self {
        Self {
            path: path.into(),
            published_only,
        }
    }

    pub fn from_config(config: &SourceConfig) -> Self {
        Self::new(config.products_file.clone(), config.published_only)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn read_products(&self) -> Result<Vec<Value>, SourceError> {
        let location = self.path.display().to_string();
        let content = tokio::fs::read_to_string(&self.path)
            .await
            .map_err(|e| SourceError::unreadable(&location, e.to_string()))?;

        let products = match serde_json::from_str::<Value>(&content)
            .map_err(|e| SourceError::unreadable(&location, e.to_string()))?
        {
            Value::Array(products) => products,
            other => {
                return Err(SourceError::unreadable(
                    &location,
                    format!("expected a JSON array, found {}", json_kind(&other)),
                ))
            }
        };

        let total = products.len();
        let visible: Vec<Value> = products
            .into_iter()
            .filter(|product| !self.published_only || is_published(product))
            .collect();
        debug!(
            "Read {} products from {} ({} visible)",
            total,
            location,
            visible.len()
        );
        Ok(visible)
    }
}

/// Products without a status field count as published
fn is_published(product: &Value) -> bool {
    match product.get("status") {
        Some(Value::String(status)) => status == PUBLISHED_STATUS,
        Some(_) => false,
        None => true,
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

#[async_trait]
impl ProductSource for JsonFileSource {
    async fn list_page(&self, page: u32, page_size: u32) -> AppResult<Vec<Value>> {
        let products = self
            .read_products()
            .await
            .map_err(|e| SourceError::page_fetch(page, e.to_string()))?;
        Ok(page_slice(&products, page, page_size))
    }

    async fn list_live_ids(&self) -> AppResult<HashSet<String>> {
        let products = self
            .read_products()
            .await
            .map_err(|e| SourceError::live_ids(e.to_string()))?;
        Ok(products
            .into_iter()
            .filter_map(RawProduct::from_value)
            .filter_map(|product| product.id())
            .collect())
    }

    async fn total(&self) -> AppResult<usize> {
        Ok(self.read_products().await?.len())
    }
}
