//! Product sources
//!
//! The generator only needs two read-only views of the catalog: numbered
//! pages of raw records and the full set of currently live ids.

use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashSet;

use crate::errors::AppResult;

pub mod json_file;
pub mod memory;

pub use json_file::JsonFileSource;
pub use memory::InMemorySource;

/// Paginated, read-only catalog access
///
/// Pages are 1-based. A page past the end is empty, which is how the
/// generator detects the end of a pass.
#[async_trait]
pub trait ProductSource: Send + Sync {
    /// Raw records of one page, in a stable order
    async fn list_page(&self, page: u32, page_size: u32) -> AppResult<Vec<Value>>;

    /// Ids of every product that belongs in the feed right now
    async fn list_live_ids(&self) -> AppResult<HashSet<String>>;

    /// Declared number of products, independent of paging
    async fn total(&self) -> AppResult<usize>;

    /// First record of the catalog, used to check a mapping before it is saved
    async fn sample(&self) -> AppResult<Option<Value>> {
        Ok(self.list_page(1, 1).await?.into_iter().next())
    }
}

/// Slice out page `page` (1-based) of `items`
pub(crate) fn page_slice<T: Clone>(items: &[T], page: u32, page_size: u32) -> Vec<T> {
    if page == 0 || page_size == 0 {
        return Vec::new();
    }
    let start = (page as usize - 1).saturating_mul(page_size as usize);
    items
        .iter()
        .skip(start)
        .take(page_size as usize)
        .cloned()
        .collect()
}
