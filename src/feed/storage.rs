//! Working and published feed files
//!
//! The working document accumulates a pass page by page. Consumers only
//! ever read the published file, which is replaced wholesale at finalize.

use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use crate::config::StorageConfig;
use crate::errors::FeedError;
use crate::feed::xml::{from_xml, to_xml};
use crate::models::FeedDocument;
use crate::utils::fs::{copy_atomic, write_atomic};

#[derive(Debug, Clone)]
pub struct FeedStorage {
    working_path: PathBuf,
    published_path: PathBuf,
    version: String,
}

impl FeedStorage {
    pub fn new<W, P, V>(working_path: W, published_path: P, version: V) -> Self
    where
        W: Into<PathBuf>,
        P: Into<PathBuf>,
        V: Into<String>,
    {
        Self {
            working_path: working_path.into(),
            published_path: published_path.into(),
            version: version.into(),
        }
    }

    pub fn from_config(storage: &StorageConfig, version: impl Into<String>) -> Self {
        Self::new(storage.working_path(), storage.feed_path(), version)
    }

    pub fn working_path(&self) -> &Path {
        &self.working_path
    }

    pub fn published_path(&self) -> &Path {
        &self.published_path
    }

    /// A fresh document stamped with the configured feed version
    pub fn empty_document(&self) -> FeedDocument {
        FeedDocument::new(self.version.clone())
    }

    /// Load the working document; `None` when no pass has written one yet
    pub async fn load_working(&self) -> Result<Option<FeedDocument>, FeedError> {
        read_document(&self.working_path).await
    }

    /// Persist the working document, refreshing its root metadata
    pub async fn save_working(&self, doc: &mut FeedDocument) -> Result<(), FeedError> {
        doc.version = self.version.clone();
        doc.timestamp = chrono::Utc::now().timestamp();

        let xml = to_xml(doc)?;
        write_atomic(&self.working_path, xml)
            .await
            .map_err(|e| FeedError::storage(&self.working_path, e))?;

        debug!(
            "Saved working feed {} ({} products)",
            self.working_path.display(),
            doc.len()
        );
        Ok(())
    }

    /// Remove the working document so the next pass rebuilds it from scratch
    pub async fn discard_working(&self) -> Result<(), FeedError> {
        match tokio::fs::remove_file(&self.working_path).await {
            Ok(()) => {
                warn!("Discarded working feed {}", self.working_path.display());
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(FeedError::storage(&self.working_path, e)),
        }
    }

    /// Copy the working document over the published one
    ///
    /// The working copy stays in place so the next pass can diff against it.
    pub async fn publish(&self) -> Result<u64, FeedError> {
        let bytes = copy_atomic(&self.working_path, &self.published_path)
            .await
            .map_err(|e| FeedError::storage(&self.published_path, e))?;

        info!(
            "Published feed {} ({} bytes)",
            self.published_path.display(),
            bytes
        );
        Ok(bytes)
    }

    pub async fn load_published(&self) -> Result<Option<FeedDocument>, FeedError> {
        read_document(&self.published_path).await
    }
}

async fn read_document(path: &Path) -> Result<Option<FeedDocument>, FeedError> {
    let content = match tokio::fs::read_to_string(path).await {
        Ok(content) => content,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) if e.kind() == std::io::ErrorKind::InvalidData => {
            return Err(FeedError::corrupt(path, format!("not valid UTF-8: {e}")));
        }
        Err(e) => return Err(FeedError::storage(path, e)),
    };

    match from_xml(&content) {
        Ok(doc) => Ok(Some(doc)),
        Err(e) => Err(FeedError::corrupt(path, e.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ColumnValue, FormattedProduct, Scalar};

    fn storage_in(dir: &Path) -> FeedStorage {
        FeedStorage::new(
            dir.join("product-feed-tmp.xml"),
            dir.join("feeds/product-feed.xml"),
            "2.1.0",
        )
    }

    fn lamp() -> FormattedProduct {
        let mut formatted = FormattedProduct::new();
        formatted.insert("name".to_string(), ColumnValue::Single(Scalar::from("Lamp")));
        formatted
    }

    #[tokio::test]
    async fn test_missing_documents_load_as_none() -> Result<(), Box<dyn std::error::Error>> {
        let temp_dir = tempfile::tempdir()?;
        let storage = storage_in(temp_dir.path());

        assert!(storage.load_working().await?.is_none());
        assert!(storage.load_published().await?.is_none());
        assert!(storage.empty_document().is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn test_save_then_publish() -> Result<(), Box<dyn std::error::Error>> {
        let temp_dir = tempfile::tempdir()?;
        let storage = storage_in(temp_dir.path());

        let mut doc = FeedDocument::new("0.0.1");
        doc.merge_one("1", &lamp());
        storage.save_working(&mut doc).await?;
        assert_eq!(doc.version, "2.1.0");

        assert!(storage.load_published().await?.is_none());
        storage.publish().await?;

        let published = storage.load_published().await?.ok_or("missing published feed")?;
        assert_eq!(published, doc);
        assert!(storage.working_path().exists());
        Ok(())
    }

    #[tokio::test]
    async fn test_corrupt_working_document() -> Result<(), Box<dyn std::error::Error>> {
        let temp_dir = tempfile::tempdir()?;
        let storage = storage_in(temp_dir.path());
        tokio::fs::write(storage.working_path(), "<productFeed><products count=\"3\">").await?;

        let err = storage.load_working().await.unwrap_err();
        assert!(err.is_corruption());

        storage.discard_working().await?;
        assert!(storage.load_working().await?.is_none());
        // Discarding twice is fine
        storage.discard_working().await?;
        Ok(())
    }
}
