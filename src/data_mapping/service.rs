//! Column mapping persistence and save-time validation
//!
//! A mapping only reaches the generator after it passed every check
//! here. Resolution itself never fails on configuration grounds.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use tracing::{debug, info, warn};

use crate::config::{ColumnsConfig, Config};
use crate::data_mapping::engine::PathPattern;
use crate::errors::{AppError, AppResult, MappingError};
use crate::models::{ColumnMapping, FlatProduct, MappingEntry};
use crate::utils::fs::write_atomic;

fn element_name_regex() -> &'static Regex {
    static ELEMENT_NAME: OnceLock<Regex> = OnceLock::new();
    ELEMENT_NAME.get_or_init(|| {
        Regex::new(r"^[A-Za-z_][A-Za-z0-9_.\-]*$").expect("static element name pattern")
    })
}

/// Whether `column` can be written as an XML element name
pub fn is_valid_column_name(column: &str) -> bool {
    element_name_regex().is_match(column) && !column.to_ascii_lowercase().starts_with("xml")
}

/// Outcome of checking a mapping against a sample product
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MappingValidation {
    pub accepted: ColumnMapping,
    /// Entries whose pattern addressed nothing in the sample product
    pub dropped: Vec<MappingEntry>,
}

/// Build a mapping from entries, rejecting a column given twice
pub fn mapping_from_entries<I>(entries: I) -> Result<ColumnMapping, MappingError>
where
    I: IntoIterator<Item = MappingEntry>,
{
    let mut seen = BTreeSet::new();
    let mut collected = Vec::new();
    for entry in entries {
        if !seen.insert(entry.column.clone()) {
            return Err(MappingError::DuplicateColumn {
                column: entry.column,
            });
        }
        collected.push(entry);
    }
    Ok(collected.into_iter().collect())
}

#[derive(Debug, Clone)]
pub struct MappingService {
    columns: ColumnsConfig,
    path: PathBuf,
}

impl MappingService {
    pub fn new<P: Into<PathBuf>>(columns: ColumnsConfig, path: P) -> Self {
        Self {
            columns,
            path: path.into(),
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(config.columns.clone(), config.storage.mapping_file.clone())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn columns(&self) -> &ColumnsConfig {
        &self.columns
    }

    /// Structural and schema checks for every entry
    ///
    /// Meta columns are exempt from the schema and pattern checks since
    /// their value configures generation rather than addressing a field.
    pub fn validate_entries(&self, mapping: &ColumnMapping) -> Result<(), MappingError> {
        for entry in mapping.entries() {
            if !is_valid_column_name(&entry.column) {
                return Err(MappingError::InvalidColumnName {
                    column: entry.column,
                });
            }
            if entry.is_meta() {
                continue;
            }
            if !self.columns.allowed.iter().any(|c| *c == entry.column) {
                return Err(MappingError::UnknownColumn {
                    column: entry.column,
                });
            }
            PathPattern::parse(&entry.column, &entry.pattern)?;
        }
        Ok(())
    }

    pub fn validate_required(&self, mapping: &ColumnMapping) -> Result<(), MappingError> {
        match self
            .columns
            .required
            .iter()
            .find(|column| mapping.get(column).is_none())
        {
            Some(column) => Err(MappingError::MissingRequiredColumn {
                column: column.clone(),
            }),
            None => Ok(()),
        }
    }

    /// Full save-time validation without a sample product
    pub fn validate(&self, mapping: &ColumnMapping) -> Result<(), MappingError> {
        self.validate_entries(mapping)?;
        self.validate_required(mapping)
    }

    /// Drop entries that address nothing in `sample`
    ///
    /// Without a sample (empty catalog) every entry is kept.
    pub fn check_against_sample(
        &self,
        mapping: &ColumnMapping,
        sample: Option<&FlatProduct>,
    ) -> MappingValidation {
        let Some(sample) = sample else {
            debug!("No sample product available, keeping all mapping entries");
            return MappingValidation {
                accepted: mapping.clone(),
                dropped: Vec::new(),
            };
        };

        let mut accepted = Vec::new();
        let mut dropped = Vec::new();
        for entry in mapping.entries() {
            let matches = entry.is_meta()
                || PathPattern::parse(&entry.column, &entry.pattern)
                    .map(|pattern| pattern.matches_any(sample))
                    .unwrap_or(false);

            if matches {
                accepted.push(entry);
            } else {
                warn!(
                    "Dropping mapping {} -> {}: no such field in the sample product",
                    entry.column, entry.pattern
                );
                dropped.push(entry);
            }
        }

        MappingValidation {
            accepted: accepted.into_iter().collect(),
            dropped,
        }
    }

    /// Entry checks, sample check, then the required-column check on what survived
    pub fn prepare(
        &self,
        mapping: &ColumnMapping,
        sample: Option<&FlatProduct>,
    ) -> Result<MappingValidation, MappingError> {
        self.validate_entries(mapping)?;
        let validation = self.check_against_sample(mapping, sample);
        self.validate_required(&validation.accepted)?;
        Ok(validation)
    }

    /// Load the persisted mapping; a missing file is an empty mapping
    pub async fn load(&self) -> AppResult<ColumnMapping> {
        let content = match tokio::fs::read_to_string(&self.path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!("No mapping file at {}", self.path.display());
                return Ok(ColumnMapping::new());
            }
            Err(e) => return Err(e.into()),
        };

        toml::from_str(&content).map_err(|e| {
            AppError::configuration(format!(
                "Invalid mapping file {}: {}",
                self.path.display(),
                e
            ))
        })
    }

    pub async fn save(&self, mapping: &ColumnMapping) -> AppResult<()> {
        let content = toml::to_string_pretty(mapping)
            .map_err(|e| AppError::internal(format!("Failed to serialize mapping: {}", e)))?;
        write_atomic(&self.path, content).await?;
        info!(
            "Saved column mapping ({} entries) to {}",
            mapping.len(),
            self.path.display()
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data_mapping::flatten::flatten;
    use crate::models::RawProduct;
    use serde_json::json;

    fn service(path: PathBuf) -> MappingService {
        MappingService::new(ColumnsConfig::default(), path)
    }

    fn complete_mapping() -> ColumnMapping {
        ColumnMapping::new()
            .with_entry("name", "title")
            .with_entry("productURL", "permalink")
            .with_entry("price", "price")
    }

    fn sample() -> FlatProduct {
        flatten(
            &RawProduct::from_value(json!({
                "id": 7,
                "title": "Lamp",
                "permalink": "https://shop.example.com/lamp",
                "price": "19.99",
                "images": [{"src": "a.jpg"}]
            }))
            .unwrap(),
        )
    }

    #[test]
    fn test_column_names() {
        assert!(is_valid_column_name("productURL"));
        assert!(is_valid_column_name("__batch"));
        assert!(is_valid_column_name("image-url.2"));
        assert!(!is_valid_column_name("2name"));
        assert!(!is_valid_column_name("has space"));
        assert!(!is_valid_column_name("xmlThing"));
        assert!(!is_valid_column_name(""));
    }

    #[test]
    fn test_validate_accepts_complete_mapping() {
        let service = service(PathBuf::from("unused.toml"));
        assert_eq!(service.validate(&complete_mapping()), Ok(()));
    }

    #[test]
    fn test_validate_rejections() {
        let service = service(PathBuf::from("unused.toml"));

        let unknown = complete_mapping().with_entry("colour", "attributes.color");
        assert_eq!(
            service.validate(&unknown),
            Err(MappingError::UnknownColumn {
                column: "colour".to_string()
            })
        );

        let missing = ColumnMapping::new().with_entry("name", "title");
        assert!(matches!(
            service.validate(&missing),
            Err(MappingError::MissingRequiredColumn { .. })
        ));

        let double = complete_mapping().with_entry("imageURL", "variants.*.images.*.src");
        assert!(matches!(
            service.validate(&double),
            Err(MappingError::TooManyWildcards { count: 2, .. })
        ));

        let partial = complete_mapping().with_entry("imageURL", "images.img*.src");
        assert!(matches!(
            service.validate(&partial),
            Err(MappingError::PartialWildcard { .. })
        ));

        let empty = complete_mapping().with_entry("brand", " ");
        assert!(matches!(
            service.validate(&empty),
            Err(MappingError::EmptyPattern { .. })
        ));
    }

    #[test]
    fn test_meta_columns_skip_schema_checks() {
        let service = service(PathBuf::from("unused.toml"));
        let mapping = complete_mapping().with_entry("__limit", "not a path **");
        assert_eq!(service.validate(&mapping), Ok(()));
    }

    #[test]
    fn test_sample_check_drops_unmatched_entries() {
        let service = service(PathBuf::from("unused.toml"));
        let mapping = complete_mapping()
            .with_entry("imageURL", "images.*.src")
            .with_entry("brand", "manufacturer.name");

        let validation = service.check_against_sample(&mapping, Some(&sample()));
        assert_eq!(validation.dropped, vec![MappingEntry::new("brand", "manufacturer.name")]);
        assert_eq!(validation.accepted.get("imageURL"), Some("images.*.src"));
        assert_eq!(validation.accepted.len(), 4);

        let unchecked = service.check_against_sample(&mapping, None);
        assert!(unchecked.dropped.is_empty());
        assert_eq!(unchecked.accepted, mapping);
    }

    #[test]
    fn test_prepare_rejects_when_required_column_is_dropped() {
        let service = service(PathBuf::from("unused.toml"));
        let mapping = complete_mapping().with_entry("price", "pricing.amount");

        assert_eq!(
            service.prepare(&mapping, Some(&sample())),
            Err(MappingError::MissingRequiredColumn {
                column: "price".to_string()
            })
        );
    }

    #[test]
    fn test_duplicate_entries_are_rejected() {
        let entries = vec![
            MappingEntry::new("name", "title"),
            MappingEntry::new("name", "post_title"),
        ];
        assert_eq!(
            mapping_from_entries(entries),
            Err(MappingError::DuplicateColumn {
                column: "name".to_string()
            })
        );
    }

    #[tokio::test]
    async fn test_save_and_load() -> Result<(), Box<dyn std::error::Error>> {
        let temp_dir = tempfile::tempdir()?;
        let service = service(temp_dir.path().join("mapping.toml"));

        assert!(service.load().await?.is_empty());

        let mapping = complete_mapping().with_entry("imageURL", "images.*.src");
        service.save(&mapping).await?;
        assert_eq!(service.load().await?, mapping);
        Ok(())
    }

    #[tokio::test]
    async fn test_invalid_mapping_file() -> Result<(), Box<dyn std::error::Error>> {
        let temp_dir = tempfile::tempdir()?;
        let path = temp_dir.path().join("mapping.toml");
        tokio::fs::write(&path, "columns = 5").await?;

        let err = service(path).load().await.unwrap_err();
        assert!(matches!(err, AppError::Configuration { .. }));
        Ok(())
    }
}
