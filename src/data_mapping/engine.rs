use regex::Regex;
use std::collections::HashMap;
use std::time::Instant;
use tracing::{debug, info, warn};

use crate::errors::MappingError;
use crate::models::product::WILDCARD_SEGMENT;
use crate::models::{ColumnMapping, ColumnValue, FlatProduct, FormattedProduct, Scalar};

/// Configuration for the Data Mapping Engine
#[derive(Debug, Clone)]
pub struct DataMappingEngineConfig {
    pub enable_pattern_caching: bool,
    pub enable_performance_logging: bool,
    pub max_pattern_cache_size: usize,
}

impl Default for DataMappingEngineConfig {
    fn default() -> Self {
        Self {
            enable_pattern_caching: true,
            enable_performance_logging: false,
            max_pattern_cache_size: 1000,
        }
    }
}

/// Compiled source path pattern
#[derive(Debug, Clone)]
pub struct PathPattern {
    raw: String,
    matcher: Option<Regex>,
}

impl PathPattern {
    /// Compile a pattern; at most one segment may be the wildcard
    pub fn parse(column: &str, pattern: &str) -> Result<Self, MappingError> {
        validate_pattern(column, pattern)?;

        if !has_wildcard(pattern) {
            return Ok(Self {
                raw: pattern.to_string(),
                matcher: None,
            });
        }

        let expression = pattern
            .split('.')
            .map(|segment| {
                if segment == WILDCARD_SEGMENT {
                    r"(\d+)".to_string()
                } else {
                    regex::escape(segment)
                }
            })
            .collect::<Vec<_>>()
            .join(r"\.");

        let matcher = Regex::new(&format!("^{expression}$")).map_err(|e| {
            MappingError::InvalidPattern {
                column: column.to_string(),
                pattern: pattern.to_string(),
                message: e.to_string(),
            }
        })?;

        Ok(Self {
            raw: pattern.to_string(),
            matcher: Some(matcher),
        })
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// All values addressed by this pattern, wildcard matches in
    /// ascending numeric index order
    pub fn resolve<'a>(&self, flat: &'a FlatProduct) -> Vec<&'a Scalar> {
        let Some(matcher) = &self.matcher else {
            return flat.get(&self.raw).into_iter().collect();
        };

        let mut matches: Vec<(u128, &Scalar)> = flat
            .iter()
            .filter_map(|(path, value)| {
                let captures = matcher.captures(path)?;
                let index = captures.get(1)?.as_str().parse::<u128>().unwrap_or(u128::MAX);
                Some((index, value))
            })
            .collect();

        // Lexicographic key order would put "10" before "2"
        matches.sort_by_key(|(index, _)| *index);
        matches.into_iter().map(|(_, value)| value).collect()
    }

    /// Whether the pattern addresses at least one path of the product
    pub fn matches_any(&self, flat: &FlatProduct) -> bool {
        match &self.matcher {
            Some(matcher) => flat.paths().any(|path| matcher.is_match(path)),
            None => flat.contains(&self.raw),
        }
    }
}

/// Main data mapping engine, projects flattened products onto the
/// configured output columns
pub struct DataMappingEngine {
    config: DataMappingEngineConfig,
    pattern_cache: HashMap<String, PathPattern>,
}

impl DataMappingEngine {
    pub fn new() -> Self {
        Self::with_config(DataMappingEngineConfig::default())
    }

    pub fn with_config(config: DataMappingEngineConfig) -> Self {
        Self {
            config,
            pattern_cache: HashMap::new(),
        }
    }

    /// Resolve a single pattern against a product
    pub fn resolve(
        &mut self,
        column: &str,
        pattern: &str,
        flat: &FlatProduct,
    ) -> Result<Vec<Scalar>, MappingError> {
        let compiled = self.compiled(column, pattern)?;
        Ok(compiled.resolve(flat).into_iter().cloned().collect())
    }

    /// Apply every non-meta mapping entry to a product
    ///
    /// Columns that resolve to nothing are left out entirely; a wildcard
    /// with several matches becomes a sequence, anything else a scalar.
    pub fn format(&mut self, mapping: &ColumnMapping, flat: &FlatProduct) -> FormattedProduct {
        let start_time = Instant::now();
        let mut formatted = FormattedProduct::new();

        for entry in mapping.entries() {
            if entry.is_meta() {
                continue;
            }

            let mut values = match self.resolve(&entry.column, &entry.pattern, flat) {
                Ok(values) => values,
                Err(e) => {
                    warn!("Skipping column '{}': {}", entry.column, e);
                    continue;
                }
            };

            let value = match values.len() {
                0 => continue,
                1 => ColumnValue::Single(values.remove(0)),
                _ => ColumnValue::Multiple(values),
            };
            formatted.insert(entry.column, value);
        }

        if self.config.enable_performance_logging {
            debug!(
                "Formatted product with {} of {} columns in {}μs",
                formatted.len(),
                mapping.len(),
                start_time.elapsed().as_micros()
            );
        }

        formatted
    }

    fn compiled(&mut self, column: &str, pattern: &str) -> Result<PathPattern, MappingError> {
        if !self.config.enable_pattern_caching {
            return PathPattern::parse(column, pattern);
        }

        if let Some(cached) = self.pattern_cache.get(pattern) {
            return Ok(cached.clone());
        }

        let compiled = PathPattern::parse(column, pattern)?;
        if self.pattern_cache.len() >= self.config.max_pattern_cache_size {
            info!(
                "Pattern cache reached {} entries, clearing",
                self.pattern_cache.len()
            );
            self.pattern_cache.clear();
        }
        self.pattern_cache
            .insert(pattern.to_string(), compiled.clone());
        Ok(compiled)
    }
}

impl Default for DataMappingEngine {
    fn default() -> Self {
        Self::new()
    }
}

pub fn has_wildcard(pattern: &str) -> bool {
    pattern.contains(WILDCARD_SEGMENT)
}

/// Structural checks shared by the engine and mapping validation
pub fn validate_pattern(column: &str, pattern: &str) -> Result<(), MappingError> {
    if pattern.trim().is_empty() {
        return Err(MappingError::EmptyPattern {
            column: column.to_string(),
        });
    }

    let mut wildcards = 0;
    for segment in pattern.split('.') {
        if segment == WILDCARD_SEGMENT {
            wildcards += 1;
        } else if segment.contains(WILDCARD_SEGMENT) {
            return Err(MappingError::PartialWildcard {
                column: column.to_string(),
                pattern: pattern.to_string(),
            });
        }
    }

    if wildcards > 1 {
        return Err(MappingError::TooManyWildcards {
            column: column.to_string(),
            pattern: pattern.to_string(),
            count: wildcards,
        });
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data_mapping::flatten::flatten;
    use crate::models::RawProduct;
    use serde_json::json;

    fn flat(value: serde_json::Value) -> FlatProduct {
        flatten(&RawProduct::from_value(value).unwrap())
    }

    #[test]
    fn test_resolve_exact_path() {
        let product = flat(json!({"id": 1, "name": "Lamp", "dimensions": {"width": "10"}}));
        let mut engine = DataMappingEngine::new();

        assert_eq!(
            engine.resolve("name", "name", &product).unwrap(),
            vec![Scalar::from("Lamp")]
        );
        assert_eq!(
            engine.resolve("width", "dimensions.width", &product).unwrap(),
            vec![Scalar::from("10")]
        );
        assert!(engine.resolve("brand", "brand", &product).unwrap().is_empty());
    }

    #[test]
    fn test_resolve_wildcard_orders_by_numeric_index() {
        let images: Vec<_> = (0..12)
            .map(|i| json!({"src": format!("img-{i}")}))
            .collect();
        let product = flat(json!({"id": 1, "images": images}));
        let mut engine = DataMappingEngine::new();

        let values = engine.resolve("imageURL", "images.*.src", &product).unwrap();
        let expected: Vec<Scalar> = (0..12).map(|i| Scalar::from(format!("img-{i}"))).collect();
        assert_eq!(values, expected);
    }

    #[test]
    fn test_wildcard_does_not_match_across_segments() {
        let product = flat(json!({
            "images": [{"src": "a"}],
            "imagesXsrc": "nope",
            "images_0_src": "nope"
        }));
        let pattern = PathPattern::parse("imageURL", "images.*.src").unwrap();
        let values: Vec<_> = pattern.resolve(&product).into_iter().cloned().collect();
        assert_eq!(values, vec![Scalar::from("a")]);
    }

    #[test]
    fn test_reject_invalid_patterns() {
        assert_eq!(
            PathPattern::parse("imageURL", "images.*.sizes.*").unwrap_err(),
            MappingError::TooManyWildcards {
                column: "imageURL".to_string(),
                pattern: "images.*.sizes.*".to_string(),
                count: 2,
            }
        );
        assert!(matches!(
            PathPattern::parse("imageURL", "images.1*.src"),
            Err(MappingError::PartialWildcard { .. })
        ));
        assert!(matches!(
            PathPattern::parse("name", "  "),
            Err(MappingError::EmptyPattern { .. })
        ));
    }

    #[test]
    fn test_format_wildcard_example() {
        let product = flat(json!({"id": 1, "images": [{"url": "a"}, {"url": "b"}]}));
        let mapping = ColumnMapping::new().with_entry("img", "images.*.url");
        let formatted = DataMappingEngine::new().format(&mapping, &product);

        assert_eq!(
            formatted.get("img"),
            Some(&ColumnValue::Multiple(vec![Scalar::from("a"), Scalar::from("b")]))
        );
        assert_eq!(formatted.len(), 1);
    }

    #[test]
    fn test_format_single_wildcard_match_is_scalar() {
        let product = flat(json!({"id": 1, "images": [{"url": "only"}]}));
        let mapping = ColumnMapping::new().with_entry("img", "images.*.url");
        let formatted = DataMappingEngine::new().format(&mapping, &product);
        assert_eq!(formatted.get("img"), Some(&ColumnValue::Single(Scalar::from("only"))));
    }

    #[test]
    fn test_format_keeps_empty_values_and_omits_missing() {
        let product = flat(json!({"id": 1, "description": ""}));
        let mapping = ColumnMapping::new()
            .with_entry("desc", "description")
            .with_entry("brand", "brand.name")
            .with_entry("img", "images.*.url");
        let formatted = DataMappingEngine::new().format(&mapping, &product);

        assert_eq!(formatted.get("desc"), Some(&ColumnValue::Single(Scalar::from(""))));
        assert!(formatted.get("brand").is_none());
        assert!(formatted.get("img").is_none());
        assert_eq!(formatted.len(), 1);
    }

    #[test]
    fn test_format_skips_meta_columns() {
        let product = flat(json!({"id": 1, "name": "Lamp"}));
        let mapping = ColumnMapping::new()
            .with_entry("name", "name")
            .with_entry("__batch_page", "id");
        let formatted = DataMappingEngine::new().format(&mapping, &product);
        assert_eq!(formatted.len(), 1);
        assert!(formatted.get("__batch_page").is_none());
    }

    #[test]
    fn test_format_is_deterministic() {
        let product = flat(json!({
            "id": 3,
            "name": "Chair",
            "images": [{"url": "c"}, {"url": "a"}, {"url": "b"}],
            "categories": [{"name": "Home"}, {"name": "Seating"}]
        }));
        let mapping = ColumnMapping::new()
            .with_entry("categories", "categories.*.name")
            .with_entry("imageURL", "images.*.url")
            .with_entry("name", "name");

        let first = serde_json::to_string(&DataMappingEngine::new().format(&mapping, &product)).unwrap();
        for _ in 0..5 {
            let again =
                serde_json::to_string(&DataMappingEngine::new().format(&mapping, &product)).unwrap();
            assert_eq!(first, again);
        }
    }

    #[test]
    fn test_pattern_cache_is_bounded() {
        let product = flat(json!({"a": 1, "b": 2, "c": 3}));
        let mut engine = DataMappingEngine::with_config(DataMappingEngineConfig {
            max_pattern_cache_size: 2,
            ..Default::default()
        });
        for field in ["a", "b", "c"] {
            assert_eq!(engine.resolve(field, field, &product).unwrap().len(), 1);
        }
        assert!(engine.pattern_cache.len() <= 2);
    }
}
