//! Product records as produced by the catalog source and after flattening

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::{BTreeMap, BTreeSet};

use super::Scalar;
use crate::utils::text::strip_invalid_xml_chars;

/// Wildcard marker standing for any sequence index in a path
pub const WILDCARD_SEGMENT: &str = "*";

/// Unmodified nested product record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RawProduct {
    fields: Map<String, Value>,
}

impl RawProduct {
    pub fn new(fields: Map<String, Value>) -> Self {
        Self { fields }
    }

    /// Accept only JSON objects; anything else is a malformed record
    pub fn from_value(value: Value) -> Option<Self> {
        match value {
            Value::Object(fields) => Some(Self { fields }),
            _ => None,
        }
    }

    /// Source-defined identity; numbers and non-blank strings qualify
    ///
    /// The id becomes an XML attribute, so code points XML cannot carry
    /// are removed before the blank check.
    pub fn id(&self) -> Option<String> {
        match self.fields.get("id")? {
            Value::String(s) => {
                let id = strip_invalid_xml_chars(s);
                let id = id.trim();
                (!id.is_empty()).then(|| id.to_string())
            }
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        }
    }

    pub fn fields(&self) -> &Map<String, Value> {
        &self.fields
    }

    pub fn get(&self, field: &str) -> Option<&Value> {
        self.fields.get(field)
    }
}

/// Dot-path to scalar view of a product
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FlatProduct {
    values: BTreeMap<String, Scalar>,
}

impl FlatProduct {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, path: String, value: Scalar) {
        self.values.insert(path, value);
    }

    pub fn get(&self, path: &str) -> Option<&Scalar> {
        self.values.get(path)
    }

    pub fn contains(&self, path: &str) -> bool {
        self.values.contains_key(path)
    }

    pub fn paths(&self) -> impl Iterator<Item = &String> {
        self.values.keys()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Scalar)> {
        self.values.iter()
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Every path with its numeric segments generalized to the wildcard,
    /// e.g. `images.0.src` and `images.1.src` both yield `images.*.src`
    pub fn field_patterns(&self) -> BTreeSet<String> {
        self.values
            .keys()
            .map(|path| {
                path.split('.')
                    .map(|segment| {
                        if is_index_segment(segment) {
                            WILDCARD_SEGMENT
                        } else {
                            segment
                        }
                    })
                    .collect::<Vec<_>>()
                    .join(".")
            })
            .collect()
    }
}

impl FromIterator<(String, Scalar)> for FlatProduct {
    fn from_iter<T: IntoIterator<Item = (String, Scalar)>>(iter: T) -> Self {
        Self {
            values: iter.into_iter().collect(),
        }
    }
}

pub(crate) fn is_index_segment(segment: &str) -> bool {
    !segment.is_empty() && segment.bytes().all(|b| b.is_ascii_digit())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_raw_product_id() {
        let product = RawProduct::from_value(json!({"id": 42, "name": "Lamp"})).unwrap();
        assert_eq!(product.id(), Some("42".to_string()));

        let product = RawProduct::from_value(json!({"id": " sku-1 "})).unwrap();
        assert_eq!(product.id(), Some("sku-1".to_string()));

        let product = RawProduct::from_value(json!({"id": ""})).unwrap();
        assert_eq!(product.id(), None);

        let product = RawProduct::from_value(json!({"id": "sku\u{1}-2"})).unwrap();
        assert_eq!(product.id(), Some("sku-2".to_string()));

        let product = RawProduct::from_value(json!({"id": "\u{0B}"})).unwrap();
        assert_eq!(product.id(), None);

        let product = RawProduct::from_value(json!({"name": "no id"})).unwrap();
        assert_eq!(product.id(), None);

        assert!(RawProduct::from_value(json!("not an object")).is_none());
        assert!(RawProduct::from_value(json!([1, 2])).is_none());
    }

    #[test]
    fn test_field_patterns_generalize_indices() {
        let flat: FlatProduct = vec![
            ("id".to_string(), Scalar::from(1)),
            ("images.0.src".to_string(), Scalar::from("a")),
            ("images.1.src".to_string(), Scalar::from("b")),
            ("categories.0.name".to_string(), Scalar::from("Lamps")),
        ]
        .into_iter()
        .collect();

        let patterns: Vec<_> = flat.field_patterns().into_iter().collect();
        assert_eq!(patterns, vec!["categories.*.name", "id", "images.*.src"]);
    }
}
