use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::Scalar;

/// Column names with this prefix configure generation instead of feed content
pub const META_COLUMN_PREFIX: &str = "__";

/// Output column name bound to a source path pattern
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MappingEntry {
    pub column: String,
    pub pattern: String,
}

impl MappingEntry {
    pub fn new<C: Into<String>, P: Into<String>>(column: C, pattern: P) -> Self {
        Self {
            column: column.into(),
            pattern: pattern.into(),
        }
    }

    pub fn is_meta(&self) -> bool {
        self.column.starts_with(META_COLUMN_PREFIX)
    }
}

/// The full set of mapping entries, keyed by unique column name
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnMapping {
    pub columns: BTreeMap<String, String>,
}

impl ColumnMapping {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_entry<C: Into<String>, P: Into<String>>(mut self, column: C, pattern: P) -> Self {
        self.columns.insert(column.into(), pattern.into());
        self
    }

    pub fn entries(&self) -> Vec<MappingEntry> {
        self.columns
            .iter()
            .map(|(column, pattern)| MappingEntry::new(column.clone(), pattern.clone()))
            .collect()
    }

    pub fn get(&self, column: &str) -> Option<&str> {
        self.columns.get(column).map(String::as_str)
    }

    /// True when no entry contributes feed content
    pub fn is_empty(&self) -> bool {
        self.columns
            .keys()
            .all(|column| column.starts_with(META_COLUMN_PREFIX))
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }
}

impl FromIterator<MappingEntry> for ColumnMapping {
    fn from_iter<T: IntoIterator<Item = MappingEntry>>(iter: T) -> Self {
        Self {
            columns: iter
                .into_iter()
                .map(|entry| (entry.column, entry.pattern))
                .collect(),
        }
    }
}

/// Resolved value of one output column
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ColumnValue {
    Single(Scalar),
    Multiple(Vec<Scalar>),
}

impl ColumnValue {
    pub fn values(&self) -> Vec<&Scalar> {
        match self {
            ColumnValue::Single(value) => vec![value],
            ColumnValue::Multiple(values) => values.iter().collect(),
        }
    }
}

/// A product projected onto the output columns
///
/// Column order is canonical (sorted), so serializing it is stable no
/// matter in which order the columns were resolved.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FormattedProduct {
    columns: BTreeMap<String, ColumnValue>,
}

impl FormattedProduct {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, column: String, value: ColumnValue) {
        self.columns.insert(column, value);
    }

    pub fn get(&self, column: &str) -> Option<&ColumnValue> {
        self.columns.get(column)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &ColumnValue)> {
        self.columns.iter()
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }
}

impl FromIterator<(String, ColumnValue)> for FormattedProduct {
    fn from_iter<T: IntoIterator<Item = (String, ColumnValue)>>(iter: T) -> Self {
        Self {
            columns: iter.into_iter().collect(),
        }
    }
}
