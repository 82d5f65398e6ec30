use serde::{Deserialize, Serialize};
use std::fmt;

pub mod feed;
pub mod generation;
pub mod mapping;
pub mod product;

pub use feed::{FeedDocument, FeedField, FeedNode};
pub use generation::{GenerationPhase, GenerationState};
pub use mapping::{ColumnMapping, ColumnValue, FormattedProduct, MappingEntry};
pub use product::{FlatProduct, RawProduct};

/// A leaf value of a product record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Scalar {
    Null,
    Bool(bool),
    Number(serde_json::Number),
    String(String),
}

impl Scalar {
    /// Null, `false` and whitespace-only strings render as an empty field
    pub fn is_blank(&self) -> bool {
        match self {
            Scalar::Null => true,
            Scalar::Bool(b) => !b,
            Scalar::Number(_) => false,
            Scalar::String(s) => s.trim().is_empty(),
        }
    }

    /// Text used for the feed element; booleans follow the `1`/empty convention
    pub fn to_text(&self) -> String {
        match self {
            Scalar::Null => String::new(),
            Scalar::Bool(true) => "1".to_string(),
            Scalar::Bool(false) => String::new(),
            Scalar::Number(n) => n.to_string(),
            Scalar::String(s) => s.clone(),
        }
    }
}

impl fmt::Display for Scalar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_text())
    }
}

impl From<&str> for Scalar {
    fn from(value: &str) -> Self {
        Scalar::String(value.to_string())
    }
}

impl From<String> for Scalar {
    fn from(value: String) -> Self {
        Scalar::String(value)
    }
}

impl From<i64> for Scalar {
    fn from(value: i64) -> Self {
        Scalar::Number(value.into())
    }
}
