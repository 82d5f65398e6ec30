//! Field flattening
//!
//! Nested product records are turned into `dot.path -> scalar` pairs so
//! the column mapper can address any leaf by a single string. Sequence
//! indices stay in the concrete path (`images.0.src`); wildcard lookups
//! (`images.*.src`) are answered by the mapping engine on top of it.

use serde_json::Value;

use crate::models::{FlatProduct, RawProduct, Scalar};

/// Flatten a raw product into its concrete dot-path map
///
/// Empty objects and arrays contribute no leaves; `null` and empty
/// strings are kept because "present but blank" matters downstream.
pub fn flatten(raw: &RawProduct) -> FlatProduct {
    let mut flat = FlatProduct::new();
    for (field, value) in raw.fields() {
        flatten_value(field.clone(), value, &mut flat);
    }
    flat
}

fn flatten_value(path: String, value: &Value, out: &mut FlatProduct) {
    match value {
        Value::Object(map) => {
            for (key, child) in map {
                flatten_value(format!("{path}.{key}"), child, out);
            }
        }
        Value::Array(items) => {
            for (index, child) in items.iter().enumerate() {
                flatten_value(format!("{path}.{index}"), child, out);
            }
        }
        Value::Null => out.insert(path, Scalar::Null),
        Value::Bool(b) => out.insert(path, Scalar::Bool(*b)),
        Value::Number(n) => out.insert(path, Scalar::Number(n.clone())),
        Value::String(s) => out.insert(path, Scalar::String(s.clone())),
    }
}
