//! Incremental merge of formatted products into the feed document
//!
//! Every node carries a digest of the product it was built from. A
//! product whose digest did not change is left untouched, which keeps a
//! full pass over an unchanged catalog free of document mutations.

use sha2::{Digest, Sha256};
use std::collections::HashSet;

use crate::models::{ColumnValue, FeedDocument, FeedField, FeedNode, FormattedProduct, Scalar};
use crate::utils::text::{needs_cdata, strip_invalid_xml_chars};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeOutcome {
    Inserted,
    Replaced,
    Skipped,
}

/// Running totals of merge decisions over a page or a pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct MergeStats {
    pub inserted: usize,
    pub replaced: usize,
    pub skipped: usize,
    /// Products dropped before merging (no id, not an object)
    pub invalid: usize,
    /// Nodes pruned at finalize
    pub removed: usize,
}

impl MergeStats {
    pub fn record(&mut self, outcome: MergeOutcome) {
        match outcome {
            MergeOutcome::Inserted => self.inserted += 1,
            MergeOutcome::Replaced => self.replaced += 1,
            MergeOutcome::Skipped => self.skipped += 1,
        }
    }

    pub fn absorb(&mut self, other: &MergeStats) {
        self.inserted += other.inserted;
        self.replaced += other.replaced;
        self.skipped += other.skipped;
        self.invalid += other.invalid;
        self.removed += other.removed;
    }

    pub fn changed(&self) -> usize {
        self.inserted + self.replaced + self.removed
    }
}

/// Hex SHA-256 over a canonical encoding of the formatted product
///
/// Columns are visited in sorted order and every value is length
/// prefixed, so neither resolution order nor value contents can make
/// two different products encode the same way.
pub fn content_hash(formatted: &FormattedProduct) -> String {
    let mut hasher = Sha256::new();
    for (column, value) in formatted.iter() {
        hasher.update(format!("{}:{}=", column.len(), column).as_bytes());
        match value {
            ColumnValue::Single(scalar) => {
                hasher.update(b"1");
                hasher.update(encode_scalar(scalar).as_bytes());
            }
            ColumnValue::Multiple(scalars) => {
                hasher.update(format!("m{}", scalars.len()).as_bytes());
                for scalar in scalars {
                    hasher.update(encode_scalar(scalar).as_bytes());
                }
            }
        }
        hasher.update(b";");
    }

    format!("{:x}", hasher.finalize())
}

fn encode_scalar(scalar: &Scalar) -> String {
    match scalar {
        Scalar::Null => "n".to_string(),
        Scalar::Bool(b) => format!("b{}", u8::from(*b)),
        Scalar::Number(n) => {
            let text = n.to_string();
            format!("d{}:{}", text.len(), text)
        }
        Scalar::String(s) => format!("s{}:{}", s.len(), s),
    }
}

impl FeedField {
    /// Render one scalar as a column element
    ///
    /// Blank values still produce an (empty) element so the field set
    /// stays stable for consumers.
    pub fn from_scalar(column: &str, scalar: &Scalar) -> Self {
        if scalar.is_blank() {
            return Self {
                name: column.to_string(),
                value: String::new(),
                cdata: false,
            };
        }

        let text = scalar.to_text();
        let raw = strip_invalid_xml_chars(&text);
        Self {
            name: column.to_string(),
            cdata: needs_cdata(&raw),
            value: raw.trim().to_string(),
        }
    }
}

impl FeedNode {
    pub fn build(id: &str, hash: String, formatted: &FormattedProduct) -> Self {
        let fields = formatted
            .iter()
            .flat_map(|(column, value)| {
                value
                    .values()
                    .into_iter()
                    .map(|scalar| FeedField::from_scalar(column, scalar))
                    .collect::<Vec<_>>()
            })
            .collect();

        Self {
            id: id.to_string(),
            hash,
            fields,
        }
    }
}

impl FeedDocument {
    /// Insert, replace or skip the node for `id`
    ///
    /// Any node sharing the id is dropped unless it is the single node
    /// with an identical hash, which also collapses duplicates left by
    /// an earlier inconsistent run.
    pub fn merge_one(&mut self, id: &str, formatted: &FormattedProduct) -> MergeOutcome {
        let hash = content_hash(formatted);

        let (existed, unchanged) = {
            let mut existing = self.nodes_with_id(id);
            let first = existing.next();
            let has_more = existing.next().is_some();
            (
                first.is_some(),
                !has_more && first.is_some_and(|node| node.hash == hash),
            )
        };

        if unchanged {
            return MergeOutcome::Skipped;
        }

        if existed {
            self.nodes.retain(|node| node.id != id);
        }
        self.nodes.push(FeedNode::build(id, hash, formatted));

        if existed {
            MergeOutcome::Replaced
        } else {
            MergeOutcome::Inserted
        }
    }

    /// Drop every node whose id is no longer live, keeping the order of
    /// the rest; returns how many nodes were removed
    pub fn finalize(&mut self, live_ids: &HashSet<String>) -> usize {
        let before = self.nodes.len();
        self.nodes.retain(|node| live_ids.contains(&node.id));
        before - self.nodes.len()
    }
}
