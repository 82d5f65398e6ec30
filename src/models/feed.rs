use serde::{Deserialize, Serialize};

/// One column element of a product node
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeedField {
    pub name: String,
    pub value: String,
    /// Written as a CDATA section instead of escaped text
    pub cdata: bool,
}

/// A product entry of the feed document
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeedNode {
    pub id: String,
    pub hash: String,
    pub fields: Vec<FeedField>,
}

impl FeedNode {
    pub fn field_values(&self, name: &str) -> Vec<&str> {
        self.fields
            .iter()
            .filter(|field| field.name == name)
            .map(|field| field.value.as_str())
            .collect()
    }
}

/// The feed artifact: ordered product nodes plus root metadata
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeedDocument {
    pub version: String,
    /// Unix seconds of the last save
    pub timestamp: i64,
    pub nodes: Vec<FeedNode>,
}

impl FeedDocument {
    pub fn new<V: Into<String>>(version: V) -> Self {
        Self {
            version: version.into(),
            timestamp: chrono::Utc::now().timestamp(),
            nodes: Vec::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn nodes_with_id<'a>(&'a self, id: &'a str) -> impl Iterator<Item = &'a FeedNode> + 'a {
        self.nodes.iter().filter(move |node| node.id == id)
    }

    pub fn ids(&self) -> Vec<&str> {
        self.nodes.iter().map(|node| node.id.as_str()).collect()
    }
}
