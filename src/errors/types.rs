//! Error type definitions for the feed generator
//!
//! This module defines all error types used throughout the crate,
//! providing a hierarchical error system that keeps the recoverable
//! failures (corrupt working document, unreachable source) apart from
//! configuration mistakes that must be fixed by an operator.

use std::path::PathBuf;
use thiserror::Error;

/// Top-level application error type
///
/// This enum represents all possible errors that can occur while
/// generating a feed. It uses `thiserror` to provide automatic error
/// trait implementations and proper error chaining.
#[derive(Error, Debug)]
pub enum AppError {
    /// Feed document errors
    #[error("Feed error: {0}")]
    Feed(#[from] FeedError),

    /// Column mapping errors
    #[error("Mapping error: {0}")]
    Mapping(#[from] MappingError),

    /// Product source errors
    #[error("Source error: {0}")]
    Source(#[from] SourceError),

    /// Generation state persistence errors
    #[error("State error: {path:?} - {message}")]
    State { path: PathBuf, message: String },

    /// Configuration errors
    #[error("Configuration error: {message}")]
    Configuration { message: String },

    /// File system errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Generic internal errors
    #[error("Internal error: {message}")]
    Internal { message: String },
}

/// Feed document specific errors
#[derive(Error, Debug)]
pub enum FeedError {
    /// The stored document could not be parsed; it must be discarded
    #[error("Corrupt feed document {path:?}: {message}")]
    Corrupt { path: PathBuf, message: String },

    /// XML parsing failures on in-memory content
    #[error("Parse error: {message}")]
    Parse { message: String },

    /// XML serialization failures
    #[error("Serialization failed: {message}")]
    Serialize { message: String },

    /// Reading or writing a document file failed
    #[error("Storage error: {path:?} - {source}")]
    Storage {
        path: PathBuf,
        source: std::io::Error,
    },
}

/// Column mapping validation errors, raised when a mapping is saved
#[derive(Error, Debug, PartialEq, Eq)]
pub enum MappingError {
    /// Output column is not part of the declared feed schema
    #[error("Unknown column: {column}")]
    UnknownColumn { column: String },

    /// Output column name cannot be used as an element name
    #[error("Invalid column name: {column}")]
    InvalidColumnName { column: String },

    /// Required column has no mapping
    #[error("Missing required column: {column}")]
    MissingRequiredColumn { column: String },

    /// Source path pattern is empty
    #[error("Empty pattern for column {column}")]
    EmptyPattern { column: String },

    /// Source path pattern has more than one wildcard segment
    #[error("Pattern {pattern} for column {column} has {count} wildcard segments (max 1)")]
    TooManyWildcards {
        column: String,
        pattern: String,
        count: usize,
    },

    /// Wildcard does not stand for a whole path segment
    #[error("Pattern {pattern} for column {column} uses '*' inside a segment")]
    PartialWildcard { column: String, pattern: String },

    /// Pattern could not be compiled into a matcher
    #[error("Invalid pattern {pattern} for column {column}: {message}")]
    InvalidPattern {
        column: String,
        pattern: String,
        message: String,
    },

    /// Same column mapped twice
    #[error("Duplicate column: {column}")]
    DuplicateColumn { column: String },
}

/// Product source specific errors
#[derive(Error, Debug)]
pub enum SourceError {
    /// A page could not be fetched
    #[error("Failed to fetch page {page}: {message}")]
    PageFetch { page: u32, message: String },

    /// The live product id listing could not be produced
    #[error("Failed to list live product ids: {message}")]
    LiveIds { message: String },

    /// The source data could not be read or decoded
    #[error("Unreadable source {location}: {message}")]
    Unreadable { location: String, message: String },
}

/// Convenience methods for creating common error types
impl AppError {
    /// Create a configuration error with a custom message
    pub fn configuration<S: Into<String>>(message: S) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// Create an internal error
    pub fn internal<S: Into<String>>(message: S) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Create a state persistence error
    pub fn state<P: Into<PathBuf>, M: Into<String>>(path: P, message: M) -> Self {
        Self::State {
            path: path.into(),
            message: message.into(),
        }
    }
}

impl FeedError {
    pub fn corrupt<P: Into<PathBuf>, M: Into<String>>(path: P, message: M) -> Self {
        Self::Corrupt {
            path: path.into(),
            message: message.into(),
        }
    }

    pub fn parse<M: Into<String>>(message: M) -> Self {
        Self::Parse {
            message: message.into(),
        }
    }

    pub fn serialize<M: Into<String>>(message: M) -> Self {
        Self::Serialize {
            message: message.into(),
        }
    }

    pub fn storage<P: Into<PathBuf>>(path: P, source: std::io::Error) -> Self {
        Self::Storage {
            path: path.into(),
            source,
        }
    }

    /// Whether the error means the stored document is unusable
    pub fn is_corruption(&self) -> bool {
        matches!(self, Self::Corrupt { .. } | Self::Parse { .. })
    }
}

impl SourceError {
    pub fn page_fetch<M: Into<String>>(page: u32, message: M) -> Self {
        Self::PageFetch {
            page,
            message: message.into(),
        }
    }

    pub fn live_ids<M: Into<String>>(message: M) -> Self {
        Self::LiveIds {
            message: message.into(),
        }
    }

    pub fn unreadable<L: Into<String>, M: Into<String>>(location: L, message: M) -> Self {
        Self::Unreadable {
            location: location.into(),
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = AppError::from(MappingError::TooManyWildcards {
            column: "imageURL".to_string(),
            pattern: "images.*.sizes.*".to_string(),
            count: 2,
        });
        assert_eq!(
            err.to_string(),
            "Mapping error: Pattern images.*.sizes.* for column imageURL has 2 wildcard segments (max 1)"
        );

        let err = AppError::from(SourceError::page_fetch(3, "timeout"));
        assert_eq!(err.to_string(), "Source error: Failed to fetch page 3: timeout");
    }

    #[test]
    fn test_corruption_classification() {
        assert!(FeedError::corrupt("/tmp/feed.xml", "bad").is_corruption());
        assert!(FeedError::parse("unexpected eof").is_corruption());
        assert!(!FeedError::serialize("boom").is_corruption());
    }
}
