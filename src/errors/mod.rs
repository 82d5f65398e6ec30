//! Error handling for the feed generator

pub mod types;

pub use types::{AppError, FeedError, MappingError, SourceError};

/// Result alias used across the library
pub type AppResult<T> = Result<T, AppError>;
