//! Incremental, resumable product feed generation
//!
//! A catalog is walked page by page, every product is flattened and
//! projected onto the configured feed columns, and the result is merged
//! into a persisted XML feed by content hash. Progress survives restarts;
//! consumers only ever see a completely generated feed.

pub mod config;
pub mod data_mapping;
pub mod errors;
pub mod feed;
pub mod generator;
pub mod models;
pub mod scheduler;
pub mod sources;
pub mod utils;

pub use errors::{AppError, AppResult};
pub use generator::{FeedGenerator, TriggerOutcome};
