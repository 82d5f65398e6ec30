//! Feed document handling: content-hash merge, XML codec and file storage

pub mod document;
pub mod storage;
pub mod xml;

pub use document::{content_hash, MergeOutcome, MergeStats};
pub use storage::FeedStorage;
