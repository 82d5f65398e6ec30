//! Utility functions for the feed generator
//!
//! - `utils::text` for the text sanitation behind the CDATA decision
//! - `utils::fs` for atomic file writes
//! - URL helpers for the public feed location (below)

use url::Url;

pub mod fs;
pub mod text;

/// Sanitize a base URL by removing trailing slashes and ensuring proper format
pub fn sanitize_base_url(base_url: &str) -> String {
    let mut url = base_url.trim().to_string();

    while url.ends_with('/') {
        url.pop();
    }

    if !url.starts_with("http://") && !url.starts_with("https://") {
        url = format!("http://{}", url);
    }

    url
}

/// Public URL consumers fetch the published feed from
pub fn feed_public_url(base_url: &str, feed_file_name: &str) -> Result<Url, url::ParseError> {
    let base = Url::parse(&format!("{}/", sanitize_base_url(base_url)))?;
    base.join(&format!("feeds/{}", feed_file_name))
}
