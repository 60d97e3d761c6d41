//! HTTP cache control module
//!
//! Provides `ETag` generation, conditional request handling, and the
//! per-extension `Cache-Control` policy.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::path::Path;

use crate::config::CacheConfig;

/// Generate `ETag` using fast hashing
///
/// Returns a quoted `ETag` string, e.g., `"abc123def"`. The hash covers the
/// uncompressed file content, so the validator is stable across the
/// compression stage.
pub fn generate_etag(content: &[u8]) -> String {
    let mut hasher = DefaultHasher::new();
    content.hash(&mut hasher);
    let v = hasher.finish();
    format!("\"{v:x}\"")
}

/// Check if client's `If-None-Match` header matches the server's `ETag`
///
/// Supports a single `ETag`, a comma-separated list, and the `*` wildcard.
/// Weak validators (`W/"..."`) compare by their opaque part.
///
/// Returns true if matched (should return 304), false otherwise.
pub fn check_etag_match(if_none_match: Option<&str>, etag: &str) -> bool {
    if_none_match.is_some_and(|client_etags| {
        client_etags.split(',').any(|candidate| {
            let candidate = candidate.trim();
            candidate == "*" || candidate.trim_start_matches("W/") == etag
        })
    })
}

/// `Cache-Control` policy for a served file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CachePolicy {
    max_age: u32,
}

impl CachePolicy {
    /// Select the policy for a resolved file path
    ///
    /// Every file starts with the default one-day freshness; paths whose
    /// extension is in the long-lived list (`.js`/`.css` by default) are
    /// overridden to the one-year policy afterwards, so the override always
    /// wins.
    pub fn for_path(path: &Path, rules: &CacheConfig) -> Self {
        let mut max_age = rules.default_max_age;
        if let Some(ext) = path.extension().and_then(|e| e.to_str()) {
            if rules.long_lived_extensions.iter().any(|e| e == ext) {
                max_age = rules.long_max_age;
            }
        }
        Self { max_age }
    }

    /// Render the `Cache-Control` header value
    pub fn header_value(self) -> String {
        format!("public, max-age={}", self.max_age)
    }
}
