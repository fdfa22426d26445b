//! Cache key construction.
//!
//! Two requests share a key when they have the same method, the same URL after
//! normalization, and equivalent bodies:
//! - scheme and host lower-cased, default port removed, fragment dropped
//! - query pairs sorted
//! - JSON bodies re-serialized with sorted keys, other bodies trimmed

use sha2::{Digest, Sha256};
use url::Url;

/// Hex SHA-256 identifying a request.
pub fn cache_key(method: &str, url: &str, body: Option<&str>) -> String {
    let mut hasher = Sha256::new();
    hasher.update(method.to_ascii_uppercase().as_bytes());
    hasher.update(b"\n");
    hasher.update(normalize_url(url).as_bytes());
    hasher.update(b"\n");
    if let Some(body) = body {
        hasher.update(body_digest(body).as_bytes());
    }
    hex::encode(hasher.finalize())
}

/// Canonical form of `raw`. Unparseable URLs are only trimmed.
pub fn normalize_url(raw: &str) -> String {
    let Ok(mut url) = Url::parse(raw.trim()) else {
        return raw.trim().to_string();
    };
    url.set_fragment(None);

    let mut pairs: Vec<(String, String)> = url
        .query_pairs()
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();
    if pairs.is_empty() {
        url.set_query(None);
    } else {
        pairs.sort();
        url.query_pairs_mut().clear().extend_pairs(pairs);
    }
    url.to_string()
}

fn body_digest(body: &str) -> String {
    let canonical = match serde_json::from_str::<serde_json::Value>(body) {
        // Object keys serialize in sorted order.
        Ok(value) => value.to_string(),
        Err(_) => body.trim().to_string(),
    };
    hex::encode(Sha256::digest(canonical.as_bytes()))
}
