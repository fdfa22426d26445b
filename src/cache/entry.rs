//! Cached value with its expiry metadata.

use serde::{Deserialize, Serialize};

/// One cached value. Also the on-disk file format.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry {
    pub key: String,
    pub value: serde_json::Value,
    /// Unix milliseconds at insertion.
    pub created_at: u64,
    /// Lifetime in milliseconds.
    pub ttl: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub etag: Option<String>,
}

impl CacheEntry {
    pub fn new(key: impl Into<String>, value: serde_json::Value, created_at: u64, ttl: u64) -> Self {
        Self {
            key: key.into(),
            value,
            created_at,
            ttl,
            etag: None,
        }
    }

    pub fn with_etag(mut self, etag: Option<String>) -> Self {
        self.etag = etag;
        self
    }

    pub fn expires_at(&self) -> u64 {
        self.created_at.saturating_add(self.ttl)
    }

    /// Valid strictly before `created_at + ttl`.
    pub fn is_valid(&self, now: u64) -> bool {
        now < self.expires_at()
    }

    pub fn age_millis(&self, now: u64) -> u64 {
        now.saturating_sub(self.created_at)
    }
}
