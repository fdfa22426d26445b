//! Fetch request and result types.

use std::time::Duration;

use reqwest::Method;
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::cache::cache_key;
use crate::client::{ClientError, UpstreamRequest, UpstreamResponse};

/// One logical fetch, tagged with the operation class it belongs to.
#[derive(Debug, Clone)]
pub struct FetchRequest {
    pub operation: String,
    pub method: Method,
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub body: Option<String>,
    /// Overrides the operation's TTL.
    pub ttl: Option<Duration>,
    /// Overrides the end-to-end fetch timeout.
    pub timeout: Option<Duration>,
}

impl FetchRequest {
    pub fn new(operation: impl Into<String>, method: Method, url: impl Into<String>) -> Self {
        Self {
            operation: operation.into(),
            method,
            url: url.into(),
            headers: Vec::new(),
            body: None,
            ttl: None,
            timeout: None,
        }
    }

    pub fn get(operation: impl Into<String>, url: impl Into<String>) -> Self {
        Self::new(operation, Method::GET, url)
    }

    pub fn post(operation: impl Into<String>, url: impl Into<String>) -> Self {
        Self::new(operation, Method::POST, url)
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn body(mut self, body: impl Into<String>) -> Self {
        self.body = Some(body.into());
        self
    }

    /// Serialize `value` as the body and set the JSON content type.
    pub fn json_body<T: Serialize>(self, value: &T) -> Result<Self, serde_json::Error> {
        let body = serde_json::to_string(value)?;
        Ok(self.header("content-type", "application/json").body(body))
    }

    pub fn ttl(mut self, ttl: Duration) -> Self {
        self.ttl = Some(ttl);
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn cache_key(&self) -> String {
        cache_key(self.method.as_str(), &self.url, self.body.as_deref())
    }

    pub(crate) fn to_upstream(&self) -> UpstreamRequest {
        UpstreamRequest {
            method: self.method.clone(),
            url: self.url.clone(),
            headers: self.headers.clone(),
            body: self.body.clone(),
            timeout: None,
        }
    }
}

/// Where a fetched response came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FetchSource {
    Network { attempts: u32 },
    /// A cache entry, or the response of a concurrent fetch of the same key.
    Cache,
    /// Expired cache entry served after the upstream failed.
    Stale,
}

impl FetchSource {
    pub fn label(&self) -> &'static str {
        match self {
            FetchSource::Network { .. } => "network",
            FetchSource::Cache => "cache",
            FetchSource::Stale => "stale",
        }
    }
}

#[derive(Debug, Clone)]
pub struct Fetched {
    pub response: UpstreamResponse,
    pub source: FetchSource,
    pub elapsed: Duration,
}

impl Fetched {
    pub fn is_cached(&self) -> bool {
        !matches!(self.source, FetchSource::Network { .. })
    }

    pub fn json<T: DeserializeOwned>(&self) -> Result<T, AccessError> {
        Ok(self.response.json()?)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum AccessError {
    #[error(transparent)]
    Upstream(#[from] ClientError),

    #[error("Fetch timed out after {0:?}")]
    Timeout(Duration),

    #[error("Failed to decode response body: {0}")]
    Decode(#[from] serde_json::Error),
}
