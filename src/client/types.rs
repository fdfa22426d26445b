//! Request, response and error types for the pooled client.

use std::collections::BTreeMap;
use std::time::Duration;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use reqwest::Method;
use serde::de::{DeserializeOwned, Error as _};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// An outbound request.
#[derive(Debug, Clone)]
pub struct UpstreamRequest {
    pub method: Method,
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub body: Option<String>,
    /// Per-attempt timeout; the client default applies when `None`.
    pub timeout: Option<Duration>,
}

impl UpstreamRequest {
    pub fn new(method: Method, url: impl Into<String>) -> Self {
        Self {
            method,
            url: url.into(),
            headers: Vec::new(),
            body: None,
            timeout: None,
        }
    }

    pub fn get(url: impl Into<String>) -> Self {
        Self::new(Method::GET, url)
    }
}

/// How `UpstreamResponse::body` holds the payload.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BodyEncoding {
    /// The body was valid UTF-8 and is stored as is.
    #[default]
    Text,
    /// The body was not UTF-8 and is stored base64-encoded.
    Base64,
}

/// A successful upstream response, fully read.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpstreamResponse {
    pub status: u16,
    /// Response headers, lower-cased names. Repeated headers are comma-joined.
    pub headers: BTreeMap<String, String>,
    pub body: String,
    #[serde(default)]
    pub encoding: BodyEncoding,
}

impl UpstreamResponse {
    /// Build a response from raw body bytes, keeping non-UTF-8 bodies intact.
    pub fn from_bytes(status: u16, headers: BTreeMap<String, String>, raw: &[u8]) -> Self {
        let (body, encoding) = match std::str::from_utf8(raw) {
            Ok(text) => (text.to_string(), BodyEncoding::Text),
            Err(_) => (STANDARD.encode(raw), BodyEncoding::Base64),
        };
        Self {
            status,
            headers,
            body,
            encoding,
        }
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(&name.to_ascii_lowercase()).map(String::as_str)
    }

    pub fn etag(&self) -> Option<&str> {
        self.header("etag")
    }

    /// The body exactly as the upstream sent it.
    pub fn bytes(&self) -> Result<Vec<u8>, base64::DecodeError> {
        match self.encoding {
            BodyEncoding::Text => Ok(self.body.as_bytes().to_vec()),
            BodyEncoding::Base64 => STANDARD.decode(&self.body),
        }
    }

    /// Decode the body as JSON.
    pub fn json<T: DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        match self.encoding {
            BodyEncoding::Text => serde_json::from_str(&self.body),
            BodyEncoding::Base64 => Err(serde_json::Error::custom("response body is not UTF-8")),
        }
    }
}

/// Result of `PooledClient::execute`.
#[derive(Debug)]
pub struct Execution {
    pub result: Result<UpstreamResponse, ClientError>,
    /// Wall time of the whole call, backoff included.
    pub elapsed: Duration,
    /// Attempts actually made (0 if the request never reached a pool).
    pub attempts: u32,
}

/// Errors produced by the pooled client.
#[derive(Debug, Clone, Error)]
pub enum ClientError {
    /// Malformed URL, method or header.
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// Could not establish a connection.
    #[error("Connect error: {0}")]
    Connect(String),

    /// The attempt did not finish within its deadline.
    #[error("Attempt timed out after {0:?}")]
    Timeout(Duration),

    /// Connection reset or other failure while sending or reading.
    #[error("Transport error: {0}")]
    Transport(String),

    /// The upstream answered with a non-success status.
    #[error("Upstream returned status {status}")]
    Status { status: u16, body: String },

    /// The outbound rate limit for the host is exhausted.
    #[error("Rate limit exceeded for {host}")]
    RateLimited { host: String },

    /// The client has been shut down.
    #[error("Connection pools are closed")]
    PoolClosed,

    /// The HTTP client for a pool could not be built.
    #[error("Failed to build HTTP client: {0}")]
    Build(String),

    /// Every permitted attempt failed transiently.
    #[error("Retries exhausted after {attempts} attempts: {last}")]
    Exhausted { attempts: u32, last: Box<ClientError> },
}

impl ClientError {
    /// Transient network-level failures. Status codes are judged by the retry policy.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            ClientError::Connect(_) | ClientError::Timeout(_) | ClientError::Transport(_)
        )
    }

    /// HTTP status of the terminal cause, if any.
    pub fn status(&self) -> Option<u16> {
        match self {
            ClientError::Status { status, .. } => Some(*status),
            ClientError::Exhausted { last, .. } => last.status(),
            _ => None,
        }
    }

    pub(crate) fn from_reqwest(e: reqwest::Error, timeout: Duration) -> Self {
        if e.is_builder() {
            ClientError::InvalidRequest(e.to_string())
        } else if e.is_timeout() {
            ClientError::Timeout(timeout)
        } else if e.is_connect() {
            ClientError::Connect(e.to_string())
        } else {
            ClientError::Transport(e.to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = ClientError::Exhausted {
            attempts: 2,
            last: Box::new(ClientError::Status {
                status: 503,
                body: String::new(),
            }),
        };
        assert_eq!(
            err.to_string(),
            "Retries exhausted after 2 attempts: Upstream returned status 503"
        );
        assert_eq!(err.status(), Some(503));
    }

    #[test]
    fn test_transient_classification() {
        assert!(ClientError::Timeout(Duration::from_secs(1)).is_transient());
        assert!(ClientError::Connect("refused".into()).is_transient());
        assert!(!ClientError::InvalidRequest("bad".into()).is_transient());
        assert!(!ClientError::Status { status: 503, body: String::new() }.is_transient());
    }

    #[test]
    fn test_response_helpers() {
        let mut headers = BTreeMap::new();
        headers.insert("etag".to_string(), "\"abc\"".to_string());
        let response = UpstreamResponse::from_bytes(200, headers, br#"{"ok":true}"#);
        assert_eq!(response.encoding, BodyEncoding::Text);
        assert_eq!(response.etag(), Some("\"abc\""));
        assert_eq!(response.header("ETag"), Some("\"abc\""));
        let value: serde_json::Value = response.json().unwrap();
        assert_eq!(value["ok"], true);
    }

    #[test]
    fn test_binary_body_is_lossless() {
        let raw = [0x89, b'P', b'N', b'G', 0xff, 0x00, 0xfe];
        let response = UpstreamResponse::from_bytes(200, BTreeMap::new(), &raw);
        assert_eq!(response.encoding, BodyEncoding::Base64);
        assert_eq!(response.bytes().unwrap(), raw);
        assert!(response.json::<serde_json::Value>().is_err());

        // Survives the cache's JSON value encoding.
        let value = serde_json::to_value(&response).unwrap();
        let restored: UpstreamResponse = serde_json::from_value(value).unwrap();
        assert_eq!(restored.bytes().unwrap(), raw);
    }

    #[test]
    fn test_entry_without_encoding_reads_as_text() {
        let restored: UpstreamResponse =
            serde_json::from_str(r#"{"status":200,"headers":{},"body":"hi"}"#).unwrap();
        assert_eq!(restored.encoding, BodyEncoding::Text);
        assert_eq!(restored.bytes().unwrap(), b"hi");
    }
}
