//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the access layer.
//! All types derive Serde traits for deserialization from config files.

use std::collections::HashMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Root configuration for the access layer.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct AccessConfig {
    /// Per-host connection pool limits.
    pub pool: PoolConfig,

    /// Retry and backoff policy.
    pub retries: RetryConfig,

    /// Timeout configuration.
    pub timeouts: TimeoutConfig,

    /// Response cache settings.
    pub cache: CacheConfig,

    /// Latency statistics settings.
    pub stats: StatsConfig,

    /// Outbound rate limiting.
    pub rate_limit: RateLimitConfig,

    /// Cache TTL per operation class.
    pub ttl_policy: TtlPolicyConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

/// Connection pool configuration, applied to every upstream host.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct PoolConfig {
    /// Maximum concurrent connections per host.
    pub max_connections: usize,

    /// Maximum idle connections kept per host.
    pub max_idle: usize,

    /// Idle connections are closed after this many seconds.
    pub idle_ttl_secs: u64,

    /// User-Agent sent with every upstream request.
    pub user_agent: String,

    /// Honor `HTTP_PROXY`/`HTTPS_PROXY` from the environment.
    pub system_proxy: bool,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_connections: 20,
            max_idle: 10,
            idle_ttl_secs: 90,
            user_agent: format!("access-layer/{}", env!("CARGO_PKG_VERSION")),
            system_proxy: true,
        }
    }
}

impl PoolConfig {
    pub fn idle_ttl(&self) -> Duration {
        Duration::from_secs(self.idle_ttl_secs)
    }
}

/// Retry configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Total attempts per request, including the first one.
    pub max_attempts: u32,

    /// Base delay for exponential backoff in milliseconds.
    pub base_delay_ms: u64,

    /// Maximum delay for exponential backoff in milliseconds.
    pub max_delay_ms: u64,

    /// Jitter applied to each delay, as a fraction (0.1 = ±10%).
    pub jitter_ratio: f64,

    /// HTTP status codes that are retried.
    pub retryable_statuses: Vec<u16>,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_ms: 500,
            max_delay_ms: 8000,
            jitter_ratio: 0.1,
            retryable_statuses: vec![429, 500, 502, 503, 504],
        }
    }
}

/// Timeout configuration for various operations.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Connection establishment timeout in seconds.
    pub connect_secs: u64,

    /// Per-attempt timeout (pool checkout, request and body) in seconds.
    pub request_secs: u64,

    /// Default end-to-end bound for one fetch, retries included, in seconds.
    pub fetch_secs: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            connect_secs: 5,
            request_secs: 30,
            fetch_secs: 120,
        }
    }
}

/// Response cache configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Persist entries to `directory`. When false the cache is memory-only.
    pub enabled: bool,

    /// Directory holding one file per entry.
    pub directory: String,

    /// Maximum number of entries before LRU eviction.
    pub max_entries: usize,

    /// Interval of the background expiration sweep in seconds (0 = disabled).
    pub sweep_interval_secs: u64,

    /// Serve an expired entry when the upstream fails terminally.
    pub serve_stale_on_failure: bool,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            directory: "cache".to_string(),
            max_entries: 1000,
            sweep_interval_secs: 300,
            serve_stale_on_failure: false,
        }
    }
}

/// Latency statistics configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct StatsConfig {
    /// Samples retained per operation (ring buffer capacity).
    pub window_size: usize,
}

impl Default for StatsConfig {
    fn default() -> Self {
        Self { window_size: 1000 }
    }
}

/// Outbound rate limiting configuration (sliding window per host).
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RateLimitConfig {
    /// Enable rate limiting.
    pub enabled: bool,

    /// Requests allowed per host within one window.
    pub max_requests: usize,

    /// Window length in seconds.
    pub window_secs: u64,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            max_requests: 60,
            window_secs: 60,
        }
    }
}

/// Cache TTL policy per operation class.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TtlPolicyConfig {
    /// TTL for operations without an explicit entry, in seconds.
    pub default_secs: u64,

    /// Operation name -> TTL in seconds.
    pub operations: HashMap<String, u64>,
}

impl Default for TtlPolicyConfig {
    fn default() -> Self {
        let mut operations = HashMap::new();
        // Volatile API checks expire quickly; repository analyses are expensive.
        operations.insert("api_test".to_string(), 300);
        operations.insert("github_analysis".to_string(), 3600);
        Self {
            default_secs: 300,
            operations,
        }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Log output format: "pretty" or "json".
    pub log_format: String,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: "pretty".to_string(),
            metrics_enabled: false,
            metrics_address: "127.0.0.1:9090".to_string(),
        }
    }
}
