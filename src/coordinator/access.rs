//! Access coordinator: cache lookup, single-flight, pooled dispatch and stats.

use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::de::DeserializeOwned;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;

use crate::cache::{CacheEntry, CacheStats, CacheStore, CacheSweeper, Lookup, SystemClock};
use crate::client::{ClientError, PoolSnapshot, PooledClient, UpstreamResponse};
use crate::config::AccessConfig;
use crate::coordinator::inflight::{Role, SingleFlight};
use crate::coordinator::policy::TtlPolicy;
use crate::coordinator::types::{AccessError, FetchRequest, FetchSource, Fetched};
use crate::observability::metrics;
use crate::stats::{StatsEngine, StatsSummary};

const DEFAULT_FETCH_TIMEOUT: Duration = Duration::from_secs(120);
const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(300);

/// Single entry point for resilient upstream reads.
///
/// Owns its pools, cache and statistics; share it behind an `Arc`.
pub struct AccessCoordinator {
    client: PooledClient,
    cache: Arc<CacheStore>,
    stats: Arc<StatsEngine>,
    ttl_policy: TtlPolicy,
    inflight: SingleFlight<Result<UpstreamResponse, ClientError>>,
    fetch_timeout: Duration,
    sweep_interval: Duration,
    serve_stale: bool,
}

impl AccessCoordinator {
    /// Assemble a coordinator from already-built parts.
    ///
    /// `client` should report its outcomes to `stats` for per-host counters.
    pub fn new(
        client: PooledClient,
        cache: Arc<CacheStore>,
        stats: Arc<StatsEngine>,
        ttl_policy: TtlPolicy,
    ) -> Self {
        Self {
            client,
            cache,
            stats,
            ttl_policy,
            inflight: SingleFlight::new(),
            fetch_timeout: DEFAULT_FETCH_TIMEOUT,
            sweep_interval: DEFAULT_SWEEP_INTERVAL,
            serve_stale: false,
        }
    }

    pub fn from_config(config: &AccessConfig) -> Self {
        let stats = Arc::new(StatsEngine::new(config.stats.window_size));
        let client = PooledClient::from_config(config, stats.clone());
        let cache = Arc::new(CacheStore::open(&config.cache, Arc::new(SystemClock)));

        Self::new(client, cache, stats, TtlPolicy::from_config(&config.ttl_policy))
            .with_fetch_timeout(Duration::from_secs(config.timeouts.fetch_secs))
            .with_sweep_interval(Duration::from_secs(config.cache.sweep_interval_secs))
            .with_stale_on_failure(config.cache.serve_stale_on_failure)
    }

    pub fn with_fetch_timeout(mut self, timeout: Duration) -> Self {
        self.fetch_timeout = timeout;
        self
    }

    pub fn with_sweep_interval(mut self, interval: Duration) -> Self {
        self.sweep_interval = interval;
        self
    }

    /// Serve an expired entry when the upstream fails. The cache must retain
    /// stale entries for this to find anything.
    pub fn with_stale_on_failure(mut self, enabled: bool) -> Self {
        self.serve_stale = enabled;
        self
    }

    /// Resolve `request` from the cache or the upstream.
    ///
    /// Bounded by the request's timeout (or the configured fetch timeout);
    /// on expiry the in-flight attempt is dropped and nothing is cached.
    pub async fn fetch(&self, request: FetchRequest) -> Result<Fetched, AccessError> {
        let started = Instant::now();
        let key = request.cache_key();
        let timeout = request.timeout.unwrap_or(self.fetch_timeout);

        let result = match tokio::time::timeout(timeout, self.resolve(&request, &key, started)).await {
            Ok(result) => result,
            Err(_) => {
                tracing::warn!(
                    operation = %request.operation,
                    url = %request.url,
                    timeout = ?timeout,
                    "Fetch timed out"
                );
                self.stats.record_failure(&request.operation);
                Err(AccessError::Timeout(timeout))
            }
        };

        let elapsed = started.elapsed();
        match &result {
            Ok(fetched) => metrics::record_request(&request.operation, fetched.source.label(), "ok", elapsed),
            Err(_) => metrics::record_request(&request.operation, "network", "error", elapsed),
        }
        result
    }

    /// Fetch and decode the body as JSON.
    pub async fn fetch_json<T: DeserializeOwned>(&self, request: FetchRequest) -> Result<T, AccessError> {
        self.fetch(request).await?.json()
    }

    async fn resolve(&self, request: &FetchRequest, key: &str, started: Instant) -> Result<Fetched, AccessError> {
        if let Lookup::Fresh(entry) = self.cache.lookup(key) {
            if let Some(fetched) = self.serve_entry(request, key, &entry, FetchSource::Cache, started) {
                return Ok(fetched);
            }
        }

        loop {
            let flight = match self.inflight.join(key) {
                Role::Leader(flight) => flight,
                Role::Follower(flight) => match flight.wait().await {
                    Some(result) => {
                        if result.is_ok() {
                            self.stats.record_cache_hit(&request.operation);
                        }
                        return self.settle(request, key, result, FetchSource::Cache, started);
                    }
                    // The leader was cancelled before it finished; try to lead.
                    None => continue,
                },
            };

            // A flight that closed after our lookup may have filled the entry.
            if let Some(entry) = self.cache.peek(key) {
                if let Some(fetched) = self.serve_entry(request, key, &entry, FetchSource::Cache, started) {
                    flight.complete(Ok(fetched.response.clone()));
                    return Ok(fetched);
                }
            }

            let execution = self.client.execute(&request.to_upstream()).await;
            if let Ok(response) = &execution.result {
                self.store(request, key, response);
                self.stats.record(&request.operation, execution.elapsed);
                tracing::debug!(
                    operation = %request.operation,
                    status = response.status,
                    attempts = execution.attempts,
                    elapsed = ?execution.elapsed,
                    "Fetched from upstream"
                );
            }
            flight.complete(execution.result.clone());

            let source = FetchSource::Network {
                attempts: execution.attempts,
            };
            return self.settle(request, key, execution.result, source, started);
        }
    }

    /// Turn a flight's result into this caller's answer, falling back to a
    /// stale entry on failure when enabled.
    fn settle(
        &self,
        request: &FetchRequest,
        key: &str,
        result: Result<UpstreamResponse, ClientError>,
        source: FetchSource,
        started: Instant,
    ) -> Result<Fetched, AccessError> {
        let error = match result {
            Ok(response) => {
                return Ok(Fetched {
                    response,
                    source,
                    elapsed: started.elapsed(),
                })
            }
            Err(error) => error,
        };
        self.stats.record_failure(&request.operation);

        if self.serve_stale {
            if let Some(entry) = self.cache.peek_stale(key) {
                if let Some(fetched) = self.serve_entry(request, key, &entry, FetchSource::Stale, started) {
                    tracing::warn!(
                        operation = %request.operation,
                        error = %error,
                        "Upstream failed, serving stale cache entry"
                    );
                    return Ok(fetched);
                }
            }
        }

        Err(AccessError::Upstream(error))
    }

    fn serve_entry(
        &self,
        request: &FetchRequest,
        key: &str,
        entry: &CacheEntry,
        source: FetchSource,
        started: Instant,
    ) -> Option<Fetched> {
        let response = match serde_json::from_value::<UpstreamResponse>(entry.value.clone()) {
            Ok(response) => response,
            Err(e) => {
                tracing::warn!(key = %key, error = %e, "Dropping undecodable cache entry");
                self.cache.invalidate(key);
                return None;
            }
        };
        if source == FetchSource::Cache {
            self.stats.record_cache_hit(&request.operation);
        }
        Some(Fetched {
            response,
            source,
            elapsed: started.elapsed(),
        })
    }

    fn store(&self, request: &FetchRequest, key: &str, response: &UpstreamResponse) {
        let ttl = request
            .ttl
            .unwrap_or_else(|| self.ttl_policy.ttl_for(&request.operation));
        if ttl.is_zero() {
            return;
        }
        match serde_json::to_value(response) {
            Ok(value) => {
                self.cache
                    .set_with_etag(key, value, ttl, response.etag().map(str::to_string))
            }
            Err(e) => tracing::warn!(key = %key, error = %e, "Failed to encode response for cache"),
        }
    }

    pub fn summarize(&self, operation: &str) -> StatsSummary {
        self.stats.summarize(operation)
    }

    pub fn operations(&self) -> Vec<String> {
        self.stats.operations()
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.cache.stats()
    }

    pub fn pool_snapshots(&self) -> Vec<PoolSnapshot> {
        self.client.pool_snapshots()
    }

    /// Drop the cached response for `request`. Returns whether one existed.
    pub fn invalidate(&self, request: &FetchRequest) -> bool {
        self.cache.invalidate(&request.cache_key())
    }

    /// Spawn the periodic cache sweep, stopped by `shutdown`.
    pub fn start_sweeper(&self, shutdown: broadcast::Receiver<()>) -> JoinHandle<()> {
        let sweeper = CacheSweeper::new(self.cache.clone(), self.sweep_interval);
        tokio::spawn(sweeper.run(shutdown))
    }

    /// Close every connection pool. Later fetches that miss the cache fail.
    pub fn shutdown(&self) -> usize {
        let closed = self.client.shutdown();
        tracing::info!(pools = closed, "Access coordinator shut down");
        closed
    }

    pub fn stats(&self) -> &Arc<StatsEngine> {
        &self.stats
    }

    pub fn cache(&self) -> &Arc<CacheStore> {
        &self.cache
    }

    pub fn client(&self) -> &PooledClient {
        &self.client
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::ManualClock;
    use crate::client::{PoolManager, RetryPolicy};
    use crate::config::PoolConfig;
    use serde_json::json;

    fn coordinator(cache: CacheStore) -> AccessCoordinator {
        let stats = Arc::new(StatsEngine::default());
        let client = PooledClient::new(
            PoolManager::new(PoolConfig::default(), Duration::from_millis(200)),
            RetryPolicy {
                max_attempts: 1,
                ..RetryPolicy::default()
            },
            Duration::from_millis(500),
            stats.clone(),
        );
        AccessCoordinator::new(client, Arc::new(cache), stats, TtlPolicy::default())
    }

    fn cached_response(body: &str) -> serde_json::Value {
        serde_json::to_value(UpstreamResponse::from_bytes(200, Default::default(), body.as_bytes())).unwrap()
    }

    #[tokio::test]
    async fn test_cache_hit_skips_network() {
        let access = coordinator(CacheStore::in_memory(10, Arc::new(ManualClock::new(0))));
        // Port 9 (discard) is never contacted on a hit.
        let request = FetchRequest::get("api_test", "http://127.0.0.1:9/data");
        access
            .cache()
            .set(&request.cache_key(), cached_response("{\"ok\":true}"), Duration::from_secs(60));

        let fetched = access.fetch(request).await.unwrap();
        assert_eq!(fetched.source, FetchSource::Cache);
        assert_eq!(fetched.json::<serde_json::Value>().unwrap(), json!({"ok": true}));

        let summary = access.summarize("api_test");
        assert_eq!(summary.cache_hits, 1);
        assert_eq!(summary.count, 0);
        assert!(access.pool_snapshots().is_empty());
    }

    #[tokio::test]
    async fn test_undecodable_entry_is_dropped() {
        let access = coordinator(CacheStore::in_memory(10, Arc::new(ManualClock::new(0))));
        access.shutdown();
        let request = FetchRequest::get("api_test", "http://127.0.0.1:9/data");
        access
            .cache()
            .set(&request.cache_key(), json!("not a response"), Duration::from_secs(60));

        let result = access.fetch(request).await;
        assert!(matches!(result, Err(AccessError::Upstream(_))));
        assert!(access.cache().is_empty());
        assert_eq!(access.summarize("api_test").failures, 1);
    }

    #[tokio::test]
    async fn test_stale_served_when_upstream_fails() {
        let clock = Arc::new(ManualClock::new(0));
        let cache = CacheStore::in_memory(10, clock.clone()).with_retain_stale(true);
        let access = coordinator(cache).with_stale_on_failure(true);
        access.shutdown();

        let request = FetchRequest::get("api_test", "http://127.0.0.1:9/data");
        access
            .cache()
            .set(&request.cache_key(), cached_response("old"), Duration::from_secs(1));
        clock.advance(5_000);

        let fetched = access.fetch(request).await.unwrap();
        assert_eq!(fetched.source, FetchSource::Stale);
        assert_eq!(fetched.response.body, "old");
        assert!(fetched.is_cached());
    }

    #[tokio::test]
    async fn test_invalidate() {
        let access = coordinator(CacheStore::in_memory(10, Arc::new(ManualClock::new(0))));
        let request = FetchRequest::get("api_test", "http://127.0.0.1:9/data");
        access
            .cache()
            .set(&request.cache_key(), cached_response("x"), Duration::from_secs(60));
        assert!(access.invalidate(&request));
        assert!(!access.invalidate(&request));
    }
}
