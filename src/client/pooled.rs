//! Pooled HTTP client with bounded retry.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use reqwest::header::HeaderMap;
use url::Url;

use crate::client::limiter::RateLimiter;
use crate::client::outcome::{OutcomeSink, OutcomeStatus, RequestOutcome};
use crate::client::pool::{HostKey, HostPool, PoolManager, PoolSnapshot};
use crate::client::retry::{RetryPolicy, RetryState};
use crate::client::types::{ClientError, Execution, UpstreamRequest, UpstreamResponse};
use crate::config::AccessConfig;

/// Executes requests through per-host pools, retrying transient failures.
///
/// Worst-case latency of one `execute` is `max_attempts` times the per-attempt
/// timeout plus the sum of backoff delays. Pool checkout waits count against
/// the per-attempt timeout.
pub struct PooledClient {
    pools: PoolManager,
    policy: RetryPolicy,
    request_timeout: Duration,
    sink: Arc<dyn OutcomeSink>,
    limiter: Option<RateLimiter>,
}

impl PooledClient {
    pub fn new(
        pools: PoolManager,
        policy: RetryPolicy,
        request_timeout: Duration,
        sink: Arc<dyn OutcomeSink>,
    ) -> Self {
        Self {
            pools,
            policy,
            request_timeout,
            sink,
            limiter: None,
        }
    }

    /// Build a client from configuration, reporting outcomes to `sink`.
    pub fn from_config(config: &AccessConfig, sink: Arc<dyn OutcomeSink>) -> Self {
        let pools = PoolManager::new(
            config.pool.clone(),
            Duration::from_secs(config.timeouts.connect_secs),
        );
        let client = Self::new(
            pools,
            RetryPolicy::from_config(&config.retries),
            Duration::from_secs(config.timeouts.request_secs),
            sink,
        );
        if config.rate_limit.enabled {
            client.with_rate_limiter(RateLimiter::new(
                config.rate_limit.max_requests,
                Duration::from_secs(config.rate_limit.window_secs),
            ))
        } else {
            client
        }
    }

    pub fn with_rate_limiter(mut self, limiter: RateLimiter) -> Self {
        self.limiter = Some(limiter);
        self
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Execute a request. Never panics and never retries beyond the policy.
    pub async fn execute(&self, request: &UpstreamRequest) -> Execution {
        let started = Instant::now();
        let mut attempts = 0;
        let result = self.run(request, &mut attempts).await;
        Execution {
            result,
            elapsed: started.elapsed(),
            attempts,
        }
    }

    async fn run(&self, request: &UpstreamRequest, attempts: &mut u32) -> Result<UpstreamResponse, ClientError> {
        let url = Url::parse(&request.url)
            .map_err(|e| ClientError::InvalidRequest(format!("{}: {}", request.url, e)))?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(ClientError::InvalidRequest(format!(
                "unsupported scheme '{}'",
                url.scheme()
            )));
        }
        let key = HostKey::from_url(&url)?;

        if let Some(limiter) = &self.limiter {
            if !limiter.try_acquire(&key.to_string()) {
                return Err(ClientError::RateLimited { host: key.to_string() });
            }
        }

        let pool = self.pools.get_or_create(&key)?;
        let timeout = request.timeout.unwrap_or(self.request_timeout);
        let mut state = RetryState::start();

        loop {
            let attempt = state.attempt();
            *attempts = attempt;

            let started = Instant::now();
            let result = self.attempt(&pool, &url, request, timeout).await;
            let next = state.on_attempt(&self.policy, self.policy.verdict(&result));

            self.sink.record_outcome(&RequestOutcome {
                host: pool.label().to_string(),
                attempt,
                elapsed: started.elapsed(),
                status: outcome_status(&next),
                http_status: match &result {
                    Ok(response) => Some(response.status),
                    Err(e) => e.status(),
                },
            });

            let error = match result {
                Ok(response) => {
                    tracing::debug!(host = %pool.label(), attempt, status = response.status, "Upstream request succeeded");
                    return Ok(response);
                }
                Err(e) => e,
            };

            match next {
                RetryState::Backoff { delay, .. } => {
                    tracing::info!(
                        host = %pool.label(),
                        attempt,
                        delay = ?delay,
                        error = %error,
                        "Retrying upstream request"
                    );
                    tokio::time::sleep(delay).await;
                    state = next.on_backoff_elapsed();
                }
                RetryState::ExhaustedFailed { attempts } => {
                    tracing::warn!(host = %pool.label(), attempts, error = %error, "Upstream retries exhausted");
                    return Err(ClientError::Exhausted {
                        attempts,
                        last: Box::new(error),
                    });
                }
                _ => {
                    tracing::warn!(host = %pool.label(), attempt, error = %error, "Upstream request failed");
                    return Err(error);
                }
            }
        }
    }

    /// One attempt: checkout, send, read the body. The whole exchange is timed.
    async fn attempt(
        &self,
        pool: &Arc<HostPool>,
        url: &Url,
        request: &UpstreamRequest,
        timeout: Duration,
    ) -> Result<UpstreamResponse, ClientError> {
        let exchange = async {
            let _connection = pool.checkout().await?;

            let mut builder = pool.client().request(request.method.clone(), url.clone());
            for (name, value) in &request.headers {
                builder = builder.header(name.as_str(), value.as_str());
            }
            if let Some(body) = &request.body {
                builder = builder.body(body.clone());
            }

            let response = builder
                .send()
                .await
                .map_err(|e| ClientError::from_reqwest(e, timeout))?;
            let status = response.status().as_u16();
            let headers = collect_headers(response.headers());
            let raw = response
                .bytes()
                .await
                .map_err(|e| ClientError::from_reqwest(e, timeout))?;

            if (200..300).contains(&status) {
                Ok(UpstreamResponse::from_bytes(status, headers, &raw))
            } else {
                Err(ClientError::Status {
                    status,
                    body: String::from_utf8_lossy(&raw).into_owned(),
                })
            }
        };

        match tokio::time::timeout(timeout, exchange).await {
            Ok(result) => result,
            Err(_) => Err(ClientError::Timeout(timeout)),
        }
    }

    pub fn pool_snapshots(&self) -> Vec<PoolSnapshot> {
        self.pools.snapshots()
    }

    /// Close every pool. Returns the number of pools closed.
    pub fn shutdown(&self) -> usize {
        self.pools.close_all()
    }
}

fn outcome_status(next: &RetryState) -> OutcomeStatus {
    match next {
        RetryState::Succeeded { .. } => OutcomeStatus::Success,
        RetryState::Backoff { .. } => OutcomeStatus::Retried,
        RetryState::ExhaustedFailed { .. } => OutcomeStatus::RetriesExhausted,
        RetryState::Failed { .. } | RetryState::Attempting { .. } => OutcomeStatus::Failure,
    }
}

fn collect_headers(headers: &HeaderMap) -> BTreeMap<String, String> {
    let mut collected: BTreeMap<String, String> = BTreeMap::new();
    for (name, value) in headers {
        let value = String::from_utf8_lossy(value.as_bytes()).into_owned();
        collected
            .entry(name.as_str().to_string())
            .and_modify(|existing| {
                existing.push_str(", ");
                existing.push_str(&value);
            })
            .or_insert(value);
    }
    collected
}
