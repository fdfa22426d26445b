//! Per-host connection pools.
//!
//! # Responsibilities
//! - Create one pool per upstream host identity, lazily
//! - Bound concurrent connections per host
//! - Keep idle connections for reuse and recycle them after the idle TTL
//! - Hand out RAII guards that release the slot on drop, including on cancellation

use std::collections::HashMap;
use std::fmt;
use std::ops::Deref;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, RwLock};
use std::time::Duration;

use reqwest::header::{HeaderMap, HeaderValue, ACCEPT};
use serde::Serialize;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use url::Url;

use crate::client::types::ClientError;
use crate::config::PoolConfig;
use crate::observability::metrics;

/// Upstream host identity: scheme, host and port.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct HostKey {
    pub scheme: String,
    pub host: String,
    pub port: u16,
}

impl HostKey {
    pub fn from_url(url: &Url) -> Result<Self, ClientError> {
        let host = url
            .host_str()
            .ok_or_else(|| ClientError::InvalidRequest(format!("URL has no host: {}", url)))?;
        let port = url
            .port_or_known_default()
            .ok_or_else(|| ClientError::InvalidRequest(format!("URL has no port: {}", url)))?;
        Ok(Self {
            scheme: url.scheme().to_string(),
            host: host.to_ascii_lowercase(),
            port,
        })
    }
}

impl fmt::Display for HostKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}://{}:{}", self.scheme, self.host, self.port)
    }
}

/// Connection pool for a single upstream host.
#[derive(Debug)]
pub struct HostPool {
    key: HostKey,
    label: String,
    client: reqwest::Client,
    permits: Arc<Semaphore>,
    max_connections: usize,
    in_use: AtomicUsize,
}

impl HostPool {
    fn new(key: HostKey, config: &PoolConfig, connect_timeout: Duration) -> Result<Self, ClientError> {
        let mut default_headers = HeaderMap::new();
        default_headers.insert(
            ACCEPT,
            HeaderValue::from_static("application/json, text/plain, */*"),
        );

        let mut builder = reqwest::Client::builder()
            .pool_max_idle_per_host(config.max_idle)
            .pool_idle_timeout(config.idle_ttl())
            .connect_timeout(connect_timeout)
            .user_agent(config.user_agent.clone())
            .default_headers(default_headers);
        if !config.system_proxy {
            builder = builder.no_proxy();
        }
        let client = builder
            .build()
            .map_err(|e| ClientError::Build(e.to_string()))?;

        let max_connections = config.max_connections.max(1);
        Ok(Self {
            label: key.to_string(),
            key,
            client,
            permits: Arc::new(Semaphore::new(max_connections)),
            max_connections,
            in_use: AtomicUsize::new(0),
        })
    }

    pub fn key(&self) -> &HostKey {
        &self.key
    }

    /// `scheme://host:port`.
    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn client(&self) -> &reqwest::Client {
        &self.client
    }

    pub fn max_connections(&self) -> usize {
        self.max_connections
    }

    /// Connections currently checked out.
    pub fn in_use(&self) -> usize {
        self.in_use.load(Ordering::Relaxed)
    }

    /// Wait for a free connection slot.
    pub async fn checkout(self: &Arc<Self>) -> Result<ConnectionGuard, ClientError> {
        let permit = self
            .permits
            .clone()
            .acquire_owned()
            .await
            .map_err(|_| ClientError::PoolClosed)?;
        let in_use = self.in_use.fetch_add(1, Ordering::Relaxed) + 1;
        metrics::record_pool_in_use(&self.label, in_use);
        Ok(ConnectionGuard {
            pool: self.clone(),
            _permit: permit,
        })
    }

    /// Take a free slot without waiting.
    pub fn try_checkout(self: &Arc<Self>) -> Option<ConnectionGuard> {
        let permit = self.permits.clone().try_acquire_owned().ok()?;
        let in_use = self.in_use.fetch_add(1, Ordering::Relaxed) + 1;
        metrics::record_pool_in_use(&self.label, in_use);
        Some(ConnectionGuard {
            pool: self.clone(),
            _permit: permit,
        })
    }

    fn close(&self) {
        self.permits.close();
    }
}

/// A checked-out connection slot. Dropping it returns the slot to the pool.
#[derive(Debug)]
pub struct ConnectionGuard {
    pool: Arc<HostPool>,
    _permit: OwnedSemaphorePermit,
}

impl Deref for ConnectionGuard {
    type Target = HostPool;
    fn deref(&self) -> &Self::Target {
        &self.pool
    }
}

impl Drop for ConnectionGuard {
    fn drop(&mut self) {
        let in_use = self.pool.in_use.fetch_sub(1, Ordering::Relaxed).saturating_sub(1);
        metrics::record_pool_in_use(&self.pool.label, in_use);
    }
}

/// Point-in-time view of one pool.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PoolSnapshot {
    pub host: String,
    pub in_use: usize,
    pub max_connections: usize,
}

/// Owns every host pool of a client.
#[derive(Debug)]
pub struct PoolManager {
    pools: RwLock<HashMap<HostKey, Arc<HostPool>>>,
    config: PoolConfig,
    connect_timeout: Duration,
    closed: AtomicBool,
}

impl PoolManager {
    pub fn new(config: PoolConfig, connect_timeout: Duration) -> Self {
        Self {
            pools: RwLock::new(HashMap::new()),
            config,
            connect_timeout,
            closed: AtomicBool::new(false),
        }
    }

    /// Get the pool for `key`, creating it on first use.
    pub fn get_or_create(&self, key: &HostKey) -> Result<Arc<HostPool>, ClientError> {
        if self.closed.load(Ordering::Acquire) {
            return Err(ClientError::PoolClosed);
        }

        if let Some(pool) = self.read_pools().get(key) {
            return Ok(pool.clone());
        }

        let mut pools = self.pools.write().unwrap_or_else(|e| e.into_inner());
        if let Some(pool) = pools.get(key) {
            return Ok(pool.clone());
        }

        let pool = Arc::new(HostPool::new(key.clone(), &self.config, self.connect_timeout)?);
        tracing::info!(
            host = %key,
            max_connections = self.config.max_connections,
            max_idle = self.config.max_idle,
            idle_ttl_secs = self.config.idle_ttl_secs,
            "Created connection pool"
        );
        pools.insert(key.clone(), pool.clone());
        Ok(pool)
    }

    /// Close every pool. Idle connections are dropped and waiting checkouts fail.
    /// Returns the number of pools closed.
    pub fn close_all(&self) -> usize {
        self.closed.store(true, Ordering::Release);
        let mut pools = self.pools.write().unwrap_or_else(|e| e.into_inner());
        for (key, pool) in pools.iter() {
            pool.close();
            tracing::info!(host = %key, "Closed connection pool");
        }
        let count = pools.len();
        pools.clear();
        count
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    pub fn len(&self) -> usize {
        self.read_pools().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Snapshots sorted by host.
    pub fn snapshots(&self) -> Vec<PoolSnapshot> {
        let mut snapshots: Vec<PoolSnapshot> = self
            .read_pools()
            .values()
            .map(|pool| PoolSnapshot {
                host: pool.label().to_string(),
                in_use: pool.in_use(),
                max_connections: pool.max_connections(),
            })
            .collect();
        snapshots.sort_by(|a, b| a.host.cmp(&b.host));
        snapshots
    }

    fn read_pools(&self) -> std::sync::RwLockReadGuard<'_, HashMap<HostKey, Arc<HostPool>>> {
        self.pools.read().unwrap_or_else(|e| e.into_inner())
    }
}
