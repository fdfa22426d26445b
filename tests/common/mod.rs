//! Shared utilities for integration tests.

#![allow(dead_code)]

use std::future::Future;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

use access_layer::config::AccessConfig;

/// Canned response from a mock backend.
#[derive(Debug, Clone)]
pub struct MockResponse {
    pub status: u16,
    pub body: Vec<u8>,
    pub etag: Option<String>,
    pub delay: Duration,
}

impl MockResponse {
    pub fn ok(body: impl Into<String>) -> Self {
        Self::status(200, body)
    }

    pub fn status(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            body: body.into().into_bytes(),
            etag: None,
            delay: Duration::ZERO,
        }
    }

    /// A 200 response with an arbitrary, possibly non-UTF-8, body.
    pub fn binary(body: &[u8]) -> Self {
        Self {
            body: body.to_vec(),
            ..Self::status(200, "")
        }
    }

    pub fn with_etag(mut self, etag: &str) -> Self {
        self.etag = Some(etag.to_string());
        self
    }

    pub fn delayed(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }
}

/// A running mock backend and the number of requests it has answered.
pub struct MockBackend {
    pub addr: SocketAddr,
    calls: Arc<AtomicU32>,
}

impl MockBackend {
    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

/// Start a backend that always returns `response`.
pub async fn start_mock_backend(response: MockResponse) -> MockBackend {
    start_programmable_backend(move |_| {
        let response = response.clone();
        async move { response }
    })
    .await
}

/// Start a backend whose response depends on the 0-based call index.
pub async fn start_programmable_backend<F, Fut>(f: F) -> MockBackend
where
    F: Fn(u32) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = MockResponse> + Send + 'static,
{
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let calls = Arc::new(AtomicU32::new(0));
    let f = Arc::new(f);

    let counter = calls.clone();
    tokio::spawn(async move {
        loop {
            match listener.accept().await {
                Ok((socket, _)) => {
                    let f = f.clone();
                    let counter = counter.clone();
                    tokio::spawn(async move {
                        serve_connection(socket, f, counter).await;
                    });
                }
                Err(_) => break,
            }
        }
    });

    MockBackend { addr, calls }
}

/// An address with nothing listening on it.
pub async fn closed_port() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    listener.local_addr().unwrap()
}

/// Config tuned for fast, hermetic tests.
pub fn test_config(cache_dir: &std::path::Path) -> AccessConfig {
    let mut config = AccessConfig::default();
    config.pool.system_proxy = false;
    config.pool.max_connections = 8;
    config.retries.base_delay_ms = 10;
    config.retries.max_delay_ms = 50;
    config.retries.jitter_ratio = 0.0;
    config.timeouts.connect_secs = 1;
    config.timeouts.request_secs = 2;
    config.timeouts.fetch_secs = 10;
    config.cache.directory = cache_dir.to_string_lossy().into_owned();
    config.cache.sweep_interval_secs = 0;
    config
}

async fn serve_connection<F, Fut>(mut socket: TcpStream, f: Arc<F>, counter: Arc<AtomicU32>)
where
    F: Fn(u32) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = MockResponse> + Send + 'static,
{
    if read_request(&mut socket).await.is_none() {
        return;
    }

    let call = counter.fetch_add(1, Ordering::SeqCst);
    let response = f(call).await;
    if !response.delay.is_zero() {
        tokio::time::sleep(response.delay).await;
    }

    let etag = response
        .etag
        .as_ref()
        .map(|e| format!("ETag: {}\r\n", e))
        .unwrap_or_default();
    let head = format!(
        "HTTP/1.1 {} {}\r\nContent-Type: application/json\r\n{}Content-Length: {}\r\nConnection: close\r\n\r\n",
        response.status,
        reason(response.status),
        etag,
        response.body.len(),
    );
    let mut raw = head.into_bytes();
    raw.extend_from_slice(&response.body);
    let _ = socket.write_all(&raw).await;
    let _ = socket.shutdown().await;
}

/// Read one request (head plus `Content-Length` body).
async fn read_request(socket: &mut TcpStream) -> Option<Vec<u8>> {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 4096];
    loop {
        let n = socket.read(&mut chunk).await.ok()?;
        if n == 0 {
            return None;
        }
        buf.extend_from_slice(&chunk[..n]);
        if let Some(end) = find_header_end(&buf) {
            let head = String::from_utf8_lossy(&buf[..end]).to_ascii_lowercase();
            let length = head
                .lines()
                .find_map(|line| line.strip_prefix("content-length:"))
                .and_then(|v| v.trim().parse::<usize>().ok())
                .unwrap_or(0);
            while buf.len() < end + 4 + length {
                let n = socket.read(&mut chunk).await.ok()?;
                if n == 0 {
                    break;
                }
                buf.extend_from_slice(&chunk[..n]);
            }
            return Some(buf);
        }
    }
}

fn find_header_end(buf: &[u8]) -> Option<usize> {
    buf.windows(4).position(|w| w == b"\r\n\r\n")
}

fn reason(status: u16) -> &'static str {
    match status {
        200 => "OK",
        404 => "Not Found",
        429 => "Too Many Requests",
        500 => "Internal Server Error",
        502 => "Bad Gateway",
        503 => "Service Unavailable",
        504 => "Gateway Timeout",
        _ => "Unknown",
    }
}
