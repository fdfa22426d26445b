//! Resilient access layer for upstream HTTP APIs.
//!
//! # Architecture Overview
//!
//! ```text
//!     caller
//!       │ FetchRequest
//!       ▼
//!  ┌──────────────────────────── coordinator ────────────────────────────┐
//!  │  cache key ─▶ cache (LRU + disk, TTL) ── hit ──────────────▶ Fetched │
//!  │                 │ miss                                              │
//!  │                 ▼                                                   │
//!  │          single-flight per key                                      │
//!  │                 │                                                   │
//!  │                 ▼                                                   │
//!  │  client: rate limit ─▶ host pool ─▶ attempt ─▶ retry/backoff ───────┼──▶ upstream
//!  │                 │ RequestOutcome                                    │
//!  │                 ▼                                                   │
//!  │  stats: latency windows, tiers, percentiles, reliability            │
//!  └─────────────────────────────────────────────────────────────────────┘
//!     config · observability (tracing, metrics) · lifecycle (shutdown)
//! ```

// Core subsystems
pub mod cache;
pub mod client;
pub mod coordinator;
pub mod stats;

// Cross-cutting concerns
pub mod config;
pub mod lifecycle;
pub mod observability;

pub use config::AccessConfig;
pub use coordinator::{AccessCoordinator, AccessError, FetchRequest, FetchSource, Fetched};
pub use lifecycle::Shutdown;
