//! Access coordinator subsystem.
//!
//! # Data Flow
//! ```text
//! FetchRequest
//!     → types.rs cache_key (method + normalized URL + body digest)
//!     → cache lookup ── fresh ──→ Fetched { source: Cache }
//!     → inflight.rs single-flight per key (followers take the leader's result)
//!     → PooledClient::execute
//!         ok  → cache write (policy.rs TTL) + latency sample → Fetched { Network }
//!         err → failure count → stale entry (optional) or AccessError
//! ```
//!
//! # Design Decisions
//! - The whole resolution runs under one end-to-end timeout
//! - Failures are never cached, but a failed flight is shared with its followers
//! - Cached values are full responses (status, headers, body)

pub mod access;
pub mod inflight;
pub mod policy;
pub mod types;

pub use access::AccessCoordinator;
pub use policy::TtlPolicy;
pub use types::{AccessError, FetchRequest, FetchSource, Fetched};
