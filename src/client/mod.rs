//! Pooled retry client subsystem.
//!
//! # Data Flow
//! ```text
//! UpstreamRequest
//!     → limiter.rs (optional per-host sliding window)
//!     → pool.rs (lazy per-host pool, bounded checkout)
//!     → pooled.rs attempt (send + read body under the attempt timeout)
//!     → retry.rs (verdict, state transition)
//!     → outcome.rs (one RequestOutcome per attempt to the sink)
//!     → backoff.rs (jittered delay) → next attempt, or terminal result
//! ```
//!
//! # Design Decisions
//! - Pools are per host identity (scheme + host + port), never global
//! - A connection slot is held for exactly one attempt, never across backoff
//! - Network errors and configured statuses retry; other 4xx fail immediately
//! - After the last attempt the error is final; callers decide any further retry

pub mod backoff;
pub mod limiter;
pub mod outcome;
pub mod pool;
pub mod pooled;
pub mod retry;
pub mod types;

pub use outcome::{OutcomeSink, OutcomeStatus, RequestOutcome};
pub use pool::{HostKey, PoolManager, PoolSnapshot};
pub use pooled::PooledClient;
pub use retry::{RetryPolicy, RetryState};
pub use types::{BodyEncoding, ClientError, Execution, UpstreamRequest, UpstreamResponse};
