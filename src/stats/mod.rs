//! Latency statistics subsystem.
//!
//! # Data Flow
//! ```text
//! Coordinator, after each completed request:
//!     → engine.rs record(operation, elapsed)
//!     → samples.rs (bounded ring buffer per operation)
//!
//! Pooled client, after each attempt:
//!     → engine.rs record_outcome (per-host attempt counters)
//!
//! Report consumers:
//!     → engine.rs summarize(operation)
//!     → snapshot of the window
//!     → percentile.rs (R-6 percentiles, dispersion, IQR outliers)
//!     → classify.rs (performance tiers)
//!     → summary.rs (StatsSummary, reliability score, grade, throughput)
//! ```
//!
//! # Design Decisions
//! - Summaries are computed from an immutable snapshot, never the live buffer
//! - Too few samples for a quantile clamps to the min/max sample instead of failing
//! - Cache hits are counted separately and never enter the latency window

pub mod classify;
pub mod engine;
pub mod percentile;
pub mod samples;
pub mod summary;

pub use classify::{Grade, PerformanceTier, TierCounts};
pub use engine::{HostAttemptStats, StatsEngine};
pub use summary::{Percentiles, StatsSummary};
