//! Per-attempt request outcomes.

use std::time::Duration;

/// How a single attempt ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutcomeStatus {
    /// The attempt produced the final, successful response.
    Success,
    /// The attempt failed transiently and another attempt follows.
    Retried,
    /// The attempt failed with a non-retryable error.
    Failure,
    /// The last permitted attempt failed transiently.
    RetriesExhausted,
}

impl OutcomeStatus {
    pub fn label(&self) -> &'static str {
        match self {
            OutcomeStatus::Success => "success",
            OutcomeStatus::Retried => "retried",
            OutcomeStatus::Failure => "failure",
            OutcomeStatus::RetriesExhausted => "retries_exhausted",
        }
    }
}

/// Outcome of one attempt against an upstream host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestOutcome {
    /// Host identity, `scheme://host:port`.
    pub host: String,
    /// 1-based attempt number.
    pub attempt: u32,
    pub elapsed: Duration,
    pub status: OutcomeStatus,
    /// HTTP status code when a response was received.
    pub http_status: Option<u16>,
}

/// Consumer of attempt outcomes.
///
/// The pooled client calls this once per attempt, before it returns or sleeps
/// for the next attempt.
pub trait OutcomeSink: Send + Sync {
    fn record_outcome(&self, outcome: &RequestOutcome);
}
