//! Retry policy and attempt state machine.
//!
//! # State Transitions
//! ```text
//! Attempting(n) → Succeeded        attempt returned a usable response
//! Attempting(n) → Failed           non-retryable error
//! Attempting(n) → Backoff(n)       transient error, n < max_attempts
//! Attempting(n) → ExhaustedFailed  transient error, n == max_attempts
//! Backoff(n)    → Attempting(n+1)  after the delay elapses
//! ```
//!
//! Every state is a suspension-safe point: dropping the driving future in
//! `Backoff` or `Attempting` leaves nothing to clean up beyond RAII guards.

use std::collections::BTreeSet;
use std::time::Duration;

use crate::client::backoff::calculate_backoff;
use crate::client::types::{ClientError, UpstreamResponse};
use crate::config::RetryConfig;

/// How an attempt's result should be treated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Success,
    Retryable,
    Fatal,
}

/// Retry policy shared by every pool of a client.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
    pub jitter_ratio: f64,
    pub retryable_statuses: BTreeSet<u16>,
}

impl RetryPolicy {
    pub fn from_config(config: &RetryConfig) -> Self {
        Self {
            max_attempts: config.max_attempts.max(1),
            base_delay_ms: config.base_delay_ms,
            max_delay_ms: config.max_delay_ms,
            jitter_ratio: config.jitter_ratio,
            retryable_statuses: config.retryable_statuses.iter().copied().collect(),
        }
    }

    pub fn is_retryable_status(&self, status: u16) -> bool {
        self.retryable_statuses.contains(&status)
    }

    /// Classify the result of one attempt.
    pub fn verdict(&self, result: &Result<UpstreamResponse, ClientError>) -> Verdict {
        match result {
            Ok(_) => Verdict::Success,
            Err(ClientError::Status { status, .. }) if self.is_retryable_status(*status) => {
                Verdict::Retryable
            }
            Err(e) if e.is_transient() => Verdict::Retryable,
            Err(_) => Verdict::Fatal,
        }
    }

    /// Jittered delay after a failed `attempt`.
    pub fn backoff(&self, attempt: u32) -> Duration {
        calculate_backoff(attempt, self.base_delay_ms, self.max_delay_ms, self.jitter_ratio)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_config(&RetryConfig::default())
    }
}

/// State of one request's retry loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryState {
    Attempting { attempt: u32 },
    Backoff { attempt: u32, delay: Duration },
    Succeeded { attempts: u32 },
    Failed { attempts: u32 },
    ExhaustedFailed { attempts: u32 },
}

impl RetryState {
    pub fn start() -> Self {
        RetryState::Attempting { attempt: 1 }
    }

    /// Transition after an attempt finished with `verdict`.
    ///
    /// Only meaningful from `Attempting`; other states are returned unchanged.
    pub fn on_attempt(self, policy: &RetryPolicy, verdict: Verdict) -> Self {
        let RetryState::Attempting { attempt } = self else {
            return self;
        };
        match verdict {
            Verdict::Success => RetryState::Succeeded { attempts: attempt },
            Verdict::Fatal => RetryState::Failed { attempts: attempt },
            Verdict::Retryable if attempt < policy.max_attempts => RetryState::Backoff {
                attempt,
                delay: policy.backoff(attempt),
            },
            Verdict::Retryable => RetryState::ExhaustedFailed { attempts: attempt },
        }
    }

    /// Transition once the backoff delay has elapsed.
    pub fn on_backoff_elapsed(self) -> Self {
        match self {
            RetryState::Backoff { attempt, .. } => RetryState::Attempting { attempt: attempt + 1 },
            other => other,
        }
    }

    /// Current attempt number, or attempts made for terminal states.
    pub fn attempt(&self) -> u32 {
        match *self {
            RetryState::Attempting { attempt } | RetryState::Backoff { attempt, .. } => attempt,
            RetryState::Succeeded { attempts }
            | RetryState::Failed { attempts }
            | RetryState::ExhaustedFailed { attempts } => attempts,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            RetryState::Succeeded { .. } | RetryState::Failed { .. } | RetryState::ExhaustedFailed { .. }
        )
    }
}
