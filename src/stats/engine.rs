//! Per-operation latency recording and summarization.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use dashmap::DashMap;
use serde::{Deserialize, Serialize};

use crate::client::outcome::{OutcomeSink, OutcomeStatus, RequestOutcome};
use crate::observability::metrics;
use crate::stats::samples::SampleWindow;
use crate::stats::summary::{OutcomeCounts, StatsSummary};

/// Samples and counters for one logical operation.
#[derive(Debug)]
struct OperationStats {
    window: Mutex<SampleWindow>,
    cache_hits: AtomicU64,
    completed: AtomicU64,
    failures: AtomicU64,
}

impl OperationStats {
    fn new(window_size: usize) -> Self {
        Self {
            window: Mutex::new(SampleWindow::new(window_size)),
            cache_hits: AtomicU64::new(0),
            completed: AtomicU64::new(0),
            failures: AtomicU64::new(0),
        }
    }

    fn counts(&self) -> OutcomeCounts {
        OutcomeCounts {
            cache_hits: self.cache_hits.load(Ordering::Relaxed),
            completed: self.completed.load(Ordering::Relaxed),
            failures: self.failures.load(Ordering::Relaxed),
        }
    }
}

/// Attempt counters for one upstream host.
#[derive(Debug, Default)]
struct HostCounters {
    attempts: AtomicU64,
    successes: AtomicU64,
    retried: AtomicU64,
    failures: AtomicU64,
    exhausted: AtomicU64,
}

/// Snapshot of a host's attempt counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HostAttemptStats {
    pub attempts: u64,
    pub successes: u64,
    pub retried: u64,
    pub failures: u64,
    pub exhausted: u64,
}

/// Thread-safe statistics engine.
///
/// Writers append to per-operation ring buffers; `summarize` copies the
/// buffer under its lock and computes outside it, so every figure in a
/// summary describes the same sample set.
#[derive(Debug)]
pub struct StatsEngine {
    operations: DashMap<String, Arc<OperationStats>>,
    hosts: DashMap<String, Arc<HostCounters>>,
    window_size: usize,
}

impl StatsEngine {
    pub fn new(window_size: usize) -> Self {
        Self {
            operations: DashMap::new(),
            hosts: DashMap::new(),
            window_size,
        }
    }

    fn operation(&self, name: &str) -> Arc<OperationStats> {
        if let Some(existing) = self.operations.get(name) {
            return existing.clone();
        }
        self.operations
            .entry(name.to_string())
            .or_insert_with(|| Arc::new(OperationStats::new(self.window_size)))
            .clone()
    }

    /// Record the elapsed time of a completed upstream request.
    pub fn record(&self, operation: &str, elapsed: Duration) {
        let stats = self.operation(operation);
        let ms = elapsed.as_secs_f64() * 1000.0;
        {
            let mut window = stats.window.lock().unwrap_or_else(|e| e.into_inner());
            window.push(ms);
        }
        stats.completed.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a request answered from the cache. Does not touch the latency window.
    pub fn record_cache_hit(&self, operation: &str) {
        self.operation(operation).cache_hits.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a request that ended in a terminal failure.
    pub fn record_failure(&self, operation: &str) {
        self.operation(operation).failures.fetch_add(1, Ordering::Relaxed);
    }

    /// Summarize an operation. Unknown operations yield an empty summary.
    pub fn summarize(&self, operation: &str) -> StatsSummary {
        let Some(stats) = self.operations.get(operation).map(|s| s.clone()) else {
            return StatsSummary::from_samples(operation, &[], OutcomeCounts::default());
        };

        let samples = {
            let window = stats.window.lock().unwrap_or_else(|e| e.into_inner());
            window.snapshot()
        };
        StatsSummary::from_samples(operation, &samples, stats.counts())
    }

    /// Names of all operations seen so far, sorted.
    pub fn operations(&self) -> Vec<String> {
        let mut names: Vec<String> = self.operations.iter().map(|e| e.key().clone()).collect();
        names.sort();
        names
    }

    /// Attempt counters for one host (`scheme://host:port`).
    pub fn host_stats(&self, host: &str) -> Option<HostAttemptStats> {
        self.hosts.get(host).map(|c| HostAttemptStats {
            attempts: c.attempts.load(Ordering::Relaxed),
            successes: c.successes.load(Ordering::Relaxed),
            retried: c.retried.load(Ordering::Relaxed),
            failures: c.failures.load(Ordering::Relaxed),
            exhausted: c.exhausted.load(Ordering::Relaxed),
        })
    }
}

impl Default for StatsEngine {
    fn default() -> Self {
        Self::new(1000)
    }
}

impl OutcomeSink for StatsEngine {
    fn record_outcome(&self, outcome: &RequestOutcome) {
        let counters = self
            .hosts
            .entry(outcome.host.clone())
            .or_default()
            .clone();

        counters.attempts.fetch_add(1, Ordering::Relaxed);
        let slot = match outcome.status {
            OutcomeStatus::Success => &counters.successes,
            OutcomeStatus::Retried => &counters.retried,
            OutcomeStatus::Failure => &counters.failures,
            OutcomeStatus::RetriesExhausted => &counters.exhausted,
        };
        slot.fetch_add(1, Ordering::Relaxed);

        metrics::record_attempt(&outcome.host, outcome.status.label(), outcome.elapsed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_and_summarize() {
        let engine = StatsEngine::new(100);
        for ms in [50, 80, 120, 300, 5200] {
            engine.record("api_test", Duration::from_millis(ms));
        }
        engine.record_cache_hit("api_test");
        engine.record_failure("api_test");

        let summary = engine.summarize("api_test");
        assert_eq!(summary.count, 5);
        assert_eq!(summary.percentiles.p50, 120.0);
        assert_eq!(summary.cache_hits, 1);
        assert_eq!(summary.completed, 5);
        assert_eq!(summary.failures, 1);
        assert_eq!(engine.operations(), vec!["api_test".to_string()]);
    }

    #[test]
    fn test_window_bounds_count() {
        let engine = StatsEngine::new(3);
        for ms in [10, 20, 30, 40] {
            engine.record("op", Duration::from_millis(ms));
        }
        let summary = engine.summarize("op");
        assert_eq!(summary.count, 3);
        assert_eq!(summary.min, 20.0);
        assert_eq!(summary.completed, 4);
    }

    #[test]
    fn test_unknown_operation() {
        let engine = StatsEngine::default();
        let summary = engine.summarize("never");
        assert_eq!(summary.count, 0);
        assert_eq!(summary.operation, "never");
    }

    #[test]
    fn test_host_outcomes() {
        let engine = StatsEngine::default();
        let host = "http://127.0.0.1:80";
        for (attempt, status) in [
            (1, OutcomeStatus::Retried),
            (2, OutcomeStatus::RetriesExhausted),
        ] {
            engine.record_outcome(&RequestOutcome {
                host: host.to_string(),
                attempt,
                elapsed: Duration::from_millis(5),
                status,
                http_status: Some(503),
            });
        }

        let stats = engine.host_stats(host).unwrap();
        assert_eq!(stats.attempts, 2);
        assert_eq!(stats.retried, 1);
        assert_eq!(stats.exhausted, 1);
        assert!(engine.host_stats("http://other:80").is_none());
    }

    #[test]
    fn test_concurrent_record_and_summarize() {
        let engine = Arc::new(StatsEngine::new(10_000));
        let writers: Vec<_> = (0..4)
            .map(|t| {
                let engine = engine.clone();
                std::thread::spawn(move || {
                    for i in 0..500u64 {
                        engine.record("op", Duration::from_millis(t * 100 + i % 100));
                    }
                })
            })
            .collect();

        for _ in 0..50 {
            let summary = engine.summarize("op");
            assert_eq!(summary.count, summary.tiers.total());
            let p = summary.percentiles;
            assert!(p.p50 <= p.p75 && p.p75 <= p.p90 && p.p90 <= p.p95 && p.p95 <= p.p99);
        }

        for w in writers {
            w.join().unwrap();
        }
        assert_eq!(engine.summarize("op").count, 2000);
    }
}
