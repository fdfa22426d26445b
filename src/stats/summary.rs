//! Summary statistics over one operation's samples.

use serde::{Deserialize, Serialize};

use crate::stats::classify::{Grade, TierCounts};
use crate::stats::percentile::{mean_and_std_dev, outliers_sorted, percentile_sorted, sorted_copy};

/// Latency percentiles in milliseconds.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Percentiles {
    pub p50: f64,
    pub p75: f64,
    pub p90: f64,
    pub p95: f64,
    pub p99: f64,
}

impl Percentiles {
    fn from_sorted(sorted: &[f64]) -> Self {
        let at = |p| percentile_sorted(sorted, p).unwrap_or(0.0);
        Self {
            p50: at(50.0),
            p75: at(75.0),
            p90: at(90.0),
            p95: at(95.0),
            p99: at(99.0),
        }
    }
}

/// Summary of an operation's latency window plus its outcome counters.
///
/// All latency figures are milliseconds. An empty window yields zeros.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StatsSummary {
    pub operation: String,
    pub count: usize,
    pub mean: f64,
    pub std_dev: f64,
    pub min: f64,
    pub max: f64,
    pub percentiles: Percentiles,
    pub tiers: TierCounts,
    pub outliers: Vec<f64>,
    /// Requests answered from the cache (not part of the latency window).
    pub cache_hits: u64,
    /// Requests that reached the upstream and succeeded.
    pub completed: u64,
    /// Requests that ended in a terminal failure.
    pub failures: u64,
    /// 0-100 health score from success rate and mean latency.
    pub reliability_score: f64,
    /// Mean per-request grade weighted by success rate.
    pub overall_grade: Grade,
    /// Requests per second if the window's requests ran back to back.
    pub throughput_estimate: f64,
}

/// Lifetime counters attached to a summary.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct OutcomeCounts {
    pub cache_hits: u64,
    pub completed: u64,
    pub failures: u64,
}

impl StatsSummary {
    /// Compute a summary from a sample snapshot (any order).
    pub fn from_samples(operation: &str, samples: &[f64], counts: OutcomeCounts) -> Self {
        let sorted = sorted_copy(samples);
        let (mean, std_dev) = mean_and_std_dev(&sorted);

        Self {
            operation: operation.to_string(),
            count: sorted.len(),
            mean,
            std_dev,
            min: sorted.first().copied().unwrap_or(0.0),
            max: sorted.last().copied().unwrap_or(0.0),
            percentiles: Percentiles::from_sorted(&sorted),
            tiers: TierCounts::from_samples(&sorted),
            outliers: outliers_sorted(&sorted),
            cache_hits: counts.cache_hits,
            completed: counts.completed,
            failures: counts.failures,
            reliability_score: reliability_score(counts.completed, counts.failures, mean),
            overall_grade: overall_grade(&sorted, counts.completed, counts.failures),
            throughput_estimate: throughput_estimate(&sorted),
        }
    }

    /// Share of lookups answered from the cache.
    pub fn cache_hit_rate(&self) -> f64 {
        let total = self.cache_hits + self.completed + self.failures;
        if total == 0 {
            0.0
        } else {
            self.cache_hits as f64 / total as f64
        }
    }
}

/// Success rate minus a penalty of 10 points per second of mean latency above
/// 500 ms, clamped to `[0, 100]` and rounded to one decimal.
pub fn reliability_score(completed: u64, failures: u64, mean_ms: f64) -> f64 {
    let total = completed + failures;
    if total == 0 {
        return 0.0;
    }
    let success_rate = completed as f64 / total as f64;
    let time_penalty = ((mean_ms - 500.0) / 1000.0).max(0.0);
    let score = success_rate * 100.0 - time_penalty * 10.0;
    (score.clamp(0.0, 100.0) * 10.0).round() / 10.0
}

/// Average grade of the window's requests, each failure graded F, scaled by
/// the success rate. No requests at all grades F.
pub fn overall_grade(samples: &[f64], completed: u64, failures: u64) -> Grade {
    let total = completed + failures;
    if total == 0 {
        return Grade::F;
    }
    let graded = samples.len() as f64 + failures as f64;
    let points: f64 = samples.iter().map(|&ms| Grade::from_millis(ms).points()).sum::<f64>()
        + failures as f64 * Grade::F.points();
    let success_rate = completed as f64 / total as f64;
    Grade::from_points(points / graded * success_rate)
}

/// Sample count over total latency in seconds (floored at 0.1 s), rounded to
/// two decimals.
pub fn throughput_estimate(samples: &[f64]) -> f64 {
    if samples.is_empty() {
        return 0.0;
    }
    let busy_secs = (samples.iter().sum::<f64>() / 1000.0).max(0.1);
    (samples.len() as f64 / busy_secs * 100.0).round() / 100.0
}
