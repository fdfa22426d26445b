//! Latency classification tiers.

use serde::{Deserialize, Serialize};

/// Performance tier of a single latency sample.
///
/// Boundaries are inclusive-lower, exclusive-upper; `Critical` is unbounded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum PerformanceTier {
    Excellent,
    VeryGood,
    Good,
    Fair,
    Slow,
    VerySlow,
    Critical,
}

impl PerformanceTier {
    /// All tiers from fastest to slowest.
    pub const ALL: [PerformanceTier; 7] = [
        PerformanceTier::Excellent,
        PerformanceTier::VeryGood,
        PerformanceTier::Good,
        PerformanceTier::Fair,
        PerformanceTier::Slow,
        PerformanceTier::VerySlow,
        PerformanceTier::Critical,
    ];

    /// Upper bounds in milliseconds, aligned with `ALL` minus `Critical`.
    const UPPER_BOUNDS_MS: [f64; 6] = [100.0, 200.0, 500.0, 1000.0, 2000.0, 5000.0];

    /// Classify a latency in milliseconds.
    pub fn from_millis(ms: f64) -> Self {
        Self::UPPER_BOUNDS_MS
            .iter()
            .position(|&upper| ms < upper)
            .map(|i| Self::ALL[i])
            .unwrap_or(PerformanceTier::Critical)
    }

    pub fn label(&self) -> &'static str {
        match self {
            PerformanceTier::Excellent => "excellent",
            PerformanceTier::VeryGood => "very_good",
            PerformanceTier::Good => "good",
            PerformanceTier::Fair => "fair",
            PerformanceTier::Slow => "slow",
            PerformanceTier::VerySlow => "very_slow",
            PerformanceTier::Critical => "critical",
        }
    }

    fn index(&self) -> usize {
        *self as usize
    }
}

/// Letter grade of a request, or of an operation overall.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Grade {
    A,
    B,
    C,
    D,
    #[default]
    F,
}

impl Grade {
    /// Grade of one successful request by latency in milliseconds.
    pub fn from_millis(ms: f64) -> Self {
        match ms {
            ms if ms < 100.0 => Grade::A,
            ms if ms < 300.0 => Grade::B,
            ms if ms < 1000.0 => Grade::C,
            ms if ms < 3000.0 => Grade::D,
            _ => Grade::F,
        }
    }

    /// Points from 5 (A) down to 1 (F).
    pub fn points(&self) -> f64 {
        match self {
            Grade::A => 5.0,
            Grade::B => 4.0,
            Grade::C => 3.0,
            Grade::D => 2.0,
            Grade::F => 1.0,
        }
    }

    /// Grade for an averaged, possibly weighted, point score.
    pub fn from_points(points: f64) -> Self {
        match points {
            p if p >= 4.5 => Grade::A,
            p if p >= 3.5 => Grade::B,
            p if p >= 2.5 => Grade::C,
            p if p >= 1.5 => Grade::D,
            _ => Grade::F,
        }
    }
}

/// Number of samples per tier.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TierCounts {
    pub excellent: usize,
    pub very_good: usize,
    pub good: usize,
    pub fair: usize,
    pub slow: usize,
    pub very_slow: usize,
    pub critical: usize,
}

impl TierCounts {
    /// Count tiers over a sample set (milliseconds).
    pub fn from_samples(samples: &[f64]) -> Self {
        let mut counts = Self::default();
        for &ms in samples {
            counts.increment(PerformanceTier::from_millis(ms));
        }
        counts
    }

    pub fn increment(&mut self, tier: PerformanceTier) {
        *self.slot_mut(tier) += 1;
    }

    pub fn get(&self, tier: PerformanceTier) -> usize {
        self.as_array()[tier.index()]
    }

    pub fn total(&self) -> usize {
        self.as_array().iter().sum()
    }

    fn as_array(&self) -> [usize; 7] {
        [
            self.excellent,
            self.very_good,
            self.good,
            self.fair,
            self.slow,
            self.very_slow,
            self.critical,
        ]
    }

    fn slot_mut(&mut self, tier: PerformanceTier) -> &mut usize {
        match tier {
            PerformanceTier::Excellent => &mut self.excellent,
            PerformanceTier::VeryGood => &mut self.very_good,
            PerformanceTier::Good => &mut self.good,
            PerformanceTier::Fair => &mut self.fair,
            PerformanceTier::Slow => &mut self.slow,
            PerformanceTier::VerySlow => &mut self.very_slow,
            PerformanceTier::Critical => &mut self.critical,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_boundaries() {
        assert_eq!(PerformanceTier::from_millis(0.0), PerformanceTier::Excellent);
        assert_eq!(PerformanceTier::from_millis(99.9), PerformanceTier::Excellent);
        assert_eq!(PerformanceTier::from_millis(100.0), PerformanceTier::VeryGood);
        assert_eq!(PerformanceTier::from_millis(200.0), PerformanceTier::Good);
        assert_eq!(PerformanceTier::from_millis(500.0), PerformanceTier::Fair);
        assert_eq!(PerformanceTier::from_millis(1000.0), PerformanceTier::Slow);
        assert_eq!(PerformanceTier::from_millis(2000.0), PerformanceTier::VerySlow);
        assert_eq!(PerformanceTier::from_millis(4999.99), PerformanceTier::VerySlow);
        assert_eq!(PerformanceTier::from_millis(5000.0), PerformanceTier::Critical);
        assert_eq!(PerformanceTier::from_millis(60_000.0), PerformanceTier::Critical);
    }

    #[test]
    fn test_scenario_classification() {
        let tiers: Vec<_> = [50.0, 80.0, 120.0, 300.0, 5200.0]
            .iter()
            .map(|&ms| PerformanceTier::from_millis(ms))
            .collect();
        assert_eq!(
            tiers,
            vec![
                PerformanceTier::Excellent,
                PerformanceTier::Excellent,
                PerformanceTier::VeryGood,
                PerformanceTier::Good,
                PerformanceTier::Critical,
            ]
        );
    }

    #[test]
    fn test_tier_counts() {
        let counts = TierCounts::from_samples(&[50.0, 80.0, 120.0, 300.0, 5200.0]);
        assert_eq!(counts.get(PerformanceTier::Excellent), 2);
        assert_eq!(counts.get(PerformanceTier::VeryGood), 1);
        assert_eq!(counts.get(PerformanceTier::Good), 1);
        assert_eq!(counts.get(PerformanceTier::Critical), 1);
        assert_eq!(counts.get(PerformanceTier::Slow), 0);
        assert_eq!(counts.total(), 5);
    }

    #[test]
    fn test_grade_boundaries() {
        assert_eq!(Grade::from_millis(99.9), Grade::A);
        assert_eq!(Grade::from_millis(100.0), Grade::B);
        assert_eq!(Grade::from_millis(300.0), Grade::C);
        assert_eq!(Grade::from_millis(1000.0), Grade::D);
        assert_eq!(Grade::from_millis(3000.0), Grade::F);
        assert_eq!(Grade::from_points(4.5), Grade::A);
        assert_eq!(Grade::from_points(4.49), Grade::B);
        assert_eq!(Grade::from_points(1.5), Grade::D);
        assert_eq!(Grade::from_points(1.0), Grade::F);
    }
}
