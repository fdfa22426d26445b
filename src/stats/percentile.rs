//! Order-statistic estimators.
//!
//! Percentiles use the R-6 estimator: rank `h = q * (n + 1)` (1-based), linear
//! interpolation between the order statistics at `floor(h)` and `ceil(h)`.
//! Ranks outside `[1, n]` clamp to the minimum or maximum sample, which is the
//! fallback when there are too few samples for the requested quantile.

/// R-6 quantile of an ascending-sorted slice, `q` in `[0, 1]`.
///
/// Returns `None` only for an empty slice.
pub fn quantile_sorted(sorted: &[f64], q: f64) -> Option<f64> {
    let n = sorted.len();
    if n == 0 {
        return None;
    }

    let h = q.clamp(0.0, 1.0) * (n as f64 + 1.0);
    if h <= 1.0 {
        return Some(sorted[0]);
    }
    if h >= n as f64 {
        return Some(sorted[n - 1]);
    }

    let lower = h.floor();
    let fraction = h - lower;
    let i = lower as usize - 1;
    Some(sorted[i] + fraction * (sorted[i + 1] - sorted[i]))
}

/// R-6 percentile (`p` in `[0, 100]`) of an ascending-sorted slice.
pub fn percentile_sorted(sorted: &[f64], p: f64) -> Option<f64> {
    quantile_sorted(sorted, p / 100.0)
}

/// Interquartile fences `(Q1 - 1.5 * IQR, Q3 + 1.5 * IQR)`.
pub fn iqr_fences(sorted: &[f64]) -> Option<(f64, f64)> {
    let q1 = quantile_sorted(sorted, 0.25)?;
    let q3 = quantile_sorted(sorted, 0.75)?;
    let iqr = q3 - q1;
    Some((q1 - 1.5 * iqr, q3 + 1.5 * iqr))
}

/// Samples lying strictly outside the IQR fences, in ascending order.
pub fn outliers_sorted(sorted: &[f64]) -> Vec<f64> {
    match iqr_fences(sorted) {
        Some((low, high)) => sorted
            .iter()
            .copied()
            .filter(|&v| v < low || v > high)
            .collect(),
        None => Vec::new(),
    }
}

/// Mean and sample standard deviation (n - 1 denominator, 0 for one sample).
pub fn mean_and_std_dev(samples: &[f64]) -> (f64, f64) {
    let n = samples.len();
    if n == 0 {
        return (0.0, 0.0);
    }
    let mean = samples.iter().sum::<f64>() / n as f64;
    if n == 1 {
        return (mean, 0.0);
    }
    let variance = samples.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / (n - 1) as f64;
    (mean, variance.sqrt())
}

/// Sort a sample set ascending. NaNs are ordered last.
pub fn sorted_copy(samples: &[f64]) -> Vec<f64> {
    let mut sorted = samples.to_vec();
    sorted.sort_by(|a, b| a.total_cmp(b));
    sorted
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_r6_median_of_five() {
        let sorted = [50.0, 80.0, 120.0, 300.0, 5200.0];
        assert_eq!(percentile_sorted(&sorted, 50.0), Some(120.0));
    }

    #[test]
    fn test_r6_interpolation() {
        // n = 4, q = 0.5 -> h = 2.5, halfway between 20 and 30.
        let sorted = [10.0, 20.0, 30.0, 40.0];
        assert_eq!(quantile_sorted(&sorted, 0.5), Some(25.0));
        // q = 0.25 -> h = 1.25
        assert_eq!(quantile_sorted(&sorted, 0.25), Some(12.5));
    }

    #[test]
    fn test_clamps_to_extremes() {
        let sorted = [50.0, 80.0, 120.0, 300.0, 5200.0];
        // h = 0.99 * 6 = 5.94 >= n
        assert_eq!(percentile_sorted(&sorted, 99.0), Some(5200.0));
        // h = 0.1 * 6 = 0.6 <= 1
        assert_eq!(percentile_sorted(&sorted, 10.0), Some(50.0));
    }

    #[test]
    fn test_single_and_empty() {
        assert_eq!(percentile_sorted(&[42.0], 50.0), Some(42.0));
        assert_eq!(percentile_sorted(&[42.0], 99.0), Some(42.0));
        assert_eq!(percentile_sorted(&[], 50.0), None);
    }

    #[test]
    fn test_monotonic_in_quantile() {
        let samples: Vec<f64> = (0..37).map(|i| ((i * 7919) % 101) as f64 * 3.3).collect();
        let sorted = sorted_copy(&samples);
        for n in 1..=sorted.len() {
            let prefix = sorted_copy(&samples[..n]);
            let mut previous = f64::MIN;
            for p in [50.0, 75.0, 90.0, 95.0, 99.0] {
                let value = percentile_sorted(&prefix, p).unwrap();
                assert!(value >= previous, "n={} p={} {} < {}", n, p, value, previous);
                previous = value;
            }
        }
    }

    #[test]
    fn test_outliers() {
        let sorted = sorted_copy(&[100.0, 102.0, 98.0, 101.0, 99.0, 100.0, 950.0]);
        assert_eq!(outliers_sorted(&sorted), vec![950.0]);
        assert!(outliers_sorted(&[]).is_empty());
        assert!(outliers_sorted(&[5.0, 5.0, 5.0]).is_empty());
    }

    #[test]
    fn test_mean_and_std_dev() {
        let (mean, std_dev) = mean_and_std_dev(&[2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0]);
        assert!((mean - 5.0).abs() < 1e-9);
        assert!((std_dev - 2.138_089_935).abs() < 1e-6);
        assert_eq!(mean_and_std_dev(&[3.0]), (3.0, 0.0));
        assert_eq!(mean_and_std_dev(&[]), (0.0, 0.0));
    }
}
