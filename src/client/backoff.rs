//! Exponential backoff with jitter.

use rand::Rng;
use std::time::Duration;

/// Delay before the attempt following `attempt` (1-based).
///
/// `min(base * 2^(attempt-1), max)` adjusted by a random jitter of up to
/// `±jitter_ratio` of the capped delay.
pub fn calculate_backoff(attempt: u32, base_ms: u64, max_ms: u64, jitter_ratio: f64) -> Duration {
    if attempt == 0 {
        return Duration::from_millis(0);
    }

    let exponential_base = 2u64.saturating_pow(attempt - 1);
    let delay_ms = base_ms.saturating_mul(exponential_base);
    let capped_delay = delay_ms.min(max_ms);

    let ratio = jitter_ratio.clamp(0.0, 1.0);
    if ratio == 0.0 || capped_delay == 0 {
        return Duration::from_millis(capped_delay);
    }

    let capped = capped_delay as f64;
    let jitter = rand::thread_rng().gen_range(-ratio..=ratio) * capped;
    Duration::from_secs_f64((capped + jitter).max(0.0) / 1000.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backoff_calculation() {
        let b1 = calculate_backoff(1, 100, 2000, 0.0);
        assert_eq!(b1, Duration::from_millis(100));

        let b2 = calculate_backoff(2, 100, 2000, 0.0);
        assert_eq!(b2, Duration::from_millis(200));

        let max = calculate_backoff(10, 100, 1000, 0.0);
        assert_eq!(max, Duration::from_millis(1000));

        assert_eq!(calculate_backoff(0, 100, 1000, 0.1), Duration::ZERO);
    }

    #[test]
    fn test_jitter_stays_in_band() {
        for _ in 0..200 {
            let d = calculate_backoff(3, 100, 2000, 0.1).as_secs_f64() * 1000.0;
            assert!((359.9..=440.1).contains(&d), "delay {} outside ±10% of 400", d);
        }
    }

    #[test]
    fn test_jittered_delays_increase_below_cap() {
        for _ in 0..100 {
            let d1 = calculate_backoff(1, 100, 10_000, 0.1);
            let d2 = calculate_backoff(2, 100, 10_000, 0.1);
            let d3 = calculate_backoff(3, 100, 10_000, 0.1);
            assert!(d1 < d2 && d2 < d3);
        }
    }

    #[test]
    fn test_no_overflow() {
        let d = calculate_backoff(200, u64::MAX, 5000, 0.0);
        assert_eq!(d, Duration::from_millis(5000));
    }
}
