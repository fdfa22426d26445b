//! Outbound sliding-window rate limiter.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::time::{Duration, Instant};

/// Allows at most `max_requests` per identifier within any `window`.
#[derive(Debug)]
pub struct RateLimiter {
    requests: Mutex<HashMap<String, VecDeque<Instant>>>,
    max_requests: usize,
    window: Duration,
}

impl RateLimiter {
    pub fn new(max_requests: usize, window: Duration) -> Self {
        Self {
            requests: Mutex::new(HashMap::new()),
            max_requests,
            window,
        }
    }

    /// Record a request for `identifier` if it is under the limit.
    pub fn try_acquire(&self, identifier: &str) -> bool {
        self.try_acquire_at(identifier, Instant::now())
    }

    /// Requests still allowed for `identifier` in the current window.
    pub fn remaining(&self, identifier: &str) -> usize {
        self.remaining_at(identifier, Instant::now())
    }

    fn try_acquire_at(&self, identifier: &str, now: Instant) -> bool {
        let mut requests = self.requests.lock().unwrap_or_else(|e| e.into_inner());
        let times = requests.entry(identifier.to_string()).or_default();
        Self::prune(times, now, self.window);

        if times.len() < self.max_requests {
            times.push_back(now);
            true
        } else {
            tracing::warn!(identifier = %identifier, "Outbound rate limit exceeded");
            false
        }
    }

    fn remaining_at(&self, identifier: &str, now: Instant) -> usize {
        let mut requests = self.requests.lock().unwrap_or_else(|e| e.into_inner());
        match requests.get_mut(identifier) {
            Some(times) => {
                Self::prune(times, now, self.window);
                self.max_requests.saturating_sub(times.len())
            }
            None => self.max_requests,
        }
    }

    fn prune(times: &mut VecDeque<Instant>, now: Instant, window: Duration) {
        while let Some(&oldest) = times.front() {
            if now.duration_since(oldest) >= window {
                times.pop_front();
            } else {
                break;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_limit_and_remaining() {
        let limiter = RateLimiter::new(2, Duration::from_secs(60));
        assert_eq!(limiter.remaining("a"), 2);
        assert!(limiter.try_acquire("a"));
        assert!(limiter.try_acquire("a"));
        assert!(!limiter.try_acquire("a"));
        assert_eq!(limiter.remaining("a"), 0);
        // Identifiers are independent.
        assert!(limiter.try_acquire("b"));
    }

    #[test]
    fn test_window_slides() {
        let limiter = RateLimiter::new(1, Duration::from_secs(10));
        let start = Instant::now();
        assert!(limiter.try_acquire_at("a", start));
        assert!(!limiter.try_acquire_at("a", start + Duration::from_secs(9)));
        assert!(limiter.try_acquire_at("a", start + Duration::from_secs(10)));
        assert_eq!(limiter.remaining_at("a", start + Duration::from_secs(15)), 0);
        assert_eq!(limiter.remaining_at("a", start + Duration::from_secs(20)), 1);
    }
}
