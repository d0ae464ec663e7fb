//! Rolling failure sampling for the circuit breaker.

use smallvec::SmallVec;
use std::time::Duration;
use tokio::time::Instant;

const BUCKET_COUNT: u32 = 10;

/// Counts observed in the rolling window at one point in time.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HealthInfo {
    /// Samples currently in the window.
    pub throughput: u32,
    /// Failed samples currently in the window.
    pub failures: u32,
}

impl HealthInfo {
    /// Ratio of failures to samples, `0.0` for an empty window.
    pub fn failure_rate(&self) -> f64 {
        if self.throughput == 0 {
            return 0.0;
        }
        f64::from(self.failures) / f64::from(self.throughput)
    }

    /// Whether these counts should trip a closed circuit.
    pub fn should_trip(&self, failure_ratio: f64, minimum_throughput: u32) -> bool {
        self.throughput >= minimum_throughput && self.failure_rate() >= failure_ratio
    }
}

#[derive(Debug, Clone, Copy)]
struct Bucket {
    started_at: Instant,
    successes: u32,
    failures: u32,
}

/// A time window split into fixed buckets so old outcomes age out.
///
/// Not synchronized: the owning breaker serializes access.
#[derive(Debug)]
pub(crate) struct RollingWindow {
    buckets: SmallVec<[Bucket; 16]>,
    window_size: Duration,
    bucket_size: Duration,
}

impl RollingWindow {
    pub(crate) fn new(window_size: Duration) -> Self {
        let bucket_size = (window_size / BUCKET_COUNT).max(Duration::from_micros(1));
        Self {
            buckets: SmallVec::new(),
            window_size,
            bucket_size,
        }
    }

    pub(crate) fn record(&mut self, success: bool, now: Instant) {
        self.clean_old_buckets(now);

        let current = matches!(
            self.buckets.last(),
            Some(bucket) if now.duration_since(bucket.started_at) < self.bucket_size
        );
        if !current {
            self.buckets.push(Bucket {
                started_at: now,
                successes: 0,
                failures: 0,
            });
        }
        let Some(bucket) = self.buckets.last_mut() else {
            return;
        };

        if success {
            bucket.successes = bucket.successes.saturating_add(1);
        } else {
            bucket.failures = bucket.failures.saturating_add(1);
        }
    }

    pub(crate) fn health(&mut self, now: Instant) -> HealthInfo {
        self.clean_old_buckets(now);

        let mut successes = 0_u32;
        let mut failures = 0_u32;
        for bucket in &self.buckets {
            successes = successes.saturating_add(bucket.successes);
            failures = failures.saturating_add(bucket.failures);
        }

        HealthInfo {
            throughput: successes.saturating_add(failures),
            failures,
        }
    }

    pub(crate) fn reset(&mut self) {
        self.buckets.clear();
    }

    fn clean_old_buckets(&mut self, now: Instant) {
        let expired = self
            .buckets
            .iter()
            .take_while(|bucket| now.duration_since(bucket.started_at) >= self.window_size)
            .count();
        if expired > 0 {
            self.buckets.drain(..expired);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_window_is_healthy() {
        let mut window = RollingWindow::new(Duration::from_secs(1));
        let health = window.health(Instant::now());
        assert_eq!(health.throughput, 0);
        assert_eq!(health.failure_rate(), 0.0);
        assert!(!health.should_trip(0.5, 1));
    }

    #[test]
    fn counts_within_window() {
        let start = Instant::now();
        let mut window = RollingWindow::new(Duration::from_secs(1));

        window.record(true, start);
        window.record(false, start + Duration::from_millis(150));
        window.record(false, start + Duration::from_millis(300));

        let health = window.health(start + Duration::from_millis(400));
        assert_eq!(health.throughput, 3);
        assert_eq!(health.failures, 2);
        assert!(health.should_trip(0.5, 3));
        assert!(!health.should_trip(0.5, 4));
    }

    #[test]
    fn old_samples_age_out() {
        let start = Instant::now();
        let mut window = RollingWindow::new(Duration::from_secs(1));

        window.record(false, start);
        window.record(false, start + Duration::from_millis(100));
        window.record(true, start + Duration::from_millis(900));

        let health = window.health(start + Duration::from_millis(1050));
        assert_eq!(health.throughput, 1);
        assert_eq!(health.failures, 0);
    }

    #[test]
    fn reset_clears_everything() {
        let start = Instant::now();
        let mut window = RollingWindow::new(Duration::from_secs(1));
        window.record(false, start);
        window.reset();
        assert_eq!(window.health(start).throughput, 0);
    }
}
