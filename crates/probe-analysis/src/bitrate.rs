//! Sliding-window bitrate estimator (spec §4.C).

use std::collections::VecDeque;
use std::time::{Duration, Instant};

/// Default sliding window, in seconds.
pub const DEFAULT_WINDOW_SEC: u64 = 5;

/// A FIFO of `(sample_time, bytes)` pairs with a running byte sum, used to
/// derive a per-channel kbps estimate. Reports zero until the first sample.
#[derive(Debug, Clone)]
pub struct BitrateEstimator {
    window: Duration,
    samples: VecDeque<(Instant, u64)>,
    sum_bytes: u64,
}

impl BitrateEstimator {
    pub fn new(window_sec: u64) -> Self {
        Self {
            window: Duration::from_secs(window_sec.max(1)),
            samples: VecDeque::new(),
            sum_bytes: 0,
        }
    }

    /// Record `n` newly received bytes at `now`, evicting samples older
    /// than the window.
    pub fn update(&mut self, n: u64, now: Instant) {
        self.samples.push_back((now, n));
        self.sum_bytes += n;
        self.evict(now);
    }

    fn evict(&mut self, now: Instant) {
        while let Some(&(t, bytes)) = self.samples.front() {
            if now.duration_since(t) > self.window {
                self.samples.pop_front();
                self.sum_bytes = self.sum_bytes.saturating_sub(bytes);
            } else {
                break;
            }
        }
    }

    /// Current estimate in kbps. Zero until the first `update`.
    pub fn bitrate_kbps(&self) -> f64 {
        if self.samples.is_empty() {
            return 0.0;
        }
        let window_secs = self.window.as_secs_f64();
        (self.sum_bytes as f64 * 8.0) / (window_secs * 1000.0)
    }
}

impl Default for BitrateEstimator {
    fn default() -> Self {
        Self::new(DEFAULT_WINDOW_SEC)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_before_first_sample() {
        let estimator = BitrateEstimator::new(5);
        assert_eq!(estimator.bitrate_kbps(), 0.0);
    }

    #[test]
    fn accumulates_within_window() {
        let mut estimator = BitrateEstimator::new(5);
        let t0 = Instant::now();
        estimator.update(1000, t0);
        estimator.update(1000, t0 + Duration::from_secs(1));
        // 2000 bytes * 8 / (5 * 1000) = 3.2 kbps
        assert!((estimator.bitrate_kbps() - 3.2).abs() < 1e-9);
    }

    #[test]
    fn evicts_stale_samples() {
        let mut estimator = BitrateEstimator::new(5);
        let t0 = Instant::now();
        estimator.update(10_000, t0);
        estimator.update(1000, t0 + Duration::from_secs(10));
        // only the second sample should remain in the 5s window
        let kbps = estimator.bitrate_kbps();
        assert!((kbps - (1000.0 * 8.0 / 5000.0)).abs() < 1e-6);
    }
}
