//! Rolling success/failure/speed statistics for the sender's adaptive
//! chunk-size policy. Ported from the `NetworkMonitor` class in the
//! original prototype's upload loop.

use std::collections::VecDeque;

use parking_lot::Mutex;

use crate::store::{MAX_CHUNK_SIZE, MIN_CHUNK_SIZE};

const SPEED_WINDOW: usize = 10;
const ONE_MIB: f64 = 1024.0 * 1024.0;
const ONE_HUNDRED_KIB: f64 = 100.0 * 1024.0;

struct Inner {
    success_count: u64,
    failure_count: u64,
    recent_speeds: VecDeque<f64>,
}

pub struct NetworkMonitor {
    inner: Mutex<Inner>,
}

impl NetworkMonitor {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner {
                success_count: 0,
                failure_count: 0,
                recent_speeds: VecDeque::with_capacity(SPEED_WINDOW),
            }),
        }
    }

    /// Appends `bytes/duration` (0 if `duration <= 0`); drops the oldest
    /// sample once the window exceeds 10 entries.
    pub fn record_success(&self, bytes: u64, duration_secs: f64) {
        let speed = if duration_secs > 0.0 {
            bytes as f64 / duration_secs
        } else {
            0.0
        };
        let mut inner = self.inner.lock();
        inner.success_count += 1;
        inner.recent_speeds.push_back(speed);
        if inner.recent_speeds.len() > SPEED_WINDOW {
            inner.recent_speeds.pop_front();
        }
    }

    pub fn record_failure(&self) {
        self.inner.lock().failure_count += 1;
    }

    /// Arithmetic mean of the speed window, 0 if empty.
    pub fn avg_speed(&self) -> f64 {
        let inner = self.inner.lock();
        if inner.recent_speeds.is_empty() {
            0.0
        } else {
            inner.recent_speeds.iter().sum::<f64>() / inner.recent_speeds.len() as f64
        }
    }

    /// successes / (successes + failures), or 1.0 if there have been none.
    pub fn success_rate(&self) -> f64 {
        let inner = self.inner.lock();
        let total = inner.success_count + inner.failure_count;
        if total == 0 {
            1.0
        } else {
            inner.success_count as f64 / total as f64
        }
    }
}

impl Default for NetworkMonitor {
    fn default() -> Self {
        Self::new()
    }
}

/// Given current chunk size `current`, success rate `r`, and average speed
/// `v` (bytes/sec), returns the next chunk size per the adaptive policy:
/// grow toward the 10 MiB ceiling when the network is fast and reliable,
/// shrink toward the 64 KiB floor when it is slow or unreliable, otherwise
/// hold steady.
pub fn adaptive_chunk_size(current: u64, success_rate: f64, avg_speed: f64) -> u64 {
    if success_rate > 0.95 && avg_speed > ONE_MIB {
        ((current as f64 * 1.2) as u64).min(MAX_CHUNK_SIZE)
    } else if success_rate < 0.8 || avg_speed < ONE_HUNDRED_KIB {
        ((current as f64 * 0.7) as u64).max(MIN_CHUNK_SIZE)
    } else {
        current
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn success_rate_defaults_to_one_with_no_samples() {
        let monitor = NetworkMonitor::new();
        assert_eq!(monitor.success_rate(), 1.0);
        assert_eq!(monitor.avg_speed(), 0.0);
    }

    #[test]
    fn success_rate_reflects_recorded_outcomes() {
        let monitor = NetworkMonitor::new();
        monitor.record_success(1000, 1.0);
        monitor.record_success(1000, 1.0);
        monitor.record_failure();
        assert!((monitor.success_rate() - (2.0 / 3.0)).abs() < 1e-9);
    }

    #[test]
    fn speed_window_caps_at_ten_samples() {
        let monitor = NetworkMonitor::new();
        for i in 1..=15u64 {
            monitor.record_success(i * 100, 1.0);
        }
        // Only the last 10 (600..=1500 step 100) should remain.
        let expected: f64 = (6..=15).map(|i| (i * 100) as f64).sum::<f64>() / 10.0;
        assert!((monitor.avg_speed() - expected).abs() < 1e-6);
    }

    #[test]
    fn chunk_size_grows_under_fast_reliable_network() {
        let next = adaptive_chunk_size(1_000_000, 0.99, 2.0 * ONE_MIB);
        assert!(next > 1_000_000);
        assert!(next <= MAX_CHUNK_SIZE);
    }

    #[test]
    fn chunk_size_shrinks_under_unreliable_network() {
        let next = adaptive_chunk_size(1_000_000, 0.5, 2.0 * ONE_MIB);
        assert!(next < 1_000_000);
        assert!(next >= MIN_CHUNK_SIZE);
    }

    #[test]
    fn chunk_size_shrinks_under_slow_network() {
        let next = adaptive_chunk_size(1_000_000, 0.99, 10.0 * 1024.0);
        assert!(next < 1_000_000);
    }

    #[test]
    fn chunk_size_holds_steady_in_middle_regime() {
        let next = adaptive_chunk_size(1_000_000, 0.9, 500.0 * 1024.0);
        assert_eq!(next, 1_000_000);
    }

    #[test]
    fn chunk_size_respects_ceiling_and_floor() {
        let grown = adaptive_chunk_size(MAX_CHUNK_SIZE, 0.99, 5.0 * ONE_MIB);
        assert_eq!(grown, MAX_CHUNK_SIZE);
        let shrunk = adaptive_chunk_size(MIN_CHUNK_SIZE, 0.1, 1.0);
        assert_eq!(shrunk, MIN_CHUNK_SIZE);
    }
}
