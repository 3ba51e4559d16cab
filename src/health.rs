//! Sliding-window health tracking for external provider calls.
//!
//! Since there is only one LLM provider and one Places provider, an
//! unhealthy provider fails the call fast with [`HealthError`] instead of
//! spending a timeout on a call already known to be failing, rather than
//! skipping to a next tier. Backed by a fixed-capacity ring buffer of recent
//! outcomes.

use std::collections::VecDeque;
use std::sync::Mutex;

const MIN_SAMPLES: usize = 3;

#[derive(Debug, thiserror::Error)]
#[error("provider unhealthy: error rate over last {samples} calls exceeds threshold")]
pub struct HealthError {
    pub samples: usize,
}

pub struct HealthTracker {
    window: usize,
    error_threshold: f64,
    samples: Mutex<VecDeque<bool>>,
}

impl HealthTracker {
    pub fn new(window: usize, error_threshold: f64) -> Self {
        Self { window, error_threshold, samples: Mutex::new(VecDeque::with_capacity(window.max(1))) }
    }

    /// Record the outcome of a provider call. Best-effort: lock contention
    /// is vanishingly unlikely here (uncontended per-request path) but we
    /// never let recording block the response.
    pub fn record(&self, success: bool) {
        if self.window == 0 {
            return;
        }
        let Ok(mut samples) = self.samples.lock() else { return };
        if samples.len() == self.window {
            samples.pop_front();
        }
        samples.push_back(success);
    }

    /// `Err` when the provider's recent error rate exceeds the configured
    /// threshold. Always `Ok` until at least [`MIN_SAMPLES`] calls have been
    /// recorded, so a cold start never trips the breaker.
    pub fn check(&self) -> Result<(), HealthError> {
        if self.window == 0 {
            return Ok(());
        }
        let samples = self.samples.lock().unwrap_or_else(|e| e.into_inner());
        if samples.len() < MIN_SAMPLES {
            return Ok(());
        }
        let errors = samples.iter().filter(|ok| !**ok).count();
        if errors as f64 / samples.len() as f64 > self.error_threshold {
            Err(HealthError { samples: samples.len() })
        } else {
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cold_start_is_always_healthy() {
        let tracker = HealthTracker::new(10, 0.5);
        tracker.record(false);
        assert!(tracker.check().is_ok());
    }

    #[test]
    fn high_error_rate_trips_after_min_samples() {
        let tracker = HealthTracker::new(10, 0.5);
        for _ in 0..4 {
            tracker.record(false);
        }
        assert!(tracker.check().is_err());
    }

    #[test]
    fn window_zero_disables_tracking() {
        let tracker = HealthTracker::new(0, 0.1);
        for _ in 0..10 {
            tracker.record(false);
        }
        assert!(tracker.check().is_ok());
    }

    #[test]
    fn old_samples_fall_out_of_the_window() {
        let tracker = HealthTracker::new(4, 0.5);
        for _ in 0..4 {
            tracker.record(false);
        }
        assert!(tracker.check().is_err());
        for _ in 0..4 {
            tracker.record(true);
        }
        assert!(tracker.check().is_ok());
    }
}
