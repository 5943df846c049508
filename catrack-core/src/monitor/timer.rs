//! Stopwatch with call statistics.

use std::time::{Duration, Instant};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// A stopwatch accumulating the number of calls and the min/max/total duration.
#[derive(Debug, Clone, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Timer {
    total: Duration,
    min: Option<Duration>,
    max: Duration,
    n_calls: u64,
    #[cfg_attr(feature = "serde", serde(skip))]
    started: Option<Instant>,
}

impl Timer {
    /// Creates a stopped timer with no recorded calls.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts a call. Restarting a running timer discards the open call.
    #[inline]
    pub fn start(&mut self) {
        self.started = Some(Instant::now());
    }

    /// Stops the running call and records its duration.
    ///
    /// Stopping a timer that was never started is a no-op.
    #[inline]
    pub fn stop(&mut self) {
        if let Some(started) = self.started.take() {
            self.record(started.elapsed());
        }
    }

    /// Records one call of the given duration.
    pub fn record(&mut self, duration: Duration) {
        self.total += duration;
        self.min = Some(self.min.map_or(duration, |min| min.min(duration)));
        self.max = self.max.max(duration);
        self.n_calls += 1;
    }

    /// Merges the statistics of another timer.
    ///
    /// With `parallel = false` the totals are summed; with `parallel = true`
    /// the other timer ran concurrently with this one and the larger total is
    /// kept. Call counts always add up, min and max always combine.
    pub fn add_timer(&mut self, other: &Timer, parallel: bool) {
        if other.n_calls == 0 {
            return;
        }
        self.total = if parallel {
            self.total.max(other.total)
        } else {
            self.total + other.total
        };
        self.min = match (self.min, other.min) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        };
        self.max = self.max.max(other.max);
        self.n_calls += other.n_calls;
    }

    /// Clears all statistics and stops the timer.
    pub fn reset(&mut self) {
        *self = Self::default();
    }

    /// Returns true between `start` and `stop`.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.started.is_some()
    }

    /// Number of recorded calls.
    #[must_use]
    pub fn n_calls(&self) -> u64 {
        self.n_calls
    }

    /// Total recorded time.
    #[must_use]
    pub fn total(&self) -> Duration {
        self.total
    }

    /// Shortest call, zero if nothing was recorded.
    #[must_use]
    pub fn min(&self) -> Duration {
        self.min.unwrap_or_default()
    }

    /// Longest call.
    #[must_use]
    pub fn max(&self) -> Duration {
        self.max
    }

    /// Average call duration, zero if nothing was recorded.
    #[must_use]
    pub fn average(&self) -> Duration {
        match u32::try_from(self.n_calls) {
            Ok(0) => Duration::ZERO,
            Ok(n) => self.total / n,
            #[allow(clippy::cast_precision_loss)]
            Err(_) => Duration::from_secs_f64(self.total.as_secs_f64() / self.n_calls as f64),
        }
    }

    /// Total recorded time in milliseconds.
    #[must_use]
    pub fn total_ms(&self) -> f64 {
        self.total.as_secs_f64() * 1.0e3
    }
}
