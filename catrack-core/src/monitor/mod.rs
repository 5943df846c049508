//! Named counters and timers for the tracking pipeline.
//!
//! Every worker owns a [`TrackingMonitorData`]; after the workers are joined
//! the orchestrator reduces them into its own instance, and a long-lived
//! [`TrackingMonitor`] accumulates one instance per timeslice call.
//!
//! Keys are plain enums implementing [`MonitorKey`]. Storage indices and
//! display names come from the key itself, never from declaration order.

mod data;
mod timer;

pub use data::MonitorData;
pub use timer::Timer;

use std::fmt;
use std::fmt::Debug;

/// A key addressing one counter or timer.
pub trait MonitorKey: Copy + Eq + Debug + Send + Sync + 'static {
    /// All keys, in display order.
    const ALL: &'static [Self];

    /// Dense storage index in `0..ALL.len()`.
    fn index(self) -> usize;

    /// Human-readable name.
    fn name(self) -> &'static str;
}

/// Counters of the track finder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CounterKey {
    /// Calls of the track finder.
    TrackingCall,
    /// Input hits.
    RecoHit,
    /// Reconstructed tracks.
    RecoTrack,
    /// Hits used in reconstructed tracks.
    RecoHitUsed,
    /// Processed sub-timeslices.
    SubTimeslice,
    /// Hits rejected for an unphysical time.
    BogusHit,
    /// Tracks dropped at merge because an earlier worker claimed their hits.
    MergeConflict,
}

impl MonitorKey for CounterKey {
    const ALL: &'static [Self] = &[
        Self::TrackingCall,
        Self::RecoHit,
        Self::RecoTrack,
        Self::RecoHitUsed,
        Self::SubTimeslice,
        Self::BogusHit,
        Self::MergeConflict,
    ];

    fn index(self) -> usize {
        match self {
            Self::TrackingCall => 0,
            Self::RecoHit => 1,
            Self::RecoTrack => 2,
            Self::RecoHitUsed => 3,
            Self::SubTimeslice => 4,
            Self::BogusHit => 5,
            Self::MergeConflict => 6,
        }
    }

    fn name(self) -> &'static str {
        match self {
            Self::TrackingCall => "full routine calls",
            Self::RecoHit => "reco hits",
            Self::RecoTrack => "reco tracks",
            Self::RecoHitUsed => "used reco hits",
            Self::SubTimeslice => "sub-timeslices",
            Self::BogusHit => "bogus hits",
            Self::MergeConflict => "merge conflicts",
        }
    }
}

/// Timers of the track finder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TimerKey {
    /// Whole track finder call.
    Tracking,
    /// Time gating and partitioning.
    PrepareTimeslice,
    /// One worker, start to finish.
    TrackingThread,
    /// Worker set-up before the first sub-window.
    PrepareThread,
    /// Hit selection of one sub-window.
    PrepareWindow,
    /// Kernel call on one sub-window.
    TrackingWindow,
    /// Classification and storage of one sub-window's tracks.
    StoreTracksWindow,
    /// Final merge of worker outputs.
    StoreTracksFinal,
}

impl MonitorKey for TimerKey {
    const ALL: &'static [Self] = &[
        Self::Tracking,
        Self::PrepareTimeslice,
        Self::TrackingThread,
        Self::PrepareThread,
        Self::PrepareWindow,
        Self::TrackingWindow,
        Self::StoreTracksWindow,
        Self::StoreTracksFinal,
    ];

    fn index(self) -> usize {
        match self {
            Self::Tracking => 0,
            Self::PrepareTimeslice => 1,
            Self::TrackingThread => 2,
            Self::PrepareThread => 3,
            Self::PrepareWindow => 4,
            Self::TrackingWindow => 5,
            Self::StoreTracksWindow => 6,
            Self::StoreTracksFinal => 7,
        }
    }

    fn name(self) -> &'static str {
        match self {
            Self::Tracking => "tracking",
            Self::PrepareTimeslice => "prepare timeslice",
            Self::TrackingThread => "tracking in thread",
            Self::PrepareThread => "prepare thread",
            Self::PrepareWindow => "prepare window",
            Self::TrackingWindow => "tracking in window",
            Self::StoreTracksWindow => "store tracks in window",
            Self::StoreTracksFinal => "store tracks final",
        }
    }
}

/// Monitor data of the track finder.
pub type TrackingMonitorData = MonitorData<CounterKey, TimerKey>;

/// Accumulating monitor of the track finder.
pub type TrackingMonitor = Monitor<CounterKey, TimerKey>;

/// A named, accumulating monitor with a printable summary.
#[derive(Debug, Clone)]
pub struct Monitor<C: MonitorKey, T: MonitorKey> {
    name: String,
    data: MonitorData<C, T>,
    ratio_keys: Vec<C>,
}

impl<C: MonitorKey, T: MonitorKey> Monitor<C, T> {
    /// Creates an empty monitor.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            data: MonitorData::new(),
            ratio_keys: Vec::new(),
        }
    }

    /// Counters by which the other counters are averaged in the summary.
    #[must_use]
    pub fn with_ratio_keys(mut self, keys: Vec<C>) -> Self {
        self.ratio_keys = keys;
        self
    }

    /// Monitor name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Accumulated data.
    #[must_use]
    pub fn data(&self) -> &MonitorData<C, T> {
        &self.data
    }

    /// Adds the data of one sequential call.
    pub fn add_monitor_data(&mut self, data: &MonitorData<C, T>) {
        self.data.add_monitor_data(data, false);
    }

    /// Value of a counter.
    #[must_use]
    pub fn counter_value(&self, key: C) -> u64 {
        self.data.counter_value(key)
    }

    /// Returns a timer.
    #[must_use]
    pub fn timer(&self, key: T) -> &Timer {
        self.data.timer(key)
    }

    /// Clears the accumulated data.
    pub fn reset(&mut self) {
        self.data.reset();
    }
}

impl<C: MonitorKey, T: MonitorKey> fmt::Display for Monitor<C, T> {
    #[allow(clippy::cast_precision_loss)]
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "---- Monitor: {} ----", self.name)?;

        write!(f, "{:<28} {:>14}", "counter", "total")?;
        for key in &self.ratio_keys {
            write!(f, " {:>18}", format!("per {}", key.name()))?;
        }
        writeln!(f)?;
        for (key, value) in self.data.counters() {
            write!(f, "{:<28} {:>14}", key.name(), value)?;
            for &ratio_key in &self.ratio_keys {
                let denominator = self.data.counter_value(ratio_key);
                if denominator == 0 {
                    write!(f, " {:>18}", "-")?;
                } else {
                    write!(f, " {:>18.3}", value as f64 / denominator as f64)?;
                }
            }
            writeln!(f)?;
        }

        writeln!(
            f,
            "{:<28} {:>8} {:>12} {:>10} {:>10} {:>10}",
            "timer", "calls", "total [ms]", "min [ms]", "max [ms]", "avg [ms]"
        )?;
        for (key, timer) in self.data.timers() {
            writeln!(
                f,
                "{:<28} {:>8} {:>12.3} {:>10.3} {:>10.3} {:>10.3}",
                key.name(),
                timer.n_calls(),
                timer.total_ms(),
                timer.min().as_secs_f64() * 1.0e3,
                timer.max().as_secs_f64() * 1.0e3,
                timer.average().as_secs_f64() * 1.0e3
            )?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_key_indices_are_dense() {
        for (i, key) in CounterKey::ALL.iter().enumerate() {
            assert_eq!(key.index(), i, "{key:?}");
        }
        for (i, key) in TimerKey::ALL.iter().enumerate() {
            assert_eq!(key.index(), i, "{key:?}");
        }
    }

    #[test]
    fn test_monitor_accumulates_calls() {
        let mut monitor = TrackingMonitor::new("CA track finder");
        for _ in 0..3 {
            let mut call = TrackingMonitorData::new();
            call.increment_counter(CounterKey::TrackingCall);
            call.increment_counter_by(CounterKey::RecoTrack, 5);
            call.timer_mut(TimerKey::Tracking)
                .record(Duration::from_millis(2));
            monitor.add_monitor_data(&call);
        }
        assert_eq!(monitor.counter_value(CounterKey::TrackingCall), 3);
        assert_eq!(monitor.counter_value(CounterKey::RecoTrack), 15);
        assert_eq!(
            monitor.timer(TimerKey::Tracking).total(),
            Duration::from_millis(6)
        );

        monitor.reset();
        assert_eq!(monitor.counter_value(CounterKey::TrackingCall), 0);
    }

    #[test]
    fn test_monitor_display() {
        let mut monitor = TrackingMonitor::new("CA track finder")
            .with_ratio_keys(vec![CounterKey::TrackingCall]);
        let mut call = TrackingMonitorData::new();
        call.increment_counter_by(CounterKey::TrackingCall, 2);
        call.increment_counter_by(CounterKey::RecoTrack, 9);
        monitor.add_monitor_data(&call);

        let text = monitor.to_string();
        assert!(text.contains("Monitor: CA track finder"));
        assert!(text.contains("per full routine calls"));
        assert!(text.contains("reco tracks"));
        assert!(text.contains("4.500"));
        assert!(text.contains("store tracks final"));
        assert_eq!(monitor.name(), "CA track finder");
    }
}
