//! Splitting a timeslice into contiguous per-thread time ranges.
//!
//! The timeslice is divided into fixed-length windows. Accepted hits are
//! counted per window and station by their earliest event time, stations in
//! a window above the pile-up ceiling are not counted, and the thread
//! boundaries are placed on window edges so that every thread receives an
//! approximately equal share of the counted hits.

use crate::keys::HitKeyFlags;
use crate::time_info::TimesliceTiming;
use catrack_core::config::WindowConfig;
use catrack_core::input::InputData;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Time range `[start, end]` assigned to one worker [ns].
#[derive(Debug, Clone, Copy, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct WindowRange {
    /// First sub-window starts here.
    pub start: f64,
    /// No sub-window starts after this time.
    pub end: f64,
}

impl WindowRange {
    /// Creates a range.
    #[must_use]
    pub fn new(start: f64, end: f64) -> Self {
        Self { start, end }
    }

    /// Length of the range, zero if inverted.
    #[must_use]
    pub fn length(&self) -> f64 {
        (self.end - self.start).max(0.0)
    }
}

/// Thread ranges and the histogram they were derived from.
#[derive(Debug, Clone, PartialEq)]
pub struct Partition {
    /// One range per thread, contiguous and in time order.
    pub ranges: Vec<WindowRange>,
    /// Number of windows of the timeslice.
    pub n_windows: usize,
    /// Counted hits per window, after pile-up suppression.
    pub hits_per_window: Vec<usize>,
    /// Hits counted in the histogram.
    pub n_hits_collected: usize,
    /// Accepted hits falling behind the last window.
    pub n_hits_out_of_range: usize,
    /// Window-station cells suppressed as pile-up.
    pub n_pile_up_cells: usize,
}

/// Balances the hit load of a timeslice over worker threads.
#[derive(Debug, Clone, Copy)]
pub struct WindowPartitioner {
    window: WindowConfig,
    n_stations: usize,
}

impl WindowPartitioner {
    /// Creates a partitioner for a setup with `n_stations` stations.
    #[must_use]
    pub fn new(window: WindowConfig, n_stations: usize) -> Self {
        Self { window, n_stations }
    }

    /// Number of windows covering `[start, end]`.
    #[must_use]
    pub fn n_windows(&self, timing: &TimesliceTiming) -> usize {
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let n = ((timing.end - timing.start) / self.window.window_length).floor() as usize;
        n + 1
    }

    /// Index of the window containing `event_time_min`, clamped below at zero.
    #[inline]
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    fn window_index(&self, timing: &TimesliceTiming, event_time_min: f64) -> usize {
        let offset = ((event_time_min - timing.start) / self.window.window_length).floor();
        offset.max(0.0) as usize
    }

    /// Computes `n_threads` contiguous ranges covering `[timing.start, timing.end]`.
    ///
    /// Hits flagged in `used` are not counted. The result depends only on
    /// the input and is deterministic.
    #[must_use]
    pub fn partition(
        &self,
        input: &InputData,
        timing: &TimesliceTiming,
        used: &HitKeyFlags,
        n_threads: usize,
    ) -> Partition {
        let n_threads = n_threads.max(1);
        let n_windows = self.n_windows(timing);
        let n_stations = self.n_stations.max(1);

        let mut cells = vec![0usize; n_windows * n_stations];
        let mut n_hits_out_of_range = 0;
        for (index, hit) in (0..).zip(input.hits()) {
            if used.is_hit_used(hit) || hit.station >= n_stations {
                continue;
            }
            let window = self.window_index(timing, timing.info(index).event_time_min);
            if window >= n_windows {
                log::error!(
                    "hit {index} with earliest event time {} ns is behind the last window ({n_windows} windows from {} ns), skipped",
                    timing.info(index).event_time_min,
                    timing.start
                );
                n_hits_out_of_range += 1;
                continue;
            }
            cells[hit.station + window * n_stations] += 1;
        }

        let mut n_pile_up_cells = 0;
        for count in &mut cells {
            if self.window.is_pile_up(*count) {
                *count = 0;
                n_pile_up_cells += 1;
            }
        }
        if n_pile_up_cells > 0 {
            log::debug!("{n_pile_up_cells} window-station cells suppressed as pile-up");
        }

        let hits_per_window: Vec<usize> = cells
            .chunks_exact(n_stations)
            .map(|cell| cell.iter().sum())
            .collect();
        let cumulative: Vec<usize> = hits_per_window
            .iter()
            .scan(0, |sum, &count| {
                *sum += count;
                Some(*sum)
            })
            .collect();
        let n_hits_collected = cumulative.last().copied().unwrap_or(0);
        let hits_per_thread = n_hits_collected / n_threads;

        let mut ranges = Vec::with_capacity(n_threads);
        let mut start = timing.start;
        let mut search_from = 0;
        for thread in 1..n_threads {
            let target = thread * hits_per_thread;
            let window = search_from + cumulative[search_from..].partition_point(|&sum| sum < target);
            #[allow(clippy::cast_precision_loss)]
            let end = timing.start + (window + 1) as f64 * self.window.window_length;
            ranges.push(WindowRange::new(start, end));
            start = end;
            search_from = window;
        }
        ranges.push(WindowRange::new(start, timing.end));

        Partition {
            ranges,
            n_windows,
            hits_per_window,
            n_hits_collected,
            n_hits_out_of_range,
            n_pile_up_cells,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::time_info::HitTimeGate;
    use approx::assert_relative_eq;
    use catrack_core::config::{GatingConfig, Parameters};
    use catrack_core::constants::PROTON_MASS;
    use catrack_core::hit::Hit;

    /// One station at the target, so that event time intervals are exactly
    /// `[t - range_t, t + range_t]`.
    fn params() -> Parameters {
        Parameters::uniform(2, 0.0, 0.0)
    }

    fn input_at(times: &[(usize, f64)]) -> InputData {
        let mut streams: Vec<Vec<Hit>> = vec![Vec::new(); 2];
        for (key, &(station, t)) in (0u32..).zip(times) {
            streams[station].push(Hit::new(station, 0.0, 0.0, 0.0, t, key));
        }
        let mut builder = InputData::builder(times.len());
        for stream in streams {
            builder.push_stream(stream);
        }
        builder.build().unwrap()
    }

    fn gate(input: &InputData, gating: GatingConfig) -> (TimesliceTiming, HitKeyFlags) {
        let params = params();
        let mut used = HitKeyFlags::new(input.n_hit_keys());
        let timing = HitTimeGate::new(&params, gating, PROTON_MASS).compute(input, &mut used);
        (timing, used)
    }

    fn assert_contiguous(partition: &Partition, timing: &TimesliceTiming) {
        assert_relative_eq!(partition.ranges[0].start, timing.start);
        assert_relative_eq!(partition.ranges.last().unwrap().end, timing.end);
        for pair in partition.ranges.windows(2) {
            assert_relative_eq!(pair[0].end, pair[1].start);
        }
    }

    #[test]
    fn test_single_thread_covers_timeslice() {
        let input = input_at(&[(0, 0.0), (1, 250.0), (0, 990.0)]);
        let (timing, used) = gate(&input, GatingConfig::default());
        let partitioner = WindowPartitioner::new(WindowConfig::default().with_window_length(100.0), 2);
        let partition = partitioner.partition(&input, &timing, &used, 1);

        assert_eq!(partition.ranges.len(), 1);
        assert_eq!(partition.n_windows, 10);
        assert_eq!(partition.n_hits_collected, 3);
        assert_contiguous(&partition, &timing);
    }

    #[test]
    fn test_balanced_split() {
        // 40 hits evenly spread over 1000 ns
        let times: Vec<(usize, f64)> = (0..40u32)
            .map(|i| ((i % 2) as usize, f64::from(i) * 25.0))
            .collect();
        let input = input_at(&times);
        let (timing, used) = gate(&input, GatingConfig::default());
        let partitioner = WindowPartitioner::new(WindowConfig::default().with_window_length(100.0), 2);
        let partition = partitioner.partition(&input, &timing, &used, 2);

        assert_eq!(partition.ranges.len(), 2);
        assert_contiguous(&partition, &timing);
        assert_eq!(partition.n_hits_collected, 40);
        // 20 hits are reached at the end of window 4
        assert_relative_eq!(partition.ranges[0].end, 500.0);
    }

    #[test]
    fn test_more_threads_than_windows() {
        let input = input_at(&[(0, 0.0), (0, 10.0), (1, 20.0)]);
        let (timing, used) = gate(&input, GatingConfig::default());
        let partitioner = WindowPartitioner::new(WindowConfig::default().with_window_length(100.0), 2);
        let partition = partitioner.partition(&input, &timing, &used, 5);

        assert_eq!(partition.ranges.len(), 5);
        assert_contiguous(&partition, &timing);
        for pair in partition.ranges.windows(2) {
            assert!(pair[0].start <= pair[1].start);
        }
    }

    #[test]
    fn test_pile_up_cells_are_not_counted() {
        let mut times: Vec<(usize, f64)> = (0..10).map(|i| (0, f64::from(i))).collect();
        times.extend((0..4).map(|i| (1, 500.0 + f64::from(i))));
        let input = input_at(&times);
        let (timing, used) = gate(&input, GatingConfig::default());

        let window = WindowConfig::default()
            .with_window_length(100.0)
            .with_max_station_hits(Some(5));
        let partition = WindowPartitioner::new(window, 2).partition(&input, &timing, &used, 2);

        assert_eq!(partition.n_pile_up_cells, 1);
        assert_eq!(partition.n_hits_collected, 4);
        assert_eq!(partition.hits_per_window[0], 0);
        assert_contiguous(&partition, &timing);
    }

    #[test]
    fn test_used_hits_are_not_counted() {
        let input = input_at(&[(0, 0.0), (0, 100.0), (1, 1.0e12)]);
        let (timing, used) = gate(&input, GatingConfig::default());
        assert_eq!(timing.bogus_hits.len(), 1);
        let partition = WindowPartitioner::new(WindowConfig::default(), 2)
            .partition(&input, &timing, &used, 1);
        assert_eq!(partition.n_hits_collected, 2);
        assert_eq!(partition.n_hits_out_of_range, 0);
    }

    #[test]
    fn test_partition_is_deterministic() {
        let times: Vec<(usize, f64)> = (0..100u32)
            .map(|i| ((i % 2) as usize, f64::from(i * i % 997) * 3.0))
            .collect();
        let input = input_at(&times);
        let (timing, used) = gate(&input, GatingConfig::default());
        let partitioner = WindowPartitioner::new(WindowConfig::default().with_window_length(50.0), 2);
        let a = partitioner.partition(&input, &timing, &used, 4);
        let b = partitioner.partition(&input, &timing, &used, 4);
        assert_eq!(a, b);
        assert_contiguous(&a, &timing);
    }
}
