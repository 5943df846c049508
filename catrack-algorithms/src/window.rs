//! Per-thread sliding sub-window processing.
//!
//! A worker walks its time range in steps of one window length. Each step
//! selects the unused hits that could belong to an event in the current
//! sub-window, runs the kernel on them and classifies the found tracks:
//! a track whose hits all lie in the overlap with the next sub-window is
//! left for the next step as long as later hits remain, every other track
//! is stored and its hits are flagged as used. The worker stops after the
//! step that passes the end of its range or that leaves no later hits.

use crate::kernel::{KernelOutput, TrackKernel, WindowSelection};
use crate::keys::HitKeyFlags;
use crate::partition::WindowRange;
use crate::time_info::TimesliceTiming;
use catrack_core::config::WindowConfig;
use catrack_core::hit::HitIndex;
use catrack_core::input::InputData;
use catrack_core::monitor::{CounterKey, TimerKey, TrackingMonitorData};
use catrack_core::track::Track;
use std::ops::Range;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Read-only state shared by all workers of one timeslice.
#[derive(Debug, Clone, Copy)]
pub(crate) struct TimesliceContext<'a> {
    pub input: &'a InputData,
    pub timing: &'a TimesliceTiming,
    /// Used-flags after gating; each worker starts from a copy.
    pub used: &'a HitKeyFlags,
    pub window: WindowConfig,
    pub n_stations: usize,
    pub n_threads: usize,
}

/// Work done by one worker.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ThreadStats {
    /// Assigned time range.
    pub range: WindowRange,
    /// Processed sub-windows.
    pub n_sub_windows: usize,
    /// Hits handed to the kernel, summed over sub-windows.
    pub n_hits_selected: usize,
    /// Stored tracks.
    pub n_tracks: usize,
    /// Tracks left for a later sub-window.
    pub n_deferred: usize,
    /// Station lists cleared as pile-up.
    pub n_pile_up_cleared: usize,
}

/// Everything a worker hands back to the orchestrator.
#[derive(Debug, Clone, Default)]
pub(crate) struct ThreadOutput {
    pub tracks: Vec<Track>,
    pub hit_indices: Vec<HitIndex>,
    pub monitor: TrackingMonitorData,
    pub stats: ThreadStats,
}

/// Sliding-window state of one worker.
pub(crate) struct WindowWorker<'a, K: TrackKernel> {
    ctx: TimesliceContext<'a>,
    thread: usize,
    kernel: K,
    used: HitKeyFlags,
    /// Unprocessed part of every stream.
    stream_ranges: Vec<Range<HitIndex>>,
    station_hits: Vec<Vec<HitIndex>>,
    found: KernelOutput,
    tracks: Vec<Track>,
    hit_indices: Vec<HitIndex>,
    monitor: TrackingMonitorData,
    stats: ThreadStats,
}

impl<'a, K: TrackKernel> WindowWorker<'a, K> {
    /// Creates a worker with its own copy of the used-flags and pre-sized buffers.
    pub fn new(ctx: TimesliceContext<'a>, thread: usize, mut kernel: K) -> Self {
        let mut monitor = TrackingMonitorData::new();
        monitor.start_timer(TimerKey::TrackingThread);
        monitor.start_timer(TimerKey::PrepareThread);

        let n_stations = ctx.n_stations.max(1);
        let hits_per_thread = 2 * ctx.timing.n_hits_accepted() / ctx.n_threads.max(1) + 1;
        let station_capacity = ctx
            .window
            .max_station_hits_per_window
            .map_or(hits_per_thread / n_stations + 1, |ceiling| ceiling + 1);
        kernel.init_timeslice(ctx.used.len().max(ctx.input.n_hit_keys()));

        Self {
            ctx,
            thread,
            kernel,
            used: ctx.used.clone(),
            stream_ranges: Vec::with_capacity(ctx.input.n_streams()),
            station_hits: (0..ctx.n_stations)
                .map(|_| Vec::with_capacity(station_capacity))
                .collect(),
            found: KernelOutput::default(),
            tracks: Vec::with_capacity(hits_per_thread / n_stations + 1),
            hit_indices: Vec::with_capacity(hits_per_thread),
            monitor,
            stats: ThreadStats::default(),
        }
    }

    /// Processes `range` and returns the stored tracks.
    pub fn run(mut self, range: WindowRange) -> ThreadOutput {
        self.stats.range = range;
        self.prepare_range(range);
        self.monitor.stop_timer(TimerKey::PrepareThread);

        let window_length = self.ctx.window.window_length;
        let mut cursor = range.start;
        loop {
            self.monitor.increment_counter(CounterKey::SubTimeslice);
            self.stats.n_sub_windows += 1;
            let window_end = cursor + window_length;

            self.monitor.start_timer(TimerKey::PrepareWindow);
            let untouched_left = self.select_hits(cursor, window_end);
            self.monitor.stop_timer(TimerKey::PrepareWindow);

            self.monitor.start_timer(TimerKey::TrackingWindow);
            self.found.clear();
            let selection = WindowSelection {
                station_hits: &self.station_hits,
                used: &self.used,
                hit_info: &self.ctx.timing.hit_info,
                start: cursor,
                end: window_end,
            };
            self.kernel
                .run_on_selection(self.ctx.input, &selection, &mut self.found);
            self.monitor.stop_timer(TimerKey::TrackingWindow);

            cursor = window_end;

            self.monitor.start_timer(TimerKey::StoreTracksWindow);
            let (n_stored, n_deferred) = self.store_tracks(cursor, untouched_left);
            self.monitor.stop_timer(TimerKey::StoreTracksWindow);

            log::trace!(
                "thread {}: sub-window [{:.1}, {:.1}] ns, {} tracks stored, {} deferred, later hits: {}",
                self.thread,
                cursor - window_length,
                cursor,
                n_stored,
                n_deferred,
                untouched_left
            );

            if cursor > range.end || !untouched_left {
                break;
            }
        }

        self.monitor.stop_timer(TimerKey::TrackingThread);
        log::debug!(
            "thread {} finished [{:.1}, {:.1}] ns: {} sub-windows, {} tracks",
            self.thread,
            range.start,
            range.end,
            self.stats.n_sub_windows,
            self.stats.n_tracks
        );

        ThreadOutput {
            tracks: self.tracks,
            hit_indices: self.hit_indices,
            monitor: self.monitor,
            stats: self.stats,
        }
    }

    /// Cuts every stream to the hits that may matter for `range`.
    ///
    /// The running extrema are monotone along a stream, so the hits to skip
    /// form a prefix and a suffix.
    fn prepare_range(&mut self, range: WindowRange) {
        let ctx = self.ctx;
        self.stream_ranges.clear();
        for stream in 0..ctx.input.n_streams() {
            let mut kept = ctx.input.stream_range(stream);
            for index in ctx.input.stream_range(stream) {
                if self.used.is_hit_used(ctx.input.hit(index)) {
                    continue;
                }
                let info = ctx.timing.info(index);
                if info.max_time_before_hit < range.start {
                    kept.start = index + 1;
                }
                if info.min_time_after_hit > range.end {
                    kept.end = index;
                    break;
                }
            }
            self.stream_ranges.push(kept);
        }
    }

    /// Fills the station lists for the sub-window `[start, end]`.
    ///
    /// Returns true if unused hits later than the sub-window remain.
    fn select_hits(&mut self, start: f64, end: f64) -> bool {
        let ctx = self.ctx;
        for hits in &mut self.station_hits {
            hits.clear();
        }

        let mut untouched_left = false;
        for kept in &mut self.stream_ranges {
            for index in kept.clone() {
                let hit = ctx.input.hit(index);
                if self.used.is_hit_used(hit) {
                    continue;
                }
                let info = ctx.timing.info(index);
                if info.event_time_max < start {
                    continue;
                }
                if info.min_time_after_hit > end {
                    untouched_left = true;
                    break;
                }
                if info.event_time_min > end {
                    untouched_left = true;
                    continue;
                }
                self.station_hits[hit.station].push(index);
                if info.max_time_before_hit < end {
                    kept.start = index + 1;
                }
            }
        }

        for (station, hits) in self.station_hits.iter_mut().enumerate() {
            if ctx.window.is_pile_up(hits.len()) {
                log::debug!(
                    "thread {}: {} hits on station {station} in [{start:.1}, {end:.1}] ns, station skipped",
                    self.thread,
                    hits.len()
                );
                hits.clear();
                self.stats.n_pile_up_cleared += 1;
            }
        }
        self.stats.n_hits_selected += self.station_hits.iter().map(Vec::len).sum::<usize>();
        untouched_left
    }

    /// Stores the kernel tracks that are final at `boundary`.
    ///
    /// Returns the number of stored and deferred tracks.
    fn store_tracks(&mut self, boundary: f64, untouched_left: bool) -> (usize, usize) {
        let ctx = self.ctx;
        let mut n_stored = 0;
        let mut n_deferred = 0;
        let mut offset = 0;

        for track in &self.found.tracks {
            let Some(hits) = self.found.hit_indices.get(offset..offset + track.n_hits) else {
                log::error!(
                    "thread {}: kernel {} returned tracks with {} hits but only {} hit indices",
                    self.thread,
                    self.kernel.name(),
                    offset + track.n_hits,
                    self.found.hit_indices.len()
                );
                break;
            };
            offset += track.n_hits;

            let in_overlap = hits
                .iter()
                .all(|&index| ctx.timing.info(index).event_time_max >= boundary);
            if in_overlap && untouched_left {
                n_deferred += 1;
                continue;
            }
            if hits
                .iter()
                .any(|&index| self.used.is_hit_used(ctx.input.hit(index)))
            {
                log::warn!(
                    "thread {}: kernel {} returned a track sharing hits with a stored one, dropped",
                    self.thread,
                    self.kernel.name()
                );
                continue;
            }

            for &index in hits {
                self.used.mark_hit(ctx.input.hit(index));
            }
            let mut stored = *track;
            stored.first_hit = self.hit_indices.len();
            self.hit_indices.extend_from_slice(hits);
            self.tracks.push(stored);
            n_stored += 1;
        }

        self.stats.n_tracks += n_stored;
        self.stats.n_deferred += n_deferred;
        (n_stored, n_deferred)
    }
}
