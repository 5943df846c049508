//! Timeslice-level orchestration of the track finder.

use crate::kernel::TrackKernel;
use crate::keys::HitKeyFlags;
use crate::partition::WindowPartitioner;
use crate::time_info::HitTimeGate;
use crate::window::{ThreadOutput, ThreadStats, TimesliceContext, WindowWorker};
use catrack_core::config::{FinderConfig, Parameters};
use catrack_core::error::{Error, Result};
use catrack_core::hit::HitIndex;
use catrack_core::input::InputData;
use catrack_core::monitor::{CounterKey, TimerKey, TrackingMonitor, TrackingMonitorData};
use catrack_core::track::{TimesliceHeader, Track};
use rayon::prelude::*;
use rayon::{ThreadPool, ThreadPoolBuilder};
use std::time::{Duration, Instant};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Statistics of one timeslice.
#[derive(Debug, Clone, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct FinderStats {
    /// Windows of the load-balancing histogram.
    pub n_windows: usize,
    /// Hits counted for load balancing.
    pub n_hits_collected: usize,
    /// Accepted hits behind the last window.
    pub n_hits_out_of_range: usize,
    /// Window-station cells suppressed as pile-up during balancing.
    pub n_pile_up_cells: usize,
    /// Tracks dropped at merge because an earlier thread claimed their hits.
    pub n_merge_conflicts: usize,
    /// Per-thread statistics, in thread order.
    pub threads: Vec<ThreadStats>,
}

impl FinderStats {
    /// Sub-windows processed over all threads.
    #[must_use]
    pub fn n_sub_windows(&self) -> usize {
        self.threads.iter().map(|t| t.n_sub_windows).sum()
    }

    /// Hits handed to the kernel over all threads and sub-windows.
    #[must_use]
    pub fn n_hits_selected(&self) -> usize {
        self.threads.iter().map(|t| t.n_hits_selected).sum()
    }
}

/// Result of [`TrackFinder::find_tracks`].
#[derive(Debug, Clone, Default)]
pub struct FindTracksOutput {
    /// Reconstructed tracks in thread order.
    pub tracks: Vec<Track>,
    /// Hit indices of all tracks, concatenated in track order.
    pub hit_indices: Vec<HitIndex>,
    /// Hits rejected for an unphysical time.
    pub bogus_hits: Vec<HitIndex>,
    /// Wall-clock reconstruction time.
    pub reco_time: Duration,
    /// Counters and timers of this call.
    pub monitor: TrackingMonitorData,
    /// Work statistics of this call.
    pub stats: FinderStats,
}

impl FindTracksOutput {
    /// Number of tracks.
    #[must_use]
    pub fn n_tracks(&self) -> usize {
        self.tracks.len()
    }

    /// Hit indices of one track.
    #[must_use]
    pub fn track_hits(&self, track: &Track) -> &[HitIndex] {
        track.hits(&self.hit_indices)
    }
}

/// Multi-threaded, time-windowed track finder.
///
/// Splits every timeslice into per-thread time ranges, runs a
/// [`TrackKernel`] over sliding sub-windows in each range and merges the
/// per-thread tracks in thread order.
pub struct TrackFinder<K: TrackKernel> {
    params: Parameters,
    config: FinderConfig,
    kernel: K,
    pool: Option<ThreadPool>,
    monitor: TrackingMonitor,
    last_reco_time: Duration,
}

impl<K: TrackKernel> TrackFinder<K> {
    /// Creates a track finder.
    ///
    /// # Errors
    /// Returns [`Error::InvalidThreadCount`] for zero threads,
    /// [`Error::ConfigError`] for an unusable setup or configuration and
    /// [`Error::ThreadPool`] if the worker pool cannot be created.
    pub fn new(params: Parameters, config: FinderConfig, kernel: K) -> Result<Self> {
        config.validate()?;
        params.validate()?;

        let pool = if config.n_threads > 1 {
            let pool = ThreadPoolBuilder::new()
                .num_threads(config.n_threads)
                .thread_name(|i| format!("catrack-worker-{i}"))
                .build()
                .map_err(|e| Error::ThreadPool(e.to_string()))?;
            Some(pool)
        } else {
            None
        };

        log::debug!(
            "track finder: kernel {}, {:?} mode, {} threads, {} stations, sub-window {} ns",
            kernel.name(),
            config.mode,
            config.n_threads,
            params.n_stations_active(),
            config.window.window_length
        );

        Ok(Self {
            params,
            config,
            kernel,
            pool,
            monitor: TrackingMonitor::new("CA track finder").with_ratio_keys(vec![
                CounterKey::TrackingCall,
                CounterKey::RecoTrack,
            ]),
            last_reco_time: Duration::ZERO,
        })
    }

    /// Detector setup.
    #[must_use]
    pub fn params(&self) -> &Parameters {
        &self.params
    }

    /// Finder configuration.
    #[must_use]
    pub fn config(&self) -> &FinderConfig {
        &self.config
    }

    /// Prototype kernel cloned into every worker.
    #[must_use]
    pub fn kernel(&self) -> &K {
        &self.kernel
    }

    /// Monitor accumulated over all calls.
    #[must_use]
    pub fn monitor(&self) -> &TrackingMonitor {
        &self.monitor
    }

    /// Clears the accumulated monitor.
    pub fn reset_monitor(&mut self) {
        self.monitor.reset();
    }

    /// Wall-clock time of the last call.
    #[must_use]
    pub fn last_reco_time(&self) -> Duration {
        self.last_reco_time
    }

    /// Finds the tracks of one timeslice.
    ///
    /// On success `header` receives the observed timeslice bounds. An empty
    /// input returns an empty result and leaves `header` untouched.
    pub fn find_tracks(
        &mut self,
        input: &InputData,
        header: &mut TimesliceHeader,
    ) -> FindTracksOutput {
        if input.is_empty() {
            log::warn!("empty input, no tracks reconstructed");
            self.last_reco_time = Duration::ZERO;
            return FindTracksOutput::default();
        }

        let started = Instant::now();
        let n_threads = self.config.n_threads;
        let mut call = TrackingMonitorData::new();
        call.start_timer(TimerKey::Tracking);
        call.start_timer(TimerKey::PrepareTimeslice);
        call.increment_counter(CounterKey::TrackingCall);
        call.increment_counter_by(CounterKey::RecoHit, as_count(input.hit_count()));

        let mut used = HitKeyFlags::new(input.n_hit_keys());
        let timing = HitTimeGate::new(&self.params, self.config.gating, self.config.default_mass)
            .compute(input, &mut used);
        call.increment_counter_by(CounterKey::BogusHit, as_count(timing.bogus_hits.len()));
        if !timing.bogus_hits.is_empty() {
            log::warn!(
                "{} of {} hits rejected for an unphysical time",
                timing.bogus_hits.len(),
                timing.n_hits_total
            );
        }

        let n_stations = self.params.n_stations_active();
        let partition = WindowPartitioner::new(self.config.window, n_stations)
            .partition(input, &timing, &used, n_threads);
        log::debug!(
            "timeslice [{:.1}, {:.1}] ns: {} windows, {} hits balanced over {} threads",
            timing.start,
            timing.end,
            partition.n_windows,
            partition.n_hits_collected,
            n_threads
        );
        for (thread, range) in partition.ranges.iter().enumerate() {
            log::debug!(
                "thread {thread}: [{:.1}, {:.1}] ns",
                range.start,
                range.end
            );
        }
        call.stop_timer(TimerKey::PrepareTimeslice);

        let ctx = TimesliceContext {
            input,
            timing: &timing,
            used: &used,
            window: self.config.window,
            n_stations,
            n_threads,
        };
        let kernels: Vec<K> = (0..n_threads).map(|_| self.kernel.clone()).collect();
        let mut outputs: Vec<ThreadOutput> = match &self.pool {
            Some(pool) => pool.install(|| {
                kernels
                    .into_par_iter()
                    .zip(partition.ranges.par_iter())
                    .enumerate()
                    .with_max_len(1)
                    .map(|(thread, (kernel, &range))| {
                        WindowWorker::new(ctx, thread, kernel).run(range)
                    })
                    .collect()
            }),
            None => kernels
                .into_iter()
                .zip(&partition.ranges)
                .enumerate()
                .map(|(thread, (kernel, &range))| {
                    WindowWorker::new(ctx, thread, kernel).run(range)
                })
                .collect(),
        };

        call.start_timer(TimerKey::StoreTracksFinal);
        for output in &outputs {
            call.add_monitor_data(&output.monitor, true);
        }
        let threads: Vec<ThreadStats> = outputs.iter().map(|o| o.stats).collect();
        let merged = if outputs.len() == 1 {
            let single = outputs.swap_remove(0);
            MergedTracks {
                tracks: single.tracks,
                hit_indices: single.hit_indices,
                n_conflicts: 0,
            }
        } else {
            merge_thread_outputs(input, &outputs)
        };
        call.stop_timer(TimerKey::StoreTracksFinal);

        call.increment_counter_by(CounterKey::RecoTrack, as_count(merged.tracks.len()));
        call.increment_counter_by(CounterKey::RecoHitUsed, as_count(merged.hit_indices.len()));
        call.increment_counter_by(CounterKey::MergeConflict, as_count(merged.n_conflicts));

        header.start = timing.start;
        header.end = timing.end;

        let reco_time = started.elapsed();
        self.last_reco_time = reco_time;
        call.stop_timer(TimerKey::Tracking);
        self.monitor.add_monitor_data(&call);

        log::debug!(
            "{} tracks with {} hits from {} hits in {:.3} ms",
            merged.tracks.len(),
            merged.hit_indices.len(),
            input.hit_count(),
            reco_time.as_secs_f64() * 1.0e3
        );

        FindTracksOutput {
            tracks: merged.tracks,
            hit_indices: merged.hit_indices,
            bogus_hits: timing.bogus_hits,
            reco_time,
            monitor: call,
            stats: FinderStats {
                n_windows: partition.n_windows,
                n_hits_collected: partition.n_hits_collected,
                n_hits_out_of_range: partition.n_hits_out_of_range,
                n_pile_up_cells: partition.n_pile_up_cells,
                n_merge_conflicts: merged.n_conflicts,
                threads,
            },
        }
    }
}

struct MergedTracks {
    tracks: Vec<Track>,
    hit_indices: Vec<HitIndex>,
    n_conflicts: usize,
}

/// Concatenates per-thread tracks in thread order.
///
/// A track sharing a hit key with a track of an earlier thread is dropped.
fn merge_thread_outputs(input: &InputData, outputs: &[ThreadOutput]) -> MergedTracks {
    let n_tracks = outputs.iter().map(|o| o.tracks.len()).sum();
    let n_hits = outputs.iter().map(|o| o.hit_indices.len()).sum();
    let mut tracks = Vec::with_capacity(n_tracks);
    let mut hit_indices = Vec::with_capacity(n_hits);
    let mut claimed = HitKeyFlags::new(input.n_hit_keys());
    let mut n_conflicts = 0;

    for (thread, output) in outputs.iter().enumerate() {
        for track in &output.tracks {
            let hits = track.hits(&output.hit_indices);
            if hits
                .iter()
                .any(|&index| claimed.is_hit_used(input.hit(index)))
            {
                log::debug!(
                    "thread {thread}: track with {} hits already claimed by an earlier thread, dropped",
                    hits.len()
                );
                n_conflicts += 1;
                continue;
            }
            for &index in hits {
                claimed.mark_hit(input.hit(index));
            }
            let mut merged = *track;
            merged.first_hit = hit_indices.len();
            hit_indices.extend_from_slice(hits);
            tracks.push(merged);
        }
    }

    MergedTracks {
        tracks,
        hit_indices,
        n_conflicts,
    }
}

fn as_count(n: usize) -> u64 {
    u64::try_from(n).unwrap_or(u64::MAX)
}
