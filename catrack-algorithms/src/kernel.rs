//! Interface between the sliding-window scheduler and a track-finding kernel.

use crate::keys::HitKeyFlags;
use crate::time_info::HitTimeInfo;
use catrack_core::hit::HitIndex;
use catrack_core::input::InputData;
use catrack_core::track::{Track, TrackParam};

/// Hits selected for one sub-window.
#[derive(Debug, Clone, Copy)]
pub struct WindowSelection<'a> {
    /// Selected hit indices per station, each list in stream order.
    pub station_hits: &'a [Vec<HitIndex>],
    /// Used-flags of the calling worker. Selected hits are never flagged.
    pub used: &'a HitKeyFlags,
    /// Time bounds per hit, indexed by hit index.
    pub hit_info: &'a [HitTimeInfo],
    /// Start of the sub-window [ns].
    pub start: f64,
    /// End of the sub-window [ns].
    pub end: f64,
}

impl WindowSelection<'_> {
    /// Number of selected hits over all stations.
    #[must_use]
    pub fn n_hits(&self) -> usize {
        self.station_hits.iter().map(Vec::len).sum()
    }
}

/// Tracks found in one sub-window.
///
/// The hits of every track are stored consecutively in `hit_indices`, in
/// the same order as `tracks`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct KernelOutput {
    /// Found tracks.
    pub tracks: Vec<Track>,
    /// Hit indices of all tracks, concatenated.
    pub hit_indices: Vec<HitIndex>,
}

impl KernelOutput {
    /// Removes all tracks, keeping the allocations.
    pub fn clear(&mut self) {
        self.tracks.clear();
        self.hit_indices.clear();
    }

    /// Appends a track made of `hits`.
    pub fn push_track(&mut self, hits: &[HitIndex], param_first: TrackParam, param_last: TrackParam) {
        let mut track = Track::new(self.hit_indices.len(), hits.len());
        track.param_first = param_first;
        track.param_last = param_last;
        self.tracks.push(track);
        self.hit_indices.extend_from_slice(hits);
    }

    /// Number of tracks.
    #[must_use]
    pub fn len(&self) -> usize {
        self.tracks.len()
    }

    /// Returns true if no track was found.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tracks.is_empty()
    }
}

/// A track-finding algorithm run on the hits of one sub-window.
///
/// Every worker owns a clone of the kernel, so implementations may keep
/// per-thread scratch state.
pub trait TrackKernel: Clone + Send {
    /// Short name for logs.
    fn name(&self) -> &'static str;

    /// Prepares for a new timeslice with keys in `0..n_hit_keys`.
    fn init_timeslice(&mut self, n_hit_keys: usize);

    /// Finds tracks among the selected hits and appends them to `output`.
    ///
    /// A track must not contain a hit twice, and two tracks of one call
    /// must not share a hit key.
    fn run_on_selection(
        &mut self,
        input: &InputData,
        selection: &WindowSelection<'_>,
        output: &mut KernelOutput,
    );
}
