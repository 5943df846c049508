//! Reconstructed tracks and the timeslice header.

use crate::hit::HitIndex;
use std::ops::Range;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Track parameters at a reference plane `z`.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct TrackParam {
    /// X position [cm].
    pub x: f64,
    /// Y position [cm].
    pub y: f64,
    /// Reference plane [cm].
    pub z: f64,
    /// Slope dx/dz.
    pub tx: f64,
    /// Slope dy/dz.
    pub ty: f64,
    /// Charge over momentum [c/GeV]; zero when not measured.
    pub qp: f64,
    /// Time [ns].
    pub t: f64,
    /// Fit chi-square.
    pub chi2: f64,
    /// Fit degrees of freedom.
    pub ndf: u32,
}

/// A reconstructed track.
///
/// The hits of a track are the contiguous slice
/// `hit_indices[first_hit..first_hit + n_hits]` of the flat hit-index buffer
/// the track was stored alongside.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Track {
    /// Offset of the first hit in the flat hit-index buffer.
    pub first_hit: usize,
    /// Number of hits.
    pub n_hits: usize,
    /// Fitted parameters at the first hit.
    pub param_first: TrackParam,
    /// Fitted parameters at the last hit.
    pub param_last: TrackParam,
}

impl Track {
    /// Creates a track covering `n_hits` hits starting at `first_hit`.
    #[must_use]
    pub fn new(first_hit: usize, n_hits: usize) -> Self {
        Self {
            first_hit,
            n_hits,
            ..Self::default()
        }
    }

    /// Range of this track inside the flat hit-index buffer.
    #[inline]
    #[must_use]
    pub fn hit_range(&self) -> Range<usize> {
        self.first_hit..self.first_hit + self.n_hits
    }

    /// Hit indices of this track.
    ///
    /// # Panics
    /// Panics if `hit_indices` is not the buffer the track refers to.
    #[inline]
    #[must_use]
    pub fn hits<'a>(&self, hit_indices: &'a [HitIndex]) -> &'a [HitIndex] {
        &hit_indices[self.hit_range()]
    }
}

/// Observed time extent of a processed timeslice.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct TimesliceHeader {
    /// Start time [ns].
    pub start: f64,
    /// End time [ns].
    pub end: f64,
}

impl TimesliceHeader {
    /// Creates a header.
    #[must_use]
    pub fn new(start: f64, end: f64) -> Self {
        Self { start, end }
    }

    /// Length of the timeslice [ns].
    #[must_use]
    pub fn duration(&self) -> f64 {
        self.end - self.start
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_track_hits() {
        let buffer: Vec<HitIndex> = vec![10, 11, 12, 20, 21, 22, 23];
        let first = Track::new(0, 3);
        let second = Track::new(3, 4);
        assert_eq!(first.hits(&buffer), &[10, 11, 12]);
        assert_eq!(second.hits(&buffer), &[20, 21, 22, 23]);
        assert_eq!(second.hit_range(), 3..7);
    }

    #[test]
    fn test_timeslice_header() {
        let header = TimesliceHeader::default();
        assert_relative_eq!(header.start, 0.0);
        assert_relative_eq!(header.end, 0.0);
        assert_relative_eq!(TimesliceHeader::new(100.0, 350.0).duration(), 250.0);
    }
}
