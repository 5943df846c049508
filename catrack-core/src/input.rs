//! Timeslice input data organised in readout streams.
//!
//! Hits are stored in one flat vector. A stream is a contiguous, time-ordered
//! slice of that vector holding the hits of one physically contiguous readout
//! unit, so monotone running bounds can be computed per stream.

use crate::error::{Error, Result};
use crate::hit::{Hit, HitIndex, HitKey};
use std::ops::Range;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Input hits of one timeslice.
#[derive(Debug, Clone, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(try_from = "RawInputData"))]
pub struct InputData {
    hits: Vec<Hit>,
    streams: Vec<Range<HitIndex>>,
    n_hit_keys: usize,
}

impl InputData {
    /// Creates an empty input.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts building an input with pre-allocated hit storage.
    #[must_use]
    pub fn builder(capacity: usize) -> InputDataBuilder {
        InputDataBuilder::with_capacity(capacity)
    }

    /// Total number of hits.
    #[must_use]
    pub fn hit_count(&self) -> usize {
        self.hits.len()
    }

    /// Returns true if the input holds no hits.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.hits.is_empty()
    }

    /// Returns the hit with the given global index.
    ///
    /// # Panics
    /// Panics if the index is out of range.
    #[inline]
    #[must_use]
    pub fn hit(&self, index: HitIndex) -> &Hit {
        &self.hits[index as usize]
    }

    /// All hits in storage order.
    #[must_use]
    pub fn hits(&self) -> &[Hit] {
        &self.hits
    }

    /// Number of readout streams.
    #[must_use]
    pub fn n_streams(&self) -> usize {
        self.streams.len()
    }

    /// Global index of the first hit of a stream.
    #[inline]
    #[must_use]
    pub fn stream_start_index(&self, stream: usize) -> HitIndex {
        self.streams[stream].start
    }

    /// Global index one past the last hit of a stream.
    #[inline]
    #[must_use]
    pub fn stream_stop_index(&self, stream: usize) -> HitIndex {
        self.streams[stream].end
    }

    /// Number of hits in a stream.
    #[must_use]
    pub fn stream_hit_count(&self, stream: usize) -> usize {
        self.streams[stream].len()
    }

    /// Global index range of a stream.
    #[must_use]
    pub fn stream_range(&self, stream: usize) -> Range<HitIndex> {
        self.streams[stream].clone()
    }

    /// Number of distinct hit keys (largest key + 1 unless set explicitly).
    #[must_use]
    pub fn n_hit_keys(&self) -> usize {
        self.n_hit_keys
    }
}

/// Incremental builder for [`InputData`].
#[derive(Debug, Default)]
pub struct InputDataBuilder {
    hits: Vec<Hit>,
    streams: Vec<Range<HitIndex>>,
    n_hit_keys: Option<usize>,
}

impl InputDataBuilder {
    /// Creates a builder with pre-allocated hit storage.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            hits: Vec::with_capacity(capacity),
            streams: Vec::new(),
            n_hit_keys: None,
        }
    }

    /// Fixes the number of hit keys instead of deriving it from the hits.
    #[must_use]
    pub fn with_n_hit_keys(mut self, n_hit_keys: usize) -> Self {
        self.n_hit_keys = Some(n_hit_keys);
        self
    }

    /// Appends one readout stream.
    ///
    /// Hits are sorted by measured time so the stream is time-ordered.
    /// Empty streams are kept; they simply contribute no hits.
    pub fn push_stream<I>(&mut self, hits: I) -> &mut Self
    where
        I: IntoIterator<Item = Hit>,
    {
        let start = self.hits.len();
        self.hits.extend(hits);
        self.hits[start..].sort_by(|a, b| a.t.total_cmp(&b.t));
        #[allow(clippy::cast_possible_truncation)]
        self.streams.push(start as HitIndex..self.hits.len() as HitIndex);
        self
    }

    /// Number of hits pushed so far.
    #[must_use]
    pub fn len(&self) -> usize {
        self.hits.len()
    }

    /// Returns true if no hits were pushed.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.hits.is_empty()
    }

    /// Finalises the input.
    ///
    /// # Errors
    /// Returns [`Error::InvalidInput`] if the hit count does not fit the index
    /// type or a hit key is outside the explicit key range.
    pub fn build(self) -> Result<InputData> {
        InputData::from_parts(self.hits, self.streams, self.n_hit_keys)
    }
}

impl InputData {
    /// Assembles an input from its parts after checking them.
    ///
    /// Streams must lie inside the hit array, follow each other without
    /// overlapping and be time-ordered. `n_hit_keys` defaults to the largest
    /// key + 1.
    ///
    /// # Errors
    /// Returns [`Error::InvalidInput`] if any of these conditions fails, the
    /// hit count does not fit the index type or a hit key is outside the key
    /// range.
    pub fn from_parts(
        hits: Vec<Hit>,
        streams: Vec<Range<HitIndex>>,
        n_hit_keys: Option<usize>,
    ) -> Result<Self> {
        if HitIndex::try_from(hits.len()).is_err() {
            return Err(Error::InvalidInput(format!(
                "{} hits exceed the hit index range",
                hits.len()
            )));
        }

        let mut previous_end = 0;
        for (stream, range) in streams.iter().enumerate() {
            if range.start > range.end || range.end as usize > hits.len() {
                return Err(Error::InvalidInput(format!(
                    "stream {stream} spans hits {}..{} of {}",
                    range.start,
                    range.end,
                    hits.len()
                )));
            }
            if range.start < previous_end {
                return Err(Error::InvalidInput(format!(
                    "stream {stream} starts at hit {} inside the previous stream",
                    range.start
                )));
            }
            previous_end = range.end;

            let stream_hits = &hits[range.start as usize..range.end as usize];
            if stream_hits.windows(2).any(|pair| pair[0].t > pair[1].t) {
                return Err(Error::InvalidInput(format!(
                    "stream {stream} is not time-ordered"
                )));
            }
        }

        let derived_keys = hits
            .iter()
            .map(|hit| hit.max_key() as usize + 1)
            .max()
            .unwrap_or(0);
        let n_hit_keys = match n_hit_keys {
            Some(n) if n < derived_keys => {
                return Err(Error::InvalidInput(format!(
                    "hit key {} is outside the declared key range 0..{n}",
                    derived_keys - 1
                )));
            }
            Some(n) => n,
            None => derived_keys,
        };

        Ok(Self {
            hits,
            streams,
            n_hit_keys,
        })
    }
}

/// Serialized form of [`InputData`], checked on the way in.
#[cfg(feature = "serde")]
#[derive(Deserialize)]
struct RawInputData {
    hits: Vec<Hit>,
    streams: Vec<Range<HitIndex>>,
    n_hit_keys: usize,
}

#[cfg(feature = "serde")]
impl TryFrom<RawInputData> for InputData {
    type Error = Error;

    fn try_from(raw: RawInputData) -> Result<Self> {
        Self::from_parts(raw.hits, raw.streams, Some(raw.n_hit_keys))
    }
}

impl FromIterator<Hit> for InputData {
    /// Collects hits into a single-stream input.
    fn from_iter<I: IntoIterator<Item = Hit>>(iter: I) -> Self {
        let mut builder = InputDataBuilder::default();
        builder.push_stream(iter);
        let n_hit_keys = builder
            .hits
            .iter()
            .map(|hit| hit.max_key() as usize + 1)
            .max()
            .unwrap_or(0);
        InputData {
            hits: builder.hits,
            streams: builder.streams,
            n_hit_keys,
        }
    }
}
