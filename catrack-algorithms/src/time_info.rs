//! Hit time gating.
//!
//! For every hit the feasible interval of the event time that produced it is
//! derived from the hit time, its uncertainty and the time-of-flight bounds
//! from the target. Running extrema along each time-ordered stream then give
//! the monotone bounds used to skip whole prefixes and suffixes of a stream.

use crate::keys::HitKeyFlags;
use catrack_core::config::{GatingConfig, Parameters};
use catrack_core::constants::SPEED_OF_LIGHT_INV;
use catrack_core::hit::{Hit, HitIndex};
use catrack_core::input::InputData;

/// Time bounds of one hit [ns].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HitTimeInfo {
    /// Earliest event time that could have produced the hit.
    pub event_time_min: f64,
    /// Latest event time that could have produced the hit.
    pub event_time_max: f64,
    /// Largest `event_time_max` among this and all earlier hits of the stream.
    pub max_time_before_hit: f64,
    /// Smallest `event_time_min` among this and all later unused hits of the stream.
    pub min_time_after_hit: f64,
}

impl Default for HitTimeInfo {
    fn default() -> Self {
        Self {
            event_time_min: f64::NEG_INFINITY,
            event_time_max: f64::INFINITY,
            max_time_before_hit: f64::NEG_INFINITY,
            min_time_after_hit: f64::INFINITY,
        }
    }
}

/// Result of gating a timeslice.
#[derive(Debug, Clone, Default)]
pub struct TimesliceTiming {
    /// Time bounds per hit, indexed by hit index.
    pub hit_info: Vec<HitTimeInfo>,
    /// Start of the timeslice: smallest `event_time_max` of accepted hits.
    pub start: f64,
    /// End of the timeslice: largest `event_time_min` of accepted hits,
    /// clamped to `[start, start + max_timeslice_length]`.
    pub end: f64,
    /// Hits over all streams.
    pub n_hits_total: usize,
    /// Indices of hits rejected for an unphysical time.
    pub bogus_hits: Vec<HitIndex>,
}

impl TimesliceTiming {
    /// Time bounds of one hit.
    #[inline]
    #[must_use]
    pub fn info(&self, index: HitIndex) -> &HitTimeInfo {
        &self.hit_info[index as usize]
    }

    /// Number of accepted hits.
    #[must_use]
    pub fn n_hits_accepted(&self) -> usize {
        self.n_hits_total - self.bogus_hits.len()
    }
}

/// Computes the event time interval of hits from their time of flight.
#[derive(Debug, Clone)]
pub struct HitTimeGate<'a> {
    params: &'a Parameters,
    gating: GatingConfig,
    /// sqrt(1 + m²/p²) for the slowest accepted particle.
    pre_factor: f64,
}

impl<'a> HitTimeGate<'a> {
    /// Creates a gate for a particle of mass `mass` [GeV/c²].
    #[must_use]
    pub fn new(params: &'a Parameters, gating: GatingConfig, mass: f64) -> Self {
        let p = gating.min_momentum;
        let pre_factor = (1.0 + mass * mass / (p * p)).sqrt();
        Self {
            params,
            gating,
            pre_factor,
        }
    }

    /// Feasible event time interval `(min, max)` of a hit.
    ///
    /// Returns `None` for hits on a station outside the setup.
    #[must_use]
    pub fn event_time_interval(&self, hit: &Hit) -> Option<(f64, f64)> {
        let station = self.params.stations.get(hit.station)?;
        if !station.time_info {
            return Some((-self.gating.no_time_bound, self.gating.no_time_bound));
        }
        let dist = hit.distance_to(self.params.target);
        let tof_min = dist * SPEED_OF_LIGHT_INV;
        let tof_max = self.gating.tof_max_factor * dist * self.pre_factor * SPEED_OF_LIGHT_INV;
        Some((
            hit.t - hit.range_t - tof_max,
            hit.t + hit.range_t - tof_min,
        ))
    }

    /// Returns true if an interval cannot belong to this timeslice.
    #[must_use]
    pub fn is_bogus(&self, event_time_min: f64, event_time_max: f64) -> bool {
        !event_time_min.is_finite()
            || !event_time_max.is_finite()
            || event_time_min > self.gating.bogus_event_time_max
            || event_time_max < self.gating.bogus_event_time_min
    }

    /// Gates every hit of the input.
    ///
    /// Bogus hits and hits on unknown stations have both keys flagged in
    /// `used`, are listed in [`TimesliceTiming::bogus_hits`] and take no
    /// part in the timeslice bounds or the running extrema.
    pub fn compute(&self, input: &InputData, used: &mut HitKeyFlags) -> TimesliceTiming {
        let n_hits = input.hit_count();
        let mut hit_info = vec![HitTimeInfo::default(); n_hits];
        let mut bogus_hits = Vec::new();
        let mut start = f64::INFINITY;
        let mut end = f64::NEG_INFINITY;

        for stream in 0..input.n_streams() {
            let range = input.stream_range(stream);

            let mut max_time_before_hit = f64::NEG_INFINITY;
            for index in range.clone() {
                let hit = input.hit(index);
                let interval = self.event_time_interval(hit);
                let Some((event_time_min, event_time_max)) =
                    interval.filter(|&(lo, hi)| !self.is_bogus(lo, hi))
                else {
                    match interval {
                        None => log::error!(
                            "hit {index} is on unknown station {} ({} active), skipped",
                            hit.station,
                            self.params.n_stations_active()
                        ),
                        Some((lo, hi)) => log::error!(
                            "bogus hit {index} in stream {stream}: {hit}, event time [{lo}, {hi}] ns, skipped"
                        ),
                    }
                    used.mark_hit(hit);
                    bogus_hits.push(index);
                    continue;
                };

                max_time_before_hit = max_time_before_hit.max(event_time_max);
                start = start.min(event_time_max);
                end = end.max(event_time_min);
                hit_info[index as usize] = HitTimeInfo {
                    event_time_min,
                    event_time_max,
                    max_time_before_hit,
                    min_time_after_hit: event_time_min,
                };
            }

            let mut min_time_after_hit = f64::INFINITY;
            for index in range.rev() {
                if used.is_hit_used(input.hit(index)) {
                    continue;
                }
                let info = &mut hit_info[index as usize];
                min_time_after_hit = min_time_after_hit.min(info.event_time_min);
                info.min_time_after_hit = min_time_after_hit;
            }
        }

        if start.is_infinite() {
            // no accepted hits
            start = 0.0;
            end = 0.0;
        }
        let end = end.clamp(start, start + self.gating.max_timeslice_length);

        TimesliceTiming {
            hit_info,
            start,
            end,
            n_hits_total: n_hits,
            bogus_hits,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use catrack_core::config::StationParams;
    use catrack_core::constants::PROTON_MASS;

    fn params() -> Parameters {
        Parameters::new(
            [0.0; 3],
            vec![
                StationParams::new(10.0),
                StationParams::new(20.0),
                StationParams::without_time(30.0),
            ],
        )
    }

    fn input_of(streams: Vec<Vec<Hit>>) -> InputData {
        let mut builder = InputData::builder(0);
        for hits in streams {
            builder.push_stream(hits);
        }
        builder.build().unwrap()
    }

    #[test]
    fn test_event_time_interval() {
        let params = params();
        let gate = HitTimeGate::new(&params, GatingConfig::default(), PROTON_MASS);

        let hit = Hit::new(0, 0.0, 0.0, 10.0, 100.0, 0).with_range_t(2.0);
        let (lo, hi) = gate.event_time_interval(&hit).unwrap();

        let pre_factor = (1.0 + PROTON_MASS * PROTON_MASS / 0.01).sqrt();
        let tof_min = 10.0 * SPEED_OF_LIGHT_INV;
        let tof_max = 1.5 * 10.0 * pre_factor * SPEED_OF_LIGHT_INV;
        assert_relative_eq!(lo, 100.0 - 2.0 - tof_max, epsilon = 1e-9);
        assert_relative_eq!(hi, 100.0 + 2.0 - tof_min, epsilon = 1e-9);
        assert!(lo < hi);

        let untimed = Hit::new(2, 0.0, 0.0, 30.0, 5.0, 1);
        assert_eq!(gate.event_time_interval(&untimed), Some((-1.0e10, 1.0e10)));

        let unknown = Hit::new(7, 0.0, 0.0, 30.0, 5.0, 1);
        assert_eq!(gate.event_time_interval(&unknown), None);
    }

    #[test]
    fn test_running_extrema_are_monotone() {
        let params = params();
        let gate = HitTimeGate::new(&params, GatingConfig::default(), PROTON_MASS);
        let hits: Vec<Hit> = [10.0, 30.0, 20.0, 55.0, 40.0]
            .iter()
            .zip(0u32..)
            .map(|(&t, key)| {
                let range_t = if key == 2 { 15.0 } else { 1.0 };
                Hit::new(0, 0.0, 0.0, 10.0, t, key).with_range_t(range_t)
            })
            .collect();
        let input = input_of(vec![hits]);
        let mut used = HitKeyFlags::new(input.n_hit_keys());
        let timing = gate.compute(&input, &mut used);

        let infos: Vec<HitTimeInfo> = input
            .stream_range(0)
            .map(|i| *timing.info(i))
            .collect();
        for pair in infos.windows(2) {
            assert!(pair[0].max_time_before_hit <= pair[1].max_time_before_hit);
            assert!(pair[0].min_time_after_hit <= pair[1].min_time_after_hit);
        }
        for info in &infos {
            assert!(info.max_time_before_hit >= info.event_time_max);
            assert!(info.min_time_after_hit <= info.event_time_min);
        }
        assert!(timing.bogus_hits.is_empty());
        assert_eq!(used.count_used(), 0);
    }

    #[test]
    fn test_timeslice_bounds() {
        let params = params();
        let gate = HitTimeGate::new(&params, GatingConfig::default(), PROTON_MASS);
        let input = input_of(vec![
            vec![
                Hit::new(0, 0.0, 0.0, 10.0, 100.0, 0),
                Hit::new(0, 0.0, 0.0, 10.0, 900.0, 1),
            ],
            vec![Hit::new(1, 0.0, 0.0, 20.0, 500.0, 2)],
        ]);
        let mut used = HitKeyFlags::new(input.n_hit_keys());
        let timing = gate.compute(&input, &mut used);

        let start = input
            .stream_range(0)
            .chain(input.stream_range(1))
            .map(|i| timing.info(i).event_time_max)
            .fold(f64::INFINITY, f64::min);
        let end = input
            .stream_range(0)
            .chain(input.stream_range(1))
            .map(|i| timing.info(i).event_time_min)
            .fold(f64::NEG_INFINITY, f64::max);
        assert_relative_eq!(timing.start, start);
        assert_relative_eq!(timing.end, end);
        assert_eq!(timing.n_hits_total, 3);
        assert_eq!(timing.n_hits_accepted(), 3);
    }

    #[test]
    fn test_timeslice_length_is_clamped() {
        let params = params();
        let gating = GatingConfig::default().with_max_timeslice_length(1_000.0);
        let gate = HitTimeGate::new(&params, gating, PROTON_MASS);
        let input = input_of(vec![vec![
            Hit::new(0, 0.0, 0.0, 10.0, 0.0, 0),
            Hit::new(0, 0.0, 0.0, 10.0, 50_000.0, 1),
        ]]);
        let mut used = HitKeyFlags::new(input.n_hit_keys());
        let timing = gate.compute(&input, &mut used);
        assert_relative_eq!(timing.end, timing.start + 1_000.0);
    }

    #[test]
    fn test_bogus_hits_are_flagged() {
        let params = params();
        let gate = HitTimeGate::new(&params, GatingConfig::default(), PROTON_MASS);
        let input = input_of(vec![vec![
            Hit::new(0, 0.0, 0.0, 10.0, -1_000.0, 0).with_keys(0, 1),
            Hit::new(0, 0.0, 0.0, 10.0, 100.0, 2).with_keys(2, 3),
            Hit::new(0, 0.0, 0.0, 10.0, 1.0e12, 4).with_keys(4, 5),
        ]]);
        let mut used = HitKeyFlags::new(input.n_hit_keys());
        let timing = gate.compute(&input, &mut used);

        assert_eq!(timing.bogus_hits, vec![0, 2]);
        assert!(used.is_used(0) && used.is_used(1));
        assert!(used.is_used(4) && used.is_used(5));
        assert!(!used.is_used(2) && !used.is_used(3));

        let good = timing.info(1);
        assert_relative_eq!(timing.start, good.event_time_max);
        assert_relative_eq!(timing.end, good.event_time_min.max(timing.start));
        assert_relative_eq!(good.min_time_after_hit, good.event_time_min);
    }

    #[test]
    fn test_all_hits_bogus() {
        let params = params();
        let gate = HitTimeGate::new(&params, GatingConfig::default(), PROTON_MASS);
        let input = input_of(vec![vec![Hit::new(0, 0.0, 0.0, 10.0, 1.0e12, 0)]]);
        let mut used = HitKeyFlags::new(input.n_hit_keys());
        let timing = gate.compute(&input, &mut used);
        assert_eq!(timing.bogus_hits.len(), 1);
        assert_relative_eq!(timing.start, 0.0);
        assert_relative_eq!(timing.end, 0.0);
    }
}
