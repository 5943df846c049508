//! Straight-line track following.
//!
//! A simple [`TrackKernel`] for field-free setups: every unclaimed hit seeds
//! a candidate that is extrapolated station by station along the line from
//! the target (or from the two last hits), picking the closest compatible
//! hit on each station. Candidates long enough are fitted and kept; their
//! hits are claimed for the rest of the call.

use crate::kernel::{KernelOutput, TrackKernel, WindowSelection};
use crate::keys::HitKeyFlags;
use catrack_core::config::Parameters;
use catrack_core::constants::SPEED_OF_LIGHT_INV;
use catrack_core::hit::{Hit, HitIndex, HitKey};
use catrack_core::input::InputData;
use catrack_core::track::TrackParam;

/// Settings of the line-following kernel.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LineFollowConfig {
    /// Largest transverse distance between prediction and hit [cm].
    pub max_residual: f64,
    /// Largest deviation from the expected flight time between stations [ns].
    pub max_time_diff: f64,
    /// Shortest accepted track.
    pub min_hits: usize,
    /// Consecutive stations without a hit before a candidate is closed.
    pub max_missed_stations: usize,
    /// Position uncertainty used in the fit quality [cm].
    pub position_error: f64,
}

impl Default for LineFollowConfig {
    fn default() -> Self {
        Self {
            max_residual: 0.5,
            max_time_diff: 20.0,
            min_hits: 3,
            max_missed_stations: 1,
            position_error: 0.05,
        }
    }
}

impl LineFollowConfig {
    /// Sets the largest transverse residual.
    #[must_use]
    pub fn with_max_residual(mut self, max_residual: f64) -> Self {
        self.max_residual = max_residual;
        self
    }

    /// Sets the time compatibility window.
    #[must_use]
    pub fn with_max_time_diff(mut self, max_time_diff: f64) -> Self {
        self.max_time_diff = max_time_diff;
        self
    }

    /// Sets the shortest accepted track.
    #[must_use]
    pub fn with_min_hits(mut self, min_hits: usize) -> Self {
        self.min_hits = min_hits.max(2);
        self
    }
}

/// Straight-line track finder.
#[derive(Debug, Clone)]
pub struct LineFollowKernel {
    config: LineFollowConfig,
    target: [f64; 3],
    station_timed: Vec<bool>,
    claimed: HitKeyFlags,
    claimed_keys: Vec<HitKey>,
    candidate: Vec<HitIndex>,
}

impl LineFollowKernel {
    /// Creates a kernel for the given setup.
    #[must_use]
    pub fn new(params: &Parameters, config: LineFollowConfig) -> Self {
        Self {
            config,
            target: params.target,
            station_timed: params.stations.iter().map(|s| s.time_info).collect(),
            claimed: HitKeyFlags::default(),
            claimed_keys: Vec::new(),
            candidate: Vec::new(),
        }
    }

    /// Kernel settings.
    #[must_use]
    pub fn config(&self) -> &LineFollowConfig {
        &self.config
    }

    fn is_taken(&self, selection: &WindowSelection<'_>, hit: &Hit) -> bool {
        selection.used.is_hit_used(hit) || self.claimed.is_hit_used(hit)
    }

    fn is_timed(&self, station: usize) -> bool {
        self.station_timed.get(station).copied().unwrap_or(false)
    }

    fn claim(&mut self, hit: &Hit) {
        self.claimed.mark_hit(hit);
        self.claimed_keys.push(hit.front_key);
        self.claimed_keys.push(hit.back_key);
    }

    /// Extends the candidate seeded by `seed` over the following stations.
    fn follow(
        &mut self,
        input: &InputData,
        selection: &WindowSelection<'_>,
        seed_station: usize,
        seed: HitIndex,
    ) {
        self.candidate.clear();
        self.candidate.push(seed);
        let mut missed = 0;

        for station in seed_station + 1..selection.station_hits.len() {
            let last = input.hit(self.candidate[self.candidate.len() - 1]);
            let origin = match self.candidate.len() {
                1 => self.target,
                n => {
                    let prev = input.hit(self.candidate[n - 2]);
                    [prev.x, prev.y, prev.z]
                }
            };
            let (tx, ty) = slopes(origin, last);
            let timed = self.is_timed(last.station);

            let mut best: Option<(HitIndex, f64)> = None;
            for &index in &selection.station_hits[station] {
                let hit = input.hit(index);
                if self.is_taken(selection, hit) {
                    continue;
                }
                let step = hit.z - last.z;
                let residual = (hit.x - last.x - tx * step).hypot(hit.y - last.y - ty * step);
                if residual > self.config.max_residual {
                    continue;
                }
                if timed && self.is_timed(hit.station) {
                    let flight = step.abs() * (1.0 + tx * tx + ty * ty).sqrt() * SPEED_OF_LIGHT_INV;
                    if (hit.t - last.t - flight).abs() > self.config.max_time_diff {
                        continue;
                    }
                }
                if !matches!(best, Some((_, r)) if r <= residual) {
                    best = Some((index, residual));
                }
            }

            if let Some((index, _)) = best {
                self.candidate.push(index);
                missed = 0;
            } else {
                missed += 1;
                if missed > self.config.max_missed_stations {
                    break;
                }
            }
        }
    }

    /// Least-squares straight line through the candidate.
    fn fit(&self, input: &InputData) -> (TrackParam, TrackParam) {
        let hits: Vec<&Hit> = self.candidate.iter().map(|&i| input.hit(i)).collect();
        let (mz, mx, my) = (
            mean(&hits, |h| h.z),
            mean(&hits, |h| h.x),
            mean(&hits, |h| h.y),
        );

        let szz: f64 = hits.iter().map(|h| (h.z - mz).powi(2)).sum();
        let (tx, ty) = if szz > f64::EPSILON {
            (
                hits.iter().map(|h| (h.z - mz) * (h.x - mx)).sum::<f64>() / szz,
                hits.iter().map(|h| (h.z - mz) * (h.y - my)).sum::<f64>() / szz,
            )
        } else {
            (0.0, 0.0)
        };

        let sigma2 = self.config.position_error.powi(2);
        let chi2: f64 = hits
            .iter()
            .map(|h| {
                let dx = h.x - (mx + tx * (h.z - mz));
                let dy = h.y - (my + ty * (h.z - mz));
                (dx * dx + dy * dy) / sigma2
            })
            .sum();
        let ndf = u32::try_from((2 * hits.len()).saturating_sub(4)).unwrap_or(u32::MAX);

        let param_at = |hit: &Hit| TrackParam {
            x: mx + tx * (hit.z - mz),
            y: my + ty * (hit.z - mz),
            z: hit.z,
            tx,
            ty,
            qp: 0.0,
            t: hit.t,
            chi2,
            ndf,
        };
        (param_at(hits[0]), param_at(hits[hits.len() - 1]))
    }
}

#[allow(clippy::cast_precision_loss)]
fn mean(hits: &[&Hit], value: impl Fn(&Hit) -> f64) -> f64 {
    hits.iter().map(|h| value(h)).sum::<f64>() / hits.len() as f64
}

fn slopes(origin: [f64; 3], hit: &Hit) -> (f64, f64) {
    let dz = hit.z - origin[2];
    if dz.abs() < f64::EPSILON {
        return (0.0, 0.0);
    }
    ((hit.x - origin[0]) / dz, (hit.y - origin[1]) / dz)
}

impl TrackKernel for LineFollowKernel {
    fn name(&self) -> &'static str {
        "line-follow"
    }

    fn init_timeslice(&mut self, n_hit_keys: usize) {
        self.claimed.reset(n_hit_keys);
        self.claimed_keys.clear();
    }

    fn run_on_selection(
        &mut self,
        input: &InputData,
        selection: &WindowSelection<'_>,
        output: &mut KernelOutput,
    ) {
        let n_stations = selection.station_hits.len();
        let min_hits = self.config.min_hits.max(2);

        for seed_station in 0..n_stations.saturating_sub(min_hits - 1) {
            for &seed in &selection.station_hits[seed_station] {
                if self.is_taken(selection, input.hit(seed)) {
                    continue;
                }
                self.follow(input, selection, seed_station, seed);
                if self.candidate.len() < min_hits {
                    continue;
                }
                let (param_first, param_last) = self.fit(input);
                output.push_track(&self.candidate, param_first, param_last);
                let candidate = std::mem::take(&mut self.candidate);
                for &index in &candidate {
                    self.claim(input.hit(index));
                }
                self.candidate = candidate;
            }
        }

        for key in self.claimed_keys.drain(..) {
            self.claimed.set(key, false);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::time_info::HitTimeInfo;
    use approx::assert_relative_eq;

    fn params() -> Parameters {
        Parameters::uniform(4, 10.0, 10.0)
    }

    /// Hits of a straight track from the target with slopes `(tx, ty)` at time `t0`.
    fn track_hits(params: &Parameters, tx: f64, ty: f64, t0: f64, first_key: HitKey) -> Vec<Hit> {
        (0u32..)
            .zip(&params.stations)
            .enumerate()
            .map(|(station, (i, st))| {
                let path = st.z * (1.0 + tx * tx + ty * ty).sqrt();
                let t = t0 + path * SPEED_OF_LIGHT_INV;
                Hit::new(station, tx * st.z, ty * st.z, st.z, t, first_key + i)
            })
            .collect()
    }

    struct Fixture {
        input: InputData,
        station_hits: Vec<Vec<HitIndex>>,
        hit_info: Vec<HitTimeInfo>,
    }

    impl Fixture {
        fn new(params: &Parameters, hits: Vec<Hit>) -> Self {
            let mut streams: Vec<Vec<Hit>> = vec![Vec::new(); params.n_stations_active()];
            for hit in hits {
                streams[hit.station].push(hit);
            }
            let mut builder = InputData::builder(0);
            for stream in streams {
                builder.push_stream(stream);
            }
            let input = builder.build().unwrap();

            let mut station_hits: Vec<Vec<HitIndex>> =
                vec![Vec::new(); params.n_stations_active()];
            for stream in 0..input.n_streams() {
                for index in input.stream_range(stream) {
                    station_hits[input.hit(index).station].push(index);
                }
            }
            let hit_info = vec![HitTimeInfo::default(); input.hit_count()];
            Self {
                input,
                station_hits,
                hit_info,
            }
        }

        fn run_with(&self, kernel: &mut LineFollowKernel, used: &HitKeyFlags) -> KernelOutput {
            let selection = WindowSelection {
                station_hits: &self.station_hits,
                used,
                hit_info: &self.hit_info,
                start: 0.0,
                end: 100.0,
            };
            let mut output = KernelOutput::default();
            kernel.run_on_selection(&self.input, &selection, &mut output);
            output
        }
    }

    fn run(params: &Parameters, hits: Vec<Hit>, used: &HitKeyFlags) -> (InputData, KernelOutput) {
        let fixture = Fixture::new(params, hits);
        let mut kernel = LineFollowKernel::new(params, LineFollowConfig::default());
        kernel.init_timeslice(fixture.input.n_hit_keys());
        let output = fixture.run_with(&mut kernel, used);
        (fixture.input, output)
    }

    #[test]
    fn test_finds_separated_tracks() {
        let params = params();
        let mut hits = track_hits(&params, 0.1, 0.0, 5.0, 0);
        hits.extend(track_hits(&params, -0.1, 0.05, 7.0, 10));
        let (input, output) = run(&params, hits, &HitKeyFlags::default());

        assert_eq!(output.len(), 2);
        for track in &output.tracks {
            assert_eq!(track.n_hits, 4);
            let keys: Vec<HitKey> = track
                .hits(&output.hit_indices)
                .iter()
                .map(|&i| input.hit(i).front_key / 10)
                .collect();
            assert!(keys.iter().all(|&k| k == keys[0]));
        }
        let first = &output.tracks[0];
        assert_relative_eq!(first.param_first.z, 10.0);
        assert_relative_eq!(first.param_last.z, 40.0);
        assert_relative_eq!(first.param_first.chi2, 0.0, epsilon = 1e-9);
        assert_eq!(first.param_first.ndf, 4);
    }

    #[test]
    fn test_rejects_time_incompatible_hits() {
        let params = params();
        let mut hits = track_hits(&params, 0.1, 0.1, 5.0, 0);
        hits[2].t += 500.0;
        hits[3].t += 500.0;
        let (_, output) = run(&params, hits, &HitKeyFlags::default());
        assert!(output.is_empty());
    }

    #[test]
    fn test_skips_used_hits() {
        let params = params();
        let hits = track_hits(&params, 0.0, 0.2, 5.0, 0);
        let mut used = HitKeyFlags::new(4);
        used.set(1, true);
        used.set(2, true);
        let (_, output) = run(&params, hits, &used);
        assert!(output.is_empty());
    }

    #[test]
    fn test_claims_are_released_between_calls() {
        let params = params();
        let fixture = Fixture::new(&params, track_hits(&params, 0.05, 0.05, 5.0, 0));
        let mut kernel = LineFollowKernel::new(&params, LineFollowConfig::default());
        kernel.init_timeslice(fixture.input.n_hit_keys());

        let first = fixture.run_with(&mut kernel, &HitKeyFlags::default());
        let second = fixture.run_with(&mut kernel, &HitKeyFlags::default());
        assert_eq!(first.len(), 1);
        assert_eq!(first, second);
    }
}
