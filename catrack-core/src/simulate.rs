//! Synthetic timeslice generation.
//!
//! Events are spread over time at a configurable mean interval. Each event
//! emits straight tracks from the target that cross every station; the hit
//! time is the event time plus the flight time at the speed of light, smeared
//! within the station time resolution. Each station is read out as one
//! time-ordered stream. The true track of every hit is kept, addressed by the
//! hit `id`.

use crate::config::Parameters;
use crate::constants::SPEED_OF_LIGHT_INV;
use crate::error::{Error, Result};
use crate::hit::{Hit, HitKey};
use crate::input::InputData;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Settings of the generator.
#[derive(Debug, Clone)]
pub struct SimulationConfig {
    /// Number of events.
    pub n_events: usize,
    /// Mean time between consecutive events [ns].
    pub event_interval: f64,
    /// Time of the first event [ns].
    pub first_event_time: f64,
    /// Tracks per event (inclusive range).
    pub tracks_per_event: (usize, usize),
    /// Largest absolute track slope.
    pub max_slope: f64,
    /// Half-width of the hit time smearing and uncertainty [ns].
    pub time_resolution: f64,
    /// Uniform noise hits per station over the whole timeslice.
    pub noise_hits_per_station: usize,
    /// Hits with an unphysical timestamp, spread over the stations.
    pub n_bogus_hits: usize,
    /// Random seed.
    pub seed: u64,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            n_events: 100,
            event_interval: 1_000.0,
            first_event_time: 0.0,
            tracks_per_event: (1, 5),
            max_slope: 0.3,
            time_resolution: 5.0,
            noise_hits_per_station: 0,
            n_bogus_hits: 0,
            seed: 42,
        }
    }
}

impl SimulationConfig {
    /// Sets the number of events.
    #[must_use]
    pub fn with_events(mut self, n_events: usize) -> Self {
        self.n_events = n_events;
        self
    }

    /// Sets the mean event interval.
    #[must_use]
    pub fn with_event_interval(mut self, interval: f64) -> Self {
        self.event_interval = interval;
        self
    }

    /// Sets the track multiplicity range.
    #[must_use]
    pub fn with_tracks_per_event(mut self, min: usize, max: usize) -> Self {
        self.tracks_per_event = (min, max);
        self
    }

    /// Sets the number of noise hits per station.
    #[must_use]
    pub fn with_noise(mut self, hits_per_station: usize) -> Self {
        self.noise_hits_per_station = hits_per_station;
        self
    }

    /// Sets the number of bogus hits.
    #[must_use]
    pub fn with_bogus_hits(mut self, n_bogus_hits: usize) -> Self {
        self.n_bogus_hits = n_bogus_hits;
        self
    }

    /// Sets the random seed.
    #[must_use]
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }
}

/// Generated input together with its truth information.
#[derive(Debug, Clone)]
pub struct SimulatedTimeslice {
    /// Hits organised in one stream per station.
    pub input: InputData,
    /// True track of each hit, indexed by `Hit::id`; `None` for noise and bogus hits.
    pub true_track: Vec<Option<u32>>,
    /// Number of generated tracks.
    pub n_true_tracks: usize,
    /// Time of each event [ns].
    pub event_times: Vec<f64>,
}

impl SimulatedTimeslice {
    /// True track of a hit.
    #[must_use]
    pub fn true_track_of(&self, hit: &Hit) -> Option<u32> {
        self.true_track.get(hit.id as usize).copied().flatten()
    }
}

/// Timestamp given to bogus hits [ns].
pub const BOGUS_HIT_TIME: f64 = 1.0e12;

/// Generates a synthetic timeslice for the given detector setup.
///
/// # Errors
/// Returns [`Error::ConfigError`] for an empty setup or an inverted
/// multiplicity range, and propagates input building errors.
pub fn simulate_timeslice(
    params: &Parameters,
    config: &SimulationConfig,
) -> Result<SimulatedTimeslice> {
    params.validate()?;
    let (min_tracks, max_tracks) = config.tracks_per_event;
    if min_tracks > max_tracks {
        return Err(Error::ConfigError(format!(
            "invalid track multiplicity range {min_tracks}..={max_tracks}"
        )));
    }

    let mut rng = StdRng::seed_from_u64(config.seed);
    let n_stations = params.n_stations_active();
    let mut station_hits: Vec<Vec<Hit>> = vec![Vec::new(); n_stations];
    let mut true_track: Vec<Option<u32>> = Vec::new();
    let mut event_times = Vec::with_capacity(config.n_events);
    let mut n_true_tracks = 0u32;

    let mut event_time = config.first_event_time;
    for _ in 0..config.n_events {
        event_times.push(event_time);
        let n_tracks = rng.gen_range(min_tracks..=max_tracks);
        for _ in 0..n_tracks {
            let tx = rng.gen_range(-config.max_slope..=config.max_slope);
            let ty = rng.gen_range(-config.max_slope..=config.max_slope);
            for (station, st) in params.stations.iter().enumerate() {
                let dz = st.z - params.target[2];
                let x = params.target[0] + tx * dz;
                let y = params.target[1] + ty * dz;
                let path = (1.0 + tx * tx + ty * ty).sqrt() * dz.abs();
                let dt = smear(&mut rng, config.time_resolution);
                let t = event_time + path * SPEED_OF_LIGHT_INV + dt;
                let (id, front, back) = register_hit(&mut true_track, Some(n_true_tracks));
                station_hits[station].push(
                    Hit::new(station, x, y, st.z, t, front)
                        .with_keys(front, back)
                        .with_range_t(config.time_resolution)
                        .with_id(id),
                );
            }
            n_true_tracks += 1;
        }
        event_time += config.event_interval * rng.gen_range(0.5..1.5);
    }

    let last_time = event_time.max(config.first_event_time + config.event_interval);
    for (station, st) in params.stations.iter().enumerate() {
        let half_width = (config.max_slope * (st.z - params.target[2])).abs().max(1.0);
        for _ in 0..config.noise_hits_per_station {
            let x = rng.gen_range(-half_width..=half_width);
            let y = rng.gen_range(-half_width..=half_width);
            let t = rng.gen_range(config.first_event_time..last_time);
            let (id, front, back) = register_hit(&mut true_track, None);
            station_hits[station].push(
                Hit::new(station, x, y, st.z, t, front)
                    .with_keys(front, back)
                    .with_range_t(config.time_resolution)
                    .with_id(id),
            );
        }
    }

    for _ in 0..config.n_bogus_hits {
        let station = rng.gen_range(0..n_stations);
        let z = params.stations[station].z;
        let (id, front, back) = register_hit(&mut true_track, None);
        station_hits[station].push(
            Hit::new(station, 0.0, 0.0, z, BOGUS_HIT_TIME, front)
                .with_keys(front, back)
                .with_range_t(config.time_resolution)
                .with_id(id),
        );
    }

    let total = station_hits.iter().map(Vec::len).sum();
    let mut builder = InputData::builder(total);
    for hits in station_hits {
        builder.push_stream(hits);
    }

    Ok(SimulatedTimeslice {
        input: builder.build()?,
        true_track,
        n_true_tracks: n_true_tracks as usize,
        event_times,
    })
}

fn register_hit(true_track: &mut Vec<Option<u32>>, track: Option<u32>) -> (u32, HitKey, HitKey) {
    let id = u32::try_from(true_track.len()).unwrap_or(u32::MAX);
    true_track.push(track);
    (id, 2 * id, 2 * id + 1)
}

fn smear(rng: &mut StdRng, half_width: f64) -> f64 {
    if half_width > 0.0 {
        rng.gen_range(-half_width..=half_width)
    } else {
        0.0
    }
}
