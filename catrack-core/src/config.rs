//! Detector parameters and track-finder configuration.

use crate::constants::PROTON_MASS;
use crate::error::{Error, Result};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Static description of one tracking station.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct StationParams {
    /// Nominal z position [cm].
    pub z: f64,
    /// Whether the station measures absolute hit time.
    pub time_info: bool,
}

impl StationParams {
    /// Creates a station with time measurement.
    #[must_use]
    pub fn new(z: f64) -> Self {
        Self { z, time_info: true }
    }

    /// Creates a station without time measurement.
    #[must_use]
    pub fn without_time(z: f64) -> Self {
        Self {
            z,
            time_info: false,
        }
    }
}

/// Read-only detector setup.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Parameters {
    /// Target position [cm].
    pub target: [f64; 3],
    /// Active stations ordered by z.
    pub stations: Vec<StationParams>,
}

impl Parameters {
    /// Creates parameters for a target at `target` and the given stations.
    #[must_use]
    pub fn new(target: [f64; 3], stations: Vec<StationParams>) -> Self {
        Self { target, stations }
    }

    /// Equidistant timed stations starting at `first_z` with spacing `dz`.
    #[must_use]
    pub fn uniform(n_stations: usize, first_z: f64, dz: f64) -> Self {
        #[allow(clippy::cast_precision_loss)]
        let stations = (0..n_stations)
            .map(|i| StationParams::new(first_z + dz * i as f64))
            .collect();
        Self {
            target: [0.0; 3],
            stations,
        }
    }

    /// Number of active stations.
    #[must_use]
    pub fn n_stations_active(&self) -> usize {
        self.stations.len()
    }

    /// Returns a station.
    ///
    /// # Panics
    /// Panics if the station index is out of range.
    #[must_use]
    pub fn station(&self, index: usize) -> &StationParams {
        &self.stations[index]
    }

    /// Checks that the setup is usable.
    ///
    /// # Errors
    /// Returns [`Error::ConfigError`] if there are no stations or a position is not finite.
    pub fn validate(&self) -> Result<()> {
        if self.stations.is_empty() {
            return Err(Error::ConfigError("no active stations".into()));
        }
        if self.target.iter().any(|v| !v.is_finite()) {
            return Err(Error::ConfigError("target position is not finite".into()));
        }
        if let Some(i) = self.stations.iter().position(|s| !s.z.is_finite()) {
            return Err(Error::ConfigError(format!(
                "station {i} has a non-finite z position"
            )));
        }
        Ok(())
    }
}

/// Tracking mode of the experiment setup.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum TrackingMode {
    /// Silicon tracker only.
    #[default]
    Sts,
    /// Full setup with all tracking detectors.
    Global,
    /// High-rate triggerless demonstrator setup.
    Mcbm,
}

/// Sub-window length and pile-up ceiling.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct WindowConfig {
    /// Length of one sub-window [ns].
    pub window_length: f64,
    /// Hits per station per window above which the station is treated as a
    /// monster event. `None` disables the cut.
    pub max_station_hits_per_window: Option<usize>,
}

impl WindowConfig {
    /// Hit rate ceiling per station used in the high-rate mode [hits/us].
    pub const MCBM_HITS_PER_US: f64 = 50.0;

    /// Default window settings for a tracking mode.
    #[must_use]
    pub fn for_mode(mode: TrackingMode) -> Self {
        match mode {
            TrackingMode::Mcbm => {
                let window_length = 500.0;
                #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
                let ceiling = (Self::MCBM_HITS_PER_US * window_length / 1.0e3) as usize;
                Self {
                    window_length,
                    max_station_hits_per_window: Some(ceiling),
                }
            }
            TrackingMode::Sts | TrackingMode::Global => Self {
                window_length: 10_000.0,
                max_station_hits_per_window: None,
            },
        }
    }

    /// Sets the window length.
    #[must_use]
    pub fn with_window_length(mut self, window_length: f64) -> Self {
        self.window_length = window_length;
        self
    }

    /// Sets the pile-up ceiling.
    #[must_use]
    pub fn with_max_station_hits(mut self, ceiling: Option<usize>) -> Self {
        self.max_station_hits_per_window = ceiling;
        self
    }

    /// Returns true if `count` hits on one station exceed the ceiling.
    #[inline]
    #[must_use]
    pub fn is_pile_up(&self, count: usize) -> bool {
        self.max_station_hits_per_window
            .is_some_and(|ceiling| count > ceiling)
    }
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self::for_mode(TrackingMode::default())
    }
}

/// Bounds of the hit time feasibility computation.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct GatingConfig {
    /// Minimal assumed momentum of a particle [GeV/c].
    pub min_momentum: f64,
    /// Safety factor applied to the slowest time of flight.
    pub tof_max_factor: f64,
    /// Hits with an earliest event time above this value are bogus [ns].
    pub bogus_event_time_max: f64,
    /// Hits with a latest event time below this value are bogus [ns].
    pub bogus_event_time_min: f64,
    /// Maximal accepted timeslice length [ns].
    pub max_timeslice_length: f64,
    /// Event time bound used for stations without time measurement [ns].
    pub no_time_bound: f64,
}

impl Default for GatingConfig {
    fn default() -> Self {
        Self {
            min_momentum: 0.1,
            tof_max_factor: 1.5,
            bogus_event_time_max: 500.0e6,
            bogus_event_time_min: -500.0,
            max_timeslice_length: 1.0e9,
            no_time_bound: 1.0e10,
        }
    }
}

impl GatingConfig {
    /// Sets the minimal assumed momentum.
    #[must_use]
    pub fn with_min_momentum(mut self, momentum: f64) -> Self {
        self.min_momentum = momentum;
        self
    }

    /// Sets the upper sanity bound of the earliest event time.
    #[must_use]
    pub fn with_bogus_event_time_max(mut self, bound: f64) -> Self {
        self.bogus_event_time_max = bound;
        self
    }

    /// Sets the maximal timeslice length.
    #[must_use]
    pub fn with_max_timeslice_length(mut self, length: f64) -> Self {
        self.max_timeslice_length = length;
        self
    }
}

/// Construction-time configuration of the track finder.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct FinderConfig {
    /// Number of worker threads.
    pub n_threads: usize,
    /// Default particle mass [GeV/c²].
    pub default_mass: f64,
    /// Tracking mode.
    pub mode: TrackingMode,
    /// Sub-window settings.
    pub window: WindowConfig,
    /// Time gating settings.
    pub gating: GatingConfig,
}

impl Default for FinderConfig {
    fn default() -> Self {
        Self::for_mode(TrackingMode::default())
    }
}

impl FinderConfig {
    /// Largest number of load-balancing windows a timeslice may span.
    pub const MAX_WINDOWS: f64 = 1.0e7;

    /// Creates a single-threaded configuration with the defaults of a mode.
    #[must_use]
    pub fn for_mode(mode: TrackingMode) -> Self {
        Self {
            n_threads: 1,
            default_mass: PROTON_MASS,
            mode,
            window: WindowConfig::for_mode(mode),
            gating: GatingConfig::default(),
        }
    }

    /// Sets the number of worker threads.
    #[must_use]
    pub fn with_threads(mut self, n_threads: usize) -> Self {
        self.n_threads = n_threads;
        self
    }

    /// Sets the default particle mass.
    #[must_use]
    pub fn with_default_mass(mut self, mass: f64) -> Self {
        self.default_mass = mass;
        self
    }

    /// Overrides the window settings.
    #[must_use]
    pub fn with_window(mut self, window: WindowConfig) -> Self {
        self.window = window;
        self
    }

    /// Overrides the gating settings.
    #[must_use]
    pub fn with_gating(mut self, gating: GatingConfig) -> Self {
        self.gating = gating;
        self
    }

    /// Checks the configuration.
    ///
    /// # Errors
    /// Returns [`Error::InvalidThreadCount`] for zero threads and
    /// [`Error::ConfigError`] for a non-positive window length or momentum,
    /// or a window too short for the maximal timeslice length.
    pub fn validate(&self) -> Result<()> {
        if self.n_threads == 0 {
            return Err(Error::InvalidThreadCount(self.n_threads));
        }
        if !is_positive(self.window.window_length) {
            return Err(Error::ConfigError(format!(
                "window length must be positive, got {}",
                self.window.window_length
            )));
        }
        if !is_positive(self.gating.min_momentum) {
            return Err(Error::ConfigError(format!(
                "minimal momentum must be positive, got {}",
                self.gating.min_momentum
            )));
        }
        if !is_positive(self.gating.max_timeslice_length) {
            return Err(Error::ConfigError(format!(
                "maximal timeslice length must be positive, got {}",
                self.gating.max_timeslice_length
            )));
        }
        let n_windows = self.gating.max_timeslice_length / self.window.window_length;
        if n_windows > Self::MAX_WINDOWS {
            return Err(Error::ConfigError(format!(
                "window length {} ns splits a {} ns timeslice into {n_windows:.0} windows (at most {})",
                self.window.window_length,
                self.gating.max_timeslice_length,
                Self::MAX_WINDOWS
            )));
        }
        Ok(())
    }
}

fn is_positive(value: f64) -> bool {
    value.is_finite() && value > 0.0
}
