//! catrack-core: Core types and monitoring for time-sliced track finding.
//!
//! This crate provides the data model shared by the track finder (hits,
//! input streams, tracks, timeslice header), the detector and finder
//! configuration, physics constants, and the counter/timer monitor.
//!

pub mod config;
pub mod constants;
pub mod error;
pub mod hit;
pub mod input;
pub mod monitor;
#[cfg(feature = "simulate")]
pub mod simulate;
pub mod track;

pub use config::{FinderConfig, GatingConfig, Parameters, StationParams, TrackingMode, WindowConfig};
pub use error::{Error, Result};
pub use hit::{Hit, HitIndex, HitKey};
pub use input::{InputData, InputDataBuilder};
pub use monitor::{
    CounterKey, Monitor, MonitorData, MonitorKey, Timer, TimerKey, TrackingMonitor,
    TrackingMonitorData,
};
pub use track::{TimesliceHeader, Track, TrackParam};
