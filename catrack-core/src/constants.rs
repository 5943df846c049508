//! Physics constants used by the time gating.

/// Proton mass [GeV/c²].
pub const PROTON_MASS: f64 = 0.938_272_088_16;

/// Pion mass [GeV/c²].
pub const PION_MASS: f64 = 0.139_570_391_8;

/// Muon mass [GeV/c²].
pub const MUON_MASS: f64 = 0.105_658_375_523;

/// Electron mass [GeV/c²].
pub const ELECTRON_MASS: f64 = 0.000_510_998_950_001_5;

/// Speed of light [cm/ns].
pub const SPEED_OF_LIGHT: f64 = 29.979_245_8;

/// Inverse speed of light [ns/cm].
pub const SPEED_OF_LIGHT_INV: f64 = 1.0 / SPEED_OF_LIGHT;
