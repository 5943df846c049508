//! Hit types for time-sliced tracking.

use std::fmt;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Global index of a hit inside an [`InputData`](crate::InputData).
pub type HitIndex = u32;

/// Identifier of a physical sensor element (strip, pad, cell).
///
/// Two hits that share a key share the same physical signal, so a key marked
/// as used removes every hit carrying it from further track finding.
pub type HitKey = u32;

/// A single detector hit.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Hit {
    /// Index of the tracking station.
    pub station: usize,
    /// X position [cm].
    pub x: f64,
    /// Y position [cm].
    pub y: f64,
    /// Z position [cm].
    pub z: f64,
    /// Measured time [ns].
    pub t: f64,
    /// Half-width of the time measurement uncertainty [ns].
    pub range_t: f64,
    /// Key of the front-side sensor element.
    pub front_key: HitKey,
    /// Key of the back-side sensor element.
    pub back_key: HitKey,
    /// External identifier (position in the detector hit container).
    pub id: u32,
}

impl Hit {
    /// Creates a hit with zero time uncertainty and both keys set to `key`.
    #[inline]
    #[must_use]
    pub fn new(station: usize, x: f64, y: f64, z: f64, t: f64, key: HitKey) -> Self {
        Self {
            station,
            x,
            y,
            z,
            t,
            range_t: 0.0,
            front_key: key,
            back_key: key,
            id: key,
        }
    }

    /// Sets the half-width of the time uncertainty.
    #[must_use]
    pub fn with_range_t(mut self, range_t: f64) -> Self {
        self.range_t = range_t;
        self
    }

    /// Sets distinct front and back keys.
    #[must_use]
    pub fn with_keys(mut self, front_key: HitKey, back_key: HitKey) -> Self {
        self.front_key = front_key;
        self.back_key = back_key;
        self
    }

    /// Sets the external identifier.
    #[must_use]
    pub fn with_id(mut self, id: u32) -> Self {
        self.id = id;
        self
    }

    /// Distance from a point to this hit [cm].
    #[inline]
    #[must_use]
    pub fn distance_to(&self, point: [f64; 3]) -> f64 {
        let dx = self.x - point[0];
        let dy = self.y - point[1];
        let dz = self.z - point[2];
        (dx * dx + dy * dy + dz * dz).sqrt()
    }

    /// Largest key referenced by this hit.
    #[inline]
    #[must_use]
    pub fn max_key(&self) -> HitKey {
        self.front_key.max(self.back_key)
    }
}

impl fmt::Display for Hit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "hit id={} station={} pos=({:.3}, {:.3}, {:.3}) cm t={:.3} ns (+-{:.3}) keys=({}, {})",
            self.id,
            self.station,
            self.x,
            self.y,
            self.z,
            self.t,
            self.range_t,
            self.front_key,
            self.back_key
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_hit_builder() {
        let hit = Hit::new(2, 1.0, 2.0, 30.0, 100.0, 7)
            .with_range_t(5.0)
            .with_keys(7, 12)
            .with_id(99);
        assert_eq!(hit.station, 2);
        assert_eq!(hit.front_key, 7);
        assert_eq!(hit.back_key, 12);
        assert_eq!(hit.max_key(), 12);
        assert_eq!(hit.id, 99);
        assert_relative_eq!(hit.range_t, 5.0);
    }

    #[test]
    fn test_hit_distance() {
        let hit = Hit::new(0, 3.0, 4.0, 12.0, 0.0, 0);
        assert_relative_eq!(hit.distance_to([0.0, 0.0, 0.0]), 13.0);
        assert_relative_eq!(hit.distance_to([3.0, 4.0, 2.0]), 10.0);
    }

    #[test]
    fn test_hit_display() {
        let hit = Hit::new(1, 0.0, 0.0, 10.0, 5.0, 3);
        let text = hit.to_string();
        assert!(text.contains("station=1"));
        assert!(text.contains("keys=(3, 3)"));
    }
}
