//! Used-flags over hit keys.

use catrack_core::hit::{Hit, HitKey};

/// One used-flag per hit key.
///
/// A hit counts as used as soon as either of its keys is flagged. The
/// orchestrator owns the primary instance for a timeslice; every worker
/// clones it and flags keys only in its private copy.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HitKeyFlags {
    flags: Vec<bool>,
}

impl HitKeyFlags {
    /// Creates `n_keys` cleared flags.
    #[must_use]
    pub fn new(n_keys: usize) -> Self {
        Self {
            flags: vec![false; n_keys],
        }
    }

    /// Clears all flags and resizes to `n_keys`.
    pub fn reset(&mut self, n_keys: usize) {
        self.flags.clear();
        self.flags.resize(n_keys, false);
    }

    /// Number of keys.
    #[must_use]
    pub fn len(&self) -> usize {
        self.flags.len()
    }

    /// Returns true if there are no keys.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.flags.is_empty()
    }

    /// Returns true if `key` is flagged. Keys outside the range are unused.
    #[inline]
    #[must_use]
    pub fn is_used(&self, key: HitKey) -> bool {
        self.flags.get(key as usize).copied().unwrap_or(false)
    }

    /// Returns true if either key of `hit` is flagged.
    #[inline]
    #[must_use]
    pub fn is_hit_used(&self, hit: &Hit) -> bool {
        self.is_used(hit.front_key) || self.is_used(hit.back_key)
    }

    /// Flags both keys of `hit`.
    #[inline]
    pub fn mark_hit(&mut self, hit: &Hit) {
        self.set(hit.front_key, true);
        self.set(hit.back_key, true);
    }

    /// Sets one flag, growing the set if needed.
    #[inline]
    pub fn set(&mut self, key: HitKey, used: bool) {
        let key = key as usize;
        if key >= self.flags.len() {
            if !used {
                return;
            }
            self.flags.resize(key + 1, false);
        }
        self.flags[key] = used;
    }

    /// Number of flagged keys.
    #[must_use]
    pub fn count_used(&self) -> usize {
        self.flags.iter().filter(|&&used| used).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hit_used_by_either_key() {
        let hit = Hit::new(0, 0.0, 0.0, 10.0, 0.0, 0).with_keys(2, 5);
        let mut flags = HitKeyFlags::new(6);
        assert!(!flags.is_hit_used(&hit));

        flags.set(5, true);
        assert!(flags.is_hit_used(&hit));
        flags.set(5, false);

        flags.mark_hit(&hit);
        assert!(flags.is_used(2));
        assert!(flags.is_used(5));
        assert_eq!(flags.count_used(), 2);
    }

    #[test]
    fn test_out_of_range_keys() {
        let mut flags = HitKeyFlags::new(2);
        assert!(!flags.is_used(10));
        flags.set(10, false);
        assert_eq!(flags.len(), 2);
        flags.set(10, true);
        assert_eq!(flags.len(), 11);
        assert!(flags.is_used(10));

        flags.reset(3);
        assert_eq!(flags.len(), 3);
        assert_eq!(flags.count_used(), 0);
    }
}
