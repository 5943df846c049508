//! Counters and timers addressed by typed keys.

use super::timer::Timer;
use super::MonitorKey;
use std::marker::PhantomData;

/// A set of counters and timers, one per key.
///
/// One instance is filled per worker; instances are reduced with
/// [`MonitorData::add_monitor_data`].
#[derive(Debug, Clone, PartialEq)]
pub struct MonitorData<C: MonitorKey, T: MonitorKey> {
    counters: Vec<u64>,
    timers: Vec<Timer>,
    keys: PhantomData<(C, T)>,
}

impl<C: MonitorKey, T: MonitorKey> Default for MonitorData<C, T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C: MonitorKey, T: MonitorKey> MonitorData<C, T> {
    /// Creates zeroed counters and stopped timers.
    #[must_use]
    pub fn new() -> Self {
        Self {
            counters: vec![0; C::ALL.len()],
            timers: vec![Timer::default(); T::ALL.len()],
            keys: PhantomData,
        }
    }

    /// Increments a counter by one.
    #[inline]
    pub fn increment_counter(&mut self, key: C) {
        self.counters[key.index()] += 1;
    }

    /// Increments a counter by `value`.
    #[inline]
    pub fn increment_counter_by(&mut self, key: C, value: u64) {
        self.counters[key.index()] += value;
    }

    /// Current value of a counter.
    #[must_use]
    pub fn counter_value(&self, key: C) -> u64 {
        self.counters[key.index()]
    }

    /// Starts a timer.
    #[inline]
    pub fn start_timer(&mut self, key: T) {
        self.timers[key.index()].start();
    }

    /// Stops a timer and records the call.
    #[inline]
    pub fn stop_timer(&mut self, key: T) {
        self.timers[key.index()].stop();
    }

    /// Returns a timer.
    #[must_use]
    pub fn timer(&self, key: T) -> &Timer {
        &self.timers[key.index()]
    }

    /// Returns a timer for direct manipulation.
    pub fn timer_mut(&mut self, key: T) -> &mut Timer {
        &mut self.timers[key.index()]
    }

    /// Adds counters and merges timers of another instance.
    ///
    /// `parallel` must be true when `other` was filled concurrently with the
    /// data already accumulated here (see [`Timer::add_timer`]).
    pub fn add_monitor_data(&mut self, other: &Self, parallel: bool) {
        for (mine, theirs) in self.counters.iter_mut().zip(&other.counters) {
            *mine += theirs;
        }
        for (mine, theirs) in self.timers.iter_mut().zip(&other.timers) {
            mine.add_timer(theirs, parallel);
        }
    }

    /// Zeroes counters and resets timers.
    pub fn reset(&mut self) {
        self.counters.iter_mut().for_each(|c| *c = 0);
        self.timers.iter_mut().for_each(Timer::reset);
    }

    /// Iterates over `(key, value)` for all counters.
    pub fn counters(&self) -> impl Iterator<Item = (C, u64)> + '_ {
        C::ALL.iter().map(move |&key| (key, self.counter_value(key)))
    }

    /// Iterates over `(key, timer)` for all timers.
    pub fn timers(&self) -> impl Iterator<Item = (T, &Timer)> + '_ {
        T::ALL.iter().map(move |&key| (key, self.timer(key)))
    }
}
