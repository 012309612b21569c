//! # Sleep/Wake Manager
//!
//! Sleeping tasks wait here, ordered by wake tick, until the tick handler
//! finds their deadline reached.
//!
//! ## Wraparound
//!
//! The tick counter is 32 bits and wraps after ~49 days at 1 kHz.
//! Deadlines are therefore compared through the signed distance between
//! two ticks, never with a raw `<=`. This is exact as long as no sleep
//! exceeds [`MAX_SLEEP_TICKS`]; longer requests are clamped.

use heapless::Vec;

use crate::config::{MAX_SLEEP_TICKS, MAX_TASKS, TICK_HZ};
use crate::error::fatal;

/// Whether `deadline` has been reached at tick `now`.
#[inline]
pub fn deadline_reached(now: u32, deadline: u32) -> bool {
    now.wrapping_sub(deadline) as i32 >= 0
}

/// Wake tick for a sleep of `duration` starting at `now`.
#[inline]
pub fn wake_time_for(now: u32, duration: u32) -> u32 {
    now.wrapping_add(duration.min(MAX_SLEEP_TICKS))
}

/// Ticks covering at least `ms` milliseconds.
pub fn ms_to_ticks(ms: u32) -> u32 {
    let ticks = (u64::from(ms) * u64::from(TICK_HZ)).div_ceil(1000);
    ticks.min(u64::from(MAX_SLEEP_TICKS)) as u32
}

#[derive(Debug, Clone, Copy)]
struct Sleeper {
    slot: usize,
    wake_time: u32,
}

pub(crate) struct SleepQueue {
    /// Earliest deadline first.
    sleepers: Vec<Sleeper, MAX_TASKS>,
}

impl SleepQueue {
    pub(crate) const fn new() -> Self {
        Self {
            sleepers: Vec::new(),
        }
    }

    /// Park `slot` until `wake_time`. All queued deadlines lie within
    /// `MAX_SLEEP_TICKS` of each other, so signed distance orders them.
    pub(crate) fn insert(&mut self, slot: usize, wake_time: u32) {
        let pos = self
            .sleepers
            .iter()
            .position(|s| (wake_time.wrapping_sub(s.wake_time) as i32) < 0)
            .unwrap_or(self.sleepers.len());
        if self.sleepers.insert(pos, Sleeper { slot, wake_time }).is_err() {
            fatal("sleep queue overflow");
        }
    }

    /// Drop `slot` without waking it. Returns whether it was queued.
    pub(crate) fn remove(&mut self, slot: usize) -> bool {
        match self.sleepers.iter().position(|s| s.slot == slot) {
            Some(pos) => {
                self.sleepers.remove(pos);
                true
            }
            None => false,
        }
    }

    /// Next task whose deadline is reached at `now`, earliest first.
    pub(crate) fn pop_expired(&mut self, now: u32) -> Option<usize> {
        let first = self.sleepers.first()?;
        if !deadline_reached(now, first.wake_time) {
            return None;
        }
        Some(self.sleepers.remove(0).slot)
    }

    pub(crate) fn len(&self) -> usize {
        self.sleepers.len()
    }
}
