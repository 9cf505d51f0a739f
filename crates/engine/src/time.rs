//! The process-wide monotonic time model: a single picosecond counter.
//!
//! `spec.md` §3: "A single process-wide monotonic counter in picoseconds.
//! All latencies are unsigned; no wall clock." We keep it as a plain `u64`
//! newtype rather than a `Duration` so arithmetic stays exact and cheap —
//! `Duration`'s nanosecond-plus-subsec-nanos representation would lose the
//! picosecond resolution the spec requires.

use std::fmt;
use std::ops::{Add, AddAssign, Sub};

/// A tick count in picoseconds since simulation start.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Tick(pub u64);

impl Tick {
    pub const ZERO: Tick = Tick(0);

    pub fn as_ps(self) -> u64 {
        self.0
    }

    pub fn saturating_add(self, delta: u64) -> Tick {
        Tick(self.0.saturating_add(delta))
    }
}

impl fmt::Display for Tick {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}ps", self.0)
    }
}

impl Add<u64> for Tick {
    type Output = Tick;
    fn add(self, rhs: u64) -> Tick {
        Tick(self.0 + rhs)
    }
}

impl AddAssign<u64> for Tick {
    fn add_assign(&mut self, rhs: u64) {
        self.0 += rhs;
    }
}

impl Sub for Tick {
    type Output = u64;
    fn sub(self, rhs: Tick) -> u64 {
        self.0 - rhs.0
    }
}

impl From<u64> for Tick {
    fn from(v: u64) -> Tick {
        Tick(v)
    }
}

/// A half-open time span `[start, start + len)`, used by the PAL free-slot
/// maps. `end_tick()` follows spec.md's `end = start + len - 1` convention
/// (inclusive end), so two slots are adjacent, not overlapping, when one's
/// `end_tick()` is exactly the other's `start - 1`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeSlot {
    pub start: Tick,
    pub len: u64,
}

impl TimeSlot {
    pub fn new(start: Tick, len: u64) -> Self {
        Self { start, len }
    }

    pub fn end_tick(&self) -> Tick {
        Tick(self.start.0 + self.len - 1)
    }

    pub fn overlaps(&self, other: &TimeSlot) -> bool {
        self.start.0 <= other.end_tick().0 && other.start.0 <= self.end_tick().0
    }
}
