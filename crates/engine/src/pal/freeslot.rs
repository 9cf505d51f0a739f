//! Per-resource free-slot map (`spec.md` §4.3): each channel and each die
//! tracks its unallocated ticks as a set of disjoint `[start, start+len)`
//! slots plus a `start_point` naming the first tick past every allocation
//! made so far.
//!
//! The spec's `find_free` is described as a two-level length-then-start
//! bucket lookup; we get the same tightest-fit, earliest-start behavior by
//! scanning `slots` directly (a `BTreeMap` keeps it sorted by start), which
//! is simpler to get right for the handful of concurrently free gaps a
//! single channel/die ever holds.

use std::collections::BTreeMap;

#[derive(Debug, Default, Clone)]
pub struct FreeSlotMap {
    /// start -> length, for every currently-free gap below `start_point`.
    slots: BTreeMap<u64, u64>,
    /// First tick not yet covered by any allocation; the map is
    /// conceptually free from here to infinity.
    pub start_point: u64,
}

impl FreeSlotMap {
    pub fn new() -> Self {
        Self {
            slots: BTreeMap::new(),
            start_point: 0,
        }
    }

    /// Tightest-fit lookup: among free slots with `start >= from` and
    /// `length >= len`, pick the smallest one (ties broken by earliest
    /// start). Falls back to pinning at `start_point` (or `from` if later)
    /// when no existing gap fits. The bool flags whether the caller was
    /// pushed later than `from` (a genuine scheduling conflict).
    pub fn find_free(&self, len: u64, from: u64) -> (u64, bool) {
        let mut best: Option<(u64, u64)> = None; // (length, start)
        for (&start, &length) in self.slots.range(..) {
            if start < from || length < len {
                continue;
            }
            match best {
                None => best = Some((length, start)),
                Some((blen, bstart)) if (length, start) < (blen, bstart) => {
                    best = Some((length, start))
                }
                _ => {}
            }
        }
        match best {
            Some((_, start)) => (start, start > from),
            None => {
                let start = self.start_point.max(from);
                (start, start > from)
            }
        }
    }

    /// Record that `[start, start+len)` is now allocated. `start` must
    /// have been the result of a prior `find_free` call with the same
    /// `len` and an appropriate `from`.
    pub fn insert_free(&mut self, start: u64, len: u64) {
        if let Some((&slot_start, &slot_len)) = self.slots.range(..=start).next_back() {
            let slot_end = slot_start + slot_len;
            if slot_start <= start && start < slot_end {
                self.slots.remove(&slot_start);
                if slot_start < start {
                    self.slots.insert(slot_start, start - slot_start);
                }
                let consumed_end = start + len;
                if consumed_end < slot_end {
                    self.slots.insert(consumed_end, slot_end - consumed_end);
                }
                return;
            }
        }
        if start > self.start_point {
            self.slots.insert(self.start_point, start - self.start_point);
        }
        let end = start + len;
        if end > self.start_point {
            self.start_point = end;
        }
    }
}
