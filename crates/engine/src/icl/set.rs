//! A cache set: `ways` lines sharing one index, plus the eviction policy
//! that picks a victim among them (`spec.md` §4.5).

use rand::Rng;

use super::line::Line;
use crate::addr::Lpn;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplacementPolicy {
    Random,
    Fifo,
    Lru,
}

pub enum FindResult {
    Hit(usize),
    /// Line at this index is mid-fill from NAND; caller should queue on
    /// its `pending_readers` rather than re-issue the read.
    HitPending(usize),
    /// An empty way is available at this index — fill it without evicting.
    ColdMiss(usize),
    /// Every way is occupied by an unrelated tag; caller must evict first.
    Miss,
}

pub struct Set {
    pub lines: Vec<Line>,
    policy: ReplacementPolicy,
}

impl Set {
    pub fn new(ways: usize, policy: ReplacementPolicy) -> Self {
        Self {
            lines: (0..ways).map(|_| Line::empty()).collect(),
            policy,
        }
    }

    pub fn find(&self, lpn: Lpn) -> FindResult {
        for (i, line) in self.lines.iter().enumerate() {
            if line.is_empty() {
                continue;
            }
            if line.matches(lpn) {
                return match line.state {
                    super::line::LineState::ReadPending => FindResult::HitPending(i),
                    _ => FindResult::Hit(i),
                };
            }
        }
        if let Some(i) = self.lines.iter().position(Line::is_empty) {
            return FindResult::ColdMiss(i);
        }
        FindResult::Miss
    }

    /// Select a victim way among occupied, non-pending lines for eviction.
    /// `clock` is the set owner's current global 16-bit clock.
    pub fn select_victim(&self, clock: u16, rng: &mut impl Rng) -> Option<usize> {
        let candidates: Vec<usize> = self
            .lines
            .iter()
            .enumerate()
            .filter(|(_, l)| l.is_valid())
            .map(|(i, _)| i)
            .collect();
        if candidates.is_empty() {
            return None;
        }
        match self.policy {
            ReplacementPolicy::Random => {
                let idx = rng.gen_range(0..candidates.len());
                Some(candidates[idx])
            }
            ReplacementPolicy::Fifo | ReplacementPolicy::Lru => candidates
                .into_iter()
                .max_by_key(|&i| clock.wrapping_sub(self.lines[i].clock_stamp)),
        }
    }

    /// LRU stamps on every access; FIFO stamps only on insert (callers
    /// skip this for FIFO sets on a hit).
    pub fn stamps_on_access(&self) -> bool {
        self.policy == ReplacementPolicy::Lru
    }

    pub fn find_empty_way(&self) -> Option<usize> {
        self.lines.iter().position(Line::is_empty)
    }
}
