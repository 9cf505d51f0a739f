//! Set-associative internal cache (`spec.md` §4.5): read/write/flush/
//! invalidate pipelines sitting between the NVMe command path and the
//! FTL, with eviction, write-back, and a sequential-access prefetcher.
//!
//! Like [`crate::pal::Pal`] and [`crate::ftl::Ftl`], every call here
//! computes synchronously and returns the tick it finishes at; the NVMe
//! layer owns the event engine and suspends the command until then.

pub mod line;
pub mod mem_timing;
pub mod prefetch;
pub mod set;

use rand::rngs::StdRng;
use rand::SeedableRng;

use crate::addr::Lpn;
use crate::error::{FtlError, IclError};
use crate::ftl::Ftl;
use crate::pal::Pal;
use mem_timing::IclMemoryTiming;
use prefetch::{PrefetchConfig, PrefetchTrigger};
use set::{FindResult, ReplacementPolicy, Set};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EvictionGranularity {
    Single,
    Superpage,
    AllLevel,
}

#[derive(Debug, Clone, Copy)]
pub struct IclConfig {
    pub read_cache: bool,
    pub write_cache: bool,
    /// Total cache capacity in bytes; combined with `line_size` and `ways`
    /// to derive the set count (`spec.md`: "fully-associative when ways
    /// = 0", mapped to one set spanning the whole capacity).
    pub cache_size: usize,
    pub ways: usize,
    pub line_size: usize,
    pub policy: ReplacementPolicy,
    pub eviction_granularity: EvictionGranularity,
    pub prefetch: PrefetchConfig,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheOutcome {
    Hit,
    ColdMiss,
    Miss,
}

pub struct IclAccess {
    pub outcome: CacheOutcome,
    pub finished: u64,
}

pub struct Icl {
    sets: Vec<Set>,
    cfg: IclConfig,
    clock: u16,
    prefetch: PrefetchTrigger,
    timing: IclMemoryTiming,
    rng: StdRng,
}

impl Icl {
    pub fn new(cfg: IclConfig, timing: IclMemoryTiming, seed: u64) -> Result<Self, IclError> {
        if cfg.line_size == 0 || cfg.cache_size == 0 {
            return Err(IclError::BadGeometry { sets: 0, ways: cfg.ways, line_size: cfg.line_size });
        }
        let (ways, sets) = if cfg.ways == 0 {
            (cfg.cache_size / cfg.line_size, 1)
        } else {
            (cfg.ways, cfg.cache_size / (cfg.ways * cfg.line_size))
        };
        if ways == 0 || sets == 0 {
            return Err(IclError::BadGeometry { sets, ways, line_size: cfg.line_size });
        }
        Ok(Self {
            sets: (0..sets).map(|_| Set::new(ways, cfg.policy)).collect(),
            prefetch: PrefetchTrigger::new(cfg.prefetch),
            clock: 0,
            timing,
            rng: StdRng::seed_from_u64(seed),
            cfg,
        })
    }

    fn set_index(&self, lpn: Lpn) -> usize {
        (lpn.get() % self.sets.len() as u64) as usize
    }

    fn tag_compare_latency(&self) -> u64 {
        self.timing.tag_compare(self.sets[0].lines.len(), 8)
    }

    fn line_latency(&self) -> u64 {
        self.timing.line_access(self.cfg.line_size)
    }

    /// Evict a victim from `set_idx` if needed, writing back through `ftl`
    /// if dirty, and return the way index now free for a fill.
    fn evict_if_needed(
        &mut self,
        ftl: &mut Ftl,
        pal: &mut Pal,
        set_idx: usize,
        now_tick: u64,
    ) -> Option<usize> {
        let clock = self.clock;
        let victim = self.sets[set_idx].select_victim(clock, &mut self.rng)?;
        let line = &self.sets[set_idx].lines[victim];
        if line.is_dirty() {
            let lpn = line.tag_lpn.expect("dirty line always has a tag");
            let _ = ftl.write(pal, lpn, now_tick);
        }
        self.sets[set_idx].lines[victim].reset();
        Some(victim)
    }

    /// Read lifecycle (`spec.md` §4.5 step 1-4).
    pub fn read(
        &mut self,
        ftl: &mut Ftl,
        pal: &mut Pal,
        lpn: Lpn,
        now_tick: u64,
    ) -> Result<IclAccess, FtlError> {
        self.clock = self.clock.wrapping_add(1);
        if !self.cfg.read_cache {
            let timing = ftl.read(pal, lpn, now_tick)?;
            return Ok(IclAccess { outcome: CacheOutcome::Miss, finished: timing.finished });
        }

        let set_idx = self.set_index(lpn);
        let tag_latency = self.tag_compare_latency();

        let access = match self.sets[set_idx].find(lpn) {
            FindResult::Hit(way) | FindResult::HitPending(way) => {
                if self.sets[set_idx].stamps_on_access() {
                    let clock = self.clock;
                    self.sets[set_idx].lines[way].touch(clock);
                }
                IclAccess {
                    outcome: CacheOutcome::Hit,
                    finished: now_tick + tag_latency + self.line_latency(),
                }
            }
            FindResult::ColdMiss(way) => self.fill(ftl, pal, set_idx, way, lpn, now_tick, CacheOutcome::ColdMiss)?,
            FindResult::Miss => {
                let way = self
                    .evict_if_needed(ftl, pal, set_idx, now_tick)
                    .ok_or(FtlError::OutOfCapacity)?;
                self.fill(ftl, pal, set_idx, way, lpn, now_tick, CacheOutcome::Miss)?
            }
        };

        for prefetch_lpn in self.prefetch.on_access(lpn) {
            self.try_prefetch(ftl, pal, prefetch_lpn, now_tick);
        }
        Ok(access)
    }

    fn fill(
        &mut self,
        ftl: &mut Ftl,
        pal: &mut Pal,
        set_idx: usize,
        way: usize,
        lpn: Lpn,
        now_tick: u64,
        outcome: CacheOutcome,
    ) -> Result<IclAccess, FtlError> {
        let clock = self.clock;
        self.sets[set_idx].lines[way].begin_fill(lpn, clock);
        let timing = ftl.read(pal, lpn, now_tick)?;
        self.sets[set_idx].lines[way].finish_fill();
        Ok(IclAccess { outcome, finished: timing.finished + self.line_latency() })
    }

    /// Only fills already-empty ways, per `spec.md`'s "never evict for
    /// prefetch"; a fully-occupied set silently skips the prefetch.
    fn try_prefetch(&mut self, ftl: &mut Ftl, pal: &mut Pal, lpn: Lpn, now_tick: u64) {
        let set_idx = self.set_index(lpn);
        if !matches!(self.sets[set_idx].find(lpn), FindResult::ColdMiss(_)) {
            return;
        }
        let Some(way) = self.sets[set_idx].find_empty_way() else { return };
        let clock = self.clock;
        self.sets[set_idx].lines[way].begin_fill(lpn, clock);
        if ftl.read(pal, lpn, now_tick).is_ok() {
            self.sets[set_idx].lines[way].finish_fill();
        } else {
            self.sets[set_idx].lines[way].reset();
        }
    }

    /// Write lifecycle: dirties the line and completes as soon as data
    /// reaches the cache (`spec.md` §4.5 "Write lifecycle").
    pub fn write(
        &mut self,
        ftl: &mut Ftl,
        pal: &mut Pal,
        lpn: Lpn,
        now_tick: u64,
    ) -> Result<IclAccess, FtlError> {
        self.clock = self.clock.wrapping_add(1);
        if !self.cfg.write_cache {
            let timing = ftl.write(pal, lpn, now_tick)?;
            return Ok(IclAccess { outcome: CacheOutcome::Miss, finished: timing.finished });
        }

        let set_idx = self.set_index(lpn);
        let tag_latency = self.tag_compare_latency();
        let way = match self.sets[set_idx].find(lpn) {
            FindResult::Hit(way) | FindResult::HitPending(way) => way,
            FindResult::ColdMiss(way) => way,
            FindResult::Miss => self
                .evict_if_needed(ftl, pal, set_idx, now_tick)
                .ok_or(FtlError::OutOfCapacity)?,
        };

        let clock = self.clock;
        let line = &mut self.sets[set_idx].lines[way];
        if !line.is_valid() {
            line.begin_fill(lpn, clock);
            line.finish_fill();
        }
        line.mark_dirty();

        Ok(IclAccess {
            outcome: CacheOutcome::Hit,
            finished: now_tick + tag_latency + self.line_latency(),
        })
    }

    /// Walks every dirty line whose tag falls in `lpns` and writes it back.
    pub fn flush(&mut self, ftl: &mut Ftl, pal: &mut Pal, lpns: &[Lpn], now_tick: u64) -> u64 {
        let mut finished = now_tick;
        for lpn in lpns {
            let set_idx = self.set_index(*lpn);
            if let FindResult::Hit(way) = self.sets[set_idx].find(*lpn) {
                if self.sets[set_idx].lines[way].is_dirty() {
                    self.sets[set_idx].lines[way].begin_writeback();
                    if let Ok(timing) = ftl.write(pal, *lpn, now_tick) {
                        finished = finished.max(timing.finished);
                    }
                    self.sets[set_idx].lines[way].finish_writeback_clean();
                }
            }
        }
        finished
    }

    /// Trim/Format: invalidate cache lines in range and forward to FTL.
    pub fn invalidate(&mut self, ftl: &mut Ftl, lpns: impl IntoIterator<Item = Lpn> + Clone) {
        for lpn in lpns.clone() {
            let set_idx = self.set_index(lpn);
            if let FindResult::Hit(way) = self.sets[set_idx].find(lpn) {
                self.sets[set_idx].lines[way].reset();
            }
        }
        ftl.trim(lpns);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::addr::AddressConfig;
    use crate::ftl::{GcConfig, GcPolicy};
    use crate::nand_latency::{NandLatencyModel, NandType};
    use crate::pal::PalConfig;

    fn harness() -> (Icl, Ftl, Pal) {
        let addr_cfg = AddressConfig::new(1, 1, 1, 1, 8, 8);
        let latency = NandLatencyModel::new(NandType::Slc, 100, 4096).unwrap();
        let pal = Pal::new(1, 1, PalConfig { latency_anti_collision: 0 }, latency);
        let gc_cfg = GcConfig { policy: GcPolicy::Greedy, free_ratio_threshold: 0.1 };
        let ftl = Ftl::new(addr_cfg, gc_cfg);

        let icl_cfg = IclConfig {
            read_cache: true,
            write_cache: true,
            cache_size: 4 * 4096,
            ways: 2,
            line_size: 4096,
            policy: ReplacementPolicy::Lru,
            eviction_granularity: EvictionGranularity::Single,
            prefetch: PrefetchConfig { enabled: false, sequential_threshold: 3, coverage_ratio: 0.9, prefetch_pages: 2 },
        };
        let timing = IclMemoryTiming {
            sram: mem_timing::MemTiming::Simple { fixed_ps: 50, clk_mhz: 1000, width_bits: 32 },
            dram: mem_timing::MemTiming::Simple { fixed_ps: 500, clk_mhz: 800, width_bits: 64 },
        };
        (Icl::new(icl_cfg, timing, 42).unwrap(), ftl, pal)
    }

    #[test]
    fn write_then_read_is_a_hit_with_no_extra_nand_op() {
        let (mut icl, mut ftl, mut pal) = harness();
        icl.write(&mut ftl, &mut pal, Lpn(1), 0).unwrap();
        let access = icl.read(&mut ftl, &mut pal, Lpn(1), 0).unwrap();
        assert_eq!(access.outcome, CacheOutcome::Hit);
    }

    #[test]
    fn cold_read_goes_to_ftl() {
        let (mut icl, mut ftl, mut pal) = harness();
        ftl.write(&mut pal, Lpn(2), 0).unwrap();
        let access = icl.read(&mut ftl, &mut pal, Lpn(2), 0).unwrap();
        assert_eq!(access.outcome, CacheOutcome::ColdMiss);
    }

    #[test]
    fn eviction_writes_back_dirty_line() {
        let (mut icl, mut ftl, mut pal) = harness();
        // set 0 has 2 ways; drive 3 distinct lpns through the same set to
        // force an eviction (set index = lpn % sets.len(); sets.len() = 2
        // here since cache_size/(ways*line_size) = 2).
        icl.write(&mut ftl, &mut pal, Lpn(0), 0).unwrap();
        icl.write(&mut ftl, &mut pal, Lpn(2), 0).unwrap();
        icl.write(&mut ftl, &mut pal, Lpn(4), 0).unwrap(); // same set as 0 and 2, forces eviction
        // whichever of lpn 0/2 got evicted must now be durably in the FTL.
        assert!(ftl.read_mapping(Lpn(0)).is_ok() || ftl.read_mapping(Lpn(2)).is_ok());
    }

    #[test]
    fn invalidate_clears_cache_and_forwards_trim() {
        let (mut icl, mut ftl, mut pal) = harness();
        icl.write(&mut ftl, &mut pal, Lpn(3), 0).unwrap();
        icl.invalidate(&mut ftl, [Lpn(3)]);
        assert!(ftl.read_mapping(Lpn(3)).is_err());
    }

    #[test]
    fn disabled_write_cache_passes_straight_through() {
        let (mut icl, mut ftl, mut pal) = harness();
        icl.cfg.write_cache = false;
        let access = icl.write(&mut ftl, &mut pal, Lpn(9), 0).unwrap();
        assert_eq!(access.outcome, CacheOutcome::Miss);
        assert!(ftl.read_mapping(Lpn(9)).is_ok());
    }
}
