//! FTL page mapper + garbage collection (`spec.md` §4.4).
//!
//! Like [`crate::pal::Pal`], the FTL computes timing synchronously (it
//! calls into `Pal::submit` directly) rather than scheduling its own
//! events — the NVMe command layer that drives it owns the event engine
//! and suspends the command until the returned `finished` tick.

pub mod block;
pub mod gc;
pub mod hybrid;
pub mod mapper;

pub use gc::{GcConfig, GcController, GcPolicy};
pub use mapper::PageMapper;

use crate::addr::{AddressConfig, Lpn, Ppn};
use crate::error::FtlError;
use crate::nand_latency::Operation;
use crate::pal::Pal;

pub struct Ftl {
    mapper: PageMapper,
    gc: GcController,
}

impl Ftl {
    pub fn new(addr_cfg: AddressConfig, gc_cfg: GcConfig) -> Self {
        Self {
            mapper: PageMapper::new(addr_cfg),
            gc: GcController::new(gc_cfg),
        }
    }

    pub fn addr_cfg(&self) -> &AddressConfig {
        self.mapper.addr_cfg()
    }

    pub fn read_mapping(&self, lpn: Lpn) -> Result<Ppn, FtlError> {
        self.mapper.read(lpn)
    }

    /// Total erase count across every block (`spec.md` §8 S4: "erase_count
    /// of at least one block increases").
    pub fn total_erase_count(&self) -> u64 {
        self.mapper.all_blocks().map(|b| b.erase_count).sum()
    }

    /// Number of GC reclaim passes run so far.
    pub fn blocks_reclaimed(&self) -> u64 {
        self.gc.blocks_reclaimed
    }

    pub fn free_ratio(&self) -> f64 {
        self.mapper.free_ratio()
    }

    /// Allocate a page for `lpn`, issue the write through `pal`, and run a
    /// GC pass first if the plane pool has dropped below threshold. Returns
    /// the PAL timing for the caller to suspend on.
    pub fn write(
        &mut self,
        pal: &mut Pal,
        lpn: Lpn,
        now_tick: u64,
    ) -> Result<crate::pal::RequestTiming, FtlError> {
        self.run_gc_if_needed(pal, now_tick);

        let ppn = self.mapper.write(lpn, now_tick)?;
        Ok(self.submit(pal, ppn, Operation::Write, now_tick))
    }

    pub fn read(
        &mut self,
        pal: &mut Pal,
        lpn: Lpn,
        now_tick: u64,
    ) -> Result<crate::pal::RequestTiming, FtlError> {
        let ppn = self.mapper.read(lpn)?;
        Ok(self.submit(pal, ppn, Operation::Read, now_tick))
    }

    pub fn trim(&mut self, lpns: impl IntoIterator<Item = Lpn>) {
        self.mapper.trim(lpns);
    }

    /// No-op at the FTL (`spec.md` §4.4: "ICL handles dirty write-back");
    /// retained as an explicit call site so callers don't need to special
    /// case "nothing to do here" themselves.
    pub fn flush_range(&self, _lpns: impl IntoIterator<Item = Lpn>) {}

    fn submit(
        &self,
        pal: &mut Pal,
        ppn: Ppn,
        op: Operation,
        now_tick: u64,
    ) -> crate::pal::RequestTiming {
        let addr_cfg = self.mapper.addr_cfg();
        let pbn = addr_cfg.block_of(ppn);
        let (channel, die) = addr_cfg.channel_die_of(pbn);
        let page_offset = addr_cfg.page_offset_of(ppn);
        pal.submit(channel, die, page_offset, op, now_tick)
    }

    fn run_gc_if_needed(&mut self, pal: &mut Pal, now_tick: u64) {
        if !self.gc.should_run(&self.mapper) {
            return;
        }
        let active = self.mapper.active_blocks();
        let Some(victim) = self.gc.select_victim(&self.mapper, now_tick, &active) else {
            return;
        };
        self.relocate_and_reclaim(pal, victim, now_tick);
    }

    /// Read every valid page out of `victim` through PAL, rewrite it to the
    /// active block (updating the map), then erase and free the victim.
    fn relocate_and_reclaim(&mut self, pal: &mut Pal, victim: crate::addr::Pbn, now_tick: u64) {
        let addr_cfg = self.mapper.addr_cfg().clone();
        let offsets: Vec<u32> = self.mapper.block(victim).valid_offsets().collect();
        let mut relocated = 0u64;

        for offset in offsets {
            let old_ppn = addr_cfg.ppn_for_block_page(victim, offset);
            let Some(lpn) = self.mapper.owner_of(old_ppn) else {
                continue;
            };
            self.submit(pal, old_ppn, Operation::Read, now_tick);
            if self.mapper.write(lpn, now_tick).is_ok() {
                let new_ppn = self.mapper.read(lpn).expect("just wrote it");
                self.submit(pal, new_ppn, Operation::Write, now_tick);
                relocated += 1;
            }
        }

        let (channel, die) = addr_cfg.channel_die_of(victim);
        pal.submit(channel, die, 0, Operation::Erase, now_tick);
        self.mapper.reclaim(victim);

        self.gc.note_pages_relocated(relocated);
        self.gc.note_block_reclaimed();
    }
}
