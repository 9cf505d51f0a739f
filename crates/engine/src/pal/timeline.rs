//! The PAL2 three-phase timeline scheduling algorithm (`spec.md` §4.3):
//! for one request's `DMA0 -> MEM -> DMA1` phases, find the earliest
//! mutually-consistent placement on its channel and die free-slot maps.
//!
//! Grounded on `fil/nvm/pal/PAL2.cc`'s `submit`: the outer loop keeps
//! re-deriving `dma0_from` from where the die landed until DMA0's slot on
//! the channel stops moving, then re-validates DMA1 doesn't force the die
//! span wider than what MEM already reserved.

use super::freeslot::FreeSlotMap;
use super::merged::{MergedTimeSlots, OpTimeStamps};
use crate::nand_latency::Operation;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PhaseSpan {
    pub start: u64,
    pub len: u64,
}

impl PhaseSpan {
    pub fn end(&self) -> u64 {
        self.start + self.len
    }
}

#[derive(Debug, Clone, Copy)]
pub struct RequestTiming {
    pub dma0: PhaseSpan,
    pub mem: PhaseSpan,
    pub dma1: PhaseSpan,
    pub finished: u64,
    pub conflict_dma0: bool,
    pub conflict_mem: bool,
    pub conflict_dma1: bool,
}

#[derive(Debug, Clone, Copy)]
pub struct PalConfig {
    /// Anti-collision guard latency. `spec.md` §4.3 leaves reserving
    /// `2*latANTI` after DMA0 as optional ("optionally reserve..."); this
    /// simulator always applies it when `latency_anti_collision > 0`,
    /// making the guard a config knob rather than a silent maybe.
    pub latency_anti_collision: u64,
}

/// Owns every channel/die free-slot map plus the cross-die merged busy-time
/// and per-operation busy-time accumulators.
pub struct PalTimeline {
    channels: Vec<FreeSlotMap>,
    dies: Vec<FreeSlotMap>,
    merged: MergedTimeSlots,
    op_busy: [OpTimeStamps; 3],
    cfg: PalConfig,
}

fn op_index(op: Operation) -> usize {
    match op {
        Operation::Read => 0,
        Operation::Write => 1,
        Operation::Erase => 2,
    }
}

impl PalTimeline {
    pub fn new(num_channels: usize, num_dies: usize, cfg: PalConfig) -> Self {
        Self {
            channels: vec![FreeSlotMap::new(); num_channels],
            dies: vec![FreeSlotMap::new(); num_dies],
            merged: MergedTimeSlots::new(),
            op_busy: [OpTimeStamps::new(), OpTimeStamps::new(), OpTimeStamps::new()],
            cfg,
        }
    }

    pub fn exact_busy_time(&self, current_tick: u64) -> u64 {
        self.merged.exact_busy_time(current_tick)
    }

    pub fn op_busy_time(&self, op: Operation, current_tick: u64) -> u64 {
        self.op_busy[op_index(op)].busy_time(current_tick)
    }

    /// Schedule one request's three phases on `channel`/`die`, mutating
    /// both free-slot maps and the busy-time accumulators in place.
    pub fn schedule(
        &mut self,
        channel: usize,
        die: usize,
        op: Operation,
        arrived_tick: u64,
        lat_dma0: u64,
        lat_mem: u64,
        lat_dma1: u64,
    ) -> RequestTiming {
        let lat_anti = self.cfg.latency_anti_collision;
        let mut dma0_from = arrived_tick;
        let mut conflict_dma0 = false;
        let mut conflict_mem = false;
        let mut conflict_dma1 = false;

        let dma0_from_final = 'outer: loop {
            let (t_dma0, t_mem) = 'inner: loop {
                let (t_dma0, c0) = self.channels[channel].find_free(lat_dma0, dma0_from);
                conflict_dma0 |= c0;
                let mem_from = dma0_from.max(t_dma0);
                let (t_mem, c1) = self.dies[die].find_free(lat_dma0 + lat_mem, mem_from);
                conflict_mem |= c1;
                if t_mem == t_dma0 {
                    break 'inner (t_dma0, t_mem);
                }
                dma0_from = t_mem;
                let (t_dma0_retry, _) = self.channels[channel].find_free(lat_dma0, dma0_from);
                if t_dma0_retry == t_dma0 {
                    break 'inner (t_dma0_retry, t_mem);
                }
                // otherwise loop again with the updated dma0_from
            };
            dma0_from = t_dma0;

            let dma1_from = dma0_from + lat_dma0 + lat_mem;
            let (_, c2) = self.channels[channel].find_free(lat_dma1 + lat_anti, dma1_from);
            conflict_dma1 |= c2;
            let total_span = (dma1_from + lat_dma1 + lat_anti) - dma0_from;
            let (t_mem_v, _) = self.dies[die].find_free(total_span, dma0_from);
            if t_mem_v == t_mem {
                break 'outer dma0_from;
            }
            conflict_dma1 = true;
            dma0_from = t_mem_v;
        };

        let dma0_from = dma0_from_final;
        let dma1_start_from = dma0_from + lat_dma0 + lat_mem;
        let (t_dma1, _) = self.channels[channel].find_free(lat_dma1 + lat_anti, dma1_start_from);
        let total_span = (dma1_start_from + lat_dma1 + lat_anti) - dma0_from;

        self.channels[channel].insert_free(dma0_from, lat_dma0);
        self.channels[channel].insert_free(t_dma1, lat_dma1 + lat_anti);
        self.dies[die].insert_free(dma0_from, total_span);

        let mem_start = dma0_from + lat_dma0;
        let mem_end = mem_start + lat_mem;
        self.merged.insert(mem_start, mem_end.saturating_sub(1));

        let finished = t_dma1 + lat_dma1;
        self.op_busy[op_index(op)].record(dma0_from, finished.saturating_sub(1));

        RequestTiming {
            dma0: PhaseSpan { start: dma0_from, len: lat_dma0 },
            mem: PhaseSpan { start: mem_start, len: lat_mem },
            dma1: PhaseSpan { start: t_dma1, len: lat_dma1 },
            finished,
            conflict_dma0,
            conflict_mem,
            conflict_dma1,
        }
    }
}
