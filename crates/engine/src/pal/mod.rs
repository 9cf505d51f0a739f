//! PAL2 channel/die timeline scheduler (`spec.md` §4.3).

pub mod freeslot;
pub mod merged;
pub mod timeline;

pub use timeline::{PalConfig, PalTimeline, PhaseSpan, RequestTiming};

use crate::nand_latency::{BusyPhase, NandLatencyModel, Operation};

/// Glue between the NAND latency model and the timeline scheduler: callers
/// (the FTL) resolve a `Ppn` down to a flat channel/die index pair via
/// [`crate::addr::AddressConfig`] and pass those in directly, keeping `Pal`
/// itself ignorant of the address packing scheme.
pub struct Pal {
    timeline: PalTimeline,
    latency: NandLatencyModel,
}

impl Pal {
    pub fn new(num_channels: usize, num_dies: usize, cfg: PalConfig, latency: NandLatencyModel) -> Self {
        Self {
            timeline: PalTimeline::new(num_channels, num_dies, cfg),
            latency,
        }
    }

    pub fn timeline(&self) -> &PalTimeline {
        &self.timeline
    }

    pub fn submit(
        &mut self,
        channel: usize,
        die: usize,
        page_index_in_wordline: u32,
        op: Operation,
        arrived_tick: u64,
    ) -> RequestTiming {
        let page_type = self.latency.page_type_of(page_index_in_wordline);
        let lat_dma0 = self.latency.latency(page_type, op, BusyPhase::Dma0);
        let lat_mem = self.latency.latency(page_type, op, BusyPhase::Mem);
        let lat_dma1 = self.latency.latency(page_type, op, BusyPhase::Dma1);
        self.timeline.schedule(channel, die, op, arrived_tick, lat_dma0, lat_mem, lat_dma1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::nand_latency::NandType;

    #[test]
    fn submit_drives_timeline_through_latency_model() {
        let latency = NandLatencyModel::new(NandType::Tlc, 400, 16384).unwrap();
        let mut pal = Pal::new(2, 1, PalConfig { latency_anti_collision: 0 }, latency);

        let timing = pal.submit(0, 0, 0, Operation::Read, 0);
        assert_eq!(timing.dma0.start, 0);
        assert!(timing.finished > 0);
    }

    #[test]
    fn erase_is_far_slower_than_read() {
        let latency = NandLatencyModel::new(NandType::Tlc, 400, 16384).unwrap();
        let mut pal = Pal::new(1, 1, PalConfig { latency_anti_collision: 0 }, latency);
        let read = pal.submit(0, 0, 0, Operation::Read, 0);
        let latency2 = NandLatencyModel::new(NandType::Tlc, 400, 16384).unwrap();
        let mut pal2 = Pal::new(1, 1, PalConfig { latency_anti_collision: 0 }, latency2);
        let erase = pal2.submit(0, 0, 0, Operation::Erase, 0);
        assert!(erase.finished > read.finished);
    }
}
