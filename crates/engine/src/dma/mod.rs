//! PRP and SGL descriptor resolution (`spec.md` §4.6): both engines reduce
//! a command's data pointer fields to a flat list of `(host_addr, length)`
//! segments, then issue each segment through the upstream FIFO transport
//! with a shared completion counter.

pub mod prp;
pub mod sgl;

use std::cell::Cell;
use std::rc::Rc;

use thiserror::Error;

use crate::event::{EventId, SharedEngine};
use crate::fifo::Fifo;

pub use prp::PrpEngine;
pub use sgl::{SglDescriptor, SglEngine, SglKind};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum DmaError {
    #[error("unsupported or malformed descriptor type")]
    InvalidDescriptor,
    #[error("SGL/PRP chain exhausted before reaching the expected size")]
    ExhaustedChain,
    #[error("PRP list pointer {0:#x} is not page-aligned")]
    NotPageAligned(u64),
}

/// One resolved transfer segment. `ignore` marks an SGL Bit Bucket entry:
/// it counts toward the descriptor chain's declared size but never moves
/// bytes (`original_source/hil/nvme/dma.hh`'s `Chunk::ignore`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Segment {
    pub host_addr: u64,
    pub len: u64,
    pub ignore: bool,
}

/// A minimal view of host (DRAM-backed) memory: enough to walk PRP lists
/// and SGL descriptor chains, and — via [`HostMemory::read_bytes`] — to
/// pull a whole data buffer out for the NVMe I/O path's media comparison
/// (`spec.md` §8 S5).
pub trait HostMemory {
    fn read_u64(&self, addr: u64) -> u64;
    fn read_u32(&self, addr: u64) -> u32;
    fn read_u8(&self, addr: u64) -> u8;

    /// Fill `buf` from `addr..addr+buf.len()`. The default walks
    /// `read_u8` one byte at a time; implementations backed by a flat
    /// buffer (`ssdsim-runner`'s `HostBuffer`) should override this with a
    /// slice copy.
    fn read_bytes(&self, addr: u64, buf: &mut [u8]) {
        for (i, b) in buf.iter_mut().enumerate() {
            *b = self.read_u8(addr + i as u64);
        }
    }
}

/// Issue every segment through `fifo`, firing `completion` once all of
/// them (or their zero-cost `ignore` stand-ins) have finished.
pub fn issue_segments(engine: &SharedEngine, fifo: &Fifo, write: bool, segments: &[Segment], completion: EventId) {
    if segments.is_empty() {
        engine.borrow_mut().schedule_now(completion);
        return;
    }

    let remaining = Rc::new(Cell::new(segments.len() as u32));
    for seg in segments {
        if seg.ignore {
            let remaining = remaining.clone();
            remaining.set(remaining.get() - 1);
            if remaining.get() == 0 {
                engine.borrow_mut().schedule_now(completion);
            }
            continue;
        }

        let remaining = remaining.clone();
        let engine_for_cb = engine.clone();
        let per_segment_done = engine.borrow_mut().allocate(
            "dma_segment_done",
            Box::new(move |_now, _data| {
                remaining.set(remaining.get() - 1);
                if remaining.get() == 0 {
                    engine_for_cb.borrow_mut().schedule_now(completion);
                }
            }),
        );
        if write {
            fifo.write(engine, seg.len as u32, per_segment_done);
        } else {
            fifo.read(engine, seg.len as u32, per_segment_done);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::EventEngine;
    use crate::fifo::{DmaInterface, FifoConfig};
    use crate::time::Tick;
    use std::cell::RefCell;

    struct FixedLatencyDma;
    impl DmaInterface for FixedLatencyDma {
        fn submit(&mut self, engine: &SharedEngine, _bytes: u32, on_done: EventId) {
            let at = engine.borrow().now() + 10;
            engine.borrow_mut().schedule(on_done, at);
        }
    }

    #[test]
    fn completion_fires_once_all_segments_land() {
        let engine: SharedEngine = Rc::new(RefCell::new(EventEngine::new()));
        let upstream: Rc<RefCell<dyn DmaInterface>> = Rc::new(RefCell::new(FixedLatencyDma));
        let fifo = Fifo::new(
            FifoConfig { capacity: 16384, transfer_unit: 4096 },
            FifoConfig { capacity: 16384, transfer_unit: 4096 },
            |_bytes| 1,
            upstream,
        );

        let done = Rc::new(Cell::new(false));
        let d = done.clone();
        let completion = engine.borrow_mut().allocate("done", Box::new(move |_now, _d| d.set(true)));

        let segments = [
            Segment { host_addr: 0x1000, len: 4096, ignore: false },
            Segment { host_addr: 0x2000, len: 4096, ignore: false },
        ];
        issue_segments(&engine, &fifo, true, &segments, completion);
        engine.borrow_mut().run_until(Tick(100_000));
        assert!(done.get());
    }

    #[test]
    fn ignored_segments_do_not_block_completion() {
        let engine: SharedEngine = Rc::new(RefCell::new(EventEngine::new()));
        let upstream: Rc<RefCell<dyn DmaInterface>> = Rc::new(RefCell::new(FixedLatencyDma));
        let fifo = Fifo::new(
            FifoConfig { capacity: 16384, transfer_unit: 4096 },
            FifoConfig { capacity: 16384, transfer_unit: 4096 },
            |_bytes| 1,
            upstream,
        );

        let done = Rc::new(Cell::new(false));
        let d = done.clone();
        let completion = engine.borrow_mut().allocate("done", Box::new(move |_now, _d| d.set(true)));

        let segments = [Segment { host_addr: 0x1000, len: 512, ignore: true }];
        issue_segments(&engine, &fifo, false, &segments, completion);
        engine.borrow_mut().run_until(Tick(100_000));
        assert!(done.get());
    }
}
