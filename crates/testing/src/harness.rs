//! Builds a small, fully-wired [`Controller`] the way
//! `ssdsim_engine::nvme::controller::tests::test_controller` does inside
//! the engine crate, just from this crate where that test-only helper
//! isn't visible.

use ssdsim_engine::addr::AddressConfig;
use ssdsim_engine::dma::HostMemory;
use ssdsim_engine::ftl::{Ftl, GcConfig, GcPolicy};
use ssdsim_engine::icl::mem_timing::{IclMemoryTiming, MemTiming};
use ssdsim_engine::icl::prefetch::PrefetchConfig;
use ssdsim_engine::icl::set::ReplacementPolicy;
use ssdsim_engine::icl::{EvictionGranularity, Icl, IclConfig};
use ssdsim_engine::nand_latency::{NandLatencyModel, NandType};
use ssdsim_engine::nvme::arbitrator::{ArbitrationData, ArbitrationScheme, PriorityClass};
use ssdsim_engine::nvme::namespace::{LbaFormat, Namespace};
use ssdsim_engine::nvme::queue::{CompletionQueue, CqState, SqState, SubmissionQueue};
use ssdsim_engine::nvme::Controller;
use ssdsim_engine::pal::{Pal, PalConfig};

pub const PAGE_SIZE: u64 = 4096;

/// Geometry matching `spec.md` §8 S1: 1 channel x 1 die x 1 plane x 64
/// blocks x 64 pages, 512 B LBA, 4 KiB page, MLC.
pub struct SystemConfig {
    pub channels: u32,
    pub packages: u32,
    pub dies: u32,
    pub planes: u32,
    pub blocks: u32,
    pub pages: u32,
    pub nand_type: NandType,
    pub cache_size: usize,
    pub cache_ways: usize,
    pub read_cache: bool,
    pub write_cache: bool,
    pub prefetch: PrefetchConfig,
    pub free_ratio_threshold: f64,
}

impl Default for SystemConfig {
    fn default() -> Self {
        Self {
            channels: 1,
            packages: 1,
            dies: 1,
            planes: 1,
            blocks: 64,
            pages: 64,
            nand_type: NandType::Mlc,
            cache_size: 8 * PAGE_SIZE as usize,
            cache_ways: 2,
            read_cache: true,
            write_cache: true,
            prefetch: PrefetchConfig { enabled: false, sequential_threshold: 3, coverage_ratio: 0.9, prefetch_pages: 2 },
            free_ratio_threshold: 0.15,
        }
    }
}

pub fn build_controller(cfg: SystemConfig) -> Controller {
    let addr_cfg = AddressConfig::new(cfg.channels, cfg.packages, cfg.dies, cfg.planes, cfg.blocks, cfg.pages);
    let latency = NandLatencyModel::new(cfg.nand_type, 400, PAGE_SIZE).expect("valid latency config");
    let pal = Pal::new(
        cfg.channels as usize,
        (cfg.packages * cfg.dies) as usize,
        PalConfig { latency_anti_collision: 0 },
        latency,
    );
    let gc_cfg = GcConfig { policy: GcPolicy::Greedy, free_ratio_threshold: cfg.free_ratio_threshold };
    let ftl = Ftl::new(addr_cfg, gc_cfg);

    let icl_cfg = IclConfig {
        read_cache: cfg.read_cache,
        write_cache: cfg.write_cache,
        cache_size: cfg.cache_size,
        ways: cfg.cache_ways,
        line_size: PAGE_SIZE as usize,
        policy: ReplacementPolicy::Lru,
        eviction_granularity: EvictionGranularity::Single,
        prefetch: cfg.prefetch,
    };
    let timing = IclMemoryTiming {
        sram: MemTiming::Simple { fixed_ps: 50, clk_mhz: 1000, width_bits: 32 },
        dram: MemTiming::Simple { fixed_ps: 500, clk_mhz: 800, width_bits: 64 },
    };
    let icl = Icl::new(icl_cfg, timing, 7).expect("valid ICL config");

    let arbitration = ArbitrationData { scheme: ArbitrationScheme::RoundRobin, hpw: 4, mpw: 2, lpw: 1, arbitration_burst: 4 };
    Controller::new(1, 0x1000, 0x2000, 64, ftl, pal, icl, PAGE_SIZE, arbitration)
}

/// Creates and activates a namespace sized `size_lbas` with a 512 B LBA
/// format starting at LPN 0, returning its nsid. Each test builds its own
/// controller, so there's never a second namespace to collide with
/// (`Controller::next_free_lpn`, the real allocator, is crate-internal).
pub fn with_namespace(ctrl: &mut Controller, size_lbas: u64) -> u32 {
    let fmt = LbaFormat { lba_data_size_log2: 9, metadata_size: 0 };
    let nsid = ctrl.subsystem.create_namespace(Namespace::new(0, size_lbas, fmt, 0));
    ctrl.subsystem.namespace_mut(nsid).unwrap().active = true;
    nsid
}

/// Host memory double for tests that only ever read what they themselves
/// wrote, matching the `FakeMem` doubles in `engine::nvme::commands::*`.
pub struct NullMemory;

impl HostMemory for NullMemory {
    fn read_u64(&self, _addr: u64) -> u64 {
        0
    }
    fn read_u32(&self, _addr: u64) -> u32 {
        0
    }
    fn read_u8(&self, _addr: u64) -> u8 {
        0
    }
}

/// A flat, pattern-capable host memory double (`ssdsim-runner`'s
/// `HostBuffer`, minus the SQE-encoding helpers this crate doesn't need):
/// scenario tests that stage real byte patterns for Write/Compare (`spec.md`
/// §8 S5) need more than `NullMemory`'s all-zero reads.
pub struct FlatMemory {
    bytes: std::cell::RefCell<Vec<u8>>,
}

impl FlatMemory {
    pub fn new(size: usize) -> Self {
        Self { bytes: std::cell::RefCell::new(vec![0u8; size]) }
    }

    pub fn fill(&self, addr: u64, pattern: &[u8]) {
        let addr = addr as usize;
        self.bytes.borrow_mut()[addr..addr + pattern.len()].copy_from_slice(pattern);
    }

    pub fn write_u32(&self, addr: u64, value: u32) {
        self.fill(addr, &value.to_le_bytes());
    }

    pub fn write_u64(&self, addr: u64, value: u64) {
        self.fill(addr, &value.to_le_bytes());
    }

    /// Writes one 64-byte Submission Queue Entry's common fields
    /// (`engine::nvme::command::Command::fetch`'s layout) — the same
    /// shape as `ssdsim-runner`'s `HostBuffer::write_sqe`.
    #[allow(clippy::too_many_arguments)]
    pub fn write_sqe(&self, addr: u64, opcode: u8, cid: u16, nsid: u32, prp1: u64, prp2: u64, cdw10: u32, cdw12: u32) {
        self.write_u32(addr, opcode as u32 | ((cid as u32) << 16));
        self.write_u32(addr + 4, nsid);
        self.write_u64(addr + 24, prp1);
        self.write_u64(addr + 32, prp2);
        self.write_u32(addr + 40, cdw10);
        self.write_u32(addr + 48, cdw12);
    }
}

impl HostMemory for FlatMemory {
    fn read_u64(&self, addr: u64) -> u64 {
        let mut buf = [0u8; 8];
        self.read_bytes(addr, &mut buf);
        u64::from_le_bytes(buf)
    }

    fn read_u32(&self, addr: u64) -> u32 {
        let mut buf = [0u8; 4];
        self.read_bytes(addr, &mut buf);
        u32::from_le_bytes(buf)
    }

    fn read_u8(&self, addr: u64) -> u8 {
        self.bytes.borrow()[addr as usize]
    }

    fn read_bytes(&self, addr: u64, buf: &mut [u8]) {
        let addr = addr as usize;
        buf.copy_from_slice(&self.bytes.borrow()[addr..addr + buf.len()]);
    }
}

/// Wires up one I/O queue pair outside the NVMe command path, the same
/// shortcut `ssdsim-runner::main::attach_io_queue` uses, so scenario tests
/// can submit I/O commands without going through Create I/O CQ/SQ first.
pub fn attach_io_queue(ctrl: &mut Controller, qid: u16, sq_base: u64, cq_base: u64, depth: u16) {
    let mut sq = SubmissionQueue::new(qid, qid, sq_base, depth);
    sq.state = SqState::Active;
    let mut cq = CompletionQueue::new(qid, cq_base, depth, qid);
    cq.state = CqState::Active;
    ctrl.io_sqs.insert(qid, sq);
    ctrl.io_cqs.insert(qid, cq);
    ctrl.arbitrator.register(qid, PriorityClass::Medium);
}
