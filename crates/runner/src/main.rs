//! Command-line driver for the discrete-event SSD simulation engine.
//! Loads a device config, builds one [`ssdsim_engine::nvme::Controller`],
//! drives it through a fixed admin/I/O workload, and prints a summary —
//! the same "init tracing, do the thing, report" shape as the teacher's
//! `apps/daemon`, minus the REST/WebSocket surface this engine has no
//! use for.

mod cli;
mod config_loader;
mod host_memory;
mod progress;
mod report;

use anyhow::{Context, Result};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use cli::Args;
use config_loader::DeviceSettings;
use host_memory::HostBuffer;
use progress::ProgressReporter;
use report::RunReport;

use ssdsim_engine::addr::AddressConfig;
use ssdsim_engine::ftl::{Ftl, GcConfig, GcPolicy};
use ssdsim_engine::icl::mem_timing::{IclMemoryTiming, MemTiming};
use ssdsim_engine::icl::prefetch::PrefetchConfig;
use ssdsim_engine::icl::set::ReplacementPolicy;
use ssdsim_engine::icl::{EvictionGranularity, Icl, IclConfig};
use ssdsim_engine::nand_latency::NandLatencyModel;
use ssdsim_engine::nvme::arbitrator::{ArbitrationData, ArbitrationScheme, PriorityClass};
use ssdsim_engine::nvme::command::{AdminOpcode, IoOpcode};
use ssdsim_engine::nvme::namespace::{LbaFormat, Namespace};
use ssdsim_engine::nvme::queue::{CompletionQueue, SubmissionQueue};
use ssdsim_engine::nvme::Controller;
use ssdsim_engine::pal::{Pal, PalConfig};

const ADMIN_SQ_BASE: u64 = 0x0_0000;
const ADMIN_CQ_BASE: u64 = 0x1_0000;
const IO_SQ_BASE: u64 = 0x2_0000;
const IO_CQ_BASE: u64 = 0x3_0000;
const QUEUE_DEPTH: u16 = 64;
const MEM_SIZE: usize = 0x10_0000;
/// Spacing between arbitration passes when nothing dispatched advances the
/// clock on its own — the engine-driven equivalent of the old fixed
/// `now += 1000` increment.
const ARBITRATION_CYCLE_PS: u64 = 1000;

fn build_controller(settings: &DeviceSettings) -> Result<Controller> {
    let addr_cfg = AddressConfig::new(
        settings.channels,
        settings.packages,
        settings.dies,
        settings.planes,
        settings.blocks,
        settings.pages,
    );
    let latency = NandLatencyModel::new(settings.nand_type, settings.dma_mhz, settings.page_size)
        .context("building NAND latency model")?;
    let pal = Pal::new(
        settings.channels as usize,
        (settings.packages * settings.dies) as usize,
        PalConfig { latency_anti_collision: 0 },
        latency,
    );
    let gc_cfg = GcConfig { policy: GcPolicy::Greedy, free_ratio_threshold: settings.free_ratio_threshold };
    let ftl = Ftl::new(addr_cfg, gc_cfg);

    let icl_cfg = IclConfig {
        read_cache: true,
        write_cache: true,
        cache_size: settings.cache_size,
        ways: settings.cache_ways,
        line_size: settings.line_size,
        policy: ReplacementPolicy::Lru,
        eviction_granularity: EvictionGranularity::Single,
        prefetch: PrefetchConfig { enabled: false, sequential_threshold: 3, coverage_ratio: 0.9, prefetch_pages: 2 },
    };
    let timing = IclMemoryTiming {
        sram: MemTiming::Simple { fixed_ps: 50, clk_mhz: 1000, width_bits: 32 },
        dram: MemTiming::Simple { fixed_ps: 500, clk_mhz: 800, width_bits: 64 },
    };
    let icl = Icl::new(icl_cfg, timing, 7).context("building ICL")?;

    let arbitration = ArbitrationData {
        scheme: ArbitrationScheme::RoundRobin,
        hpw: 4,
        mpw: 2,
        lpw: 1,
        arbitration_burst: 3,
    };
    Ok(Controller::new(1, ADMIN_SQ_BASE, ADMIN_CQ_BASE, QUEUE_DEPTH, ftl, pal, icl, settings.page_size, arbitration))
}

/// Wires up one I/O queue pair outside the NVMe command path (what a
/// real driver would do through Create I/O CQ/SQ) so the workload below
/// has somewhere to submit Read/Write/Flush/Dataset Management commands.
fn attach_io_queue(ctrl: &mut Controller, qid: u16) {
    let mut sq = SubmissionQueue::new(qid, qid, IO_SQ_BASE, QUEUE_DEPTH);
    sq.state = ssdsim_engine::nvme::queue::SqState::Active;
    let mut cq = CompletionQueue::new(qid, IO_CQ_BASE, QUEUE_DEPTH, qid);
    cq.state = ssdsim_engine::nvme::queue::CqState::Active;
    ctrl.io_sqs.insert(qid, sq);
    ctrl.io_cqs.insert(qid, cq);
    ctrl.arbitrator.register(qid, PriorityClass::Medium);
}

fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(fmt::layer().with_target(true))
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    tracing::info!("ssdsim starting");
    let args = Args::parse();

    let settings = match &args.config_path {
        Some(path) => DeviceSettings::load(path)?,
        None => {
            tracing::info!("no --config given, using built-in defaults");
            DeviceSettings::from_config(&ssdsim_engine::config::Config::empty())?
        }
    };

    let mut ctrl = build_controller(&settings)?;

    let fmt = LbaFormat { lba_data_size_log2: 9, metadata_size: 0 };
    let size_lbas = 1u64 << 20;
    // `Controller::next_free_lpn` is crate-internal to ssdsim-engine; this
    // driver only ever creates one namespace, so LPN 0 is always free.
    let nsid = ctrl.subsystem.create_namespace(Namespace::new(0, size_lbas, fmt, 0));
    ctrl.subsystem.namespace_mut(nsid).unwrap().active = true;

    let io_qid = 1u16;
    attach_io_queue(&mut ctrl, io_qid);

    let mut mem = HostBuffer::new(MEM_SIZE);

    // Admin: ask to be told about namespace-attribute changes, then poke one.
    mem.write_sqe(ctrl.admin_sq.entry_addr(0), AdminOpcode::AsyncEventRequest as u8, 1, 0, 0, 0, 0, 0, 0, 0);
    mem.write_sqe(
        ctrl.admin_sq.entry_addr(1),
        AdminOpcode::NamespaceAttachment as u8,
        2,
        nsid,
        0,
        0,
        0, // attach
        0,
        0,
        0,
    );
    ctrl.admin_sq.set_tail(2);

    // I/O: a handful of writes, reads, and one deallocate at the front of the range.
    let mut slot = 0u16;
    let mut cid = 1u16;
    for i in 0..args.io_depth {
        let slba = (i as u64) * 8;
        mem.write_sqe(
            ctrl.io_sqs[&io_qid].entry_addr(slot),
            IoOpcode::Write as u8,
            cid,
            nsid,
            0,
            0,
            slba as u32,
            (slba >> 32) as u32,
            7, // nlb = 8 blocks (0's-based)
            0,
        );
        slot += 1;
        cid += 1;
        mem.write_sqe(
            ctrl.io_sqs[&io_qid].entry_addr(slot),
            IoOpcode::Read as u8,
            cid,
            nsid,
            0,
            0,
            slba as u32,
            (slba >> 32) as u32,
            7,
            0,
        );
        slot += 1;
        cid += 1;
    }
    ctrl.io_sqs.get_mut(&io_qid).unwrap().set_tail(slot);

    let progress = ProgressReporter::new("ssdsim", args.progress, args.duration_ticks);
    loop {
        let now = ctrl.now();
        if now >= args.duration_ticks {
            break;
        }
        ctrl.run_arbitration_cycle(&mem, now);
        progress.tick(ctrl.now(), ctrl.completed_cqes().len());
        let io_sq_empty = ctrl.io_sqs.get(&io_qid).map(|sq| sq.is_empty()).unwrap_or(true);
        if ctrl.admin_sq.is_empty() && io_sq_empty {
            break;
        }
        if ctrl.now() == now {
            ctrl.advance_engine_to(now + ARBITRATION_CYCLE_PS);
        }
    }
    progress.finish(ctrl.completed_cqes().len());

    let report = RunReport::summarize(ctrl.completed_cqes());
    report.print();
    if let Err(err) = report.write_to_prefix(&args.out_prefix) {
        tracing::warn!("failed to write report to {}.report.txt: {err}", args.out_prefix);
    }
    if report.error_count() > 0 {
        tracing::warn!("{} completions reported a non-success status", report.error_count());
    }
    Ok(())
}
