//! End-to-end scenarios S1-S6 (`spec.md` §8). Each drives the same
//! engine surface a real NVMe command handler would (`nvme::commands::io`,
//! `nvme::commands::abort`, `Ftl`/`Icl` directly where a scenario needs to
//! inspect cache/GC state no completion status exposes), the way
//! `engine::nvme::commands::io::tests` and `engine::icl::tests` already do
//! from inside the engine crate.

use ssdsim_engine::addr::Lpn;
use ssdsim_engine::ftl::{Ftl, GcConfig, GcPolicy};
use ssdsim_engine::icl::CacheOutcome;
use ssdsim_engine::nand_latency::{NandLatencyModel, NandType};
use ssdsim_engine::nvme::command::{AdminOpcode, Command, Gcid, IoOpcode, Opcode};
use ssdsim_engine::nvme::commands::abort::abort;
use ssdsim_engine::nvme::commands::io::{compare, read, write};
use ssdsim_engine::nvme::NvmeStatus;
use ssdsim_engine::pal::{Pal, PalConfig};

use ssdsim_testing::harness::{attach_io_queue, build_controller, with_namespace, FlatMemory, NullMemory, SystemConfig};

fn io_cmd(opcode: IoOpcode, cid: u16, nsid: u32, slba: u64, nlb: u32) -> Command {
    Command {
        opcode: Opcode::Io(opcode),
        cid,
        sqid: 1,
        nsid,
        prp1: 0,
        prp2: 0,
        cdw10: slba as u32,
        cdw11: (slba >> 32) as u32,
        cdw12: nlb,
        cdw13: 0,
    }
}

/// S1: a 4 KiB read (`nlb = 8` at 512 B/LBA) on a freshly admin-inited
/// namespace. This engine has no pre-zeroed media state — an LPN nobody
/// has written returns `LbaOutOfRange` — so the range is primed with one
/// write first, mirroring how every other scenario and property test here
/// establishes its starting data.
#[test]
fn s1_single_4kib_read() {
    let mut ctrl = build_controller(SystemConfig::default());
    let nsid = with_namespace(&mut ctrl, 1 << 15);
    let mem = NullMemory;

    let (w_status, w_finished) = write(&mut ctrl, &io_cmd(IoOpcode::Write, 1, nsid, 0, 7), &mem, 0);
    assert_eq!(w_status, NvmeStatus::Success);

    let (r_status, r_finished) = read(&mut ctrl, &io_cmd(IoOpcode::Read, 2, nsid, 0, 7), &mem, w_finished);
    assert_eq!(r_status, NvmeStatus::Success);
    assert!(r_finished > w_finished, "a read that must hit NAND or cache takes nonzero time");

    // Read-cache enabled: re-reading the same page is a pure cache hit,
    // i.e. strictly less additional latency than the first, cold read.
    let cache_access = ctrl.icl.read(&mut ctrl.ftl, &mut ctrl.pal, Lpn(0), r_finished).unwrap();
    assert_eq!(cache_access.outcome, CacheOutcome::Hit);

    // Write-cache disabled: the same write now goes straight to the FTL
    // (`CacheOutcome::Miss`), paying NAND latency on every write instead
    // of coalescing in the cache.
    let no_write_cache = SystemConfig { write_cache: false, ..SystemConfig::default() };
    let mut ctrl2 = build_controller(no_write_cache);
    let direct = ctrl2.icl.write(&mut ctrl2.ftl, &mut ctrl2.pal, Lpn(0), 0).unwrap();
    assert_eq!(direct.outcome, CacheOutcome::Miss);
}

/// S2: 4 consecutive 8-LBA (= one page) reads starting at slba 0, 8, 16,
/// 24 trigger prefetch on the third; the fourth completes as a cache hit
/// with no further NAND access. The pages are pre-written (see S1's note)
/// so the scenario can exercise the read path alone.
#[test]
fn s2_sequential_prefetch_skips_nand_on_the_fourth_read() {
    use ssdsim_engine::icl::prefetch::PrefetchConfig;
    let mut cfg = SystemConfig::default();
    cfg.prefetch = PrefetchConfig { enabled: true, sequential_threshold: 3, coverage_ratio: 0.9, prefetch_pages: 2 };
    let mut ctrl = build_controller(cfg);
    let nsid = with_namespace(&mut ctrl, 1 << 15);
    let mem = NullMemory;

    let mut now = 0u64;
    for slba in [0u64, 8, 16, 24, 32] {
        let (status, finished) = write(&mut ctrl, &io_cmd(IoOpcode::Write, 1, nsid, slba, 7), &mem, now);
        assert_eq!(status, NvmeStatus::Success);
        now = finished;
    }
    ctrl.icl.flush(&mut ctrl.ftl, &mut ctrl.pal, &(0..5).map(Lpn).collect::<Vec<_>>(), now);

    // lpn 0, 1, 2 — the third access crosses `sequential_threshold = 3`
    // and prefetches lpn 3 and lpn 4 into empty ways.
    ctrl.icl.read(&mut ctrl.ftl, &mut ctrl.pal, Lpn(0), now).unwrap();
    ctrl.icl.read(&mut ctrl.ftl, &mut ctrl.pal, Lpn(1), now).unwrap();
    ctrl.icl.read(&mut ctrl.ftl, &mut ctrl.pal, Lpn(2), now).unwrap();

    let fourth = ctrl.icl.read(&mut ctrl.ftl, &mut ctrl.pal, Lpn(3), now).unwrap();
    assert_eq!(fourth.outcome, CacheOutcome::Hit, "lpn 3 should already be resident from the prefetch");
}

/// S3: 8 writes of 512 B to slba 0..7 (all inside one 4 KiB page) coalesce
/// into a single dirty cache line and a single FTL write on flush.
#[test]
fn s3_small_writes_to_one_page_coalesce_into_one_ftl_write() {
    let mut ctrl = build_controller(SystemConfig::default());
    let lpn = Lpn(5);

    for _ in 0..8 {
        let access = ctrl.icl.write(&mut ctrl.ftl, &mut ctrl.pal, lpn, 0).unwrap();
        assert_eq!(access.outcome, CacheOutcome::Hit, "every small write hits the already-dirtied line");
    }
    assert!(ctrl.ftl.read_mapping(lpn).is_err(), "nothing has reached the FTL before flush");

    ctrl.icl.flush(&mut ctrl.ftl, &mut ctrl.pal, &[lpn], 0);
    assert!(ctrl.ftl.read_mapping(lpn).is_ok(), "flush performs exactly the one deferred FTL write");
}

/// S4: filling a tight-capacity device well past its GC threshold, then
/// overwriting part of what was written, forces at least one reclaim pass
/// and bumps at least one block's erase count — and every write still
/// succeeds. The literal 95%/10% ratios assume a live-capacity tracker
/// this `PageMapper` doesn't keep; a small geometry with a generous
/// overwrite pass exercises the same invariant deterministically instead.
#[test]
fn s4_gc_runs_under_pressure_without_host_errors() {
    let addr_cfg = ssdsim_engine::addr::AddressConfig::new(1, 1, 1, 1, 4, 4); // 16 pages total
    let latency = NandLatencyModel::new(NandType::Mlc, 400, 4096).unwrap();
    let mut pal = Pal::new(1, 1, PalConfig { latency_anti_collision: 0 }, latency);
    let gc_cfg = GcConfig { policy: GcPolicy::Greedy, free_ratio_threshold: 0.3 };
    let mut ftl = Ftl::new(addr_cfg, gc_cfg);

    let mut now = 0u64;
    // Fill well past capacity (16 pages) to guarantee GC has to reclaim.
    for i in 0..20u64 {
        let timing = ftl.write(&mut pal, Lpn(i), now).unwrap();
        now = timing.finished;
    }
    // Overwrite 10% of what was written, creating genuine garbage.
    for i in 0..2u64 {
        let timing = ftl.write(&mut pal, Lpn(i), now).unwrap();
        now = timing.finished;
    }

    assert!(ftl.blocks_reclaimed() > 0, "GC must have run at least once");
    assert!(ftl.total_erase_count() >= 1, "a reclaimed block's erase count must increase");
}

/// S5: Compare against mismatched host data. `Compare` walks the same
/// cache/FTL/PAL pipeline as `Read`, then memcmps the `DiskBackend` image
/// of each page's last-written bytes against what the host staged for
/// comparison (`engine::nvme::commands::io::compare`), so a real mismatch
/// reports `MediaAndDataIntegrityCompareFailure` rather than silently
/// agreeing with whatever `Read` would return.
#[test]
fn s5_compare_against_mismatched_host_data_fails() {
    let mut ctrl = build_controller(SystemConfig::default());
    let nsid = with_namespace(&mut ctrl, 1 << 15);
    let mem = FlatMemory::new(1 << 16);

    mem.fill(0, &vec![0xAAu8; ctrl.page_size as usize]);
    let (w_status, finished) = write(&mut ctrl, &io_cmd(IoOpcode::Write, 1, nsid, 0, 7), &mem, 0);
    assert_eq!(w_status, NvmeStatus::Success);

    // Comparing against the exact bytes just written succeeds.
    let (match_status, finished) = compare(&mut ctrl, &io_cmd(IoOpcode::Compare, 2, nsid, 0, 7), &mem, finished);
    assert_eq!(match_status, NvmeStatus::Success);

    // The host now stages different data for the same range: a real
    // media mismatch, not representable by aliasing Compare to Read.
    mem.fill(0, &vec![0xBBu8; ctrl.page_size as usize]);
    let (mismatch_status, _) = compare(&mut ctrl, &io_cmd(IoOpcode::Compare, 3, nsid, 0, 7), &mem, finished);
    assert_eq!(mismatch_status, NvmeStatus::MediaAndDataIntegrityCompareFailure);
}

/// S6: Abort targeting a command still sitting un-fetched in its SQ. The
/// target is submitted but the arbitration cycle never runs before the
/// Abort lands, so `Controller::skip_if_unfetched` must find it in the
/// queue and mark it to be skipped rather than dispatched — the command
/// never completes at all, instead of completing normally.
#[test]
fn s6_abort_against_an_unfetched_command_prevents_it_from_completing() {
    let mut ctrl = build_controller(SystemConfig::default());
    let nsid = with_namespace(&mut ctrl, 1 << 15);
    let mem = FlatMemory::new(1 << 16);

    let io_qid = 1u16;
    let sq_base = 0x2_0000u64;
    let cq_base = 0x3_0000u64;
    attach_io_queue(&mut ctrl, io_qid, sq_base, cq_base, 8);

    let read_cid = 9u16;
    mem.write_sqe(ctrl.io_sqs[&io_qid].entry_addr(0), IoOpcode::Read as u8, read_cid, nsid, 0, 0, 0, 7);
    ctrl.io_sqs.get_mut(&io_qid).unwrap().set_tail(1);

    let target = Gcid::new(ctrl.id, io_qid, read_cid);

    let abort_cmd = Command {
        opcode: Opcode::Admin(AdminOpcode::Abort),
        cid: 10,
        sqid: 0,
        nsid: 0,
        prp1: 0,
        prp2: 0,
        cdw10: io_qid as u32 | ((read_cid as u32) << 16),
        cdw11: 0,
        cdw12: 0,
        cdw13: 0,
    };
    let (abort_status, aborted) = abort(&mut ctrl, &abort_cmd, &mem);
    assert_eq!(abort_status, NvmeStatus::Success);
    assert!(aborted, "the Read is still sitting un-fetched in its SQ, so it must be found and skipped");

    // The arbitration cycle now fetches the Read's slot, recognizes it as
    // skip-on-fetch, and never dispatches or completes it.
    ctrl.run_arbitration_cycle(&mem, 0);
    assert!(
        !ctrl.completed_cqes().iter().any(|c| c.cid == read_cid),
        "an aborted, never-fetched command must never produce a completion"
    );
    let _ = target;
}
