//! Composes the arbitrator, ICL, FTL, PAL, subsystem and DMA engines into
//! one NVMe controller: fetches commands by priority, dispatches them to
//! the matching handler, and completes them — immediately for most
//! commands, or parked by [`Gcid`] for the one genuinely asynchronous one
//! (Asynchronous Event Request).

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use crate::addr::AddressConfig;
use crate::disk::{DiskBackend, MemoryDisk};
use crate::dma::HostMemory;
use crate::event::{EventEngine, SharedEngine};
use crate::ftl::{Ftl, GcConfig};
use crate::icl::Icl;
use crate::pal::Pal;
use crate::time::Tick;

use super::arbitrator::{Arbitrator, ArbitrationData, PriorityClass};
use super::command::{Command, Gcid, Opcode, AdminOpcode, IoOpcode};
use super::commands;
use super::namespace::LbaFormat;
use super::queue::{CompletionQueue, SubmissionQueue};
use super::status::NvmeStatus;
use super::subsystem::Subsystem;

/// One completed entry queued for a CQ: the queue it belongs to and the
/// status/result word to write there. Actual 16-byte serialization into
/// host memory is the caller's job (it owns the `HostMemory` + DMA
/// wiring); this type is what [`Controller::dispatch_one`] hands back.
pub struct Completion {
    pub cqid: u16,
    pub cid: u16,
    pub status: NvmeStatus,
    pub finished: u64,
}

pub struct Controller {
    pub id: u32,
    pub admin_sq: SubmissionQueue,
    pub admin_cq: CompletionQueue,
    pub io_sqs: HashMap<u16, SubmissionQueue>,
    pub io_cqs: HashMap<u16, CompletionQueue>,
    pub arbitrator: Arbitrator,
    pub subsystem: Subsystem,
    pub ftl: Ftl,
    pub pal: Pal,
    pub icl: Icl,
    pub page_size: u64,
    pub mqes: u16,
    /// The media this controller's namespaces are ultimately backed by
    /// (`spec.md` §1's "disk image"), keyed by `Lpn` at `page_size`
    /// granularity rather than by the FTL's physical `Ppn`: the FTL/PAL
    /// already model physical placement and wear separately, so the disk
    /// image only needs to remember each logical page's last-written
    /// bytes for Compare to check against. Read/Write/Compare
    /// (`nvme::commands::io`) are its only callers.
    pub disk: Box<dyn DiskBackend>,
    /// `spec.md` §5: "the caller supplies a completion event" — this is
    /// the engine every I/O completion's synchronously-computed `finished`
    /// tick (PAL2/FTL/ICL's own contract, per §5's "completion encoded in
    /// cmd.finished") is threaded through, so the run loop has a real
    /// discrete-event clock to drive instead of a blind tick increment.
    pub engine: SharedEngine,
    pub(super) features: HashMap<u32, u32>,
    pending_aer: HashMap<Gcid, u16>,
    /// `(sqid, cid)` pairs an `Abort` targeted before they were fetched
    /// (`spec.md` §8 S6); consulted and consumed by
    /// [`Controller::run_arbitration_cycle`] right after fetch.
    skip_on_fetch: std::collections::HashSet<Gcid>,
    completions: Vec<Completion>,
    next_free_lpn_cursor: u64,
}

impl Controller {
    pub fn new(
        id: u32,
        admin_sq_base: u64,
        admin_cq_base: u64,
        mqes: u16,
        ftl: Ftl,
        pal: Pal,
        icl: Icl,
        page_size: u64,
        arbitration: ArbitrationData,
    ) -> Self {
        let mut admin_sq = SubmissionQueue::new(0, 0, admin_sq_base, mqes);
        admin_sq.state = super::queue::SqState::Active;
        let mut admin_cq = CompletionQueue::new(0, admin_cq_base, mqes, 0);
        admin_cq.state = super::queue::CqState::Active;
        let mut arbitrator = Arbitrator::new(arbitration);
        arbitrator.register(0, PriorityClass::Urgent);
        Self {
            id,
            admin_sq,
            admin_cq,
            io_sqs: HashMap::new(),
            io_cqs: HashMap::new(),
            arbitrator,
            subsystem: Subsystem::new(),
            ftl,
            pal,
            icl,
            page_size,
            mqes,
            disk: Box::new(MemoryDisk::new(page_size as u32)),
            engine: Rc::new(RefCell::new(EventEngine::new())),
            features: HashMap::new(),
            pending_aer: HashMap::new(),
            skip_on_fetch: std::collections::HashSet::new(),
            completions: Vec::new(),
            next_free_lpn_cursor: 0,
        }
    }

    /// Drives the shared event engine forward to `tick` via a one-shot
    /// marker event — the seam where an I/O command's synchronously
    /// computed `finished` tick actually reaches the `EventEngine` the run
    /// loop drives, instead of never touching it at all. A no-op if `tick`
    /// is already in the past.
    pub fn advance_engine_to(&self, tick: u64) {
        let mut engine = self.engine.borrow_mut();
        let target = Tick(tick);
        if target <= engine.now() {
            return;
        }
        let marker = engine.allocate("command_complete", Box::new(|_now, _data| {}));
        engine.schedule(marker, target);
        engine.run_until(target);
        engine.deallocate(marker);
    }

    /// Marks `(sqid, cid)` to be skipped instead of dispatched the next
    /// time it's fetched, if it's currently sitting un-fetched in that
    /// SQ's pending range. Returns whether a matching entry was found.
    pub(super) fn skip_if_unfetched(&mut self, sqid: u16, cid: u16, mem: &dyn HostMemory) -> bool {
        let sq = if sqid == 0 { Some(&self.admin_sq) } else { self.io_sqs.get(&sqid) };
        let Some(sq) = sq else { return false };
        let mut slot = sq.head;
        for _ in 0..sq.pending_count() {
            let addr = sq.entry_addr(slot);
            let dw0 = mem.read_u32(addr);
            let this_cid = (dw0 >> 16) as u16;
            if this_cid == cid {
                self.skip_on_fetch.insert(Gcid::new(self.id, sqid, cid));
                return true;
            }
            slot = (slot + 1) % sq.size;
        }
        false
    }

    /// Allocates a disjoint LPN range for a newly created namespace. A
    /// real controller would track free extents in its address space;
    /// this simulator only ever grows, matching spec.md's non-goal of
    /// modeling namespace capacity reclamation.
    pub(super) fn next_free_lpn(&mut self, size_lbas: u64, fmt: &LbaFormat) -> u64 {
        let first = self.next_free_lpn_cursor;
        let bytes = size_lbas * fmt.lba_bytes();
        let pages = bytes.div_ceil(self.page_size).max(1);
        self.next_free_lpn_cursor += pages;
        first
    }

    pub fn park_aer(&mut self, gcid: Gcid, cid: u16) {
        self.pending_aer.insert(gcid, cid);
        self.subsystem.queue_aer(gcid);
    }

    pub fn abort_parked(&mut self, gcid: Gcid) -> bool {
        if self.pending_aer.remove(&gcid).is_some() {
            self.subsystem.remove_pending_aer(gcid);
            true
        } else {
            false
        }
    }

    pub fn complete_parked_aer(&mut self, gcid: Gcid) {
        if let Some(cid) = self.pending_aer.remove(&gcid) {
            self.completions.push(Completion { cqid: 0, cid, status: NvmeStatus::Success, finished: 0 });
        }
    }

    /// Deleting an SQ aborts every AER parked against it (`spec.md`
    /// §4.7's general "deletion flushes pending commands to abort
    /// status", specialized to the one pending-command class this
    /// controller actually parks).
    pub(super) fn abort_pending_for_sq(&mut self, sqid: u16) {
        let stale: Vec<Gcid> = self
            .pending_aer
            .keys()
            .copied()
            .filter(|g| ((g.0 >> 16) & 0xFFFF) as u16 == sqid)
            .collect();
        for gcid in stale {
            self.pending_aer.remove(&gcid);
            self.subsystem.remove_pending_aer(gcid);
        }
    }

    pub fn now(&self) -> u64 {
        self.engine.borrow().now().as_ps()
    }

    pub fn completed_cqes(&self) -> &[Completion] {
        &self.completions
    }

    fn push_completion(&mut self, cqid: u16, cid: u16, status: NvmeStatus, finished: u64) {
        self.completions.push(Completion { cqid, cid, status, finished });
    }

    /// Dispatches one already-fetched command, pushing its completion
    /// unless it's an AER (parked instead). Returns the status that was
    /// or will be reported.
    pub fn dispatch_one(&mut self, cmd: Command, mem: &dyn HostMemory, now: u64) -> NvmeStatus {
        let cqid = if cmd.sqid == 0 {
            self.admin_sq.cqid
        } else {
            self.io_sqs.get(&cmd.sqid).map(|sq| sq.cqid).unwrap_or(0)
        };

        match cmd.opcode {
            Opcode::Admin(AdminOpcode::CreateIoCq) => {
                let status = commands::queue_admin::create_io_cq(self, &cmd);
                self.push_completion(cqid, cmd.cid, status, now);
                status
            }
            Opcode::Admin(AdminOpcode::DeleteIoCq) => {
                let status = commands::queue_admin::delete_io_cq(self, &cmd);
                self.push_completion(cqid, cmd.cid, status, now);
                status
            }
            Opcode::Admin(AdminOpcode::CreateIoSq) => {
                let status = commands::queue_admin::create_io_sq(self, &cmd);
                self.push_completion(cqid, cmd.cid, status, now);
                status
            }
            Opcode::Admin(AdminOpcode::DeleteIoSq) => {
                let status = commands::queue_admin::delete_io_sq(self, &cmd);
                self.push_completion(cqid, cmd.cid, status, now);
                status
            }
            Opcode::Admin(AdminOpcode::Identify) => {
                let status = commands::identify::identify(self, &cmd);
                self.push_completion(cqid, cmd.cid, status, now);
                status
            }
            Opcode::Admin(AdminOpcode::SetFeatures) => {
                let status = commands::features::set_features(self, &cmd);
                self.push_completion(cqid, cmd.cid, status, now);
                status
            }
            Opcode::Admin(AdminOpcode::GetFeatures) => {
                let (status, _value) = commands::features::get_features(self, &cmd);
                self.push_completion(cqid, cmd.cid, status, now);
                status
            }
            Opcode::Admin(AdminOpcode::AsyncEventRequest) => {
                commands::async_event::async_event_request(self, &cmd);
                NvmeStatus::Success
            }
            Opcode::Admin(AdminOpcode::Abort) => {
                let (status, _aborted) = commands::abort::abort(self, &cmd, mem);
                self.push_completion(cqid, cmd.cid, status, now);
                status
            }
            Opcode::Admin(AdminOpcode::NamespaceManagement) => {
                let status = commands::namespace_mgmt::namespace_management(self, &cmd);
                self.push_completion(cqid, cmd.cid, status, now);
                status
            }
            Opcode::Admin(AdminOpcode::NamespaceAttachment) => {
                let status = commands::namespace_mgmt::namespace_attachment(self, &cmd);
                self.push_completion(cqid, cmd.cid, status, now);
                status
            }
            Opcode::Admin(AdminOpcode::FormatNvm) => {
                let status = commands::format::format_nvm(self, &cmd);
                self.push_completion(cqid, cmd.cid, status, now);
                status
            }
            Opcode::Admin(AdminOpcode::GetLogPage) => {
                let status = match commands::log_page::get_log_page(self, &cmd) {
                    Ok(_) => NvmeStatus::Success,
                    Err(status) => status,
                };
                self.push_completion(cqid, cmd.cid, status, now);
                status
            }
            Opcode::Io(IoOpcode::Read) => {
                let (status, finished) = commands::io::read(self, &cmd, mem, now);
                self.advance_engine_to(finished);
                self.push_completion(cqid, cmd.cid, status, finished);
                status
            }
            Opcode::Io(IoOpcode::Write) => {
                let (status, finished) = commands::io::write(self, &cmd, mem, now);
                self.advance_engine_to(finished);
                self.push_completion(cqid, cmd.cid, status, finished);
                status
            }
            Opcode::Io(IoOpcode::Compare) => {
                let (status, finished) = commands::io::compare(self, &cmd, mem, now);
                self.advance_engine_to(finished);
                self.push_completion(cqid, cmd.cid, status, finished);
                status
            }
            Opcode::Io(IoOpcode::Flush) => {
                let (status, finished) = commands::io::flush(self, &cmd, now);
                self.advance_engine_to(finished);
                self.push_completion(cqid, cmd.cid, status, finished);
                status
            }
            Opcode::Io(IoOpcode::DatasetManagement) => {
                let status = commands::dataset_mgmt::dataset_management(self, &cmd, mem);
                self.push_completion(cqid, cmd.cid, status, now);
                status
            }
        }
    }

    /// One arbitration cycle (`spec.md` §4.7 steps 1-3): asks the
    /// arbitrator which queues to visit and for how many entries, fetches
    /// each command from host memory via `mem`, advances the SQ head
    /// shadow, and dispatches every fetched command.
    pub fn run_arbitration_cycle(&mut self, mem: &dyn HostMemory, now: u64) {
        let plan = {
            let sqs = &self.io_sqs;
            let admin_sq = &self.admin_sq;
            self.arbitrator.run_cycle(|sqid| {
                if sqid == 0 {
                    admin_sq.pending_count()
                } else {
                    sqs.get(&sqid).map(|sq| sq.pending_count()).unwrap_or(0)
                }
            })
        };

        for (sqid, count) in plan {
            for _ in 0..count {
                let is_empty = if sqid == 0 {
                    self.admin_sq.is_empty()
                } else {
                    self.io_sqs.get(&sqid).map(|sq| sq.is_empty()).unwrap_or(true)
                };
                if is_empty {
                    break;
                }
                let (head, base_addr) = if sqid == 0 {
                    (self.admin_sq.head, self.admin_sq.base_addr)
                } else {
                    let sq = self.io_sqs.get(&sqid).expect("checked non-empty above");
                    (sq.head, sq.base_addr)
                };
                let addr = base_addr + head as u64 * 64;
                match Command::fetch(mem, sqid, addr) {
                    Ok(cmd) => {
                        let gcid = Gcid::new(self.id, sqid, cmd.cid);
                        if !self.skip_on_fetch.remove(&gcid) {
                            self.dispatch_one(cmd, mem, now);
                        }
                    }
                    Err(status) => {
                        self.push_completion(0, 0, status, now);
                    }
                }
                if sqid == 0 {
                    self.admin_sq.advance_head(1);
                } else if let Some(sq) = self.io_sqs.get_mut(&sqid) {
                    sq.advance_head(1);
                }
            }
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::ftl::GcPolicy;
    use crate::icl::{EvictionGranularity, IclConfig};
    use crate::icl::mem_timing::{IclMemoryTiming, MemTiming};
    use crate::icl::set::ReplacementPolicy;
    use crate::icl::prefetch::PrefetchConfig;
    use crate::nand_latency::{NandLatencyModel, NandType};
    use crate::pal::PalConfig;

    pub fn test_controller() -> Controller {
        let addr_cfg = AddressConfig::new(1, 1, 1, 1, 64, 64);
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
            sram: MemTiming::Simple { fixed_ps: 50, clk_mhz: 1000, width_bits: 32 },
            dram: MemTiming::Simple { fixed_ps: 500, clk_mhz: 800, width_bits: 64 },
        };
        let icl = Icl::new(icl_cfg, timing, 7).unwrap();
        let arbitration = ArbitrationData { scheme: super::super::arbitrator::ArbitrationScheme::RoundRobin, hpw: 4, mpw: 2, lpw: 1, arbitration_burst: 2 };
        Controller::new(1, 0x1000, 0x2000, 64, ftl, pal, icl, 4096, arbitration)
    }

    pub fn test_controller_with_namespace() -> Controller {
        let mut ctrl = test_controller();
        let fmt = LbaFormat { lba_data_size_log2: 9, metadata_size: 0 };
        let ns = crate::nvme::namespace::Namespace::new(1, 1024, fmt, 0);
        let nsid = ctrl.subsystem.create_namespace(ns);
        ctrl.subsystem.namespace_mut(nsid).unwrap().active = true;
        ctrl
    }

    #[test]
    fn controller_builds_with_admin_queue_active() {
        let ctrl = test_controller();
        assert_eq!(ctrl.admin_sq.qid, 0);
    }
}
