//! Abort (`spec.md` §4.7): looks up `(sqid, cid)` among this controller's
//! parked commands, then — for any ordinary command, not just a parked
//! AER — among the target SQ's un-fetched entries (`spec.md` §8 S6). The
//! Abort command itself never errors; its result is carried in the
//! `aborted` flag (NVMe's completion dword0 bit 0, inverted: 1 means
//! "command not aborted").

use crate::dma::HostMemory;
use crate::nvme::command::{Command, Gcid};
use crate::nvme::controller::Controller;
use crate::nvme::status::NvmeStatus;

pub fn abort(ctrl: &mut Controller, cmd: &Command, mem: &dyn HostMemory) -> (NvmeStatus, bool) {
    let target_sqid = (cmd.cdw10 & 0xFFFF) as u16;
    let target_cid = ((cmd.cdw10 >> 16) & 0xFFFF) as u16;
    let gcid = Gcid::new(ctrl.id, target_sqid, target_cid);
    let aborted = ctrl.abort_parked(gcid) || ctrl.skip_if_unfetched(target_sqid, target_cid, mem);
    (NvmeStatus::Success, aborted)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::nvme::command::{AdminOpcode, Opcode};
    use crate::nvme::controller::tests::test_controller;
    use crate::nvme::queue::SubmissionQueue;
    use std::cell::RefCell;
    use std::collections::HashMap;

    struct FakeMem(RefCell<HashMap<u64, u32>>);
    impl HostMemory for FakeMem {
        fn read_u64(&self, addr: u64) -> u64 {
            self.read_u32(addr) as u64
        }
        fn read_u32(&self, addr: u64) -> u32 {
            *self.0.borrow().get(&addr).unwrap_or(&0)
        }
        fn read_u8(&self, addr: u64) -> u8 {
            self.read_u32(addr) as u8
        }
    }

    fn cmd(sqid: u16, cid: u16) -> Command {
        Command {
            opcode: Opcode::Admin(AdminOpcode::Abort),
            cid: 1,
            sqid: 0,
            nsid: 0,
            prp1: 0,
            prp2: 0,
            cdw10: sqid as u32 | ((cid as u32) << 16),
            cdw11: 0,
            cdw12: 0,
            cdw13: 0,
        }
    }

    #[test]
    fn aborting_a_command_not_in_flight_reports_not_aborted() {
        let mut ctrl = test_controller();
        let mem = FakeMem(RefCell::new(HashMap::new()));
        let (status, aborted) = abort(&mut ctrl, &cmd(1, 77), &mem);
        assert_eq!(status, NvmeStatus::Success);
        assert!(!aborted);
    }

    #[test]
    fn aborting_a_parked_aer_succeeds() {
        let mut ctrl = test_controller();
        ctrl.park_aer(Gcid::new(ctrl.id, 0, 42), 0);
        let mem = FakeMem(RefCell::new(HashMap::new()));
        let (status, aborted) = abort(&mut ctrl, &cmd(0, 42), &mem);
        assert_eq!(status, NvmeStatus::Success);
        assert!(aborted);
    }

    #[test]
    fn aborting_an_unfetched_sq_entry_reports_aborted() {
        let mut ctrl = test_controller();
        let mut sq = SubmissionQueue::new(1, 1, 0x9000, 8);
        sq.set_tail(1); // one pending entry at slot 0, cid 99 via dw0
        ctrl.io_sqs.insert(1, sq);
        let mem = FakeMem(RefCell::new(HashMap::new()));
        mem.0.borrow_mut().insert(0x9000, (99u32) << 16); // dw0: opcode 0, cid 99
        let (status, aborted) = abort(&mut ctrl, &cmd(1, 99), &mem);
        assert_eq!(status, NvmeStatus::Success);
        assert!(aborted);
    }
}
