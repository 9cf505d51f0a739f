//! Dataset Management / Deallocate (`spec.md` §4.7): a host-memory range
//! list of 16-byte descriptors, each converted to an LPN range and
//! forwarded to the FTL/ICL as a trim.

use crate::dma::HostMemory;
use crate::nvme::command::Command;
use crate::nvme::controller::Controller;
use crate::nvme::status::NvmeStatus;

struct RangeDescriptor {
    nlb: u32,
    slba: u64,
}

/// NLB is a 0's-based value (NVMe 1.4b §5.15.2.1), same convention as
/// Read/Write's cdw12 field in `engine::nvme::commands::io`.
fn read_range(mem: &dyn HostMemory, addr: u64) -> RangeDescriptor {
    let nlb = mem.read_u32(addr + 4) + 1;
    let slba = mem.read_u64(addr + 8);
    RangeDescriptor { nlb, slba }
}

pub fn dataset_management(ctrl: &mut Controller, cmd: &Command, mem: &dyn HostMemory) -> NvmeStatus {
    let deallocate = cmd.cdw11 & 0x1 != 0;
    if !deallocate {
        return NvmeStatus::Success; // Advise-only attributes are no-ops here.
    }
    let nr = (cmd.cdw10 & 0xFF) as u64 + 1;
    let page_size = ctrl.page_size;
    let Some(ns) = ctrl.subsystem.namespace(cmd.nsid) else { return NvmeStatus::InvalidField };
    let lba_bytes = ns.lba_format.lba_bytes();
    let first_lpn = ns.first_lpn;

    for i in 0..nr {
        let desc = read_range(mem, cmd.prp1 + i * 16);
        if !ns.lba_in_range(desc.slba, desc.nlb as u64) {
            return NvmeStatus::LbaOutOfRange;
        }
        let first_byte = desc.slba * lba_bytes;
        let last_byte = (desc.slba + desc.nlb as u64) * lba_bytes - 1;
        let lpns: Vec<crate::addr::Lpn> = (first_lpn + first_byte / page_size..=first_lpn + last_byte / page_size)
            .map(crate::addr::Lpn)
            .collect();
        ctrl.icl.invalidate(&mut ctrl.ftl, lpns);
    }
    NvmeStatus::Success
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::nvme::command::{IoOpcode, Opcode};
    use crate::nvme::controller::tests::test_controller_with_namespace;
    use std::cell::RefCell;
    use std::collections::HashMap;

    struct FakeMem(RefCell<HashMap<u64, u64>>);
    impl HostMemory for FakeMem {
        fn read_u64(&self, addr: u64) -> u64 {
            *self.0.borrow().get(&addr).unwrap_or(&0)
        }
        fn read_u32(&self, addr: u64) -> u32 {
            self.read_u64(addr) as u32
        }
        fn read_u8(&self, addr: u64) -> u8 {
            self.read_u64(addr) as u8
        }
    }

    #[test]
    fn deallocate_trims_the_declared_range() {
        let mut ctrl = test_controller_with_namespace();
        let mem = FakeMem(RefCell::new(HashMap::new()));
        mem.0.borrow_mut().insert(0x5004, 0); // nlb = 0 -> 1 block
        mem.0.borrow_mut().insert(0x5008, 0); // slba = 0
        let cmd = Command {
            opcode: Opcode::Io(IoOpcode::DatasetManagement),
            cid: 1,
            sqid: 1,
            nsid: 1,
            prp1: 0x5000,
            prp2: 0,
            cdw10: 0, // nr = 1
            cdw11: 0x1,
            cdw12: 0,
            cdw13: 0,
        };
        assert_eq!(dataset_management(&mut ctrl, &cmd, &mem), NvmeStatus::Success);
    }
}
