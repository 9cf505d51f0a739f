//! Format NVM (`spec.md` §4.7): validates `ses`/`lbaf` then trims the
//! whole namespace through the FTL.

use crate::nvme::command::Command;
use crate::nvme::controller::Controller;
use crate::nvme::status::NvmeStatus;

const MAX_LBAF: u32 = 15;
const MAX_SES: u32 = 2;

pub fn format_nvm(ctrl: &mut Controller, cmd: &Command) -> NvmeStatus {
    let lbaf = cmd.cdw10 & 0xF;
    let ses = (cmd.cdw10 >> 9) & 0x7;
    if lbaf > MAX_LBAF || ses > MAX_SES {
        return NvmeStatus::InvalidField;
    }
    let page_size = ctrl.page_size;
    let Some(ns) = ctrl.subsystem.namespace(cmd.nsid) else { return NvmeStatus::InvalidField };
    let lpns: Vec<crate::addr::Lpn> = (ns.first_lpn..=ns.last_lpn(page_size)).map(crate::addr::Lpn).collect();
    ctrl.icl.invalidate(&mut ctrl.ftl, lpns);
    NvmeStatus::Success
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::nvme::command::{AdminOpcode, Opcode};
    use crate::nvme::controller::tests::test_controller_with_namespace;

    fn cmd(cdw10: u32, nsid: u32) -> Command {
        Command { opcode: Opcode::Admin(AdminOpcode::FormatNvm), cid: 1, sqid: 0, nsid, prp1: 0, prp2: 0, cdw10, cdw11: 0, cdw12: 0, cdw13: 0 }
    }

    #[test]
    fn format_clears_the_namespace() {
        let mut ctrl = test_controller_with_namespace();
        assert_eq!(format_nvm(&mut ctrl, &cmd(0, 1)), NvmeStatus::Success);
    }

    #[test]
    fn invalid_lbaf_is_rejected() {
        let mut ctrl = test_controller_with_namespace();
        assert_eq!(format_nvm(&mut ctrl, &cmd(0xFF, 1)), NvmeStatus::InvalidField);
    }
}
