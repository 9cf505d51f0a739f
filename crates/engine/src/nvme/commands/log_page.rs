//! Get Log Page (`spec.md` §4.7): SMART/Health (0x02) and Changed
//! Namespace List (0x04). Only the latter has observable structure in
//! this address/timing-only simulator; SMART always reports healthy.

use crate::nvme::command::Command;
use crate::nvme::controller::Controller;
use crate::nvme::status::NvmeStatus;

const LID_SMART_HEALTH: u32 = 0x02;
const LID_CHANGED_NAMESPACE_LIST: u32 = 0x04;

pub enum LogPage {
    Smart,
    ChangedNamespaceList(Vec<u32>),
}

pub fn get_log_page(ctrl: &mut Controller, cmd: &Command) -> Result<LogPage, NvmeStatus> {
    match cmd.cdw10 & 0xFF {
        LID_SMART_HEALTH => Ok(LogPage::Smart),
        LID_CHANGED_NAMESPACE_LIST => {
            let list = ctrl.subsystem.changed_namespace_list();
            ctrl.subsystem.clear_changed_namespace_list();
            Ok(LogPage::ChangedNamespaceList(list))
        }
        _ => Err(NvmeStatus::InvalidField),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::nvme::command::{AdminOpcode, Opcode};
    use crate::nvme::controller::tests::test_controller;

    fn cmd(lid: u32) -> Command {
        Command { opcode: Opcode::Admin(AdminOpcode::GetLogPage), cid: 1, sqid: 0, nsid: 0, prp1: 0, prp2: 0, cdw10: lid, cdw11: 0, cdw12: 0, cdw13: 0 }
    }

    #[test]
    fn smart_log_always_available() {
        let mut ctrl = test_controller();
        assert!(matches!(get_log_page(&mut ctrl, &cmd(LID_SMART_HEALTH)), Ok(LogPage::Smart)));
    }

    #[test]
    fn changed_namespace_list_reads_then_clears() {
        let mut ctrl = test_controller();
        ctrl.subsystem.create_namespace(crate::nvme::namespace::Namespace::new(
            0,
            10,
            crate::nvme::namespace::LbaFormat { lba_data_size_log2: 9, metadata_size: 0 },
            0,
        ));
        let LogPage::ChangedNamespaceList(list) =
            get_log_page(&mut ctrl, &cmd(LID_CHANGED_NAMESPACE_LIST)).unwrap()
        else {
            panic!("expected changed namespace list");
        };
        assert_eq!(list, vec![1]);
        assert!(ctrl.subsystem.changed_namespace_list().is_empty());
    }

    #[test]
    fn unknown_lid_is_rejected() {
        let mut ctrl = test_controller();
        assert!(get_log_page(&mut ctrl, &cmd(0x99)).is_err());
    }
}
