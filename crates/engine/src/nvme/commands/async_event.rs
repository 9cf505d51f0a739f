//! Asynchronous Event Request (`spec.md` §4.7): the one command this
//! simulator completes asynchronously rather than inline — it parks until
//! the subsystem actually has an event to report.

use crate::nvme::command::{Command, Gcid};
use crate::nvme::controller::Controller;

/// Park this AER; the controller completes it later via
/// [`Controller::complete_parked_aer`] once an event fires.
pub fn async_event_request(ctrl: &mut Controller, cmd: &Command) {
    let gcid = Gcid::new(ctrl.id, cmd.sqid, cmd.cid);
    ctrl.park_aer(gcid, cmd.cid);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::nvme::command::{AdminOpcode, Opcode};
    use crate::nvme::controller::tests::test_controller;
    use crate::nvme::namespace::{LbaFormat, Namespace};

    fn cmd(cid: u16) -> Command {
        Command { opcode: Opcode::Admin(AdminOpcode::AsyncEventRequest), cid, sqid: 0, nsid: 0, prp1: 0, prp2: 0, cdw10: 0, cdw11: 0, cdw12: 0, cdw13: 0 }
    }

    #[test]
    fn aer_completes_once_a_namespace_changes() {
        let mut ctrl = test_controller();
        async_event_request(&mut ctrl, &cmd(5));
        assert!(ctrl.completed_cqes().is_empty());
        ctrl.subsystem.create_namespace(Namespace::new(0, 10, LbaFormat { lba_data_size_log2: 9, metadata_size: 0 }, 0));
        let gcid = ctrl
            .subsystem
            .fire_event(crate::nvme::subsystem::AsyncEventType::NamespaceAttributeChanged)
            .expect("a parked aer should be waiting");
        ctrl.complete_parked_aer(gcid);
        assert_eq!(ctrl.completed_cqes().len(), 1);
    }
}
