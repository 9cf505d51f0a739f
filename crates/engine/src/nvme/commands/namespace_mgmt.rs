//! Namespace Management / Namespace Attachment (`spec.md` §4.7).

use crate::nvme::command::{Command, Gcid};
use crate::nvme::controller::Controller;
use crate::nvme::namespace::{LbaFormat, Namespace};
use crate::nvme::status::NvmeStatus;
use crate::nvme::subsystem::AsyncEventType;

const SEL_CREATE: u32 = 0;
const SEL_DELETE: u32 = 1;

/// `cdw10` bits [7:0]: select (0 create, 1 delete). The NVMe spec carries
/// the create-namespace parameters in a host-memory data structure; this
/// simulator reads the size directly out of `cdw11` for simplicity since
/// no data buffers are modeled.
pub fn namespace_management(ctrl: &mut Controller, cmd: &Command) -> NvmeStatus {
    match cmd.cdw10 & 0xFF {
        SEL_CREATE => {
            let size_lbas = cmd.cdw11 as u64 * 1024;
            let fmt = LbaFormat { lba_data_size_log2: 9, metadata_size: 0 };
            let first_lpn = ctrl.next_free_lpn(size_lbas, &fmt);
            let nsid = ctrl.subsystem.create_namespace(Namespace::new(0, size_lbas, fmt, first_lpn));
            ctrl.subsystem.namespace_mut(nsid).unwrap().active = true;
            fire_changed(ctrl);
            NvmeStatus::Success
        }
        SEL_DELETE => {
            if ctrl.subsystem.delete_namespace(cmd.nsid) {
                fire_changed(ctrl);
                NvmeStatus::Success
            } else {
                NvmeStatus::InvalidField
            }
        }
        _ => NvmeStatus::InvalidField,
    }
}

const ATTACH_SEL_ATTACH: u32 = 0;
const ATTACH_SEL_DETACH: u32 = 1;

pub fn namespace_attachment(ctrl: &mut Controller, cmd: &Command) -> NvmeStatus {
    let Some(ns) = ctrl.subsystem.namespace_mut(cmd.nsid) else { return NvmeStatus::InvalidField };
    match cmd.cdw10 & 0xFF {
        ATTACH_SEL_ATTACH => ns.attach(ctrl.id),
        ATTACH_SEL_DETACH => ns.detach(ctrl.id),
        _ => return NvmeStatus::InvalidField,
    }
    fire_changed(ctrl);
    NvmeStatus::Success
}

fn fire_changed(ctrl: &mut Controller) {
    if let Some(gcid) = ctrl.subsystem.fire_event(AsyncEventType::NamespaceAttributeChanged) {
        ctrl.complete_parked_aer(gcid);
    }
}
