//! Identify (`spec.md` §4.7): CNS-selected 4 KiB structure. No byte
//! contents are modeled (this simulator represents addresses/timing, not
//! data), so the handler only validates the request and reports success.

use crate::nvme::command::Command;
use crate::nvme::controller::Controller;
use crate::nvme::status::NvmeStatus;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdentifyCns {
    Namespace,
    Controller,
    ActiveNamespaceList,
}

fn decode_cns(cdw10: u32) -> Option<IdentifyCns> {
    match cdw10 & 0xFF {
        0x00 => Some(IdentifyCns::Namespace),
        0x01 => Some(IdentifyCns::Controller),
        0x02 => Some(IdentifyCns::ActiveNamespaceList),
        _ => None,
    }
}

pub fn identify(ctrl: &Controller, cmd: &Command) -> NvmeStatus {
    let Some(cns) = decode_cns(cmd.cdw10) else { return NvmeStatus::InvalidField };
    match cns {
        IdentifyCns::Namespace => {
            if ctrl.subsystem.namespace(cmd.nsid).is_some() {
                NvmeStatus::Success
            } else {
                NvmeStatus::InvalidField
            }
        }
        IdentifyCns::Controller | IdentifyCns::ActiveNamespaceList => NvmeStatus::Success,
    }
}
