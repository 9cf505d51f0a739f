//! Set/Get Features (`spec.md` §4.7; Open Question decision #3 in
//! DESIGN.md: `Save` is unsupported).

use crate::nvme::command::Command;
use crate::nvme::controller::Controller;
use crate::nvme::status::NvmeStatus;

pub fn set_features(ctrl: &mut Controller, cmd: &Command) -> NvmeStatus {
    let feature_id = cmd.cdw10 & 0xFF;
    let save = (cmd.cdw10 >> 31) & 0x1 != 0;
    if save {
        return NvmeStatus::FeatureIdentifierNotSaveable;
    }
    ctrl.features.insert(feature_id, cmd.cdw11);
    NvmeStatus::Success
}

pub fn get_features(ctrl: &Controller, cmd: &Command) -> (NvmeStatus, u32) {
    let feature_id = cmd.cdw10 & 0xFF;
    match ctrl.features.get(&feature_id) {
        Some(&value) => (NvmeStatus::Success, value),
        None => (NvmeStatus::InvalidField, 0),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::nvme::command::{AdminOpcode, Opcode};
    use crate::nvme::controller::tests::test_controller;

    fn cmd(cdw10: u32, cdw11: u32) -> Command {
        Command {
            opcode: Opcode::Admin(AdminOpcode::SetFeatures),
            cid: 1,
            sqid: 0,
            nsid: 0,
            prp1: 0,
            prp2: 0,
            cdw10,
            cdw11,
            cdw12: 0,
            cdw13: 0,
        }
    }

    #[test]
    fn save_bit_is_rejected() {
        let mut ctrl = test_controller();
        let c = cmd(0x07 | (1 << 31), 4);
        assert_eq!(set_features(&mut ctrl, &c), NvmeStatus::FeatureIdentifierNotSaveable);
    }

    #[test]
    fn set_then_get_round_trips() {
        let mut ctrl = test_controller();
        set_features(&mut ctrl, &cmd(0x07, 4));
        let (status, value) = get_features(&ctrl, &cmd(0x07, 0));
        assert_eq!(status, NvmeStatus::Success);
        assert_eq!(value, 4);
    }

    #[test]
    fn get_unset_feature_is_invalid_field() {
        let ctrl = test_controller();
        let (status, _) = get_features(&ctrl, &cmd(0x55, 0));
        assert_eq!(status, NvmeStatus::InvalidField);
    }
}
