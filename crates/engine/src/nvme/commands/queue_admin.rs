//! Create/Delete I/O Submission/Completion Queue (`spec.md` §4.7).

use crate::nvme::arbitrator::PriorityClass;
use crate::nvme::command::Command;
use crate::nvme::controller::Controller;
use crate::nvme::queue::{CompletionQueue, CqState, SqState, SubmissionQueue};
use crate::nvme::status::NvmeStatus;

pub fn create_io_cq(ctrl: &mut Controller, cmd: &Command) -> NvmeStatus {
    let qid = (cmd.cdw10 & 0xFFFF) as u16;
    let qsize = ((cmd.cdw10 >> 16) & 0xFFFF) as u16 + 1;
    let interrupt_vector = (cmd.cdw11 >> 16) as u16;
    if qid == 0 || ctrl.io_cqs.contains_key(&qid) {
        return NvmeStatus::InvalidQueueIdentifier;
    }
    if qsize > ctrl.mqes {
        return NvmeStatus::InvalidField;
    }
    let mut cq = CompletionQueue::new(qid, cmd.prp1, qsize, interrupt_vector);
    cq.state = CqState::Active;
    ctrl.io_cqs.insert(qid, cq);
    NvmeStatus::Success
}

pub fn delete_io_cq(ctrl: &mut Controller, cmd: &Command) -> NvmeStatus {
    let qid = (cmd.cdw10 & 0xFFFF) as u16;
    if ctrl.io_sqs.values().any(|sq| sq.cqid == qid) {
        return NvmeStatus::InvalidQueueIdentifier;
    }
    match ctrl.io_cqs.remove(&qid) {
        Some(mut cq) => {
            cq.state = CqState::PendingDelete;
            NvmeStatus::Success
        }
        None => NvmeStatus::InvalidQueueIdentifier,
    }
}

pub fn create_io_sq(ctrl: &mut Controller, cmd: &Command) -> NvmeStatus {
    let qid = (cmd.cdw10 & 0xFFFF) as u16;
    let qsize = ((cmd.cdw10 >> 16) & 0xFFFF) as u16 + 1;
    let cqid = (cmd.cdw11 >> 16) as u16;
    let priority = match (cmd.cdw11 >> 1) & 0x3 {
        0 => PriorityClass::Urgent,
        1 => PriorityClass::High,
        2 => PriorityClass::Medium,
        _ => PriorityClass::Low,
    };
    if qid == 0 || ctrl.io_sqs.contains_key(&qid) || !ctrl.io_cqs.contains_key(&cqid) {
        return NvmeStatus::InvalidQueueIdentifier;
    }
    if qsize > ctrl.mqes {
        return NvmeStatus::InvalidField;
    }
    let mut sq = SubmissionQueue::new(qid, cqid, cmd.prp1, qsize);
    sq.state = SqState::Active;
    ctrl.io_sqs.insert(qid, sq);
    ctrl.arbitrator.register(qid, priority);
    NvmeStatus::Success
}

/// Deleting an SQ aborts every command still sitting in its ring
/// (`spec.md` §4.7: "deletion flushes pending commands to abort status").
pub fn delete_io_sq(ctrl: &mut Controller, cmd: &Command) -> NvmeStatus {
    let qid = (cmd.cdw10 & 0xFFFF) as u16;
    match ctrl.io_sqs.remove(&qid) {
        Some(mut sq) => {
            sq.state = SqState::PendingDelete;
            ctrl.arbitrator.deregister(qid);
            ctrl.abort_pending_for_sq(qid);
            NvmeStatus::Success
        }
        None => NvmeStatus::InvalidQueueIdentifier,
    }
}
