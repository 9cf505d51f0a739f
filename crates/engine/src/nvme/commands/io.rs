//! Read/Write/Compare/Flush (`spec.md` §4.7 I/O commands).

use crate::dma::HostMemory;
use crate::nvme::command::Command;
use crate::nvme::controller::Controller;
use crate::nvme::status::NvmeStatus;

fn slba_nlb(cmd: &Command) -> (u64, u64) {
    let slba = ((cmd.cdw11 as u64) << 32) | cmd.cdw10 as u64;
    let nlb = (cmd.cdw12 & 0xFFFF) as u64 + 1;
    (slba, nlb)
}

/// The inclusive `[first_lpn, last_lpn]` range an LBA range touches, plus
/// the namespace checks `spec.md` §4.7 requires before either pipeline or
/// media access run.
fn lpn_range(ctrl: &Controller, nsid: u32, slba: u64, nlb: u64) -> Result<(u64, u64), NvmeStatus> {
    let page_size = ctrl.page_size;
    let ns = ctrl.subsystem.namespace(nsid).ok_or(NvmeStatus::InvalidField)?;
    if !ns.active {
        return Err(NvmeStatus::NamespaceNotReady);
    }
    if !ns.lba_in_range(slba, nlb) {
        return Err(NvmeStatus::LbaOutOfRange);
    }
    let lba_bytes = ns.lba_format.lba_bytes();
    let first_byte = slba * lba_bytes;
    let last_byte = (slba + nlb) * lba_bytes - 1;
    Ok((ns.first_lpn + first_byte / page_size, ns.first_lpn + last_byte / page_size))
}

/// Runs `lpn` through the cache/FTL/PAL pipeline for every page the LBA
/// range touches, returning the tick the last one finishes at. Host-side
/// data movement (the actual bytes, not just timing) is the caller's job:
/// each page's data buffer sits at `cmd.prp1 + (lpn - first_lpn) *
/// page_size` in host memory, a contiguous-addressing simplification
/// that mirrors `dataset_mgmt`'s flat `prp1`-offset descriptor reads
/// rather than walking a real PRP list chain.
fn drive_range(
    ctrl: &mut Controller,
    first_lpn: u64,
    last_lpn: u64,
    now: u64,
    write: bool,
) -> Result<u64, NvmeStatus> {
    let mut finished = now;
    for lpn in first_lpn..=last_lpn {
        let lpn = crate::addr::Lpn(lpn);
        let access = if write {
            ctrl.icl.write(&mut ctrl.ftl, &mut ctrl.pal, lpn, finished)
        } else {
            ctrl.icl.read(&mut ctrl.ftl, &mut ctrl.pal, lpn, finished)
        }
        .map_err(NvmeStatus::from)?;
        finished = access.finished;
    }
    Ok(finished)
}

pub fn read(ctrl: &mut Controller, cmd: &Command, _mem: &dyn HostMemory, now: u64) -> (NvmeStatus, u64) {
    let (slba, nlb) = slba_nlb(cmd);
    let (first_lpn, last_lpn) = match lpn_range(ctrl, cmd.nsid, slba, nlb) {
        Ok(range) => range,
        Err(status) => return (status, now),
    };
    match drive_range(ctrl, first_lpn, last_lpn, now, false) {
        Ok(finished) => (NvmeStatus::Success, finished),
        Err(status) => (status, now),
    }
}

pub fn write(ctrl: &mut Controller, cmd: &Command, mem: &dyn HostMemory, now: u64) -> (NvmeStatus, u64) {
    let (slba, nlb) = slba_nlb(cmd);
    let (first_lpn, last_lpn) = match lpn_range(ctrl, cmd.nsid, slba, nlb) {
        Ok(range) => range,
        Err(status) => return (status, now),
    };
    let page_size = ctrl.page_size as usize;
    match drive_range(ctrl, first_lpn, last_lpn, now, true) {
        Ok(finished) => {
            let mut buf = vec![0u8; page_size];
            for lpn in first_lpn..=last_lpn {
                let addr = cmd.prp1 + (lpn - first_lpn) * page_size as u64;
                mem.read_bytes(addr, &mut buf);
                ctrl.disk.write(lpn, &buf);
            }
            (NvmeStatus::Success, finished)
        }
        Err(status) => (status, now),
    }
}

/// Walks the same cache/FTL/PAL pipeline as Read (so Compare's timing and
/// cache-pollution behavior match a real read), then does a real memcmp
/// of the disk image's last-written bytes against what the host staged
/// for comparison, returning `MediaAndDataIntegrityCompareFailure` on any
/// mismatched page (`spec.md` §8 S5).
pub fn compare(ctrl: &mut Controller, cmd: &Command, mem: &dyn HostMemory, now: u64) -> (NvmeStatus, u64) {
    let (slba, nlb) = slba_nlb(cmd);
    let (first_lpn, last_lpn) = match lpn_range(ctrl, cmd.nsid, slba, nlb) {
        Ok(range) => range,
        Err(status) => return (status, now),
    };
    let finished = match drive_range(ctrl, first_lpn, last_lpn, now, false) {
        Ok(finished) => finished,
        Err(status) => return (status, now),
    };
    let page_size = ctrl.page_size as usize;
    let mut disk_buf = vec![0u8; page_size];
    let mut host_buf = vec![0u8; page_size];
    for lpn in first_lpn..=last_lpn {
        ctrl.disk.read(lpn, &mut disk_buf);
        let addr = cmd.prp1 + (lpn - first_lpn) * page_size as u64;
        mem.read_bytes(addr, &mut host_buf);
        if disk_buf != host_buf {
            return (NvmeStatus::MediaAndDataIntegrityCompareFailure, finished);
        }
    }
    (NvmeStatus::Success, finished)
}

/// `nsid == 0xFFFFFFFF` flushes every namespace; otherwise just the one.
pub fn flush(ctrl: &mut Controller, cmd: &Command, now: u64) -> (NvmeStatus, u64) {
    let nsids: Vec<u32> = if cmd.nsid == 0xFFFF_FFFF {
        ctrl.subsystem.namespace_ids()
    } else {
        vec![cmd.nsid]
    };
    let page_size = ctrl.page_size;
    let mut finished = now;
    for nsid in nsids {
        let Some(ns) = ctrl.subsystem.namespace(nsid) else { continue };
        let lpns: Vec<crate::addr::Lpn> =
            (ns.first_lpn..=ns.last_lpn(page_size)).map(crate::addr::Lpn).collect();
        finished = ctrl.icl.flush(&mut ctrl.ftl, &mut ctrl.pal, &lpns, finished);
    }
    (NvmeStatus::Success, finished)
}
