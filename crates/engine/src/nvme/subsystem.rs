//! Namespace registry, Async Event Request queueing and the Changed
//! Namespace List (`spec.md` §4.7 Get Log Page / AER).

use std::collections::{BTreeSet, HashMap};

use super::namespace::Namespace;

/// Sentinel value NVMe specifies for an overflowed Changed Namespace List.
pub const CHANGED_LIST_OVERFLOW: u32 = 0xFFFF_FFFF;

/// Changed Namespace List capacity (NVMe 1.4b §5.14.1.4): 1024 entries.
const CHANGED_LIST_CAPACITY: usize = 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AsyncEventType {
    NamespaceAttributeChanged,
}

pub struct Subsystem {
    namespaces: HashMap<u32, Namespace>,
    next_nsid: u32,
    /// Pending AER completions, one per outstanding AsyncEventRequest
    /// command, keyed by its GCID so the matching CQ entry can be
    /// produced once an event actually occurs.
    pending_aers: Vec<crate::nvme::command::Gcid>,
    changed_namespaces: BTreeSet<u32>,
    changed_list_overflowed: bool,
}

impl Subsystem {
    pub fn new() -> Self {
        Self {
            namespaces: HashMap::new(),
            next_nsid: 1,
            pending_aers: Vec::new(),
            changed_namespaces: BTreeSet::new(),
            changed_list_overflowed: false,
        }
    }

    pub fn namespace(&self, nsid: u32) -> Option<&Namespace> {
        self.namespaces.get(&nsid)
    }

    pub fn namespace_mut(&mut self, nsid: u32) -> Option<&mut Namespace> {
        self.namespaces.get_mut(&nsid)
    }

    pub fn namespace_ids(&self) -> Vec<u32> {
        let mut ids: Vec<u32> = self.namespaces.keys().copied().collect();
        ids.sort_unstable();
        ids
    }

    pub fn create_namespace(&mut self, ns: Namespace) -> u32 {
        let nsid = if ns.nsid != 0 { ns.nsid } else { self.next_nsid };
        self.next_nsid = self.next_nsid.max(nsid + 1);
        let mut ns = ns;
        ns.nsid = nsid;
        self.namespaces.insert(nsid, ns);
        self.mark_changed(nsid);
        nsid
    }

    pub fn delete_namespace(&mut self, nsid: u32) -> bool {
        let removed = self.namespaces.remove(&nsid).is_some();
        if removed {
            self.mark_changed(nsid);
        }
        removed
    }

    pub fn queue_aer(&mut self, gcid: crate::nvme::command::Gcid) {
        self.pending_aers.push(gcid);
    }

    /// Notify the subsystem an event occurred, draining one pending AER
    /// if present. Returns the GCID to complete, if any.
    pub fn fire_event(&mut self, _kind: AsyncEventType) -> Option<crate::nvme::command::Gcid> {
        if self.pending_aers.is_empty() {
            None
        } else {
            Some(self.pending_aers.remove(0))
        }
    }

    /// Removes a parked AER without completing it (used by Abort).
    pub fn remove_pending_aer(&mut self, gcid: crate::nvme::command::Gcid) -> bool {
        let before = self.pending_aers.len();
        self.pending_aers.retain(|&g| g != gcid);
        self.pending_aers.len() != before
    }

    fn mark_changed(&mut self, nsid: u32) {
        if self.changed_namespaces.len() >= CHANGED_LIST_CAPACITY {
            self.changed_list_overflowed = true;
            return;
        }
        self.changed_namespaces.insert(nsid);
    }

    /// Changed Namespace List log page contents: up to 1024 nsids, or a
    /// single `CHANGED_LIST_OVERFLOW` sentinel entry if more changed
    /// since the list was last cleared.
    pub fn changed_namespace_list(&self) -> Vec<u32> {
        if self.changed_list_overflowed {
            vec![CHANGED_LIST_OVERFLOW]
        } else {
            self.changed_namespaces.iter().copied().collect()
        }
    }

    pub fn clear_changed_namespace_list(&mut self) {
        self.changed_namespaces.clear();
        self.changed_list_overflowed = false;
    }
}

impl Default for Subsystem {
    fn default() -> Self {
        Self::new()
    }
}
