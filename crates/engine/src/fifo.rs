//! FIFO interleaving transport (`spec.md` §4.2): a symmetric pair of
//! capacity-bounded pipelines (read, write) in front of an upstream
//! [`DmaInterface`], splitting oversized requests into `transfer_unit`
//! chunks and overlapping host-side insertion with the downstream DMA.
//!
//! Simplification versus the prose algorithm: insertion and the upstream
//! transfer of the *same* chunk don't overlap (transfer is dispatched once
//! insertion for that chunk completes) — the pipelining the spec describes
//! is instead realized across chunks, since the next chunk's insertion
//! starts as soon as the current one's insertion finishes, while the
//! current chunk's transfer is still in flight upstream.

use std::cell::RefCell;
use std::collections::{HashMap, VecDeque};
use std::rc::Rc;

use crate::event::{EventEngine, SharedEngine};

/// The transport a FIFO pipeline hands completed-insertion chunks to.
/// Implementors own their own latency model and call `engine.schedule_now`
/// on `on_done` once the chunk has moved.
pub trait DmaInterface {
    fn submit(&mut self, engine: &SharedEngine, bytes: u32, on_done: crate::event::EventId);
}

#[derive(Debug, Clone, Copy)]
pub struct FifoConfig {
    pub capacity: u32,
    pub transfer_unit: u32,
}

struct ChunkState {
    bytes: u32,
    is_last: bool,
    request_completion: crate::event::EventId,
    transfer_done: bool,
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Which {
    Write,
    Read,
}

struct Direction {
    cfg: FifoConfig,
    usage: u32,
    next_id: u64,
    /// Ids not yet admitted (waiting for capacity + the insertion slot).
    wait_queue: VecDeque<u64>,
    inserting: bool,
    entries: HashMap<u64, ChunkState>,
    /// Lowest id not yet finalized; chunks finalize strictly in submission
    /// order even if the upstream signals transfer completion out of order.
    next_to_finalize: u64,
}

impl Direction {
    fn new(cfg: FifoConfig) -> Self {
        Self {
            cfg,
            usage: 0,
            next_id: 0,
            wait_queue: VecDeque::new(),
            inserting: false,
            entries: HashMap::new(),
            next_to_finalize: 0,
        }
    }

    fn chunk_sizes(total: u32, unit: u32) -> Vec<u32> {
        if total == 0 {
            return Vec::new();
        }
        let mut remaining = total;
        let mut sizes = Vec::new();
        while remaining > 0 {
            let chunk = remaining.min(unit);
            sizes.push(chunk);
            remaining -= chunk;
        }
        sizes
    }
}

struct Inner {
    write: Direction,
    read: Direction,
    insertion_latency: Box<dyn Fn(u32) -> u64>,
    upstream: Rc<RefCell<dyn DmaInterface>>,
}

impl Inner {
    fn dir(&mut self, which: Which) -> &mut Direction {
        match which {
            Which::Write => &mut self.write,
            Which::Read => &mut self.read,
        }
    }
}

/// A cheaply-clonable handle to one FIFO transport; callers share it by
/// cloning rather than by threading `&mut` references through event
/// callbacks.
#[derive(Clone)]
pub struct Fifo {
    inner: Rc<RefCell<Inner>>,
}

impl Fifo {
    pub fn new(
        write_cfg: FifoConfig,
        read_cfg: FifoConfig,
        insertion_latency: impl Fn(u32) -> u64 + 'static,
        upstream: Rc<RefCell<dyn DmaInterface>>,
    ) -> Self {
        Self {
            inner: Rc::new(RefCell::new(Inner {
                write: Direction::new(write_cfg),
                read: Direction::new(read_cfg),
                insertion_latency: Box::new(insertion_latency),
                upstream,
            })),
        }
    }

    pub fn usage(&self, which_write: bool) -> u32 {
        let inner = self.inner.borrow();
        if which_write {
            inner.write.usage
        } else {
            inner.read.usage
        }
    }

    /// Submit a host -> device transfer of `size` bytes. `completion` fires
    /// exactly once, when the last chunk finalizes.
    pub fn write(
        &self,
        engine: &SharedEngine,
        size: u32,
        completion: crate::event::EventId,
    ) {
        self.submit(engine, Which::Write, size, completion);
    }

    /// Submit a device -> host transfer of `size` bytes.
    pub fn read(
        &self,
        engine: &SharedEngine,
        size: u32,
        completion: crate::event::EventId,
    ) {
        self.submit(engine, Which::Read, size, completion);
    }

    fn submit(
        &self,
        engine: &SharedEngine,
        which: Which,
        size: u32,
        completion: crate::event::EventId,
    ) {
        let unit = {
            let inner = self.inner.borrow();
            match which {
                Which::Write => inner.write.cfg.transfer_unit,
                Which::Read => inner.read.cfg.transfer_unit,
            }
        };
        let sizes = Direction::chunk_sizes(size, unit);
        let last_index = sizes.len().saturating_sub(1);
        {
            let mut inner = self.inner.borrow_mut();
            let dir = inner.dir(which);
            for (i, bytes) in sizes.into_iter().enumerate() {
                let id = dir.next_id;
                dir.next_id += 1;
                dir.entries.insert(
                    id,
                    ChunkState {
                        bytes,
                        is_last: i == last_index,
                        request_completion: completion,
                        transfer_done: false,
                    },
                );
                dir.wait_queue.push_back(id);
            }
        }
        self.pump_insertion(engine, which);
    }

    /// Start insertion for the next queued chunk, if the direction is idle
    /// and there's capacity. Re-entrant: called after submit and after
    /// every insert-done / finalize to keep the pipeline full.
    fn pump_insertion(&self, engine: &SharedEngine, which: Which) {
        let (id, bytes, latency) = {
            let mut inner = self.inner.borrow_mut();
            let dir = inner.dir(which);
            if dir.inserting {
                return;
            }
            let Some(&id) = dir.wait_queue.front() else {
                return;
            };
            let bytes = dir.entries[&id].bytes;
            if dir.usage + bytes > dir.cfg.capacity {
                return;
            }
            dir.wait_queue.pop_front();
            dir.usage += bytes;
            dir.inserting = true;
            let latency = (inner.insertion_latency)(bytes);
            (id, bytes, latency)
        };

        let fifo = self.clone();
        let engine_for_cb = engine.clone();
        let at = engine.borrow().now() + latency;
        let event = {
            let mut eng = engine.borrow_mut();
            eng.allocate(
                "fifo_insert_done",
                Box::new(move |_now, _data| {
                    fifo.on_insert_done(&engine_for_cb, which, id, bytes);
                }),
            )
        };
        engine.borrow_mut().schedule(event, at);
    }

    fn on_insert_done(&self, engine: &SharedEngine, which: Which, id: u64, bytes: u32) {
        {
            let mut inner = self.inner.borrow_mut();
            let dir = inner.dir(which);
            dir.inserting = false;
        }
        // Keep the pipeline full: start the next chunk's insertion now,
        // while this chunk's transfer happens upstream.
        self.pump_insertion(engine, which);

        let fifo = self.clone();
        let engine_for_cb = engine.clone();
        let upstream = self.inner.borrow().upstream.clone();
        let transfer_done = {
            let mut eng = engine.borrow_mut();
            eng.allocate(
                "fifo_transfer_done",
                Box::new(move |_now, _data| {
                    fifo.on_transfer_done(&engine_for_cb, which, id);
                }),
            )
        };
        upstream.borrow_mut().submit(engine, bytes, transfer_done);
    }

    fn on_transfer_done(&self, engine: &SharedEngine, which: Which, id: u64) {
        {
            let mut inner = self.inner.borrow_mut();
            let dir = inner.dir(which);
            if let Some(entry) = dir.entries.get_mut(&id) {
                entry.transfer_done = true;
            }
        }
        self.finalize_ready(engine, which);
    }

    /// Finalize chunks strictly in submission order: frees their capacity
    /// reservation and, for the last chunk of a request, fires the user
    /// completion event.
    fn finalize_ready(&self, engine: &SharedEngine, which: Which) {
        loop {
            let (completion, is_last) = {
                let mut inner = self.inner.borrow_mut();
                let dir = inner.dir(which);
                let id = dir.next_to_finalize;
                let Some(entry) = dir.entries.get(&id) else {
                    return;
                };
                if !entry.transfer_done {
                    return;
                }
                let bytes = entry.bytes;
                let is_last = entry.is_last;
                let completion = entry.request_completion;
                dir.entries.remove(&id);
                dir.usage -= bytes;
                dir.next_to_finalize += 1;
                (completion, is_last)
            };
            if is_last {
                engine.borrow_mut().schedule_now(completion);
            }
        }
    }
}
