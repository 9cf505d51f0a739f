//! The discrete-event scheduler (`spec.md` §4.1).
//!
//! Single-threaded, cooperative, no preemption: callbacks run to
//! completion and may themselves schedule further events, but must never
//! block. Ordering is deterministic — events scheduled for the same tick
//! fire in insertion order, ties broken by a monotonic sequence counter
//! rather than by event id, so replay is bit-for-bit stable regardless of
//! allocation order.

use std::cell::RefCell;
use std::cmp::Reverse;
use std::collections::BinaryHeap;
use std::rc::Rc;

use crate::time::Tick;

/// Callbacks only receive `(Tick, u64)`, never a reference back to the
/// engine that's invoking them (it's already mutably borrowed). Subsystems
/// that need to schedule further events from inside a callback hold a
/// clone of a `SharedEngine` instead and borrow it themselves; this is how
/// every module past the scheduler itself (FIFO, PAL2, ICL, NVMe) drives
/// the engine.
pub type SharedEngine = Rc<RefCell<EventEngine>>;

/// Stable handle to an allocated event. `generation` guards against
/// use-after-free / use-after-reallocation the way spec.md §9 describes
/// for command tags: a handle captured before a `deallocate` + reuse will
/// fail generation checks instead of silently operating on the wrong
/// event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EventId {
    index: u32,
    generation: u32,
}

type Callback = Box<dyn FnMut(Tick, u64)>;

struct EventSlot {
    generation: u32,
    alive: bool,
    name: &'static str,
    callback: Option<Callback>,
    user_data: u64,
    /// Some(seq) while pending in the heap; the seq lets a popped heap
    /// entry recognize itself as stale after a deschedule/reschedule.
    pending_seq: Option<u64>,
    scheduled_tick: Option<Tick>,
}

#[derive(PartialEq, Eq)]
struct HeapKey {
    tick: Tick,
    seq: u64,
    index: u32,
    generation: u32,
}

impl PartialOrd for HeapKey {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for HeapKey {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        (self.tick, self.seq).cmp(&(other.tick, other.seq))
    }
}

/// The discrete-event engine: owns `now`, the pending-event heap and the
/// slab of allocated events.
pub struct EventEngine {
    slots: Vec<EventSlot>,
    free_list: Vec<u32>,
    heap: BinaryHeap<Reverse<HeapKey>>,
    now: Tick,
    next_seq: u64,
}

impl Default for EventEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl EventEngine {
    pub fn new() -> Self {
        Self {
            slots: Vec::new(),
            free_list: Vec::new(),
            heap: BinaryHeap::new(),
            now: Tick::ZERO,
            next_seq: 0,
        }
    }

    pub fn now(&self) -> Tick {
        self.now
    }

    /// Allocate a new event with the given callback. The returned id is
    /// stable until [`EventEngine::deallocate`] is called on it.
    pub fn allocate(&mut self, name: &'static str, callback: Callback) -> EventId {
        let slot = EventSlot {
            generation: 0,
            alive: true,
            name,
            callback: Some(callback),
            user_data: 0,
            pending_seq: None,
            scheduled_tick: None,
        };
        if let Some(index) = self.free_list.pop() {
            let generation = self.slots[index as usize].generation + 1;
            self.slots[index as usize] = EventSlot { generation, ..slot };
            EventId { index, generation }
        } else {
            let index = self.slots.len() as u32;
            self.slots.push(slot);
            EventId {
                index,
                generation: 0,
            }
        }
    }

    fn slot(&self, id: EventId) -> &EventSlot {
        let slot = &self.slots[id.index as usize];
        assert!(
            slot.alive && slot.generation == id.generation,
            "use of stale/deallocated event {:?}",
            id
        );
        slot
    }

    fn slot_mut(&mut self, id: EventId) -> &mut EventSlot {
        let slot = &mut self.slots[id.index as usize];
        assert!(
            slot.alive && slot.generation == id.generation,
            "use of stale/deallocated event {:?}",
            id
        );
        slot
    }

    pub fn set_user_data(&mut self, id: EventId, data: u64) {
        self.slot_mut(id).user_data = data;
    }

    pub fn user_data(&self, id: EventId) -> u64 {
        self.slot(id).user_data
    }

    /// Schedule `id` at `at`. If `id` is already pending this is a no-op
    /// that logs a warning and returns `false` — use [`Self::reschedule`]
    /// when the caller actually wants to move a pending event.
    pub fn schedule(&mut self, id: EventId, at: Tick) -> bool {
        assert!(
            at >= self.now,
            "cannot schedule event {:?} in the past ({} < {})",
            id,
            at,
            self.now
        );
        if self.slot(id).pending_seq.is_some() {
            tracing::warn!(event = self.slot(id).name, "schedule() on already-pending event ignored; use reschedule()");
            return false;
        }
        self.push(id, at);
        true
    }

    /// Schedule `id` at `at`, moving it if already pending.
    pub fn reschedule(&mut self, id: EventId, at: Tick) {
        assert!(
            at >= self.now,
            "cannot schedule event {:?} in the past ({} < {})",
            id,
            at,
            self.now
        );
        self.deschedule(id);
        self.push(id, at);
    }

    pub fn schedule_now(&mut self, id: EventId) -> bool {
        self.schedule(id, self.now)
    }

    /// Schedule `id` `delta` picoseconds after `now`. A negative `delta`
    /// is a programmer error (spec.md §4.1) and panics.
    pub fn schedule_rel(&mut self, id: EventId, delta: i64) -> bool {
        assert!(delta >= 0, "negative relative delay {} is fatal", delta);
        self.schedule(id, self.now + delta as u64)
    }

    fn push(&mut self, id: EventId, at: Tick) {
        let seq = self.next_seq;
        self.next_seq += 1;
        let slot = self.slot_mut(id);
        slot.pending_seq = Some(seq);
        slot.scheduled_tick = Some(at);
        self.heap.push(Reverse(HeapKey {
            tick: at,
            seq,
            index: id.index,
            generation: id.generation,
        }));
    }

    /// Remove the pending entry for `id`, if any. No-op if not scheduled.
    pub fn deschedule(&mut self, id: EventId) {
        let slot = self.slot_mut(id);
        slot.pending_seq = None;
        slot.scheduled_tick = None;
        // The stale heap entry is left in place and filtered out lazily
        // when popped (its pending_seq will no longer match).
    }

    pub fn is_scheduled(&self, id: EventId) -> (bool, Option<Tick>) {
        let slot = self.slot(id);
        (slot.pending_seq.is_some(), slot.scheduled_tick)
    }

    /// Free `id` for reuse. Must not be pending.
    pub fn deallocate(&mut self, id: EventId) {
        let slot = self.slot_mut(id);
        assert!(
            slot.pending_seq.is_none(),
            "deallocate() on pending event {:?}",
            id
        );
        slot.alive = false;
        slot.callback = None;
        self.free_list.push(id.index);
    }

    /// Pop and run the single earliest pending event, advancing `now` to
    /// its tick. Returns `false` if there was nothing to run.
    pub fn run_one(&mut self) -> bool {
        loop {
            let Some(Reverse(key)) = self.heap.pop() else {
                return false;
            };
            let slot = &self.slots[key.index as usize];
            let stale = !slot.alive
                || slot.generation != key.generation
                || slot.pending_seq != Some(key.seq);
            if stale {
                continue;
            }
            self.now = key.tick;
            let id = EventId {
                index: key.index,
                generation: key.generation,
            };
            self.slot_mut(id).pending_seq = None;
            self.slot_mut(id).scheduled_tick = None;
            let mut cb = self.slots[key.index as usize]
                .callback
                .take()
                .expect("callback missing on live event");
            let data = self.slots[key.index as usize].user_data;
            cb(self.now, data);
            // The callback may have deallocated `id` itself via a
            // self-destructing one-shot event; only restore the callback
            // if the slot is still alive under the same generation.
            let slot = &mut self.slots[key.index as usize];
            if slot.alive && slot.generation == key.generation {
                slot.callback = Some(cb);
            }
            return true;
        }
    }

    /// Run events until the heap is empty or the next event's tick would
    /// exceed `tick_limit`.
    pub fn run_until(&mut self, tick_limit: Tick) {
        loop {
            let Some(Reverse(key)) = self.heap.peek() else {
                break;
            };
            if key.tick > tick_limit {
                break;
            }
            if !self.run_one() {
                break;
            }
        }
    }

    pub fn pending_count(&self) -> usize {
        self.slots
            .iter()
            .filter(|s| s.alive && s.pending_seq.is_some())
            .count()
    }
}

impl std::fmt::Debug for EventEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventEngine")
            .field("now", &self.now)
            .field("pending", &self.pending_count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::rc::Rc;

    #[test]
    fn same_tick_fires_in_insertion_order() {
        let mut engine = EventEngine::new();
        let order = Rc::new(RefCell::new(Vec::new()));

        let o1 = order.clone();
        let e1 = engine.allocate("a", Box::new(move |_now, _d| o1.borrow_mut().push(1)));
        let o2 = order.clone();
        let e2 = engine.allocate("b", Box::new(move |_now, _d| o2.borrow_mut().push(2)));

        engine.schedule(e1, Tick(100));
        engine.schedule(e2, Tick(100));
        engine.run_until(Tick(100));

        assert_eq!(*order.borrow(), vec![1, 2]);
    }

    #[test]
    fn deschedule_head_does_not_reorder_rest() {
        let mut engine = EventEngine::new();
        let order = Rc::new(RefCell::new(Vec::new()));

        let o1 = order.clone();
        let e1 = engine.allocate("a", Box::new(move |_now, _d| o1.borrow_mut().push(1)));
        let o2 = order.clone();
        let e2 = engine.allocate("b", Box::new(move |_now, _d| o2.borrow_mut().push(2)));
        let o3 = order.clone();
        let e3 = engine.allocate("c", Box::new(move |_now, _d| o3.borrow_mut().push(3)));

        engine.schedule(e1, Tick(10));
        engine.schedule(e2, Tick(20));
        engine.schedule(e3, Tick(30));
        engine.deschedule(e1);

        engine.run_until(Tick(30));
        assert_eq!(*order.borrow(), vec![2, 3]);
    }

    #[test]
    fn schedule_twice_without_reschedule_is_noop() {
        let mut engine = EventEngine::new();
        let count = Rc::new(RefCell::new(0));
        let c = count.clone();
        let e = engine.allocate("a", Box::new(move |_now, _d| *c.borrow_mut() += 1));
        engine.schedule(e, Tick(10));
        assert!(!engine.schedule(e, Tick(20)));
        engine.run_until(Tick(100));
        assert_eq!(*count.borrow(), 1);
        assert_eq!(engine.now(), Tick(10));
    }

    #[test]
    fn reschedule_moves_pending_event() {
        let mut engine = EventEngine::new();
        let count = Rc::new(RefCell::new(0));
        let c = count.clone();
        let e = engine.allocate("a", Box::new(move |_now, _d| *c.borrow_mut() += 1));
        engine.schedule(e, Tick(10));
        engine.reschedule(e, Tick(50));
        engine.run_until(Tick(40));
        assert_eq!(*count.borrow(), 0);
        engine.run_until(Tick(50));
        assert_eq!(*count.borrow(), 1);
    }

    #[test]
    #[should_panic]
    fn scheduling_past_is_fatal() {
        let mut engine = EventEngine::new();
        let e = engine.allocate("a", Box::new(|_, _| {}));
        engine.schedule(e, Tick(10));
        engine.run_until(Tick(10));
        engine.schedule(e, Tick(5));
    }

    #[test]
    fn user_data_round_trips() {
        let mut engine = EventEngine::new();
        let seen = Rc::new(RefCell::new(0u64));
        let s = seen.clone();
        let e = engine.allocate("a", Box::new(move |_now, data| *s.borrow_mut() = data));
        engine.set_user_data(e, 0xABCD);
        engine.schedule(e, Tick(1));
        engine.run_one();
        assert_eq!(*seen.borrow(), 0xABCD);
    }
}
