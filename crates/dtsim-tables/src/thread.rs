//! Thread Table.

use dtsim_core::NIL;

use crate::{Fid, Tid};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThreadState {
    /// Free slot.
    Empty,
    /// Queued for an I-cache line fetch.
    Waiting,
    /// Ready to run, sitting on the active-thread queue.
    Active,
    /// Currently in the pipeline.
    Running,
    /// Blocked on a register.
    Suspended,
    /// Done, awaiting cleanup.
    Killed,
    /// Slot recycled after the family finished allocating threads.
    Unused,
}

/// The four-field per-thread dependency counter block.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ThreadDependencies {
    pub killed: bool,
    pub next_killed: bool,
    pub prev_cleaned_up: bool,
    pub num_pending_writes: u32,
}

/// A thread descriptor bound to a specific family.
#[derive(Debug, Clone)]
pub struct ThreadDescriptor {
    pub state: ThreadState,
    pub family: Fid,
    pub pc: u32,
    /// Cache line id of the current instruction window, or `NIL`.
    pub cache_line: u32,
    pub index: u64,
    /// Neighbour thread ids within the current physical block.
    pub prev_in_block: Tid,
    pub next_in_block: Tid,
    pub is_first_in_family: bool,
    pub is_last_in_family: bool,
    pub is_last_in_block: bool,
    pub waiting_for_writes: bool,
    pub integer_base: u32,
    pub integer_producer: u32,
    pub float_base: u32,
    pub float_producer: u32,
    pub dependencies: ThreadDependencies,
    /// Per-family member-list link (persists for the thread's lifetime).
    pub member_next: Tid,
    /// Transient link reused by whichever queue currently holds this slot:
    /// the free list, the tile's active-thread queue, or the cleanup queue.
    pub queue_next: Tid,
}

impl ThreadDescriptor {
    fn vacant(free_next: Tid) -> Self {
        Self {
            state: ThreadState::Empty,
            family: NIL,
            pc: 0,
            cache_line: NIL,
            index: 0,
            prev_in_block: NIL,
            next_in_block: NIL,
            is_first_in_family: false,
            is_last_in_family: false,
            is_last_in_block: false,
            waiting_for_writes: false,
            integer_base: 0,
            integer_producer: NIL,
            float_base: 0,
            float_producer: NIL,
            dependencies: ThreadDependencies::default(),
            member_next: NIL,
            queue_next: free_next,
        }
    }
}

/// Fixed pool of thread descriptors with a free list.
pub struct ThreadTable {
    slots: Vec<ThreadDescriptor>,
    free_head: Tid,
}

impl ThreadTable {
    #[must_use]
    pub fn new(capacity: u32) -> Self {
        let mut slots = Vec::with_capacity(capacity as usize);
        for i in 0..capacity {
            let next = if i + 1 == capacity { NIL } else { i + 1 };
            slots.push(ThreadDescriptor::vacant(next));
        }
        Self {
            slots,
            free_head: if capacity == 0 { NIL } else { 0 },
        }
    }

    #[must_use]
    pub const fn capacity(&self) -> usize {
        self.slots.len()
    }

    #[must_use]
    pub fn get(&self, tid: Tid) -> &ThreadDescriptor {
        &self.slots[tid as usize]
    }

    pub fn get_mut(&mut self, tid: Tid) -> &mut ThreadDescriptor {
        &mut self.slots[tid as usize]
    }

    /// Pop one slot off the free list. A popped slot is immediately marked
    /// `Waiting` — the Allocator is about to request an I-cache fetch for
    /// it as part of `ActivateThread`.
    pub fn pop(&mut self) -> Option<Tid> {
        let tid = self.free_head;
        if tid == NIL {
            return None;
        }
        self.free_head = self.slots[tid as usize].queue_next;
        let slot = &mut self.slots[tid as usize];
        *slot = ThreadDescriptor::vacant(NIL);
        slot.state = ThreadState::Waiting;
        Some(tid)
    }

    /// Return a single slot to the free list, marked `Empty`.
    pub fn push(&mut self, tid: Tid) {
        let slot = &mut self.slots[tid as usize];
        *slot = ThreadDescriptor::vacant(self.free_head);
        self.free_head = tid;
    }

    #[must_use]
    pub fn free_count(&self) -> u32 {
        let mut count = 0;
        let mut cur = self.free_head;
        while cur != NIL {
            count += 1;
            cur = self.slots[cur as usize].queue_next;
        }
        count
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pop_marks_waiting_push_marks_empty() {
        let mut table = ThreadTable::new(4);
        let tid = table.pop().unwrap();
        assert_eq!(table.get(tid).state, ThreadState::Waiting);
        table.get_mut(tid).state = ThreadState::Killed;
        table.push(tid);
        assert_eq!(table.get(tid).state, ThreadState::Empty);
    }

    #[test]
    fn exhaustion_and_recycling() {
        let mut table = ThreadTable::new(2);
        let a = table.pop().unwrap();
        let b = table.pop().unwrap();
        assert!(table.pop().is_none());
        table.push(a);
        let c = table.pop().unwrap();
        assert_eq!(c, a);
        let _ = b;
    }
}
