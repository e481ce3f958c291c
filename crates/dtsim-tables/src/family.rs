//! Family Table.

use dtsim_core::NIL;
use dtsim_regfile::{RegAddr, RegData};

use crate::{Fid, Gfid, Tid};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FamilyState {
    /// Free slot.
    Empty,
    /// Reserved, register blocks not yet fully allocated.
    Allocated,
    /// Activated but no thread has run yet.
    Idle,
    /// At least one thread is executing.
    Active,
    /// All thread slots have drained.
    Killed,
}

/// Per-register-type quadruple: globals, shareds, locals register counts,
/// plus the base index and block size the RA Unit returned for this
/// family's block of that type.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RegBlockInfo {
    pub globals: u32,
    pub shareds: u32,
    pub locals: u32,
    pub base: u32,
    pub block_size: u32,
}

impl RegBlockInfo {
    /// Registers consumed per thread slot:
    /// `familyRegBase + numThreadsAllocated * (locals + shareds)`.
    #[must_use]
    pub const fn per_thread(&self) -> u32 {
        self.locals + self.shareds
    }

    /// Total registers this family's block of this type occupies: one copy
    /// of the globals plus `phys_block_size` copies of locals+shareds.
    #[must_use]
    pub const fn total_registers(&self, phys_block_size: u32) -> u32 {
        self.globals + self.per_thread() * phys_block_size
    }
}

/// The tile/thread identity of a family's parent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParentLocation {
    pub tile: u32,
    pub thread: Tid,
}

impl ParentLocation {
    pub const NONE: Self = Self { tile: NIL, thread: NIL };
}

/// The five-field dependency counter block that gates a family's
/// slot-freeing.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FamilyDependencies {
    pub allocation_done: bool,
    /// Always true if this family is local; for a distributed family, set
    /// once the previous tile's corresponding thread has confirmed
    /// termination.
    pub prev_terminated: bool,
    pub num_threads_allocated: u32,
    pub num_pending_reads: u32,
    pub num_pending_shareds: u32,
}

impl FamilyDependencies {
    /// The termination predicate that triggers `killFamily`:
    /// no live thread slots, allocation finished, no pending shared
    /// deliveries outstanding, and the previous tile (if any) has
    /// terminated its corresponding thread.
    #[must_use]
    pub const fn terminated(&self) -> bool {
        self.num_threads_allocated == 0 && self.allocation_done && self.num_pending_shareds == 0 && self.prev_terminated
    }

    /// The outermost predicate that frees the Family Table slot: the
    /// termination predicate plus no in-flight D-cache reads still
    /// targeting this family's registers.
    #[must_use]
    pub const fn fully_drained(&self) -> bool {
        self.terminated() && self.num_pending_reads == 0
    }
}

/// A family descriptor.
#[derive(Debug, Clone)]
pub struct FamilyDescriptor {
    pub state: FamilyState,
    pub pc: u32,
    pub start: u64,
    pub step: u64,
    /// `u64::MAX` denotes an infinite family: `allocationDone` is never
    /// set and the only termination path is an explicit kill instruction.
    pub last_thread: u64,
    pub virt_block_size: u32,
    pub phys_block_size: u32,
    /// Next thread index to allocate; advances by 1 normally, or by
    /// `(P-1) * virt_block_size` at a group family's block boundary to
    /// interleave blocks across tiles.
    pub index: u64,
    pub integer_regs: RegBlockInfo,
    pub float_regs: RegBlockInfo,
    pub parent: ParentLocation,
    pub gfid: Option<Gfid>,
    pub exit_code_reg: RegAddr,
    pub exit_value_reg: RegAddr,
    /// The parent's register that seeds this family's first thread's
    /// shared-register chain and receives the last thread's final value.
    /// `RegAddr::NONE` if this family has no shared-register dependency on
    /// its parent.
    pub parent_shared_reg: RegAddr,
    /// Transient handoff for the shared-register chain when the family's
    /// threads run one at a time in a single reused physical slot: the
    /// value a retiring thread's shared register carried, staged here
    /// until the next thread to occupy the slot seeds its own shared
    /// register from it. `None` once consumed.
    pub shared_chain_value: Option<RegData>,
    pub dependencies: FamilyDependencies,
    /// Head of the per-family thread member list (links via
    /// `ThreadDescriptor::member_next`).
    pub member_head: Tid,
    /// Count of distinct register-block positions handed out so far,
    /// saturating at `phys_block_size`: a slot freed by cleanup is reused
    /// at its existing position rather than consuming a new one.
    pub slots_assigned: u32,
    /// The most recently initialized thread slot in the current physical
    /// block, used to wire `prev_in_block`/`next_in_block`.
    pub last_assigned_tid: Tid,
    pub any_thread_created: bool,
    /// Set by the last explicit exit/break on this family; written back to
    /// the parent's `exit_code_reg` by `killFamily`.
    pub exit_code: u64,
    pub exit_value: Option<u64>,
    /// Guards `killFamily`'s one-shot effects (register release, thread
    /// recycling, parent writeback) against running twice: the
    /// termination predicate is monotonic but re-evaluated on every later
    /// dependency decrease.
    pub kill_family_ran: bool,
    /// Free-list link; meaningful only while `state == Empty`.
    pub free_next: Fid,
}

impl FamilyDescriptor {
    fn vacant(free_next: Fid) -> Self {
        Self {
            state: FamilyState::Empty,
            pc: 0,
            start: 0,
            step: 1,
            last_thread: 0,
            virt_block_size: 0,
            phys_block_size: 0,
            index: 0,
            integer_regs: RegBlockInfo::default(),
            float_regs: RegBlockInfo::default(),
            parent: ParentLocation::NONE,
            gfid: None,
            exit_code_reg: RegAddr::NONE,
            exit_value_reg: RegAddr::NONE,
            parent_shared_reg: RegAddr::NONE,
            shared_chain_value: None,
            dependencies: FamilyDependencies::default(),
            member_head: NIL,
            slots_assigned: 0,
            last_assigned_tid: NIL,
            any_thread_created: false,
            exit_code: 0,
            exit_value: None,
            kill_family_ran: false,
            free_next,
        }
    }

    #[must_use]
    pub const fn is_infinite(&self) -> bool {
        self.last_thread == u64::MAX
    }
}

/// Fixed pool of family descriptors with a free list.
pub struct FamilyTable {
    slots: Vec<FamilyDescriptor>,
    free_head: Fid,
}

impl FamilyTable {
    #[must_use]
    pub fn new(capacity: u32) -> Self {
        let mut slots = Vec::with_capacity(capacity as usize);
        for i in 0..capacity {
            let next = if i + 1 == capacity { NIL } else { i + 1 };
            slots.push(FamilyDescriptor::vacant(next));
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
    pub fn get(&self, fid: Fid) -> &FamilyDescriptor {
        &self.slots[fid as usize]
    }

    pub fn get_mut(&mut self, fid: Fid) -> &mut FamilyDescriptor {
        &mut self.slots[fid as usize]
    }

    /// Allocate one slot, optionally binding it to a ring-wide `gfid`.
    pub fn alloc(&mut self, gfid: Option<Gfid>) -> Option<Fid> {
        let fid = self.free_head;
        if fid == NIL {
            return None;
        }
        self.free_head = self.slots[fid as usize].free_next;
        let slot = &mut self.slots[fid as usize];
        *slot = FamilyDescriptor::vacant(NIL);
        slot.state = FamilyState::Allocated;
        slot.gfid = gfid;
        Some(fid)
    }

    /// Return a slot to the free list. Caller must have already released
    /// its register blocks and thread slots.
    pub fn free(&mut self, fid: Fid) {
        let slot = &mut self.slots[fid as usize];
        debug_assert!(slot.dependencies.fully_drained());
        slot.state = FamilyState::Empty;
        slot.free_next = self.free_head;
        self.free_head = fid;
    }

    pub fn iter_live(&self) -> impl Iterator<Item = (Fid, &FamilyDescriptor)> {
        self.slots
            .iter()
            .enumerate()
            .filter(|(_, f)| !matches!(f.state, FamilyState::Empty))
            .map(|(i, f)| (i as Fid, f))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn alloc_and_free_roundtrip() {
        let mut table = FamilyTable::new(4);
        let a = table.alloc(None).unwrap();
        let b = table.alloc(Some(10)).unwrap();
        assert_ne!(a, b);
        assert_eq!(table.get(b).gfid, Some(10));

        table.get_mut(a).dependencies = FamilyDependencies {
            allocation_done: true,
            prev_terminated: true,
            num_threads_allocated: 0,
            num_pending_reads: 0,
            num_pending_shareds: 0,
        };
        table.free(a);
        assert!(matches!(table.get(a).state, FamilyState::Empty));

        let c = table.alloc(None).unwrap();
        assert_eq!(c, a, "freed slot should be reused first");
    }

    #[test]
    fn exhausted_table_returns_none() {
        let mut table = FamilyTable::new(1);
        table.alloc(None).unwrap();
        assert!(table.alloc(None).is_none());
    }
}
