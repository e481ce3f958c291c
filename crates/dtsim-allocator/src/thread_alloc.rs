//! Per-cycle thread-slot population.
//!
//! While a family has threads left to place (`num_threads_allocated <
//! phys_block_size` and `!allocationDone`), one thread slot is initialized
//! per cycle: base register indices, shared registers cleared to
//! `Pending`, the induction variable written to local `L0`, and the
//! block's predecessor/successor links wired for the shared-register
//! chain.

use std::collections::VecDeque;

use dtsim_regfile::{Producer, RegAddr, RegData, RegType, RegisterFile, WriteValue};
use dtsim_tables::{Fid, FamilyTable, ThreadDependencies, ThreadTable, Tid};

/// Result of one [`step`] call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThreadAllocStep {
    /// Paused: `phys_block_size` threads are already live, or nothing left
    /// to allocate this cycle.
    Paused,
    Initialized(Tid),
}

#[allow(clippy::too_many_arguments)]
pub fn step(
    fid: Fid,
    families: &mut FamilyTable,
    threads: &mut ThreadTable,
    regfile: &mut RegisterFile,
    pending_reuse: &mut VecDeque<Tid>,
    num_tiles: u32,
) -> ThreadAllocStep {
    let fam = families.get(fid);
    if fam.dependencies.allocation_done {
        return ThreadAllocStep::Paused;
    }
    if fam.dependencies.num_threads_allocated >= fam.phys_block_size.max(1) {
        return ThreadAllocStep::Paused;
    }

    let reused = pending_reuse.pop_front();
    let Some(tid) = reused.or_else(|| threads.pop()) else {
        return ThreadAllocStep::Paused;
    };
    let is_new = reused.is_none();

    let fam = families.get(fid);
    let index = fam.index;
    let position = fam.slots_assigned.min(fam.phys_block_size.saturating_sub(1));

    let (integer_base, float_base) = if is_new {
        let ib = fam.integer_regs.base + fam.integer_regs.globals + position * fam.integer_regs.per_thread();
        let fb = fam.float_regs.base + fam.float_regs.globals + position * fam.float_regs.per_thread();
        (ib, fb)
    } else {
        let t = threads.get(tid);
        (t.integer_base, t.float_base)
    };

    if fam.integer_regs.shareds > 0 {
        regfile.clear(
            RegType::Integer,
            integer_base,
            fam.integer_regs.shareds,
            WriteValue::Pending {
                producer: Producer::Writeback,
                memory: None,
            },
        );
    }
    if fam.float_regs.shareds > 0 {
        regfile.clear(
            RegType::Float,
            float_base,
            fam.float_regs.shareds,
            WriteValue::Pending {
                producer: Producer::Writeback,
                memory: None,
            },
        );
    }
    if fam.integer_regs.locals > 0 {
        let l0 = RegAddr::new(RegType::Integer, integer_base + fam.integer_regs.shareds);
        let value = fam.start.wrapping_add(index.wrapping_mul(fam.step));
        let _ = regfile.write(l0, WriteValue::Full(RegData::Integer(value)), Producer::Allocator);
    }

    let is_first = !fam.any_thread_created;
    let next_index = advance_index(fam.index, fam.virt_block_size, num_tiles);
    let is_last = !fam.is_infinite() && next_index > fam.last_thread;
    let is_last_in_block = position + 1 == fam.phys_block_size.max(1);
    let last_assigned = fam.last_assigned_tid;

    {
        let thread = threads.get_mut(tid);
        thread.family = fid;
        thread.index = index;
        thread.integer_base = integer_base;
        thread.float_base = float_base;
        thread.dependencies = ThreadDependencies::default();
        thread.is_first_in_family = is_first;
        thread.is_last_in_family = is_last;
        thread.is_last_in_block = is_last_in_block;
        thread.prev_in_block = if is_new { last_assigned } else { thread.prev_in_block };
        thread.next_in_block = dtsim_core::NIL;
    }
    if is_new && last_assigned != dtsim_core::NIL {
        threads.get_mut(last_assigned).next_in_block = tid;
    }
    if is_new {
        let member_head = families.get(fid).member_head;
        threads.get_mut(tid).member_next = member_head;
        let fam = families.get_mut(fid);
        fam.member_head = tid;
    }

    let fam = families.get_mut(fid);
    fam.index = next_index;
    fam.any_thread_created = true;
    fam.last_assigned_tid = tid;
    if is_new {
        fam.slots_assigned += 1;
    }
    fam.dependencies.num_threads_allocated += 1;
    if is_last {
        fam.dependencies.allocation_done = true;
    }

    ThreadAllocStep::Initialized(tid)
}

/// Advance the family's thread index, interleaving blocks across tiles for
/// group creates once a logical block boundary is hit: the index jumps
/// ahead by `(P-1) * virtBlockSize`.
fn advance_index(index: u64, virt_block_size: u32, num_tiles: u32) -> u64 {
    if num_tiles <= 1 || virt_block_size == 0 {
        return index + 1;
    }
    let vbs = u64::from(virt_block_size);
    let within_block = (index + 1) % vbs;
    if within_block == 0 {
        index + 1 + (u64::from(num_tiles) - 1) * vbs
    } else {
        index + 1
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dtsim_ra::{PerType, RaUnit};
    use dtsim_tables::{FamilyState, RegBlockInfo};

    fn setup(phys_block_size: u32, locals: u32, shareds: u32) -> (FamilyTable, ThreadTable, RegisterFile, Fid) {
        let mut families = FamilyTable::new(1);
        let threads = ThreadTable::new(4);
        let mut ra = RaUnit::new(64, 8, 0, 8);
        let regfile = RegisterFile::new(64, 0);
        let fid = families.alloc(None).unwrap();
        let bases = ra
            .alloc(
                PerType {
                    integer: (locals + shareds) * phys_block_size,
                    float: 0,
                },
                fid,
            )
            .unwrap();
        let fam = families.get_mut(fid);
        fam.state = FamilyState::Idle;
        fam.start = 100;
        fam.step = 1;
        fam.last_thread = 3;
        fam.phys_block_size = phys_block_size;
        fam.virt_block_size = phys_block_size;
        fam.integer_regs = RegBlockInfo {
            globals: 0,
            shareds,
            locals,
            base: bases.integer,
            block_size: phys_block_size,
        };
        (families, threads, regfile, fid)
    }

    #[test]
    fn initializes_l0_with_induction_variable() {
        let (mut families, mut threads, mut regfile, fid) = setup(4, 1, 0);
        let mut reuse = VecDeque::new();
        let ThreadAllocStep::Initialized(tid) = step(fid, &mut families, &mut threads, &mut regfile, &mut reuse, 1) else {
            panic!("expected initialization")
        };
        let l0 = RegAddr::new(RegType::Integer, threads.get(tid).integer_base);
        assert_eq!(regfile.read(l0).unwrap().data.as_integer(), 100);
        assert!(threads.get(tid).is_first_in_family);
    }

    #[test]
    fn pauses_once_phys_block_size_is_live() {
        let (mut families, mut threads, mut regfile, fid) = setup(1, 1, 0);
        let mut reuse = VecDeque::new();
        let first = step(fid, &mut families, &mut threads, &mut regfile, &mut reuse, 1);
        assert!(matches!(first, ThreadAllocStep::Initialized(_)));
        let second = step(fid, &mut families, &mut threads, &mut regfile, &mut reuse, 1);
        assert_eq!(second, ThreadAllocStep::Paused);
    }

    #[test]
    fn sets_allocation_done_past_last_thread() {
        let (mut families, mut threads, mut regfile, fid) = setup(4, 1, 0);
        let mut reuse = VecDeque::new();
        for _ in 0..4 {
            step(fid, &mut families, &mut threads, &mut regfile, &mut reuse, 1);
        }
        assert!(families.get(fid).dependencies.allocation_done);
    }

    #[test]
    fn links_predecessor_successor_within_block() {
        let (mut families, mut threads, mut regfile, fid) = setup(2, 1, 1);
        let mut reuse = VecDeque::new();
        let ThreadAllocStep::Initialized(a) = step(fid, &mut families, &mut threads, &mut regfile, &mut reuse, 1) else {
            panic!()
        };
        let ThreadAllocStep::Initialized(b) = step(fid, &mut families, &mut threads, &mut regfile, &mut reuse, 1) else {
            panic!()
        };
        assert_eq!(threads.get(a).next_in_block, b);
        assert_eq!(threads.get(b).prev_in_block, a);
    }
}
