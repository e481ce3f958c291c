//! Cleanup queue: recycles killed thread slots, one per cycle.

use std::collections::VecDeque;

use dtsim_network::Network;
use dtsim_ra::RaUnit;
use dtsim_regfile::RegisterFile;
use dtsim_tables::{FamilyTable, ThreadState, ThreadTable, Tid};

use crate::dependencies::{decrease_family, Cascade, FamilyCounter};

/// Outcome of draining one cleanup-queue entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CleanupStep {
    /// Nothing was queued.
    Empty,
    /// `tid`'s slot was handed back for reuse by the family still under
    /// allocation (`isNewlyAllocated = false`).
    Reused(Tid),
    /// `tid`'s slot is now `Unused`; the family's thread-count dependency
    /// was decreased, with `cascade` describing any resulting effect.
    Recycled { tid: Tid, cascade: Cascade },
}

/// Drain one thread off the cleanup queue. `still_allocating` tells us
/// whether the owning family has more threads left to allocate (an
/// index/last_thread/allocationDone check the caller performs, since that
/// state lives on the family descriptor the create pipeline maintains).
#[allow(clippy::too_many_arguments)]
pub fn drain_one(
    cleanup_queue: &mut VecDeque<Tid>,
    pending_reuse: &mut VecDeque<Tid>,
    still_allocating: impl FnOnce(&dtsim_tables::FamilyDescriptor) -> bool,
    families: &mut FamilyTable,
    threads: &mut ThreadTable,
    ra: &mut RaUnit,
    regfile: &mut RegisterFile,
    network: &mut Network,
    tile: u32,
) -> CleanupStep {
    let Some(tid) = cleanup_queue.pop_front() else {
        return CleanupStep::Empty;
    };

    let fid = threads.get(tid).family;
    if still_allocating(families.get(fid)) {
        threads.get_mut(tid).state = ThreadState::Waiting;
        pending_reuse.push_back(tid);
        CleanupStep::Reused(tid)
    } else {
        threads.get_mut(tid).state = ThreadState::Unused;
        let cascade = decrease_family(fid, FamilyCounter::ThreadCount, 1, families, threads, ra, regfile, network, tile);
        CleanupStep::Recycled { tid, cascade }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dtsim_ra::PerType;

    #[test]
    fn empty_queue_is_noop() {
        let mut cleanup = VecDeque::new();
        let mut reuse = VecDeque::new();
        let mut families = FamilyTable::new(1);
        let mut threads = ThreadTable::new(1);
        let mut ra = RaUnit::new(8, 8, 0, 8);
        let mut regfile = RegisterFile::new(4, 0);
        let mut network = Network::new(1);
        let step = drain_one(&mut cleanup, &mut reuse, |_| true, &mut families, &mut threads, &mut ra, &mut regfile, &mut network, 0);
        assert_eq!(step, CleanupStep::Empty);
    }

    #[test]
    fn reuses_slot_when_family_still_allocating() {
        let mut families = FamilyTable::new(1);
        let mut threads = ThreadTable::new(1);
        let mut ra = RaUnit::new(8, 8, 0, 8);
        let mut regfile = RegisterFile::new(4, 0);
        let mut network = Network::new(1);
        let fid = families.alloc(None).unwrap();
        let tid = threads.pop().unwrap();
        threads.get_mut(tid).family = fid;
        threads.get_mut(tid).state = ThreadState::Killed;

        let mut cleanup = VecDeque::from([tid]);
        let mut reuse = VecDeque::new();
        let step = drain_one(&mut cleanup, &mut reuse, |_| true, &mut families, &mut threads, &mut ra, &mut regfile, &mut network, 0);
        assert_eq!(step, CleanupStep::Reused(tid));
        assert_eq!(threads.get(tid).state, ThreadState::Waiting);
        assert_eq!(reuse.pop_front(), Some(tid));
        let _ = PerType::<u32>::default();
    }

    #[test]
    fn recycles_and_decreases_thread_count_when_done_allocating() {
        let mut families = FamilyTable::new(1);
        let mut threads = ThreadTable::new(1);
        let mut ra = RaUnit::new(8, 8, 0, 8);
        let mut regfile = RegisterFile::new(4, 0);
        let mut network = Network::new(1);
        let fid = families.alloc(None).unwrap();
        families.get_mut(fid).dependencies.num_threads_allocated = 1;
        families.get_mut(fid).dependencies.allocation_done = true;
        families.get_mut(fid).dependencies.prev_terminated = true;
        let tid = threads.pop().unwrap();
        threads.get_mut(tid).family = fid;
        threads.get_mut(tid).state = ThreadState::Killed;

        let mut cleanup = VecDeque::from([tid]);
        let mut reuse = VecDeque::new();
        let step = drain_one(&mut cleanup, &mut reuse, |_| false, &mut families, &mut threads, &mut ra, &mut regfile, &mut network, 0);
        assert_eq!(
            step,
            CleanupStep::Recycled {
                tid,
                cascade: Cascade::Freed
            }
        );
        assert_eq!(threads.get(tid).state, ThreadState::Unused);
    }
}
