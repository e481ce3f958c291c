//! Active-thread queue and the three pipeline-invoked lifecycle edges:
//! `Suspend`, `Reschedule`, `Kill`.

use std::collections::VecDeque;

use dtsim_cache::{FetchOutcome, ICache};
use dtsim_core::NIL;
use dtsim_network::{Network, Notification};
use dtsim_tables::{FamilyTable, ThreadState, ThreadTable, Tid};

/// `ActivateThread(tid, pc)`: acquire the I-cache request port and either
/// link the thread onto the line's waiter queue (`Waiting`) or push it onto
/// the active-thread queue (`Active`). Idempotent across failures: on a
/// miss the thread is parked on the cache line, never left half-activated.
pub fn activate_thread(
    tid: Tid,
    pc: u32,
    icache: &mut ICache,
    threads: &mut ThreadTable,
    active_queue: &mut VecDeque<Tid>,
    now: u64,
) {
    let outcome = icache.request(pc, now);
    let thread = threads.get_mut(tid);
    thread.pc = pc;
    match outcome {
        FetchOutcome::Hit { line } => {
            thread.cache_line = line;
            thread.state = ThreadState::Active;
            active_queue.push_back(tid);
        }
        FetchOutcome::Miss { line } => {
            thread.cache_line = line;
            thread.state = ThreadState::Waiting;
            icache.enqueue_waiter(line, tid);
        }
    }
}

/// `Suspend(tid, pc)`: release the I-cache line, save `pc`, park the
/// thread. Whatever register it suspended on will reactivate it later.
pub fn suspend(tid: Tid, pc: u32, threads: &mut ThreadTable) {
    let thread = threads.get_mut(tid);
    thread.cache_line = NIL;
    thread.pc = pc;
    thread.state = ThreadState::Suspended;
}

/// `Reschedule(tid, pc)`: release the I-cache line and re-enter
/// `ActivateThread` at the new pc.
pub fn reschedule(
    tid: Tid,
    pc: u32,
    icache: &mut ICache,
    threads: &mut ThreadTable,
    active_queue: &mut VecDeque<Tid>,
    now: u64,
) {
    threads.get_mut(tid).cache_line = NIL;
    activate_thread(tid, pc, icache, threads, active_queue, now);
}

/// `Kill(tid)`: release the I-cache line, propagate the shared-register
/// termination chain (or notify the ring if this is the first thread on
/// the tile), mark `killed`, transition to `Killed`.
pub fn kill(tid: Tid, threads: &mut ThreadTable, families: &FamilyTable, network: &mut Network, tile: u32) {
    let thread = threads.get_mut(tid);
    thread.cache_line = NIL;
    thread.state = ThreadState::Killed;
    thread.dependencies.killed = true;
    let prev = thread.prev_in_block;
    let fid = thread.family;

    if prev != NIL {
        threads.get_mut(prev).dependencies.next_killed = true;
    } else if let Some(gfid) = families.get(fid).gfid {
        network.notifications.try_inject(tile, Notification::ThreadCompletion(gfid));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dtsim_cache::CacheGeometry;
    use dtsim_tables::FamilyTable;

    fn icache() -> ICache {
        ICache::new(CacheGeometry::new(2, 4, 16).unwrap())
    }

    #[test]
    fn activate_on_hit_pushes_active_queue() {
        let mut ic = icache();
        // Prime the line so the next request to the same address hits.
        ic.request(0, 0);
        ic.complete_fill(0);
        let mut threads = ThreadTable::new(2);
        let tid = threads.pop().unwrap();
        let mut queue = VecDeque::new();
        activate_thread(tid, 0, &mut ic, &mut threads, &mut queue, 1);
        assert_eq!(threads.get(tid).state, ThreadState::Active);
        assert_eq!(queue.pop_front(), Some(tid));
    }

    #[test]
    fn activate_on_miss_parks_on_line() {
        let mut ic = icache();
        let mut threads = ThreadTable::new(2);
        let tid = threads.pop().unwrap();
        let mut queue = VecDeque::new();
        activate_thread(tid, 0x200, &mut ic, &mut threads, &mut queue, 0);
        assert_eq!(threads.get(tid).state, ThreadState::Waiting);
        assert!(queue.is_empty());
    }

    #[test]
    fn kill_marks_predecessor_next_killed() {
        let mut threads = ThreadTable::new(2);
        let a = threads.pop().unwrap();
        let b = threads.pop().unwrap();
        threads.get_mut(b).prev_in_block = a;
        let families = FamilyTable::new(1);
        let mut network = dtsim_network::Network::new(1);
        kill(b, &mut threads, &families, &mut network, 0);
        assert!(threads.get(a).dependencies.next_killed);
        assert_eq!(threads.get(b).state, ThreadState::Killed);
    }
}
