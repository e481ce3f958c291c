//! Dependency accounting: `Decrease`/`Increase` are the only way family and
//! thread dependency counters change. Each decrease tests, in
//! order, whether the family has drained its threads, whether the full
//! termination predicate now holds (`killFamily`), and whether the
//! outermost slot-recycling predicate now holds (`FreeFamily`).

use dtsim_network::Network;
use dtsim_ra::RaUnit;
use dtsim_regfile::RegisterFile;
use dtsim_tables::{Fid, FamilyState, FamilyTable, ThreadTable};

use crate::kill_family::kill_family;

/// Which counter a `Decrease`/`Increase` call targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FamilyCounter {
    ThreadCount,
    PendingReads,
    PendingShareds,
}

/// What the cascade triggered, for callers that want to trace/test it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cascade {
    None,
    Drained,
    Terminated,
    Freed,
}

#[allow(clippy::too_many_arguments)]
pub fn decrease_family(
    fid: Fid,
    counter: FamilyCounter,
    amount: u32,
    families: &mut FamilyTable,
    threads: &mut ThreadTable,
    ra: &mut RaUnit,
    regfile: &mut RegisterFile,
    network: &mut Network,
    tile: u32,
) -> Cascade {
    let fam = families.get_mut(fid);
    match counter {
        FamilyCounter::ThreadCount => {
            fam.dependencies.num_threads_allocated = fam.dependencies.num_threads_allocated.saturating_sub(amount);
        }
        FamilyCounter::PendingReads => {
            fam.dependencies.num_pending_reads = fam.dependencies.num_pending_reads.saturating_sub(amount);
        }
        FamilyCounter::PendingShareds => {
            fam.dependencies.num_pending_shareds = fam.dependencies.num_pending_shareds.saturating_sub(amount);
        }
    }
    cascade(fid, counter, families, threads, ra, regfile, network, tile)
}

/// The counterpart to [`decrease_family`]: raises a counter when new work
/// becomes outstanding against the family (a load miss plants `Pending`
/// into the register block, or a shared delivery to the parent becomes
/// outstanding). Runs the same cascade afterward, though an increase can
/// only make the drained/terminated predicates harder to satisfy, never
/// trigger them.
#[allow(clippy::too_many_arguments)]
pub fn increase_family(
    fid: Fid,
    counter: FamilyCounter,
    amount: u32,
    families: &mut FamilyTable,
    threads: &mut ThreadTable,
    ra: &mut RaUnit,
    regfile: &mut RegisterFile,
    network: &mut Network,
    tile: u32,
) -> Cascade {
    let fam = families.get_mut(fid);
    match counter {
        FamilyCounter::ThreadCount => {
            fam.dependencies.num_threads_allocated += amount;
        }
        FamilyCounter::PendingReads => {
            fam.dependencies.num_pending_reads += amount;
        }
        FamilyCounter::PendingShareds => {
            fam.dependencies.num_pending_shareds += amount;
        }
    }
    cascade(fid, counter, families, threads, ra, regfile, network, tile)
}

/// Mark `allocationDone`; this participates in the same drained/terminated
/// cascade as a `ThreadCount` decrease (both match on
/// `FAMDEP_THREAD_COUNT` or `FAMDEP_ALLOCATION_DONE`).
#[allow(clippy::too_many_arguments)]
pub fn set_allocation_done(
    fid: Fid,
    families: &mut FamilyTable,
    threads: &mut ThreadTable,
    ra: &mut RaUnit,
    regfile: &mut RegisterFile,
    network: &mut Network,
    tile: u32,
) -> Cascade {
    families.get_mut(fid).dependencies.allocation_done = true;
    cascade(fid, FamilyCounter::ThreadCount, families, threads, ra, regfile, network, tile)
}

/// Mark the previous tile's corresponding thread as terminated (set by the
/// Network on receipt of a remote `ThreadCompletion`/`FamilyCompletion`).
#[allow(clippy::too_many_arguments)]
pub fn set_prev_terminated(
    fid: Fid,
    families: &mut FamilyTable,
    threads: &mut ThreadTable,
    ra: &mut RaUnit,
    regfile: &mut RegisterFile,
    network: &mut Network,
    tile: u32,
) -> Cascade {
    families.get_mut(fid).dependencies.prev_terminated = true;
    cascade(fid, FamilyCounter::PendingShareds, families, threads, ra, regfile, network, tile)
}

#[allow(clippy::too_many_arguments)]
fn cascade(
    fid: Fid,
    counter: FamilyCounter,
    families: &mut FamilyTable,
    threads: &mut ThreadTable,
    ra: &mut RaUnit,
    regfile: &mut RegisterFile,
    network: &mut Network,
    tile: u32,
) -> Cascade {
    let mut result = Cascade::None;

    if matches!(counter, FamilyCounter::ThreadCount) {
        let deps = families.get(fid).dependencies;
        if deps.num_threads_allocated == 0 && deps.allocation_done {
            families.get_mut(fid).state = FamilyState::Killed;
            result = Cascade::Drained;
        }
    }

    let fam = families.get(fid);
    if fam.dependencies.terminated() && !fam.kill_family_ran {
        kill_family(fid, families, threads, ra, regfile, network, tile);
        result = Cascade::Terminated;
    }

    let fam = families.get(fid);
    if fam.dependencies.fully_drained() {
        families.free(fid);
        result = Cascade::Freed;
    }

    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use dtsim_ra::PerType;
    use dtsim_tables::ParentLocation;

    fn setup() -> (FamilyTable, ThreadTable, RaUnit, RegisterFile, Network, Fid) {
        let mut families = FamilyTable::new(2);
        let threads = ThreadTable::new(2);
        let mut ra = RaUnit::new(16, 8, 0, 8);
        let regfile = RegisterFile::new(4, 0);
        let network = Network::new(1);

        let fid = families.alloc(None).unwrap();
        let bases = ra
            .alloc(
                PerType {
                    integer: 8,
                    float: 0,
                },
                fid,
            )
            .unwrap();
        let fam = families.get_mut(fid);
        fam.phys_block_size = 1;
        fam.integer_regs.base = bases.integer;
        fam.integer_regs.locals = 8;
        fam.parent = ParentLocation { tile: 0, thread: 0 };
        fam.dependencies.num_threads_allocated = 1;
        fam.dependencies.prev_terminated = true;
        (families, threads, ra, regfile, network, fid)
    }

    #[test]
    fn drains_terminates_and_frees_in_one_shot() {
        let (mut families, mut threads, mut ra, mut regfile, mut network, fid) = setup();
        families.get_mut(fid).dependencies.allocation_done = true;

        let cascade = decrease_family(
            fid,
            FamilyCounter::ThreadCount,
            1,
            &mut families,
            &mut threads,
            &mut ra,
            &mut regfile,
            &mut network,
            0,
        );
        assert_eq!(cascade, Cascade::Freed);
        assert_eq!(ra.free_registers(dtsim_regfile::RegType::Integer), 16);
    }

    #[test]
    fn stays_in_progress_until_allocation_done() {
        let (mut families, mut threads, mut ra, mut regfile, mut network, fid) = setup();
        let cascade = decrease_family(
            fid,
            FamilyCounter::ThreadCount,
            1,
            &mut families,
            &mut threads,
            &mut ra,
            &mut regfile,
            &mut network,
            0,
        );
        assert_eq!(cascade, Cascade::None);
    }
}
