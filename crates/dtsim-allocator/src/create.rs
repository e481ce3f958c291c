//! Family creation pipeline: INITIAL → LOADING_LINE → LINE_LOADED →
//! {GETTING_TOKEN → HAS_TOKEN → RESERVING_FAMILY → BROADCASTING_CREATE →}
//! ALLOCATING_REGISTERS → INITIAL.

use dtsim_cache::{FetchOutcome, ICache};
use dtsim_network::{CreateMessage, Network, Reservation};
use dtsim_ra::{PerType, RaUnit};
use dtsim_tables::{Fid, FamilyState, ParentLocation, RegBlockInfo};

/// Register counts packed into the family's first instruction word (5
/// bits each for globals, shareds, locals per register type). Decoding
/// the real instruction word is out of scope; callers hand these in
/// directly alongside the rest of the create request.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PackedCounts {
    pub globals: u32,
    pub shareds: u32,
    pub locals: u32,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RegCountsByType {
    pub integer: PackedCounts,
    pub float: PackedCounts,
}

/// A local create is self-contained; a group create must traverse the
/// token/reservation/broadcast states. `tile` is the originating tile for
/// a local create and the tile that forwarded us the broadcast for a
/// remote one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CreateKind {
    Local,
    Group,
    /// Created on this tile because a [`CreateMessage`] arrived from the
    /// ring; the token/reservation steps are skipped because the
    /// originating tile already did them.
    Remote,
}

#[derive(Debug, Clone)]
pub struct CreateRequest {
    pub kind: CreateKind,
    pub pc: u32,
    /// Which instruction stream the created family runs, carried across
    /// the ring for group creates so a remote tile knows what to fetch.
    pub program_id: u32,
    pub start: u64,
    pub step: u64,
    pub last_thread: u64,
    pub virt_block_size: u32,
    pub regs: RegCountsByType,
    pub parent: ParentLocation,
    pub exit_code_reg: dtsim_regfile::RegAddr,
    pub exit_value_reg: dtsim_regfile::RegAddr,
    /// The parent's register backing this family's shared-register chain,
    /// if any. See [`dtsim_tables::FamilyDescriptor::parent_shared_reg`].
    pub parent_shared_reg: dtsim_regfile::RegAddr,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CreateState {
    Initial,
    LoadingLine,
    LineLoaded,
    GettingToken,
    HasToken,
    ReservingFamily,
    BroadcastingCreate,
    AllocatingRegisters,
}

pub struct CreateContext {
    pub state: CreateState,
    pub fid: Fid,
    pub request: CreateRequest,
    pub icache_line: u32,
    /// The phys_block_size currently being attempted; falls by one on
    /// each RA Unit failure until it fits or reaches zero.
    pub phys_block_size_attempt: u32,
    /// Cycles left before the in-flight reservation or create-broadcast
    /// sweep has visited every tile and returned to drop at origin. A ring
    /// hop takes exactly one [`Network::step`] call, and a full sweep
    /// takes `num_tiles` of them (see `RingChannel::step`'s
    /// return-to-origin rule) — counting down avoids having to
    /// distinguish "just left" from "came all the way back" by looking at
    /// the channel's slot alone.
    pub wait_remaining: u32,
}

impl CreateContext {
    #[must_use]
    pub fn new(fid: Fid, request: CreateRequest) -> Self {
        let phys_block_size_attempt = request.virt_block_size.max(1);
        Self {
            state: CreateState::Initial,
            fid,
            request,
            icache_line: dtsim_core::NIL,
            phys_block_size_attempt,
            wait_remaining: 0,
        }
    }
}

/// Outcome of one [`super::Allocator::step_create`] call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CreateStep {
    /// Still working; call again next cycle.
    InProgress,
    /// The create finished: `fid` is ready for `allocate_thread`.
    Done(Fid),
    /// Register blocks are unavailable even at phys_block_size=1; this is
    /// resource exhaustion, not an error — the caller keeps
    /// retrying and the top-level deadlock detector gives up after a
    /// sufficiently idle run.
    RegistersUnavailable,
}

/// Drive one cycle of the create state machine.
#[allow(clippy::too_many_arguments)]
pub fn step_create(
    ctx: &mut CreateContext,
    families: &mut dtsim_tables::FamilyTable,
    ra: &mut RaUnit,
    icache: &mut ICache,
    network: &mut Network,
    tile: u32,
    now: u64,
) -> CreateStep {
    match ctx.state {
        CreateState::Initial => {
            ctx.state = CreateState::LoadingLine;
            CreateStep::InProgress
        }
        CreateState::LoadingLine => {
            let outcome = icache.request(ctx.request.pc, now);
            match outcome {
                FetchOutcome::Hit { .. } => {
                    ctx.state = CreateState::LineLoaded;
                }
                FetchOutcome::Miss { line } => {
                    ctx.icache_line = line;
                }
            }
            CreateStep::InProgress
        }
        CreateState::LineLoaded => {
            let fam = families.get_mut(ctx.fid);
            fam.integer_regs = RegBlockInfo {
                globals: ctx.request.regs.integer.globals,
                shareds: ctx.request.regs.integer.shareds,
                locals: ctx.request.regs.integer.locals,
                base: 0,
                block_size: 0,
            };
            fam.float_regs = RegBlockInfo {
                globals: ctx.request.regs.float.globals,
                shareds: ctx.request.regs.float.shareds,
                locals: ctx.request.regs.float.locals,
                base: 0,
                block_size: 0,
            };
            fam.start = ctx.request.start;
            fam.step = ctx.request.step;
            fam.last_thread = ctx.request.last_thread;
            fam.virt_block_size = ctx.request.virt_block_size;
            fam.parent = ctx.request.parent;
            fam.exit_code_reg = ctx.request.exit_code_reg;
            fam.exit_value_reg = ctx.request.exit_value_reg;
            fam.parent_shared_reg = ctx.request.parent_shared_reg;
            fam.pc = ctx.request.pc;

            ctx.state = match ctx.request.kind {
                CreateKind::Local => CreateState::AllocatingRegisters,
                CreateKind::Group => CreateState::GettingToken,
                CreateKind::Remote => CreateState::AllocatingRegisters,
            };
            CreateStep::InProgress
        }
        CreateState::GettingToken => {
            network.token.set_want(tile, true);
            if network.token.has_token(tile) {
                ctx.state = CreateState::HasToken;
            }
            CreateStep::InProgress
        }
        CreateState::HasToken => {
            network.token.lock(tile);
            let gfid = ctx.fid;
            network.reservation.try_inject(
                tile,
                Reservation {
                    gfid,
                    origin_pid: tile,
                    release: false,
                },
            );
            ctx.wait_remaining = network.num_tiles;
            ctx.state = CreateState::ReservingFamily;
            CreateStep::InProgress
        }
        CreateState::ReservingFamily => {
            // `onReservationComplete`: the sweep has visited every tile and
            // returned to drop at origin.
            ctx.wait_remaining = ctx.wait_remaining.saturating_sub(1);
            if ctx.wait_remaining == 0 {
                let fam = families.get(ctx.fid);
                network.create.try_inject(
                    tile,
                    CreateMessage {
                        gfid: ctx.fid,
                        local_fid: ctx.fid,
                        pc: ctx.request.pc,
                        start: fam.start,
                        step: fam.step,
                        last_thread: fam.last_thread,
                        virt_block_size: fam.virt_block_size,
                        program_id: ctx.request.program_id,
                    },
                );
                ctx.wait_remaining = network.num_tiles;
                ctx.state = CreateState::BroadcastingCreate;
            }
            CreateStep::InProgress
        }
        CreateState::BroadcastingCreate => {
            ctx.wait_remaining = ctx.wait_remaining.saturating_sub(1);
            if ctx.wait_remaining == 0 {
                network.token.unlock(tile);
                network.token.set_want(tile, false);
                ctx.state = CreateState::AllocatingRegisters;
            }
            CreateStep::InProgress
        }
        CreateState::AllocatingRegisters => {
            if ctx.phys_block_size_attempt == 0 {
                return CreateStep::RegistersUnavailable;
            }
            let fam = families.get(ctx.fid);
            let phys = ctx.phys_block_size_attempt;
            let int_sizes = fam.integer_regs.total_registers(phys);
            let flt_sizes = fam.float_regs.total_registers(phys);
            match ra.alloc(
                PerType {
                    integer: int_sizes,
                    float: flt_sizes,
                },
                ctx.fid,
            ) {
                Some(bases) => {
                    let fam = families.get_mut(ctx.fid);
                    fam.phys_block_size = phys;
                    fam.integer_regs.base = bases.integer;
                    fam.integer_regs.block_size = phys;
                    fam.float_regs.base = bases.float;
                    fam.float_regs.block_size = phys;
                    fam.state = FamilyState::Idle;
                    ctx.state = CreateState::Initial;
                    CreateStep::Done(ctx.fid)
                }
                None => {
                    ctx.phys_block_size_attempt -= 1;
                    CreateStep::InProgress
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dtsim_cache::CacheGeometry;
    use dtsim_tables::FamilyTable;

    fn request(kind: CreateKind) -> CreateRequest {
        CreateRequest {
            kind,
            pc: 0,
            program_id: 0,
            start: 0,
            step: 1,
            last_thread: 3,
            virt_block_size: 2,
            regs: RegCountsByType {
                integer: PackedCounts {
                    globals: 0,
                    shareds: 0,
                    locals: 1,
                },
                float: PackedCounts::default(),
            },
            parent: ParentLocation::NONE,
            exit_code_reg: dtsim_regfile::RegAddr::NONE,
            exit_value_reg: dtsim_regfile::RegAddr::NONE,
            parent_shared_reg: dtsim_regfile::RegAddr::NONE,
        }
    }

    fn run_to_completion(ctx: &mut CreateContext, families: &mut FamilyTable, ra: &mut RaUnit, ic: &mut ICache, net: &mut Network, tile: u32) -> Fid {
        for cycle in 0.. {
            match step_create(ctx, families, ra, ic, net, tile, cycle) {
                CreateStep::Done(fid) => return fid,
                CreateStep::RegistersUnavailable => panic!("registers unavailable"),
                CreateStep::InProgress => net.step(),
            }
            assert!(cycle < 100, "create did not converge");
        }
        unreachable!()
    }

    #[test]
    fn local_create_skips_token_states() {
        let mut families = FamilyTable::new(1);
        let mut ra = RaUnit::new(32, 8, 0, 8);
        let mut ic = ICache::new(CacheGeometry::new(2, 4, 16).unwrap());
        let mut net = Network::new(1);
        let fid = families.alloc(None).unwrap();
        let mut ctx = CreateContext::new(fid, request(CreateKind::Local));

        let done = run_to_completion(&mut ctx, &mut families, &mut ra, &mut ic, &mut net, 0);
        assert_eq!(done, fid);
        assert_eq!(families.get(fid).state, FamilyState::Idle);
        assert!(families.get(fid).phys_block_size >= 1);
    }

    #[test]
    fn group_create_locks_and_releases_token() {
        let mut families = FamilyTable::new(1);
        let mut ra = RaUnit::new(32, 8, 0, 8);
        let mut ic = ICache::new(CacheGeometry::new(2, 4, 16).unwrap());
        let mut net = Network::new(2);
        let fid = families.alloc(None).unwrap();
        let mut ctx = CreateContext::new(fid, request(CreateKind::Group));

        run_to_completion(&mut ctx, &mut families, &mut ra, &mut ic, &mut net, 0);
        assert!(!net.token.wants(0));
    }
}
