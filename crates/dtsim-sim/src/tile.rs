//! One tile: its own Family/Thread Table, register file, RA Unit,
//! I/D caches, FPU, pipeline, and Allocator state, stepped once per cycle
//! by [`Tile::step`].
//!
//! Real multithreading would interleave many threads' instructions
//! cycle-by-cycle; here one thread at a time occupies the pipeline from
//! fetch to retirement (tracked via `current`), with true pipelining of
//! *that* thread's own sequential instructions (fetch/decode/execute
//! overlap across cycles) but no interleaving between distinct threads.
//! Switching threads only happens when `current` retires, suspends, or
//! the active queue hands over a fresh one.

use std::collections::{HashMap, HashSet};
use std::fmt;

use dtsim_allocator::{
    activate_thread, decrease_family, drain_one, increase_family, kill, reschedule, set_prev_terminated, step_create, step_thread_alloc,
    suspend, Allocator, CleanupStep, CreateKind, CreateRequest, CreateStep, FamilyCounter, ThreadAllocStep,
};
use dtsim_cache::{CacheGeometry, DCache, ICache};
use dtsim_config::SystemConfig;
use dtsim_core::{CycleResult, Value};
use dtsim_fpu::{Fpu, FpuConfig};
use dtsim_memory::{MemOp, Memory, MemoryConfig};
use dtsim_network::{Network, Notification, SharedResponse};
use dtsim_pipeline::{Instruction, Op, Pipeline};
use dtsim_ra::RaUnit;
use dtsim_regfile::{Presence, Producer, RegAddr, RegData, RegType, RegisterFile, WriteEffect, WriteValue};
use dtsim_tables::{Fid, FamilyTable, ThreadState, ThreadTable, Tid};

/// Tags an in-flight [`Memory`] request as filling a D-cache line rather
/// than an I-cache one, since both caches share one backing store.
const DCACHE_TAG_BIT: u64 = 1 << 32;

#[derive(Debug)]
pub enum TileError {
    Cache(dtsim_cache::ConfigError),
}

impl fmt::Display for TileError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Cache(e) => write!(f, "{e}"),
        }
    }
}

impl std::error::Error for TileError {}

/// Everything that happened in one [`Tile::step`] call, for the caller's
/// statistics sampling and deadlock detection.
#[derive(Debug, Clone, Copy)]
pub struct TileStepReport {
    pub result: CycleResult,
    pub retired: Option<Instruction>,
    /// Set the cycle a family's last thread retired its `Exit` and the
    /// family's exit status was latched.
    pub family_exited: Option<Fid>,
    /// Which named component reported `Failed` this cycle, if any — used
    /// by `System`'s deadlock diagnostic to name the stuck component
    /// rather than just the tile.
    pub failed_component: Option<&'static str>,
}

impl Default for TileStepReport {
    fn default() -> Self {
        Self {
            result: CycleResult::Delayed,
            retired: None,
            family_exited: None,
            failed_component: None,
        }
    }
}

pub struct Tile {
    pub id: u32,
    pub families: FamilyTable,
    pub threads: ThreadTable,
    pub regfile: RegisterFile,
    pub ra: RaUnit,
    pub icache: ICache,
    pub dcache: DCache,
    pub fpu: Fpu,
    pub memory: Memory,
    pub allocator: Allocator,
    pub pipeline: Pipeline,
    /// Which instruction stream each live family on this tile runs.
    pub family_program: HashMap<Fid, u32>,
    /// The thread presently occupying the pipeline's fetch slot, if any.
    pub current: Option<Tid>,
    icache_inflight: HashSet<u32>,
    dcache_inflight: HashSet<u32>,
    /// GFIDs of remote creates already started on this tile, so a
    /// broadcast still visible via `peek` on a later hop isn't acted on
    /// twice.
    remote_creates_seen: HashSet<u32>,
}

impl Tile {
    pub fn new(id: u32, config: &SystemConfig) -> Result<Self, TileError> {
        let icache_geo = CacheGeometry::new(config.icache.associativity, config.icache.num_sets, config.cache_line_size).map_err(TileError::Cache)?;
        let dcache_geo = CacheGeometry::new(config.dcache.associativity, config.dcache.num_sets, config.cache_line_size).map_err(TileError::Cache)?;
        let fpu_config = FpuConfig {
            add_latency: config.fpu.add,
            sub_latency: config.fpu.sub,
            mul_latency: config.fpu.mul,
            div_latency: config.fpu.div,
            sqrt_latency: config.fpu.sqrt,
        };
        let memory_config = MemoryConfig {
            base_request_time: config.memory.base_request_time,
            time_per_line: config.memory.time_per_line,
            size_of_line: config.memory.size_of_line,
            buffer_size: config.memory.buffer_size,
            banks: config.memory.banks,
            parallel_requests: config.memory.parallel_requests,
        };
        Ok(Self {
            id,
            families: FamilyTable::new(config.num_families),
            threads: ThreadTable::new(config.num_threads),
            regfile: RegisterFile::new(config.num_int_registers, config.num_flt_registers),
            ra: RaUnit::new(
                config.num_int_registers,
                config.int_registers_block_size,
                config.num_flt_registers,
                config.flt_registers_block_size,
            ),
            icache: ICache::new(icache_geo),
            dcache: DCache::new(dcache_geo),
            fpu: Fpu::new(fpu_config),
            memory: Memory::new(memory_config),
            allocator: Allocator::new(),
            pipeline: Pipeline::new(),
            family_program: HashMap::new(),
            current: None,
            icache_inflight: HashSet::new(),
            dcache_inflight: HashSet::new(),
            remote_creates_seen: HashSet::new(),
        })
    }

    /// Begin a create locally (an issuing thread's create instruction
    /// retiring, or a group create's originating tile). Returns the new
    /// family slot, or `None` if the table is full or the allocator is
    /// already busy with another create.
    pub fn begin_create(&mut self, gfid: Option<u32>, program_id: u32, request: CreateRequest) -> Option<Fid> {
        if self.allocator.creating.is_some() {
            return None;
        }
        let fid = self.families.alloc(gfid)?;
        // A local family has no predecessor tile to wait on; a group or
        // remote family's dependency chain is closed later, via a
        // `ThreadCompletion`/`FamilyCompletion` notification handled in
        // `step`.
        if matches!(request.kind, CreateKind::Local) {
            self.families.get_mut(fid).dependencies.prev_terminated = true;
        }
        self.family_program.insert(fid, program_id);
        self.allocator.begin_create(fid, request);
        Some(fid)
    }

    /// One tile-cycle: advance an in-progress create, populate one thread
    /// slot, poll the FPU, drive the pipeline for `current`, drain one
    /// cleanup entry, and react to ring traffic (a create broadcast that
    /// is not this tile's own, or a dependency-closing notification).
    pub fn step(&mut self, network: &mut Network, programs: &HashMap<u32, Vec<Op>>, now: u64) -> TileStepReport {
        let mut report = TileStepReport::default();
        let mut success = false;
        let mut failed = false;

        self.observe_remote_create(network, now);
        self.observe_notifications(network);
        self.observe_shared_requests(network);
        self.observe_shared_responses(network, now);
        self.drain_memory_completions(network, now);

        if let Some(mut ctx) = self.allocator.creating.take() {
            match step_create(&mut ctx, &mut self.families, &mut self.ra, &mut self.icache, network, self.id, now) {
                CreateStep::InProgress => {
                    if ctx.state == dtsim_allocator::create::CreateState::LoadingLine && ctx.icache_line != dtsim_core::NIL {
                        self.submit_icache_fill(ctx.icache_line, now);
                    }
                    self.allocator.creating = Some(ctx);
                    success = true;
                }
                CreateStep::Done(fid) => {
                    if !self.families.get(fid).parent_shared_reg.is_none() {
                        increase_family(
                            fid,
                            FamilyCounter::PendingShareds,
                            1,
                            &mut self.families,
                            &mut self.threads,
                            &mut self.ra,
                            &mut self.regfile,
                            network,
                            self.id,
                        );
                    }
                    success = true;
                }
                CreateStep::RegistersUnavailable => {
                    self.allocator.creating = Some(ctx);
                    failed = true;
                    report.failed_component = Some("create");
                }
            }
        }

        if self.step_one_thread_alloc(network, now) {
            success = true;
        }

        if self.step_fpu_writebacks(now) {
            success = true;
        }

        if self.drive_pipeline(network, programs, now, &mut report) {
            success = true;
        }

        match drain_one(
            &mut self.allocator.cleanup_queue,
            &mut self.allocator.pending_reuse,
            |fam| !fam.dependencies.allocation_done,
            &mut self.families,
            &mut self.threads,
            &mut self.ra,
            &mut self.regfile,
            network,
            self.id,
        ) {
            CleanupStep::Empty => {}
            CleanupStep::Reused(_) | CleanupStep::Recycled { .. } => success = true,
        }

        report.result = if success {
            CycleResult::Success
        } else if failed {
            CycleResult::Failed
        } else {
            CycleResult::Delayed
        };
        report
    }

    /// If every family on this tile is idle and no thread is in flight,
    /// the tile has nothing left to do this run.
    #[must_use]
    pub fn is_idle(&self) -> bool {
        self.current.is_none()
            && self.allocator.active_queue.is_empty()
            && self.allocator.cleanup_queue.is_empty()
            && self.allocator.creating.is_none()
            && self.pipeline.is_idle()
            && self.families.iter_live().next().is_none()
    }

    fn step_one_thread_alloc(&mut self, network: &mut Network, now: u64) -> bool {
        let candidate = self
            .families
            .iter_live()
            .find(|(_, fam)| !fam.dependencies.allocation_done && fam.phys_block_size > 0)
            .map(|(fid, _)| fid);
        let Some(fid) = candidate else {
            return false;
        };
        match step_thread_alloc(
            fid,
            &mut self.families,
            &mut self.threads,
            &mut self.regfile,
            &mut self.allocator.pending_reuse,
            network.num_tiles,
        ) {
            ThreadAllocStep::Paused => false,
            ThreadAllocStep::Initialized(tid) => {
                self.seed_shared_chain(fid, tid);
                let pc = self.families.get(fid).pc;
                activate_thread(tid, pc, &mut self.icache, &mut self.threads, &mut self.allocator.active_queue, now);
                if let Some(line) = self.pending_icache_line(tid) {
                    self.submit_icache_fill(line, now);
                }
                true
            }
        }
    }

    /// Seed `tid`'s shared register at the start of its life: the first
    /// thread in a family copies from `parent_shared_reg`
    /// ([`Tile::seed_shared_from_parent`]); any later thread reusing the
    /// same physical slot picks up whatever value the slot's previous
    /// occupant stashed in `shared_chain_value` before its own shared
    /// register got cleared out from under it.
    fn seed_shared_chain(&mut self, fid: Fid, tid: Tid) {
        if self.threads.get(tid).is_first_in_family {
            self.seed_shared_from_parent(fid, tid);
            return;
        }
        let Some(value) = self.families.get_mut(fid).shared_chain_value.take() else {
            return;
        };
        let reg_type = match value {
            RegData::Integer(_) => RegType::Integer,
            RegData::Float(_) => RegType::Float,
        };
        let thread = self.threads.get(tid);
        let base = match reg_type {
            RegType::Integer => thread.integer_base,
            RegType::Float => thread.float_base,
        };
        let dest = RegAddr::new(reg_type, base);
        let _ = self.regfile.write(dest, WriteValue::Full(value), Producer::Writeback);
    }

    /// Copy the parent's current `parent_shared_reg` value into `tid`'s
    /// corresponding shared register — the chain's seed link. A parent on
    /// another tile is left `Pending`; nothing delivers it today.
    fn seed_shared_from_parent(&mut self, fid: Fid, tid: Tid) {
        let fam = self.families.get(fid);
        let parent_reg = fam.parent_shared_reg;
        if parent_reg.is_none() || fam.parent.tile != self.id {
            return;
        }
        let Ok(cell) = self.regfile.read(parent_reg) else {
            return;
        };
        if !cell.presence.is_full() {
            return;
        }
        let value = cell.data;
        let thread = self.threads.get(tid);
        let base = match parent_reg.reg_type {
            RegType::Integer => thread.integer_base,
            RegType::Float => thread.float_base,
        };
        let dest = RegAddr::new(parent_reg.reg_type, base);
        let _ = self.regfile.write(dest, WriteValue::Full(value), Producer::Writeback);
    }

    fn pending_icache_line(&self, tid: Tid) -> Option<u32> {
        let thread = self.threads.get(tid);
        (thread.state == ThreadState::Waiting).then_some(thread.cache_line)
    }

    fn submit_icache_fill(&mut self, line: u32, now: u64) {
        if self.icache_inflight.insert(line) {
            let _ = self.memory.submit(u64::from(line) * 64, MemOp::Read, u64::from(line), now);
        }
    }

    fn submit_dcache_fill(&mut self, line: u32, now: u64) {
        if self.dcache_inflight.insert(line) {
            let _ = self.memory.submit(u64::from(line) * 64, MemOp::Read, DCACHE_TAG_BIT | u64::from(line), now);
        }
    }

    fn drain_memory_completions(&mut self, network: &mut Network, now: u64) {
        let completed = self.memory.tick(now);
        for req in completed {
            if req.tag & DCACHE_TAG_BIT == 0 {
                let line = req.tag as u32;
                self.icache_inflight.remove(&line);
                let woken = self.icache.complete_fill(line);
                for tid in woken {
                    let pc = self.threads.get(tid).pc;
                    reschedule(tid, pc, &mut self.icache, &mut self.threads, &mut self.allocator.active_queue, now);
                }
            } else {
                let line = (req.tag & !DCACHE_TAG_BIT) as u32;
                self.dcache_inflight.remove(&line);
                self.drain_dcache_waiters(line, network, now);
            }
        }
    }

    /// Walk the cache line's waiter chain (threaded through each cell's
    /// `MemoryWait::next`), writing a synthetic value into every register
    /// waiting on this fill. Two threads can need waking for the same cell:
    /// the issuing thread, suspended on its own `Pending` destination and
    /// tracked by `wait.tid`, and (if some other thread's read raced ahead
    /// of the fill) a dependent reader the write itself reactivates.
    fn drain_dcache_waiters(&mut self, line: u32, network: &mut Network, now: u64) {
        let mut cur = self.dcache.complete_fill(line);
        while let Some(addr) = cur {
            let wait = match self.regfile.read(addr) {
                Ok(cell) => match cell.presence {
                    Presence::Pending { memory: Some(wait), .. } => Some(wait),
                    _ => None,
                },
                Err(_) => None,
            };
            let next = wait.filter(|w| w.next != dtsim_core::NIL).map(|w| RegAddr::new(addr.reg_type, w.next));
            let value = RegData::Integer(u64::from(addr.index));
            if let Ok(effect) = self.regfile.write(addr, WriteValue::Full(value), Producer::Memory) {
                if let WriteEffect::Reactivate { tid } = effect {
                    let pc = self.threads.get(tid).pc;
                    reschedule(tid, pc, &mut self.icache, &mut self.threads, &mut self.allocator.active_queue, now);
                }
                if let Some(w) = wait {
                    if w.tid != dtsim_core::NIL && self.threads.get(w.tid).state == ThreadState::Suspended {
                        let pc = self.threads.get(w.tid).pc;
                        reschedule(w.tid, pc, &mut self.icache, &mut self.threads, &mut self.allocator.active_queue, now);
                    }
                    decrease_family(
                        w.family,
                        FamilyCounter::PendingReads,
                        1,
                        &mut self.families,
                        &mut self.threads,
                        &mut self.ra,
                        &mut self.regfile,
                        network,
                        self.id,
                    );
                }
            }
            cur = next;
        }
    }

    /// Poll the FPU for completed operations and write their results
    /// back. A write-back that loses the race (target not yet pending)
    /// is left for the FPU to retry next cycle.
    fn step_fpu_writebacks(&mut self, now: u64) -> bool {
        let mut progressed = false;
        for (latency, target, value) in self.fpu.ready_heads(now) {
            match self.regfile.write(target, WriteValue::Full(RegData::Float(value)), Producer::Fpu) {
                Ok(WriteEffect::Reactivate { tid }) => {
                    self.fpu.pop_ready(latency);
                    let pc = self.threads.get(tid).pc;
                    reschedule(tid, pc, &mut self.icache, &mut self.threads, &mut self.allocator.active_queue, now);
                    progressed = true;
                }
                Ok(WriteEffect::None) => {
                    self.fpu.pop_ready(latency);
                    progressed = true;
                }
                Err(_) => {}
            }
        }
        progressed
    }

    fn drive_pipeline(&mut self, network: &mut Network, programs: &HashMap<u32, Vec<Op>>, now: u64, report: &mut TileStepReport) -> bool {
        let mut progressed = false;

        if self.current.is_none() {
            self.current = self.allocator.next_active();
        }

        if let Some(tid) = self.current {
            if matches!(self.threads.get(tid).state, ThreadState::Active | ThreadState::Running) {
                let pc = self.threads.get(tid).pc;
                let family = self.threads.get(tid).family;
                if let Some(program_id) = self.family_program.get(&family).copied() {
                    let op = programs.get(&program_id).and_then(|p| p.get(pc as usize)).copied();
                    if let Some(op) = op {
                        if self.pipeline.fetch(Instruction { tid, pc, op }) == dtsim_core::StageResult::Continue {
                            self.threads.get_mut(tid).pc = pc + 1;
                            self.threads.get_mut(tid).state = ThreadState::Running;
                            progressed = true;
                        }
                    }
                }
            }
        }

        let tick = self.pipeline.tick(&mut self.regfile, &mut self.dcache, &mut self.fpu, now);
        if !matches!(tick.fetch, dtsim_core::StageResult::Idle) || !matches!(tick.writeback, dtsim_core::StageResult::Idle) {
            progressed = true;
        }

        if let Some(line) = tick.dcache_miss {
            self.submit_dcache_fill(line, now);
        }

        if let Some(ls) = tick.load_suspend {
            if let Some(line) = tick.dcache_miss {
                let family = self.threads.get(ls.tid).family;
                let prev_head = self.dcache.push_waiter(line, ls.dest);
                let wait = dtsim_regfile::MemoryWait {
                    family,
                    tid: ls.tid,
                    offset: 0,
                    size: 8,
                    next: prev_head.map_or(dtsim_core::NIL, |a| a.index),
                };
                let _ = self
                    .regfile
                    .write(ls.dest, WriteValue::Pending { producer: Producer::Memory, memory: Some(wait) }, Producer::Memory);
                increase_family(
                    family,
                    FamilyCounter::PendingReads,
                    1,
                    &mut self.families,
                    &mut self.threads,
                    &mut self.ra,
                    &mut self.regfile,
                    network,
                    self.id,
                );
            }
            suspend(ls.tid, ls.pc, &mut self.threads);
            if self.current == Some(ls.tid) {
                self.current = None;
            }
            progressed = true;
        }

        if let Some(tid) = tick.writeback_reactivate {
            let pc = self.threads.get(tid).pc;
            reschedule(tid, pc, &mut self.icache, &mut self.threads, &mut self.allocator.active_queue, now);
        }

        if let Some((tid, target)) = tick.branch_taken {
            self.threads.get_mut(tid).pc = target;
            progressed = true;
        }

        if let Some(req) = tick.suspend {
            suspend(req.tid, req.pc, &mut self.threads);
            if self.current == Some(req.tid) {
                self.current = None;
            }
            progressed = true;
        }

        if let Some(instr) = tick.retired {
            progressed = true;
            report.retired = Some(instr);
            if let Some(dest) = instr.op.dest() {
                self.propagate_shared_write(instr.tid, dest, network, now);
            }
            if let Op::Exit { code_reg, value_reg } = instr.op {
                self.retire_exit(instr.tid, code_reg, value_reg, network, report);
            }
            if self.current == Some(instr.tid) && self.threads.get(instr.tid).state == ThreadState::Killed {
                self.current = None;
            }
        }

        progressed
    }

    fn retire_exit(&mut self, tid: Tid, code_reg: RegAddr, value_reg: Option<RegAddr>, network: &mut Network, report: &mut TileStepReport) {
        let fid = self.threads.get(tid).family;
        let code = self.regfile.read(code_reg).map(|c| c.data.as_integer()).unwrap_or(dtsim_core::EXIT_NORMAL);
        let value = value_reg.and_then(|addr| self.regfile.read(addr).ok()).map(|c| c.data.as_integer());
        {
            let fam = self.families.get_mut(fid);
            fam.exit_code = code;
            fam.exit_value = value;
        }
        kill(tid, &mut self.threads, &self.families, network, self.id);
        self.allocator.enqueue_cleanup(tid);
        report.family_exited = Some(fid);
    }

    /// If the just-retired instruction's destination falls inside its
    /// thread's shared-register sub-range, carry the value onward: to the
    /// parent (offset zero, last thread in the family), to the next thread
    /// already resident in the physical block at the same relative offset,
    /// or — if no successor is resident yet, offset zero — staged in
    /// `shared_chain_value` for whichever thread next reuses this slot.
    fn propagate_shared_write(&mut self, tid: Tid, dest: RegAddr, network: &mut Network, now: u64) {
        let thread = self.threads.get(tid);
        let fid = thread.family;
        let is_last_in_family = thread.is_last_in_family;
        let next = thread.next_in_block;
        let base = match dest.reg_type {
            RegType::Integer => thread.integer_base,
            RegType::Float => thread.float_base,
        };
        let fam = self.families.get(fid);
        let shareds = match dest.reg_type {
            RegType::Integer => fam.integer_regs.shareds,
            RegType::Float => fam.float_regs.shareds,
        };
        if dest.index < base || dest.index - base >= shareds {
            return;
        }
        let offset = dest.index - base;
        let Ok(cell) = self.regfile.read(dest) else {
            return;
        };
        if !cell.presence.is_full() {
            return;
        }
        let value = cell.data;

        if is_last_in_family && offset == 0 {
            self.deliver_to_parent(fid, dest.reg_type, value, network, now);
            return;
        }

        if next != dtsim_core::NIL {
            let next_base = match dest.reg_type {
                RegType::Integer => self.threads.get(next).integer_base,
                RegType::Float => self.threads.get(next).float_base,
            };
            let next_dest = RegAddr::new(dest.reg_type, next_base + offset);
            if let Ok(WriteEffect::Reactivate { tid: waiter }) = self.regfile.write(next_dest, WriteValue::Full(value), Producer::Writeback) {
                let pc = self.threads.get(waiter).pc;
                reschedule(waiter, pc, &mut self.icache, &mut self.threads, &mut self.allocator.active_queue, now);
            }
        } else if offset == 0 {
            self.families.get_mut(fid).shared_chain_value = Some(value);
        }
    }

    /// Hand a family's final shared-register value to its parent: a
    /// direct register write if the parent lives on this tile, or a
    /// best-effort `SharedResponse` injected onto the ring otherwise.
    /// Either way, one outstanding shared delivery against the family is
    /// cleared.
    fn deliver_to_parent(&mut self, fid: Fid, reg_type: RegType, value: RegData, network: &mut Network, now: u64) {
        let fam = self.families.get(fid);
        let parent_reg = fam.parent_shared_reg;
        let parent_tile = fam.parent.tile;
        if parent_reg.is_none() {
            return;
        }
        if parent_tile == self.id {
            if let Ok(WriteEffect::Reactivate { tid }) = self.regfile.write(parent_reg, WriteValue::Full(value), Producer::Writeback) {
                let pc = self.threads.get(tid).pc;
                reschedule(tid, pc, &mut self.icache, &mut self.threads, &mut self.allocator.active_queue, now);
            }
        } else if let Some(gfid) = fam.gfid {
            let _ = network.shared_response.try_inject(
                self.id,
                SharedResponse {
                    gfid,
                    register: parent_reg.index,
                    bits: value.as_integer(),
                    parent: true,
                },
            );
        }
        decrease_family(
            fid,
            FamilyCounter::PendingShareds,
            1,
            &mut self.families,
            &mut self.threads,
            &mut self.ra,
            &mut self.regfile,
            network,
            self.id,
        );
    }

    /// Absorb a `SharedRequest` addressed to this tile: if this tile's
    /// family holding `gfid` has the requested register `Full`, answer
    /// with a `SharedResponse`. Reachable only when some family's shared
    /// registers live on a tile other than its origin, which today no
    /// remote-create family ever has — kept for protocol completeness.
    fn observe_shared_requests(&mut self, network: &mut Network) {
        let Some(req) = network.shared_request.peek(self.id).copied() else {
            return;
        };
        let Some((_, fam)) = self.families.iter_live().find(|(_, fam)| fam.gfid == Some(req.gfid)) else {
            return;
        };
        let reg_type = if req.parent { fam.parent_shared_reg.reg_type } else { RegType::Integer };
        let addr = RegAddr::new(reg_type, req.register);
        let Ok(cell) = self.regfile.read(addr) else {
            return;
        };
        if !cell.presence.is_full() {
            return;
        }
        let bits = cell.data.as_integer();
        let _ = network.shared_request.absorb(self.id);
        let _ = network.shared_response.try_inject(
            self.id,
            SharedResponse {
                gfid: req.gfid,
                register: req.register,
                bits,
                parent: req.parent,
            },
        );
    }

    /// Absorb a `SharedResponse` addressed to this tile and write the
    /// delivered value into whichever of this tile's families is waiting
    /// on `gfid`'s shared register. Same reachability caveat as
    /// `observe_shared_requests`.
    fn observe_shared_responses(&mut self, network: &mut Network, now: u64) {
        let Some(resp) = network.shared_response.peek(self.id).copied() else {
            return;
        };
        let target = self
            .families
            .iter_live()
            .find(|(_, fam)| fam.gfid == Some(resp.gfid) && fam.parent_shared_reg.index == resp.register)
            .map(|(fid, _)| fid);
        let Some(fid) = target else {
            return;
        };
        let _ = network.shared_response.absorb(self.id);
        if !resp.parent {
            return;
        }
        let parent_reg = self.families.get(fid).parent_shared_reg;
        let value = match parent_reg.reg_type {
            RegType::Integer => RegData::Integer(resp.bits),
            RegType::Float => RegData::Float(f64::from_bits(resp.bits)),
        };
        if let Ok(WriteEffect::Reactivate { tid }) = self.regfile.write(parent_reg, WriteValue::Full(value), Producer::Writeback) {
            let pc = self.threads.get(tid).pc;
            reschedule(tid, pc, &mut self.icache, &mut self.threads, &mut self.allocator.active_queue, now);
        }
        decrease_family(
            fid,
            FamilyCounter::PendingShareds,
            1,
            &mut self.families,
            &mut self.threads,
            &mut self.ra,
            &mut self.regfile,
            network,
            self.id,
        );
    }

    /// Notice a create broadcast that originated elsewhere and, if this
    /// tile hasn't already started its share of it, begin a
    /// [`CreateKind::Remote`] creation from the message's fields.
    fn observe_remote_create(&mut self, network: &mut Network, _now: u64) {
        if self.allocator.creating.is_some() {
            return;
        }
        let Some(msg) = network.create.peek(self.id).copied() else {
            return;
        };
        if network.create.origin_at(self.id) == Some(self.id) {
            return;
        }
        if !self.remote_creates_seen.insert(msg.gfid) {
            return;
        }
        let request = CreateRequest {
            kind: CreateKind::Remote,
            pc: msg.pc,
            program_id: msg.program_id,
            start: msg.start,
            step: msg.step,
            last_thread: msg.last_thread,
            virt_block_size: msg.virt_block_size,
            regs: dtsim_allocator::RegCountsByType::default(),
            parent: dtsim_tables::ParentLocation::NONE,
            exit_code_reg: RegAddr::NONE,
            exit_value_reg: RegAddr::NONE,
            parent_shared_reg: RegAddr::NONE,
        };
        if let Some(fid) = self.families.alloc(Some(msg.gfid)) {
            self.family_program.insert(fid, msg.program_id);
            self.allocator.begin_create(fid, request);
        }
    }

    /// Absorb a `ThreadCompletion`/`FamilyCompletion` notification
    /// addressed to one of this tile's families and close its
    /// predecessor-termination dependency.
    fn observe_notifications(&mut self, network: &mut Network) {
        let Some(notification) = network.notifications.absorb(self.id) else {
            return;
        };
        let gfid = match notification {
            Notification::ThreadCompletion(g) | Notification::FamilyCompletion(g) | Notification::ThreadCleanup(g) => g,
        };
        let fid = self.families.iter_live().find(|(_, fam)| fam.gfid == Some(gfid)).map(|(fid, _)| fid);
        if let Some(fid) = fid {
            set_prev_terminated(fid, &mut self.families, &mut self.threads, &mut self.ra, &mut self.regfile, network, self.id);
        }
    }

    fn family_field(&self, fid: Fid, field: &str) -> Option<Value> {
        let fam = self.families.get(fid);
        match field {
            "state" => Some(Value::String(format!("{:?}", fam.state))),
            "pc" => Some(Value::U32(fam.pc)),
            "start" => Some(Value::U64(fam.start)),
            "step" => Some(Value::U64(fam.step)),
            "last_thread" => Some(Value::U64(fam.last_thread)),
            "phys_block_size" => Some(Value::U32(fam.phys_block_size)),
            "virt_block_size" => Some(Value::U32(fam.virt_block_size)),
            "allocation_done" => Some(Value::Bool(fam.dependencies.allocation_done)),
            "prev_terminated" => Some(Value::Bool(fam.dependencies.prev_terminated)),
            "num_threads_allocated" => Some(Value::U32(fam.dependencies.num_threads_allocated)),
            "num_pending_shareds" => Some(Value::U32(fam.dependencies.num_pending_shareds)),
            "num_pending_reads" => Some(Value::U32(fam.dependencies.num_pending_reads)),
            "exit_code" => Some(Value::U64(fam.exit_code)),
            "exit_value" => fam.exit_value.map(Value::U64),
            "gfid" => fam.gfid.map(Value::U32),
            _ => None,
        }
    }

    fn thread_field(&self, tid: Tid, field: &str) -> Option<Value> {
        let thread = self.threads.get(tid);
        match field {
            "state" => Some(Value::String(format!("{:?}", thread.state))),
            "pc" => Some(Value::U32(thread.pc)),
            "family" => Some(Value::U32(thread.family)),
            "index" => Some(Value::U64(thread.index)),
            "cache_line" => Some(Value::U32(thread.cache_line)),
            "is_first_in_family" => Some(Value::Bool(thread.is_first_in_family)),
            "is_last_in_family" => Some(Value::Bool(thread.is_last_in_family)),
            "is_last_in_block" => Some(Value::Bool(thread.is_last_in_block)),
            "waiting_for_writes" => Some(Value::Bool(thread.waiting_for_writes)),
            "killed" => Some(Value::Bool(thread.dependencies.killed)),
            _ => None,
        }
    }

    fn register_field(&self, reg_type: RegType, index: u32, field: Option<&str>) -> Option<Value> {
        let addr = RegAddr::new(reg_type, index);
        let cell = self.regfile.read(addr).ok()?;
        match field.unwrap_or("presence") {
            "presence" => Some(Value::String(match cell.presence {
                Presence::Empty => "Empty".to_string(),
                Presence::Pending { producer, .. } => format!("Pending({producer:?})"),
                Presence::Waiting { tid } => format!("Waiting({tid})"),
                Presence::Full => "Full".to_string(),
            })),
            "value" if cell.presence.is_full() => Some(match reg_type {
                RegType::Integer => Value::U64(cell.data.as_integer()),
                RegType::Float => Value::F64(cell.data.as_float()),
            }),
            _ => None,
        }
    }

    /// Threads belonging to `fid`, walking the intrusive member list
    /// rooted at `member_head`.
    fn family_members(&self, fid: Fid) -> Vec<Tid> {
        let mut members = Vec::new();
        let mut cur = self.families.get(fid).member_head;
        while cur != dtsim_core::NIL {
            members.push(cur);
            cur = self.threads.get(cur).member_next;
        }
        members
    }
}

impl dtsim_core::Observable for Tile {
    fn query(&self, path: &str) -> Option<Value> {
        let mut parts = path.splitn(3, '.');
        match parts.next()? {
            "id" => Some(Value::U32(self.id)),
            "current" => Some(Value::U32(self.current.unwrap_or(dtsim_core::NIL))),
            "family" => {
                let fid: Fid = parts.next()?.parse().ok()?;
                self.family_field(fid, parts.next()?)
            }
            "thread" => {
                let tid: Tid = parts.next()?.parse().ok()?;
                self.thread_field(tid, parts.next()?)
            }
            "register" => {
                let reg_type = match parts.next()? {
                    "integer" => RegType::Integer,
                    "float" => RegType::Float,
                    _ => return None,
                };
                let rest = parts.next()?;
                let mut rest_parts = rest.splitn(2, '.');
                let index: u32 = rest_parts.next()?.parse().ok()?;
                self.register_field(reg_type, index, rest_parts.next())
            }
            _ => None,
        }
    }

    fn query_paths(&self) -> Vec<String> {
        const FAMILY_FIELDS: &[&str] = &[
            "state",
            "pc",
            "start",
            "step",
            "last_thread",
            "phys_block_size",
            "virt_block_size",
            "allocation_done",
            "prev_terminated",
            "num_threads_allocated",
            "num_pending_shareds",
            "num_pending_reads",
            "exit_code",
            "exit_value",
            "gfid",
        ];
        const THREAD_FIELDS: &[&str] = &[
            "state",
            "pc",
            "family",
            "index",
            "cache_line",
            "is_first_in_family",
            "is_last_in_family",
            "is_last_in_block",
            "waiting_for_writes",
            "killed",
        ];

        let mut paths = vec!["id".to_string(), "current".to_string()];
        for (fid, _) in self.families.iter_live() {
            for field in FAMILY_FIELDS {
                paths.push(format!("family.{fid}.{field}"));
            }
            for tid in self.family_members(fid) {
                for field in THREAD_FIELDS {
                    paths.push(format!("thread.{tid}.{field}"));
                }
            }
        }
        paths
    }
}
