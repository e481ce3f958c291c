//! Six-stage in-order pipeline: Fetch, Decode, Read, Execute, Memory,
//! Writeback, with forwarding from Execute/Memory/Writeback into Read.
//!
//! Stages are driven back-to-front within [`Pipeline::tick`] so a stall
//! discovered in Read is visible to Decode/Fetch before they advance their
//! own latches this cycle — stall signals propagate upstream within the
//! same cycle they're discovered.

mod op;

pub use op::{Instruction, Op};

use dtsim_cache::{DCache, DCacheRequest};
use dtsim_core::StageResult;
use dtsim_fpu::Fpu;
use dtsim_regfile::{Presence, Producer, RegAddr, RegData, RegisterFile, WriteEffect, WriteValue};

/// A stage's output value, carried alongside its instruction so later
/// stages (and Read's bypass network) can see it.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Produced {
    pub instr: Instruction,
    pub value: Option<RegData>,
}

/// Returned when Read cannot resolve an operand: the caller must write a
/// `Waiting` cell naming `tid` and invoke the Allocator's `Suspend`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SuspendRequest {
    pub tid: u32,
    pub pc: u32,
    pub waiting_on: RegAddr,
}

/// Returned when a load misses in the D-cache: the caller must park
/// `dest` as `Pending` on the line's waiter chain and suspend `tid` at
/// `pc`, same as [`SuspendRequest`] but for a cache fill instead of a
/// register producer. Always accompanied by a `dcache_miss` line in the
/// same [`TickReport`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LoadSuspend {
    pub tid: u32,
    pub pc: u32,
    pub dest: RegAddr,
}

/// Everything that happened in one [`Pipeline::tick`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TickReport {
    pub fetch: StageResult,
    pub decode: StageResult,
    pub read: StageResult,
    pub execute: StageResult,
    pub memory: StageResult,
    pub writeback: StageResult,
    pub suspend: Option<SuspendRequest>,
    pub retired: Option<Instruction>,
    /// `(tid, target)` of a taken branch retiring Execute this cycle, so
    /// the caller can redirect that specific thread's pc.
    pub branch_taken: Option<(u32, u32)>,
    /// D-cache line that missed in the Memory stage this cycle, if any,
    /// so the caller can submit a backing-memory fill for it.
    pub dcache_miss: Option<u32>,
    /// Set alongside `dcache_miss` when the miss was a load: the caller
    /// must register `dest` on the line's waiter chain and suspend the
    /// thread rather than let it fall through to Writeback.
    pub load_suspend: Option<LoadSuspend>,
    /// Set when this cycle's Writeback completed a cell a thread was
    /// `Waiting` on: the caller must reschedule that thread.
    pub writeback_reactivate: Option<u32>,
}

pub struct Pipeline {
    fetch_out: Option<Instruction>,
    decode_out: Option<Instruction>,
    read_out: Option<(Instruction, Vec<RegData>)>,
    execute_out: Option<Produced>,
    memory_out: Option<Produced>,
    writeback_out: Option<Produced>,
}

impl Default for Pipeline {
    fn default() -> Self {
        Self::new()
    }
}

impl Pipeline {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            fetch_out: None,
            decode_out: None,
            read_out: None,
            execute_out: None,
            memory_out: None,
            writeback_out: None,
        }
    }

    #[must_use]
    pub const fn is_idle(&self) -> bool {
        self.fetch_out.is_none()
            && self.decode_out.is_none()
            && self.read_out.is_none()
            && self.execute_out.is_none()
            && self.memory_out.is_none()
            && self.writeback_out.is_none()
    }

    /// Fetch stage: latch a freshly-activated thread's first instruction.
    /// The active-thread queue and I-cache request themselves are the
    /// Allocator's concern; the pipeline only
    /// owns the latch.
    pub fn fetch(&mut self, instr: Instruction) -> StageResult {
        if self.fetch_out.is_some() {
            return StageResult::Stall;
        }
        self.fetch_out = Some(instr);
        StageResult::Continue
    }

    /// A just-executed `Load`'s value is only the requested address, not
    /// the data at it — Memory hasn't resolved hit/miss yet, so it can't be
    /// forwarded to a dependent Read this cycle. Everything else Execute
    /// produces this cycle is final and forwards immediately.
    fn bypass(&self, addr: RegAddr) -> Option<RegData> {
        if let Some(p) = &self.execute_out {
            if p.instr.op.dest() == Some(addr) && !addr.is_none() && !matches!(p.instr.op, Op::Load { .. }) {
                if let Some(v) = p.value {
                    return Some(v);
                }
            }
        }
        for produced in [&self.memory_out, &self.writeback_out] {
            if let Some(p) = produced {
                if p.instr.op.dest() == Some(addr) && !addr.is_none() {
                    if let Some(v) = p.value {
                        return Some(v);
                    }
                }
            }
        }
        None
    }

    /// Read stage: resolve every operand via bypass-then-regfile. Suspends
    /// the thread (discarding this cycle's read latch) if any operand is
    /// not `Full` and not covered by a bypass.
    fn read(&mut self, regfile: &mut RegisterFile) -> (StageResult, Option<SuspendRequest>) {
        let Some(instr) = self.decode_out.take() else {
            return (StageResult::Idle, None);
        };
        let mut values = Vec::new();
        for addr in instr.op.sources() {
            if let Some(v) = self.bypass(addr) {
                values.push(v);
                continue;
            }
            match regfile.read(addr) {
                Ok(cell) if cell.presence.is_full() => values.push(cell.data),
                Ok(_) => {
                    let _ = regfile.write(addr, WriteValue::Waiting { tid: instr.tid }, Producer::Execute);
                    return (StageResult::Flush, Some(SuspendRequest { tid: instr.tid, pc: instr.pc, waiting_on: addr }));
                }
                Err(_) => {
                    return (StageResult::Flush, Some(SuspendRequest { tid: instr.tid, pc: instr.pc, waiting_on: addr }));
                }
            }
        }
        self.read_out = Some((instr, values));
        (StageResult::Continue, None)
    }

    /// Execute stage: integer ALU in one cycle, FP queued to the FPU,
    /// branches reported back for the caller to act on.
    fn execute(&mut self, fpu: &mut Fpu, now: u64) -> (StageResult, Option<(u32, u32)>) {
        let Some((instr, values)) = self.read_out.take() else {
            return (StageResult::Idle, None);
        };
        let mut branch_taken = None;
        let value = match instr.op {
            Op::SetImmediate { value, .. } => Some(RegData::Integer(value as u64)),
            Op::Add { dest, .. } => {
                let a = values.first().copied().unwrap_or(RegData::Integer(0)).as_integer();
                let b = values.get(1).copied().unwrap_or(RegData::Integer(0)).as_integer();
                let _ = dest;
                Some(RegData::Integer(a.wrapping_add(b)))
            }
            Op::FloatOp { op, dest, .. } => {
                let a = values.first().copied().unwrap_or(RegData::Float(0.0)).as_float();
                let b = values.get(1).copied().unwrap_or(RegData::Float(0.0)).as_float();
                fpu.queue_operation(op, a, b, dest, now);
                None
            }
            Op::Load { addr, .. } => Some(RegData::Integer(u64::from(addr))),
            Op::Store { .. } | Op::Exit { .. } => None,
            Op::Branch { taken, target } => {
                if taken {
                    branch_taken = Some((instr.tid, target));
                }
                None
            }
        };
        self.execute_out = Some(Produced { instr, value });
        (if branch_taken.is_some() { StageResult::Flush } else { StageResult::Continue }, branch_taken)
    }

    /// Memory stage: loads issue a D-cache read. A hit forwards the value
    /// through to Writeback; a miss never reaches Writeback at all — it
    /// leaves the pipeline as a [`LoadSuspend`] for the caller to park on
    /// the line's waiter chain, the same way Read suspends on a pending
    /// operand. Stores issue a D-cache write and fall through regardless
    /// of hit/miss; a missed line is still reported so the caller can
    /// submit a backing-memory fill for future accesses.
    fn memory(&mut self, dcache: &mut DCache, now: u64) -> (StageResult, Option<u32>, Option<LoadSuspend>) {
        let Some(produced) = self.execute_out.take() else {
            return (StageResult::Idle, None, None);
        };
        match produced.instr.op {
            Op::Load { dest, addr } => match dcache.request(addr, now) {
                DCacheRequest::Hit { .. } => {
                    self.memory_out = Some(produced);
                    (StageResult::Continue, None, None)
                }
                DCacheRequest::Miss { line } => (
                    StageResult::Flush,
                    Some(line),
                    Some(LoadSuspend {
                        tid: produced.instr.tid,
                        pc: produced.instr.pc,
                        dest,
                    }),
                ),
            },
            Op::Store { addr, .. } => {
                let miss_line = if let DCacheRequest::Miss { line } = dcache.touch(addr, now) {
                    Some(line)
                } else {
                    None
                };
                self.memory_out = Some(Produced {
                    instr: produced.instr,
                    value: None,
                });
                (StageResult::Continue, miss_line, None)
            }
            _ => {
                self.memory_out = Some(produced);
                (StageResult::Continue, None, None)
            }
        }
    }

    /// Writeback stage: commit the produced value through the dedicated
    /// write port.
    fn writeback(&mut self, regfile: &mut RegisterFile) -> (StageResult, Option<Instruction>, Option<u32>) {
        let Some(produced) = self.memory_out.take() else {
            return (StageResult::Idle, None, None);
        };
        let mut reactivate = None;
        if let (Some(dest), Some(value)) = (produced.instr.op.dest(), produced.value) {
            if let Ok(WriteEffect::Reactivate { tid }) = regfile.write(dest, WriteValue::Full(value), Producer::Writeback) {
                reactivate = Some(tid);
            }
        }
        let retired = produced.instr;
        self.writeback_out = Some(produced);
        (StageResult::Continue, Some(retired), reactivate)
    }

    /// Run one cycle: Writeback, Memory, Execute, Read back-to-front, then
    /// Decode passes Fetch's latch through untouched (architectural-window
    /// translation is out of scope, see [`op`]).
    pub fn tick(&mut self, regfile: &mut RegisterFile, dcache: &mut DCache, fpu: &mut Fpu, now: u64) -> TickReport {
        let (writeback, retired, writeback_reactivate) = self.writeback(regfile);
        let (memory, dcache_miss, load_suspend) = self.memory(dcache, now);
        let (execute, branch_taken) = self.execute(fpu, now);
        let (read, suspend) = self.read(regfile);
        let decode = if let Some(instr) = self.fetch_out.take() {
            self.decode_out = Some(instr);
            StageResult::Continue
        } else {
            StageResult::Idle
        };
        let fetch = if self.fetch_out.is_some() { StageResult::Stall } else { StageResult::Idle };

        TickReport {
            fetch,
            decode,
            read,
            execute,
            memory,
            writeback,
            suspend,
            retired,
            branch_taken,
            dcache_miss,
            load_suspend,
            writeback_reactivate,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dtsim_cache::CacheGeometry;
    use dtsim_fpu::FpuConfig;
    use dtsim_regfile::RegType;

    fn addr(i: u32) -> RegAddr {
        RegAddr::new(RegType::Integer, i)
    }

    fn env() -> (RegisterFile, DCache, Fpu) {
        (
            RegisterFile::new(16, 0),
            DCache::new(CacheGeometry::new(2, 4, 16).unwrap()),
            Fpu::new(FpuConfig {
                add_latency: 1,
                sub_latency: 1,
                mul_latency: 1,
                div_latency: 1,
                sqrt_latency: 1,
            }),
        )
    }

    #[test]
    fn forwarding_chain_retires_without_stall() {
        let (mut rf, mut dc, mut fpu) = env();
        rf.write(addr(0), WriteValue::Full(RegData::Integer(0)), Producer::Allocator).unwrap();
        let mut pipe = Pipeline::new();
        pipe.fetch(Instruction {
            tid: 1,
            pc: 0,
            op: Op::SetImmediate { dest: addr(0), value: 1 },
        });
        let mut cycle = 0u64;
        let mut retired = Vec::new();
        for _ in 0..8 {
            let report = pipe.tick(&mut rf, &mut dc, &mut fpu, cycle);
            if let Some(r) = report.retired {
                retired.push(r);
            }
            cycle += 1;
        }
        assert!(!retired.is_empty());
        assert_eq!(rf.read(addr(0)).unwrap().data.as_integer(), 1);
    }

    #[test]
    fn read_suspends_on_pending_operand() {
        let (mut rf, mut dc, mut fpu) = env();
        rf.write(
            addr(5),
            WriteValue::Pending {
                producer: Producer::Memory,
                memory: None,
            },
            Producer::Allocator,
        )
        .unwrap();
        let mut pipe = Pipeline::new();
        pipe.fetch(Instruction {
            tid: 3,
            pc: 0,
            op: Op::Add {
                dest: addr(1),
                a: addr(5),
                b: addr(5),
            },
        });
        // Decode.
        pipe.tick(&mut rf, &mut dc, &mut fpu, 0);
        // Read observes the pending operand and suspends.
        let report = pipe.tick(&mut rf, &mut dc, &mut fpu, 1);
        assert_eq!(report.suspend, Some(SuspendRequest { tid: 3, pc: 0, waiting_on: addr(5) }));
        assert!(matches!(rf.read(addr(5)).unwrap().presence, Presence::Waiting { tid: 3 }));
    }
}
