//! Floating point unit: a bank of pipelines keyed by operation latency.

use std::collections::{HashMap, VecDeque};

use dtsim_regfile::RegAddr;

/// The five floating-point operations the simulator drives, each with its
/// own configurable `FPU*Latency`. Arithmetic correctness is out of scope;
/// the computed value only needs to be deterministic enough to drive the
/// dependency chains the test scenarios check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FpuOp {
    Add,
    Sub,
    Mul,
    Div,
    Sqrt,
}

#[derive(Debug, Clone, Copy)]
pub struct FpuConfig {
    pub add_latency: u64,
    pub sub_latency: u64,
    pub mul_latency: u64,
    pub div_latency: u64,
    pub sqrt_latency: u64,
}

impl FpuConfig {
    #[must_use]
    pub const fn latency(&self, op: FpuOp) -> u64 {
        match op {
            FpuOp::Add => self.add_latency,
            FpuOp::Sub => self.sub_latency,
            FpuOp::Mul => self.mul_latency,
            FpuOp::Div => self.div_latency,
            FpuOp::Sqrt => self.sqrt_latency,
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct ResultRecord {
    value: f64,
    target: RegAddr,
    completion_cycle: u64,
}

/// A bank of FIFO pipelines, one per distinct latency value in use.
pub struct Fpu {
    config: FpuConfig,
    pipelines: HashMap<u64, VecDeque<ResultRecord>>,
}

impl Fpu {
    #[must_use]
    pub fn new(config: FpuConfig) -> Self {
        Self {
            config,
            pipelines: HashMap::new(),
        }
    }

    fn compute(op: FpuOp, ra: f64, rb: f64) -> f64 {
        match op {
            FpuOp::Add => ra + rb,
            FpuOp::Sub => ra - rb,
            FpuOp::Mul => ra * rb,
            FpuOp::Div => ra / rb,
            FpuOp::Sqrt => ra.sqrt(),
        }
    }

    /// Queue an operation. Returns `false` (back-pressure) if the
    /// pipeline's head is already scheduled to complete on the same cycle
    /// this operation would.
    pub fn queue_operation(&mut self, op: FpuOp, ra: f64, rb: f64, target: RegAddr, now: u64) -> bool {
        let latency = self.config.latency(op);
        let completion_cycle = now + latency;
        let pipeline = self.pipelines.entry(latency).or_default();
        if let Some(head) = pipeline.front() {
            if head.completion_cycle == completion_cycle {
                return false;
            }
        }
        pipeline.push_back(ResultRecord {
            value: Self::compute(op, ra, rb),
            target,
            completion_cycle,
        });
        true
    }

    /// Heads whose completion cycle has arrived, with the latency key
    /// needed to pop them via [`Self::pop_ready`].
    pub fn ready_heads(&self, now: u64) -> Vec<(u64, RegAddr, f64)> {
        self.pipelines
            .iter()
            .filter_map(|(&latency, pipeline)| {
                pipeline
                    .front()
                    .filter(|r| r.completion_cycle <= now)
                    .map(|r| (latency, r.target, r.value))
            })
            .collect()
    }

    /// Pop the head of `latency`'s pipeline after its write-back
    /// succeeded. If the write-back failed (target cell not yet
    /// `Pending`/`Waiting` — a too-fast write), leave it for next cycle's
    /// retry.
    pub fn pop_ready(&mut self, latency: u64) {
        if let Some(pipeline) = self.pipelines.get_mut(&latency) {
            pipeline.pop_front();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dtsim_regfile::RegType;

    fn cfg() -> FpuConfig {
        FpuConfig {
            add_latency: 2,
            sub_latency: 2,
            mul_latency: 4,
            div_latency: 8,
            sqrt_latency: 10,
        }
    }

    #[test]
    fn completes_after_latency_and_computes() {
        let mut fpu = Fpu::new(cfg());
        let target = RegAddr::new(RegType::Float, 3);
        assert!(fpu.queue_operation(FpuOp::Add, 1.0, 2.0, target, 0));
        assert!(fpu.ready_heads(1).is_empty());
        let ready = fpu.ready_heads(2);
        assert_eq!(ready.len(), 1);
        assert_eq!(ready[0].1, target);
        assert!((ready[0].2 - 3.0).abs() < f64::EPSILON);
    }

    #[test]
    fn back_pressure_on_same_cycle_collision() {
        let mut fpu = Fpu::new(cfg());
        let target = RegAddr::new(RegType::Float, 0);
        assert!(fpu.queue_operation(FpuOp::Add, 1.0, 1.0, target, 0));
        // Same latency class, same completion cycle as the still-unpopped head.
        assert!(!fpu.queue_operation(FpuOp::Add, 2.0, 2.0, target, 0));
    }

    #[test]
    fn retry_leaves_head_in_place() {
        let mut fpu = Fpu::new(cfg());
        let target = RegAddr::new(RegType::Float, 1);
        fpu.queue_operation(FpuOp::Sqrt, 4.0, 0.0, target, 0);
        let ready = fpu.ready_heads(10);
        assert_eq!(ready.len(), 1);
        // Simulate a failed write-back: do not pop, try again next cycle.
        let ready_again = fpu.ready_heads(11);
        assert_eq!(ready_again.len(), 1);
        fpu.pop_ready(10);
        assert!(fpu.ready_heads(11).is_empty());
    }
}
