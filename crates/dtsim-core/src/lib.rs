//! Scheduling, arbitration, and observability primitives shared by every
//! `dtsim` component.
//!
//! Every component in the simulated chip advances in lockstep under a
//! central cycle tick (see `dtsim-sim::System`). This crate has no notion of
//! "the chip" itself — it only provides the vocabulary components use to
//! describe one cycle of work: [`Cycle`] counts time, [`CycleResult`] and
//! [`StageResult`] classify what a component did, the `port` module
//! implements the acquire/check/commit arbitration pattern, and
//! [`Observable`]/[`Value`] expose component state for the `print`/`state`
//! interactive commands.

mod cycle;
mod observable;
pub mod port;
mod result;

pub use cycle::Cycle;
pub use observable::{Observable, Value};
pub use port::{ArbitratedPort, DedicatedPort, Priority, SubPhase};
pub use result::{CycleResult, StageResult};

/// Sentinel used throughout the simulator for "no index"/"no register"/"no
/// thread": tables are index-addressed arenas and "pointers" are indices
/// with a sentinel standing in for null.
pub const NIL: u32 = u32::MAX;

/// Exit code written to a family's exit-code register on normal
/// termination (no explicit non-zero `break`/exception exit).
pub const EXIT_NORMAL: u64 = 0;
