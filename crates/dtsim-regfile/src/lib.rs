//! Dataflow register file.
//!
//! Registers carry presence/waiting state, not just values: a reader that
//! touches a non-`Full` register suspends rather than observing garbage.
//! This is the core synchronization mechanism the rest of the simulator
//! (Allocator, Pipeline, Network) is built on.

mod addr;
mod file;
mod value;

pub use addr::{RegAddr, RegType};
pub use file::{ProtocolViolation, RegisterFile, WriteEffect};
pub use value::{MemoryWait, Presence, Producer, RegCell, RegData, WriteValue};
