//! The register file proper.

use std::fmt;

use dtsim_core::port::{ArbitratedPort, DedicatedPort};

use crate::addr::{RegAddr, RegType};
use crate::value::{Presence, Producer, RegCell, RegData, WriteValue};

/// Static priorities on the shared async ports: FPU highest, then D-cache
/// completion, Network, Allocator.
pub mod priority {
    use dtsim_core::port::Priority;

    pub const FPU: Priority = 0;
    pub const DCACHE: Priority = 1;
    pub const NETWORK: Priority = 2;
    pub const ALLOCATOR: Priority = 3;
}

/// A simulator-internal assertion failure.
///
/// These indicate a bug in the simulator itself (or in a hand-written test
/// program violating the dataflow protocol), not a condition a correctly
/// operating program can trigger — so callers are expected to treat this as
/// fatal, the same way `format_adf::AdfError` is fatal to its caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProtocolViolation {
    /// A write named a producer other than the one the cell is pending for.
    WrongProducer { addr: (RegType, u32) },
    /// A write attempted to suspend a reader on a register nobody will ever
    /// produce (`Empty`).
    WriteToEmpty { addr: (RegType, u32) },
    /// A second reader tried to suspend on an already-`Waiting` cell.
    AlreadyWaiting { addr: (RegType, u32) },
    /// The address is out of range for this register file.
    OutOfRange { addr: (RegType, u32) },
}

impl fmt::Display for ProtocolViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::WrongProducer { addr } => {
                write!(f, "write to {addr:?} by a component other than its named producer")
            }
            Self::WriteToEmpty { addr } => {
                write!(f, "attempted to suspend a reader on empty register {addr:?}")
            }
            Self::AlreadyWaiting { addr } => {
                write!(f, "register {addr:?} already has a waiting reader")
            }
            Self::OutOfRange { addr } => write!(f, "register address {addr:?} out of range"),
        }
    }
}

impl std::error::Error for ProtocolViolation {}

/// Effect a [`RegisterFile::write`] had beyond the cell itself: the caller
/// (the tile's orchestration code) is responsible for acting on it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteEffect {
    /// No further action required.
    None,
    /// Ask the Allocator to reactivate this thread: either a writer
    /// completed a cell that a reader was `Waiting` on, or a reader's
    /// suspend-write raced a producer that had already completed the cell.
    Reactivate { tid: u32 },
}

/// Typed register array with the presence-bit dataflow protocol.
pub struct RegisterFile {
    integers: Vec<RegCell>,
    floats: Vec<RegCell>,

    pub pipeline_read1: DedicatedPort,
    pub pipeline_read2: DedicatedPort,
    pub pipeline_write: DedicatedPort,
    pub async_read: ArbitratedPort,
    pub async_write: ArbitratedPort,
}

impl RegisterFile {
    #[must_use]
    pub fn new(num_integers: u32, num_floats: u32) -> Self {
        Self {
            integers: vec![RegCell::empty(RegType::Integer); num_integers as usize],
            floats: vec![RegCell::empty(RegType::Float); num_floats as usize],
            pipeline_read1: DedicatedPort::new("regfile.pipeline_r1"),
            pipeline_read2: DedicatedPort::new("regfile.pipeline_r2"),
            pipeline_write: DedicatedPort::new("regfile.pipeline_w"),
            async_read: ArbitratedPort::new("regfile.async_r"),
            async_write: ArbitratedPort::new("regfile.async_w"),
        }
    }

    #[must_use]
    pub fn size(&self, reg_type: RegType) -> u32 {
        match reg_type {
            RegType::Integer => self.integers.len() as u32,
            RegType::Float => self.floats.len() as u32,
        }
    }

    fn bank(&self, reg_type: RegType) -> &[RegCell] {
        match reg_type {
            RegType::Integer => &self.integers,
            RegType::Float => &self.floats,
        }
    }

    fn bank_mut(&mut self, reg_type: RegType) -> &mut Vec<RegCell> {
        match reg_type {
            RegType::Integer => &mut self.integers,
            RegType::Float => &mut self.floats,
        }
    }

    fn cell(&self, addr: RegAddr) -> Result<&RegCell, ProtocolViolation> {
        self.bank(addr.reg_type)
            .get(addr.index as usize)
            .ok_or(ProtocolViolation::OutOfRange {
                addr: (addr.reg_type, addr.index),
            })
    }

    /// Synchronous read; never fails once the read port is acquired.
    pub fn read(&self, addr: RegAddr) -> Result<RegCell, ProtocolViolation> {
        self.cell(addr).copied()
    }

    /// Write into a cell, applying the three allowed presence transitions.
    pub fn write(
        &mut self,
        addr: RegAddr,
        value: WriteValue,
        writer: Producer,
    ) -> Result<WriteEffect, ProtocolViolation> {
        let raw_addr = (addr.reg_type, addr.index);
        let bank = self.bank_mut(addr.reg_type);
        let cell = bank
            .get_mut(addr.index as usize)
            .ok_or(ProtocolViolation::OutOfRange { addr: raw_addr })?;

        match value {
            WriteValue::Full(data) => match cell.presence {
                Presence::Empty | Presence::Full => {
                    cell.presence = Presence::Full;
                    cell.data = data;
                    Ok(WriteEffect::None)
                }
                Presence::Pending { producer, .. } if producer == writer => {
                    cell.presence = Presence::Full;
                    cell.data = data;
                    Ok(WriteEffect::None)
                }
                Presence::Pending { .. } => Err(ProtocolViolation::WrongProducer { addr: raw_addr }),
                Presence::Waiting { tid } => {
                    cell.presence = Presence::Full;
                    cell.data = data;
                    Ok(WriteEffect::Reactivate { tid })
                }
            },
            WriteValue::Pending { producer, memory } => {
                cell.presence = Presence::Pending { producer, memory };
                Ok(WriteEffect::None)
            }
            WriteValue::Waiting { tid } => match cell.presence {
                Presence::Empty => Err(ProtocolViolation::WriteToEmpty { addr: raw_addr }),
                Presence::Waiting { .. } => Err(ProtocolViolation::AlreadyWaiting { addr: raw_addr }),
                Presence::Full => {
                    // Race: data already arrived before the reader's suspend
                    // landed. Pass the reader straight through instead of
                    // parking it.
                    Ok(WriteEffect::Reactivate { tid })
                }
                Presence::Pending { .. } => {
                    cell.presence = Presence::Waiting { tid };
                    Ok(WriteEffect::None)
                }
            },
        }
    }

    /// Bulk-initialize a contiguous block of `size` registers of `reg_type`
    /// to `template`.
    pub fn clear(&mut self, reg_type: RegType, base: u32, size: u32, template: WriteValue) {
        for index in base..base + size {
            let addr = RegAddr::new(reg_type, index);
            // `clear` is an administrative bulk operation used by the
            // Allocator during thread allocation; it always succeeds
            // because it is only ever applied to freshly-allocated blocks.
            let producer = match template {
                WriteValue::Pending { producer, .. } => producer,
                _ => Producer::Allocator,
            };
            let _ = self.write(addr, template, producer);
            let _ = addr;
        }
    }

    /// Resolve all arbitrated ports. Called once between `acquire` and
    /// `check` for both the read phase and the write phase.
    pub fn arbitrate(&mut self) {
        self.async_read.arbitrate();
        self.async_write.arbitrate();
    }

    /// Reset all ports ahead of the next sub-phase.
    pub fn reset_ports(&mut self) {
        self.pipeline_read1.reset();
        self.pipeline_read2.reset();
        self.pipeline_write.reset();
        self.async_read.reset();
        self.async_write.reset();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr(i: u32) -> RegAddr {
        RegAddr::new(RegType::Integer, i)
    }

    #[test]
    fn empty_to_full_direct() {
        let mut rf = RegisterFile::new(8, 8);
        let effect = rf
            .write(addr(0), WriteValue::Full(RegData::Integer(42)), Producer::Execute)
            .unwrap();
        assert_eq!(effect, WriteEffect::None);
        assert!(rf.read(addr(0)).unwrap().presence.is_full());
    }

    #[test]
    fn pending_then_matching_producer_completes() {
        let mut rf = RegisterFile::new(8, 8);
        rf.write(
            addr(1),
            WriteValue::Pending {
                producer: Producer::Fpu,
                memory: None,
            },
            Producer::Allocator,
        )
        .unwrap();
        let err = rf
            .write(addr(1), WriteValue::Full(RegData::Integer(1)), Producer::Network)
            .unwrap_err();
        assert_eq!(
            err,
            ProtocolViolation::WrongProducer {
                addr: (RegType::Integer, 1)
            }
        );
        let effect = rf
            .write(addr(1), WriteValue::Full(RegData::Integer(7)), Producer::Fpu)
            .unwrap();
        assert_eq!(effect, WriteEffect::None);
        assert_eq!(rf.read(addr(1)).unwrap().data.as_integer(), 7);
    }

    #[test]
    fn suspending_then_writeback_reactivates() {
        let mut rf = RegisterFile::new(8, 8);
        rf.write(
            addr(2),
            WriteValue::Pending {
                producer: Producer::Memory,
                memory: None,
            },
            Producer::Allocator,
        )
        .unwrap();
        rf.write(addr(2), WriteValue::Waiting { tid: 5 }, Producer::Execute)
            .unwrap();
        let effect = rf
            .write(addr(2), WriteValue::Full(RegData::Integer(99)), Producer::Memory)
            .unwrap();
        assert_eq!(effect, WriteEffect::Reactivate { tid: 5 });
    }

    #[test]
    fn race_full_before_suspend_passes_through() {
        let mut rf = RegisterFile::new(8, 8);
        rf.write(
            addr(3),
            WriteValue::Pending {
                producer: Producer::Memory,
                memory: None,
            },
            Producer::Allocator,
        )
        .unwrap();
        rf.write(addr(3), WriteValue::Full(RegData::Integer(1)), Producer::Memory)
            .unwrap();
        // Reader's suspend-write arrives after data already landed.
        let effect = rf.write(addr(3), WriteValue::Waiting { tid: 9 }, Producer::Execute).unwrap();
        assert_eq!(effect, WriteEffect::Reactivate { tid: 9 });
        assert!(rf.read(addr(3)).unwrap().presence.is_full());
    }

    #[test]
    fn double_wait_is_protocol_violation() {
        let mut rf = RegisterFile::new(8, 8);
        rf.write(
            addr(4),
            WriteValue::Pending {
                producer: Producer::Memory,
                memory: None,
            },
            Producer::Allocator,
        )
        .unwrap();
        rf.write(addr(4), WriteValue::Waiting { tid: 1 }, Producer::Execute)
            .unwrap();
        let err = rf
            .write(addr(4), WriteValue::Waiting { tid: 2 }, Producer::Execute)
            .unwrap_err();
        assert_eq!(
            err,
            ProtocolViolation::AlreadyWaiting {
                addr: (RegType::Integer, 4)
            }
        );
    }

    #[test]
    fn writing_empty_is_protocol_violation() {
        let mut rf = RegisterFile::new(8, 8);
        let err = rf.write(addr(5), WriteValue::Waiting { tid: 1 }, Producer::Execute).unwrap_err();
        assert_eq!(
            err,
            ProtocolViolation::WriteToEmpty {
                addr: (RegType::Integer, 5)
            }
        );
    }

    #[test]
    fn clear_bulk_initializes_block() {
        let mut rf = RegisterFile::new(16, 0);
        rf.clear(
            RegType::Integer,
            4,
            3,
            WriteValue::Pending {
                producer: Producer::Writeback,
                memory: None,
            },
        );
        for i in 4..7 {
            match rf.read(addr(i)).unwrap().presence {
                Presence::Pending { producer, .. } => assert_eq!(producer, Producer::Writeback),
                other => panic!("expected Pending, got {other:?}"),
            }
        }
        assert!(matches!(rf.read(addr(3)).unwrap().presence, Presence::Empty));
        assert!(matches!(rf.read(addr(7)).unwrap().presence, Presence::Empty));
    }
}
