//! Black-box multi-banked memory backend.
//!
//! The physical memory model is out of scope here, treated as a black box
//! that accepts read/write requests and signals completion. This crate is
//! exactly that box: it has no notion of cache
//! lines, presence bits, or threads — only addresses, a configurable
//! per-bank latency, and a bounded in-flight buffer, sized from the
//! `Memory*` config knobs.

use std::collections::HashMap;
use std::fmt;

/// Configuration error surfaced at startup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    Zero(&'static str),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Zero(field) => write!(f, "{field} must be greater than zero"),
        }
    }
}

impl std::error::Error for ConfigError {}

#[derive(Debug, Clone, Copy)]
pub struct MemoryConfig {
    pub base_request_time: u64,
    pub time_per_line: u64,
    pub size_of_line: u32,
    pub buffer_size: u32,
    pub banks: u32,
    pub parallel_requests: u32,
}

impl MemoryConfig {
    pub fn validate(self) -> Result<Self, ConfigError> {
        if self.size_of_line == 0 {
            return Err(ConfigError::Zero("MemorySizeOfLine"));
        }
        if self.banks == 0 {
            return Err(ConfigError::Zero("MemoryBanks"));
        }
        if self.parallel_requests == 0 {
            return Err(ConfigError::Zero("MemoryParallelRequests"));
        }
        if self.buffer_size == 0 {
            return Err(ConfigError::Zero("MemoryBufferSize"));
        }
        Ok(self)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemOp {
    Read,
    Write,
}

/// A caller-correlated request in flight.
#[derive(Debug, Clone, Copy)]
pub struct PendingRequest {
    pub id: u64,
    pub address: u32,
    pub op: MemOp,
    pub completion_cycle: u64,
    /// Opaque tag the caller supplied at `submit` time, used to route the
    /// completion back (e.g. a D-cache line id).
    pub tag: u64,
}

/// Returned by [`Memory::submit`] when the backend has no capacity this
/// cycle; the caller's port acquire should report `Failed`/`Delayed`
/// rather than treating this as an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Busy;

/// The black-box memory backend.
pub struct Memory {
    config: MemoryConfig,
    data: HashMap<u32, u8>,
    in_flight: Vec<PendingRequest>,
    bank_in_flight: Vec<u32>,
    next_id: u64,
}

impl Memory {
    #[must_use]
    pub fn new(config: MemoryConfig) -> Self {
        let banks = config.banks.max(1) as usize;
        Self {
            config,
            data: HashMap::new(),
            in_flight: Vec::new(),
            bank_in_flight: vec![0; banks],
            next_id: 0,
        }
    }

    fn bank_of(&self, address: u32) -> usize {
        ((address / self.config.size_of_line.max(1)) % self.config.banks.max(1)) as usize
    }

    fn latency(&self) -> u64 {
        self.config.base_request_time + self.config.time_per_line
    }

    /// Submit a read/write request. Returns `Err(Busy)` if the bank has no
    /// free parallel-request slot or the in-flight buffer is full.
    pub fn submit(&mut self, address: u32, op: MemOp, tag: u64, now: u64) -> Result<u64, Busy> {
        if self.in_flight.len() as u32 >= self.config.buffer_size {
            return Err(Busy);
        }
        let bank = self.bank_of(address);
        if self.bank_in_flight[bank] >= self.config.parallel_requests {
            return Err(Busy);
        }
        self.bank_in_flight[bank] += 1;
        let id = self.next_id;
        self.next_id += 1;
        self.in_flight.push(PendingRequest {
            id,
            address,
            op,
            completion_cycle: now + self.latency(),
            tag,
        });
        Ok(id)
    }

    /// Advance time: pull out every request whose completion has arrived,
    /// applying writes to the backing store and freeing bank slots.
    pub fn tick(&mut self, now: u64) -> Vec<PendingRequest> {
        let mut completed = Vec::new();
        let mut remaining = Vec::with_capacity(self.in_flight.len());
        for req in self.in_flight.drain(..) {
            if req.completion_cycle <= now {
                let bank = self.bank_of(req.address);
                self.bank_in_flight[bank] = self.bank_in_flight[bank].saturating_sub(1);
                completed.push(req);
            } else {
                remaining.push(req);
            }
        }
        self.in_flight = remaining;
        completed
    }

    pub fn write_byte(&mut self, address: u32, value: u8) {
        self.data.insert(address, value);
    }

    #[must_use]
    pub fn read_byte(&self, address: u32) -> u8 {
        self.data.get(&address).copied().unwrap_or(0)
    }

    #[must_use]
    pub fn in_flight_count(&self) -> usize {
        self.in_flight.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cfg() -> MemoryConfig {
        MemoryConfig {
            base_request_time: 2,
            time_per_line: 3,
            size_of_line: 16,
            buffer_size: 4,
            banks: 2,
            parallel_requests: 1,
        }
    }

    #[test]
    fn completes_after_latency() {
        let mut mem = Memory::new(cfg());
        mem.submit(0x10, MemOp::Read, 42, 0).unwrap();
        assert!(mem.tick(4).is_empty());
        let done = mem.tick(5);
        assert_eq!(done.len(), 1);
        assert_eq!(done[0].tag, 42);
    }

    #[test]
    fn bank_parallelism_limit_applies_per_bank() {
        let mut mem = Memory::new(cfg());
        // Same bank (address 0 and 32 both hash to bank 0 with 2 banks,
        // 16-byte lines): 0/16%2=0, 32/16%2=0.
        mem.submit(0, MemOp::Read, 1, 0).unwrap();
        assert_eq!(mem.submit(32, MemOp::Read, 2, 0), Err(Busy));
        // Different bank (address 16 -> bank 1) should still go through.
        mem.submit(16, MemOp::Read, 3, 0).unwrap();
    }

    #[test]
    fn buffer_size_caps_total_in_flight() {
        let mut small = Memory::new(MemoryConfig {
            buffer_size: 1,
            banks: 4,
            parallel_requests: 4,
            ..cfg()
        });
        small.submit(0, MemOp::Read, 1, 0).unwrap();
        assert_eq!(small.submit(64, MemOp::Read, 2, 0), Err(Busy));
    }
}
