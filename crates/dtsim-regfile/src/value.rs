//! Presence states and values carried by a register cell.

use dtsim_core::NIL;

/// The component allowed to complete a `Pending` write.
///
/// Mirrors the static write-port priority order: FPU, D-cache completion,
/// Network, Allocator (highest to lowest), plus the pipeline stages that
/// can directly name themselves as a future producer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Producer {
    Execute,
    Memory,
    Writeback,
    Fpu,
    Network,
    Allocator,
}

/// Metadata for a `Pending` cell that is waiting on a D-cache line fill
/// rather than a register producer. Forms a per-cache-line intrusive waiter
/// chain via `next`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MemoryWait {
    /// Family id of the reading thread, used to route the completed value.
    pub family: u32,
    /// Thread suspended on the load that planted this cell. The fill
    /// reschedules this thread directly; it does not rely on the write
    /// reaching a `Waiting` cell, since the issuing thread suspends onto
    /// its own `Pending` destination rather than reading it.
    pub tid: u32,
    /// Byte offset of the requested sub-word within the cache line.
    pub offset: u16,
    /// Sub-word size in bytes.
    pub size: u8,
    /// Index of the next register waiting on the same cache line, or `NIL`.
    pub next: u32,
}

impl MemoryWait {
    #[must_use]
    pub const fn tail() -> Self {
        Self {
            family: NIL,
            tid: NIL,
            offset: 0,
            size: 0,
            next: NIL,
        }
    }
}

/// The raw payload of a register cell.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RegData {
    Integer(u64),
    Float(f64),
}

impl RegData {
    #[must_use]
    pub const fn as_integer(self) -> u64 {
        match self {
            Self::Integer(v) => v,
            Self::Float(v) => v.to_bits(),
        }
    }

    #[must_use]
    pub const fn as_float(self) -> f64 {
        match self {
            Self::Integer(v) => f64::from_bits(v),
            Self::Float(v) => v,
        }
    }
}

/// The presence tag on a register cell.
///
/// Transitions are `Empty -> Pending -> {Waiting ->} Full` and
/// `Pending -> Full` directly (no reader ever arrived).
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Presence {
    /// Never written; a reader that touches it suspends.
    Empty,
    /// A producer has been named and will write eventually; a reader that
    /// touches it suspends.
    Pending {
        producer: Producer,
        memory: Option<MemoryWait>,
    },
    /// One reader is already suspended; its thread id is stored here.
    /// Reading (or writing another `Waiting`) a `Waiting` cell is a
    /// protocol error: at most one thread may wait on a register.
    Waiting { tid: u32 },
    /// A value is present.
    Full,
}

impl Presence {
    #[must_use]
    pub const fn is_full(&self) -> bool {
        matches!(self, Self::Full)
    }
}

/// One register-file cell: presence tag plus payload (payload is only
/// meaningful when `presence.is_full()`).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RegCell {
    pub presence: Presence,
    pub data: RegData,
}

impl RegCell {
    #[must_use]
    pub const fn empty(reg_type: crate::RegType) -> Self {
        Self {
            presence: Presence::Empty,
            data: match reg_type {
                crate::RegType::Integer => RegData::Integer(0),
                crate::RegType::Float => RegData::Float(0.0),
            },
        }
    }
}

/// What the caller is asking [`crate::RegisterFile::write`] to store.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum WriteValue {
    /// Complete the cell with a value.
    Full(RegData),
    /// Name a future producer (optionally a memory-read waiter record).
    Pending {
        producer: Producer,
        memory: Option<MemoryWait>,
    },
    /// Suspend a reader: park `tid` on this cell.
    Waiting { tid: u32 },
}
