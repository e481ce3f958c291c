//! Set-associative I-cache and D-cache with per-line waiter queues.

mod dcache;
mod geometry;
mod icache;

pub use dcache::{DCache, DCacheRequest, MemoryWaiter};
pub use geometry::{CacheGeometry, ConfigError};
pub use icache::{FetchOutcome, ICache};

/// Shared per-way cache-line bookkeeping.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineState {
    Empty,
    Loading,
    Processing,
    Valid,
    Invalid,
}
