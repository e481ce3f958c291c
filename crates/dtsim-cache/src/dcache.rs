//! Data cache: per-line register-waiter chains, woken by the Memory stage
//! on a line fill.
//!
//! Unlike the I-cache's thread waiter queue, a D-cache line's waiters are
//! registers (specifically, the `Pending` cells of threads blocked on a
//! load from this line) — the chain itself is threaded through
//! `dtsim_regfile::MemoryWait::next`, so the D-cache only needs to
//! remember the chain's head.

use dtsim_core::NIL;
use dtsim_regfile::RegAddr;

use crate::{CacheGeometry, LineState};
pub use crate::icache::FetchOutcome as DCacheRequest;

/// Re-exported for callers that need to construct waiter-chain links; the
/// actual `MemoryWait` type lives in `dtsim-regfile`.
pub type MemoryWaiter = dtsim_regfile::MemoryWait;

struct Line {
    tag: u32,
    state: LineState,
    last_access: u64,
    waiter_head: Option<RegAddr>,
}

impl Line {
    const fn empty() -> Self {
        Self {
            tag: NIL,
            state: LineState::Empty,
            last_access: 0,
            waiter_head: None,
        }
    }
}

/// Set-associative data cache.
pub struct DCache {
    geometry: CacheGeometry,
    lines: Vec<Line>,
}

impl DCache {
    #[must_use]
    pub fn new(geometry: CacheGeometry) -> Self {
        let count = geometry.num_lines() as usize;
        Self {
            geometry,
            lines: (0..count).map(|_| Line::empty()).collect(),
        }
    }

    fn ways(&self, set: u32) -> std::ops::Range<usize> {
        let start = set as usize * self.geometry.associativity as usize;
        start..start + self.geometry.associativity as usize
    }

    pub fn request(&mut self, address: u32, now: u64) -> DCacheRequest {
        let set = self.geometry.set_index(address);
        let tag = self.geometry.tag(address);

        for way in self.ways(set) {
            let line = &mut self.lines[way];
            if line.tag == tag && matches!(line.state, LineState::Valid | LineState::Loading | LineState::Processing) {
                line.last_access = now;
                return if matches!(line.state, LineState::Valid) {
                    DCacheRequest::Hit { line: way as u32 }
                } else {
                    DCacheRequest::Miss { line: way as u32 }
                };
            }
        }

        let victim = self
            .ways(set)
            .min_by_key(|&w| self.lines[w].last_access)
            .expect("associativity is always > 0");
        let line = &mut self.lines[victim];
        line.tag = tag;
        line.state = LineState::Loading;
        line.last_access = now;
        line.waiter_head = None;
        DCacheRequest::Miss { line: victim as u32 }
    }

    /// Prepend `addr` onto `line`'s waiter chain, returning the previous
    /// head so the caller can store it as `MemoryWait::next`.
    pub fn push_waiter(&mut self, line: u32, addr: RegAddr) -> Option<RegAddr> {
        self.lines[line as usize].waiter_head.replace(addr)
    }

    /// The fill completed: transition to `Valid` and hand back the waiter
    /// chain head for the caller to walk and reactivate.
    pub fn complete_fill(&mut self, line: u32) -> Option<RegAddr> {
        let l = &mut self.lines[line as usize];
        l.state = LineState::Valid;
        l.waiter_head.take()
    }

    #[must_use]
    pub fn state(&self, line: u32) -> LineState {
        self.lines[line as usize].state
    }

    /// Direct store path: a write does not need the waiter-chain machinery.
    pub fn touch(&mut self, address: u32, now: u64) -> DCacheRequest {
        self.request(address, now)
    }
}
