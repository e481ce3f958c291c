//! Instruction cache: per-line thread waiter queues, drained by
//! `ActivateThread` on a fill.

use std::collections::VecDeque;

use dtsim_core::NIL;

use crate::{CacheGeometry, LineState};

struct Line {
    tag: u32,
    state: LineState,
    last_access: u64,
    waiters: VecDeque<u32>,
    family_create_waiting: bool,
}

impl Line {
    const fn empty() -> Self {
        Self {
            tag: NIL,
            state: LineState::Empty,
            last_access: 0,
            waiters: VecDeque::new(),
            family_create_waiting: false,
        }
    }
}

/// Outcome of an I-cache fetch request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchOutcome {
    /// `line` already holds valid data for this address.
    Hit { line: u32 },
    /// `line` is now `Loading`; the caller should suspend/queue the
    /// requester until [`ICache::complete_fill`] is called.
    Miss { line: u32 },
}

/// Set-associative instruction cache.
pub struct ICache {
    geometry: CacheGeometry,
    lines: Vec<Line>,
}

impl ICache {
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

    /// Request the line containing `address`. Allocates (evicting the LRU
    /// way if necessary) on miss.
    pub fn request(&mut self, address: u32, now: u64) -> FetchOutcome {
        let set = self.geometry.set_index(address);
        let tag = self.geometry.tag(address);

        for way in self.ways(set) {
            let line = &mut self.lines[way];
            if line.tag == tag && matches!(line.state, LineState::Valid | LineState::Loading | LineState::Processing) {
                line.last_access = now;
                return if matches!(line.state, LineState::Valid) {
                    FetchOutcome::Hit { line: way as u32 }
                } else {
                    FetchOutcome::Miss { line: way as u32 }
                };
            }
        }

        // Miss: evict the LRU way in this set.
        let victim = self
            .ways(set)
            .min_by_key(|&w| self.lines[w].last_access)
            .expect("associativity is always > 0");
        let line = &mut self.lines[victim];
        line.tag = tag;
        line.state = LineState::Loading;
        line.last_access = now;
        line.waiters.clear();
        line.family_create_waiting = false;
        FetchOutcome::Miss { line: victim as u32 }
    }

    /// Enqueue a thread that must wait for `line` to finish loading.
    pub fn enqueue_waiter(&mut self, line: u32, tid: u32) {
        self.lines[line as usize].waiters.push_back(tid);
    }

    /// Mark that a family create is waiting on this line's instruction
    /// word (the `LOADING_LINE` state).
    pub fn set_create_waiting(&mut self, line: u32, waiting: bool) {
        self.lines[line as usize].family_create_waiting = waiting;
    }

    #[must_use]
    pub fn is_create_waiting(&self, line: u32) -> bool {
        self.lines[line as usize].family_create_waiting
    }

    /// The fill completed: transition the line to `Valid` and drain its
    /// waiter queue for the caller to reactivate.
    #[must_use]
    pub fn complete_fill(&mut self, line: u32) -> Vec<u32> {
        let l = &mut self.lines[line as usize];
        l.state = LineState::Valid;
        l.waiters.drain(..).collect()
    }

    #[must_use]
    pub fn state(&self, line: u32) -> LineState {
        self.lines[line as usize].state
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn miss_then_hit() {
        let geo = CacheGeometry::new(2, 4, 16).unwrap();
        let mut cache = ICache::new(geo);
        let a = cache.request(0x100, 0);
        assert!(matches!(a, FetchOutcome::Miss { .. }));
        let FetchOutcome::Miss { line } = a else { unreachable!() };
        cache.enqueue_waiter(line, 7);
        let woken = cache.complete_fill(line);
        assert_eq!(woken, vec![7]);
        let b = cache.request(0x100, 1);
        assert!(matches!(b, FetchOutcome::Hit { .. }));
    }
}
