//! The Allocator: family/thread lifecycle state machines.
//!
//! The Allocator itself is thin — an active-thread queue, a cleanup queue,
//! and at most one in-progress create — everything it mutates (register
//! blocks, family/thread descriptors, cache lines, network channels) is
//! owned by the tile and passed in by reference each call, matching the
//! "passive structure ... mutations funnel through its component's ports"
//! rule.

mod activation;
mod cleanup;
pub mod create;
mod dependencies;
mod kill_family;
mod thread_alloc;

pub use activation::{activate_thread, kill, reschedule, suspend};
pub use cleanup::{drain_one, CleanupStep};
pub use create::{step_create, CreateContext, CreateKind, CreateRequest, CreateStep, PackedCounts, RegCountsByType};
pub use dependencies::{decrease_family, increase_family, set_allocation_done, set_prev_terminated, Cascade, FamilyCounter};
pub use kill_family::kill_family;
pub use thread_alloc::{step as step_thread_alloc, ThreadAllocStep};

use std::collections::VecDeque;

use dtsim_tables::{Fid, Tid};

/// Per-tile allocator state: the active-thread queue, the cleanup queue,
/// slots handed back for reuse, and the in-progress create (if any).
#[derive(Default)]
pub struct Allocator {
    pub active_queue: VecDeque<Tid>,
    pub cleanup_queue: VecDeque<Tid>,
    pub pending_reuse: VecDeque<Tid>,
    pub creating: Option<CreateContext>,
}

impl Allocator {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Begin a new create if none is in progress. Returns `false` if the
    /// allocator is already busy with one.
    pub fn begin_create(&mut self, fid: Fid, request: CreateRequest) -> bool {
        if self.creating.is_some() {
            return false;
        }
        self.creating = Some(CreateContext::new(fid, request));
        true
    }

    /// Pop the next active thread ready to enter Fetch, if any.
    pub fn next_active(&mut self) -> Option<Tid> {
        self.active_queue.pop_front()
    }

    /// Queue `tid` for cleanup after `Kill`.
    pub fn enqueue_cleanup(&mut self, tid: Tid) {
        self.cleanup_queue.push_back(tid);
    }
}
