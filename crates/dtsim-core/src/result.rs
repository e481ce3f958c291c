//! Per-cycle result classifications.

/// What a component did with its callback this cycle.
///
/// A cycle with no [`CycleResult::Success`] and no [`CycleResult::Failed`]
/// across every component is *idle*. A cycle with only `Failed` results is
/// *stalled*; persistent stalls across every component indicate deadlock
/// (see `dtsim-sim::System::run`'s deadlock detection).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleResult {
    /// The component did work this cycle.
    Success,
    /// The component wanted to work but lost arbitration for a resource.
    /// Persistent `Failed` results indicate possible deadlock.
    Failed,
    /// The component had nothing to do this cycle.
    Delayed,
}

impl CycleResult {
    #[must_use]
    pub const fn is_success(self) -> bool {
        matches!(self, Self::Success)
    }

    #[must_use]
    pub const fn is_failed(self) -> bool {
        matches!(self, Self::Failed)
    }
}

/// What a pipeline stage did with its latch this cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StageResult {
    /// Normal progress: the output latch should advance.
    Continue,
    /// Discard in-flight bubbles belonging to the same thread in upstream
    /// latches (a taken branch correcting mis-speculated sequential
    /// fetch).
    Flush,
    /// Freeze this stage and every stage upstream of it for this cycle;
    /// latches do not advance.
    Stall,
    /// Nothing to do this cycle; do not advance latches.
    Idle,
}
