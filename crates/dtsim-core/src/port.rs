//! Port arbitration framework.
//!
//! Every cycle is split into a read phase and a write phase; each phase is
//! split into `acquire`, `check`, and `commit` sub-phases. In `acquire`,
//! components place votes into the ports they want this cycle without any
//! side effects. Between `acquire` and `check`, [`ArbitratedPort::arbitrate`]
//! picks one winner per port using a static integer priority (lower wins).
//! In `check`, components re-run and learn whether they won. In `commit`,
//! winners perform their effects.
//!
//! Dedicated ports ([`DedicatedPort`]) have exactly one privileged caller and
//! skip arbitration, but still participate in all three sub-phases so the
//! same calling convention works uniformly.

/// Which sub-phase of the current read/write phase is executing.
///
/// User code wraps mutations in a pattern equivalent to the simulator's
/// `COMMIT { ... }` guard: `if subphase.is_commit() { ... }`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubPhase {
    /// Record a vote; no side effects are permitted.
    Acquire,
    /// Re-run; ports now answer "did you win?" truthfully.
    Check,
    /// Winners perform their effects.
    Commit,
}

impl SubPhase {
    #[must_use]
    pub const fn is_acquire(self) -> bool {
        matches!(self, Self::Acquire)
    }

    #[must_use]
    pub const fn is_commit(self) -> bool {
        matches!(self, Self::Commit)
    }
}

/// Static integer priority for an arbitrated port. Lower wins.
pub type Priority = u8;

/// A port contended by several components, arbitrated once per phase by
/// static priority.
///
/// Each potential requester is expected to call [`Self::request`] at most
/// once per cycle with its own fixed priority constant; ties cannot occur
/// because priorities are unique per requester class.
#[derive(Debug, Default)]
pub struct ArbitratedPort {
    label: &'static str,
    votes: Vec<Priority>,
    winner: Option<Priority>,
}

impl ArbitratedPort {
    #[must_use]
    pub const fn new(label: &'static str) -> Self {
        Self {
            label,
            votes: Vec::new(),
            winner: None,
        }
    }

    #[must_use]
    pub const fn label(&self) -> &'static str {
        self.label
    }

    /// Cast a vote for this port during the `acquire` sub-phase.
    pub fn request(&mut self, priority: Priority) {
        self.votes.push(priority);
    }

    /// Resolve the winner. Called once between `acquire` and `check`.
    pub fn arbitrate(&mut self) {
        self.winner = self.votes.iter().copied().min();
    }

    /// True if `priority` is this cycle's winner.
    #[must_use]
    pub fn won(&self, priority: Priority) -> bool {
        self.winner == Some(priority)
    }

    #[must_use]
    pub fn contended(&self) -> bool {
        self.votes.len() > 1
    }

    /// Clear votes and the winner ahead of the next sub-phase.
    pub fn reset(&mut self) {
        self.votes.clear();
        self.winner = None;
    }
}

/// A port with exactly one privileged caller; always wins, never arbitrates.
#[derive(Debug, Default)]
pub struct DedicatedPort {
    label: &'static str,
    requested: bool,
}

impl DedicatedPort {
    #[must_use]
    pub const fn new(label: &'static str) -> Self {
        Self {
            label,
            requested: false,
        }
    }

    #[must_use]
    pub const fn label(&self) -> &'static str {
        self.label
    }

    pub fn request(&mut self) {
        self.requested = true;
    }

    #[must_use]
    pub const fn won(&self) -> bool {
        self.requested
    }

    pub fn reset(&mut self) {
        self.requested = false;
    }
}

#[cfg(test)]
mod tests {
    use super::{ArbitratedPort, DedicatedPort};

    #[test]
    fn lower_priority_wins() {
        let mut port = ArbitratedPort::new("test");
        port.request(3);
        port.request(1);
        port.request(2);
        port.arbitrate();
        assert!(port.won(1));
        assert!(!port.won(2));
        assert!(!port.won(3));
        assert!(port.contended());
    }

    #[test]
    fn no_requests_means_no_winner() {
        let mut port = ArbitratedPort::new("test");
        port.arbitrate();
        assert!(!port.won(0));
        assert!(!port.contended());
    }

    #[test]
    fn reset_clears_state() {
        let mut port = ArbitratedPort::new("test");
        port.request(0);
        port.arbitrate();
        assert!(port.won(0));
        port.reset();
        port.arbitrate();
        assert!(!port.won(0));
    }

    #[test]
    fn dedicated_port_always_wins_once_requested() {
        let mut port = DedicatedPort::new("dedicated");
        assert!(!port.won());
        port.request();
        assert!(port.won());
        port.reset();
        assert!(!port.won());
    }
}
