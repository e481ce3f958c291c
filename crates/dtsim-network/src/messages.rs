//! Payloads carried by the ring channels.

/// Carried by the Create channel, broadcast around the ring once a local
/// create acquires the token and a reservation sweep has completed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CreateMessage {
    pub gfid: u32,
    pub local_fid: u32,
    pub pc: u32,
    pub start: u64,
    pub step: u64,
    pub last_thread: u64,
    pub virt_block_size: u32,
    /// Selects which instruction stream every tile's share of this family
    /// runs. Real opcode decode is out of scope, so this stands in for
    /// what a genuine instruction-memory fetch would otherwise make
    /// implicit in `pc` alone.
    pub program_id: u32,
}

/// One global register's value, streamed behind the [`CreateMessage`] on
/// the Global channel as the broadcast is forwarded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GlobalValue {
    pub gfid: u32,
    pub index: u32,
    pub bits: u64,
}

/// "Please send me shared register `register` for family `gfid`."
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SharedRequest {
    pub gfid: u32,
    pub register: u32,
    pub parent: bool,
}

/// "Here is shared register `register` for family `gfid`."
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SharedResponse {
    pub gfid: u32,
    pub register: u32,
    pub bits: u64,
    pub parent: bool,
}

/// Ring-sweep to reserve (or release) a global family slot before a
/// create broadcast begins.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Reservation {
    pub gfid: u32,
    pub origin_pid: u32,
    pub release: bool,
}

/// The three single-GFID notification kinds carried on the Notifications
/// channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Notification {
    ThreadCompletion(u32),
    ThreadCleanup(u32),
    FamilyCompletion(u32),
}
