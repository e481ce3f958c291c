//! System/Tile wiring: the ring of tiles, the run driver, and run
//! statistics.

mod statistics;
mod system;
mod tile;

pub use statistics::{MinAvgMax, Statistics};
pub use system::{DeadlockReport, RunOutcome, System, SystemError};
pub use tile::{Tile, TileError, TileStepReport};
