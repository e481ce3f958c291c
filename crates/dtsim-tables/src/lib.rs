//! Family Table and Thread Table.
//!
//! Both tables are fixed-size index-addressed arenas; "pointers" between
//! records are plain indices with [`dtsim_core::NIL`] standing in for
//! null. This sidesteps the ownership cycles a family owning its threads
//! which reference their family would otherwise create.

mod family;
mod thread;

pub use family::{FamilyDependencies, FamilyDescriptor, FamilyState, FamilyTable, ParentLocation, RegBlockInfo};
pub use thread::{ThreadDependencies, ThreadDescriptor, ThreadState, ThreadTable};

use dtsim_core::NIL;

/// Index into the Family Table. `NIL` means "no family".
pub type Fid = u32;
/// Index into the Thread Table. `NIL` means "no thread".
pub type Tid = u32;
/// Ring-wide global family id. `NIL` means "this family is local-only"
/// (a single-tile system forces `physBlockSize == virtBlockSize == 1` and
/// leaves gfid invalid).
pub type Gfid = u32;

#[must_use]
pub const fn is_nil(id: u32) -> bool {
    id == NIL
}
