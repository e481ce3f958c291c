//! RA Unit: allocates contiguous runs of fixed-size register blocks to
//! families.

use dtsim_regfile::{RegType, RegisterFile};

/// One type's block free-list, represented as an owner-per-block array
/// rather than a pointer-linked structure.
struct BlockBank {
    block_size: u32,
    /// `owners[i] == Some(fid)` means block `i` is held by family `fid`.
    owners: Vec<Option<u32>>,
}

impl BlockBank {
    fn new(total_registers: u32, block_size: u32) -> Self {
        assert!(block_size.is_power_of_two(), "RA Unit block size must be a power of two");
        let num_blocks = total_registers / block_size;
        Self {
            block_size,
            owners: vec![None; num_blocks as usize],
        }
    }

    fn blocks_needed(&self, size: u32) -> u32 {
        if size == 0 {
            0
        } else {
            size.div_ceil(self.block_size)
        }
    }

    /// First-fit search for `count` contiguous free blocks.
    fn find_run(&self, count: u32) -> Option<u32> {
        if count == 0 {
            return Some(0);
        }
        let count = count as usize;
        let mut run_start = None;
        let mut run_len = 0usize;
        for (i, owner) in self.owners.iter().enumerate() {
            if owner.is_none() {
                if run_len == 0 {
                    run_start = Some(i);
                }
                run_len += 1;
                if run_len == count {
                    return run_start.map(|s| s as u32);
                }
            } else {
                run_len = 0;
                run_start = None;
            }
        }
        None
    }

    fn commit(&mut self, block_start: u32, count: u32, fid: u32) {
        for b in block_start..block_start + count {
            self.owners[b as usize] = Some(fid);
        }
    }

    fn release(&mut self, base_index: u32, size: u32) {
        if size == 0 {
            return;
        }
        let block_start = base_index / self.block_size;
        let count = self.blocks_needed(size);
        for b in block_start..block_start + count {
            self.owners[b as usize] = None;
        }
    }
}

/// A register block allocation request or result, one entry per [`RegType`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PerType<T> {
    pub integer: T,
    pub float: T,
}

impl<T> PerType<T> {
    #[must_use]
    pub const fn get(&self, reg_type: RegType) -> &T {
        match reg_type {
            RegType::Integer => &self.integer,
            RegType::Float => &self.float,
        }
    }
}

/// Allocates contiguous register-index runs from fixed power-of-two blocks.
pub struct RaUnit {
    integer: BlockBank,
    float: BlockBank,
}

impl RaUnit {
    #[must_use]
    pub fn new(num_integers: u32, integer_block_size: u32, num_floats: u32, float_block_size: u32) -> Self {
        Self {
            integer: BlockBank::new(num_integers, integer_block_size),
            float: BlockBank::new(num_floats, float_block_size),
        }
    }

    fn bank(&self, reg_type: RegType) -> &BlockBank {
        match reg_type {
            RegType::Integer => &self.integer,
            RegType::Float => &self.float,
        }
    }

    /// Attempt to allocate `sizes` registers of each type to family `fid`.
    /// Succeeds for all types or none: this is computed atomically, with no
    /// partial commit on failure.
    ///
    /// A requested size of 0 for a type consumes no blocks of that type
    /// and its returned base index is 0.
    pub fn alloc(&mut self, sizes: PerType<u32>, fid: u32) -> Option<PerType<u32>> {
        let integer_blocks = self.integer.blocks_needed(sizes.integer);
        let float_blocks = self.float.blocks_needed(sizes.float);

        let integer_start = self.integer.find_run(integer_blocks)?;
        let float_start = self.float.find_run(float_blocks)?;

        if integer_blocks > 0 {
            self.integer.commit(integer_start, integer_blocks, fid);
        }
        if float_blocks > 0 {
            self.float.commit(float_start, float_blocks, fid);
        }

        Some(PerType {
            integer: integer_start * self.integer.block_size,
            float: float_start * self.float.block_size,
        })
    }

    /// Release a previously allocated block of each type.
    pub fn free(&mut self, bases: PerType<u32>, sizes: PerType<u32>) {
        self.integer.release(bases.integer, sizes.integer);
        self.float.release(bases.float, sizes.float);
    }

    #[must_use]
    pub fn capacity(&self, reg_type: RegType) -> u32 {
        self.bank(reg_type).owners.len() as u32 * self.bank(reg_type).block_size
    }

    #[must_use]
    pub fn free_registers(&self, reg_type: RegType) -> u32 {
        let bank = self.bank(reg_type);
        bank.owners.iter().filter(|o| o.is_none()).count() as u32 * bank.block_size
    }

    /// Convenience used by the Allocator to validate a register file sized
    /// consistently with this RA Unit.
    pub fn validate_against(&self, regfile: &RegisterFile) {
        debug_assert_eq!(self.capacity(RegType::Integer), regfile.size(RegType::Integer));
        debug_assert_eq!(self.capacity(RegType::Float), regfile.size(RegType::Float));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn alloc_and_free_roundtrip() {
        let mut ra = RaUnit::new(64, 8, 32, 8);
        let bases = ra
            .alloc(
                PerType {
                    integer: 16,
                    float: 8,
                },
                1,
            )
            .unwrap();
        assert_eq!(bases.integer, 0);
        assert_eq!(bases.float, 0);
        assert_eq!(ra.free_registers(RegType::Integer), 48);

        ra.free(
            bases,
            PerType {
                integer: 16,
                float: 8,
            },
        );
        assert_eq!(ra.free_registers(RegType::Integer), 64);
    }

    #[test]
    fn zero_size_consumes_no_blocks() {
        let mut ra = RaUnit::new(32, 8, 32, 8);
        let bases = ra
            .alloc(
                PerType {
                    integer: 8,
                    float: 0,
                },
                1,
            )
            .unwrap();
        assert_eq!(ra.free_registers(RegType::Float), 32);
        assert_eq!(bases.float, 0);
    }

    #[test]
    fn all_or_nothing_on_partial_failure() {
        let mut ra = RaUnit::new(16, 8, 8, 8);
        // Exhaust floats.
        ra.alloc(
            PerType {
                integer: 0,
                float: 8,
            },
            1,
        )
        .unwrap();
        // This needs 8 ints (fits) and 8 floats (doesn't) - must fail
        // entirely, leaving integer blocks untouched.
        let result = ra.alloc(
            PerType {
                integer: 8,
                float: 8,
            },
            2,
        );
        assert!(result.is_none());
        assert_eq!(ra.free_registers(RegType::Integer), 16);
    }

    #[test]
    fn first_fit_finds_gap() {
        let mut ra = RaUnit::new(32, 8, 0, 8);
        let a = ra
            .alloc(
                PerType {
                    integer: 8,
                    float: 0,
                },
                1,
            )
            .unwrap();
        let b = ra
            .alloc(
                PerType {
                    integer: 8,
                    float: 0,
                },
                2,
            )
            .unwrap();
        ra.free(
            a,
            PerType {
                integer: 8,
                float: 0,
            },
        );
        let c = ra
            .alloc(
                PerType {
                    integer: 8,
                    float: 0,
                },
                3,
            )
            .unwrap();
        assert_eq!(c.integer, a.integer);
        assert_ne!(b.integer, c.integer);
    }
}
