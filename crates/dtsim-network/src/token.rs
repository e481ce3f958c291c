//! The create-broadcast token.
//!
//! The token starts at tile 0. A tile wanting it raises `wantToken`; if it
//! already holds it, that is an immediate grant. Otherwise it waits for an
//! upstream request to reach the current holder. `lockToken` prevents the
//! holder from passing the token away while it still has outstanding
//! broadcast locks.

pub struct TokenRing {
    num_tiles: u32,
    holder: u32,
    want: Vec<bool>,
    requested: Vec<bool>,
    lock: Vec<u32>,
}

impl TokenRing {
    #[must_use]
    pub fn new(num_tiles: u32) -> Self {
        let n = num_tiles.max(1) as usize;
        Self {
            num_tiles: num_tiles.max(1),
            holder: 0,
            want: vec![false; n],
            requested: vec![false; n],
            lock: vec![0; n],
        }
    }

    #[must_use]
    pub fn holder(&self) -> u32 {
        self.holder
    }

    #[must_use]
    pub fn has_token(&self, tile: u32) -> bool {
        self.holder == tile
    }

    /// Raise or clear `tile`'s want flag. Lowering `want` for the current
    /// holder is the normal way a finished broadcaster releases the token
    /// to the next requester.
    pub fn set_want(&mut self, tile: u32, want: bool) {
        self.want[tile as usize] = want;
    }

    #[must_use]
    pub fn wants(&self, tile: u32) -> bool {
        self.want[tile as usize]
    }

    /// Begin a broadcast: increments the lock counter, blocking the token
    /// from moving on even if `want` is later cleared mid-broadcast.
    pub fn lock(&mut self, tile: u32) {
        self.lock[tile as usize] += 1;
    }

    /// The broadcast that `tile` started has returned to origin.
    pub fn unlock(&mut self, tile: u32) {
        self.lock[tile as usize] = self.lock[tile as usize].saturating_sub(1);
    }

    /// Advance the token by at most one hop. Every tile's `want` is
    /// latched into its own `requested` flag and then shifted one step
    /// backward around the ring (opposite the token's forward travel),
    /// so a requester any distance from the holder eventually reaches it
    /// hop by hop. Latching is idempotent — re-seeding from `want` every
    /// cycle changes nothing once a flag is already set. The pass happens
    /// only if the holder neither wants the token itself nor holds an
    /// open lock.
    pub fn step(&mut self) {
        let n = self.num_tiles as usize;
        let mut next_requested = vec![false; n];
        for (i, slot) in next_requested.iter_mut().enumerate() {
            let src = (i + 1) % n;
            *slot = self.requested[src] || self.want[src];
        }
        self.requested = next_requested;

        let holder = self.holder as usize;
        if !self.want[holder] && self.requested[holder] && self.lock[holder] == 0 {
            self.requested[holder] = false;
            self.holder = (self.holder + 1) % self.num_tiles;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn token_starts_at_tile_zero() {
        let ring = TokenRing::new(4);
        assert_eq!(ring.holder(), 0);
        assert!(ring.has_token(0));
    }

    #[test]
    fn passes_to_requesting_neighbour_when_idle() {
        let mut ring = TokenRing::new(3);
        ring.set_want(1, true);
        ring.step();
        assert_eq!(ring.holder(), 1);
    }

    #[test]
    fn does_not_pass_while_holder_wants_it() {
        let mut ring = TokenRing::new(2);
        ring.set_want(0, true);
        ring.set_want(1, true);
        ring.step();
        assert_eq!(ring.holder(), 0);
    }

    #[test]
    fn lock_blocks_passing_even_without_local_want() {
        let mut ring = TokenRing::new(2);
        ring.lock(0);
        ring.set_want(1, true);
        ring.step();
        assert_eq!(ring.holder(), 0, "locked holder must not release the token");
        ring.unlock(0);
        ring.step();
        assert_eq!(ring.holder(), 1);
    }

    #[test]
    fn grant_under_want_false_is_idempotent_noop() {
        let mut ring = TokenRing::new(3);
        ring.step();
        assert_eq!(ring.holder(), 0);
        ring.step();
        assert_eq!(ring.holder(), 0);
    }
}
