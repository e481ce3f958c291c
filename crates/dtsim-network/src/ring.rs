//! Generic single-lane ring channel.
//!
//! Each channel is "a single-entry or small register shared between write
//! locally and forward onwards". We model that as one slot per
//! tile: a message "at" tile `i` is visible to tile `i`'s component this
//! cycle, and moves to tile `i+1` on [`RingChannel::step`] unless the
//! component at `i` absorbs it first. A tile can only inject a new message
//! into its own slot while that slot is empty — the "at most one
//! outstanding message per tile per cycle" rule, applied uniformly to
//! every channel built on this type.

#[derive(Debug, Clone)]
struct Envelope<T> {
    origin: u32,
    hops: u32,
    payload: T,
}

/// A FIFO ring channel: at most one in-flight message per tile position,
/// moving one hop per [`step`](Self::step) call.
pub struct RingChannel<T> {
    num_tiles: u32,
    slots: Vec<Option<Envelope<T>>>,
}

impl<T> RingChannel<T> {
    #[must_use]
    pub fn new(num_tiles: u32) -> Self {
        let n = num_tiles.max(1) as usize;
        Self {
            num_tiles: num_tiles.max(1),
            slots: (0..n).map(|_| None).collect(),
        }
    }

    /// Place `payload` into `tile`'s outbound slot. Fails if the slot is
    /// already occupied (the one-outstanding-message-per-tile rule).
    pub fn try_inject(&mut self, tile: u32, payload: T) -> bool {
        let slot = &mut self.slots[tile as usize];
        if slot.is_some() {
            return false;
        }
        *slot = Some(Envelope {
            origin: tile,
            hops: 0,
            payload,
        });
        true
    }

    /// Look at whatever is currently present at `tile` without consuming
    /// it.
    pub fn peek(&self, tile: u32) -> Option<&T> {
        self.slots[tile as usize].as_ref().map(|e| &e.payload)
    }

    /// Consume the message currently at `tile`: it is delivered here and
    /// does not continue around the ring. Call during the commit
    /// sub-phase, before [`step`](Self::step).
    pub fn absorb(&mut self, tile: u32) -> Option<T> {
        self.slots[tile as usize].take().map(|e| e.payload)
    }

    /// The tile that originated whatever message currently sits at `tile`,
    /// if any — used by broadcasts to recognise the "returned to origin"
    /// case without consulting payload fields.
    #[must_use]
    pub fn origin_at(&self, tile: u32) -> Option<u32> {
        self.slots[tile as usize].as_ref().map(|e| e.origin)
    }

    /// Advance every still-present message one hop. A message that would
    /// re-enter its origin tile after visiting every other tile exactly
    /// once is dropped instead: a create broadcast visits every tile
    /// exactly once before returning to origin.
    pub fn step(&mut self) {
        let n = self.num_tiles as usize;
        let mut next: Vec<Option<Envelope<T>>> = (0..n).map(|_| None).collect();
        for i in 0..n {
            let Some(mut env) = self.slots[i].take() else {
                continue;
            };
            env.hops += 1;
            let dest = (i + 1) % n;
            if dest as u32 == env.origin && env.hops >= self.num_tiles {
                continue;
            }
            next[dest] = Some(env);
        }
        self.slots = next;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn message_visits_every_tile_then_drops_at_origin() {
        let mut ch = RingChannel::new(3);
        assert!(ch.try_inject(0, "hello"));
        // Occupied slot refuses a second injection.
        assert!(!ch.try_inject(0, "again"));

        ch.step();
        assert_eq!(ch.peek(1), Some(&"hello"));
        ch.step();
        assert_eq!(ch.peek(2), Some(&"hello"));
        ch.step();
        // Back at origin after a full rotation: dropped, not delivered.
        assert_eq!(ch.peek(0), None);
    }

    #[test]
    fn absorb_removes_message_before_it_can_be_forwarded() {
        let mut ch = RingChannel::new(2);
        ch.try_inject(0, 7u32);
        ch.step();
        assert_eq!(ch.absorb(1), Some(7));
        ch.step();
        assert_eq!(ch.peek(0), None);
    }
}
