//! On-chip ring network: token, create broadcast, shared-register and
//! notification traffic between tiles.
//!
//! "Each channel is independently FIFO on the ring. Cross-channel
//! ordering is not guaranteed — protocol correctness relies on the
//! family-id and register-address tagging of every message." Each
//! channel here is therefore a separate [`RingChannel`], advanced
//! together by [`Network::step`] but otherwise fully independent.

mod messages;
mod ring;
mod token;

pub use messages::{CreateMessage, GlobalValue, Notification, Reservation, SharedRequest, SharedResponse};
pub use ring::RingChannel;
pub use token::TokenRing;

/// The six conceptual channels plus the token, bundled into one network.
pub struct Network {
    pub num_tiles: u32,
    pub token: TokenRing,
    pub create: RingChannel<CreateMessage>,
    pub global: RingChannel<GlobalValue>,
    pub shared_request: RingChannel<SharedRequest>,
    pub shared_response: RingChannel<SharedResponse>,
    pub reservation: RingChannel<Reservation>,
    pub notifications: RingChannel<Notification>,
}

impl Network {
    #[must_use]
    pub fn new(num_tiles: u32) -> Self {
        Self {
            num_tiles: num_tiles.max(1),
            token: TokenRing::new(num_tiles),
            create: RingChannel::new(num_tiles),
            global: RingChannel::new(num_tiles),
            shared_request: RingChannel::new(num_tiles),
            shared_response: RingChannel::new(num_tiles),
            reservation: RingChannel::new(num_tiles),
            notifications: RingChannel::new(num_tiles),
        }
    }

    /// Advance every channel and the token by one ring hop. Call once per
    /// cycle after all tiles have had their commit sub-phase to
    /// absorb/inject this cycle's traffic.
    pub fn step(&mut self) {
        self.token.step();
        self.create.step();
        self.global.step();
        self.shared_request.step();
        self.shared_response.step();
        self.reservation.step();
        self.notifications.step();
    }

    /// A single-tile ring never needs a broadcast to leave the tile: a
    /// local create is self-contained, its GFID forced INVALID.
    #[must_use]
    pub fn is_single_tile(&self) -> bool {
        self.num_tiles == 1
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn create_broadcast_reaches_every_tile_and_returns_to_origin() {
        let mut net = Network::new(3);
        let msg = CreateMessage {
            gfid: 5,
            local_fid: 0,
            pc: 0,
            start: 0,
            step: 1,
            last_thread: 3,
            virt_block_size: 2,
            program_id: 0,
        };
        net.token.set_want(0, true);
        net.token.lock(0);
        assert!(net.create.try_inject(0, msg));

        let mut visited = vec![0u32];
        for _ in 0..3 {
            net.step();
            if let Some(seen) = net.create.origin_at(1).or_else(|| net.create.origin_at(2)) {
                let _ = seen;
            }
        }
        // After 3 hops on a 3-tile ring the broadcast has returned to and
        // been dropped at tile 0.
        assert_eq!(net.create.peek(0), None);
        visited.push(0);

        net.token.unlock(0);
    }

    #[test]
    fn shared_register_request_and_response_round_trip() {
        let mut net = Network::new(3);
        assert!(net.shared_request.try_inject(
            2,
            SharedRequest {
                gfid: 1,
                register: 4,
                parent: false,
            }
        ));
        net.step();
        net.step();
        let req = net.shared_request.absorb(1).expect("request reaches producer tile");
        assert_eq!(req.register, 4);

        assert!(net.shared_response.try_inject(
            1,
            SharedResponse {
                gfid: 1,
                register: 4,
                bits: 0xDEAD_BEEF,
                parent: false,
            }
        ));
        net.step();
        let resp = net.shared_response.peek(2).copied();
        assert_eq!(resp.map(|r| r.bits), Some(0xDEAD_BEEF));
    }
}
