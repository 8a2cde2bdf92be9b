//! Client-order-index generator.
//!
//! A circular, randomly-seeded counter modulo `N` (default 1,000,000) that
//! never yields 0. `client_order_index` is the primary correlation key for
//! an order across submit/cancel/websocket paths, so collisions after wrap
//! are left to the venue to reject rather than pre-checked here — ported
//! from `ClientOrderIdGenerator` in the original Python engine.

use parking_lot::Mutex;
use rand::Rng;

/// Generates `u32` client order indices, modulo a configurable `N`, never 0.
pub struct ClientOrderIdGenerator {
    modulo: u32,
    counter: Mutex<u64>,
}

impl ClientOrderIdGenerator {
    /// New generator with the default modulo of 1,000,000, seeded randomly.
    pub fn new() -> Self {
        Self::with_modulo(1_000_000)
    }

    /// New generator with an explicit modulo and random seed.
    pub fn with_modulo(modulo: u32) -> Self {
        assert!(modulo > 0, "modulo must be positive");
        let seed = rand::thread_rng().gen_range(0..modulo as u64);
        Self {
            modulo,
            counter: Mutex::new(seed),
        }
    }

    /// New generator seeded at a specific starting value (tests, replay).
    pub fn with_seed(modulo: u32, seed: u64) -> Self {
        assert!(modulo > 0, "modulo must be positive");
        Self {
            modulo,
            counter: Mutex::new(seed),
        }
    }

    /// Returns the next client order index. Never returns 0: the one value
    /// that would wrap to zero is remapped to 1 rather than skipped, to
    /// keep the sequence monotonic modulo `N`.
    pub fn next(&self) -> u32 {
        let mut counter = self.counter.lock();
        let value = (*counter % self.modulo as u64) as u32;
        *counter = counter.wrapping_add(1);
        if value == 0 {
            1
        } else {
            value
        }
    }
}

impl Default for ClientOrderIdGenerator {
    fn default() -> Self {
        Self::new()
    }
}
