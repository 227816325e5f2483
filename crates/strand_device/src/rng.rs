//! Deterministic random number generation for the PnR cores.
//!
//! All randomness in placement and routing flows through [`DetRng`] so that
//! a fixed seed, thread count, and input reproduce byte-identical results.
//! Worker threads derive their generators from a coordinator seed combined
//! with entity attributes, never from scheduling order.

use rand::rngs::SmallRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};

/// A seedable, deterministic random number generator.
#[derive(Debug, Clone)]
pub struct DetRng {
    inner: SmallRng,
}

impl DetRng {
    /// Creates a generator from a 64-bit seed.
    pub fn from_seed(seed: u64) -> Self {
        Self {
            inner: SmallRng::seed_from_u64(seed),
        }
    }

    /// Returns the next raw 32-bit draw.
    pub fn next_u32(&mut self) -> u32 {
        self.inner.gen()
    }

    /// Returns the next raw 64-bit draw.
    pub fn next_u64(&mut self) -> u64 {
        self.inner.gen()
    }

    /// Returns a uniform draw in `0..n`. `n` must be nonzero.
    pub fn bounded(&mut self, n: u32) -> u32 {
        self.inner.gen_range(0..n)
    }

    /// Returns a uniform draw in `[0, 1)`.
    pub fn unit(&mut self) -> f64 {
        self.inner.gen::<f64>()
    }

    /// Derives an independent generator, salted so that forks for
    /// different purposes diverge.
    pub fn fork(&mut self, salt: u64) -> DetRng {
        DetRng::from_seed(self.next_u64() ^ salt)
    }

    /// Shuffles a slice in place.
    pub fn shuffle<T>(&mut self, xs: &mut [T]) {
        xs.shuffle(&mut self.inner);
    }

    /// Sorts then shuffles, so the permutation depends only on the seed
    /// and the element values, not on the incoming order.
    pub fn sorted_shuffle<T: Ord>(&mut self, xs: &mut [T]) {
        xs.sort_unstable();
        self.shuffle(xs);
    }
}
