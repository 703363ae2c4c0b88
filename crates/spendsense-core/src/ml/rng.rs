//! Deterministic random number generation for the models.
//!
//! Each model instance derives its own stream from (seed XOR stream index),
//! so adding a tree to one ensemble never perturbs another, and any fitted
//! model is fully reproducible from the config seed alone.

use rand::{RngCore, SeedableRng};
use rand_pcg::Pcg64Mcg;

/// A seeded RNG stream for one model component.
pub struct ModelRng {
    inner: Pcg64Mcg,
}

impl ModelRng {
    /// Derive a stream from the master seed and a stable stream index.
    /// The index must never change once assigned to a component.
    pub fn new(seed: u64, stream: u64) -> Self {
        let derived = seed ^ stream.wrapping_mul(0x9e37_79b9_7f4a_7c15);
        Self {
            inner: Pcg64Mcg::seed_from_u64(derived),
        }
    }

    /// Roll a float in [0.0, 1.0).
    pub fn next_f64(&mut self) -> f64 {
        let bits = self.inner.next_u64();
        (bits >> 11) as f64 * (1.0 / (1u64 << 53) as f64)
    }

    /// Roll a usize in [0, n). Panics on n == 0.
    pub fn next_below(&mut self, n: usize) -> usize {
        assert!(n > 0, "n must be > 0");
        (self.inner.next_u64() % n as u64) as usize
    }

    /// Roll a float in [lo, hi).
    pub fn next_in_range(&mut self, lo: f64, hi: f64) -> f64 {
        lo + self.next_f64() * (hi - lo)
    }
}
