//! Deterministic random number generation for the synthetic model.
//!
//! RULE: Nothing in the runner may call any platform RNG.
//! All randomness flows through ReplicationRng instances derived
//! from the single master seed given on the command line.
//!
//! Each replication gets its own stream, seeded from
//! (master_seed XOR replication_index * golden ratio). Replication `r`
//! is therefore reproducible on its own, whatever the replication count.

use rand::{RngCore, SeedableRng};
use rand_pcg::Pcg64Mcg;

pub struct ReplicationRng {
    pub replication: u64,
    inner: Pcg64Mcg,
}

impl ReplicationRng {
    pub fn new(master_seed: u64, replication: u64) -> Self {
        let derived_seed = master_seed ^ replication.wrapping_mul(0x9e37_79b9_7f4a_7c15);
        Self {
            replication,
            inner: Pcg64Mcg::seed_from_u64(derived_seed),
        }
    }

    /// Roll a float in [0.0, 1.0).
    pub fn next_f64(&mut self) -> f64 {
        let bits = self.inner.next_u64();
        (bits >> 11) as f64 * (1.0 / (1u64 << 53) as f64)
    }

    /// Exponential variate with the given rate, by inversion.
    /// A non-positive rate means "never".
    pub fn exponential(&mut self, rate: f64) -> f64 {
        if rate <= 0.0 {
            return f64::INFINITY;
        }
        let u = self.next_f64();
        -(1.0 - u).ln() / rate
    }
}
