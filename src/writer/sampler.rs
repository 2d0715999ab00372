//! Random sources for the save-on-success decision.

use std::sync::Mutex;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Yields uniform values in `[0, 100)`.
pub trait Sampler: Send + Sync {
    fn sample_percent(&self) -> f64;
}

/// Draws from the thread-local RNG. This is the default.
#[derive(Debug, Default, Clone, Copy)]
pub struct ThreadRngSampler;

impl Sampler for ThreadRngSampler {
    fn sample_percent(&self) -> f64 {
        rand::rng().random_range(0.0..100.0)
    }
}

/// Reproducible sampler backed by a seeded `StdRng`.
#[derive(Debug)]
pub struct SeededSampler {
    rng: Mutex<StdRng>,
}

impl SeededSampler {
    pub fn new(seed: u64) -> Self {
        Self {
            rng: Mutex::new(StdRng::seed_from_u64(seed)),
        }
    }
}

impl Sampler for SeededSampler {
    fn sample_percent(&self) -> f64 {
        self.rng
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .random_range(0.0..100.0)
    }
}

/// Always returns the same value. Handy for pinning a decision in tests.
#[derive(Debug, Clone, Copy)]
pub struct FixedSampler(pub f64);

impl Sampler for FixedSampler {
    fn sample_percent(&self) -> f64 {
        self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_thread_rng_sampler_range() {
        let sampler = ThreadRngSampler;
        for _ in 0..1000 {
            let v = sampler.sample_percent();
            assert!((0.0..100.0).contains(&v), "sample {} out of range", v);
        }
    }

    #[test]
    fn test_seeded_sampler_is_reproducible() {
        let a = SeededSampler::new(42);
        let b = SeededSampler::new(42);
        for _ in 0..100 {
            assert_eq!(a.sample_percent(), b.sample_percent());
        }
    }

    #[test]
    fn test_fixed_sampler() {
        assert_eq!(FixedSampler(37.5).sample_percent(), 37.5);
    }
}
