//! Randomness seam for retry jitter.
//!
//! In production this draws from the thread-local generator. Tests inject
//! a fixed implementation so backoff schedules are repeatable.

use rand::Rng;

/// Abstraction over the random component of a retry delay.
pub trait Jitter: Send + Sync {
    /// Draw a jitter value in `[0, max_ms]` inclusive, in milliseconds.
    fn jitter_ms(&self, max_ms: u64) -> u64;
}

/// Production jitter backed by the thread-local RNG.
#[derive(Debug, Clone, Copy)]
pub struct ThreadRngJitter;

impl Jitter for ThreadRngJitter {
    fn jitter_ms(&self, max_ms: u64) -> u64 {
        if max_ms == 0 {
            return 0;
        }
        rand::rng().random_range(0..=max_ms)
    }
}
