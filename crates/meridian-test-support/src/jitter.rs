//! Test jitter — a `Jitter` that always returns a fixed value.

use meridian_core::jitter::Jitter;

/// Jitter pinned to the wrapped number of milliseconds. `FixedJitter(0)`
/// makes backoff schedules exact.
#[derive(Debug, Clone, Copy)]
pub struct FixedJitter(pub u64);

impl Jitter for FixedJitter {
    fn jitter_ms(&self, _max_ms: u64) -> u64 {
        self.0
    }
}
