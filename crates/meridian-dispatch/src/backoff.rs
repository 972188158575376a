//! Exponential backoff with a cap and jitter.

use std::time::Duration;

use meridian_core::jitter::Jitter;

/// Retry delay policy: `base * 2^(attempt - 1)` capped at `max`, plus a
/// random jitter in `[0, jitter_ms]`.
#[derive(Debug, Clone)]
pub struct BackoffPolicy {
    /// Delay before the first retry.
    pub base: Duration,
    /// Upper bound on the exponential component.
    pub max: Duration,
    /// Maximum jitter added on top of the exponential component.
    pub jitter_ms: u64,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            base: Duration::from_secs(1),
            max: Duration::from_secs(60),
            jitter_ms: 250,
        }
    }
}

impl BackoffPolicy {
    /// Delay before retrying after `attempt` failed attempts (1-based).
    #[must_use]
    pub fn delay_for_attempt(&self, attempt: u32, jitter: &dyn Jitter) -> Duration {
        let base_ms = u64::try_from(self.base.as_millis()).unwrap_or(u64::MAX).max(1);
        let max_ms = u64::try_from(self.max.as_millis()).unwrap_or(u64::MAX).max(base_ms);
        let pow = 2u64.saturating_pow(attempt.saturating_sub(1));
        let exp_ms = base_ms.saturating_mul(pow).min(max_ms);
        Duration::from_millis(exp_ms.saturating_add(jitter.jitter_ms(self.jitter_ms)))
    }
}
