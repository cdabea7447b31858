//! Retry schedule shared by the cached fetchers.

use crate::config::{
    KEY_EXHAUSTION_COOLDOWN_SECS, KEY_EXHAUSTION_MAX_ROUNDS, RATE_LIMIT_INITIAL_BACKOFF_MS,
    RATE_LIMIT_MAX_WAITS, TRANSIENT_INITIAL_BACKOFF_MS, TRANSIENT_MAX_RETRIES,
};
use std::time::Duration;

/// Delays and bounds applied when a provider call fails
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Retries after network or 5xx failures
    pub transient_retries: u32,
    /// First transient delay, doubled per retry
    pub transient_backoff: Duration,
    /// Waits after an explicit rate-limit answer (fx)
    pub rate_limit_waits: u32,
    /// First rate-limit delay, doubled per wait
    pub rate_limit_backoff: Duration,
    /// Pause once every key in the set was rate limited (crypto)
    pub exhaustion_cooldown: Duration,
    /// Cooldown rounds before a crypto fetch gives up
    pub exhaustion_rounds: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            transient_retries: TRANSIENT_MAX_RETRIES,
            transient_backoff: Duration::from_millis(TRANSIENT_INITIAL_BACKOFF_MS),
            rate_limit_waits: RATE_LIMIT_MAX_WAITS,
            rate_limit_backoff: Duration::from_millis(RATE_LIMIT_INITIAL_BACKOFF_MS),
            exhaustion_cooldown: Duration::from_secs(KEY_EXHAUSTION_COOLDOWN_SECS),
            exhaustion_rounds: KEY_EXHAUSTION_MAX_ROUNDS,
        }
    }
}

impl RetryPolicy {
    /// Policy with every delay collapsed to zero, keeping the bounds.
    #[must_use]
    pub fn immediate() -> Self {
        Self {
            transient_backoff: Duration::ZERO,
            rate_limit_backoff: Duration::ZERO,
            exhaustion_cooldown: Duration::ZERO,
            ..Self::default()
        }
    }

    /// Delay before transient retry number `attempt` (1-based): 1s, 2s, 4s...
    #[must_use]
    pub fn transient_delay(&self, attempt: u32) -> Duration {
        exponential(self.transient_backoff, attempt)
    }

    /// Delay before rate-limit wait number `attempt` (1-based): 2s, 4s, 8s...
    #[must_use]
    pub fn rate_limit_delay(&self, attempt: u32) -> Duration {
        exponential(self.rate_limit_backoff, attempt)
    }
}

fn exponential(base: Duration, attempt: u32) -> Duration {
    let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
    base.saturating_mul(factor)
}
