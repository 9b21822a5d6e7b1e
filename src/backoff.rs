//! Reconnect delay computation
//!
//! Capped exponential backoff with multiplicative jitter. The exponential
//! term saturates at the configured ceiling before jitter is applied, so
//! the result is bounded for arbitrarily large attempt counts.

use std::time::Duration;

use rand::Rng;

/// Default base reconnection interval (servers may override via `retry:`)
pub const DEFAULT_INITIAL_RETRY: Duration = Duration::from_millis(1_000);

/// Default floor applied to server-supplied `retry:` values
pub const DEFAULT_MIN_RETRY: Duration = Duration::from_millis(100);

/// Default backoff ceiling
pub const DEFAULT_MAX_RETRY: Duration = Duration::from_millis(30_000);

/// Computes reconnect delays. Stateless apart from the ceiling; the attempt
/// counter is owned by the connection loop, which resets it to zero on every
/// successful transition to the open state.
#[derive(Debug, Clone)]
pub struct BackoffPolicy {
    max_delay: Duration,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_RETRY)
    }
}

impl BackoffPolicy {
    pub fn new(max_delay: Duration) -> Self {
        Self { max_delay }
    }

    /// Compute the delay before reconnect attempt `attempt`, starting from
    /// the current base reconnection interval.
    ///
    /// The exponential `base * 2^attempt` is computed in saturating integer
    /// arithmetic and clamped to the ceiling before any further use. Jitter
    /// then draws uniformly from `[delay / 2, delay]`, so the result never
    /// drops below half the capped exponential and never exceeds it.
    pub fn delay(&self, attempt: u32, base: Duration) -> Duration {
        let base_ms = (base.as_millis() as u64).max(1);
        let max_ms = (self.max_delay.as_millis() as u64).max(1);

        let factor = 1u64 << attempt.min(63);
        let capped = base_ms.saturating_mul(factor).min(max_ms);

        let jittered = rand::thread_rng().gen_range(capped / 2..=capped);
        Duration::from_millis(jittered)
    }
}
