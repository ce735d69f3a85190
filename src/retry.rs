// =============================================================================
// retry.rs - HOW LONG TO WAIT BEFORE ASKING AGAIN
// =============================================================================
//
// The backoff policy is a plain value: a strategy, a base delay, an attempt
// budget and a predicate deciding which errors are worth another try. The
// fetch client consumes it. Nothing in here sleeps.
// =============================================================================

use std::time::Duration;

use crate::fetch::FetchError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackoffStrategy {
    /// Same wait every time.
    Fixed,
    /// `attempt * base`. No jitter.
    Linear,
    /// `base * 2^(attempt - 1)`.
    Exponential,
}

#[derive(Debug, Clone, Copy)]
pub struct BackoffPolicy {
    pub strategy: BackoffStrategy,
    pub base_delay: Duration,
    /// Total attempts including the first one. Zero is treated as one.
    pub max_attempts: u32,
    /// No retry waits less than this, whatever the strategy says.
    pub min_delay: Duration,
    pub retryable: fn(&FetchError) -> bool,
}

impl BackoffPolicy {
    /// Linear policy retrying only the transient set.
    pub fn linear(base_delay: Duration, max_attempts: u32) -> Self {
        Self {
            strategy: BackoffStrategy::Linear,
            base_delay,
            max_attempts,
            min_delay: Duration::ZERO,
            retryable: FetchError::is_transient,
        }
    }

    /// A policy that never retries.
    pub fn no_retry() -> Self {
        Self {
            strategy: BackoffStrategy::Fixed,
            base_delay: Duration::ZERO,
            max_attempts: 1,
            min_delay: Duration::ZERO,
            retryable: |_| false,
        }
    }

    /// Same policy, but every retry waits at least `floor`.
    pub fn with_min_delay(self, floor: Duration) -> Self {
        Self {
            min_delay: floor,
            ..self
        }
    }

    pub fn attempts(&self) -> u32 {
        self.max_attempts.max(1)
    }

    /// Wait after the `attempt`-th failed attempt (1-based).
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let attempt = attempt.max(1);
        let delay = match self.strategy {
            BackoffStrategy::Fixed => self.base_delay,
            BackoffStrategy::Linear => self.base_delay.saturating_mul(attempt),
            BackoffStrategy::Exponential => {
                let factor = 1u32.checked_shl(attempt - 1).unwrap_or(u32::MAX);
                self.base_delay.saturating_mul(factor)
            }
        };
        delay.max(self.min_delay)
    }

    pub fn should_retry(&self, error: &FetchError) -> bool {
        (self.retryable)(error)
    }
}
