//! Backoff between generation attempts.

use crate::config::{BackoffStrategy, RetryPolicy};
use rand::Rng;
use std::time::Duration;

impl RetryPolicy {
    /// Creates the default policy.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the maximum attempts.
    #[must_use]
    pub fn with_max_attempts(mut self, attempts: usize) -> Self {
        self.max_attempts = attempts;
        self
    }

    /// Sets the base delay.
    #[must_use]
    pub fn with_base_delay_ms(mut self, delay: u64) -> Self {
        self.base_delay_ms = delay;
        self
    }

    /// Sets the maximum delay.
    #[must_use]
    pub fn with_max_delay_ms(mut self, delay: u64) -> Self {
        self.max_delay_ms = delay;
        self
    }

    /// Sets the backoff strategy.
    #[must_use]
    pub fn with_backoff(mut self, strategy: BackoffStrategy) -> Self {
        self.backoff = strategy;
        self
    }

    /// Enables or disables jitter.
    #[must_use]
    pub fn with_jitter(mut self, jitter: bool) -> Self {
        self.jitter = jitter;
        self
    }

    /// Attempts actually made; zero is treated as one.
    #[must_use]
    pub fn attempt_limit(&self) -> usize {
        self.max_attempts.max(1)
    }

    /// Delay before retry number `retry` (0 for the first retry).
    #[must_use]
    pub fn delay_for(&self, retry: usize) -> Duration {
        let base = self.base_delay_ms;
        let max = self.max_delay_ms;
        let step = u32::try_from(retry).unwrap_or(u32::MAX);

        let delay = match self.backoff {
            BackoffStrategy::Exponential => {
                base.saturating_mul(2u64.saturating_pow(step)).min(max)
            }
            BackoffStrategy::Linear => base.saturating_mul(u64::from(step) + 1).min(max),
            BackoffStrategy::Constant => base.min(max),
        };

        let jittered = if self.jitter && delay > 1 {
            // Equal jitter: half fixed, half random.
            let half = delay / 2;
            half + rand::thread_rng().gen_range(0..=delay - half)
        } else {
            delay
        };
        Duration::from_millis(jittered)
    }
}
