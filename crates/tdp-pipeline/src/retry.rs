//! Retry policy
//!
//! Exponential backoff with a hard attempt cap. Only failures that plausibly
//! resolve on their own are transient: lost connections and timed-out
//! extract/load work. Data problems and schema conflicts fail the run on the
//! first attempt; retrying them would produce the same error slower.

use std::time::Duration;

use crate::config::RetryConfig;
use crate::error::{LoadError, StageError};
use crate::state::StageKind;

#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    max_attempts: u32,
    base_delay: Duration,
    max_delay: Duration,
}

impl RetryPolicy {
    pub fn new(config: RetryConfig) -> Self {
        Self {
            max_attempts: config.max_attempts.max(1),
            base_delay: Duration::from_millis(config.backoff_base_ms),
            max_delay: Duration::from_millis(config.backoff_cap_ms),
        }
    }

    /// Attempts a stage gets, first try included.
    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Whether the given failure on attempt `attempt` (1-based) warrants
    /// another try.
    pub fn should_retry(&self, error: &StageError, attempt: u32) -> bool {
        attempt < self.max_attempts && Self::is_transient(error)
    }

    /// Delay before the attempt following `attempt`: base doubled per
    /// completed attempt, capped.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1);
        let delay = 2u32
            .checked_pow(exponent)
            .and_then(|factor| self.base_delay.checked_mul(factor))
            .unwrap_or(self.max_delay);
        delay.min(self.max_delay)
    }

    fn is_transient(error: &StageError) -> bool {
        match error {
            StageError::Load(LoadError::ConnectionLost(_)) => true,
            StageError::Load(LoadError::Timeout(_)) => true,
            // A transform deadline means the dataset itself is pathological;
            // the same input will blow the same deadline again.
            StageError::Timeout { stage } => *stage != StageKind::Transform,
            _ => false,
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(RetryConfig::default())
    }
}
