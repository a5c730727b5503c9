//! Retry Policy Engine: retry eligibility and backoff delays.
//!
//! Pure decision logic, no I/O.

use std::time::Duration;

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::job::ErrorCategory;

/// Backoff strategy for retries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackoffStrategy {
    /// Constant `base_delay` between retries.
    Fixed,
    /// `base_delay * 2^attempt`, plus jitter, capped at `max_delay`.
    #[default]
    Exponential,
}

/// Retry policy configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Maximum number of retries after the first attempt.
    pub max_retries: u32,
    pub base_delay: Duration,
    /// Maximum delay cap.
    pub max_delay: Duration,
    pub strategy: BackoffStrategy,
    /// Upper bound of the random jitter, as a fraction of the computed delay.
    /// Jitter is only ever added.
    pub jitter: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_millis(2000),
            max_delay: Duration::from_millis(30_000),
            strategy: BackoffStrategy::Exponential,
            jitter: 0.3,
        }
    }
}

impl RetryPolicy {
    /// Create a policy with fixed delays.
    pub fn fixed(max_retries: u32, delay: Duration) -> Self {
        Self {
            max_retries,
            base_delay: delay,
            max_delay: delay,
            strategy: BackoffStrategy::Fixed,
            jitter: 0.0,
        }
    }

    /// Create a policy with exponential backoff.
    pub fn exponential(max_retries: u32, base_delay: Duration, max_delay: Duration) -> Self {
        Self {
            max_retries,
            base_delay,
            max_delay,
            ..Default::default()
        }
    }

    pub fn with_jitter(mut self, jitter: f64) -> Self {
        self.jitter = jitter.clamp(0.0, 1.0);
        self
    }

    /// Whether a failure of `category` after `attempts_so_far` retries gets
    /// another attempt. Exhaustion wins over category.
    pub fn should_retry(&self, category: ErrorCategory, attempts_so_far: u32) -> bool {
        if attempts_so_far >= self.max_retries {
            return false;
        }
        match category {
            ErrorCategory::Transient | ErrorCategory::Unknown => true,
            ErrorCategory::Permanent => false,
        }
    }

    /// Delay before retry number `attempt` (1-based, the new retry count).
    pub fn compute_delay(&self, attempt: u32) -> Duration {
        let roll = rand::thread_rng().r#gen::<f64>();
        self.delay_with_roll(attempt, roll)
    }

    /// Deterministic core of [`compute_delay`](Self::compute_delay); `roll` is
    /// in `[0, 1)` and scales the jitter.
    pub fn delay_with_roll(&self, attempt: u32, roll: f64) -> Duration {
        let base_ms = self.base_delay.as_millis() as f64;
        let max_ms = self.max_delay.as_millis() as f64;

        let delay_ms = match self.strategy {
            BackoffStrategy::Fixed => return self.base_delay,
            BackoffStrategy::Exponential => base_ms * 2_f64.powi(attempt.min(63) as i32),
        };

        let jitter_ms = delay_ms * self.jitter * roll.clamp(0.0, 1.0);
        Duration::from_millis((delay_ms + jitter_ms).min(max_ms).max(0.0).round() as u64)
    }
}
