//! Outcome sources: what happens when a job is actually ingested.
//!
//! No real connector exists yet. [`RandomOutcomeSource`] simulates latency
//! and failures; [`ScriptedOutcomeSource`] replays a fixed sequence so that
//! retry counts and state transitions are reproducible.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use rand::Rng;

use crate::job::{ErrorCategory, IngestionJob};

pub const TRANSIENT_ERRORS: &[&str] = &[
    "Connection timeout",
    "Service temporarily unavailable",
    "Rate limit exceeded",
    "Network error",
];

pub const PERMANENT_ERRORS: &[&str] = &[
    "Invalid file format",
    "Access denied",
    "Resource not found",
    "Unsupported content type",
];

pub const UNKNOWN_ERRORS: &[&str] = &["Unexpected error during processing"];

/// Error messages defined for `category`.
pub fn error_messages(category: ErrorCategory) -> &'static [&'static str] {
    match category {
        ErrorCategory::Transient => TRANSIENT_ERRORS,
        ErrorCategory::Permanent => PERMANENT_ERRORS,
        ErrorCategory::Unknown => UNKNOWN_ERRORS,
    }
}

/// Result of one ingestion attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Success,
    Failure {
        category: ErrorCategory,
        message: String,
    },
}

impl Outcome {
    /// Failure of `category` with its first defined message.
    pub fn failure(category: ErrorCategory) -> Self {
        Self::Failure {
            category,
            message: error_messages(category)[0].to_string(),
        }
    }

    pub fn transient() -> Self {
        Self::failure(ErrorCategory::Transient)
    }

    pub fn permanent() -> Self {
        Self::failure(ErrorCategory::Permanent)
    }

    pub fn unknown() -> Self {
        Self::failure(ErrorCategory::Unknown)
    }
}

/// Performs (or simulates) one ingestion attempt for a job.
#[async_trait]
pub trait OutcomeSource: Send + Sync {
    async fn ingest(&self, job: &IngestionJob) -> Outcome;
}

/// Simulated connector: random latency, success with a fixed probability,
/// failures classified 60% transient / 30% permanent / 10% unknown.
#[derive(Debug, Clone)]
pub struct RandomOutcomeSource {
    success_rate: f64,
    min_latency: Duration,
    max_latency: Duration,
}

impl Default for RandomOutcomeSource {
    fn default() -> Self {
        Self {
            success_rate: 0.7,
            min_latency: Duration::from_millis(1000),
            max_latency: Duration::from_millis(3000),
        }
    }
}

impl RandomOutcomeSource {
    pub fn new(success_rate: f64) -> Self {
        Self {
            success_rate: success_rate.clamp(0.0, 1.0),
            ..Default::default()
        }
    }

    pub fn with_latency(mut self, min: Duration, max: Duration) -> Self {
        self.min_latency = min;
        self.max_latency = max.max(min);
        self
    }

    /// Map a uniform roll in `[0, 1)` onto a failure category.
    pub fn classify(roll: f64) -> ErrorCategory {
        if roll < 0.6 {
            ErrorCategory::Transient
        } else if roll < 0.9 {
            ErrorCategory::Permanent
        } else {
            ErrorCategory::Unknown
        }
    }

    fn roll_outcome(&self) -> Outcome {
        let mut rng = rand::thread_rng();
        if rng.r#gen::<f64>() < self.success_rate {
            return Outcome::Success;
        }

        let category = Self::classify(rng.r#gen());
        let messages = error_messages(category);
        Outcome::Failure {
            category,
            message: messages[rng.gen_range(0..messages.len())].to_string(),
        }
    }
}

#[async_trait]
impl OutcomeSource for RandomOutcomeSource {
    async fn ingest(&self, _job: &IngestionJob) -> Outcome {
        let latency = if self.max_latency > self.min_latency {
            rand::thread_rng().gen_range(self.min_latency..=self.max_latency)
        } else {
            self.min_latency
        };
        tokio::time::sleep(latency).await;
        self.roll_outcome()
    }
}

/// Deterministic test double: replays outcomes in order, then repeats a
/// fallback forever.
#[derive(Debug)]
pub struct ScriptedOutcomeSource {
    script: Mutex<VecDeque<Outcome>>,
    fallback: Outcome,
    latency: Duration,
    calls: AtomicU32,
}

impl ScriptedOutcomeSource {
    pub fn new(outcomes: impl IntoIterator<Item = Outcome>) -> Self {
        Self {
            script: Mutex::new(outcomes.into_iter().collect()),
            fallback: Outcome::Success,
            latency: Duration::ZERO,
            calls: AtomicU32::new(0),
        }
    }

    /// Every attempt yields `outcome`.
    pub fn always(outcome: Outcome) -> Self {
        Self::new(Vec::new()).with_fallback(outcome)
    }

    pub fn with_fallback(mut self, outcome: Outcome) -> Self {
        self.fallback = outcome;
        self
    }

    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    /// Number of attempts served so far.
    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }

    fn next_outcome(&self) -> Outcome {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.script
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop_front()
            .unwrap_or_else(|| self.fallback.clone())
    }
}

#[async_trait]
impl OutcomeSource for ScriptedOutcomeSource {
    async fn ingest(&self, _job: &IngestionJob) -> Outcome {
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
        self.next_outcome()
    }
}
