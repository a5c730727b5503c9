//! Ingestion jobs: lifecycle, retry policy and background processing.

pub mod job;
pub mod orchestrator;
pub mod outcome;
pub mod retry;
pub mod scheduler;
pub mod store;

pub use job::{
    ErrorCategory, ErrorDetails, IngestionJob, IngestionRequest, JobStatus, JobType, JobView,
    Options, SourceType,
};
pub use orchestrator::{IngestionOrchestrator, OrchestratorConfig};
pub use outcome::{Outcome, OutcomeSource, RandomOutcomeSource, ScriptedOutcomeSource};
pub use retry::{BackoffStrategy, RetryPolicy};
pub use scheduler::{BoxTask, TaskScheduler, TokioTaskScheduler};
pub use store::{InMemoryIngestionJobStore, IngestionJobStore, JobFilter, JobStats, JobStoreError};
