//! Ingestion job model and state machine.
//!
//! ```text
//! PENDING -> PROCESSING -> COMPLETED
//!                       -> RETRYING -> PROCESSING ...
//!                       -> FAILED   -> PENDING (manual retry)
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use docvault_core::{DocumentId, Entity, JobId, ServiceError, ServiceResult, UserId};

/// Free-form key/value options attached to a job.
pub type Options = serde_json::Map<String, serde_json::Value>;

/// What kind of content a job imports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobType {
    Document,
    Email,
    Api,
    Database,
}

/// Where the content comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SourceType {
    File,
    Api,
    Text,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobStatus {
    Pending,
    Processing,
    Retrying,
    Completed,
    Failed,
}

impl JobStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed)
    }

    /// Whether `self -> next` is an edge of the job state machine.
    ///
    /// Cancellation (any non-terminal state to FAILED) is included.
    pub fn can_transition_to(&self, next: JobStatus) -> bool {
        use JobStatus::*;
        matches!(
            (*self, next),
            (Pending, Processing)
                | (Processing, Completed)
                | (Processing, Retrying)
                | (Processing, Failed)
                | (Retrying, Processing)
                | (Pending, Failed)
                | (Retrying, Failed)
                | (Failed, Pending)
        )
    }
}

impl core::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let s = match self {
            JobStatus::Pending => "PENDING",
            JobStatus::Processing => "PROCESSING",
            JobStatus::Retrying => "RETRYING",
            JobStatus::Completed => "COMPLETED",
            JobStatus::Failed => "FAILED",
        };
        f.write_str(s)
    }
}

/// Failure classification driving retry eligibility.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCategory {
    /// Likely to succeed on a later attempt (timeouts, throttling).
    Transient,
    /// Will fail again no matter how often it is retried.
    Permanent,
    Unknown,
}

impl core::fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let s = match self {
            ErrorCategory::Transient => "TRANSIENT",
            ErrorCategory::Permanent => "PERMANENT",
            ErrorCategory::Unknown => "UNKNOWN",
        };
        f.write_str(s)
    }
}

/// Structured record of the most recent failure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorDetails {
    pub category: ErrorCategory,
    pub timestamp: DateTime<Utc>,
    pub description: String,
    /// Debug rendering of an unexpected internal error, if that is what failed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub trace: Option<String>,
}

/// Caller-supplied description of the work to import.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IngestionRequest {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(rename = "type")]
    pub job_type: JobType,
    pub source_type: SourceType,
    #[serde(default)]
    pub source_location: String,
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default)]
    pub processing_options: Options,
    #[serde(default)]
    pub target_options: Options,
    #[serde(default)]
    pub metadata: Options,
}

impl IngestionRequest {
    pub fn new(name: impl Into<String>, job_type: JobType, source_type: SourceType) -> Self {
        Self {
            name: name.into(),
            description: None,
            job_type,
            source_type,
            source_location: String::new(),
            content: None,
            processing_options: Options::new(),
            target_options: Options::new(),
            metadata: Options::new(),
        }
    }

    pub fn with_source_location(mut self, location: impl Into<String>) -> Self {
        self.source_location = location.into();
        self
    }

    pub fn with_content(mut self, content: impl Into<String>) -> Self {
        self.content = Some(content.into());
        self
    }

    /// Required-field presence only.
    pub fn validate(&self) -> ServiceResult<()> {
        if self.name.trim().is_empty() {
            return Err(ServiceError::bad_request("name is required"));
        }
        match self.source_type {
            SourceType::File | SourceType::Api if self.source_location.trim().is_empty() => Err(
                ServiceError::bad_request(format!("{:?} source requires a source location", self.source_type)),
            ),
            SourceType::Text if self.content.as_deref().is_none_or(str::is_empty) => {
                Err(ServiceError::bad_request("TEXT source requires content"))
            }
            _ => Ok(()),
        }
    }
}

/// One tracked unit of import work.
///
/// # Invariants
/// - `retry_attempts` never exceeds the configured maximum.
/// - `document_id` is set iff `status == Completed` and `job_type == Document`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IngestionJob {
    pub id: JobId,
    pub name: String,
    pub description: Option<String>,
    #[serde(rename = "type")]
    pub job_type: JobType,
    pub source_type: SourceType,
    pub source_location: String,
    pub status: JobStatus,
    /// Human-readable progress message.
    pub message: String,
    pub document_id: Option<DocumentId>,
    /// Raw payload.
    pub content: String,
    pub processing_options: Options,
    pub target_options: Options,
    pub metadata: Options,
    pub retry_attempts: u32,
    pub last_error_message: Option<String>,
    pub last_retry_time: Option<DateTime<Utc>>,
    pub error_details: Option<ErrorDetails>,
    pub user_id: UserId,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Entity for IngestionJob {
    type Id = JobId;

    fn id(&self) -> JobId {
        self.id
    }
}

impl IngestionJob {
    /// Create a PENDING job owned by `user_id`.
    pub fn new(request: IngestionRequest, user_id: UserId) -> Self {
        let now = Utc::now();
        Self {
            id: JobId::new(),
            name: request.name,
            description: request.description,
            job_type: request.job_type,
            source_type: request.source_type,
            source_location: request.source_location,
            status: JobStatus::Pending,
            message: "Ingestion job created".to_string(),
            document_id: None,
            content: request.content.unwrap_or_default(),
            processing_options: request.processing_options,
            target_options: request.target_options,
            metadata: request.metadata,
            retry_attempts: 0,
            last_error_message: None,
            last_retry_time: None,
            error_details: None,
            user_id,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn mark_processing(&mut self) {
        self.status = JobStatus::Processing;
        self.message = "Processing ingestion job".to_string();
        self.updated_at = Utc::now();
    }

    /// Mark completed; DOCUMENT jobs get a synthesized document id.
    pub fn mark_completed(&mut self) {
        self.status = JobStatus::Completed;
        self.message = "Ingestion completed successfully".to_string();
        self.document_id = match self.job_type {
            JobType::Document => Some(DocumentId::new()),
            _ => None,
        };
        self.updated_at = Utc::now();
    }

    /// Record the most recent failure without changing status.
    pub fn record_failure(&mut self, category: ErrorCategory, message: &str, at: DateTime<Utc>) {
        self.last_error_message = Some(message.to_string());
        self.error_details = Some(ErrorDetails {
            category,
            timestamp: at,
            description: message.to_string(),
            trace: None,
        });
        self.updated_at = at;
    }

    /// Count one more retry and park the job until it is re-processed.
    pub fn mark_retrying(&mut self, at: DateTime<Utc>, max_retries: u32) {
        self.retry_attempts += 1;
        self.last_retry_time = Some(at);
        self.status = JobStatus::Retrying;
        self.message = format!("Retrying after failure (attempt {}/{})", self.retry_attempts, max_retries);
        self.updated_at = at;
    }

    pub fn mark_failed(&mut self, message: impl Into<String>) {
        self.status = JobStatus::Failed;
        self.message = message.into();
        self.document_id = None;
        self.updated_at = Utc::now();
    }

    pub fn cancel(&mut self) {
        self.mark_failed("canceled by user");
    }

    /// Manual retry of a FAILED job.
    pub fn reset_for_retry(&mut self, at: DateTime<Utc>) {
        self.retry_attempts = 0;
        self.status = JobStatus::Pending;
        self.last_retry_time = Some(at);
        self.message = "Retry requested".to_string();
        self.updated_at = at;
    }

    /// Record an internal error raised while processing and fail the job.
    pub fn record_unexpected(&mut self, description: String, trace: String, at: DateTime<Utc>) {
        self.last_error_message = Some(description.clone());
        self.error_details = Some(ErrorDetails {
            category: ErrorCategory::Unknown,
            timestamp: at,
            description: description.clone(),
            trace: Some(trace),
        });
        self.mark_failed(format!("Unexpected error during ingestion: {description}"));
    }
}

/// Caller-facing view of a job (the raw payload is omitted).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobView {
    pub id: JobId,
    pub name: String,
    pub description: Option<String>,
    #[serde(rename = "type")]
    pub job_type: JobType,
    pub source_type: SourceType,
    pub source_location: String,
    pub status: JobStatus,
    pub message: String,
    pub document_id: Option<DocumentId>,
    pub retry_attempts: u32,
    pub last_error_message: Option<String>,
    pub last_retry_time: Option<DateTime<Utc>>,
    pub error_details: Option<ErrorDetails>,
    pub user_id: UserId,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<&IngestionJob> for JobView {
    fn from(job: &IngestionJob) -> Self {
        Self {
            id: job.id,
            name: job.name.clone(),
            description: job.description.clone(),
            job_type: job.job_type,
            source_type: job.source_type,
            source_location: job.source_location.clone(),
            status: job.status,
            message: job.message.clone(),
            document_id: job.document_id,
            retry_attempts: job.retry_attempts,
            last_error_message: job.last_error_message.clone(),
            last_retry_time: job.last_retry_time,
            error_details: job.error_details.clone(),
            user_id: job.user_id,
            created_at: job.created_at,
            updated_at: job.updated_at,
        }
    }
}
