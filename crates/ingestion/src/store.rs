//! Ingestion job storage.

use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};

use serde::Serialize;

use docvault_core::{JobId, ServiceError, UserId};

use crate::job::{IngestionJob, JobStatus, JobType};

/// Ingestion job persistence.
///
/// No locking or transactions span calls: a reader may observe a job between
/// two writes of the same processing step.
pub trait IngestionJobStore: Send + Sync {
    /// Persist a new job.
    fn create(&self, job: IngestionJob) -> Result<IngestionJob, JobStoreError>;

    fn find_by_id(&self, id: JobId) -> Result<Option<IngestionJob>, JobStoreError>;

    /// Jobs matching `filter`, newest first.
    fn find_many(&self, filter: &JobFilter) -> Result<Vec<IngestionJob>, JobStoreError>;

    /// Upsert by id.
    fn save(&self, job: &IngestionJob) -> Result<IngestionJob, JobStoreError>;
}

/// Job store error.
#[derive(Debug, Clone, thiserror::Error)]
pub enum JobStoreError {
    #[error("job already exists: {0}")]
    AlreadyExists(JobId),
    #[error("storage error: {0}")]
    Storage(String),
}

impl From<JobStoreError> for ServiceError {
    fn from(err: JobStoreError) -> Self {
        ServiceError::internal(err.to_string())
    }
}

/// Optional filters; `None` matches everything.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct JobFilter {
    pub user_id: Option<UserId>,
    pub status: Option<JobStatus>,
    pub job_type: Option<JobType>,
}

impl JobFilter {
    pub fn for_user(user_id: UserId) -> Self {
        Self {
            user_id: Some(user_id),
            ..Default::default()
        }
    }

    pub fn with_status(mut self, status: JobStatus) -> Self {
        self.status = Some(status);
        self
    }

    pub fn with_type(mut self, job_type: JobType) -> Self {
        self.job_type = Some(job_type);
        self
    }

    pub fn matches(&self, job: &IngestionJob) -> bool {
        self.user_id.is_none_or(|u| job.user_id == u)
            && self.status.is_none_or(|s| job.status == s)
            && self.job_type.is_none_or(|t| job.job_type == t)
    }
}

/// Job counts per status.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct JobStats {
    pub pending: usize,
    pub processing: usize,
    pub retrying: usize,
    pub completed: usize,
    pub failed: usize,
}

impl JobStats {
    pub fn record(&mut self, status: JobStatus) {
        match status {
            JobStatus::Pending => self.pending += 1,
            JobStatus::Processing => self.processing += 1,
            JobStatus::Retrying => self.retrying += 1,
            JobStatus::Completed => self.completed += 1,
            JobStatus::Failed => self.failed += 1,
        }
    }

    pub fn total(&self) -> usize {
        self.pending + self.processing + self.retrying + self.completed + self.failed
    }
}

/// In-memory job store for tests/dev.
#[derive(Debug, Default)]
pub struct InMemoryIngestionJobStore {
    jobs: RwLock<HashMap<JobId, IngestionJob>>,
}

impl InMemoryIngestionJobStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl IngestionJobStore for InMemoryIngestionJobStore {
    fn create(&self, job: IngestionJob) -> Result<IngestionJob, JobStoreError> {
        let mut jobs = self.jobs.write().unwrap_or_else(PoisonError::into_inner);
        if jobs.contains_key(&job.id) {
            return Err(JobStoreError::AlreadyExists(job.id));
        }
        jobs.insert(job.id, job.clone());
        Ok(job)
    }

    fn find_by_id(&self, id: JobId) -> Result<Option<IngestionJob>, JobStoreError> {
        let jobs = self.jobs.read().unwrap_or_else(PoisonError::into_inner);
        Ok(jobs.get(&id).cloned())
    }

    fn find_many(&self, filter: &JobFilter) -> Result<Vec<IngestionJob>, JobStoreError> {
        let jobs = self.jobs.read().unwrap_or_else(PoisonError::into_inner);
        let mut result: Vec<_> = jobs.values().filter(|j| filter.matches(j)).cloned().collect();

        // UUIDv7 ids break ties between jobs created in the same instant.
        result.sort_by(|a, b| {
            b.created_at
                .cmp(&a.created_at)
                .then_with(|| b.id.as_uuid().cmp(a.id.as_uuid()))
        });
        Ok(result)
    }

    fn save(&self, job: &IngestionJob) -> Result<IngestionJob, JobStoreError> {
        let mut jobs = self.jobs.write().unwrap_or_else(PoisonError::into_inner);
        jobs.insert(job.id, job.clone());
        Ok(job.clone())
    }
}
