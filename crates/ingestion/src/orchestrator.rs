//! Ingestion Orchestrator: job lifecycle and the background processing step.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tracing::{debug, error, info, warn};

use docvault_core::{JobId, ServiceError, ServiceResult, UserId};

use crate::job::{IngestionJob, IngestionRequest, JobStatus, JobView};
use crate::outcome::{Outcome, OutcomeSource};
use crate::retry::RetryPolicy;
use crate::scheduler::{BoxTask, TaskScheduler};
use crate::store::{IngestionJobStore, JobFilter, JobStats, JobStoreError};

#[derive(Debug, Clone, Default)]
pub struct OrchestratorConfig {
    pub retry_policy: RetryPolicy,
    /// When set, Cancel also aborts any scheduled or running processing step
    /// for the job. Off by default: a canceled job may still be overwritten
    /// by a step that was already in flight.
    pub cancel_pending_retries: bool,
}

impl OrchestratorConfig {
    pub fn with_retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.retry_policy = policy;
        self
    }

    pub fn with_cancel_pending_retries(mut self, enabled: bool) -> Self {
        self.cancel_pending_retries = enabled;
        self
    }
}

/// Drives ingestion jobs through their lifecycle.
///
/// Trigger and Retry return as soon as the job is persisted; processing runs
/// on the [`TaskScheduler`]. There is no per-job lock, so two steps for the
/// same job can interleave (e.g. a manual Retry while an automatic retry is
/// still scheduled).
#[derive(Clone)]
pub struct IngestionOrchestrator {
    inner: Arc<Inner>,
}

struct Inner {
    store: Arc<dyn IngestionJobStore>,
    outcomes: Arc<dyn OutcomeSource>,
    scheduler: Arc<dyn TaskScheduler>,
    config: OrchestratorConfig,
}

impl IngestionOrchestrator {
    pub fn new(
        store: Arc<dyn IngestionJobStore>,
        outcomes: Arc<dyn OutcomeSource>,
        scheduler: Arc<dyn TaskScheduler>,
        config: OrchestratorConfig,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                store,
                outcomes,
                scheduler,
                config,
            }),
        }
    }

    pub fn config(&self) -> &OrchestratorConfig {
        &self.inner.config
    }

    /// Persist a PENDING job and start processing it in the background.
    pub fn trigger(&self, request: IngestionRequest, user_id: UserId) -> ServiceResult<JobView> {
        request.validate()?;

        let job = self.inner.store.create(IngestionJob::new(request, user_id))?;
        info!(
            job_id = %job.id,
            user_id = %user_id,
            job_type = ?job.job_type,
            source_type = ?job.source_type,
            "ingestion job created"
        );

        self.inner.schedule(job.id, Duration::ZERO);
        Ok(JobView::from(&job))
    }

    pub fn status(&self, job_id: JobId) -> ServiceResult<JobView> {
        self.load(job_id).map(|job| JobView::from(&job))
    }

    /// Force a non-terminal job to FAILED.
    pub fn cancel(&self, job_id: JobId) -> ServiceResult<JobView> {
        let mut job = self.load(job_id)?;
        if !job.status.can_transition_to(JobStatus::Failed) {
            return Err(ServiceError::bad_request(format!(
                "cannot cancel job in {} state",
                job.status
            )));
        }

        if self.inner.config.cancel_pending_retries {
            self.inner.scheduler.cancel(job_id);
        }

        job.cancel();
        let job = self.inner.store.save(&job)?;
        info!(job_id = %job_id, "ingestion job canceled");
        Ok(JobView::from(&job))
    }

    /// Re-run a FAILED job from scratch.
    pub fn retry(&self, job_id: JobId) -> ServiceResult<JobView> {
        let mut job = self.load(job_id)?;
        if !job.status.can_transition_to(JobStatus::Pending) {
            return Err(ServiceError::bad_request(format!(
                "only failed jobs can be retried (current state: {})",
                job.status
            )));
        }

        job.reset_for_retry(Utc::now());
        let job = self.inner.store.save(&job)?;
        info!(job_id = %job_id, "manual retry requested");

        self.inner.schedule(job_id, Duration::ZERO);
        Ok(JobView::from(&job))
    }

    /// Trigger each request in order. Stops at the first failure; jobs
    /// triggered before it keep running.
    pub fn batch_trigger(
        &self,
        requests: Vec<IngestionRequest>,
        user_id: UserId,
    ) -> ServiceResult<Vec<JobView>> {
        requests
            .into_iter()
            .map(|request| self.trigger(request, user_id))
            .collect()
    }

    /// Jobs matching `filter`, newest first.
    pub fn list_jobs(&self, filter: &JobFilter) -> ServiceResult<Vec<JobView>> {
        let jobs = self.inner.store.find_many(filter)?;
        Ok(jobs.iter().map(JobView::from).collect())
    }

    /// Job counts per status, optionally for one owner.
    pub fn stats(&self, user_id: Option<UserId>) -> ServiceResult<JobStats> {
        let filter = JobFilter {
            user_id,
            ..Default::default()
        };
        let mut stats = JobStats::default();
        for job in self.inner.store.find_many(&filter)? {
            stats.record(job.status);
        }
        Ok(stats)
    }

    fn load(&self, job_id: JobId) -> ServiceResult<IngestionJob> {
        self.inner
            .store
            .find_by_id(job_id)?
            .ok_or_else(|| ServiceError::not_found(format!("ingestion job not found: {job_id}")))
    }
}

impl Inner {
    fn schedule(self: &Arc<Self>, job_id: JobId, delay: Duration) {
        let task = Arc::clone(self).process(job_id);
        self.scheduler.submit_after(job_id, delay, task);
    }

    /// Background entry point. Never propagates: unexpected errors are
    /// recorded on the job, and dropped if even that fails.
    fn process(self: Arc<Self>, job_id: JobId) -> BoxTask {
        Box::pin(async move {
            if let Err(err) = self.run_step(job_id).await {
                error!(job_id = %job_id, error = %err, "ingestion step failed unexpectedly");
                self.record_unexpected_failure(job_id, &err);
            }
        })
    }

    async fn run_step(self: &Arc<Self>, job_id: JobId) -> Result<(), JobStoreError> {
        let Some(mut job) = self.store.find_by_id(job_id)? else {
            warn!(job_id = %job_id, "ingestion job disappeared before processing");
            return Ok(());
        };

        if !job.status.can_transition_to(JobStatus::Processing) {
            warn!(
                job_id = %job_id,
                status = %job.status,
                "processing step started from a state that does not lead to PROCESSING"
            );
        }

        job.mark_processing();
        self.store.save(&job)?;
        debug!(job_id = %job_id, attempt = job.retry_attempts, "processing ingestion job");

        match self.outcomes.ingest(&job).await {
            Outcome::Success => {
                job.mark_completed();
                self.store.save(&job)?;
                info!(
                    job_id = %job_id,
                    document_id = ?job.document_id,
                    "ingestion job completed"
                );
            }
            Outcome::Failure { category, message } => {
                let now = Utc::now();
                job.record_failure(category, &message, now);

                let policy = &self.config.retry_policy;
                if policy.should_retry(category, job.retry_attempts) {
                    job.mark_retrying(now, policy.max_retries);
                    self.store.save(&job)?;

                    let delay = policy.compute_delay(job.retry_attempts);
                    info!(
                        job_id = %job_id,
                        category = %category,
                        attempt = job.retry_attempts,
                        max_retries = policy.max_retries,
                        delay_ms = delay.as_millis() as u64,
                        "ingestion failed, retry scheduled"
                    );
                    self.schedule(job_id, delay);
                } else {
                    job.mark_failed(format!(
                        "Ingestion failed after {} retry attempt(s): {}",
                        job.retry_attempts, message
                    ));
                    self.store.save(&job)?;
                    warn!(
                        job_id = %job_id,
                        category = %category,
                        attempts = job.retry_attempts,
                        error = %message,
                        "ingestion job failed"
                    );
                }
            }
        }
        Ok(())
    }

    fn record_unexpected_failure(&self, job_id: JobId, err: &JobStoreError) {
        let recorded = self.store.find_by_id(job_id).and_then(|found| match found {
            Some(mut job) => {
                job.record_unexpected(err.to_string(), format!("{err:?}"), Utc::now());
                self.store.save(&job).map(|_| ())
            }
            None => Ok(()),
        });

        if let Err(save_err) = recorded {
            error!(
                job_id = %job_id,
                error = %save_err,
                "could not record unexpected ingestion failure"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Mutex, PoisonError};

    use crate::job::{ErrorCategory, JobType, SourceType};
    use crate::outcome::{PERMANENT_ERRORS, ScriptedOutcomeSource};
    use crate::scheduler::TokioTaskScheduler;
    use crate::store::InMemoryIngestionJobStore;

    /// Records every saved status.
    #[derive(Default)]
    struct RecordingStore {
        inner: InMemoryIngestionJobStore,
        saved: Mutex<Vec<JobStatus>>,
    }

    impl RecordingStore {
        fn saved(&self) -> Vec<JobStatus> {
            self.saved.lock().unwrap_or_else(PoisonError::into_inner).clone()
        }
    }

    impl IngestionJobStore for RecordingStore {
        fn create(&self, job: IngestionJob) -> Result<IngestionJob, JobStoreError> {
            self.inner.create(job)
        }

        fn find_by_id(&self, id: JobId) -> Result<Option<IngestionJob>, JobStoreError> {
            self.inner.find_by_id(id)
        }

        fn find_many(&self, filter: &JobFilter) -> Result<Vec<IngestionJob>, JobStoreError> {
            self.inner.find_many(filter)
        }

        fn save(&self, job: &IngestionJob) -> Result<IngestionJob, JobStoreError> {
            self.saved
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .push(job.status);
            self.inner.save(job)
        }
    }

    /// Fails exactly the `fail_on`-th save (1-based).
    struct FlakyStore {
        inner: InMemoryIngestionJobStore,
        saves: AtomicUsize,
        fail_on: usize,
    }

    impl IngestionJobStore for FlakyStore {
        fn create(&self, job: IngestionJob) -> Result<IngestionJob, JobStoreError> {
            self.inner.create(job)
        }

        fn find_by_id(&self, id: JobId) -> Result<Option<IngestionJob>, JobStoreError> {
            self.inner.find_by_id(id)
        }

        fn find_many(&self, filter: &JobFilter) -> Result<Vec<IngestionJob>, JobStoreError> {
            self.inner.find_many(filter)
        }

        fn save(&self, job: &IngestionJob) -> Result<IngestionJob, JobStoreError> {
            if self.saves.fetch_add(1, Ordering::SeqCst) + 1 == self.fail_on {
                return Err(JobStoreError::Storage("disk full".to_string()));
            }
            self.inner.save(job)
        }
    }

    /// Accepts tasks and never runs them.
    #[derive(Default)]
    struct HeldScheduler {
        held: Mutex<Vec<(JobId, BoxTask)>>,
    }

    impl TaskScheduler for HeldScheduler {
        fn submit_after(&self, key: JobId, _delay: Duration, task: BoxTask) {
            self.held
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .push((key, task));
        }

        fn cancel(&self, key: JobId) -> bool {
            let mut held = self.held.lock().unwrap_or_else(PoisonError::into_inner);
            let before = held.len();
            held.retain(|(k, _)| *k != key);
            held.len() != before
        }

        fn pending(&self) -> usize {
            self.held.lock().unwrap_or_else(PoisonError::into_inner).len()
        }
    }

    fn fast_policy() -> RetryPolicy {
        RetryPolicy::fixed(3, Duration::from_millis(5))
    }

    fn orchestrator(
        store: Arc<dyn IngestionJobStore>,
        outcomes: ScriptedOutcomeSource,
        config: OrchestratorConfig,
    ) -> (IngestionOrchestrator, Arc<TokioTaskScheduler>) {
        let scheduler = Arc::new(TokioTaskScheduler::try_current().unwrap());
        let orchestrator =
            IngestionOrchestrator::new(store, Arc::new(outcomes), scheduler.clone(), config);
        (orchestrator, scheduler)
    }

    fn document_request() -> IngestionRequest {
        IngestionRequest::new("report", JobType::Document, SourceType::File)
            .with_source_location("/uploads/report.pdf")
    }

    async fn wait_until_terminal(orchestrator: &IngestionOrchestrator, id: JobId) -> JobView {
        for _ in 0..400 {
            let view = orchestrator.status(id).unwrap();
            if view.status.is_terminal() {
                return view;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("job {id} never reached a terminal state");
    }

    async fn wait_for_status(orchestrator: &IngestionOrchestrator, id: JobId, status: JobStatus) {
        for _ in 0..400 {
            if orchestrator.status(id).unwrap().status == status {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("job {id} never reached {status}");
    }

    #[tokio::test]
    async fn trigger_returns_pending_then_completes() {
        let (orchestrator, _) = orchestrator(
            Arc::new(InMemoryIngestionJobStore::new()),
            ScriptedOutcomeSource::always(Outcome::Success),
            OrchestratorConfig::default().with_retry_policy(fast_policy()),
        );

        let view = orchestrator.trigger(document_request(), UserId::new()).unwrap();
        assert_eq!(view.status, JobStatus::Pending);
        assert_eq!(view.retry_attempts, 0);

        let done = wait_until_terminal(&orchestrator, view.id).await;
        assert_eq!(done.status, JobStatus::Completed);
        assert!(done.document_id.is_some());
    }

    #[tokio::test]
    async fn non_document_jobs_complete_without_document_id() {
        let (orchestrator, _) = orchestrator(
            Arc::new(InMemoryIngestionJobStore::new()),
            ScriptedOutcomeSource::always(Outcome::Success),
            OrchestratorConfig::default(),
        );
        let request =
            IngestionRequest::new("inbox", JobType::Email, SourceType::Text).with_content("hi");

        let view = orchestrator.trigger(request, UserId::new()).unwrap();
        let done = wait_until_terminal(&orchestrator, view.id).await;

        assert_eq!(done.status, JobStatus::Completed);
        assert!(done.document_id.is_none());
    }

    #[tokio::test]
    async fn invalid_request_is_rejected_before_persisting() {
        let store = Arc::new(InMemoryIngestionJobStore::new());
        let (orchestrator, _) = orchestrator(
            store.clone(),
            ScriptedOutcomeSource::always(Outcome::Success),
            OrchestratorConfig::default(),
        );
        let request = IngestionRequest::new("report", JobType::Document, SourceType::File);

        let err = orchestrator.trigger(request, UserId::new()).unwrap_err();
        assert!(matches!(err, ServiceError::BadRequest(_)));
        assert!(store.find_many(&JobFilter::default()).unwrap().is_empty());
    }

    #[tokio::test]
    async fn permanent_failure_is_not_retried() {
        let (orchestrator, _) = orchestrator(
            Arc::new(InMemoryIngestionJobStore::new()),
            ScriptedOutcomeSource::always(Outcome::permanent()),
            OrchestratorConfig::default().with_retry_policy(fast_policy()),
        );

        let view = orchestrator.trigger(document_request(), UserId::new()).unwrap();
        let done = wait_until_terminal(&orchestrator, view.id).await;

        assert_eq!(done.status, JobStatus::Failed);
        assert_eq!(done.retry_attempts, 0);
        assert!(done.document_id.is_none());
        let last_error = done.last_error_message.unwrap();
        assert!(PERMANENT_ERRORS.contains(&last_error.as_str()));
        assert_eq!(
            done.error_details.map(|d| d.category),
            Some(ErrorCategory::Permanent)
        );
        assert!(done.message.starts_with("Ingestion failed after 0 retry attempt(s)"));
    }

    #[tokio::test]
    async fn transient_failures_exhaust_retries() {
        let store = Arc::new(RecordingStore::default());
        let outcomes = ScriptedOutcomeSource::always(Outcome::transient());
        let (orchestrator, _) = orchestrator(
            store.clone(),
            outcomes,
            OrchestratorConfig::default().with_retry_policy(fast_policy()),
        );

        let view = orchestrator.trigger(document_request(), UserId::new()).unwrap();
        let done = wait_until_terminal(&orchestrator, view.id).await;

        assert_eq!(done.status, JobStatus::Failed);
        assert_eq!(done.retry_attempts, 3);
        let retrying = store
            .saved()
            .into_iter()
            .filter(|s| *s == JobStatus::Retrying)
            .count();
        assert_eq!(retrying, 3);
    }

    #[tokio::test]
    async fn recovers_after_transient_failures() {
        let outcomes = ScriptedOutcomeSource::new([Outcome::transient(), Outcome::unknown()]);
        let (orchestrator, _) = orchestrator(
            Arc::new(InMemoryIngestionJobStore::new()),
            outcomes,
            OrchestratorConfig::default().with_retry_policy(fast_policy()),
        );

        let view = orchestrator.trigger(document_request(), UserId::new()).unwrap();
        let done = wait_until_terminal(&orchestrator, view.id).await;

        assert_eq!(done.status, JobStatus::Completed);
        assert_eq!(done.retry_attempts, 2);
        assert!(done.last_retry_time.is_some());
    }

    #[tokio::test]
    async fn unknown_job_is_not_found() {
        let (orchestrator, _) = orchestrator(
            Arc::new(InMemoryIngestionJobStore::new()),
            ScriptedOutcomeSource::always(Outcome::Success),
            OrchestratorConfig::default(),
        );
        let id = JobId::new();

        assert!(matches!(orchestrator.status(id), Err(ServiceError::NotFound(_))));
        assert!(matches!(orchestrator.cancel(id), Err(ServiceError::NotFound(_))));
        assert!(matches!(orchestrator.retry(id), Err(ServiceError::NotFound(_))));
    }

    #[tokio::test]
    async fn cancel_rejects_terminal_jobs() {
        let (orchestrator, _) = orchestrator(
            Arc::new(InMemoryIngestionJobStore::new()),
            ScriptedOutcomeSource::always(Outcome::Success),
            OrchestratorConfig::default(),
        );

        let view = orchestrator.trigger(document_request(), UserId::new()).unwrap();
        wait_until_terminal(&orchestrator, view.id).await;

        let err = orchestrator.cancel(view.id).unwrap_err();
        assert!(matches!(err, ServiceError::BadRequest(_)));
    }

    #[tokio::test]
    async fn cancel_accepts_a_pending_job() {
        let scheduler = Arc::new(HeldScheduler::default());
        let orchestrator = IngestionOrchestrator::new(
            Arc::new(InMemoryIngestionJobStore::new()),
            Arc::new(ScriptedOutcomeSource::always(Outcome::Success)),
            scheduler.clone(),
            OrchestratorConfig::default().with_cancel_pending_retries(true),
        );

        let view = orchestrator.trigger(document_request(), UserId::new()).unwrap();
        assert_eq!(orchestrator.status(view.id).unwrap().status, JobStatus::Pending);
        assert_eq!(scheduler.pending(), 1);

        let canceled = orchestrator.cancel(view.id).unwrap();
        assert_eq!(canceled.status, JobStatus::Failed);
        assert_eq!(canceled.message, "canceled by user");
        assert_eq!(scheduler.pending(), 0);
    }

    #[tokio::test]
    async fn cancel_fails_an_active_job() {
        let outcomes = ScriptedOutcomeSource::always(Outcome::Success)
            .with_latency(Duration::from_millis(200));
        let (orchestrator, _) = orchestrator(
            Arc::new(InMemoryIngestionJobStore::new()),
            outcomes,
            OrchestratorConfig::default().with_cancel_pending_retries(true),
        );

        let view = orchestrator.trigger(document_request(), UserId::new()).unwrap();
        wait_for_status(&orchestrator, view.id, JobStatus::Processing).await;

        let canceled = orchestrator.cancel(view.id).unwrap();
        assert_eq!(canceled.status, JobStatus::Failed);
        assert_eq!(canceled.message, "canceled by user");

        tokio::time::sleep(Duration::from_millis(300)).await;
        assert_eq!(orchestrator.status(view.id).unwrap().status, JobStatus::Failed);
    }

    #[tokio::test]
    async fn cancel_can_abort_a_scheduled_retry() {
        let outcomes = ScriptedOutcomeSource::always(Outcome::transient());
        let (orchestrator, scheduler) = orchestrator(
            Arc::new(InMemoryIngestionJobStore::new()),
            outcomes,
            OrchestratorConfig::default()
                .with_retry_policy(RetryPolicy::fixed(3, Duration::from_secs(60)))
                .with_cancel_pending_retries(true),
        );

        let view = orchestrator.trigger(document_request(), UserId::new()).unwrap();
        wait_for_status(&orchestrator, view.id, JobStatus::Retrying).await;

        orchestrator.cancel(view.id).unwrap();
        assert_eq!(scheduler.pending(), 0);
    }

    #[tokio::test]
    async fn cancel_leaves_scheduled_retry_by_default() {
        let outcomes = ScriptedOutcomeSource::always(Outcome::transient());
        let (orchestrator, scheduler) = orchestrator(
            Arc::new(InMemoryIngestionJobStore::new()),
            outcomes,
            OrchestratorConfig::default()
                .with_retry_policy(RetryPolicy::fixed(3, Duration::from_secs(60))),
        );

        let view = orchestrator.trigger(document_request(), UserId::new()).unwrap();
        wait_for_status(&orchestrator, view.id, JobStatus::Retrying).await;

        orchestrator.cancel(view.id).unwrap();
        assert_eq!(scheduler.pending(), 1);
        assert!(scheduler.cancel(view.id));
    }

    #[tokio::test]
    async fn retry_only_accepts_failed_jobs() {
        let outcomes =
            ScriptedOutcomeSource::new([Outcome::permanent()]).with_fallback(Outcome::Success);
        let (orchestrator, _) = orchestrator(
            Arc::new(InMemoryIngestionJobStore::new()),
            outcomes,
            OrchestratorConfig::default().with_retry_policy(fast_policy()),
        );

        let view = orchestrator.trigger(document_request(), UserId::new()).unwrap();
        let failed = wait_until_terminal(&orchestrator, view.id).await;
        assert_eq!(failed.status, JobStatus::Failed);

        let retried = orchestrator.retry(view.id).unwrap();
        assert_eq!(retried.status, JobStatus::Pending);
        assert_eq!(retried.retry_attempts, 0);
        assert!(retried.last_retry_time.is_some());

        let done = wait_until_terminal(&orchestrator, view.id).await;
        assert_eq!(done.status, JobStatus::Completed);

        let err = orchestrator.retry(view.id).unwrap_err();
        assert!(matches!(err, ServiceError::BadRequest(_)));
    }

    #[tokio::test]
    async fn cancel_and_retry_follow_state_machine_edges() {
        use JobStatus::*;

        for status in [Pending, Processing, Retrying, Completed, Failed] {
            let store = Arc::new(InMemoryIngestionJobStore::new());
            let (orchestrator, scheduler) = orchestrator(
                store.clone(),
                ScriptedOutcomeSource::always(Outcome::Success),
                OrchestratorConfig::default(),
            );
            let mut job = IngestionJob::new(document_request(), UserId::new());
            job.status = status;
            let job = store.create(job).unwrap();

            let canceled = orchestrator.cancel(job.id);
            assert_eq!(canceled.is_ok(), matches!(status, Pending | Processing | Retrying));

            store.save(&IngestionJob { status, ..job.clone() }).unwrap();
            let retried = orchestrator.retry(job.id);
            assert_eq!(retried.is_ok(), status == Failed);
            if status != Failed {
                assert!(matches!(retried, Err(ServiceError::BadRequest(_))));
            }
            scheduler.cancel(job.id);
        }
    }

    #[tokio::test]
    async fn batch_preserves_order_and_stops_at_first_error() {
        let store = Arc::new(InMemoryIngestionJobStore::new());
        let (orchestrator, _) = orchestrator(
            store.clone(),
            ScriptedOutcomeSource::always(Outcome::Success),
            OrchestratorConfig::default(),
        );
        let user = UserId::new();
        let names = ["a", "b", "c"];

        let views = orchestrator
            .batch_trigger(
                names
                    .iter()
                    .map(|n| IngestionRequest::new(*n, JobType::Api, SourceType::Text).with_content("x"))
                    .collect(),
                user,
            )
            .unwrap();
        assert_eq!(views.iter().map(|v| v.name.as_str()).collect::<Vec<_>>(), names);

        let err = orchestrator
            .batch_trigger(
                vec![
                    IngestionRequest::new("d", JobType::Api, SourceType::Text).with_content("x"),
                    IngestionRequest::new("", JobType::Api, SourceType::Text).with_content("x"),
                    IngestionRequest::new("f", JobType::Api, SourceType::Text).with_content("x"),
                ],
                user,
            )
            .unwrap_err();
        assert!(matches!(err, ServiceError::BadRequest(_)));
        assert_eq!(store.find_many(&JobFilter::for_user(user)).unwrap().len(), 4);
    }

    #[tokio::test]
    async fn list_and_stats_by_owner() {
        let (orchestrator, _) = orchestrator(
            Arc::new(InMemoryIngestionJobStore::new()),
            ScriptedOutcomeSource::always(Outcome::permanent()),
            OrchestratorConfig::default(),
        );
        let alice = UserId::new();
        let bob = UserId::new();

        let a = orchestrator.trigger(document_request(), alice).unwrap();
        let b = orchestrator.trigger(document_request(), bob).unwrap();
        wait_until_terminal(&orchestrator, a.id).await;
        wait_until_terminal(&orchestrator, b.id).await;

        let mine = orchestrator.list_jobs(&JobFilter::for_user(alice)).unwrap();
        assert_eq!(mine.len(), 1);
        assert_eq!(mine[0].id, a.id);

        let failed = orchestrator
            .list_jobs(&JobFilter::default().with_status(JobStatus::Failed))
            .unwrap();
        assert_eq!(failed.len(), 2);

        let stats = orchestrator.stats(Some(alice)).unwrap();
        assert_eq!(stats.failed, 1);
        assert_eq!(stats.total(), 1);
        assert_eq!(orchestrator.stats(None).unwrap().total(), 2);
    }

    #[tokio::test]
    async fn unexpected_store_failure_is_recorded_on_the_job() {
        // Save #1 marks PROCESSING, save #2 (the outcome) fails.
        let store = Arc::new(FlakyStore {
            inner: InMemoryIngestionJobStore::new(),
            saves: AtomicUsize::new(0),
            fail_on: 2,
        });
        let (orchestrator, _) = orchestrator(
            store,
            ScriptedOutcomeSource::always(Outcome::Success),
            OrchestratorConfig::default(),
        );

        let view = orchestrator.trigger(document_request(), UserId::new()).unwrap();
        let done = wait_until_terminal(&orchestrator, view.id).await;

        assert_eq!(done.status, JobStatus::Failed);
        assert!(done.document_id.is_none());
        let details = done.error_details.unwrap();
        assert_eq!(details.category, ErrorCategory::Unknown);
        assert!(details.trace.is_some());
        assert!(details.description.contains("disk full"));
    }
}
