//! Detached background execution keyed by job id.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use tokio::runtime::{Handle, TryCurrentError};
use tokio::task::AbortHandle;
use tracing::debug;

use docvault_core::JobId;

/// A unit of background work.
pub type BoxTask = Pin<Box<dyn Future<Output = ()> + Send + 'static>>;

/// Fire-and-forget task submission.
///
/// Submitting never blocks on the task. Several tasks may be live for the
/// same key at once; nothing serializes them.
pub trait TaskScheduler: Send + Sync {
    fn submit(&self, key: JobId, task: BoxTask) {
        self.submit_after(key, Duration::ZERO, task);
    }

    /// Run `task` once `delay` has elapsed.
    fn submit_after(&self, key: JobId, delay: Duration, task: BoxTask);

    /// Abort every live task for `key`, whether still waiting or running.
    /// Returns whether anything was aborted.
    fn cancel(&self, key: JobId) -> bool;

    /// Number of live tasks.
    fn pending(&self) -> usize;
}

type TaskTable = HashMap<u64, (JobId, AbortHandle)>;

/// Removes a task's table entry when its future is dropped: on completion,
/// panic, or abort.
struct TaskEntry {
    tasks: Arc<Mutex<TaskTable>>,
    task_id: u64,
}

impl Drop for TaskEntry {
    fn drop(&mut self) {
        self.tasks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&self.task_id);
    }
}

/// [`TaskScheduler`] spawning detached tasks on a tokio runtime.
#[derive(Debug)]
pub struct TokioTaskScheduler {
    runtime: Handle,
    tasks: Arc<Mutex<TaskTable>>,
    next_id: AtomicU64,
}

impl TokioTaskScheduler {
    pub fn new(runtime: Handle) -> Self {
        Self {
            runtime,
            tasks: Arc::new(Mutex::new(HashMap::new())),
            next_id: AtomicU64::new(0),
        }
    }

    /// Bind to the runtime the caller is running on.
    pub fn try_current() -> Result<Self, TryCurrentError> {
        Handle::try_current().map(Self::new)
    }
}

impl TaskScheduler for TokioTaskScheduler {
    fn submit_after(&self, key: JobId, delay: Duration, task: BoxTask) {
        let task_id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let tasks = Arc::clone(&self.tasks);

        // The table lock is held across spawn so the task's own cleanup
        // cannot run before its entry is inserted.
        let mut table = self.tasks.lock().unwrap_or_else(PoisonError::into_inner);
        let handle = self.runtime.spawn(async move {
            let _entry = TaskEntry { tasks, task_id };
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
            task.await;
        });
        table.insert(task_id, (key, handle.abort_handle()));
        debug!(job_id = %key, task_id, delay_ms = delay.as_millis() as u64, "task submitted");
    }

    fn cancel(&self, key: JobId) -> bool {
        let doomed: Vec<AbortHandle> = {
            let mut table = self.tasks.lock().unwrap_or_else(PoisonError::into_inner);
            let ids: Vec<u64> = table
                .iter()
                .filter(|(_, (job_id, _))| *job_id == key)
                .map(|(id, _)| *id)
                .collect();
            ids.iter()
                .filter_map(|id| table.remove(id))
                .map(|(_, abort)| abort)
                .collect()
        };

        // Aborted futures drop their `TaskEntry`, which takes the table lock.
        for abort in &doomed {
            abort.abort();
        }
        if !doomed.is_empty() {
            debug!(job_id = %key, aborted = doomed.len(), "tasks canceled");
        }
        !doomed.is_empty()
    }

    fn pending(&self) -> usize {
        self.tasks.lock().unwrap_or_else(PoisonError::into_inner).len()
    }
}
