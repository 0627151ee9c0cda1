use std::fmt::{Display, Formatter};
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use flowlink_core::error::Error;
use flowlink_core::job::{AtomicJobStatus, JobStatus};
use flowlink_core::{JobId, TaskId};
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

pub type JobOutcome = Result<JobSummary, JobFailure>;

#[derive(Clone, Debug)]
pub struct JobSummary {
    pub job_id: JobId,
    pub job_name: String,
    pub elapsed: Duration,
    pub num_tasks: usize,
}

impl Display for JobSummary {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} `{}` completed {} tasks in {:?}",
            self.job_id, self.job_name, self.num_tasks, self.elapsed
        )
    }
}

/// The cause of a failed job: the first non cancellation error and the task raising it
#[derive(Clone, Debug)]
pub struct JobFailure {
    pub task_id: Option<TaskId>,
    pub vertex: Option<String>,
    pub error: Arc<Error>,
}

impl JobFailure {
    pub fn new(task_id: TaskId, vertex: &str, error: Error) -> Self {
        JobFailure {
            task_id: Some(task_id),
            vertex: Some(vertex.to_string()),
            error: Arc::new(error),
        }
    }

    /// aborted by `JobHandle::cancel`, no task failed
    pub fn cancelled() -> Self {
        JobFailure {
            task_id: None,
            vertex: None,
            error: Arc::new(Error::Cancelled),
        }
    }

    pub fn error(&self) -> &Error {
        self.error.as_ref()
    }

    pub fn is_cancelled(&self) -> bool {
        self.error.is_cancelled()
    }
}

impl Display for JobFailure {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match (&self.vertex, &self.task_id) {
            (Some(vertex), Some(task_id)) => {
                write!(f, "job failed at `{}` task {}. {}", vertex, task_id, self.error)
            }
            _ => write!(f, "job failed. {}", self.error),
        }
    }
}

impl std::error::Error for JobFailure {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(self.error.as_ref())
    }
}

/// Handle of a submitted job. Cheap to clone, every clone observes the same job.
#[derive(Clone)]
pub struct JobHandle {
    job_id: JobId,
    job_name: String,
    status: Arc<AtomicJobStatus>,
    cancel: CancellationToken,
    outcome: watch::Receiver<Option<JobOutcome>>,
}

impl JobHandle {
    pub(crate) fn new(
        job_id: JobId,
        job_name: &str,
        status: Arc<AtomicJobStatus>,
        cancel: CancellationToken,
        outcome: watch::Receiver<Option<JobOutcome>>,
    ) -> Self {
        JobHandle {
            job_id,
            job_name: job_name.to_string(),
            status,
            cancel,
            outcome,
        }
    }

    pub fn job_id(&self) -> JobId {
        self.job_id
    }

    pub fn job_name(&self) -> &str {
        self.job_name.as_str()
    }

    pub fn status(&self) -> JobStatus {
        self.status.load(Ordering::SeqCst)
    }

    /// Abort the job. `join` then resolves with a `Cancelled` failure,
    /// unless a task failed first or every task had already finished.
    pub fn cancel(&self) {
        if !self.cancel.is_cancelled() {
            info!("cancel {} `{}`", self.job_id, self.job_name);
            self.cancel.cancel();
        }
    }

    /// Wait for the job to terminate. Resolves only once every task terminated.
    pub async fn join(&self) -> JobOutcome {
        let mut outcome = self.outcome.clone();
        loop {
            let current = outcome.borrow().clone();
            if let Some(current) = current {
                return current;
            }

            if outcome.changed().await.is_err() {
                let current = outcome.borrow().clone();
                return current.unwrap_or_else(|| {
                    Err(JobFailure {
                        task_id: None,
                        vertex: None,
                        error: Arc::new(Error::from(anyhow!("job monitor is gone"))),
                    })
                });
            }
        }
    }

    /// `None` when the job is still running after `timeout`
    pub async fn join_timeout(&self, timeout: Duration) -> Option<JobOutcome> {
        tokio::time::timeout(timeout, self.join()).await.ok()
    }
}

impl std::fmt::Debug for JobHandle {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JobHandle")
            .field("job_id", &self.job_id)
            .field("job_name", &self.job_name)
            .field("status", &self.status())
            .finish()
    }
}
