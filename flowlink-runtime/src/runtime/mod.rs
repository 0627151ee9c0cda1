pub mod coordinator;
pub(crate) mod worker;

use flowlink_core::error::Error;
use flowlink_core::TaskId;

pub use coordinator::job_handle::{JobFailure, JobHandle, JobOutcome, JobSummary};
pub use coordinator::JobCoordinator;

/// Reported by every task exactly once, when it terminates
#[derive(Debug)]
pub(crate) enum TaskEvent {
    Finished { task_id: TaskId },
    Failed { task_id: TaskId, error: Error },
}

impl TaskEvent {
    pub fn task_id(&self) -> TaskId {
        match self {
            TaskEvent::Finished { task_id } => *task_id,
            TaskEvent::Failed { task_id, .. } => *task_id,
        }
    }
}
