use crate::{JobId, TaskId};

#[atomic_enum]
#[derive(Serialize, Deserialize, PartialEq)]
pub enum JobStatus {
    /// Submitted, no task spawned yet
    NotStarted = 0,
    /// Tasks are spawned
    Running = 1,
    /// Every task terminated successfully
    Completed = 2,
    /// One of the tasks failed, or the job was aborted
    Failed = 3,
}

impl Default for JobStatus {
    fn default() -> Self {
        JobStatus::NotStarted
    }
}

impl JobStatus {
    pub fn is_terminal(&self) -> bool {
        match self {
            JobStatus::Completed | JobStatus::Failed => true,
            _ => false,
        }
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            JobStatus::NotStarted => write!(f, "NOT_STARTED"),
            JobStatus::Running => write!(f, "RUNNING"),
            JobStatus::Completed => write!(f, "COMPLETED"),
            JobStatus::Failed => write!(f, "FAILED"),
        }
    }
}

#[derive(Copy, Clone, Serialize, Deserialize, Debug, PartialEq, Eq)]
pub enum TaskStatus {
    Pending,
    Running,
    Finished,
    Failed,
    Cancelled,
}

impl TaskStatus {
    pub fn is_terminated(&self) -> bool {
        match self {
            TaskStatus::Finished | TaskStatus::Failed | TaskStatus::Cancelled => true,
            _ => false,
        }
    }
}

#[derive(Clone, Serialize, Deserialize, Debug)]
pub struct TaskDescriptor {
    pub task_id: TaskId,
    pub vertex_name: String,
    /// the worker the task is allocated to
    pub worker_id: String,
    pub status: TaskStatus,
}

#[derive(Clone, Serialize, Deserialize, Debug)]
pub struct JobDescriptor {
    pub job_id: JobId,
    pub job_name: String,
    pub status: JobStatus,
    pub start_timestamp: u64,
    pub task_descriptors: Vec<TaskDescriptor>,
}

impl JobDescriptor {
    pub fn get_task_descriptor_mut(&mut self, task_id: &TaskId) -> Option<&mut TaskDescriptor> {
        self.task_descriptors
            .iter_mut()
            .find(|task_descriptor| task_descriptor.task_id.eq(task_id))
    }

    pub fn update_task_status(&mut self, task_id: &TaskId, status: TaskStatus) {
        if let Some(task_descriptor) = self.get_task_descriptor_mut(task_id) {
            task_descriptor.status = status;
        }
    }

    pub fn all_terminated(&self) -> bool {
        self.task_descriptors
            .iter()
            .all(|task_descriptor| task_descriptor.status.is_terminated())
    }

    /// Derive the job status from the task statuses.
    /// `Failed` is sticky, `Completed` requires every task `Finished`.
    pub fn flush_job_status(&mut self) {
        if self.status == JobStatus::Failed {
            return;
        }

        let failed = self.task_descriptors.iter().any(|t| {
            t.status == TaskStatus::Failed || t.status == TaskStatus::Cancelled
        });
        if failed {
            self.status = JobStatus::Failed;
        } else if self
            .task_descriptors
            .iter()
            .all(|t| t.status == TaskStatus::Finished)
        {
            self.status = JobStatus::Completed;
        } else {
            self.status = JobStatus::Running;
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::Ordering;

    use crate::job::{AtomicJobStatus, JobDescriptor, JobStatus, TaskDescriptor, TaskStatus};
    use crate::{JobId, TaskId, VertexId};

    fn descriptor() -> JobDescriptor {
        let task_descriptors = (0..2)
            .map(|n| TaskDescriptor {
                task_id: TaskId {
                    vertex_id: VertexId(0),
                    task_number: n,
                    num_tasks: 2,
                },
                vertex_name: "map".to_string(),
                worker_id: "worker_0".to_string(),
                status: TaskStatus::Running,
            })
            .collect();

        JobDescriptor {
            job_id: JobId(1),
            job_name: "test".to_string(),
            status: JobStatus::Running,
            start_timestamp: 0,
            task_descriptors,
        }
    }

    #[test]
    pub fn flush_completed_test() {
        let mut job_descriptor = descriptor();
        let task_ids: Vec<TaskId> = job_descriptor
            .task_descriptors
            .iter()
            .map(|t| t.task_id)
            .collect();

        job_descriptor.update_task_status(&task_ids[0], TaskStatus::Finished);
        job_descriptor.flush_job_status();
        assert_eq!(job_descriptor.status, JobStatus::Running);
        assert!(!job_descriptor.all_terminated());

        job_descriptor.update_task_status(&task_ids[1], TaskStatus::Finished);
        job_descriptor.flush_job_status();
        assert_eq!(job_descriptor.status, JobStatus::Completed);
        assert!(job_descriptor.all_terminated());
    }

    #[test]
    pub fn flush_failed_sticky_test() {
        let mut job_descriptor = descriptor();
        let task_id = job_descriptor.task_descriptors[0].task_id;
        job_descriptor.update_task_status(&task_id, TaskStatus::Failed);
        job_descriptor.flush_job_status();
        assert_eq!(job_descriptor.status, JobStatus::Failed);

        job_descriptor.update_task_status(&task_id, TaskStatus::Finished);
        job_descriptor.flush_job_status();
        assert_eq!(job_descriptor.status, JobStatus::Failed);
    }

    #[test]
    pub fn atomic_status_test() {
        let status = AtomicJobStatus::new(JobStatus::NotStarted);
        status.store(JobStatus::Running, Ordering::SeqCst);
        assert_eq!(status.load(Ordering::SeqCst), JobStatus::Running);
        assert!(!status.load(Ordering::SeqCst).is_terminal());
        assert_eq!(JobStatus::Failed.to_string(), "FAILED");
    }
}
