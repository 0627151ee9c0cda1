use flowlink_core::error::Error;
use tokio::sync::mpsc::UnboundedSender;

use crate::runtime::worker::job_task::JobTask;
use crate::runtime::TaskEvent;

pub(crate) mod io;
pub(crate) mod job_task;
pub(crate) mod runnable;

/// Runs the tasks allocated to one worker
pub(crate) struct WorkerTask {
    worker_id: String,
    tasks: Vec<JobTask>,
    event_sender: UnboundedSender<TaskEvent>,
}

impl WorkerTask {
    pub fn new(worker_id: &str, event_sender: UnboundedSender<TaskEvent>) -> Self {
        WorkerTask {
            worker_id: worker_id.to_string(),
            tasks: Vec::new(),
            event_sender,
        }
    }

    pub fn worker_id(&self) -> &str {
        self.worker_id.as_str()
    }

    pub fn add_task(&mut self, task: JobTask) {
        self.tasks.push(task);
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// spawn every task in allocation order and wait for all of them
    pub async fn run(self) {
        info!(
            "worker {} start with {} tasks",
            self.worker_id,
            self.tasks.len()
        );

        let mut join_handles = Vec::with_capacity(self.tasks.len());
        for task in self.tasks {
            let task_id = task.task_id();
            let vertex_name = task.vertex_name().to_string();
            join_handles.push((task_id, vertex_name, tokio::spawn(task.run())));
        }

        for (task_id, vertex_name, join_handle) in join_handles {
            if let Err(e) = join_handle.await {
                // the task caught panics of its runnable, this one escaped the reporting
                error!("task {} `{}` panicked. {}", task_id, vertex_name, e);
                let error = Error::processing(
                    vertex_name.as_str(),
                    task_id.task_number,
                    format!("task panicked. {}", e),
                );
                if self
                    .event_sender
                    .send(TaskEvent::Failed { task_id, error })
                    .is_err()
                {
                    warn!("task {} event dropped, the job monitor is gone", task_id);
                }
            }
        }

        info!("worker {} end", self.worker_id);
    }
}
