use std::any::Any;
use std::panic::AssertUnwindSafe;

use flowlink_core::error::{Error, Result};
use flowlink_core::function::Context;
use flowlink_core::TaskId;
use futures::FutureExt;
use tokio::sync::mpsc::UnboundedSender;

use crate::runtime::worker::runnable::Runnable;
use crate::runtime::TaskEvent;

/// One vertex instance: open, run, close, then report
pub(crate) struct JobTask {
    context: Context,
    runnable: Box<dyn Runnable>,
    event_sender: UnboundedSender<TaskEvent>,
}

impl JobTask {
    pub fn new(
        context: Context,
        runnable: Box<dyn Runnable>,
        event_sender: UnboundedSender<TaskEvent>,
    ) -> Self {
        JobTask {
            context,
            runnable,
            event_sender,
        }
    }

    pub fn task_id(&self) -> TaskId {
        self.context.task_id
    }

    pub fn vertex_name(&self) -> &str {
        self.context.vertex_name.as_str()
    }

    pub async fn run(mut self) {
        let task_id = self.context.task_id;
        let rt = match AssertUnwindSafe(self.run0()).catch_unwind().await {
            Ok(rt) => rt,
            Err(panic) => Err(Error::processing(
                self.context.vertex_name.as_str(),
                task_id.task_number,
                format!("task panicked. {}", panic_message(panic.as_ref())),
            )),
        };

        let event = match rt {
            Ok(_) => TaskEvent::Finished { task_id },
            Err(error) => {
                if error.is_cancelled() {
                    info!("task {} `{}` cancelled", task_id, self.context.vertex_name);
                } else {
                    error!(
                        "task {} `{}` failed. {}",
                        task_id, self.context.vertex_name, error
                    );
                }
                TaskEvent::Failed { task_id, error }
            }
        };

        // reported before the channels of the runnable are dropped, panics included,
        // so the cause precedes the failures it provokes in the neighbours
        if self.event_sender.send(event).is_err() {
            warn!("task {} event dropped, the job monitor is gone", task_id);
        }
    }

    async fn run0(&mut self) -> Result<()> {
        let task_id = self.context.task_id;

        info!("open job task {} `{}`", task_id, self.context.vertex_name);
        self.runnable.open(&self.context).await?;

        info!("run job task {} `{}`", task_id, self.context.vertex_name);
        let rt = self.runnable.run().await;

        info!("close job task {} `{}`", task_id, self.context.vertex_name);
        let close_rt = self.runnable.close().await;

        match (rt, close_rt) {
            (Err(e), Err(close_e)) => {
                warn!("close job task {} error. {}", task_id, close_e);
                Err(e)
            }
            (Err(e), Ok(_)) => Err(e),
            (Ok(_), close_rt) => close_rt,
        }
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> &str {
    if let Some(message) = panic.downcast_ref::<&str>() {
        *message
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.as_str()
    } else {
        "unknown panic"
    }
}
