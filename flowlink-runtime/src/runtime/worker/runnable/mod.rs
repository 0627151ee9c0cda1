use flowlink_core::error::{Error, Result};
use flowlink_core::function::Context;
use flowlink_core::metrics::Tag;

pub(crate) mod map_runnable;
pub(crate) mod sink_runnable;
pub(crate) mod source_runnable;

pub(crate) use map_runnable::MapRunnable;
pub(crate) use sink_runnable::SinkRunnable;
pub(crate) use source_runnable::SourceRunnable;

/// The processing loop of one vertex instance
#[async_trait]
pub(crate) trait Runnable: Send {
    async fn open(&mut self, context: &Context) -> Result<()>;
    /// returns once the input is exhausted and the end of stream is forwarded
    async fn run(&mut self) -> Result<()>;
    async fn close(&mut self) -> Result<()>;
}

/// Failures raised by a function are processing failures of its instance,
/// unless the function surfaced one of our own errors.
pub(crate) fn function_error(context: &Context, e: anyhow::Error) -> Error {
    match e.downcast::<Error>() {
        Ok(Error::Other(e)) => {
            Error::processing(context.vertex_name.as_str(), context.task_number(), e)
        }
        Ok(e) => e,
        Err(e) => Error::processing(context.vertex_name.as_str(), context.task_number(), e),
    }
}

pub(crate) fn metric_tags(context: &Context) -> Vec<Tag> {
    vec![
        Tag::new("vertex", context.vertex_name.as_str()),
        Tag::new("task_number", context.task_number()),
    ]
}

/// the context handed to `open`, kept for the error reporting of `run`
pub(crate) fn opened(context: &Option<Context>) -> Result<&Context> {
    context
        .as_ref()
        .ok_or_else(|| Error::from(anyhow!("runnable is not opened")))
}
