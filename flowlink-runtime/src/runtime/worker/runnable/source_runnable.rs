use flowlink_core::error::{Error, Result};
use flowlink_core::function::{Context, Function, InputFormat};
use flowlink_core::metrics::register_counter;
use metrics::Counter;

use crate::runtime::worker::io::Output;
use crate::runtime::worker::runnable::{function_error, metric_tags, opened, Runnable};

pub(crate) struct SourceRunnable {
    input_format: Box<dyn InputFormat>,
    output: Output,

    context: Option<Context>,
    counter: Counter,
}

impl SourceRunnable {
    pub fn new(input_format: Box<dyn InputFormat>, output: Output) -> Self {
        SourceRunnable {
            input_format,
            output,
            context: None,
            counter: Counter::noop(),
        }
    }
}

#[async_trait]
impl Runnable for SourceRunnable {
    async fn open(&mut self, context: &Context) -> Result<()> {
        self.context = Some(context.clone());
        self.counter = register_counter("Source.Emit", metric_tags(context));

        self.input_format
            .open(context)
            .await
            .map_err(|e| function_error(context, e))?;
        info!(
            "source `{}` ({}) opened",
            context.vertex_name,
            self.input_format.name()
        );
        Ok(())
    }

    async fn run(&mut self) -> Result<()> {
        let context = opened(&self.context)?;

        loop {
            let next = tokio::select! {
                biased;
                _ = context.cancel.cancelled() => return Err(Error::Cancelled),
                next = self.input_format.next() => next,
            };

            match next.map_err(|e| function_error(context, e))? {
                Some(item) => {
                    self.output.emit(item).await?;
                    self.counter.increment(1);
                }
                None => break,
            }
        }

        self.output.end().await
    }

    async fn close(&mut self) -> Result<()> {
        let rt = self.input_format.close().await;
        match &self.context {
            Some(context) => rt.map_err(|e| function_error(context, e)),
            None => rt.map_err(Error::from),
        }
    }
}
