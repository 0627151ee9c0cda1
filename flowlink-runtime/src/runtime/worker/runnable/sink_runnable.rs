use flowlink_core::error::{Error, Result};
use flowlink_core::function::{Context, Function, OutputFormat};
use flowlink_core::metrics::register_counter;
use metrics::Counter;

use crate::runtime::worker::io::Input;
use crate::runtime::worker::runnable::{function_error, metric_tags, opened, Runnable};

pub(crate) struct SinkRunnable {
    output_format: Box<dyn OutputFormat>,
    input: Input,

    context: Option<Context>,
    counter: Counter,
}

impl SinkRunnable {
    pub fn new(output_format: Box<dyn OutputFormat>, input: Input) -> Self {
        SinkRunnable {
            output_format,
            input,
            context: None,
            counter: Counter::noop(),
        }
    }
}

#[async_trait]
impl Runnable for SinkRunnable {
    async fn open(&mut self, context: &Context) -> Result<()> {
        self.context = Some(context.clone());
        self.counter = register_counter("Sink.Write", metric_tags(context));

        self.output_format
            .open(context)
            .await
            .map_err(|e| function_error(context, e))?;
        info!(
            "sink `{}` ({}) opened",
            context.vertex_name,
            self.output_format.name()
        );
        Ok(())
    }

    async fn run(&mut self) -> Result<()> {
        let context = opened(&self.context)?;

        while let Some(item) = self.input.next().await? {
            // an in-flight write is never aborted, the next one is not started
            if context.is_cancelled() {
                return Err(Error::Cancelled);
            }

            self.output_format
                .write(item)
                .await
                .map_err(|e| function_error(context, e))?;
            self.counter.increment(1);
        }

        Ok(())
    }

    async fn close(&mut self) -> Result<()> {
        let rt = self.output_format.close().await;
        match &self.context {
            Some(context) => rt.map_err(|e| function_error(context, e)),
            None => rt.map_err(Error::from),
        }
    }
}
