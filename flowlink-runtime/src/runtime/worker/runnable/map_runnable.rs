use flowlink_core::error::{Error, Result};
use flowlink_core::function::{Context, Function, MapFunction};
use flowlink_core::metrics::register_counter;
use metrics::Counter;

use crate::runtime::worker::io::{Input, Output};
use crate::runtime::worker::runnable::{function_error, metric_tags, opened, Runnable};

pub(crate) struct MapRunnable {
    map_function: Box<dyn MapFunction>,
    input: Input,
    output: Output,

    context: Option<Context>,
    counter: Counter,
}

impl MapRunnable {
    pub fn new(map_function: Box<dyn MapFunction>, input: Input, output: Output) -> Self {
        MapRunnable {
            map_function,
            input,
            output,
            context: None,
            counter: Counter::noop(),
        }
    }
}

#[async_trait]
impl Runnable for MapRunnable {
    async fn open(&mut self, context: &Context) -> Result<()> {
        self.context = Some(context.clone());
        self.counter = register_counter("Map.Process", metric_tags(context));

        self.map_function
            .open(context)
            .await
            .map_err(|e| function_error(context, e))?;
        info!(
            "map `{}` ({}) opened",
            context.vertex_name,
            self.map_function.name()
        );
        Ok(())
    }

    async fn run(&mut self) -> Result<()> {
        let context = opened(&self.context)?;

        while let Some(item) = self.input.next().await? {
            let mapped = tokio::select! {
                biased;
                _ = context.cancel.cancelled() => return Err(Error::Cancelled),
                mapped = self.map_function.map(item) => mapped,
            };

            let mapped = mapped.map_err(|e| function_error(context, e))?;
            self.output.emit(mapped).await?;
            self.counter.increment(1);
        }

        self.output.end().await
    }

    async fn close(&mut self) -> Result<()> {
        let rt = self.map_function.close().await;
        match &self.context {
            Some(context) => rt.map_err(|e| function_error(context, e)),
            None => rt.map_err(Error::from),
        }
    }
}
