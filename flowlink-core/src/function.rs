use std::fmt::{Debug, Display, Formatter};
use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::item::Item;
use crate::properties::Properties;
use crate::{JobId, TaskId};

/// Runtime context handed to every function instance on `open`
#[derive(Clone, Debug)]
pub struct Context {
    pub job_id: JobId,
    pub job_name: String,
    pub vertex_name: String,
    pub task_id: TaskId,
    pub properties: Arc<Properties>,
    pub cancel: CancellationToken,
}

impl Context {
    pub fn task_number(&self) -> u16 {
        self.task_id.task_number
    }

    pub fn num_tasks(&self) -> u16 {
        self.task_id.num_tasks
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }
}

/// Base trait of every vertex function
pub trait Function {
    fn name(&self) -> &str;
}

/// Source side of a pipeline. A bounded reader: `next` returns `None` once exhausted.
#[async_trait]
pub trait InputFormat: Function + Send {
    async fn open(&mut self, context: &Context) -> anyhow::Result<()>;

    async fn next(&mut self) -> anyhow::Result<Option<Item>>;

    async fn close(&mut self) -> anyhow::Result<()>;
}

/// Stateless item to item transformation
#[async_trait]
pub trait MapFunction: Function + Send {
    async fn open(&mut self, _context: &Context) -> anyhow::Result<()> {
        Ok(())
    }

    async fn map(&mut self, item: Item) -> anyhow::Result<Item>;

    async fn close(&mut self) -> anyhow::Result<()> {
        Ok(())
    }
}

/// Sink side of a pipeline. `write` returns once the item is committed.
#[async_trait]
pub trait OutputFormat: Function + Send {
    async fn open(&mut self, context: &Context) -> anyhow::Result<()>;

    async fn write(&mut self, item: Item) -> anyhow::Result<()>;

    async fn close(&mut self) -> anyhow::Result<()>;
}

pub type InputFormatFactory = dyn Fn() -> Box<dyn InputFormat> + Send + Sync;
pub type MapFunctionFactory = dyn Fn() -> Box<dyn MapFunction> + Send + Sync;
pub type OutputFormatFactory = dyn Fn() -> Box<dyn OutputFormat> + Send + Sync;

#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub enum VertexKind {
    Source,
    Map,
    Sink,
}

impl Display for VertexKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            VertexKind::Source => write!(f, "Source"),
            VertexKind::Map => write!(f, "Map"),
            VertexKind::Sink => write!(f, "Sink"),
        }
    }
}

/// The processing logic of a vertex. Holds a factory so that every
/// parallel instance owns its own function object.
#[derive(Clone)]
pub enum Processor {
    Source(Arc<InputFormatFactory>),
    Map(Arc<MapFunctionFactory>),
    Sink(Arc<OutputFormatFactory>),
}

impl Processor {
    pub fn source<F, T>(factory: F) -> Self
    where
        F: Fn() -> T + Send + Sync + 'static,
        T: InputFormat + 'static,
    {
        Processor::Source(Arc::new(move || {
            let f: Box<dyn InputFormat> = Box::new(factory());
            f
        }))
    }

    pub fn map<F, T>(factory: F) -> Self
    where
        F: Fn() -> T + Send + Sync + 'static,
        T: MapFunction + 'static,
    {
        Processor::Map(Arc::new(move || {
            let f: Box<dyn MapFunction> = Box::new(factory());
            f
        }))
    }

    pub fn sink<F, T>(factory: F) -> Self
    where
        F: Fn() -> T + Send + Sync + 'static,
        T: OutputFormat + 'static,
    {
        Processor::Sink(Arc::new(move || {
            let f: Box<dyn OutputFormat> = Box::new(factory());
            f
        }))
    }

    pub fn kind(&self) -> VertexKind {
        match self {
            Processor::Source(_) => VertexKind::Source,
            Processor::Map(_) => VertexKind::Map,
            Processor::Sink(_) => VertexKind::Sink,
        }
    }
}

impl Debug for Processor {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "Processor::{}", self.kind())
    }
}
