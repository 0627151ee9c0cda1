use flowlink_core::error::Result;
use flowlink_core::function::{Context, InputFormat};
use flowlink_core::item::Item;
use flowlink_core::properties::SystemProperties;
use futures::stream::BoxStream;
use futures::StreamExt;

use crate::storage::list::{ListStore, TListStore};

/// Reads the items of a list present at `open`. Instance `n` of `N` owns the
/// items with `index % N == n`.
#[derive(Function)]
pub struct ListInputFormat {
    store: ListStore,
    list_name: String,

    task_number: u64,
    num_tasks: u64,
    index: u64,
    stream: Option<BoxStream<'static, Result<Item>>>,
}

impl ListInputFormat {
    pub fn new(store: ListStore, list_name: &str) -> Self {
        ListInputFormat {
            store,
            list_name: list_name.to_string(),
            task_number: 0,
            num_tasks: 1,
            index: 0,
            stream: None,
        }
    }
}

#[async_trait]
impl InputFormat for ListInputFormat {
    async fn open(&mut self, context: &Context) -> anyhow::Result<()> {
        let handle = self.store.create_or_get(self.list_name.as_str()).await?;
        let page_size = context.properties.get_read_page_size();
        let size = self.store.size(&handle).await?;

        self.task_number = context.task_number() as u64;
        self.num_tasks = context.num_tasks().max(1) as u64;
        self.index = 0;
        self.stream = Some(self.store.iterate_to(&handle, size, page_size));

        info!(
            "list source `{}` opened with {} items, task {}/{}",
            self.list_name, size, self.task_number, self.num_tasks
        );
        Ok(())
    }

    async fn next(&mut self) -> anyhow::Result<Option<Item>> {
        let stream = match self.stream.as_mut() {
            Some(stream) => stream,
            None => return Err(anyhow!("list source `{}` is not opened", self.list_name)),
        };

        while let Some(item) = stream.next().await {
            let item = item?;
            let index = self.index;
            self.index += 1;
            if index % self.num_tasks == self.task_number {
                return Ok(Some(item));
            }
        }

        Ok(None)
    }

    async fn close(&mut self) -> anyhow::Result<()> {
        self.stream = None;
        Ok(())
    }
}
