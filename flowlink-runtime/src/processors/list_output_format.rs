use flowlink_core::error::Error;
use flowlink_core::function::{Context, OutputFormat};
use flowlink_core::item::Item;
use tokio_util::sync::CancellationToken;

use crate::storage::list::{ListHandle, ListStore, TListStore};

/// Appends every item to a list. `write` returns once the store acknowledged the append.
#[derive(Function)]
pub struct ListOutputFormat {
    store: ListStore,
    list_name: String,

    handle: Option<ListHandle>,
    cancel: CancellationToken,
}

impl ListOutputFormat {
    pub fn new(store: ListStore, list_name: &str) -> Self {
        ListOutputFormat {
            store,
            list_name: list_name.to_string(),
            handle: None,
            cancel: CancellationToken::new(),
        }
    }
}

#[async_trait]
impl OutputFormat for ListOutputFormat {
    async fn open(&mut self, context: &Context) -> anyhow::Result<()> {
        let handle = self.store.create_or_get(self.list_name.as_str()).await?;
        self.handle = Some(handle);
        self.cancel = context.cancel.clone();

        info!(
            "list sink `{}` opened, task {}/{}",
            self.list_name,
            context.task_number(),
            context.num_tasks()
        );
        Ok(())
    }

    async fn write(&mut self, item: Item) -> anyhow::Result<()> {
        // nothing lands in the list once the job is cancelled
        if self.cancel.is_cancelled() {
            return Err(Error::Cancelled.into());
        }

        let handle = match &self.handle {
            Some(handle) => handle,
            None => return Err(anyhow!("list sink `{}` is not opened", self.list_name)),
        };
        self.store.append(handle, item).await?;
        Ok(())
    }

    async fn close(&mut self) -> anyhow::Result<()> {
        self.handle = None;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use flowlink_core::error::Error;
    use flowlink_core::function::{Context, OutputFormat};
    use flowlink_core::item::Item;
    use flowlink_core::properties::Properties;
    use flowlink_core::{JobId, TaskId};
    use tokio_util::sync::CancellationToken;

    use crate::processors::list_output_format::ListOutputFormat;
    use crate::storage::list::mem_list_storage::MemoryListStore;
    use crate::storage::list::{ListStore, TListStore};

    #[tokio::test]
    pub async fn write_until_cancelled_test() {
        let store = ListStore::memory(MemoryListStore::new());
        let cancel = CancellationToken::new();
        let context = Context {
            job_id: JobId(0),
            job_name: "test".to_string(),
            vertex_name: "sink".to_string(),
            task_id: TaskId::default(),
            properties: Arc::new(Properties::new()),
            cancel: cancel.clone(),
        };

        let mut output_format = ListOutputFormat::new(store.clone(), "sink");
        output_format.open(&context).await.unwrap();
        output_format.write(Item::from("0")).await.unwrap();
        output_format.write(Item::from("1")).await.unwrap();

        cancel.cancel();
        let e = output_format.write(Item::from("2")).await.unwrap_err();
        assert!(e.downcast_ref::<Error>().unwrap().is_cancelled());
        output_format.close().await.unwrap();

        let handle = store.create_or_get("sink").await.unwrap();
        assert_eq!(
            store.read(&handle, 0, 10).await.unwrap(),
            vec![Item::from("0"), Item::from("1")]
        );
    }
}
