//! Shared named lists. Ordered, append only, observable.

pub mod mem_list_storage;
pub mod remote_list_storage;

use std::collections::VecDeque;
use std::fmt::{Debug, Formatter};
use std::sync::Arc;

use flowlink_core::cluster::ClientConfig;
use flowlink_core::error::Result;
use flowlink_core::item::Item;
use futures::stream::BoxStream;
use futures::StreamExt;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::storage::list::mem_list_storage::MemoryListStore;
use crate::storage::list::remote_list_storage::RemoteListStore;

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ListHandle {
    name: String,
}

impl ListHandle {
    pub(crate) fn new(name: &str) -> Self {
        ListHandle {
            name: name.to_string(),
        }
    }

    pub fn name(&self) -> &str {
        self.name.as_str()
    }
}

/// An item appended to a list, `index` is its position in the list
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ItemEvent {
    pub list_name: String,
    pub index: u64,
    pub item: Item,
}

/// Callback of a list subscription. Closures `Fn(ItemEvent)` are listeners too.
pub trait ItemListener: Send + Sync + 'static {
    fn item_added(&self, event: ItemEvent);
}

impl<F> ItemListener for F
where
    F: Fn(ItemEvent) + Send + Sync + 'static,
{
    fn item_added(&self, event: ItemEvent) {
        self(event)
    }
}

/// A live registration of an `ItemListener`.
/// Dropping it keeps the listener registered, `unsubscribe` releases it.
pub struct ListSubscription {
    list_name: String,
    cancel: CancellationToken,
    join_handle: Option<JoinHandle<()>>,
}

impl ListSubscription {
    pub(crate) fn new(list_name: &str, cancel: CancellationToken, join_handle: JoinHandle<()>) -> Self {
        ListSubscription {
            list_name: list_name.to_string(),
            cancel,
            join_handle: Some(join_handle),
        }
    }

    pub fn list_name(&self) -> &str {
        self.list_name.as_str()
    }

    /// No callback is invoked after this returns
    pub async fn unsubscribe(mut self) {
        self.cancel.cancel();
        if let Some(join_handle) = self.join_handle.take() {
            if let Err(e) = join_handle.await {
                error!("subscription dispatcher of `{}` error. {}", self.list_name, e);
            }
        }
    }
}

impl Debug for ListSubscription {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ListSubscription")
            .field("list_name", &self.list_name)
            .field("cancelled", &self.cancel.is_cancelled())
            .finish()
    }
}

#[async_trait]
pub trait TListStore: Send + Sync {
    /// get the list, creating an empty one when absent. never overwrites items
    async fn create_or_get(&self, name: &str) -> Result<ListHandle>;

    /// append to the tail of the list, return the index of the item
    async fn append(&self, handle: &ListHandle, item: Item) -> Result<u64>;

    /// append contiguously, return the index of the first item
    async fn append_all(&self, handle: &ListHandle, items: Vec<Item>) -> Result<u64>;

    async fn size(&self, handle: &ListHandle) -> Result<u64>;

    /// read at most `limit` items from `offset`
    async fn read(&self, handle: &ListHandle, offset: u64, limit: usize) -> Result<Vec<Item>>;

    /// `listener` is invoked once per item appended after the registration, in append order
    async fn subscribe(
        &self,
        handle: &ListHandle,
        listener: Arc<dyn ItemListener>,
    ) -> Result<ListSubscription>;
}

#[derive(Clone)]
pub enum ListStore {
    Memory(MemoryListStore),
    Remote(RemoteListStore),
}

impl ListStore {
    pub fn memory(store: MemoryListStore) -> Self {
        ListStore::Memory(store)
    }

    /// lists hosted by a member in another process, connected lazily
    pub fn remote(client_config: ClientConfig) -> Self {
        ListStore::Remote(RemoteListStore::new(client_config))
    }

    /// Lazy, finite iteration from position 0 up to the size observed by the first poll.
    /// Call again to restart.
    pub fn iterate(&self, handle: &ListHandle, page_size: usize) -> BoxStream<'static, Result<Item>> {
        self.iterate0(handle, None, page_size)
    }

    /// Lazy iteration over the first `end` items, a snapshot size taken by the caller
    pub fn iterate_to(
        &self,
        handle: &ListHandle,
        end: u64,
        page_size: usize,
    ) -> BoxStream<'static, Result<Item>> {
        self.iterate0(handle, Some(end), page_size)
    }

    fn iterate0(
        &self,
        handle: &ListHandle,
        end: Option<u64>,
        page_size: usize,
    ) -> BoxStream<'static, Result<Item>> {
        let state = IterState {
            store: self.clone(),
            handle: handle.clone(),
            page_size: page_size.max(1),
            offset: 0,
            end,
            buffer: VecDeque::new(),
        };

        futures::stream::unfold(state, |mut state| async move {
            match state.next().await {
                Ok(Some(item)) => Some((Ok(item), state)),
                Ok(None) => None,
                Err(e) => {
                    // stop after the first error
                    state.end = Some(0);
                    state.offset = 0;
                    state.buffer.clear();
                    Some((Err(e), state))
                }
            }
        })
        .boxed()
    }
}

struct IterState {
    store: ListStore,
    handle: ListHandle,
    page_size: usize,
    offset: u64,
    end: Option<u64>,
    buffer: VecDeque<Item>,
}

impl IterState {
    async fn next(&mut self) -> Result<Option<Item>> {
        let end = match self.end {
            Some(end) => end,
            None => {
                let end = self.store.size(&self.handle).await?;
                self.end = Some(end);
                end
            }
        };

        if let Some(item) = self.buffer.pop_front() {
            return Ok(Some(item));
        }
        if self.offset >= end {
            return Ok(None);
        }

        let limit = ((end - self.offset) as usize).min(self.page_size);
        let items = self.store.read(&self.handle, self.offset, limit).await?;
        if items.is_empty() {
            return Ok(None);
        }

        self.offset += items.len() as u64;
        self.buffer.extend(items);
        Ok(self.buffer.pop_front())
    }
}

#[async_trait]
impl TListStore for ListStore {
    async fn create_or_get(&self, name: &str) -> Result<ListHandle> {
        match self {
            ListStore::Memory(store) => store.create_or_get(name).await,
            ListStore::Remote(store) => store.create_or_get(name).await,
        }
    }

    async fn append(&self, handle: &ListHandle, item: Item) -> Result<u64> {
        match self {
            ListStore::Memory(store) => store.append(handle, item).await,
            ListStore::Remote(store) => store.append(handle, item).await,
        }
    }

    async fn append_all(&self, handle: &ListHandle, items: Vec<Item>) -> Result<u64> {
        match self {
            ListStore::Memory(store) => store.append_all(handle, items).await,
            ListStore::Remote(store) => store.append_all(handle, items).await,
        }
    }

    async fn size(&self, handle: &ListHandle) -> Result<u64> {
        match self {
            ListStore::Memory(store) => store.size(handle).await,
            ListStore::Remote(store) => store.size(handle).await,
        }
    }

    async fn read(&self, handle: &ListHandle, offset: u64, limit: usize) -> Result<Vec<Item>> {
        match self {
            ListStore::Memory(store) => store.read(handle, offset, limit).await,
            ListStore::Remote(store) => store.read(handle, offset, limit).await,
        }
    }

    async fn subscribe(
        &self,
        handle: &ListHandle,
        listener: Arc<dyn ItemListener>,
    ) -> Result<ListSubscription> {
        match self {
            ListStore::Memory(store) => store.subscribe(handle, listener).await,
            ListStore::Remote(store) => store.subscribe(handle, listener).await,
        }
    }
}

impl Debug for ListStore {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            ListStore::Memory(_) => write!(f, "ListStore::Memory"),
            ListStore::Remote(store) => write!(f, "ListStore::Remote({:?})", store.addresses()),
        }
    }
}

#[cfg(test)]
mod tests {
    use futures::StreamExt;

    use flowlink_core::item::Item;

    use crate::storage::list::mem_list_storage::MemoryListStore;
    use crate::storage::list::{ListStore, TListStore};

    #[tokio::test]
    pub async fn iterate_paged_test() {
        let store = ListStore::memory(MemoryListStore::new());
        let handle = store.create_or_get("numbers").await.unwrap();
        let items: Vec<Item> = (0..10).map(Item::from).collect();
        store.append_all(&handle, items.clone()).await.unwrap();

        let read: Vec<Item> = store
            .iterate(&handle, 3)
            .map(|r| r.unwrap())
            .collect()
            .await;
        assert_eq!(read, items);

        // restart from position 0
        let read: Vec<Item> = store
            .iterate(&handle, 4)
            .map(|r| r.unwrap())
            .collect()
            .await;
        assert_eq!(read.len(), 10);
    }

    #[tokio::test]
    pub async fn iterate_bounded_by_snapshot_test() {
        let store = ListStore::memory(MemoryListStore::new());
        let handle = store.create_or_get("growing").await.unwrap();
        store.append(&handle, Item::from(0)).await.unwrap();
        store.append(&handle, Item::from(1)).await.unwrap();

        let mut iter = store.iterate(&handle, 1);
        assert_eq!(iter.next().await.unwrap().unwrap(), Item::from(0));

        // appended after the iteration started
        store.append(&handle, Item::from(2)).await.unwrap();
        assert_eq!(iter.next().await.unwrap().unwrap(), Item::from(1));
        assert!(iter.next().await.is_none());
    }

    #[tokio::test]
    pub async fn iterate_empty_test() {
        let store = ListStore::memory(MemoryListStore::new());
        let handle = store.create_or_get("empty").await.unwrap();
        assert!(store.iterate(&handle, 16).next().await.is_none());
    }
}
