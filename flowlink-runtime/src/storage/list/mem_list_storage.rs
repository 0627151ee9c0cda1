use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use dashmap::DashMap;
use flowlink_core::error::{Error, Result};
use flowlink_core::item::Item;
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender};
use tokio_util::sync::CancellationToken;

use crate::storage::list::{ItemEvent, ItemListener, ListHandle, ListSubscription, TListStore};

struct ListInner {
    items: Vec<Item>,
    listeners: Vec<(u64, UnboundedSender<ItemEvent>)>,
}

/// One list. Items and listeners share a lock, so listeners observe the append order.
struct NamedList {
    name: String,
    inner: Mutex<ListInner>,
}

impl NamedList {
    fn new(name: &str) -> Self {
        NamedList {
            name: name.to_string(),
            inner: Mutex::new(ListInner {
                items: Vec::new(),
                listeners: Vec::new(),
            }),
        }
    }

    fn lock(&self) -> Result<MutexGuard<ListInner>> {
        self.inner
            .lock()
            .map_err(|e| Error::from(anyhow!("list `{}` lock poisoned. {}", self.name, e)))
    }

    fn append_all(&self, items: Vec<Item>) -> Result<u64> {
        let mut inner = self.lock()?;
        let first_index = inner.items.len() as u64;

        for (offset, item) in items.into_iter().enumerate() {
            let index = first_index + offset as u64;
            if !inner.listeners.is_empty() {
                let event = ItemEvent {
                    list_name: self.name.clone(),
                    index,
                    item: item.clone(),
                };
                // a closed listener is an unsubscribed one
                inner
                    .listeners
                    .retain(|(_id, sender)| sender.send(event.clone()).is_ok());
            }
            inner.items.push(item);
        }

        Ok(first_index)
    }
}

#[derive(Clone)]
pub struct MemoryListStore {
    lists: Arc<DashMap<String, Arc<NamedList>>>,
    subscription_id: Arc<AtomicU64>,
}

impl MemoryListStore {
    pub fn new() -> Self {
        MemoryListStore {
            lists: Arc::new(DashMap::new()),
            subscription_id: Arc::new(AtomicU64::new(0)),
        }
    }

    fn get_or_create(&self, name: &str) -> (Arc<NamedList>, bool) {
        if let Some(list) = self.lists.get(name) {
            return (list.value().clone(), false);
        }

        let mut created = false;
        let list = self
            .lists
            .entry(name.to_string())
            .or_insert_with(|| {
                created = true;
                Arc::new(NamedList::new(name))
            })
            .value()
            .clone();
        (list, created)
    }

    /// return `true` when the list did not exist
    pub fn create(&self, name: &str) -> bool {
        let (_list, created) = self.get_or_create(name);
        if created {
            info!("create list `{}`", name);
        }
        created
    }

    pub fn list_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.lists.iter().map(|e| e.key().clone()).collect();
        names.sort();
        names
    }

    /// Register a raw listener channel. Items from `from_index` to the current tail are
    /// queued first, atomically with the registration, so nothing is missed or repeated.
    pub fn register_listener(
        &self,
        name: &str,
        from_index: Option<u64>,
    ) -> Result<(u64, UnboundedReceiver<ItemEvent>)> {
        let (list, _created) = self.get_or_create(name);
        let id = self.subscription_id.fetch_add(1, Ordering::SeqCst);
        let (sender, receiver) = unbounded_channel();

        let mut inner = list.lock()?;
        if let Some(from_index) = from_index {
            for index in from_index..inner.items.len() as u64 {
                let event = ItemEvent {
                    list_name: list.name.clone(),
                    index,
                    item: inner.items[index as usize].clone(),
                };
                // the receiver is alive until we return it
                let _ = sender.send(event);
            }
        }
        inner.listeners.push((id, sender));

        Ok((id, receiver))
    }

    pub fn unregister_listener(&self, name: &str, id: u64) -> Result<()> {
        if let Some(list) = self.lists.get(name) {
            let mut inner = list.lock()?;
            inner.listeners.retain(|(listener_id, _)| *listener_id != id);
        }
        Ok(())
    }

    /// drop every listener, ending all subscriptions
    pub fn release_listeners(&self) {
        let lists: Vec<Arc<NamedList>> = self.lists.iter().map(|e| e.value().clone()).collect();
        for list in lists {
            if let Err(e) = list.lock().map(|mut inner| inner.listeners.clear()) {
                error!("release listeners error. {}", e);
            }
        }
    }

    pub fn listener_count(&self, name: &str) -> usize {
        let list = match self.lists.get(name) {
            Some(list) => list.value().clone(),
            None => return 0,
        };
        let count = match list.lock() {
            Ok(inner) => inner.listeners.len(),
            Err(_) => 0,
        };
        count
    }

    fn list(&self, handle: &ListHandle) -> Arc<NamedList> {
        // a handle may outlive a store restart, lists are created on demand
        self.get_or_create(handle.name()).0
    }
}

#[async_trait]
impl TListStore for MemoryListStore {
    async fn create_or_get(&self, name: &str) -> Result<ListHandle> {
        self.create(name);
        Ok(ListHandle::new(name))
    }

    async fn append(&self, handle: &ListHandle, item: Item) -> Result<u64> {
        self.list(handle).append_all(vec![item])
    }

    async fn append_all(&self, handle: &ListHandle, items: Vec<Item>) -> Result<u64> {
        self.list(handle).append_all(items)
    }

    async fn size(&self, handle: &ListHandle) -> Result<u64> {
        let list = self.list(handle);
        let inner = list.lock()?;
        Ok(inner.items.len() as u64)
    }

    async fn read(&self, handle: &ListHandle, offset: u64, limit: usize) -> Result<Vec<Item>> {
        let list = self.list(handle);
        let inner = list.lock()?;

        let start = (offset as usize).min(inner.items.len());
        let end = start.saturating_add(limit).min(inner.items.len());
        Ok(inner.items[start..end].to_vec())
    }

    async fn subscribe(
        &self,
        handle: &ListHandle,
        listener: Arc<dyn ItemListener>,
    ) -> Result<ListSubscription> {
        let (id, mut receiver) = self.register_listener(handle.name(), None)?;

        let cancel = CancellationToken::new();
        let dispatcher_cancel = cancel.clone();
        let store = self.clone();
        let list_name = handle.name().to_string();
        let join_handle = tokio::spawn(async move {
            loop {
                let event = tokio::select! {
                    biased;
                    _ = dispatcher_cancel.cancelled() => break,
                    event = receiver.recv() => event,
                };
                match event {
                    Some(event) => listener.item_added(event),
                    None => break,
                }
            }

            if let Err(e) = store.unregister_listener(list_name.as_str(), id) {
                error!("unregister listener {} error. {}", id, e);
            }
            debug!("subscription {} of `{}` stopped", id, list_name);
        });

        Ok(ListSubscription::new(handle.name(), cancel, join_handle))
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    use flowlink_core::item::Item;

    use crate::storage::list::mem_list_storage::MemoryListStore;
    use crate::storage::list::{ItemEvent, TListStore};

    #[tokio::test]
    pub async fn create_or_get_idempotent_test() {
        let store = MemoryListStore::new();
        let handle = store.create_or_get("list").await.unwrap();
        store.append(&handle, Item::from(1)).await.unwrap();

        let again = store.create_or_get("list").await.unwrap();
        assert_eq!(handle, again);
        assert_eq!(store.size(&again).await.unwrap(), 1);
        assert_eq!(store.list_names(), vec!["list".to_string()]);
    }

    #[tokio::test]
    pub async fn append_auto_create_test() {
        let store = MemoryListStore::new();
        let other = MemoryListStore::new();
        let handle = other.create_or_get("late").await.unwrap();

        assert_eq!(store.append(&handle, Item::from("a")).await.unwrap(), 0);
        assert_eq!(store.append(&handle, Item::from("b")).await.unwrap(), 1);
        assert_eq!(
            store.read(&handle, 0, 10).await.unwrap(),
            vec![Item::from("a"), Item::from("b")]
        );
        assert!(store.read(&handle, 5, 10).await.unwrap().is_empty());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    pub async fn concurrent_append_total_order_test() {
        let store = MemoryListStore::new();
        let handle = store.create_or_get("concurrent").await.unwrap();

        let (_id, mut receiver) = store.register_listener("concurrent", None).unwrap();

        let mut join_handles = Vec::new();
        for writer in 0..4 {
            let store = store.clone();
            let handle = handle.clone();
            join_handles.push(tokio::spawn(async move {
                for i in 0..100 {
                    store
                        .append(&handle, Item::from(writer * 1000 + i))
                        .await
                        .unwrap();
                }
            }));
        }
        for join_handle in join_handles {
            join_handle.await.unwrap();
        }

        let items = store.read(&handle, 0, 1000).await.unwrap();
        assert_eq!(items.len(), 400);

        // listeners observe exactly the stored order
        for (index, item) in items.iter().enumerate() {
            let event = receiver.recv().await.unwrap();
            assert_eq!(event.index, index as u64);
            assert_eq!(&event.item, item);
        }
    }

    #[tokio::test]
    pub async fn subscribe_in_order_test() {
        let store = MemoryListStore::new();
        let handle = store.create_or_get("observed").await.unwrap();
        store.append(&handle, Item::from(-1)).await.unwrap();

        let events: Arc<Mutex<Vec<ItemEvent>>> = Arc::new(Mutex::new(Vec::new()));
        let sink = events.clone();
        let subscription = store
            .subscribe(
                &handle,
                Arc::new(move |event: ItemEvent| sink.lock().unwrap().push(event)),
            )
            .await
            .unwrap();

        for i in 0..10 {
            store.append(&handle, Item::from(i)).await.unwrap();
        }

        for _ in 0..100 {
            if events.lock().unwrap().len() == 10 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        subscription.unsubscribe().await;

        let events = events.lock().unwrap().clone();
        let items: Vec<Item> = events.iter().map(|e| e.item.clone()).collect();
        assert_eq!(items, (0..10).map(Item::from).collect::<Vec<Item>>());
        assert_eq!(events[0].index, 1);
        assert_eq!(store.listener_count("observed"), 0);
    }

    #[tokio::test]
    pub async fn register_from_index_test() {
        let store = MemoryListStore::new();
        let handle = store.create_or_get("backlog").await.unwrap();
        for i in 0..3 {
            store.append(&handle, Item::from(i)).await.unwrap();
        }

        let (_id, mut receiver) = store.register_listener("backlog", Some(1)).unwrap();
        store.append(&handle, Item::from(3)).await.unwrap();

        for index in 1..4 {
            assert_eq!(receiver.recv().await.unwrap().index, index);
        }

        store.release_listeners();
        assert!(receiver.recv().await.is_none());
    }
}
