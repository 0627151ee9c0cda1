use std::sync::Arc;

use flowlink_core::cluster::ClientConfig;
use flowlink_core::error::{Error, Result};
use flowlink_core::item::Item;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

use crate::net::client::{unexpected, StoreClient};
use crate::net::{StoreRequest, StoreResponse};
use crate::storage::list::{ItemListener, ListHandle, ListSubscription, TListStore};
use crate::utils::thread::async_sleep;

/// Lists hosted by a member in another process.
/// Requests share one lazily opened session, every subscription opens its own.
#[derive(Clone)]
pub struct RemoteListStore {
    config: Arc<ClientConfig>,
    connection: Arc<Mutex<Option<StoreClient>>>,
}

impl RemoteListStore {
    pub fn new(config: ClientConfig) -> Self {
        RemoteListStore {
            config: Arc::new(config),
            connection: Arc::new(Mutex::new(None)),
        }
    }

    pub fn addresses(&self) -> &[String] {
        self.config.addresses.as_slice()
    }

    /// The session leaves the slot for the round trip. A request dropped in flight drops it too.
    async fn request(&self, request: StoreRequest) -> Result<StoreResponse> {
        let mut connection = self.connection.lock().await;
        let mut client = match connection.take() {
            Some(client) => client,
            None => StoreClient::connect(self.config.as_ref()).await?,
        };

        let rt = client.request(request).await;
        match &rt {
            Err(Error::Connection(e)) => {
                // reopened by the next request
                warn!("drop member session {}. {}", client.address(), e);
            }
            _ => *connection = Some(client),
        }
        rt
    }
}

#[async_trait]
impl TListStore for RemoteListStore {
    async fn create_or_get(&self, name: &str) -> Result<ListHandle> {
        let request = StoreRequest::CreateOrGet {
            name: name.to_string(),
        };
        match self.request(request).await? {
            StoreResponse::Created { created } => {
                if created {
                    info!("create remote list `{}`", name);
                }
                Ok(ListHandle::new(name))
            }
            response => Err(unexpected(response)),
        }
    }

    async fn append(&self, handle: &ListHandle, item: Item) -> Result<u64> {
        self.append_all(handle, vec![item]).await
    }

    async fn append_all(&self, handle: &ListHandle, items: Vec<Item>) -> Result<u64> {
        let request = StoreRequest::Append {
            name: handle.name().to_string(),
            items,
        };
        match self.request(request).await? {
            StoreResponse::Appended { first_index, .. } => Ok(first_index),
            response => Err(unexpected(response)),
        }
    }

    async fn size(&self, handle: &ListHandle) -> Result<u64> {
        let request = StoreRequest::Size {
            name: handle.name().to_string(),
        };
        match self.request(request).await? {
            StoreResponse::Size { size } => Ok(size),
            response => Err(unexpected(response)),
        }
    }

    async fn read(&self, handle: &ListHandle, offset: u64, limit: usize) -> Result<Vec<Item>> {
        let request = StoreRequest::Read {
            name: handle.name().to_string(),
            offset,
            limit,
        };
        match self.request(request).await? {
            StoreResponse::Items { items } => Ok(items),
            response => Err(unexpected(response)),
        }
    }

    async fn subscribe(
        &self,
        handle: &ListHandle,
        listener: Arc<dyn ItemListener>,
    ) -> Result<ListSubscription> {
        // the first session is opened here so an unreachable member fails the call
        let (client, next_index) = open_subscription(self.config.as_ref(), handle.name(), None).await?;

        let cancel = CancellationToken::new();
        let subscription = Subscription {
            config: self.config.clone(),
            list_name: handle.name().to_string(),
            listener,
            next_index,
            cancel: cancel.clone(),
        };
        let join_handle = tokio::spawn(subscription.run(client));

        Ok(ListSubscription::new(handle.name(), cancel, join_handle))
    }
}

/// Open a push session. Without `from_index` the session starts at the current tail.
async fn open_subscription(
    config: &ClientConfig,
    list_name: &str,
    from_index: Option<u64>,
) -> Result<(StoreClient, u64)> {
    let mut client = StoreClient::connect(config).await?;
    let from_index = match from_index {
        Some(from_index) => from_index,
        None => {
            let request = StoreRequest::Size {
                name: list_name.to_string(),
            };
            match client.request(request).await? {
                StoreResponse::Size { size } => size,
                response => return Err(unexpected(response)),
            }
        }
    };

    client.subscribe(list_name, Some(from_index)).await?;
    debug!(
        "subscribe `{}` on member {} from index {}",
        list_name,
        client.address(),
        from_index
    );
    Ok((client, from_index))
}

struct Subscription {
    config: Arc<ClientConfig>,
    list_name: String,
    listener: Arc<dyn ItemListener>,
    /// index of the first event not yet delivered
    next_index: u64,
    cancel: CancellationToken,
}

impl Subscription {
    async fn run(mut self, client: StoreClient) {
        let mut client = Some(client);
        loop {
            let mut session = match client.take() {
                Some(session) => session,
                None => {
                    let opened = tokio::select! {
                        biased;
                        _ = self.cancel.cancelled() => break,
                        opened = open_subscription(
                            self.config.as_ref(),
                            self.list_name.as_str(),
                            Some(self.next_index),
                        ) => opened,
                    };
                    match opened {
                        Ok((session, _from_index)) => {
                            info!(
                                "subscription of `{}` resumed from index {}",
                                self.list_name, self.next_index
                            );
                            session
                        }
                        Err(e) => {
                            error!("resubscribe `{}` error. {}", self.list_name, e);
                            if self.sleep_or_cancelled().await {
                                break;
                            }
                            continue;
                        }
                    }
                }
            };

            match self.dispatch(&mut session).await {
                Ok(true) => break,
                Ok(false) => warn!("subscription session of `{}` closed by member", self.list_name),
                Err(e) => error!("subscription session of `{}` error. {}", self.list_name, e),
            }
            if self.sleep_or_cancelled().await {
                break;
            }
        }

        debug!("remote subscription of `{}` stopped", self.list_name);
    }

    /// deliver events until cancelled (`true`) or the session ends (`false`)
    async fn dispatch(&mut self, session: &mut StoreClient) -> Result<bool> {
        loop {
            let event = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => return Ok(true),
                event = session.next_event() => event?,
            };

            match event {
                Some(event) => {
                    // replayed after a reconnect
                    if event.index < self.next_index {
                        continue;
                    }
                    self.next_index = event.index + 1;
                    self.listener.item_added(event);
                }
                None => return Ok(false),
            }
        }
    }

    async fn sleep_or_cancelled(&self) -> bool {
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => true,
            _ = async_sleep(self.config.retry_interval()) => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::net::SocketAddr;
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    use flowlink_core::cluster::ClientConfig;
    use flowlink_core::item::Item;
    use tokio_util::sync::CancellationToken;

    use crate::net::server::ListServer;
    use crate::storage::list::mem_list_storage::MemoryListStore;
    use crate::storage::list::remote_list_storage::RemoteListStore;
    use crate::storage::list::{ItemEvent, TListStore};

    async fn start_server(store: MemoryListStore) -> (SocketAddr, CancellationToken) {
        let cancel = CancellationToken::new();
        let (listener, addr) = ListServer::bind("127.0.0.1:0").await.unwrap();
        let server = ListServer::new(store, "test", cancel.clone());
        tokio::spawn(server.serve(listener));
        (addr, cancel)
    }

    fn list_name() -> String {
        format!("list-{}", uuid::Uuid::new_v4())
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    pub async fn remote_read_write_test() {
        let memory = MemoryListStore::new();
        let (addr, cancel) = start_server(memory.clone()).await;
        let store = RemoteListStore::new(ClientConfig::new(addr).with_group_name("test"));

        let name = list_name();
        let handle = store.create_or_get(name.as_str()).await.unwrap();
        assert_eq!(store.append(&handle, Item::from(0)).await.unwrap(), 0);
        assert_eq!(
            store
                .append_all(&handle, vec![Item::from(1), Item::from(2)])
                .await
                .unwrap(),
            1
        );

        // idempotent, never overwrites
        let again = store.create_or_get(name.as_str()).await.unwrap();
        assert_eq!(store.size(&again).await.unwrap(), 3);
        assert_eq!(
            store.read(&again, 1, 10).await.unwrap(),
            vec![Item::from(1), Item::from(2)]
        );

        // the member sees the same list
        let local = memory.create_or_get(name.as_str()).await.unwrap();
        assert_eq!(memory.size(&local).await.unwrap(), 3);

        cancel.cancel();
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    pub async fn abandoned_request_test() {
        let memory = MemoryListStore::new();
        let (addr, cancel) = start_server(memory.clone()).await;
        let store = RemoteListStore::new(ClientConfig::new(addr).with_group_name("test"));

        let name = list_name();
        let local = memory.create_or_get(name.as_str()).await.unwrap();
        memory
            .append_all(&local, (0..200_000).map(Item::from).collect())
            .await
            .unwrap();

        let handle = store.create_or_get(name.as_str()).await.unwrap();
        // the reply of a read dropped in flight must not leak into the next request
        let abandoned = store.clone();
        let _ = tokio::time::timeout(
            Duration::from_millis(1),
            abandoned.read(&handle, 0, 200_000),
        )
        .await;

        assert_eq!(
            store.read(&handle, 10, 1).await.unwrap(),
            vec![Item::from(10)]
        );
        assert_eq!(store.size(&handle).await.unwrap(), 200_000);

        cancel.cancel();
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    pub async fn remote_subscribe_test() {
        let memory = MemoryListStore::new();
        let (addr, cancel) = start_server(memory.clone()).await;
        let store = RemoteListStore::new(ClientConfig::new(addr).with_group_name("test"));

        let name = list_name();
        let handle = store.create_or_get(name.as_str()).await.unwrap();
        store.append(&handle, Item::from("before")).await.unwrap();

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

        for _ in 0..200 {
            if events.lock().unwrap().len() >= 10 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        subscription.unsubscribe().await;

        let events = events.lock().unwrap().clone();
        let indexes: Vec<u64> = events.iter().map(|e| e.index).collect();
        assert_eq!(indexes, (1..11).collect::<Vec<u64>>());
        assert_eq!(events[0].item, Item::from(0));

        // the member releases the listener once the session ends
        for _ in 0..200 {
            if memory.listener_count(name.as_str()) == 0 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(memory.listener_count(name.as_str()), 0);

        cancel.cancel();
    }

    #[tokio::test]
    pub async fn group_mismatch_test() {
        let (addr, cancel) = start_server(MemoryListStore::new()).await;
        let store = RemoteListStore::new(ClientConfig::new(addr).with_group_name("other"));

        let rt = store.create_or_get("list").await;
        assert!(rt.unwrap_err().is_connection());

        cancel.cancel();
    }

    #[tokio::test]
    pub async fn unreachable_member_test() {
        // bind then release, nobody listens on the port afterwards
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let mut config = ClientConfig::new(addr);
        config.connect_timeout_ms = 500;
        let store = RemoteListStore::new(config);

        assert!(store.create_or_get("list").await.unwrap_err().is_connection());
    }
}
