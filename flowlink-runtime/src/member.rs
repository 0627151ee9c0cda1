//! Embedded cluster member, a scoped resource hosting the shared lists.

use std::net::SocketAddr;

use flowlink_core::cluster::{ClientConfig, MemberConfig};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::net::server::ListServer;
use crate::storage::list::mem_list_storage::MemoryListStore;
use crate::storage::list::ListStore;

/// A running member. `shutdown` releases it, dropping it does too.
pub struct Member {
    config: MemberConfig,
    address: SocketAddr,
    store: MemoryListStore,
    cancel: CancellationToken,
    server_handle: Option<JoinHandle<()>>,
}

impl Member {
    pub async fn start(config: MemberConfig) -> anyhow::Result<Member> {
        let store = MemoryListStore::new();
        let cancel = CancellationToken::new();

        let (listener, address) = ListServer::bind(config.bind_address().as_str()).await?;
        let server = ListServer::new(store.clone(), config.group_name.as_str(), cancel.clone());
        let server_handle = tokio::spawn(server.serve(listener));

        info!(
            "member of group `{}` started on {}",
            config.group_name, address
        );
        Ok(Member {
            config,
            address,
            store,
            cancel,
            server_handle: Some(server_handle),
        })
    }

    pub fn address(&self) -> SocketAddr {
        self.address
    }

    pub fn config(&self) -> &MemberConfig {
        &self.config
    }

    /// in-process access to the hosted lists
    pub fn store(&self) -> ListStore {
        ListStore::memory(self.store.clone())
    }

    pub fn memory_store(&self) -> &MemoryListStore {
        &self.store
    }

    /// a client config addressing this member from another process
    pub fn client_config(&self) -> ClientConfig {
        ClientConfig::new(self.address).with_group_name(self.config.group_name.as_str())
    }

    pub fn is_running(&self) -> bool {
        !self.cancel.is_cancelled()
    }

    /// stop accepting, close every session and release the listeners
    pub async fn shutdown(mut self) {
        self.cancel.cancel();
        if let Some(server_handle) = self.server_handle.take() {
            if let Err(e) = server_handle.await {
                error!("list server of member {} error. {}", self.address, e);
            }
        }
        self.store.release_listeners();
        info!("member {} shutdown", self.address);
    }
}

impl Drop for Member {
    fn drop(&mut self) {
        if self.server_handle.is_some() {
            warn!("member {} dropped without shutdown", self.address);
            self.cancel.cancel();
            self.store.release_listeners();
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use flowlink_core::cluster::MemberConfig;
    use flowlink_core::item::Item;

    use crate::member::Member;
    use crate::storage::list::{ListStore, TListStore};

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    pub async fn member_lifecycle_test() {
        let member = Member::start(MemberConfig::new("127.0.0.1", 0)).await.unwrap();
        assert_ne!(member.address().port(), 0);
        assert!(member.is_running());

        let local = member.store();
        let handle = local.create_or_get("source").await.unwrap();
        local.append(&handle, Item::from(7)).await.unwrap();

        let remote = ListStore::remote(member.client_config());
        let handle = remote.create_or_get("source").await.unwrap();
        assert_eq!(remote.size(&handle).await.unwrap(), 1);

        let address = member.address();
        member.shutdown().await;

        // nobody serves the address anymore
        let mut config = flowlink_core::cluster::ClientConfig::new(address);
        config.connect_timeout_ms = 500;
        let remote = ListStore::remote(config);
        assert!(remote.create_or_get("source").await.unwrap_err().is_connection());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    pub async fn member_drop_releases_test() {
        let member = Member::start(MemberConfig::new("127.0.0.1", 0)).await.unwrap();
        let store = member.memory_store().clone();
        let (_id, mut receiver) = store.register_listener("sink", None).unwrap();

        drop(member);
        let released = tokio::time::timeout(Duration::from_secs(5), receiver.recv())
            .await
            .unwrap();
        assert!(released.is_none());
    }
}
