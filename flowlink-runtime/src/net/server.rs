use std::net::SocketAddr;

use futures::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio_util::sync::CancellationToken;

use crate::net::{decode, encode, new_framed, FramedStream, StoreRequest, StoreResponse};
use crate::storage::list::mem_list_storage::MemoryListStore;
use crate::storage::list::TListStore;

/// Serves a `MemoryListStore` to remote clients
#[derive(Clone)]
pub struct ListServer {
    store: MemoryListStore,
    group_name: String,
    cancel: CancellationToken,
}

impl ListServer {
    pub fn new(store: MemoryListStore, group_name: &str, cancel: CancellationToken) -> Self {
        ListServer {
            store,
            group_name: group_name.to_string(),
            cancel,
        }
    }

    pub async fn bind(address: &str) -> anyhow::Result<(TcpListener, SocketAddr)> {
        let listener = TcpListener::bind(address)
            .await
            .map_err(|e| anyhow!("bind `{}` error. {}", address, e))?;
        let local_addr = listener.local_addr()?;
        info!("list server listening on: {}", local_addr);
        Ok((listener, local_addr))
    }

    /// accept sessions until cancelled
    pub async fn serve(self, listener: TcpListener) {
        let local_addr = listener
            .local_addr()
            .map(|addr| addr.to_string())
            .unwrap_or_default();

        loop {
            let accepted = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => break,
                accepted = listener.accept() => accepted,
            };

            match accepted {
                Ok((socket, remote_addr)) => {
                    debug!("session accepted, remote addr: {}", remote_addr);
                    tokio::spawn(self.clone().session_process(socket, remote_addr));
                }
                Err(e) => {
                    error!("accept session error. {}", e);
                }
            }
        }

        info!("list server {} stopped", local_addr);
    }

    async fn session_process(self, socket: TcpStream, remote_addr: SocketAddr) {
        let local_addr = socket
            .local_addr()
            .map(|addr| addr.to_string())
            .unwrap_or_default();
        let mut framed = new_framed(socket);

        let rt = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Ok(()),
            rt = self.session_process0(&mut framed, local_addr) => rt,
        };

        match rt {
            Ok(_) => debug!("session closed, remote addr: {}", remote_addr),
            Err(e) => warn!("session error, remote addr: {}. {}", remote_addr, e),
        }
    }

    async fn session_process0(
        &self,
        framed: &mut FramedStream,
        local_addr: String,
    ) -> anyhow::Result<()> {
        let mut welcomed = false;
        while let Some(message) = framed.next().await {
            let bytes = message.map_err(|e| anyhow!("socket closed with error. {}", e))?;
            let request: StoreRequest = decode(&bytes)?;
            if log_enabled!(log::Level::Trace) {
                trace!("recv request: {:?}", request);
            }

            match request {
                StoreRequest::Hello { group_name } => {
                    if group_name.ne(&self.group_name) {
                        let message = format!("group `{}` is not served here", group_name);
                        send(framed, &StoreResponse::error(message.as_str())).await?;
                        return Err(anyhow!(message));
                    }
                    welcomed = true;
                    let response = StoreResponse::Welcome {
                        member_address: local_addr.clone(),
                    };
                    send(framed, &response).await?;
                }
                _ if !welcomed => {
                    send(framed, &StoreResponse::error("`Hello` expected")).await?;
                    return Err(anyhow!("request before `Hello`"));
                }
                StoreRequest::Subscribe { name, from_index } => {
                    return self.subscribe_handle(framed, name, from_index).await;
                }
                request => {
                    let response = self.request_handle(request).await;
                    send(framed, &response).await?;
                }
            }
        }

        Ok(())
    }

    async fn request_handle(&self, request: StoreRequest) -> StoreResponse {
        let rt = match request {
            StoreRequest::CreateOrGet { name } => Ok(StoreResponse::Created {
                created: self.store.create(name.as_str()),
            }),
            StoreRequest::Append { name, items } => {
                let count = items.len() as u64;
                match self.store.create_or_get(name.as_str()).await {
                    Ok(handle) => self
                        .store
                        .append_all(&handle, items)
                        .await
                        .map(|first_index| StoreResponse::Appended {
                            first_index,
                            size: first_index + count,
                        }),
                    Err(e) => Err(e),
                }
            }
            StoreRequest::Size { name } => match self.store.create_or_get(name.as_str()).await {
                Ok(handle) => self
                    .store
                    .size(&handle)
                    .await
                    .map(|size| StoreResponse::Size { size }),
                Err(e) => Err(e),
            },
            StoreRequest::Read {
                name,
                offset,
                limit,
            } => match self.store.create_or_get(name.as_str()).await {
                Ok(handle) => self
                    .store
                    .read(&handle, offset, limit)
                    .await
                    .map(|items| StoreResponse::Items { items }),
                Err(e) => Err(e),
            },
            request => Ok(StoreResponse::error(format!(
                "unexpected request {:?}",
                request
            ))),
        };

        rt.unwrap_or_else(|e| StoreResponse::error(e))
    }

    /// push `ItemAdded` until the client goes away or the list releases its listeners
    async fn subscribe_handle(
        &self,
        framed: &mut FramedStream,
        name: String,
        from_index: Option<u64>,
    ) -> anyhow::Result<()> {
        let (id, mut receiver) = self.store.register_listener(name.as_str(), from_index)?;
        info!(
            "remote subscription {} on `{}` from index {:?}",
            id, name, from_index
        );

        let rt = async {
            send(framed, &StoreResponse::Subscribed).await?;
            loop {
                tokio::select! {
                    event = receiver.recv() => match event {
                        Some(event) => send(framed, &StoreResponse::ItemAdded { event }).await?,
                        None => return Ok(()),
                    },
                    message = framed.next() => match message {
                        Some(Ok(_)) => warn!("ignore request on subscription session"),
                        Some(Err(e)) => return Err(anyhow!("socket closed with error. {}", e)),
                        None => return Ok(()),
                    },
                }
            }
        }
        .await;

        self.store.unregister_listener(name.as_str(), id)?;
        info!("remote subscription {} on `{}` stopped", id, name);
        rt
    }
}

async fn send(framed: &mut FramedStream, response: &StoreResponse) -> anyhow::Result<()> {
    let bytes = encode(response)?;
    framed.send(bytes).await?;
    Ok(())
}
