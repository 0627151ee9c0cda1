use std::time::Duration;

use flowlink_core::cluster::ClientConfig;
use flowlink_core::error::{Error, Result};
use futures::{SinkExt, StreamExt};
use tokio::net::TcpStream;

use crate::net::{decode, encode, new_framed, FramedStream, StoreRequest, StoreResponse};
use crate::storage::list::ItemEvent;

/// A session with a member. Requests are answered in order, one in flight at a time.
pub(crate) struct StoreClient {
    address: String,
    framed: FramedStream,
    request_timeout: Duration,
}

impl StoreClient {
    /// try every configured address in order, the first welcomed session wins
    pub async fn connect(config: &ClientConfig) -> Result<Self> {
        if config.addresses.is_empty() {
            return Err(Error::connection("no member address configured"));
        }

        let mut errors = Vec::new();
        for address in &config.addresses {
            match StoreClient::connect0(address.as_str(), config).await {
                Ok(client) => return Ok(client),
                Err(e) => {
                    warn!("connect member {} failure. {}", address, e);
                    errors.push(format!("{}: {}", address, e));
                }
            }
        }

        Err(Error::connection(format!(
            "no member reachable [{}]",
            errors.join(", ")
        )))
    }

    async fn connect0(address: &str, config: &ClientConfig) -> Result<Self> {
        let stream = tokio::time::timeout(config.connect_timeout(), TcpStream::connect(address))
            .await
            .map_err(|_e| Error::connection(format!("connect timeout {:?}", config.connect_timeout())))?
            .map_err(Error::connection)?;
        stream.set_nodelay(true).map_err(Error::connection)?;

        let mut client = StoreClient {
            address: address.to_string(),
            framed: new_framed(stream),
            request_timeout: config.request_timeout(),
        };

        let hello = StoreRequest::Hello {
            group_name: config.group_name.clone(),
        };
        match client.request(hello).await {
            Ok(StoreResponse::Welcome { member_address }) => {
                debug!("connected to member {} via {}", member_address, address);
                Ok(client)
            }
            Ok(response) => Err(Error::connection(unexpected(response))),
            Err(e) => Err(Error::connection(format!("handshake rejected. {}", e))),
        }
    }

    pub fn address(&self) -> &str {
        self.address.as_str()
    }

    pub async fn request(&mut self, request: StoreRequest) -> Result<StoreResponse> {
        let bytes = encode(&request)?;
        let timeout = self.request_timeout;
        let address = self.address.clone();

        let round_trip = async {
            self.framed
                .send(bytes)
                .await
                .map_err(|e| Error::connection(format!("send to {} error. {}", address, e)))?;
            self.recv().await
        };

        match tokio::time::timeout(timeout, round_trip).await {
            Ok(Ok(StoreResponse::Error { message })) => {
                Err(Error::from(anyhow!("member {} error. {}", self.address, message)))
            }
            Ok(rt) => rt,
            Err(_) => Err(Error::connection(format!(
                "request to {} timeout after {:?}",
                self.address, timeout
            ))),
        }
    }

    /// switch the session to push mode
    pub async fn subscribe(&mut self, name: &str, from_index: Option<u64>) -> Result<()> {
        let request = StoreRequest::Subscribe {
            name: name.to_string(),
            from_index,
        };
        match self.request(request).await? {
            StoreResponse::Subscribed => Ok(()),
            response => Err(unexpected(response)),
        }
    }

    /// next pushed event, `None` when the member closed the session
    pub async fn next_event(&mut self) -> Result<Option<ItemEvent>> {
        match self.framed.next().await {
            Some(Ok(bytes)) => match decode(&bytes)? {
                StoreResponse::ItemAdded { event } => Ok(Some(event)),
                response => Err(unexpected(response)),
            },
            Some(Err(e)) => Err(Error::connection(format!(
                "recv from {} error. {}",
                self.address, e
            ))),
            None => Ok(None),
        }
    }

    async fn recv(&mut self) -> Result<StoreResponse> {
        match self.framed.next().await {
            Some(Ok(bytes)) => Ok(decode(&bytes)?),
            Some(Err(e)) => Err(Error::connection(format!(
                "recv from {} error. {}",
                self.address, e
            ))),
            None => Err(Error::connection(format!(
                "session closed by member {}",
                self.address
            ))),
        }
    }
}

pub(crate) fn unexpected(response: StoreResponse) -> Error {
    Error::from(anyhow!("unexpected response {:?}", response))
}
