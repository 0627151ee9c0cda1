//! List store wire protocol.
//!
//! Every frame is a u32 big endian length header followed by a json body:
//!
//! ```text
//! ┌──────────────┬───────────────────────────────┐
//! │ length (u32) │ StoreRequest / StoreResponse  │
//! └──────────────┴───────────────────────────────┘
//! ```
//!
//! A session starts with `Hello`. After `Subscribe` the session only pushes
//! `ItemAdded` responses until either side closes it.

pub mod client;
pub mod server;

use bytes::{Bytes, BytesMut};
use flowlink_core::item::Item;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::net::TcpStream;
use tokio_util::codec::{Framed, LengthDelimitedCodec};

use crate::storage::list::ItemEvent;

const MAX_FRAME_LENGTH: usize = 64 * 1024 * 1024;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum StoreRequest {
    Hello { group_name: String },
    CreateOrGet { name: String },
    Append { name: String, items: Vec<Item> },
    Size { name: String },
    Read { name: String, offset: u64, limit: usize },
    Subscribe { name: String, from_index: Option<u64> },
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum StoreResponse {
    Welcome { member_address: String },
    Created { created: bool },
    Appended { first_index: u64, size: u64 },
    Size { size: u64 },
    Items { items: Vec<Item> },
    Subscribed,
    ItemAdded { event: ItemEvent },
    Error { message: String },
}

impl StoreResponse {
    pub fn error<T: ToString>(message: T) -> Self {
        StoreResponse::Error {
            message: message.to_string(),
        }
    }
}

pub(crate) type FramedStream = Framed<TcpStream, LengthDelimitedCodec>;

pub(crate) fn new_framed(stream: TcpStream) -> FramedStream {
    let codec = LengthDelimitedCodec::builder()
        .max_frame_length(MAX_FRAME_LENGTH)
        .new_codec();
    Framed::new(stream, codec)
}

pub(crate) fn encode<T: Serialize>(message: &T) -> anyhow::Result<Bytes> {
    let body = serde_json::to_vec(message)?;
    Ok(Bytes::from(body))
}

pub(crate) fn decode<T: DeserializeOwned>(bytes: &BytesMut) -> anyhow::Result<T> {
    serde_json::from_slice(bytes.as_ref()).map_err(|e| anyhow!("decode frame error. {}", e))
}
