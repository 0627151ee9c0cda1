use thiserror::Error;
use tokio_util::sync::CancellationToken;

use crate::channel::receiver::ChannelReceiver;
use crate::channel::sender::ChannelSender;
use crate::metrics::{register_counter, register_gauge, Tag};

pub const CHANNEL_SIZE_PREFIX: &str = "Channel.Size.";
pub const CHANNEL_ACCEPTED_PREFIX: &str = "Channel.Accepted.";
pub const CHANNEL_DRAIN_PREFIX: &str = "Channel.Drain.";

pub const DEFAULT_CHANNEL_CAPACITY: usize = 1024;

pub type Receiver<T> = tokio::sync::mpsc::Receiver<T>;
pub type Sender<T> = tokio::sync::mpsc::Sender<T>;

pub mod receiver;
pub mod sender;

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelError {
    /// the job-wide cancellation token is set
    #[error("channel operation cancelled")]
    Cancelled,
    /// the other side of the channel is dropped
    #[error("channel closed")]
    Closed,
}

pub fn bounded<T>(cap: usize) -> (Sender<T>, Receiver<T>) {
    tokio::sync::mpsc::channel(cap)
}

/// Create a bounded channel with size gauge and throughput counters.
/// Every blocking operation on either side returns `ChannelError::Cancelled`
/// once `cancel` is set.
pub fn named_channel<T>(
    name: &str,
    tags: Vec<Tag>,
    cap: usize,
    cancel: CancellationToken,
) -> (ChannelSender<T>, ChannelReceiver<T>)
where
    T: Send + 'static,
{
    let (sender, receiver) = bounded(cap.max(1));

    let size = register_gauge(CHANNEL_SIZE_PREFIX.to_owned() + name, tags.clone());
    let accepted_counter =
        register_counter(CHANNEL_ACCEPTED_PREFIX.to_owned() + name, tags.clone());
    let drain_counter = register_counter(CHANNEL_DRAIN_PREFIX.to_owned() + name, tags);

    (
        ChannelSender::new(name, sender, size.clone(), accepted_counter, cancel.clone()),
        ChannelReceiver::new(name, receiver, size, drain_counter, cancel),
    )
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use futures::StreamExt;
    use tokio_util::sync::CancellationToken;

    use crate::channel::{named_channel, ChannelError};

    #[tokio::test]
    pub async fn fifo_test() {
        let (sender, mut receiver) = named_channel("test", vec![], 4, CancellationToken::new());
        for i in 0..4 {
            sender.send(i).await.unwrap();
        }
        drop(sender);

        let mut values = Vec::new();
        while let Some(v) = receiver.recv().await.unwrap() {
            values.push(v);
        }
        assert_eq!(values, vec![0, 1, 2, 3]);
    }

    #[tokio::test]
    pub async fn blocked_send_cancelled_test() {
        let cancel = CancellationToken::new();
        let (sender, _receiver) = named_channel("test", vec![], 1, cancel.clone());
        sender.send(1).await.unwrap();

        let handle = tokio::spawn(async move { sender.send(2).await });
        tokio::time::sleep(Duration::from_millis(50)).await;
        cancel.cancel();

        let rt = tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(rt, Err(ChannelError::Cancelled));
    }

    #[tokio::test]
    pub async fn blocked_recv_cancelled_test() {
        let cancel = CancellationToken::new();
        let (_sender, mut receiver) = named_channel::<i32>("test", vec![], 1, cancel.clone());

        let handle = tokio::spawn(async move { receiver.recv().await });
        cancel.cancel();

        let rt = tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(rt, Err(ChannelError::Cancelled));
    }

    #[tokio::test]
    pub async fn into_stream_test() {
        let (sender, receiver) = named_channel("test", vec![], 8, CancellationToken::new());
        sender.send("a").await.unwrap();
        sender.send("b").await.unwrap();
        drop(sender);

        let values: Vec<&str> = receiver.into_stream().collect().await;
        assert_eq!(values, vec!["a", "b"]);
    }
}
