use futures::stream::BoxStream;
use futures::StreamExt;
use metrics::{Counter, Gauge};
use tokio::sync::mpsc::Receiver;
use tokio_util::sync::CancellationToken;

use crate::channel::ChannelError;

pub struct ChannelReceiver<T>
where
    T: Send,
{
    name: String,
    receiver: Receiver<T>,
    cancel: CancellationToken,

    size: Gauge,
    drain_counter: Counter,
}

impl<T> ChannelReceiver<T>
where
    T: Send + 'static,
{
    pub fn new(
        name: &str,
        receiver: Receiver<T>,
        size: Gauge,
        drain_counter: Counter,
        cancel: CancellationToken,
    ) -> Self {
        ChannelReceiver {
            name: name.to_string(),
            receiver,
            cancel,
            size,
            drain_counter,
        }
    }

    pub fn name(&self) -> &str {
        self.name.as_str()
    }

    #[inline]
    fn on_success(&self) {
        self.size.decrement(1 as f64);
        self.drain_counter.increment(1 as u64);
    }

    /// Blocks while the channel is empty. `Ok(None)` when every sender is dropped
    pub async fn recv(&mut self) -> Result<Option<T>, ChannelError> {
        if self.cancel.is_cancelled() {
            return Err(ChannelError::Cancelled);
        }

        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err(ChannelError::Cancelled),
            event = self.receiver.recv() => {
                if event.is_some() {
                    self.on_success();
                }
                Ok(event)
            },
        }
    }

    /// Drain the channel as a stream, ending when every sender is dropped.
    /// Cancellation is left to the consumer of the stream.
    pub fn into_stream(self) -> BoxStream<'static, T> {
        futures::stream::unfold(self, |mut r| async move {
            r.receiver.recv().await.map(|event| {
                r.on_success();
                (event, r)
            })
        })
        .boxed()
    }
}
