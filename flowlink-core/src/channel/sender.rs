use metrics::{Counter, Gauge};
use tokio::sync::mpsc::Sender;
use tokio_util::sync::CancellationToken;

use crate::channel::ChannelError;

#[derive(Clone)]
pub struct ChannelSender<T>
where
    T: Send,
{
    name: String,
    sender: Sender<T>,
    cancel: CancellationToken,

    size: Gauge,
    counter: Counter,
}

impl<T> ChannelSender<T>
where
    T: Send,
{
    pub fn new(
        name: &str,
        sender: Sender<T>,
        size: Gauge,
        counter: Counter,
        cancel: CancellationToken,
    ) -> Self {
        ChannelSender {
            name: name.to_string(),
            sender,
            cancel,
            size,
            counter,
        }
    }

    pub fn name(&self) -> &str {
        self.name.as_str()
    }

    #[inline]
    fn on_success(&self) {
        self.size.increment(1 as f64);
        self.counter.increment(1 as u64);
    }

    /// Blocks while the channel is at capacity
    pub async fn send(&self, event: T) -> Result<(), ChannelError> {
        if self.cancel.is_cancelled() {
            return Err(ChannelError::Cancelled);
        }

        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err(ChannelError::Cancelled),
            rt = self.sender.send(event) => match rt {
                Ok(_) => {
                    self.on_success();
                    Ok(())
                }
                Err(_) => Err(ChannelError::Closed),
            },
        }
    }
}
