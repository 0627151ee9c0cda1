//! Edge endpoints of a task: one `Output` over every outbound edge and one
//! merged `Input` over every inbound producer channel.

use std::collections::{HashMap, HashSet};

use flowlink_core::channel::receiver::ChannelReceiver;
use flowlink_core::channel::sender::ChannelSender;
use flowlink_core::channel::ChannelError;
use flowlink_core::dag::Partitioner;
use flowlink_core::element::Element;
use flowlink_core::error::{Error, Result};
use flowlink_core::item::Item;
use flowlink_core::TaskId;
use futures::stream::{self, BoxStream};
use futures::StreamExt;
use tokio_util::sync::CancellationToken;

pub(crate) type ElementSender = ChannelSender<Element>;
pub(crate) type ElementReceiver = ChannelReceiver<Element>;

fn channel_error(e: ChannelError, vertex_name: &str, task_id: &TaskId) -> Error {
    match e {
        ChannelError::Cancelled => Error::Cancelled,
        ChannelError::Closed => Error::processing(
            vertex_name,
            task_id.task_number,
            "downstream channel closed",
        ),
    }
}

/// The channels of one outbound edge, indexed by consumer task number
pub(crate) struct OutputPartition {
    partitioner: Partitioner,
    senders: Vec<ElementSender>,
    next: usize,
}

impl OutputPartition {
    pub fn new(task_id: &TaskId, partitioner: Partitioner, senders: Vec<ElementSender>) -> Self {
        let next = match senders.len() {
            0 => 0,
            n => task_id.task_number as usize % n,
        };
        OutputPartition {
            partitioner,
            senders,
            next,
        }
    }

    fn select(&mut self, item: &Item) -> Result<Vec<usize>> {
        let n = self.senders.len();
        if n == 0 {
            return Ok(vec![]);
        }

        let targets = match self.partitioner {
            Partitioner::RoundRobin => {
                let target = self.next;
                self.next = (self.next + 1) % n;
                vec![target]
            }
            // pairwise edges own a single channel
            Partitioner::Forward => vec![0],
            Partitioner::Hash => vec![item.hash_code()? as usize % n],
            Partitioner::Broadcast => (0..n).collect(),
        };
        Ok(targets)
    }
}

pub(crate) struct Output {
    vertex_name: String,
    task_id: TaskId,
    partitions: Vec<OutputPartition>,
}

impl Output {
    pub fn new(vertex_name: &str, task_id: TaskId, partitions: Vec<OutputPartition>) -> Self {
        Output {
            vertex_name: vertex_name.to_string(),
            task_id,
            partitions,
        }
    }

    /// Blocks while a target channel is at capacity
    pub async fn emit(&mut self, item: Item) -> Result<()> {
        let mut sends = Vec::new();
        for (partition_index, partition) in self.partitions.iter_mut().enumerate() {
            for target in partition.select(&item)? {
                sends.push((partition_index, target));
            }
        }

        let last = sends.len().saturating_sub(1);
        let mut item = Some(item);
        for (n, (partition_index, target)) in sends.into_iter().enumerate() {
            let element = if n == last {
                item.take()
            } else {
                item.clone()
            };
            if let Some(element) = element {
                self.partitions[partition_index].senders[target]
                    .send(Element::Record(element))
                    .await
                    .map_err(|e| channel_error(e, self.vertex_name.as_str(), &self.task_id))?;
            }
        }

        Ok(())
    }

    /// one end of stream marker per channel
    pub async fn end(&mut self) -> Result<()> {
        for partition in &self.partitions {
            for sender in &partition.senders {
                sender
                    .send(Element::EndOfStream(self.task_id))
                    .await
                    .map_err(|e| channel_error(e, self.vertex_name.as_str(), &self.task_id))?;
            }
        }
        Ok(())
    }
}

enum InputEvent {
    Element(Element),
    /// every sender of the producer's channel is dropped
    Closed(TaskId),
}

pub(crate) struct Input {
    stream: BoxStream<'static, InputEvent>,
    /// producers that have not sent their end of stream yet
    pending: HashSet<TaskId>,
    producer_names: HashMap<TaskId, String>,
    cancel: CancellationToken,
}

impl Input {
    /// `receivers` pairs every producer with its vertex name and channel
    pub fn new(receivers: Vec<(TaskId, String, ElementReceiver)>, cancel: CancellationToken) -> Self {
        let mut pending = HashSet::new();
        let mut producer_names = HashMap::new();
        let mut streams = Vec::with_capacity(receivers.len());
        for (task_id, vertex_name, receiver) in receivers {
            pending.insert(task_id);
            producer_names.insert(task_id, vertex_name);

            let closed = stream::once(async move { InputEvent::Closed(task_id) });
            streams.push(receiver.into_stream().map(InputEvent::Element).chain(closed).boxed());
        }

        Input {
            stream: stream::select_all(streams).boxed(),
            pending,
            producer_names,
            cancel,
        }
    }

    /// Blocks while every channel is empty. `None` once every producer ended its stream
    pub async fn next(&mut self) -> Result<Option<Item>> {
        loop {
            if self.pending.is_empty() {
                return Ok(None);
            }

            let event = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => return Err(Error::Cancelled),
                event = self.stream.next() => event,
            };

            match event {
                Some(InputEvent::Element(Element::Record(item))) => return Ok(Some(item)),
                Some(InputEvent::Element(Element::EndOfStream(task_id))) => {
                    self.pending.remove(&task_id);
                }
                Some(InputEvent::Closed(task_id)) => {
                    if self.pending.contains(&task_id) {
                        return Err(self.lost_producer(&task_id));
                    }
                }
                None => {
                    return match self.pending.iter().next() {
                        Some(task_id) => Err(self.lost_producer(task_id)),
                        None => Ok(None),
                    };
                }
            }
        }
    }

    fn lost_producer(&self, task_id: &TaskId) -> Error {
        let vertex_name = self
            .producer_names
            .get(task_id)
            .map(|name| name.as_str())
            .unwrap_or("unknown");
        Error::processing(
            vertex_name,
            task_id.task_number,
            "channel closed without end of stream",
        )
    }
}
