use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use flowlink_core::channel::named_channel;
use flowlink_core::cluster::ClusterConfig;
use flowlink_core::dag::{Dag, Partitioner, Vertex};
use flowlink_core::error::{Error, Result};
use flowlink_core::function::{Context, Processor};
use flowlink_core::job::{AtomicJobStatus, JobDescriptor, JobStatus, TaskStatus};
use flowlink_core::properties::{Properties, SystemProperties};
use flowlink_core::{ChannelKey, JobId, TaskId, VertexId};
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver};
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

use crate::dag::execution_graph::ExecutionGraph;
use crate::runtime::coordinator::job_handle::{JobFailure, JobHandle, JobOutcome, JobSummary};
use crate::runtime::coordinator::task_distribution::build_job_descriptor;
use crate::runtime::worker::io::{ElementReceiver, ElementSender, Input, Output, OutputPartition};
use crate::runtime::worker::job_task::JobTask;
use crate::runtime::worker::runnable::{MapRunnable, Runnable, SinkRunnable, SourceRunnable};
use crate::runtime::worker::WorkerTask;
use crate::runtime::TaskEvent;
use crate::utils::date_time::timestamp_str;

pub mod job_handle;
pub(crate) mod task_distribution;

/// Turns a `Dag` into running tasks and resolves their outcome
pub struct JobCoordinator {
    properties: Properties,
    job_id_gen: AtomicU64,
}

impl JobCoordinator {
    pub fn new(properties: Properties) -> Self {
        JobCoordinator {
            properties,
            job_id_gen: AtomicU64::new(0),
        }
    }

    pub fn from_config(cluster_config: &ClusterConfig) -> Self {
        JobCoordinator::new(Properties::from_worker_config(&cluster_config.worker))
    }

    pub fn properties(&self) -> &Properties {
        &self.properties
    }

    pub async fn submit(&self, dag: Dag) -> Result<JobHandle> {
        self.submit_with_properties(dag, Properties::new()).await
    }

    /// Start every task of `dag` and return without waiting for them.
    /// `job_properties` override the coordinator properties for this job only.
    pub async fn submit_with_properties(
        &self,
        dag: Dag,
        job_properties: Properties,
    ) -> Result<JobHandle> {
        let job_id = JobId(self.job_id_gen.fetch_add(1, Ordering::SeqCst));

        let mut properties = self.properties.clone();
        for (key, value) in job_properties.as_map() {
            properties.set_str(key.as_str(), value.as_str());
        }
        let job_name = properties
            .get_job_name()
            .unwrap_or_else(|_e| job_id.to_string());

        let execution_graph = ExecutionGraph::build(&dag)?;
        let num_workers = properties
            .get_num_workers()
            .unwrap_or_else(num_cpus::get)
            .max(1);
        let mut job_descriptor = build_job_descriptor(
            job_id,
            job_name.as_str(),
            &dag,
            &execution_graph,
            num_workers,
        );

        let cancel = CancellationToken::new();
        let properties = Arc::new(properties);
        let mut channels = Channels::new(
            &execution_graph,
            properties.get_channel_capacity(),
            cancel.clone(),
        );

        let (event_sender, event_receiver) = unbounded_channel();
        let mut workers: BTreeMap<String, WorkerTask> = BTreeMap::new();
        for task_descriptor in &job_descriptor.task_descriptors {
            let task_id = task_descriptor.task_id;
            let vertex = dag.vertex(task_id.vertex_id);
            let context = Context {
                job_id,
                job_name: job_name.clone(),
                vertex_name: vertex.name.clone(),
                task_id,
                properties: properties.clone(),
                cancel: cancel.clone(),
            };

            let runnable = build_runnable(vertex, &context, &execution_graph, &mut channels)?;
            let task = JobTask::new(context, runnable, event_sender.clone());
            workers
                .entry(task_descriptor.worker_id.clone())
                .or_insert_with(|| {
                    WorkerTask::new(task_descriptor.worker_id.as_str(), event_sender.clone())
                })
                .add_task(task);
        }
        // the monitor sees the end of the events once every worker is gone
        drop(event_sender);

        for task_descriptor in job_descriptor.task_descriptors.iter_mut() {
            task_descriptor.status = TaskStatus::Running;
        }
        job_descriptor.status = JobStatus::Running;

        let status = Arc::new(AtomicJobStatus::new(JobStatus::Running));
        let (outcome_sender, outcome_receiver) = watch::channel(None);
        let job_handle = JobHandle::new(
            job_id,
            job_name.as_str(),
            status.clone(),
            cancel.clone(),
            outcome_receiver,
        );

        info!(
            "submit {} `{}` at {} with {} tasks on {} workers",
            job_id,
            job_name,
            timestamp_str(job_descriptor.start_timestamp),
            job_descriptor.task_descriptors.len(),
            workers.len()
        );
        debug!("{} properties:\n{}", job_id, properties.to_lines_string());

        let monitor = JobMonitor {
            job_descriptor,
            events: event_receiver,
            cancel,
            status,
            outcome_sender,
            started: Instant::now(),
        };
        tokio::spawn(monitor.run());

        for (_worker_id, worker) in workers {
            if !worker.is_empty() {
                debug!("spawn worker {}", worker.worker_id());
                tokio::spawn(worker.run());
            }
        }

        Ok(job_handle)
    }
}

/// The not yet claimed endpoints of every execution edge
struct Channels {
    senders: HashMap<ChannelKey, ElementSender>,
    receivers: HashMap<ChannelKey, ElementReceiver>,
}

impl Channels {
    fn new(execution_graph: &ExecutionGraph, capacity: usize, cancel: CancellationToken) -> Self {
        let mut senders = HashMap::new();
        let mut receivers = HashMap::new();
        for channel_key in execution_graph.channel_keys() {
            let (sender, receiver) =
                named_channel("Element", channel_key.to_tags(), capacity, cancel.clone());
            senders.insert(channel_key, sender);
            receivers.insert(channel_key, receiver);
        }

        Channels { senders, receivers }
    }

    fn take_sender(&mut self, channel_key: &ChannelKey) -> Result<ElementSender> {
        self.senders
            .remove(channel_key)
            .ok_or_else(|| Error::from(anyhow!("sender of channel {:?} not found", channel_key)))
    }

    fn take_receiver(&mut self, channel_key: &ChannelKey) -> Result<ElementReceiver> {
        self.receivers
            .remove(channel_key)
            .ok_or_else(|| Error::from(anyhow!("receiver of channel {:?} not found", channel_key)))
    }
}

fn build_output(
    context: &Context,
    execution_graph: &ExecutionGraph,
    channels: &mut Channels,
) -> Result<Output> {
    let task_id = context.task_id;

    // children are ordered by vertex, one partition per outbound edge
    let mut edges: Vec<(VertexId, Partitioner, Vec<ElementSender>)> = Vec::new();
    for (node, edge) in execution_graph.children(&task_id) {
        let channel_key = ChannelKey {
            source_task_id: task_id,
            target_task_id: node.task_id,
        };
        let sender = channels.take_sender(&channel_key)?;

        match edges.last_mut() {
            Some((vertex_id, _, senders)) if *vertex_id == node.task_id.vertex_id => {
                senders.push(sender)
            }
            _ => edges.push((node.task_id.vertex_id, edge.partitioner, vec![sender])),
        }
    }

    let partitions = edges
        .into_iter()
        .map(|(_vertex_id, partitioner, senders)| {
            OutputPartition::new(&task_id, partitioner, senders)
        })
        .collect();
    Ok(Output::new(context.vertex_name.as_str(), task_id, partitions))
}

fn build_input(
    context: &Context,
    execution_graph: &ExecutionGraph,
    channels: &mut Channels,
) -> Result<Input> {
    let task_id = context.task_id;

    let mut receivers = Vec::new();
    for (node, _edge) in execution_graph.parents(&task_id) {
        let channel_key = ChannelKey {
            source_task_id: node.task_id,
            target_task_id: task_id,
        };
        let receiver = channels.take_receiver(&channel_key)?;
        receivers.push((node.task_id, node.vertex_name.clone(), receiver));
    }

    Ok(Input::new(receivers, context.cancel.clone()))
}

fn build_runnable(
    vertex: &Vertex,
    context: &Context,
    execution_graph: &ExecutionGraph,
    channels: &mut Channels,
) -> Result<Box<dyn Runnable>> {
    let runnable: Box<dyn Runnable> = match &vertex.processor {
        Processor::Source(factory) => {
            let output = build_output(context, execution_graph, channels)?;
            Box::new(SourceRunnable::new(factory(), output))
        }
        Processor::Map(factory) => {
            let input = build_input(context, execution_graph, channels)?;
            let output = build_output(context, execution_graph, channels)?;
            Box::new(MapRunnable::new(factory(), input, output))
        }
        Processor::Sink(factory) => {
            let input = build_input(context, execution_graph, channels)?;
            Box::new(SinkRunnable::new(factory(), input))
        }
    };
    Ok(runnable)
}

/// Collects the task events of one job and resolves its outcome
struct JobMonitor {
    job_descriptor: JobDescriptor,
    events: UnboundedReceiver<TaskEvent>,
    cancel: CancellationToken,
    status: Arc<AtomicJobStatus>,
    outcome_sender: watch::Sender<Option<JobOutcome>>,
    started: Instant,
}

impl JobMonitor {
    async fn run(mut self) {
        let mut failure: Option<JobFailure> = None;

        // resolve only once every task terminated, nothing appends afterwards
        while !self.job_descriptor.all_terminated() {
            let event = match self.events.recv().await {
                Some(event) => event,
                None => {
                    error!(
                        "workers of {} ended without reporting every task",
                        self.job_descriptor.job_id
                    );
                    if failure.is_none() {
                        let error = Error::from(anyhow!("task terminated without report"));
                        failure = Some(JobFailure {
                            task_id: None,
                            vertex: None,
                            error: Arc::new(error),
                        });
                    }
                    break;
                }
            };

            let task_id = event.task_id();
            match event {
                TaskEvent::Finished { .. } => {
                    debug!("task {} finished", task_id);
                    self.job_descriptor
                        .update_task_status(&task_id, TaskStatus::Finished);
                }
                TaskEvent::Failed { error, .. } if error.is_cancelled() => {
                    self.job_descriptor
                        .update_task_status(&task_id, TaskStatus::Cancelled);
                }
                TaskEvent::Failed { error, .. } => {
                    self.job_descriptor
                        .update_task_status(&task_id, TaskStatus::Failed);
                    if failure.is_none() {
                        let vertex = self.vertex_name(&task_id);
                        warn!(
                            "{} failed at `{}` task {}, cancel every task. {}",
                            self.job_descriptor.job_id, vertex, task_id, error
                        );
                        failure = Some(JobFailure::new(task_id, vertex.as_str(), error));
                        self.cancel.cancel();
                    } else {
                        debug!("subsequent failure of task {}. {}", task_id, error);
                    }
                }
            }
        }

        self.job_descriptor.flush_job_status();
        let outcome = match (self.job_descriptor.status, failure) {
            (JobStatus::Completed, None) => Ok(JobSummary {
                job_id: self.job_descriptor.job_id,
                job_name: self.job_descriptor.job_name.clone(),
                elapsed: self.started.elapsed(),
                num_tasks: self.job_descriptor.task_descriptors.len(),
            }),
            (_, Some(failure)) => Err(failure),
            (_, None) => Err(JobFailure::cancelled()),
        };

        match &outcome {
            Ok(summary) => {
                info!("{}", summary);
                self.status.store(JobStatus::Completed, Ordering::SeqCst);
            }
            Err(failure) => {
                error!(
                    "{} `{}`: {}",
                    self.job_descriptor.job_id, self.job_descriptor.job_name, failure
                );
                self.status.store(JobStatus::Failed, Ordering::SeqCst);
            }
        }
        self.outcome_sender.send_replace(Some(outcome));
    }

    fn vertex_name(&self, task_id: &TaskId) -> String {
        self.job_descriptor
            .task_descriptors
            .iter()
            .find(|t| t.task_id.eq(task_id))
            .map(|t| t.vertex_name.clone())
            .unwrap_or_default()
    }
}
