use flowlink_core::dag::Dag;
use flowlink_core::job::{JobDescriptor, JobStatus, TaskDescriptor, TaskStatus};
use flowlink_core::JobId;

use crate::dag::execution_graph::ExecutionGraph;
use crate::utils::date_time::current_timestamp_millis;

pub(crate) fn worker_id(index: usize) -> String {
    format!("worker_{}", index)
}

/// Allocate every task to one of `num_workers` workers, round robin in topological order
pub(crate) fn build_job_descriptor(
    job_id: JobId,
    job_name: &str,
    dag: &Dag,
    execution_graph: &ExecutionGraph,
    num_workers: usize,
) -> JobDescriptor {
    let num_workers = num_workers.max(1);

    let task_descriptors = execution_graph
        .task_ids()
        .iter()
        .enumerate()
        .map(|(index, task_id)| TaskDescriptor {
            task_id: *task_id,
            vertex_name: dag.vertex(task_id.vertex_id).name.clone(),
            worker_id: worker_id(index % num_workers),
            status: TaskStatus::Pending,
        })
        .collect();

    JobDescriptor {
        job_id,
        job_name: job_name.to_string(),
        status: JobStatus::NotStarted,
        start_timestamp: current_timestamp_millis(),
        task_descriptors,
    }
}

#[cfg(test)]
mod tests {
    use flowlink_core::dag::DagBuilder;
    use flowlink_core::item::Item;
    use flowlink_core::job::JobStatus;
    use flowlink_core::JobId;

    use crate::dag::execution_graph::ExecutionGraph;
    use crate::processors::{map, read_list, write_list};
    use crate::runtime::coordinator::task_distribution::build_job_descriptor;
    use crate::storage::list::mem_list_storage::MemoryListStore;
    use crate::storage::list::ListStore;

    #[test]
    pub fn round_robin_allocation_test() {
        let store = ListStore::memory(MemoryListStore::new());
        let mut builder = DagBuilder::new();
        let source = builder.new_vertex("source", read_list(store.clone(), "source"), 1);
        let mapper = builder.new_vertex("map", map(|item: Item| Ok(item)), 4);
        let sink = builder.new_vertex("sink", write_list(store, "sink"), 1);
        builder.connect(source, mapper).connect(mapper, sink);
        let dag = builder.build().unwrap();
        let execution_graph = ExecutionGraph::build(&dag).unwrap();

        let job_descriptor = build_job_descriptor(JobId(3), "test", &dag, &execution_graph, 2);
        assert_eq!(job_descriptor.status, JobStatus::NotStarted);
        assert_eq!(job_descriptor.task_descriptors.len(), 6);

        let workers: Vec<&str> = job_descriptor
            .task_descriptors
            .iter()
            .map(|t| t.worker_id.as_str())
            .collect();
        assert_eq!(
            workers,
            vec!["worker_0", "worker_1", "worker_0", "worker_1", "worker_0", "worker_1"]
        );
        assert_eq!(job_descriptor.task_descriptors[0].vertex_name, "source");
        assert_eq!(job_descriptor.task_descriptors[5].vertex_name, "sink");
    }
}
