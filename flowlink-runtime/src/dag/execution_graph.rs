use std::collections::HashMap;
use std::ops::Index;

use daggy::{Dag, NodeIndex, Walker};
use flowlink_core::dag::{self, Partitioner};
use flowlink_core::error::ValidationError;
use flowlink_core::{ChannelKey, TaskId, VertexId};

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ExecutionNode {
    pub task_id: TaskId,
    pub vertex_name: String,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ExecutionEdge {
    pub partitioner: Partitioner,
}

/// One node per vertex instance, one edge per producer/consumer channel
#[derive(Clone, Debug)]
pub struct ExecutionGraph {
    pub(crate) node_indies: HashMap<TaskId, NodeIndex>,
    pub(crate) dag: Dag<ExecutionNode, ExecutionEdge>,
    /// instances of each vertex, by task number
    vertex_tasks: HashMap<VertexId, Vec<TaskId>>,
    /// every instance, vertices in topological order
    task_ids: Vec<TaskId>,
}

impl ExecutionGraph {
    pub fn build(job_dag: &dag::Dag) -> Result<Self, ValidationError> {
        let mut execution_graph = ExecutionGraph {
            node_indies: HashMap::new(),
            dag: Dag::new(),
            vertex_tasks: HashMap::new(),
            task_ids: Vec::new(),
        };

        execution_graph.build_nodes(job_dag);
        execution_graph.build_edges(job_dag)?;
        Ok(execution_graph)
    }

    fn build_nodes(&mut self, job_dag: &dag::Dag) {
        for vertex_id in job_dag.topological_order() {
            let vertex = job_dag.vertex(*vertex_id);

            let mut task_ids = Vec::with_capacity(vertex.parallelism as usize);
            for task_number in 0..vertex.parallelism {
                let task_id = TaskId {
                    vertex_id: vertex.id,
                    task_number,
                    num_tasks: vertex.parallelism,
                };
                let execution_node = ExecutionNode {
                    task_id,
                    vertex_name: vertex.name.clone(),
                };

                let node_index = self.dag.add_node(execution_node);
                self.node_indies.insert(task_id, node_index);
                task_ids.push(task_id);
            }

            self.task_ids.extend(task_ids.iter());
            self.vertex_tasks.insert(vertex.id, task_ids);
        }
    }

    fn build_edges(&mut self, job_dag: &dag::Dag) -> Result<(), ValidationError> {
        for edge in job_dag.edges() {
            let upstream_tasks = self.vertex_tasks[&edge.upstream].clone();
            let downstream_tasks = self.vertex_tasks[&edge.downstream].clone();
            let execution_edge = ExecutionEdge {
                partitioner: edge.partitioner,
            };

            match edge.partitioner {
                Partitioner::Forward => {
                    // pairwise execution edges
                    if upstream_tasks.len() != downstream_tasks.len() {
                        return Err(ValidationError::ForwardParallelismMismatch {
                            upstream: job_dag.vertex(edge.upstream).name.clone(),
                            downstream: job_dag.vertex(edge.downstream).name.clone(),
                            upstream_parallelism: upstream_tasks.len() as u16,
                            downstream_parallelism: downstream_tasks.len() as u16,
                        });
                    }

                    for (upstream, downstream) in upstream_tasks.iter().zip(downstream_tasks.iter())
                    {
                        self.add_edge(upstream, downstream, execution_edge.clone())?;
                    }
                }
                _ => {
                    // cartesian product execution edges
                    for upstream in &upstream_tasks {
                        for downstream in &downstream_tasks {
                            self.add_edge(upstream, downstream, execution_edge.clone())?;
                        }
                    }
                }
            }
        }

        Ok(())
    }

    fn add_edge(
        &mut self,
        upstream: &TaskId,
        downstream: &TaskId,
        execution_edge: ExecutionEdge,
    ) -> Result<(), ValidationError> {
        let upstream_index = self.node_indies[upstream];
        let downstream_index = self.node_indies[downstream];
        self.dag
            .add_edge(upstream_index, downstream_index, execution_edge)
            .map_err(|_e| ValidationError::WouldCycle {
                upstream: self.dag.index(upstream_index).vertex_name.clone(),
                downstream: self.dag.index(downstream_index).vertex_name.clone(),
            })?;
        Ok(())
    }

    pub fn task_ids(&self) -> &[TaskId] {
        self.task_ids.as_slice()
    }

    pub fn vertex_tasks(&self, vertex_id: VertexId) -> &[TaskId] {
        self.vertex_tasks
            .get(&vertex_id)
            .map(|task_ids| task_ids.as_slice())
            .unwrap_or_default()
    }

    pub fn node(&self, task_id: &TaskId) -> Option<&ExecutionNode> {
        self.node_indies
            .get(task_id)
            .map(|node_index| self.dag.index(*node_index))
    }

    /// consumers of `task_id`, ordered by vertex then task number
    pub fn children(&self, task_id: &TaskId) -> Vec<(&ExecutionNode, &ExecutionEdge)> {
        let mut children: Vec<(&ExecutionNode, &ExecutionEdge)> = match self.node_indies.get(task_id) {
            Some(node_index) => self
                .dag
                .children(*node_index)
                .iter(&self.dag)
                .map(|(edge, node)| (self.dag.index(node), self.dag.index(edge)))
                .collect(),
            None => vec![],
        };
        children.sort_by_key(|(node, _)| (node.task_id.vertex_id, node.task_id.task_number));
        children
    }

    /// producers of `task_id`, ordered by vertex then task number
    pub fn parents(&self, task_id: &TaskId) -> Vec<(&ExecutionNode, &ExecutionEdge)> {
        let mut parents: Vec<(&ExecutionNode, &ExecutionEdge)> = match self.node_indies.get(task_id) {
            Some(node_index) => self
                .dag
                .parents(*node_index)
                .iter(&self.dag)
                .map(|(edge, node)| (self.dag.index(node), self.dag.index(edge)))
                .collect(),
            None => vec![],
        };
        parents.sort_by_key(|(node, _)| (node.task_id.vertex_id, node.task_id.task_number));
        parents
    }

    /// one key per execution edge
    pub fn channel_keys(&self) -> Vec<ChannelKey> {
        self.dag
            .raw_edges()
            .iter()
            .map(|edge| ChannelKey {
                source_task_id: self.dag.index(edge.source()).task_id,
                target_task_id: self.dag.index(edge.target()).task_id,
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use flowlink_core::dag::{DagBuilder, Partitioner};
    use flowlink_core::error::ValidationError;
    use flowlink_core::function::Processor;
    use flowlink_core::item::Item;

    use crate::dag::execution_graph::ExecutionGraph;
    use crate::processors::{map, read_list, write_list};
    use crate::storage::list::mem_list_storage::MemoryListStore;
    use crate::storage::list::ListStore;

    fn processors() -> (Processor, Processor, Processor) {
        let store = ListStore::memory(MemoryListStore::new());
        (
            read_list(store.clone(), "source"),
            map(|item: Item| Ok(item)),
            write_list(store, "sink"),
        )
    }

    #[test]
    pub fn cartesian_test() {
        let (source, mapper, sink) = processors();
        let mut builder = DagBuilder::new();
        let s = builder.new_vertex("source", source, 2);
        let m = builder.new_vertex("map", mapper, 3);
        let k = builder.new_vertex("sink", sink, 1);
        builder.connect(s, m).connect(m, k);
        let dag = builder.build().unwrap();

        let execution_graph = ExecutionGraph::build(&dag).unwrap();
        assert_eq!(execution_graph.task_ids().len(), 6);
        assert_eq!(execution_graph.channel_keys().len(), 2 * 3 + 3);

        let source_task = execution_graph.vertex_tasks(s.vertex_id())[1];
        let children = execution_graph.children(&source_task);
        let numbers: Vec<u16> = children.iter().map(|(n, _)| n.task_id.task_number).collect();
        assert_eq!(numbers, vec![0, 1, 2]);

        let sink_task = execution_graph.vertex_tasks(k.vertex_id())[0];
        assert_eq!(execution_graph.parents(&sink_task).len(), 3);

        // sources come first
        assert_eq!(execution_graph.task_ids()[0].vertex_id, s.vertex_id());
    }

    #[test]
    pub fn forward_test() {
        let (source, mapper, sink) = processors();
        let mut builder = DagBuilder::new();
        let s = builder.new_vertex("source", source, 2);
        let m = builder.new_vertex("map", mapper, 2);
        let k = builder.new_vertex("sink", sink, 1);
        builder
            .connect_with(s, m, Partitioner::Forward)
            .connect(m, k);
        let execution_graph = ExecutionGraph::build(&builder.build().unwrap()).unwrap();

        for task_id in execution_graph.vertex_tasks(s.vertex_id()) {
            let children = execution_graph.children(task_id);
            assert_eq!(children.len(), 1);
            assert_eq!(children[0].0.task_id.task_number, task_id.task_number);
            assert_eq!(children[0].1.partitioner, Partitioner::Forward);
        }
    }

    #[test]
    pub fn forward_mismatch_test() {
        let (source, mapper, sink) = processors();
        let mut builder = DagBuilder::new();
        let s = builder.new_vertex("source", source, 1);
        let m = builder.new_vertex("map", mapper, 4);
        let k = builder.new_vertex("sink", sink, 1);
        builder
            .connect_with(s, m, Partitioner::Forward)
            .connect(m, k);

        let e = ExecutionGraph::build(&builder.build().unwrap()).unwrap_err();
        assert_eq!(
            e,
            ValidationError::ForwardParallelismMismatch {
                upstream: "source".to_string(),
                downstream: "map".to_string(),
                upstream_parallelism: 1,
                downstream_parallelism: 4,
            }
        );
    }
}
