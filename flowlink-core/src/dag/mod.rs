//! DAG description and build time validation
//! DagBuilder -> Dag -> (runtime) JobGraph -> ExecutionGraph

use std::collections::{HashMap, HashSet, VecDeque};
use std::ops::Index;
use std::sync::atomic::{AtomicU64, Ordering};

use daggy::petgraph::algo::toposort;
use daggy::{NodeIndex, Walker};

use crate::error::ValidationError;
use crate::function::{Processor, VertexKind};
use crate::VertexId;

static BUILDER_ID: AtomicU64 = AtomicU64::new(0);

/// How an edge distributes upstream items across the downstream instances
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub enum Partitioner {
    /// each producer instance cycles over every consumer instance
    RoundRobin,
    /// producer instance `i` feeds consumer instance `i`. requires equal parallelism
    Forward,
    /// by murmur3 hash of the item
    Hash,
    /// every consumer instance receives every item
    Broadcast,
}

impl Default for Partitioner {
    fn default() -> Self {
        Partitioner::RoundRobin
    }
}

/// Handle of a vertex inside the builder that created it
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub struct VertexRef {
    builder_id: u64,
    vertex_id: VertexId,
}

impl VertexRef {
    pub fn vertex_id(&self) -> VertexId {
        self.vertex_id
    }
}

#[derive(Clone, Debug)]
pub struct Vertex {
    pub id: VertexId,
    pub name: String,
    pub processor: Processor,
    pub parallelism: u16,
}

impl Vertex {
    pub fn kind(&self) -> VertexKind {
        self.processor.kind()
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub struct Edge {
    pub upstream: VertexId,
    pub downstream: VertexId,
    pub partitioner: Partitioner,
}

#[derive(Debug)]
pub struct DagBuilder {
    id: u64,
    vertices: Vec<Vertex>,
    edges: Vec<(VertexRef, VertexRef, Partitioner)>,
}

impl DagBuilder {
    pub fn new() -> Self {
        DagBuilder {
            id: BUILDER_ID.fetch_add(1, Ordering::SeqCst),
            vertices: Vec::new(),
            edges: Vec::new(),
        }
    }

    pub fn new_vertex(&mut self, name: &str, processor: Processor, parallelism: u16) -> VertexRef {
        let vertex_id = VertexId(self.vertices.len() as u32);
        self.vertices.push(Vertex {
            id: vertex_id,
            name: name.to_string(),
            processor,
            parallelism,
        });

        VertexRef {
            builder_id: self.id,
            vertex_id,
        }
    }

    /// connect with the default round-robin partitioning
    pub fn connect(&mut self, upstream: VertexRef, downstream: VertexRef) -> &mut Self {
        self.connect_with(upstream, downstream, Partitioner::default())
    }

    pub fn connect_with(
        &mut self,
        upstream: VertexRef,
        downstream: VertexRef,
        partitioner: Partitioner,
    ) -> &mut Self {
        self.edges.push((upstream, downstream, partitioner));
        self
    }

    pub fn build(self) -> Result<Dag, ValidationError> {
        if self.vertices.is_empty() {
            return Err(ValidationError::Empty);
        }

        let mut names = HashSet::new();
        for vertex in &self.vertices {
            if vertex.parallelism == 0 {
                return Err(ValidationError::ZeroParallelism(vertex.name.clone()));
            }
            if !names.insert(vertex.name.as_str()) {
                return Err(ValidationError::DuplicateVertexName(vertex.name.clone()));
            }
        }

        let mut edges = Vec::with_capacity(self.edges.len());
        for (upstream, downstream, partitioner) in &self.edges {
            if !self.contains(upstream) || !self.contains(downstream) {
                return Err(ValidationError::DanglingEdge);
            }
            edges.push(Edge {
                upstream: upstream.vertex_id,
                downstream: downstream.vertex_id,
                partitioner: *partitioner,
            });
        }

        let dag = Dag::new(self.vertices, edges)?;
        dag.validate()?;
        Ok(dag)
    }

    fn contains(&self, vertex_ref: &VertexRef) -> bool {
        vertex_ref.builder_id == self.id
            && (vertex_ref.vertex_id.0 as usize) < self.vertices.len()
    }
}

/// A validated, acyclic DAG
#[derive(Debug, Clone)]
pub struct Dag {
    vertices: Vec<Vertex>,
    edges: Vec<Edge>,
    graph: daggy::Dag<VertexId, Partitioner>,
    node_indies: HashMap<VertexId, NodeIndex>,
    topological_order: Vec<VertexId>,
}

impl Dag {
    fn new(vertices: Vec<Vertex>, edges: Vec<Edge>) -> Result<Self, ValidationError> {
        let mut graph = daggy::Dag::new();
        let mut node_indies = HashMap::new();
        for vertex in &vertices {
            let node_index = graph.add_node(vertex.id);
            node_indies.insert(vertex.id, node_index);
        }

        let mut edge_set = HashSet::new();
        for edge in &edges {
            let upstream = vertices[edge.upstream.0 as usize].name.clone();
            let downstream = vertices[edge.downstream.0 as usize].name.clone();

            if !edge_set.insert((edge.upstream, edge.downstream)) {
                return Err(ValidationError::DuplicateEdge {
                    upstream,
                    downstream,
                });
            }

            graph
                .add_edge(
                    node_indies[&edge.upstream],
                    node_indies[&edge.downstream],
                    edge.partitioner,
                )
                .map_err(|_e| ValidationError::WouldCycle {
                    upstream,
                    downstream,
                })?;
        }

        let topological_order: Vec<VertexId> = toposort(graph.graph(), None)
            .map_err(|cycle| {
                let name = vertices[graph.index(cycle.node_id()).0 as usize].name.clone();
                ValidationError::WouldCycle {
                    upstream: name.clone(),
                    downstream: name,
                }
            })?
            .into_iter()
            .map(|node_index| *graph.index(node_index))
            .collect();

        debug!("dag topological order {:?}", topological_order);

        Ok(Dag {
            vertices,
            edges,
            graph,
            node_indies,
            topological_order,
        })
    }

    fn validate(&self) -> Result<(), ValidationError> {
        let sources: Vec<VertexId> = self
            .vertices
            .iter()
            .filter(|v| v.kind() == VertexKind::Source)
            .map(|v| v.id)
            .collect();
        if sources.is_empty() {
            return Err(ValidationError::SourceNotFound);
        }

        for vertex in &self.vertices {
            let has_input = !self.inputs(vertex.id).is_empty();
            let has_output = !self.outputs(vertex.id).is_empty();
            match vertex.kind() {
                VertexKind::Source if has_input => {
                    return Err(ValidationError::SourceWithInput(vertex.name.clone()));
                }
                VertexKind::Sink if has_output => {
                    return Err(ValidationError::SinkWithOutput(vertex.name.clone()));
                }
                VertexKind::Source if !has_output && self.vertices.len() > 1 => {
                    return Err(ValidationError::IsolatedVertex(vertex.name.clone()));
                }
                _ => {}
            }
        }

        // breadth first walk from every source
        let mut reached: HashSet<VertexId> = HashSet::new();
        let mut queue: VecDeque<VertexId> = sources.into_iter().collect();
        while let Some(vertex_id) = queue.pop_front() {
            if !reached.insert(vertex_id) {
                continue;
            }
            for child in self.children(vertex_id) {
                queue.push_back(child);
            }
        }

        match self.vertices.iter().find(|v| !reached.contains(&v.id)) {
            Some(vertex) => Err(ValidationError::Unreachable(vertex.name.clone())),
            None => Ok(()),
        }
    }

    pub fn vertices(&self) -> &[Vertex] {
        self.vertices.as_slice()
    }

    pub fn vertex(&self, vertex_id: VertexId) -> &Vertex {
        &self.vertices[vertex_id.0 as usize]
    }

    pub fn edges(&self) -> &[Edge] {
        self.edges.as_slice()
    }

    /// vertices ordered so that every edge points forward
    pub fn topological_order(&self) -> &[VertexId] {
        self.topological_order.as_slice()
    }

    pub fn children(&self, vertex_id: VertexId) -> Vec<VertexId> {
        let node_index = self.node_indies[&vertex_id];
        self.graph
            .children(node_index)
            .iter(&self.graph)
            .map(|(_edge, node)| *self.graph.index(node))
            .collect()
    }

    pub fn inputs(&self, vertex_id: VertexId) -> Vec<&Edge> {
        self.edges
            .iter()
            .filter(|e| e.downstream == vertex_id)
            .collect()
    }

    pub fn outputs(&self, vertex_id: VertexId) -> Vec<&Edge> {
        self.edges
            .iter()
            .filter(|e| e.upstream == vertex_id)
            .collect()
    }

    pub fn sources(&self) -> Vec<&Vertex> {
        self.vertices_of(VertexKind::Source)
    }

    pub fn sinks(&self) -> Vec<&Vertex> {
        self.vertices_of(VertexKind::Sink)
    }

    fn vertices_of(&self, kind: VertexKind) -> Vec<&Vertex> {
        self.vertices.iter().filter(|v| v.kind() == kind).collect()
    }
}

#[cfg(test)]
mod tests {
    use crate::dag::{DagBuilder, Partitioner};
    use crate::error::ValidationError;
    use crate::function::{Context, Function, InputFormat, MapFunction, OutputFormat, Processor};
    use crate::item::Item;

    struct Empty;

    impl Function for Empty {
        fn name(&self) -> &str {
            "Empty"
        }
    }

    #[async_trait]
    impl InputFormat for Empty {
        async fn open(&mut self, _context: &Context) -> anyhow::Result<()> {
            Ok(())
        }

        async fn next(&mut self) -> anyhow::Result<Option<Item>> {
            Ok(None)
        }

        async fn close(&mut self) -> anyhow::Result<()> {
            Ok(())
        }
    }

    #[async_trait]
    impl MapFunction for Empty {
        async fn map(&mut self, item: Item) -> anyhow::Result<Item> {
            Ok(item)
        }
    }

    #[async_trait]
    impl OutputFormat for Empty {
        async fn open(&mut self, _context: &Context) -> anyhow::Result<()> {
            Ok(())
        }

        async fn write(&mut self, _item: Item) -> anyhow::Result<()> {
            Ok(())
        }

        async fn close(&mut self) -> anyhow::Result<()> {
            Ok(())
        }
    }

    fn source() -> Processor {
        Processor::source(|| Empty)
    }

    fn map() -> Processor {
        Processor::map(|| Empty)
    }

    fn sink() -> Processor {
        Processor::sink(|| Empty)
    }

    #[test]
    pub fn pipeline_test() {
        let mut builder = DagBuilder::new();
        let sink_ref = builder.new_vertex("sink", sink(), 1);
        let map_ref = builder.new_vertex("map", map(), 4);
        let source_ref = builder.new_vertex("source", source(), 1);
        builder.connect(source_ref, map_ref).connect(map_ref, sink_ref);

        let dag = builder.build().unwrap();
        let order: Vec<&str> = dag
            .topological_order()
            .iter()
            .map(|id| dag.vertex(*id).name.as_str())
            .collect();
        assert_eq!(order, vec!["source", "map", "sink"]);
        assert_eq!(dag.sources().len(), 1);
        assert_eq!(dag.sinks().len(), 1);
        assert_eq!(dag.outputs(map_ref.vertex_id()).len(), 1);
        assert_eq!(
            dag.outputs(source_ref.vertex_id())[0].partitioner,
            Partitioner::RoundRobin
        );
    }

    #[test]
    pub fn cycle_test() {
        let mut builder = DagBuilder::new();
        let source_ref = builder.new_vertex("source", source(), 1);
        let map0 = builder.new_vertex("map0", map(), 1);
        let map1 = builder.new_vertex("map1", map(), 1);
        builder
            .connect(source_ref, map0)
            .connect(map0, map1)
            .connect(map1, map0);

        match builder.build() {
            Err(ValidationError::WouldCycle { .. }) => {}
            other => panic!("unexpected {:?}", other.map(|_| ())),
        }
    }

    #[test]
    pub fn self_loop_test() {
        let mut builder = DagBuilder::new();
        let source_ref = builder.new_vertex("source", source(), 1);
        let map_ref = builder.new_vertex("map", map(), 1);
        builder.connect(source_ref, map_ref).connect(map_ref, map_ref);

        assert!(matches!(
            builder.build(),
            Err(ValidationError::WouldCycle { .. })
        ));
    }

    #[test]
    pub fn duplicate_name_test() {
        let mut builder = DagBuilder::new();
        let source_ref = builder.new_vertex("v", source(), 1);
        let sink_ref = builder.new_vertex("v", sink(), 1);
        builder.connect(source_ref, sink_ref);

        assert_eq!(
            builder.build().unwrap_err(),
            ValidationError::DuplicateVertexName("v".to_string())
        );
    }

    #[test]
    pub fn unreachable_test() {
        let mut builder = DagBuilder::new();
        let source_ref = builder.new_vertex("source", source(), 1);
        let sink_ref = builder.new_vertex("sink", sink(), 1);
        let map_ref = builder.new_vertex("orphan", map(), 1);
        let other_sink = builder.new_vertex("other", sink(), 1);
        builder.connect(source_ref, sink_ref).connect(map_ref, other_sink);

        assert_eq!(
            builder.build().unwrap_err(),
            ValidationError::Unreachable("orphan".to_string())
        );
    }

    #[test]
    pub fn dangling_edge_test() {
        let mut other = DagBuilder::new();
        let foreign = other.new_vertex("sink", sink(), 1);

        let mut builder = DagBuilder::new();
        let source_ref = builder.new_vertex("source", source(), 1);
        builder.connect(source_ref, foreign);

        assert_eq!(builder.build().unwrap_err(), ValidationError::DanglingEdge);
    }

    #[test]
    pub fn kind_constraints_test() {
        let mut builder = DagBuilder::new();
        let source_ref = builder.new_vertex("source", source(), 1);
        let sink_ref = builder.new_vertex("sink", sink(), 1);
        let map_ref = builder.new_vertex("map", map(), 1);
        builder.connect(source_ref, sink_ref).connect(sink_ref, map_ref);
        assert_eq!(
            builder.build().unwrap_err(),
            ValidationError::SinkWithOutput("sink".to_string())
        );

        let mut builder = DagBuilder::new();
        let map_ref = builder.new_vertex("map", map(), 1);
        let sink_ref = builder.new_vertex("sink", sink(), 1);
        builder.connect(map_ref, sink_ref);
        assert_eq!(builder.build().unwrap_err(), ValidationError::SourceNotFound);

        let mut builder = DagBuilder::new();
        builder.new_vertex("source", source(), 0);
        assert_eq!(
            builder.build().unwrap_err(),
            ValidationError::ZeroParallelism("source".to_string())
        );

        assert_eq!(DagBuilder::new().build().unwrap_err(), ValidationError::Empty);
    }

    #[test]
    pub fn sole_source_test() {
        let mut builder = DagBuilder::new();
        builder.new_vertex("source", source(), 2);
        let dag = builder.build().unwrap();
        assert_eq!(dag.vertices().len(), 1);
        assert!(dag.edges().is_empty());
    }

    #[test]
    pub fn duplicate_edge_test() {
        let mut builder = DagBuilder::new();
        let source_ref = builder.new_vertex("source", source(), 1);
        let sink_ref = builder.new_vertex("sink", sink(), 1);
        builder
            .connect(source_ref, sink_ref)
            .connect_with(source_ref, sink_ref, Partitioner::Broadcast);

        assert!(matches!(
            builder.build(),
            Err(ValidationError::DuplicateEdge { .. })
        ));
    }
}
