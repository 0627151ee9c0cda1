//! Dag -> ExecutionGraph, the vertex instances and the channels between them

pub mod execution_graph;
