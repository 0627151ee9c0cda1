#[macro_use]
extern crate serde_derive;
#[macro_use]
extern crate anyhow;
#[macro_use]
extern crate async_trait;
#[macro_use]
extern crate atomic_enum;
#[macro_use]
extern crate log;

pub mod channel;
pub mod cluster;
pub mod dag;
pub mod element;
pub mod error;
pub mod function;
pub mod item;
pub mod job;
pub mod metrics;
pub mod properties;

use crate::metrics::Tag;

#[derive(
    Copy, Clone, Serialize, Deserialize, Debug, Eq, PartialEq, Hash, Default, Ord, PartialOrd,
)]
pub struct JobId(pub u64);

impl std::ops::Deref for JobId {
    type Target = u64;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl std::fmt::Display for JobId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "job-{}", self.0)
    }
}

/// Position of a vertex in the `DagBuilder` that created it
#[derive(
    Copy, Clone, Serialize, Deserialize, Debug, Eq, PartialEq, Hash, Default, Ord, PartialOrd,
)]
pub struct VertexId(pub u32);

impl std::ops::Deref for VertexId {
    type Target = u32;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

/// One running instance of a vertex
#[derive(Copy, Clone, Serialize, Deserialize, Debug, Eq, PartialEq, Hash, Default)]
pub struct TaskId {
    pub vertex_id: VertexId,
    pub task_number: u16,
    /// total number of instances of the vertex. same as `parallelism`
    pub num_tasks: u16,
}

impl TaskId {
    pub fn to_tags(&self) -> Vec<Tag> {
        vec![
            Tag::new("vertex_id", self.vertex_id.0),
            Tag::new("task_number", self.task_number),
        ]
    }
}

impl std::fmt::Display for TaskId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}#{}/{}",
            self.vertex_id.0, self.task_number, self.num_tasks
        )
    }
}

/// mark where the data is now and where did it come from
///
/// ```text
///                  ┌──────────────────┐
/// Source Task ────►│     channel      ├────► Target Task
///                  └──────────────────┘
/// ```
#[derive(Copy, Clone, Debug, Serialize, Deserialize, Eq, PartialEq, Hash, Default)]
pub struct ChannelKey {
    pub source_task_id: TaskId,
    pub target_task_id: TaskId,
}

impl ChannelKey {
    pub fn to_tags(&self) -> Vec<Tag> {
        vec![
            Tag::new("source_vertex_id", self.source_task_id.vertex_id.0),
            Tag::new("source_task_number", self.source_task_id.task_number),
            Tag::new("target_vertex_id", self.target_task_id.vertex_id.0),
            Tag::new("target_task_number", self.target_task_id.task_number),
        ]
    }
}
