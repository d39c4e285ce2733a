//! Core graph data structures

mod checkpoint;
mod cluster;
mod edge;
mod id;
mod node;
mod taxonomy;

pub use checkpoint::{Checkpoint, CheckpointSource};
pub use cluster::{Cluster, ClusterDiff, ClusterType};
pub use edge::{Edge, EdgeKey, EdgeType};
pub use id::{
    CheckpointId, ClusterId, ContactId, DomainId, EdgeId, FieldId, MasterEntryId, NodeId, OwnerId,
    TaskId,
};
pub use node::{normalize_key, Direction, Node, NodeType, SourceContext, UnderstandingLevel};
pub use taxonomy::{Classification, Domain, Field, MasterEntry, Taxonomy};
