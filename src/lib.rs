//! Lexigraph: per-owner concept graphs extracted from everyday text
//!
//! Text a person sends, receives or writes is mined for keywords, persons
//! and projects. Each concept becomes a node in that owner's graph, gaining
//! frequency and an understanding level as it recurs; concepts seen together
//! are joined by weighted co-occurrence edges.
//!
//! # Core Concepts
//!
//! - **Nodes**: one per `(normalized label, type, owner)`, with full sighting history
//! - **Edges**: undirected co-occurrence links, optionally scoped to a task
//! - **Clusters**: a task's ideation and result phases, and the diff between them
//! - **Checkpoints**: immutable snapshots of a task's active node set
//! - **Taxonomy**: shared domain → field → master entry hierarchy
//!
//! # Example
//!
//! ```
//! use lexigraph::{Config, KnowledgeApi};
//!
//! let api = KnowledgeApi::in_memory(Config::default());
//! // API is ready for use
//! ```

pub mod accumulator;
pub mod api;
pub mod checkpoints;
pub mod classifier;
pub mod clusters;
pub mod collaborator;
pub mod config;
pub mod cooccurrence;
pub mod error;
pub mod extraction;
mod graph;
pub mod mcp;
pub mod pipeline;
pub mod storage;
pub mod worker;

pub use accumulator::{NodeAccumulator, ProcessTextRequest};
pub use api::{ApiError, ImportSummary, KnowledgeApi};
pub use config::Config;
pub use error::{LexigraphError, LexigraphResult};
pub use graph::{
    normalize_key, Checkpoint, CheckpointId, CheckpointSource, Classification, Cluster,
    ClusterDiff, ClusterId, ClusterType, ContactId, Direction, Domain, DomainId, Edge, EdgeId,
    EdgeKey, EdgeType, Field, FieldId, MasterEntry, MasterEntryId, Node, NodeId, NodeType,
    OwnerId, SourceContext, TaskId, Taxonomy, UnderstandingLevel,
};
pub use pipeline::{IngestPipeline, ProcessOutcome};
pub use storage::{GraphStore, MemoryStore, NodeFilter, OpenStore, SqliteStore, StorageError, StorageResult};
pub use worker::{ExtractionWorker, WorkerStats};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
