//! Storage trait definitions

use crate::graph::{
    Checkpoint, Cluster, ClusterType, Domain, Edge, EdgeKey, Field, MasterEntry, Node, NodeId,
    NodeType, OwnerId, SourceContext, TaskId, Taxonomy, UnderstandingLevel,
};
use std::collections::BTreeSet;
use std::path::Path;
use thiserror::Error;

/// Errors that can occur during storage operations
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Invalid record in {table}: {reason}")]
    InvalidRecord { table: &'static str, reason: String },

    #[error("Node not found: {0}")]
    NodeNotFound(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Date parsing error: {0}")]
    DateParse(String),
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// One sighting of a label, as handed to [`GraphStore::record_sighting`]
#[derive(Debug, Clone)]
pub struct Sighting {
    pub label: String,
    pub node_type: NodeType,
    pub owner_id: OwnerId,
    pub context: SourceContext,
}

/// Filter criteria for listing nodes
#[derive(Debug, Clone, Default)]
pub struct NodeFilter {
    pub node_type: Option<NodeType>,
    /// Only nodes at or above this level
    pub min_level: Option<UnderstandingLevel>,
    pub confirmed: Option<bool>,
    /// Maximum number of results
    pub limit: Option<usize>,
}

impl NodeFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_type(mut self, node_type: NodeType) -> Self {
        self.node_type = Some(node_type);
        self
    }

    pub fn with_min_level(mut self, level: UnderstandingLevel) -> Self {
        self.min_level = Some(level);
        self
    }

    pub fn with_confirmed(mut self, confirmed: bool) -> Self {
        self.confirmed = Some(confirmed);
        self
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// In-process predicate, used by backends that filter after loading
    pub fn matches(&self, node: &Node) -> bool {
        self.node_type.map_or(true, |t| node.node_type == t)
            && self.min_level.map_or(true, |l| node.understanding_level >= l)
            && self.confirmed.map_or(true, |c| node.confirmed == c)
    }
}

/// Order nodes the way listings present them: most frequent first, then label.
pub(crate) fn sort_for_listing(nodes: &mut [Node]) {
    nodes.sort_by(|a, b| {
        b.frequency
            .cmp(&a.frequency)
            .then_with(|| a.normalized_key.cmp(&b.normalized_key))
            .then_with(|| a.node_type.cmp(&b.node_type))
    });
}

/// Storage port for the concept graph.
///
/// Every upsert here must be safe under concurrent writers without any
/// locking by the caller: uniqueness lives in the backend (a constraint or an
/// index entry), and a write that loses a race re-reads and merges.
///
/// Implementations must be thread-safe (Send + Sync).
pub trait GraphStore: Send + Sync {
    // === Node Operations ===

    /// Find or create the node for `(normalize(label), type, owner)` and append
    /// the sighting's context. Returns the node after the append.
    fn record_sighting(&self, sighting: &Sighting) -> StorageResult<Node>;

    /// Load a node by ID within an owner's partition
    fn load_node(&self, owner_id: &OwnerId, node_id: &NodeId) -> StorageResult<Option<Node>>;

    /// Look a node up by its identity triple
    fn find_node(
        &self,
        owner_id: &OwnerId,
        node_type: NodeType,
        normalized_key: &str,
    ) -> StorageResult<Option<Node>>;

    /// List an owner's nodes matching the filter, most frequent first
    fn find_nodes(&self, owner_id: &OwnerId, filter: &NodeFilter) -> StorageResult<Vec<Node>>;

    /// Persist the link fields of a node (taxonomy ids, contact, confirmed).
    ///
    /// Sighting history is never written through here, so a concurrent
    /// `record_sighting` is not lost.
    fn update_node_links(&self, node: &Node) -> StorageResult<()>;

    // === Edge Operations ===

    /// Insert the edge with weight 1, or add 1 to the existing weight
    fn bump_edge(&self, key: &EdgeKey, owner_id: &OwnerId) -> StorageResult<Edge>;

    /// List an owner's edges; `task_id = None` lists every scope
    fn list_edges(&self, owner_id: &OwnerId, task_id: Option<&TaskId>) -> StorageResult<Vec<Edge>>;

    // === Cluster Operations ===

    /// Union `node_ids` into the cluster for the key, creating it if needed
    fn merge_cluster(
        &self,
        task_id: &TaskId,
        owner_id: &OwnerId,
        cluster_type: ClusterType,
        node_ids: &BTreeSet<NodeId>,
        summary: Option<&str>,
    ) -> StorageResult<Cluster>;

    fn load_cluster(
        &self,
        task_id: &TaskId,
        owner_id: &OwnerId,
        cluster_type: ClusterType,
    ) -> StorageResult<Option<Cluster>>;

    // === Checkpoint Operations ===

    /// Append an immutable checkpoint
    fn append_checkpoint(&self, checkpoint: &Checkpoint) -> StorageResult<()>;

    /// Checkpoints matching the optional filters, oldest first
    fn list_checkpoints(
        &self,
        task_id: Option<&TaskId>,
        owner_id: Option<&OwnerId>,
    ) -> StorageResult<Vec<Checkpoint>>;

    // === Taxonomy Operations ===

    fn save_domain(&self, domain: &Domain) -> StorageResult<()>;

    fn save_field(&self, field: &Field) -> StorageResult<()>;

    /// Insert the entry, or return the existing one with the same field and
    /// normalized label (synonyms are unioned into it)
    fn upsert_master_entry(&self, entry: &MasterEntry) -> StorageResult<MasterEntry>;

    /// Load the full shared catalogue
    fn load_taxonomy(&self) -> StorageResult<Taxonomy>;
}

/// Extension trait for opening stores from paths
pub trait OpenStore: GraphStore + Sized {
    /// Open or create a store at the given path
    fn open(path: impl AsRef<Path>) -> StorageResult<Self>;

    /// Create an in-memory store (useful for testing)
    fn open_in_memory() -> StorageResult<Self>;
}
