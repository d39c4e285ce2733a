//! Immutable timeline snapshots of a task's active node set

use super::id::{CheckpointId, NodeId, OwnerId, TaskId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::str::FromStr;

/// What triggered a checkpoint
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckpointSource {
    Auto,
    Manual,
}

impl CheckpointSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Auto => "auto",
            Self::Manual => "manual",
        }
    }
}

impl FromStr for CheckpointSource {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "auto" => Ok(Self::Auto),
            "manual" => Ok(Self::Manual),
            other => Err(format!("unknown checkpoint source: {}", other)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Checkpoint {
    pub id: CheckpointId,
    pub task_id: TaskId,
    pub owner_id: OwnerId,
    /// Copied snapshot, sorted
    pub node_ids: Vec<NodeId>,
    pub timestamp: DateTime<Utc>,
    pub source: CheckpointSource,
    pub summary: Option<String>,
}

impl Checkpoint {
    pub fn new(
        task_id: TaskId,
        owner_id: OwnerId,
        node_ids: impl IntoIterator<Item = NodeId>,
        source: CheckpointSource,
        summary: Option<String>,
    ) -> Self {
        let snapshot: BTreeSet<NodeId> = node_ids.into_iter().collect();
        Self {
            id: CheckpointId::new(),
            task_id,
            owner_id,
            node_ids: snapshot.into_iter().collect(),
            timestamp: Utc::now(),
            source,
            summary,
        }
    }

    /// True if the snapshot holds exactly this set of nodes
    pub fn same_nodes(&self, other: &BTreeSet<NodeId>) -> bool {
        self.node_ids.len() == other.len() && self.node_ids.iter().all(|id| other.contains(id))
    }
}
