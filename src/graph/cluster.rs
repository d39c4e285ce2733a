//! Phase clusters: the accumulated node set for one phase of one task

use super::id::{ClusterId, NodeId, OwnerId, TaskId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::str::FromStr;

/// Task phase a cluster (and a sighting) belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClusterType {
    /// Initial framing of the task
    Ideation,
    /// Final outcome of the task
    Result,
}

impl ClusterType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Ideation => "ideation",
            Self::Result => "result",
        }
    }
}

impl FromStr for ClusterType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ideation" => Ok(Self::Ideation),
            "result" => Ok(Self::Result),
            other => Err(format!("unknown cluster type: {}", other)),
        }
    }
}

/// Everything ever associated with one phase of a task.
///
/// Node sets only grow: contributions are unioned in, never replaced.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Cluster {
    pub id: ClusterId,
    pub task_id: TaskId,
    pub owner_id: OwnerId,
    pub cluster_type: ClusterType,
    pub node_ids: BTreeSet<NodeId>,
    pub summary: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Cluster {
    pub fn new(
        task_id: TaskId,
        owner_id: OwnerId,
        cluster_type: ClusterType,
        node_ids: impl IntoIterator<Item = NodeId>,
        summary: Option<String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: ClusterId::new(),
            task_id,
            owner_id,
            cluster_type,
            node_ids: node_ids.into_iter().collect(),
            summary,
            created_at: now,
            updated_at: now,
        }
    }

    /// Union `node_ids` into the cluster. A provided summary replaces the
    /// current one; `None` keeps it.
    pub fn absorb(&mut self, node_ids: impl IntoIterator<Item = NodeId>, summary: Option<String>) {
        self.node_ids.extend(node_ids);
        if summary.is_some() {
            self.summary = summary;
        }
        self.updated_at = Utc::now();
    }
}

/// Set difference between the ideation and result clusters of a task.
/// Derived on demand, never persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClusterDiff {
    pub ideation_node_ids: BTreeSet<NodeId>,
    pub result_node_ids: BTreeSet<NodeId>,
    /// Concepts the work surfaced beyond the initial framing
    pub added_node_ids: BTreeSet<NodeId>,
    /// Concepts anticipated up front that never materialized
    pub removed_node_ids: BTreeSet<NodeId>,
}

impl ClusterDiff {
    /// Compute the diff; an absent result cluster counts as empty.
    pub fn between(ideation: &Cluster, result: Option<&Cluster>) -> Self {
        let ideation_node_ids = ideation.node_ids.clone();
        let result_node_ids = result.map(|c| c.node_ids.clone()).unwrap_or_default();
        let added_node_ids = result_node_ids
            .difference(&ideation_node_ids)
            .cloned()
            .collect();
        let removed_node_ids = ideation_node_ids
            .difference(&result_node_ids)
            .cloned()
            .collect();
        Self {
            ideation_node_ids,
            result_node_ids,
            added_node_ids,
            removed_node_ids,
        }
    }
}
