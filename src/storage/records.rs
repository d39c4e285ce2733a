//! Typed storage records and the mapping between them and graph entities.
//!
//! Rows are read column-by-column into these structs, then validated on the way
//! into entity shapes: enum columns must parse, timestamps must be RFC 3339,
//! and derived node fields are recomputed from the stored sighting history.

use super::traits::{StorageError, StorageResult};
use crate::graph::{
    Checkpoint, CheckpointId, CheckpointSource, Cluster, ClusterId, ClusterType, ContactId,
    Domain, DomainId, Edge, EdgeId, EdgeType, Field, FieldId, MasterEntry, MasterEntryId, Node,
    NodeId, NodeType, OwnerId, SourceContext, TaskId, UnderstandingLevel,
};
use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::Row;
use std::collections::BTreeSet;
use std::str::FromStr;

/// Task scope column value for edges outside any task
pub(crate) const UNSCOPED_TASK: &str = "";

/// Fixed-width UTC timestamps so text ordering matches time ordering
pub(crate) fn fmt_ts(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_ts(value: &str) -> StorageResult<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| StorageError::DateParse(format!("{}: {}", value, e)))
}

fn parse_enum<T: FromStr<Err = String>>(table: &'static str, value: &str) -> StorageResult<T> {
    value
        .parse()
        .map_err(|reason| StorageError::InvalidRecord { table, reason })
}

pub(crate) fn task_column(task_id: Option<&TaskId>) -> &str {
    task_id.map(|t| t.as_str()).unwrap_or(UNSCOPED_TASK)
}

// ---------------------------------------------------------------------------
// Nodes
// ---------------------------------------------------------------------------

pub(crate) const NODE_COLUMNS: &str = "id, owner_id, node_type, label, normalized_key, frequency, \
     understanding_level, first_seen_at, last_seen_at, master_entry_id, domain_id, field_id, \
     contact_id, confirmed, source_contexts_json";

#[derive(Debug, Clone)]
pub(crate) struct NodeRecord {
    pub id: String,
    pub owner_id: String,
    pub node_type: String,
    pub label: String,
    pub normalized_key: String,
    pub frequency: i64,
    pub understanding_level: String,
    pub first_seen_at: String,
    pub last_seen_at: String,
    pub master_entry_id: Option<String>,
    pub domain_id: Option<String>,
    pub field_id: Option<String>,
    pub contact_id: Option<String>,
    pub confirmed: bool,
    pub source_contexts_json: String,
}

impl NodeRecord {
    /// Read a row selected with [`NODE_COLUMNS`]
    pub fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            owner_id: row.get(1)?,
            node_type: row.get(2)?,
            label: row.get(3)?,
            normalized_key: row.get(4)?,
            frequency: row.get(5)?,
            understanding_level: row.get(6)?,
            first_seen_at: row.get(7)?,
            last_seen_at: row.get(8)?,
            master_entry_id: row.get(9)?,
            domain_id: row.get(10)?,
            field_id: row.get(11)?,
            contact_id: row.get(12)?,
            confirmed: row.get(13)?,
            source_contexts_json: row.get(14)?,
        })
    }

    pub fn from_node(node: &Node) -> StorageResult<Self> {
        Ok(Self {
            id: node.id.as_str().to_string(),
            owner_id: node.owner_id.as_str().to_string(),
            node_type: node.node_type.as_str().to_string(),
            label: node.label.clone(),
            normalized_key: node.normalized_key.clone(),
            frequency: node.frequency as i64,
            understanding_level: node.understanding_level.as_str().to_string(),
            first_seen_at: fmt_ts(&node.first_seen_at),
            last_seen_at: fmt_ts(&node.last_seen_at),
            master_entry_id: node.master_entry_id.as_ref().map(|id| id.as_str().to_string()),
            domain_id: node.domain_id.as_ref().map(|id| id.as_str().to_string()),
            field_id: node.field_id.as_ref().map(|id| id.as_str().to_string()),
            contact_id: node.contact_id.as_ref().map(|id| id.as_str().to_string()),
            confirmed: node.confirmed,
            source_contexts_json: serde_json::to_string(&node.source_contexts)?,
        })
    }

    /// Validate and convert into a [`Node`].
    ///
    /// The stored frequency and level columns exist for querying; the entity
    /// always recomputes them from the history, and a mismatch is logged.
    pub fn into_node(self) -> StorageResult<Node> {
        let source_contexts: Vec<SourceContext> = serde_json::from_str(&self.source_contexts_json)?;
        if source_contexts.is_empty() {
            return Err(StorageError::InvalidRecord {
                table: "nodes",
                reason: format!("node {} has no source contexts", self.id),
            });
        }
        let stored_level: UnderstandingLevel = parse_enum("nodes", &self.understanding_level)?;

        let mut node = Node {
            id: NodeId::from_string(self.id),
            label: self.label,
            normalized_key: self.normalized_key,
            node_type: parse_enum("nodes", &self.node_type)?,
            owner_id: OwnerId::from_string(self.owner_id),
            frequency: 0,
            understanding_level: UnderstandingLevel::Recognition,
            first_seen_at: parse_ts(&self.first_seen_at)?,
            last_seen_at: parse_ts(&self.last_seen_at)?,
            master_entry_id: self.master_entry_id.map(MasterEntryId::from_string),
            domain_id: self.domain_id.map(DomainId::from_string),
            field_id: self.field_id.map(FieldId::from_string),
            contact_id: self.contact_id.map(ContactId::from_string),
            confirmed: self.confirmed,
            source_contexts,
        };
        node.recompute();

        if node.frequency as i64 != self.frequency || node.understanding_level != stored_level {
            tracing::warn!(
                node_id = %node.id,
                stored_frequency = self.frequency,
                frequency = node.frequency,
                "stored derived fields disagree with sighting history; using history"
            );
        }
        Ok(node)
    }
}

// ---------------------------------------------------------------------------
// Edges
// ---------------------------------------------------------------------------

pub(crate) const EDGE_COLUMNS: &str =
    "id, owner_id, source_id, target_id, task_id, edge_type, weight, created_at, updated_at";

#[derive(Debug, Clone)]
pub(crate) struct EdgeRecord {
    pub id: String,
    pub owner_id: String,
    pub source_id: String,
    pub target_id: String,
    pub task_id: String,
    pub edge_type: String,
    pub weight: i64,
    pub created_at: String,
    pub updated_at: String,
}

impl EdgeRecord {
    pub fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            owner_id: row.get(1)?,
            source_id: row.get(2)?,
            target_id: row.get(3)?,
            task_id: row.get(4)?,
            edge_type: row.get(5)?,
            weight: row.get(6)?,
            created_at: row.get(7)?,
            updated_at: row.get(8)?,
        })
    }

    pub fn into_edge(self) -> StorageResult<Edge> {
        if self.edge_type != EdgeType::CoOccurrence.as_str() {
            return Err(StorageError::InvalidRecord {
                table: "edges",
                reason: format!("unknown edge type: {}", self.edge_type),
            });
        }
        if self.source_id >= self.target_id {
            return Err(StorageError::InvalidRecord {
                table: "edges",
                reason: format!("edge {} is not in canonical order", self.id),
            });
        }
        let weight = u32::try_from(self.weight)
            .ok()
            .filter(|w| *w >= 1)
            .ok_or_else(|| StorageError::InvalidRecord {
                table: "edges",
                reason: format!("edge {} has weight {}", self.id, self.weight),
            })?;

        Ok(Edge {
            id: EdgeId::from_string(self.id),
            source: NodeId::from_string(self.source_id),
            target: NodeId::from_string(self.target_id),
            owner_id: OwnerId::from_string(self.owner_id),
            task_id: (self.task_id != UNSCOPED_TASK).then(|| TaskId::from_string(self.task_id)),
            edge_type: EdgeType::CoOccurrence,
            weight,
            created_at: parse_ts(&self.created_at)?,
            updated_at: parse_ts(&self.updated_at)?,
        })
    }
}

// ---------------------------------------------------------------------------
// Clusters
// ---------------------------------------------------------------------------

pub(crate) const CLUSTER_COLUMNS: &str =
    "id, task_id, owner_id, cluster_type, summary, created_at, updated_at";

#[derive(Debug, Clone)]
pub(crate) struct ClusterRecord {
    pub id: String,
    pub task_id: String,
    pub owner_id: String,
    pub cluster_type: String,
    pub summary: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

impl ClusterRecord {
    pub fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            task_id: row.get(1)?,
            owner_id: row.get(2)?,
            cluster_type: row.get(3)?,
            summary: row.get(4)?,
            created_at: row.get(5)?,
            updated_at: row.get(6)?,
        })
    }

    /// Combine the cluster row with its member rows
    pub fn into_cluster(self, members: Vec<String>) -> StorageResult<Cluster> {
        let cluster_type: ClusterType = parse_enum("clusters", &self.cluster_type)?;
        Ok(Cluster {
            id: ClusterId::from_string(self.id),
            task_id: TaskId::from_string(self.task_id),
            owner_id: OwnerId::from_string(self.owner_id),
            cluster_type,
            node_ids: members.into_iter().map(NodeId::from_string).collect(),
            summary: self.summary,
            created_at: parse_ts(&self.created_at)?,
            updated_at: parse_ts(&self.updated_at)?,
        })
    }
}

// ---------------------------------------------------------------------------
// Checkpoints
// ---------------------------------------------------------------------------

pub(crate) const CHECKPOINT_COLUMNS: &str =
    "id, task_id, owner_id, node_ids_json, timestamp, source, summary";

#[derive(Debug, Clone)]
pub(crate) struct CheckpointRecord {
    pub id: String,
    pub task_id: String,
    pub owner_id: String,
    pub node_ids_json: String,
    pub timestamp: String,
    pub source: String,
    pub summary: Option<String>,
}

impl CheckpointRecord {
    pub fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            task_id: row.get(1)?,
            owner_id: row.get(2)?,
            node_ids_json: row.get(3)?,
            timestamp: row.get(4)?,
            source: row.get(5)?,
            summary: row.get(6)?,
        })
    }

    pub fn from_checkpoint(checkpoint: &Checkpoint) -> StorageResult<Self> {
        Ok(Self {
            id: checkpoint.id.as_str().to_string(),
            task_id: checkpoint.task_id.as_str().to_string(),
            owner_id: checkpoint.owner_id.as_str().to_string(),
            node_ids_json: serde_json::to_string(&checkpoint.node_ids)?,
            timestamp: fmt_ts(&checkpoint.timestamp),
            source: checkpoint.source.as_str().to_string(),
            summary: checkpoint.summary.clone(),
        })
    }

    pub fn into_checkpoint(self) -> StorageResult<Checkpoint> {
        let source: CheckpointSource = parse_enum("checkpoints", &self.source)?;
        Ok(Checkpoint {
            id: CheckpointId::from_string(self.id),
            task_id: TaskId::from_string(self.task_id),
            owner_id: OwnerId::from_string(self.owner_id),
            node_ids: serde_json::from_str(&self.node_ids_json)?,
            timestamp: parse_ts(&self.timestamp)?,
            source,
            summary: self.summary,
        })
    }
}

// ---------------------------------------------------------------------------
// Taxonomy
// ---------------------------------------------------------------------------

pub(crate) fn domain_from_row(row: &Row<'_>) -> rusqlite::Result<Domain> {
    Ok(Domain {
        id: DomainId::from_string(row.get::<_, String>(0)?),
        name: row.get(1)?,
        color: row.get(2)?,
    })
}

pub(crate) fn field_from_row(row: &Row<'_>) -> rusqlite::Result<Field> {
    Ok(Field {
        id: FieldId::from_string(row.get::<_, String>(0)?),
        domain_id: DomainId::from_string(row.get::<_, String>(1)?),
        name: row.get(2)?,
        description: row.get(3)?,
    })
}

pub(crate) const ENTRY_COLUMNS: &str = "id, field_id, label, synonyms_json";

#[derive(Debug, Clone)]
pub(crate) struct EntryRecord {
    pub id: String,
    pub field_id: String,
    pub label: String,
    pub synonyms_json: String,
}

impl EntryRecord {
    pub fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            field_id: row.get(1)?,
            label: row.get(2)?,
            synonyms_json: row.get(3)?,
        })
    }

    pub fn into_entry(self) -> StorageResult<MasterEntry> {
        let synonyms: BTreeSet<String> = serde_json::from_str(&self.synonyms_json)?;
        Ok(MasterEntry {
            id: MasterEntryId::from_string(self.id),
            field_id: FieldId::from_string(self.field_id),
            label: self.label,
            synonyms,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::Direction;

    fn sample_node() -> Node {
        let mut node = Node::new(
            "SEO",
            NodeType::Keyword,
            OwnerId::from("u1"),
            SourceContext::new("message", "m1", Direction::Sent),
        );
        node.record_sighting(SourceContext::new("message", "m2", Direction::Received));
        node
    }

    #[test]
    fn node_record_preserves_entity() {
        let node = sample_node();
        let back = NodeRecord::from_node(&node).unwrap().into_node().unwrap();
        assert_eq!(back.id, node.id);
        assert_eq!(back.frequency, 2);
        assert_eq!(back.understanding_level, UnderstandingLevel::Understanding);
        assert_eq!(back.source_contexts, node.source_contexts);
    }

    #[test]
    fn node_record_recomputes_drifted_fields() {
        let mut record = NodeRecord::from_node(&sample_node()).unwrap();
        record.frequency = 99;
        record.understanding_level = "mastery".to_string();

        let node = record.into_node().unwrap();
        assert_eq!(node.frequency, 2);
        assert_eq!(node.understanding_level, UnderstandingLevel::Understanding);
    }

    #[test]
    fn node_record_rejects_unknown_type() {
        let mut record = NodeRecord::from_node(&sample_node()).unwrap();
        record.node_type = "topic".to_string();
        assert!(matches!(
            record.into_node(),
            Err(StorageError::InvalidRecord { table: "nodes", .. })
        ));
    }

    #[test]
    fn edge_record_rejects_non_canonical_order() {
        let record = EdgeRecord {
            id: "e1".to_string(),
            owner_id: "u1".to_string(),
            source_id: "b".to_string(),
            target_id: "a".to_string(),
            task_id: UNSCOPED_TASK.to_string(),
            edge_type: "co_occurrence".to_string(),
            weight: 1,
            created_at: fmt_ts(&Utc::now()),
            updated_at: fmt_ts(&Utc::now()),
        };
        assert!(record.into_edge().is_err());
    }

    #[test]
    fn edge_record_maps_unscoped_task() {
        let record = EdgeRecord {
            id: "e1".to_string(),
            owner_id: "u1".to_string(),
            source_id: "a".to_string(),
            target_id: "b".to_string(),
            task_id: UNSCOPED_TASK.to_string(),
            edge_type: "co_occurrence".to_string(),
            weight: 3,
            created_at: fmt_ts(&Utc::now()),
            updated_at: fmt_ts(&Utc::now()),
        };
        let edge = record.into_edge().unwrap();
        assert!(edge.task_id.is_none());
        assert_eq!(edge.weight, 3);
    }

    #[test]
    fn timestamps_sort_as_text() {
        let early = Utc::now();
        let late = early + chrono::Duration::milliseconds(1);
        assert!(fmt_ts(&early) < fmt_ts(&late));
    }
}
