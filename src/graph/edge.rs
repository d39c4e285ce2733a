//! Co-occurrence edges between concept nodes

use super::id::{EdgeId, NodeId, OwnerId, TaskId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Relationship carried by an edge. Only co-occurrence exists today.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EdgeType {
    CoOccurrence,
}

impl EdgeType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::CoOccurrence => "co_occurrence",
        }
    }
}

/// Identity of an edge: canonical endpoint pair plus task scope.
///
/// `source < target` always holds, so `(A, B)` and `(B, A)` share a key.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct EdgeKey {
    pub source: NodeId,
    pub target: NodeId,
    pub task_id: Option<TaskId>,
}

impl EdgeKey {
    /// Build the canonical key for an unordered pair. Returns `None` for a
    /// self-pair, which never forms an edge.
    pub fn canonical(a: &NodeId, b: &NodeId, task_id: Option<&TaskId>) -> Option<Self> {
        let (source, target) = match a.cmp(b) {
            std::cmp::Ordering::Less => (a.clone(), b.clone()),
            std::cmp::Ordering::Greater => (b.clone(), a.clone()),
            std::cmp::Ordering::Equal => return None,
        };
        Some(Self {
            source,
            target,
            task_id: task_id.cloned(),
        })
    }
}

/// A weighted, undirected co-occurrence link stored in canonical order
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Edge {
    pub id: EdgeId,
    /// Lesser endpoint
    pub source: NodeId,
    /// Greater endpoint
    pub target: NodeId,
    pub owner_id: OwnerId,
    /// Task scope; `None` is the unscoped bucket
    pub task_id: Option<TaskId>,
    pub edge_type: EdgeType,
    /// Number of batches in which both endpoints appeared (≥ 1)
    pub weight: u32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Edge {
    /// Create a first-sighting edge with weight 1
    pub fn new(key: EdgeKey, owner_id: OwnerId) -> Self {
        let now = Utc::now();
        Self {
            id: EdgeId::new(),
            source: key.source,
            target: key.target,
            owner_id,
            task_id: key.task_id,
            edge_type: EdgeType::CoOccurrence,
            weight: 1,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn key(&self) -> EdgeKey {
        EdgeKey {
            source: self.source.clone(),
            target: self.target.clone(),
            task_id: self.task_id.clone(),
        }
    }

    /// Record one more co-occurrence
    pub fn reinforce(&mut self) {
        self.weight += 1;
        self.updated_at = Utc::now();
    }

    /// True if the edge touches the given node
    pub fn touches(&self, node: &NodeId) -> bool {
        self.source == *node || self.target == *node
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn canonical_key_orders_endpoints() {
        let a = NodeId::from("a");
        let b = NodeId::from("b");
        let task = TaskId::from("t");

        let ab = EdgeKey::canonical(&a, &b, Some(&task)).unwrap();
        let ba = EdgeKey::canonical(&b, &a, Some(&task)).unwrap();

        assert_eq!(ab, ba);
        assert_eq!(ab.source, a);
        assert_eq!(ab.target, b);
    }

    #[test]
    fn canonical_key_rejects_self_pair() {
        let a = NodeId::from("a");
        assert!(EdgeKey::canonical(&a, &a, None).is_none());
    }

    #[test]
    fn task_scope_is_part_of_identity() {
        let a = NodeId::from("a");
        let b = NodeId::from("b");
        let t1 = TaskId::from("t1");
        let t2 = TaskId::from("t2");

        assert_ne!(
            EdgeKey::canonical(&a, &b, Some(&t1)),
            EdgeKey::canonical(&a, &b, Some(&t2))
        );
        assert_ne!(
            EdgeKey::canonical(&a, &b, Some(&t1)),
            EdgeKey::canonical(&a, &b, None)
        );
    }

    #[test]
    fn reinforce_increments_weight() {
        let key = EdgeKey::canonical(&NodeId::from("a"), &NodeId::from("b"), None).unwrap();
        let mut edge = Edge::new(key, OwnerId::from("u1"));
        assert_eq!(edge.weight, 1);
        edge.reinforce();
        assert_eq!(edge.weight, 2);
        assert!(edge.touches(&NodeId::from("a")));
        assert!(!edge.touches(&NodeId::from("c")));
    }
}
