//! Co-occurrence graph builder
//!
//! Every unordered pair of distinct nodes extracted from one text gets its
//! edge reinforced once per batch. Edges are keyed by the canonical pair and
//! the task scope, so `(A, B)` and `(B, A)` land on the same row.

use crate::error::LexigraphResult;
use crate::graph::{Edge, EdgeKey, NodeId, OwnerId, TaskId};
use crate::storage::GraphStore;
use std::collections::BTreeSet;
use std::sync::Arc;

pub struct CoOccurrenceBuilder {
    store: Arc<dyn GraphStore>,
}

/// Canonical keys for every unordered pair in the batch
fn batch_keys(node_ids: &[NodeId], task_id: Option<&TaskId>) -> Vec<EdgeKey> {
    let distinct: Vec<&NodeId> = node_ids.iter().collect::<BTreeSet<_>>().into_iter().collect();
    let mut keys = Vec::new();
    for i in 0..distinct.len() {
        for j in (i + 1)..distinct.len() {
            if let Some(key) = EdgeKey::canonical(distinct[i], distinct[j], task_id) {
                keys.push(key);
            }
        }
    }
    keys
}

impl CoOccurrenceBuilder {
    pub fn new(store: Arc<dyn GraphStore>) -> Self {
        Self { store }
    }

    /// Insert or reinforce the edge for each pair. Duplicate ids in the batch
    /// count once; fewer than two distinct nodes is a no-op.
    pub fn create_co_occurrence_edges(
        &self,
        node_ids: &[NodeId],
        owner_id: &OwnerId,
        task_id: Option<&TaskId>,
    ) -> LexigraphResult<Vec<Edge>> {
        batch_keys(node_ids, task_id)
            .iter()
            .map(|key| Ok(self.store.bump_edge(key, owner_id)?))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStore;

    fn ids(names: &[&str]) -> Vec<NodeId> {
        names.iter().map(|n| NodeId::from(*n)).collect()
    }

    #[test]
    fn pairs_are_canonical_and_distinct() {
        let keys = batch_keys(&ids(&["c", "a", "b", "a"]), None);
        let pairs: Vec<_> = keys
            .iter()
            .map(|k| (k.source.as_str(), k.target.as_str()))
            .collect();
        assert_eq!(pairs, vec![("a", "b"), ("a", "c"), ("b", "c")]);
    }

    #[test]
    fn repeated_batches_reinforce_one_edge() {
        let store = Arc::new(MemoryStore::new());
        let builder = CoOccurrenceBuilder::new(store.clone());
        let owner = OwnerId::from("u1");
        let task = TaskId::from("t1");

        builder
            .create_co_occurrence_edges(&ids(&["a", "b"]), &owner, Some(&task))
            .unwrap();
        let edges = builder
            .create_co_occurrence_edges(&ids(&["b", "a"]), &owner, Some(&task))
            .unwrap();

        assert_eq!(edges.len(), 1);
        assert_eq!(edges[0].weight, 2);
        assert_eq!(store.edge_count(), 1);
    }

    #[test]
    fn task_scopes_are_separate() {
        let store = Arc::new(MemoryStore::new());
        let builder = CoOccurrenceBuilder::new(store.clone());
        let owner = OwnerId::from("u1");

        builder
            .create_co_occurrence_edges(&ids(&["a", "b"]), &owner, Some(&TaskId::from("t1")))
            .unwrap();
        builder
            .create_co_occurrence_edges(&ids(&["a", "b"]), &owner, None)
            .unwrap();
        builder
            .create_co_occurrence_edges(&ids(&["a", "b"]), &owner, None)
            .unwrap();

        let unscoped: Vec<_> = store
            .list_edges(&owner, None)
            .unwrap()
            .into_iter()
            .filter(|e| e.task_id.is_none())
            .collect();
        assert_eq!(store.edge_count(), 2);
        assert_eq!(unscoped[0].weight, 2);
    }

    #[test]
    fn fewer_than_two_distinct_nodes_is_noop() {
        let store = Arc::new(MemoryStore::new());
        let builder = CoOccurrenceBuilder::new(store.clone());
        let owner = OwnerId::from("u1");

        assert!(builder
            .create_co_occurrence_edges(&ids(&["a", "a"]), &owner, None)
            .unwrap()
            .is_empty());
        assert!(builder
            .create_co_occurrence_edges(&[], &owner, None)
            .unwrap()
            .is_empty());
        assert_eq!(store.edge_count(), 0);
    }
}
