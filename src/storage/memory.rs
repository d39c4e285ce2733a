//! In-memory arena backend.
//!
//! Index maps keyed by owner/task sit next to the entity maps. Uniqueness is
//! enforced through `DashMap::entry`, which holds the shard lock for the key
//! while the find-or-create runs, so two concurrent sightings of the same
//! concept land on one node.

use super::traits::{
    sort_for_listing, GraphStore, NodeFilter, Sighting, StorageError, StorageResult,
};
use crate::graph::{
    normalize_key, Checkpoint, Cluster, ClusterType, Domain, Edge, EdgeKey, Field, MasterEntry,
    Node, NodeId, NodeType, OwnerId, TaskId, Taxonomy,
};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::collections::BTreeSet;
use std::sync::{Mutex, RwLock};

type NodeKey = (OwnerId, NodeType, String);
type ClusterKey = (TaskId, OwnerId, ClusterType);

#[derive(Debug, Default)]
pub struct MemoryStore {
    nodes: DashMap<NodeId, Node>,
    /// `(owner, type, normalized key)` → node id
    node_index: DashMap<NodeKey, NodeId>,
    edges: DashMap<EdgeKey, Edge>,
    clusters: DashMap<ClusterKey, Cluster>,
    /// Append-only, insertion ordered
    checkpoints: Mutex<Vec<Checkpoint>>,
    taxonomy: RwLock<Taxonomy>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }
}

impl GraphStore for MemoryStore {
    fn record_sighting(&self, sighting: &Sighting) -> StorageResult<Node> {
        let key = normalize_key(&sighting.label);
        let index_key = (sighting.owner_id.clone(), sighting.node_type, key);

        // Lock order: index shard, then node shard.
        match self.node_index.entry(index_key) {
            Entry::Occupied(slot) => {
                let mut node = self
                    .nodes
                    .get_mut(slot.get())
                    .ok_or_else(|| StorageError::NodeNotFound(slot.get().to_string()))?;
                node.record_sighting(sighting.context.clone());
                Ok(node.clone())
            }
            Entry::Vacant(slot) => {
                let node = Node::new(
                    sighting.label.clone(),
                    sighting.node_type,
                    sighting.owner_id.clone(),
                    sighting.context.clone(),
                );
                self.nodes.insert(node.id.clone(), node.clone());
                slot.insert(node.id.clone());
                Ok(node)
            }
        }
    }

    fn load_node(&self, owner_id: &OwnerId, node_id: &NodeId) -> StorageResult<Option<Node>> {
        Ok(self
            .nodes
            .get(node_id)
            .filter(|n| n.owner_id == *owner_id)
            .map(|n| n.clone()))
    }

    fn find_node(
        &self,
        owner_id: &OwnerId,
        node_type: NodeType,
        normalized_key: &str,
    ) -> StorageResult<Option<Node>> {
        let index_key = (owner_id.clone(), node_type, normalized_key.to_string());
        let id = self.node_index.get(&index_key).map(|r| r.value().clone());
        Ok(id.and_then(|id| self.nodes.get(&id).map(|n| n.clone())))
    }

    fn find_nodes(&self, owner_id: &OwnerId, filter: &NodeFilter) -> StorageResult<Vec<Node>> {
        let mut nodes: Vec<Node> = self
            .nodes
            .iter()
            .filter(|n| n.owner_id == *owner_id && filter.matches(n))
            .map(|n| n.clone())
            .collect();
        sort_for_listing(&mut nodes);
        if let Some(limit) = filter.limit {
            nodes.truncate(limit);
        }
        Ok(nodes)
    }

    fn update_node_links(&self, node: &Node) -> StorageResult<()> {
        let mut stored = self
            .nodes
            .get_mut(&node.id)
            .filter(|n| n.owner_id == node.owner_id)
            .ok_or_else(|| StorageError::NodeNotFound(node.id.to_string()))?;
        stored.master_entry_id = node.master_entry_id.clone();
        stored.domain_id = node.domain_id.clone();
        stored.field_id = node.field_id.clone();
        stored.contact_id = node.contact_id.clone();
        stored.confirmed = node.confirmed;
        Ok(())
    }

    fn bump_edge(&self, key: &EdgeKey, owner_id: &OwnerId) -> StorageResult<Edge> {
        let edge = self
            .edges
            .entry(key.clone())
            .and_modify(|e| e.reinforce())
            .or_insert_with(|| Edge::new(key.clone(), owner_id.clone()));
        Ok(edge.clone())
    }

    fn list_edges(&self, owner_id: &OwnerId, task_id: Option<&TaskId>) -> StorageResult<Vec<Edge>> {
        let mut edges: Vec<Edge> = self
            .edges
            .iter()
            .filter(|e| e.owner_id == *owner_id)
            .filter(|e| task_id.map_or(true, |t| e.task_id.as_ref() == Some(t)))
            .map(|e| e.clone())
            .collect();
        edges.sort_by(|a, b| b.weight.cmp(&a.weight).then_with(|| a.id.cmp(&b.id)));
        Ok(edges)
    }

    fn merge_cluster(
        &self,
        task_id: &TaskId,
        owner_id: &OwnerId,
        cluster_type: ClusterType,
        node_ids: &BTreeSet<NodeId>,
        summary: Option<&str>,
    ) -> StorageResult<Cluster> {
        let key = (task_id.clone(), owner_id.clone(), cluster_type);
        let summary = summary.map(str::to_string);
        let cluster = match self.clusters.entry(key) {
            Entry::Occupied(mut slot) => {
                slot.get_mut().absorb(node_ids.iter().cloned(), summary);
                slot.get().clone()
            }
            Entry::Vacant(slot) => {
                let cluster = Cluster::new(
                    task_id.clone(),
                    owner_id.clone(),
                    cluster_type,
                    node_ids.iter().cloned(),
                    summary,
                );
                slot.insert(cluster.clone());
                cluster
            }
        };
        Ok(cluster)
    }

    fn load_cluster(
        &self,
        task_id: &TaskId,
        owner_id: &OwnerId,
        cluster_type: ClusterType,
    ) -> StorageResult<Option<Cluster>> {
        let key = (task_id.clone(), owner_id.clone(), cluster_type);
        Ok(self.clusters.get(&key).map(|c| c.clone()))
    }

    fn append_checkpoint(&self, checkpoint: &Checkpoint) -> StorageResult<()> {
        self.checkpoints.lock().unwrap().push(checkpoint.clone());
        Ok(())
    }

    fn list_checkpoints(
        &self,
        task_id: Option<&TaskId>,
        owner_id: Option<&OwnerId>,
    ) -> StorageResult<Vec<Checkpoint>> {
        let mut found: Vec<Checkpoint> = self
            .checkpoints
            .lock()
            .unwrap()
            .iter()
            .filter(|c| task_id.map_or(true, |t| c.task_id == *t))
            .filter(|c| owner_id.map_or(true, |o| c.owner_id == *o))
            .cloned()
            .collect();
        // Stable: equal timestamps keep insertion order
        found.sort_by_key(|c| c.timestamp);
        Ok(found)
    }

    fn save_domain(&self, domain: &Domain) -> StorageResult<()> {
        let mut taxonomy = self.taxonomy.write().unwrap();
        match taxonomy.domains.iter_mut().find(|d| d.id == domain.id) {
            Some(existing) => *existing = domain.clone(),
            None => taxonomy.domains.push(domain.clone()),
        }
        Ok(())
    }

    fn save_field(&self, field: &Field) -> StorageResult<()> {
        let mut taxonomy = self.taxonomy.write().unwrap();
        match taxonomy.fields.iter_mut().find(|f| f.id == field.id) {
            Some(existing) => *existing = field.clone(),
            None => taxonomy.fields.push(field.clone()),
        }
        Ok(())
    }

    fn upsert_master_entry(&self, entry: &MasterEntry) -> StorageResult<MasterEntry> {
        let key = normalize_key(&entry.label);
        let mut taxonomy = self.taxonomy.write().unwrap();
        let existing = taxonomy
            .entries
            .iter_mut()
            .find(|e| e.field_id == entry.field_id && normalize_key(&e.label) == key);
        match existing {
            Some(existing) => {
                existing.synonyms.extend(entry.synonyms.iter().cloned());
                Ok(existing.clone())
            }
            None => {
                taxonomy.entries.push(entry.clone());
                Ok(entry.clone())
            }
        }
    }

    fn load_taxonomy(&self) -> StorageResult<Taxonomy> {
        Ok(self.taxonomy.read().unwrap().clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::{Direction, SourceContext};
    use std::sync::Arc;

    fn sighting(label: &str, direction: Direction) -> Sighting {
        Sighting {
            label: label.to_string(),
            node_type: NodeType::Keyword,
            owner_id: OwnerId::from("u1"),
            context: SourceContext::new("message", "m", direction),
        }
    }

    #[test]
    fn sightings_with_same_key_share_a_node() {
        let store = MemoryStore::new();
        let first = store.record_sighting(&sighting("Rust", Direction::Received)).unwrap();
        let second = store.record_sighting(&sighting("  rust ", Direction::Sent)).unwrap();

        assert_eq!(first.id, second.id);
        assert_eq!(second.frequency, 2);
        assert_eq!(second.label, "Rust");
        assert_eq!(store.node_count(), 1);
    }

    #[test]
    fn owners_are_isolated() {
        let store = MemoryStore::new();
        let mine = store.record_sighting(&sighting("Rust", Direction::Sent)).unwrap();
        let mut theirs = sighting("Rust", Direction::Sent);
        theirs.owner_id = OwnerId::from("u2");
        let theirs = store.record_sighting(&theirs).unwrap();

        assert_ne!(mine.id, theirs.id);
        assert!(store.load_node(&OwnerId::from("u2"), &mine.id).unwrap().is_none());
    }

    #[test]
    fn concurrent_sightings_create_one_node() {
        let store = Arc::new(MemoryStore::new());
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let store = store.clone();
                std::thread::spawn(move || {
                    for _ in 0..25 {
                        store.record_sighting(&sighting("Kubernetes", Direction::Received)).unwrap();
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }

        assert_eq!(store.node_count(), 1);
        let node = store
            .find_node(&OwnerId::from("u1"), NodeType::Keyword, "kubernetes")
            .unwrap()
            .unwrap();
        assert_eq!(node.frequency, 200);
    }

    #[test]
    fn update_node_links_keeps_history() {
        let store = MemoryStore::new();
        let mut node = store.record_sighting(&sighting("Rust", Direction::Sent)).unwrap();
        store.record_sighting(&sighting("Rust", Direction::Received)).unwrap();

        node.confirmed = true;
        store.update_node_links(&node).unwrap();

        let stored = store.load_node(&node.owner_id, &node.id).unwrap().unwrap();
        assert!(stored.confirmed);
        assert_eq!(stored.frequency, 2);
    }
}
