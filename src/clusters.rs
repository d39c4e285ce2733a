//! Phase clusters and their diff
//!
//! A task has at most one ideation and one result cluster per owner. Both
//! only grow. The diff compares them on demand.

use crate::error::{LexigraphError, LexigraphResult};
use crate::graph::{Cluster, ClusterDiff, ClusterType, NodeId, OwnerId, TaskId};
use crate::storage::GraphStore;
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::debug;

pub struct PhaseClusters {
    store: Arc<dyn GraphStore>,
}

impl PhaseClusters {
    pub fn new(store: Arc<dyn GraphStore>) -> Self {
        Self { store }
    }

    /// Union `node_ids` into the cluster for `(task, owner, type)`, creating
    /// it on first use. A provided summary replaces the stored one.
    pub fn upsert_cluster(
        &self,
        task_id: &TaskId,
        owner_id: &OwnerId,
        cluster_type: ClusterType,
        node_ids: &[NodeId],
        summary: Option<&str>,
    ) -> LexigraphResult<Cluster> {
        if task_id.as_str().is_empty() {
            return Err(LexigraphError::InvalidInput("task_id is empty".to_string()));
        }
        let ids: BTreeSet<NodeId> = node_ids.iter().cloned().collect();
        let cluster = self
            .store
            .merge_cluster(task_id, owner_id, cluster_type, &ids, summary)?;
        debug!(
            task_id = %task_id,
            cluster_type = cluster_type.as_str(),
            size = cluster.node_ids.len(),
            "cluster merged"
        );
        Ok(cluster)
    }

    pub fn get_cluster(
        &self,
        task_id: &TaskId,
        owner_id: &OwnerId,
        cluster_type: ClusterType,
    ) -> LexigraphResult<Option<Cluster>> {
        Ok(self.store.load_cluster(task_id, owner_id, cluster_type)?)
    }

    /// `None` until the task has an ideation cluster
    pub fn get_cluster_diff(
        &self,
        task_id: &TaskId,
        owner_id: &OwnerId,
    ) -> LexigraphResult<Option<ClusterDiff>> {
        let Some(ideation) = self.get_cluster(task_id, owner_id, ClusterType::Ideation)? else {
            return Ok(None);
        };
        let result = self.get_cluster(task_id, owner_id, ClusterType::Result)?;
        Ok(Some(ClusterDiff::between(&ideation, result.as_ref())))
    }

    /// Union of the task's ideation and result clusters
    pub fn active_set(&self, task_id: &TaskId, owner_id: &OwnerId) -> LexigraphResult<BTreeSet<NodeId>> {
        let mut active = BTreeSet::new();
        for cluster_type in [ClusterType::Ideation, ClusterType::Result] {
            if let Some(cluster) = self.get_cluster(task_id, owner_id, cluster_type)? {
                active.extend(cluster.node_ids);
            }
        }
        Ok(active)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStore;

    fn ids(names: &[&str]) -> Vec<NodeId> {
        names.iter().map(|n| NodeId::from(*n)).collect()
    }

    fn set(names: &[&str]) -> BTreeSet<NodeId> {
        ids(names).into_iter().collect()
    }

    fn clusters() -> PhaseClusters {
        PhaseClusters::new(Arc::new(MemoryStore::new()))
    }

    #[test]
    fn disjoint_upserts_union() {
        let clusters = clusters();
        let task = TaskId::from("t1");
        let owner = OwnerId::from("u1");

        clusters
            .upsert_cluster(&task, &owner, ClusterType::Ideation, &ids(&["a", "b"]), Some("first"))
            .unwrap();
        let merged = clusters
            .upsert_cluster(&task, &owner, ClusterType::Ideation, &ids(&["c"]), None)
            .unwrap();

        assert_eq!(merged.node_ids, set(&["a", "b", "c"]));
        assert_eq!(merged.summary.as_deref(), Some("first"));

        let replaced = clusters
            .upsert_cluster(&task, &owner, ClusterType::Ideation, &[], Some("second"))
            .unwrap();
        assert_eq!(replaced.summary.as_deref(), Some("second"));
        assert_eq!(replaced.node_ids.len(), 3);
    }

    #[test]
    fn diff_between_phases() {
        let clusters = clusters();
        let task = TaskId::from("t1");
        let owner = OwnerId::from("u1");
        clusters
            .upsert_cluster(&task, &owner, ClusterType::Ideation, &ids(&["A", "B", "C"]), None)
            .unwrap();
        clusters
            .upsert_cluster(&task, &owner, ClusterType::Result, &ids(&["B", "C", "D"]), None)
            .unwrap();

        let diff = clusters.get_cluster_diff(&task, &owner).unwrap().unwrap();
        assert_eq!(diff.added_node_ids, set(&["D"]));
        assert_eq!(diff.removed_node_ids, set(&["A"]));
        assert_eq!(clusters.active_set(&task, &owner).unwrap(), set(&["A", "B", "C", "D"]));
    }

    #[test]
    fn diff_without_result_removes_everything() {
        let clusters = clusters();
        let task = TaskId::from("t1");
        let owner = OwnerId::from("u1");
        clusters
            .upsert_cluster(&task, &owner, ClusterType::Ideation, &ids(&["A", "B"]), None)
            .unwrap();

        let diff = clusters.get_cluster_diff(&task, &owner).unwrap().unwrap();
        assert!(diff.added_node_ids.is_empty());
        assert_eq!(diff.removed_node_ids, set(&["A", "B"]));
    }

    #[test]
    fn diff_without_ideation_is_none() {
        let clusters = clusters();
        let task = TaskId::from("t1");
        let owner = OwnerId::from("u1");
        clusters
            .upsert_cluster(&task, &owner, ClusterType::Result, &ids(&["D"]), None)
            .unwrap();

        assert!(clusters.get_cluster_diff(&task, &owner).unwrap().is_none());
        assert!(clusters
            .get_cluster_diff(&TaskId::from("other"), &owner)
            .unwrap()
            .is_none());
    }

    #[test]
    fn clusters_are_per_owner() {
        let clusters = clusters();
        let task = TaskId::from("t1");
        clusters
            .upsert_cluster(&task, &OwnerId::from("u1"), ClusterType::Ideation, &ids(&["A"]), None)
            .unwrap();
        assert!(clusters
            .get_cluster_diff(&task, &OwnerId::from("u2"))
            .unwrap()
            .is_none());
    }
}
