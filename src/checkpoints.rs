//! Checkpoint recorder
//!
//! Checkpoints are immutable snapshots of a task's active node set. Manual
//! ones are always written; auto ones only when the set moved since the
//! task's latest checkpoint.

use crate::error::{LexigraphError, LexigraphResult};
use crate::graph::{Checkpoint, CheckpointSource, NodeId, OwnerId, TaskId};
use crate::storage::GraphStore;
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::info;

pub struct CheckpointRecorder {
    store: Arc<dyn GraphStore>,
}

impl CheckpointRecorder {
    pub fn new(store: Arc<dyn GraphStore>) -> Self {
        Self { store }
    }

    /// Append a checkpoint. Always inserts, even if an identical one exists.
    pub fn add_checkpoint(
        &self,
        task_id: &TaskId,
        owner_id: &OwnerId,
        node_ids: &[NodeId],
        source: CheckpointSource,
        summary: Option<String>,
    ) -> LexigraphResult<Checkpoint> {
        if task_id.as_str().is_empty() {
            return Err(LexigraphError::InvalidInput("task_id is empty".to_string()));
        }
        let checkpoint = Checkpoint::new(
            task_id.clone(),
            owner_id.clone(),
            node_ids.iter().cloned(),
            source,
            summary,
        );
        self.store.append_checkpoint(&checkpoint)?;
        info!(
            task_id = %task_id,
            source = source.as_str(),
            nodes = checkpoint.node_ids.len(),
            "checkpoint recorded"
        );
        Ok(checkpoint)
    }

    /// Oldest first; ties keep insertion order
    pub fn get_checkpoints(
        &self,
        task_id: Option<&TaskId>,
        owner_id: Option<&OwnerId>,
    ) -> LexigraphResult<Vec<Checkpoint>> {
        Ok(self.store.list_checkpoints(task_id, owner_id)?)
    }

    /// Record an auto checkpoint of `active` unless it is empty or equal to
    /// the task's latest snapshot.
    pub fn record_if_changed(
        &self,
        task_id: &TaskId,
        owner_id: &OwnerId,
        active: &BTreeSet<NodeId>,
    ) -> LexigraphResult<Option<Checkpoint>> {
        if active.is_empty() {
            return Ok(None);
        }
        let history = self.get_checkpoints(Some(task_id), Some(owner_id))?;
        if history.last().map_or(false, |last| last.same_nodes(active)) {
            return Ok(None);
        }
        let ids: Vec<NodeId> = active.iter().cloned().collect();
        self.add_checkpoint(task_id, owner_id, &ids, CheckpointSource::Auto, None)
            .map(Some)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStore;

    fn recorder() -> CheckpointRecorder {
        CheckpointRecorder::new(Arc::new(MemoryStore::new()))
    }

    fn set(names: &[&str]) -> BTreeSet<NodeId> {
        names.iter().map(|n| NodeId::from(*n)).collect()
    }

    #[test]
    fn identical_manual_checkpoints_are_both_kept() {
        let rec = recorder();
        let task = TaskId::from("t1");
        let owner = OwnerId::from("u1");
        let nodes = vec![NodeId::from("b"), NodeId::from("a")];

        let first = rec
            .add_checkpoint(&task, &owner, &nodes, CheckpointSource::Manual, None)
            .unwrap();
        let second = rec
            .add_checkpoint(&task, &owner, &nodes, CheckpointSource::Manual, Some("again".into()))
            .unwrap();

        assert_ne!(first.id, second.id);
        assert_eq!(first.node_ids, vec![NodeId::from("a"), NodeId::from("b")]);
        let listed = rec.get_checkpoints(Some(&task), None).unwrap();
        assert_eq!(listed.len(), 2);
        assert_eq!(listed[0].id, first.id);
    }

    #[test]
    fn filters_by_task_and_owner() {
        let rec = recorder();
        let owner = OwnerId::from("u1");
        rec.add_checkpoint(&TaskId::from("t1"), &owner, &[], CheckpointSource::Manual, None)
            .unwrap();
        rec.add_checkpoint(&TaskId::from("t2"), &owner, &[], CheckpointSource::Manual, None)
            .unwrap();
        rec.add_checkpoint(&TaskId::from("t1"), &OwnerId::from("u2"), &[], CheckpointSource::Manual, None)
            .unwrap();

        assert_eq!(rec.get_checkpoints(None, None).unwrap().len(), 3);
        assert_eq!(rec.get_checkpoints(Some(&TaskId::from("t1")), None).unwrap().len(), 2);
        assert_eq!(
            rec.get_checkpoints(Some(&TaskId::from("t1")), Some(&owner))
                .unwrap()
                .len(),
            1
        );
    }

    #[test]
    fn auto_checkpoint_only_on_change() {
        let rec = recorder();
        let task = TaskId::from("t1");
        let owner = OwnerId::from("u1");

        assert!(rec.record_if_changed(&task, &owner, &set(&[])).unwrap().is_none());
        let first = rec.record_if_changed(&task, &owner, &set(&["a"])).unwrap();
        assert_eq!(first.unwrap().source, CheckpointSource::Auto);
        assert!(rec.record_if_changed(&task, &owner, &set(&["a"])).unwrap().is_none());
        assert!(rec
            .record_if_changed(&task, &owner, &set(&["a", "b"]))
            .unwrap()
            .is_some());
        assert_eq!(rec.get_checkpoints(Some(&task), Some(&owner)).unwrap().len(), 2);
    }
}
