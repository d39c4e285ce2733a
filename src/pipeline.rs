//! Ingest pipeline
//!
//! One call folds a piece of text into the owner's graph:
//! 1. Extract concepts (collaborator or rules) and upsert their nodes
//! 2. Classify new, unclassified nodes when enabled
//! 3. Reinforce co-occurrence edges among the batch
//! 4. Merge the nodes into the task's phase cluster when phase-tagged
//! 5. Record an auto checkpoint when the task's active set moved
//!
//! Steps 2 and 5 are enrichment: their failures are logged, never returned.

use crate::accumulator::{NodeAccumulator, ProcessTextRequest};
use crate::checkpoints::CheckpointRecorder;
use crate::classifier::TaxonomyClassifier;
use crate::clusters::PhaseClusters;
use crate::collaborator::UnderstandingClient;
use crate::config::Config;
use crate::cooccurrence::CoOccurrenceBuilder;
use crate::error::LexigraphResult;
use crate::extraction::{ExtractionGateway, ExtractionLimits, ExtractionOrigin};
use crate::graph::{Checkpoint, Cluster, Edge, Node, NodeId};
use crate::storage::GraphStore;
use serde::Serialize;
use std::sync::Arc;
use tracing::{info, warn};

/// What one `process` call changed
#[derive(Debug, Clone, Serialize)]
pub struct ProcessOutcome {
    pub origin: ExtractionOrigin,
    pub nodes: Vec<Node>,
    pub edges: Vec<Edge>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cluster: Option<Cluster>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub checkpoint: Option<Checkpoint>,
    /// Nodes that gained a classification in this call
    pub classified: usize,
}

pub struct IngestPipeline {
    accumulator: NodeAccumulator,
    classifier: TaxonomyClassifier,
    cooccurrence: CoOccurrenceBuilder,
    clusters: PhaseClusters,
    checkpoints: CheckpointRecorder,
    classify_on_ingest: bool,
    auto_checkpoint: bool,
}

impl IngestPipeline {
    /// Wire every component against one store and one optional collaborator.
    pub fn new(
        store: Arc<dyn GraphStore>,
        client: Option<Arc<dyn UnderstandingClient>>,
        config: &Config,
    ) -> Self {
        let gateway =
            ExtractionGateway::new(client.clone(), ExtractionLimits::from(&config.extraction));
        Self {
            accumulator: NodeAccumulator::new(
                store.clone(),
                gateway,
                config.extraction.min_confidence,
            ),
            classifier: TaxonomyClassifier::new(store.clone(), client, config.taxonomy.min_confidence),
            cooccurrence: CoOccurrenceBuilder::new(store.clone()),
            clusters: PhaseClusters::new(store.clone()),
            checkpoints: CheckpointRecorder::new(store),
            classify_on_ingest: config.taxonomy.classify_on_ingest,
            auto_checkpoint: config.checkpoints.auto,
        }
    }

    pub fn accumulator(&self) -> &NodeAccumulator {
        &self.accumulator
    }

    pub fn classifier(&self) -> &TaxonomyClassifier {
        &self.classifier
    }

    pub fn cooccurrence(&self) -> &CoOccurrenceBuilder {
        &self.cooccurrence
    }

    pub fn clusters(&self) -> &PhaseClusters {
        &self.clusters
    }

    pub fn checkpoints(&self) -> &CheckpointRecorder {
        &self.checkpoints
    }

    pub async fn process(&self, request: &ProcessTextRequest) -> LexigraphResult<ProcessOutcome> {
        let accumulated = self.accumulator.accumulate(request).await?;
        let mut nodes = accumulated.nodes;

        let mut classified = 0;
        if self.classify_on_ingest {
            for node in nodes.iter_mut().filter(|n| !n.is_classified()) {
                match self.classifier.classify_node(node).await {
                    Ok(Some(_)) => classified += 1,
                    Ok(None) => {}
                    Err(e) => warn!(node_id = %node.id, error = %e, "classification failed"),
                }
            }
        }

        let ids: Vec<NodeId> = nodes.iter().map(|n| n.id.clone()).collect();
        let edges = self.cooccurrence.create_co_occurrence_edges(
            &ids,
            &request.owner_id,
            request.task_id.as_ref(),
        )?;

        let mut cluster = None;
        let mut checkpoint = None;
        if let (Some(task_id), Some(phase)) = (&request.task_id, request.phase) {
            if !ids.is_empty() {
                cluster = Some(
                    self.clusters
                        .upsert_cluster(task_id, &request.owner_id, phase, &ids, None)?,
                );
                if self.auto_checkpoint {
                    checkpoint = self
                        .clusters
                        .active_set(task_id, &request.owner_id)
                        .and_then(|active| {
                            self.checkpoints
                                .record_if_changed(task_id, &request.owner_id, &active)
                        })
                        .unwrap_or_else(|e| {
                            warn!(task_id = %task_id, error = %e, "auto checkpoint failed");
                            None
                        });
                }
            }
        }

        info!(
            owner_id = %request.owner_id,
            source_id = %request.source_id,
            origin = ?accumulated.extraction.origin,
            nodes = nodes.len(),
            edges = edges.len(),
            "text processed"
        );

        Ok(ProcessOutcome {
            origin: accumulated.extraction.origin,
            nodes,
            edges,
            cluster,
            checkpoint,
            classified,
        })
    }
}
