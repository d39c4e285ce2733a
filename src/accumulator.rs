//! Node accumulator: entity resolution and the understanding-level machine
//!
//! Every sighting goes through the store's find-or-create, so two calls that
//! race on the same `(normalized key, type, owner)` still end with one node
//! whose history holds both contexts.

use crate::error::{LexigraphError, LexigraphResult};
use crate::extraction::{Extraction, ExtractionGateway};
use crate::graph::{
    ClusterType, ContactId, Direction, Node, NodeId, NodeType, OwnerId, SourceContext, TaskId,
};
use crate::storage::{GraphStore, Sighting};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::debug;

/// One piece of text to fold into an owner's graph
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessTextRequest {
    pub text: String,
    pub source_type: String,
    pub source_id: String,
    pub direction: Direction,
    pub owner_id: OwnerId,
    #[serde(default)]
    pub task_id: Option<TaskId>,
    #[serde(default)]
    pub phase: Option<ClusterType>,
    #[serde(default)]
    pub conversation_turn_id: Option<String>,
}

impl ProcessTextRequest {
    pub fn new(
        text: impl Into<String>,
        source_type: impl Into<String>,
        source_id: impl Into<String>,
        direction: Direction,
        owner_id: OwnerId,
    ) -> Self {
        Self {
            text: text.into(),
            source_type: source_type.into(),
            source_id: source_id.into(),
            direction,
            owner_id,
            task_id: None,
            phase: None,
            conversation_turn_id: None,
        }
    }

    pub fn in_task(mut self, task_id: TaskId) -> Self {
        self.task_id = Some(task_id);
        self
    }

    pub fn in_phase(mut self, phase: ClusterType) -> Self {
        self.phase = Some(phase);
        self
    }

    pub fn with_turn(mut self, turn_id: impl Into<String>) -> Self {
        self.conversation_turn_id = Some(turn_id.into());
        self
    }

    /// The source context every node sighted in this text receives
    pub fn context(&self) -> SourceContext {
        let mut context =
            SourceContext::new(self.source_type.clone(), self.source_id.clone(), self.direction);
        if let Some(phase) = self.phase {
            context = context.with_phase(phase);
        }
        if let Some(turn) = &self.conversation_turn_id {
            context = context.with_turn(turn.clone());
        }
        context
    }

    fn validate(&self) -> LexigraphResult<()> {
        if self.owner_id.as_str().is_empty() {
            return Err(LexigraphError::InvalidInput("owner_id is empty".to_string()));
        }
        if self.source_type.trim().is_empty() {
            return Err(LexigraphError::InvalidInput("source_type is empty".to_string()));
        }
        if matches!(&self.task_id, Some(task) if task.as_str().trim().is_empty()) {
            return Err(LexigraphError::InvalidInput("task_id is empty".to_string()));
        }
        Ok(())
    }
}

/// Extraction plus the nodes it produced
#[derive(Debug, Clone)]
pub struct Accumulated {
    pub extraction: Extraction,
    /// Nodes after the sighting, in extraction order
    pub nodes: Vec<Node>,
}

pub struct NodeAccumulator {
    store: Arc<dyn GraphStore>,
    gateway: ExtractionGateway,
    min_confidence: f64,
}

impl NodeAccumulator {
    pub fn new(store: Arc<dyn GraphStore>, gateway: ExtractionGateway, min_confidence: f64) -> Self {
        Self {
            store,
            gateway,
            min_confidence,
        }
    }

    /// Find or create the node for `label` and append `context` to it
    pub fn upsert_node(
        &self,
        label: &str,
        node_type: NodeType,
        owner_id: &OwnerId,
        context: SourceContext,
    ) -> LexigraphResult<Node> {
        if label.trim().is_empty() {
            return Err(LexigraphError::InvalidInput("label is empty".to_string()));
        }
        let node = self.store.record_sighting(&Sighting {
            label: label.to_string(),
            node_type,
            owner_id: owner_id.clone(),
            context,
        })?;
        debug!(
            node_id = %node.id,
            label = %node.label,
            frequency = node.frequency,
            level = %node.understanding_level.as_str(),
            "node sighted"
        );
        Ok(node)
    }

    /// Extract concepts from the text and upsert a node for each accepted one
    pub async fn process_text(&self, request: &ProcessTextRequest) -> LexigraphResult<Vec<Node>> {
        Ok(self.accumulate(request).await?.nodes)
    }

    /// Like [`process_text`](Self::process_text), also returning the extraction
    pub async fn accumulate(&self, request: &ProcessTextRequest) -> LexigraphResult<Accumulated> {
        request.validate()?;
        let extraction = self.gateway.extract(&request.text).await;
        let context = request.context();

        let mut nodes = Vec::new();
        for (node_type, item) in extraction.accepted(self.min_confidence) {
            let node = self.upsert_node(&item.label, node_type, &request.owner_id, context.clone())?;
            nodes.push(node);
        }

        Ok(Accumulated { extraction, nodes })
    }

    fn owned_node(&self, owner_id: &OwnerId, node_id: &NodeId) -> LexigraphResult<Node> {
        self.store
            .load_node(owner_id, node_id)?
            .ok_or_else(|| LexigraphError::NodeNotFound(node_id.clone()))
    }

    /// Mark a node as confirmed by its owner
    pub fn confirm_node(&self, owner_id: &OwnerId, node_id: &NodeId) -> LexigraphResult<Node> {
        let mut node = self.owned_node(owner_id, node_id)?;
        node.confirmed = true;
        self.store.update_node_links(&node)?;
        Ok(node)
    }

    /// Link a person node to a contact record
    pub fn link_contact(
        &self,
        owner_id: &OwnerId,
        node_id: &NodeId,
        contact_id: ContactId,
    ) -> LexigraphResult<Node> {
        let mut node = self.owned_node(owner_id, node_id)?;
        if node.node_type != NodeType::Person {
            return Err(LexigraphError::WrongNodeType {
                node: node.id,
                expected: NodeType::Person,
                actual: node.node_type,
            });
        }
        node.contact_id = Some(contact_id);
        self.store.update_node_links(&node)?;
        Ok(node)
    }
}
