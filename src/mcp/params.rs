//! MCP tool parameter structs with schemars-derived JSON schemas.

use schemars::JsonSchema;
use serde::Deserialize;

// ── Ingest params ───────────────────────────────────────────────────────

#[derive(Debug, Deserialize, JsonSchema)]
pub struct ProcessTextParams {
    #[schemars(description = "The text to extract concepts from")]
    pub text: String,
    #[schemars(description = "Kind of source, e.g. 'email', 'chat', 'note'")]
    pub source_type: String,
    #[schemars(description = "Identifier of the source item")]
    pub source_id: String,
    #[schemars(description = "'sent', 'received' or 'self'")]
    pub direction: String,
    #[schemars(description = "Owner of the graph partition")]
    pub owner_id: String,
    #[schemars(description = "Task the text belongs to")]
    pub task_id: Option<String>,
    #[schemars(description = "Task phase: 'ideation' or 'result'")]
    pub phase: Option<String>,
    pub conversation_turn_id: Option<String>,
    #[schemars(description = "Queue the text and return immediately")]
    pub background: Option<bool>,
}

// ── Node params ─────────────────────────────────────────────────────────

#[derive(Debug, Deserialize, JsonSchema)]
pub struct ListNodesParams {
    pub owner_id: String,
    #[schemars(description = "Filter by type: 'keyword', 'person' or 'project'")]
    pub node_type: Option<String>,
    #[schemars(description = "Minimum level: 'recognition', 'understanding' or 'mastery'")]
    pub min_level: Option<String>,
    pub confirmed: Option<bool>,
    #[schemars(description = "Maximum number of nodes to return")]
    pub limit: Option<usize>,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct NodeParams {
    pub owner_id: String,
    #[schemars(description = "The node ID")]
    pub node_id: String,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct LinkContactParams {
    pub owner_id: String,
    #[schemars(description = "The person node ID")]
    pub node_id: String,
    #[schemars(description = "Contact record to link")]
    pub contact_id: String,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct ListEdgesParams {
    pub owner_id: String,
    #[schemars(description = "Only edges scoped to this task")]
    pub task_id: Option<String>,
}

// ── Cluster params ──────────────────────────────────────────────────────

#[derive(Debug, Deserialize, JsonSchema)]
pub struct TaskParams {
    pub owner_id: String,
    pub task_id: String,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct UpsertClusterParams {
    pub owner_id: String,
    pub task_id: String,
    #[schemars(description = "'ideation' or 'result'")]
    pub cluster_type: String,
    #[schemars(description = "Node IDs to merge into the cluster")]
    pub node_ids: Vec<String>,
    pub summary: Option<String>,
}

// ── Checkpoint params ───────────────────────────────────────────────────

#[derive(Debug, Deserialize, JsonSchema)]
pub struct AddCheckpointParams {
    pub owner_id: String,
    pub task_id: String,
    #[schemars(description = "Node IDs to snapshot; defaults to the task's active set")]
    pub node_ids: Option<Vec<String>>,
    pub summary: Option<String>,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct ListCheckpointsParams {
    pub owner_id: Option<String>,
    pub task_id: Option<String>,
}

// ── Taxonomy params ─────────────────────────────────────────────────────

#[derive(Debug, Deserialize, JsonSchema)]
pub struct ClassifyParams {
    #[schemars(description = "Label to place in the domain/field hierarchy")]
    pub label: String,
}
