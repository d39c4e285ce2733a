//! MCP server for Lexigraph: exposes concept extraction, phase clusters,
//! checkpoints and taxonomy lookup via the Model Context Protocol.

pub mod params;

use params::*;
use crate::accumulator::ProcessTextRequest;
use crate::api::KnowledgeApi;
use crate::config::Config;
use crate::graph::{ClusterType, ContactId, Direction, NodeId, NodeType, OwnerId, TaskId, UnderstandingLevel};
use crate::storage::NodeFilter;
use crate::worker::ExtractionWorker;
use rmcp::{
    handler::server::{router::tool::ToolRouter, wrapper::Parameters},
    model::{CallToolResult, Content, ServerCapabilities, ServerInfo},
    tool, tool_handler, tool_router, ErrorData as McpError, ServerHandler, ServiceExt,
};
use serde::Serialize;
use std::str::FromStr;
use std::sync::Arc;
use tracing::{error, info, warn};

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn ok_text(text: String) -> Result<CallToolResult, McpError> {
    Ok(CallToolResult::success(vec![Content::text(text)]))
}

fn err_text(msg: String) -> Result<CallToolResult, McpError> {
    Ok(CallToolResult::error(vec![Content::text(msg)]))
}

fn ok_json<T: Serialize>(value: &T) -> Result<CallToolResult, McpError> {
    match serde_json::to_string_pretty(value) {
        Ok(text) => ok_text(text),
        Err(e) => err_text(e.to_string()),
    }
}

fn parse<T: FromStr<Err = String>>(value: Option<&str>) -> Result<Option<T>, String> {
    value.map(T::from_str).transpose()
}

fn node_ids(ids: Vec<String>) -> Vec<NodeId> {
    ids.into_iter().map(NodeId::from).collect()
}

// ---------------------------------------------------------------------------
// LexigraphMcpServer
// ---------------------------------------------------------------------------

#[derive(Clone)]
pub struct LexigraphMcpServer {
    api: KnowledgeApi,
    worker: Arc<ExtractionWorker>,
    tool_router: ToolRouter<Self>,
}

#[tool_router]
impl LexigraphMcpServer {
    /// Must be called inside a tokio runtime: the background worker starts here.
    pub fn new(api: KnowledgeApi) -> Self {
        let worker = Arc::new(api.start_worker());
        Self {
            api,
            worker,
            tool_router: Self::tool_router(),
        }
    }

    /// Shared handle on the background worker, for shutdown after serving
    pub fn worker(&self) -> Arc<ExtractionWorker> {
        self.worker.clone()
    }

    // ── Ingest ──────────────────────────────────────────────────────────

    #[tool(description = "Extract keywords, persons and projects from text and fold them into the owner's concept graph")]
    async fn process_text(
        &self,
        Parameters(p): Parameters<ProcessTextParams>,
    ) -> Result<CallToolResult, McpError> {
        let direction = match Direction::from_str(&p.direction) {
            Ok(d) => d,
            Err(e) => return err_text(e),
        };
        let phase = match parse::<ClusterType>(p.phase.as_deref()) {
            Ok(phase) => phase,
            Err(e) => return err_text(e),
        };

        let mut request = ProcessTextRequest::new(
            p.text,
            p.source_type,
            p.source_id,
            direction,
            OwnerId::from(p.owner_id),
        );
        request.task_id = p.task_id.map(TaskId::from);
        request.phase = phase;
        request.conversation_turn_id = p.conversation_turn_id;

        if p.background.unwrap_or(false) {
            return if self.worker.enqueue(request) {
                ok_json(&serde_json::json!({ "queued": true }))
            } else {
                err_text("extraction queue is full, try again later".to_string())
            };
        }

        match self.api.process_text(&request).await {
            Ok(outcome) => ok_json(&outcome),
            Err(e) => err_text(e.to_string()),
        }
    }

    // ── Nodes ───────────────────────────────────────────────────────────

    #[tool(description = "List an owner's concept nodes, most frequent first")]
    fn list_nodes(
        &self,
        Parameters(p): Parameters<ListNodesParams>,
    ) -> Result<CallToolResult, McpError> {
        let node_type = match parse::<NodeType>(p.node_type.as_deref()) {
            Ok(t) => t,
            Err(e) => return err_text(e),
        };
        let min_level = match parse::<UnderstandingLevel>(p.min_level.as_deref()) {
            Ok(l) => l,
            Err(e) => return err_text(e),
        };
        let filter = NodeFilter {
            node_type,
            min_level,
            confirmed: p.confirmed,
            limit: p.limit,
        };
        match self.api.list_nodes(&OwnerId::from(p.owner_id), &filter) {
            Ok(nodes) => ok_json(&nodes),
            Err(e) => err_text(e.to_string()),
        }
    }

    #[tool(description = "Mark a node as confirmed by its owner")]
    fn confirm_node(
        &self,
        Parameters(p): Parameters<NodeParams>,
    ) -> Result<CallToolResult, McpError> {
        match self
            .api
            .confirm_node(&OwnerId::from(p.owner_id), &NodeId::from(p.node_id))
        {
            Ok(node) => ok_json(&node),
            Err(e) => err_text(e.to_string()),
        }
    }

    #[tool(description = "Link a person node to a contact record")]
    fn link_contact(
        &self,
        Parameters(p): Parameters<LinkContactParams>,
    ) -> Result<CallToolResult, McpError> {
        match self.api.link_contact(
            &OwnerId::from(p.owner_id),
            &NodeId::from(p.node_id),
            ContactId::from(p.contact_id),
        ) {
            Ok(node) => ok_json(&node),
            Err(e) => err_text(e.to_string()),
        }
    }

    #[tool(description = "List co-occurrence edges, heaviest first")]
    fn list_edges(
        &self,
        Parameters(p): Parameters<ListEdgesParams>,
    ) -> Result<CallToolResult, McpError> {
        let task = p.task_id.map(TaskId::from);
        match self.api.list_edges(&OwnerId::from(p.owner_id), task.as_ref()) {
            Ok(edges) => ok_json(&edges),
            Err(e) => err_text(e.to_string()),
        }
    }

    // ── Clusters ────────────────────────────────────────────────────────

    #[tool(description = "Merge nodes into a task's ideation or result cluster")]
    fn upsert_cluster(
        &self,
        Parameters(p): Parameters<UpsertClusterParams>,
    ) -> Result<CallToolResult, McpError> {
        let cluster_type = match ClusterType::from_str(&p.cluster_type) {
            Ok(t) => t,
            Err(e) => return err_text(e),
        };
        match self.api.upsert_cluster(
            &TaskId::from(p.task_id),
            &OwnerId::from(p.owner_id),
            cluster_type,
            &node_ids(p.node_ids),
            p.summary.as_deref(),
        ) {
            Ok(cluster) => ok_json(&cluster),
            Err(e) => err_text(e.to_string()),
        }
    }

    #[tool(description = "Compare a task's ideation cluster with its result cluster")]
    fn cluster_diff(
        &self,
        Parameters(p): Parameters<TaskParams>,
    ) -> Result<CallToolResult, McpError> {
        match self
            .api
            .cluster_diff(&TaskId::from(p.task_id.as_str()), &OwnerId::from(p.owner_id))
        {
            Ok(Some(diff)) => ok_json(&diff),
            Ok(None) => err_text(format!("task {} has no ideation cluster", p.task_id)),
            Err(e) => err_text(e.to_string()),
        }
    }

    // ── Checkpoints ─────────────────────────────────────────────────────

    #[tool(description = "Snapshot a task's node set as a manual checkpoint")]
    fn add_checkpoint(
        &self,
        Parameters(p): Parameters<AddCheckpointParams>,
    ) -> Result<CallToolResult, McpError> {
        match self.api.add_checkpoint(
            &TaskId::from(p.task_id),
            &OwnerId::from(p.owner_id),
            p.node_ids.map(node_ids),
            p.summary,
        ) {
            Ok(checkpoint) => ok_json(&checkpoint),
            Err(e) => err_text(e.to_string()),
        }
    }

    #[tool(description = "List checkpoints, oldest first, optionally filtered by task and owner")]
    fn list_checkpoints(
        &self,
        Parameters(p): Parameters<ListCheckpointsParams>,
    ) -> Result<CallToolResult, McpError> {
        let task = p.task_id.map(TaskId::from);
        let owner = p.owner_id.map(OwnerId::from);
        match self.api.list_checkpoints(task.as_ref(), owner.as_ref()) {
            Ok(checkpoints) => ok_json(&checkpoints),
            Err(e) => err_text(e.to_string()),
        }
    }

    // ── Taxonomy ────────────────────────────────────────────────────────

    #[tool(description = "Place a label in the domain/field/entry hierarchy")]
    async fn classify(
        &self,
        Parameters(p): Parameters<ClassifyParams>,
    ) -> Result<CallToolResult, McpError> {
        match self.api.classify(&p.label).await {
            Ok(classification) => ok_json(&classification),
            Err(e) => err_text(e.to_string()),
        }
    }
}

#[tool_handler]
impl ServerHandler for LexigraphMcpServer {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            instructions: Some(
                "Lexigraph MCP server: per-owner concept graphs built from text, with task phase clusters, checkpoints and a shared taxonomy"
                    .into(),
            ),
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            ..Default::default()
        }
    }
}

// ---------------------------------------------------------------------------
// Entry point
// ---------------------------------------------------------------------------

pub fn run_mcp_server(config: Config) -> i32 {
    let rt = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(e) => {
            error!(error = %e, "failed to create tokio runtime");
            return 1;
        }
    };

    rt.block_on(async {
        let api = match KnowledgeApi::from_config(config) {
            Ok(api) => api,
            Err(e) => {
                error!(error = %e, "failed to open knowledge graph");
                return 1;
            }
        };

        let server = LexigraphMcpServer::new(api);
        let worker = server.worker();

        info!("lexigraph mcp server starting on stdio");

        let service = match server.serve(rmcp::transport::stdio()).await {
            Ok(s) => s,
            Err(e) => {
                error!(error = %e, "failed to start MCP server");
                return 1;
            }
        };

        let code = match service.waiting().await {
            Ok(_) => 0,
            Err(e) => {
                error!(error = %e, "MCP server error");
                1
            }
        };

        match Arc::try_unwrap(worker) {
            Ok(worker) => {
                worker.shutdown().await;
            }
            Err(_) => warn!("background worker still shared at exit, queued jobs abandoned"),
        }

        code
    })
}
