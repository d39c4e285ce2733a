//! Transport-independent API layer.
//!
//! `KnowledgeApi` is the single entry point for consumer-facing operations.
//! The MCP server and the CLI call `KnowledgeApi` methods; they never reach
//! into the store or the pipeline components directly.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::info;

use crate::accumulator::ProcessTextRequest;
use crate::collaborator::{CollaboratorError, HttpClient, UnderstandingClient};
use crate::config::Config;
use crate::error::{LexigraphError, LexigraphResult};
use crate::graph::{
    normalize_key, Checkpoint, CheckpointSource, Classification, Cluster, ClusterDiff,
    ClusterType, ContactId, Domain, Edge, Field, FieldId, MasterEntry, MasterEntryId, Node,
    NodeId, OwnerId, TaskId, Taxonomy,
};
use crate::pipeline::{IngestPipeline, ProcessOutcome};
use crate::storage::{GraphStore, MemoryStore, NodeFilter, OpenStore, SqliteStore, StorageError};
use crate::worker::ExtractionWorker;

/// Errors from setting the API up or importing a catalogue
#[derive(Debug, Error)]
pub enum ApiError {
    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error(transparent)]
    Graph(#[from] LexigraphError),

    #[error("failed to read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid taxonomy catalogue: {0}")]
    Catalogue(#[from] serde_yaml::Error),
}

/// A master entry as written in a catalogue file; the id is optional
#[derive(Debug, Clone, Deserialize)]
pub struct CatalogueEntry {
    #[serde(default)]
    pub id: Option<MasterEntryId>,
    pub field_id: FieldId,
    pub label: String,
    #[serde(default)]
    pub synonyms: Vec<String>,
}

/// YAML layout accepted by [`KnowledgeApi::import_taxonomy`]
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TaxonomyCatalogue {
    #[serde(default)]
    pub domains: Vec<Domain>,
    #[serde(default)]
    pub fields: Vec<Field>,
    #[serde(default)]
    pub entries: Vec<CatalogueEntry>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ImportSummary {
    pub domains: usize,
    pub fields: usize,
    pub entries: usize,
}

/// Single entry point for all consumer-facing operations.
#[derive(Clone)]
pub struct KnowledgeApi {
    store: Arc<dyn GraphStore>,
    pipeline: Arc<IngestPipeline>,
    config: Config,
}

impl KnowledgeApi {
    pub fn new(
        store: Arc<dyn GraphStore>,
        client: Option<Arc<dyn UnderstandingClient>>,
        config: Config,
    ) -> Self {
        let pipeline = Arc::new(IngestPipeline::new(store.clone(), client, &config));
        Self {
            store,
            pipeline,
            config,
        }
    }

    /// Open the configured SQLite database and, if reachable, the HTTP
    /// collaborator. Without one the API runs on the rule-based extractor.
    pub fn from_config(config: Config) -> Result<Self, ApiError> {
        let path = config.database_path();
        let store = SqliteStore::open(&path)?;
        info!(path = %path.display(), "opened graph database");
        Ok(Self::new(Arc::new(store), collaborator_from(&config), config))
    }

    /// Volatile store, rule-based extraction only
    pub fn in_memory(config: Config) -> Self {
        Self::new(Arc::new(MemoryStore::new()), None, config)
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    // --- Write ---

    /// Run the full ingest flow for one text and wait for it.
    pub async fn process_text(&self, request: &ProcessTextRequest) -> LexigraphResult<ProcessOutcome> {
        self.pipeline.process(request).await
    }

    /// Start a background worker over this API's pipeline.
    pub fn start_worker(&self) -> ExtractionWorker {
        ExtractionWorker::spawn(self.pipeline.clone(), &self.config.worker)
    }

    pub fn confirm_node(&self, owner_id: &OwnerId, node_id: &NodeId) -> LexigraphResult<Node> {
        self.pipeline.accumulator().confirm_node(owner_id, node_id)
    }

    pub fn link_contact(
        &self,
        owner_id: &OwnerId,
        node_id: &NodeId,
        contact_id: ContactId,
    ) -> LexigraphResult<Node> {
        self.pipeline
            .accumulator()
            .link_contact(owner_id, node_id, contact_id)
    }

    pub fn upsert_cluster(
        &self,
        task_id: &TaskId,
        owner_id: &OwnerId,
        cluster_type: ClusterType,
        node_ids: &[NodeId],
        summary: Option<&str>,
    ) -> LexigraphResult<Cluster> {
        self.pipeline
            .clusters()
            .upsert_cluster(task_id, owner_id, cluster_type, node_ids, summary)
    }

    /// Record a manual checkpoint. Without explicit ids the task's current
    /// active set is snapshotted.
    pub fn add_checkpoint(
        &self,
        task_id: &TaskId,
        owner_id: &OwnerId,
        node_ids: Option<Vec<NodeId>>,
        summary: Option<String>,
    ) -> LexigraphResult<Checkpoint> {
        let node_ids = match node_ids {
            Some(ids) => ids,
            None => self
                .pipeline
                .clusters()
                .active_set(task_id, owner_id)?
                .into_iter()
                .collect(),
        };
        self.pipeline.checkpoints().add_checkpoint(
            task_id,
            owner_id,
            &node_ids,
            CheckpointSource::Manual,
            summary,
        )
    }

    // --- Reads ---

    pub fn get_node(&self, owner_id: &OwnerId, node_id: &NodeId) -> LexigraphResult<Node> {
        self.store
            .load_node(owner_id, node_id)?
            .ok_or_else(|| LexigraphError::NodeNotFound(node_id.clone()))
    }

    pub fn list_nodes(&self, owner_id: &OwnerId, filter: &NodeFilter) -> LexigraphResult<Vec<Node>> {
        Ok(self.store.find_nodes(owner_id, filter)?)
    }

    pub fn list_edges(&self, owner_id: &OwnerId, task_id: Option<&TaskId>) -> LexigraphResult<Vec<Edge>> {
        Ok(self.store.list_edges(owner_id, task_id)?)
    }

    pub fn get_cluster(
        &self,
        task_id: &TaskId,
        owner_id: &OwnerId,
        cluster_type: ClusterType,
    ) -> LexigraphResult<Option<Cluster>> {
        self.pipeline
            .clusters()
            .get_cluster(task_id, owner_id, cluster_type)
    }

    pub fn cluster_diff(&self, task_id: &TaskId, owner_id: &OwnerId) -> LexigraphResult<Option<ClusterDiff>> {
        self.pipeline.clusters().get_cluster_diff(task_id, owner_id)
    }

    pub fn list_checkpoints(
        &self,
        task_id: Option<&TaskId>,
        owner_id: Option<&OwnerId>,
    ) -> LexigraphResult<Vec<Checkpoint>> {
        self.pipeline.checkpoints().get_checkpoints(task_id, owner_id)
    }

    // --- Taxonomy ---

    pub fn taxonomy(&self) -> LexigraphResult<Taxonomy> {
        Ok(self.store.load_taxonomy()?)
    }

    pub async fn classify(&self, label: &str) -> LexigraphResult<Option<Classification>> {
        self.pipeline.classifier().classify(label).await
    }

    /// Classify one stored node and persist the result
    pub async fn classify_node(
        &self,
        owner_id: &OwnerId,
        node_id: &NodeId,
    ) -> LexigraphResult<Option<Classification>> {
        let mut node = self.get_node(owner_id, node_id)?;
        self.pipeline.classifier().classify_node(&mut node).await
    }

    pub fn import_taxonomy(&self, path: &Path) -> Result<ImportSummary, ApiError> {
        let text = std::fs::read_to_string(path).map_err(|source| ApiError::Io {
            path: path.display().to_string(),
            source,
        })?;
        self.import_taxonomy_yaml(&text)
    }

    /// Load domains, fields and entries. Fields must name a known domain,
    /// entries a known field, and an entry id may denote only one
    /// (field, label) pair across the catalogue and the stored taxonomy.
    /// Nothing is written unless the whole catalogue validates. Re-importing
    /// is idempotent.
    pub fn import_taxonomy_yaml(&self, text: &str) -> Result<ImportSummary, ApiError> {
        let catalogue: TaxonomyCatalogue = serde_yaml::from_str(text)?;
        let existing = self.store.load_taxonomy()?;

        for field in &catalogue.fields {
            let known = catalogue.domains.iter().any(|d| d.id == field.domain_id)
                || existing.domain(&field.domain_id).is_some();
            if !known {
                return Err(LexigraphError::InvalidInput(format!(
                    "field {} names unknown domain {}",
                    field.id, field.domain_id
                ))
                .into());
            }
        }
        for entry in &catalogue.entries {
            let known = catalogue.fields.iter().any(|f| f.id == entry.field_id)
                || existing.field(&entry.field_id).is_some();
            if !known || entry.label.trim().is_empty() {
                return Err(LexigraphError::InvalidInput(format!(
                    "entry '{}' names unknown field {}",
                    entry.label, entry.field_id
                ))
                .into());
            }
        }

        check_entry_ids(&catalogue.entries, &existing)?;

        for domain in &catalogue.domains {
            self.store.save_domain(domain)?;
        }
        for field in &catalogue.fields {
            self.store.save_field(field)?;
        }
        for entry in &catalogue.entries {
            let mut master = MasterEntry::new(entry.field_id.clone(), entry.label.trim());
            if let Some(id) = &entry.id {
                master.id = id.clone();
            }
            master.synonyms.extend(entry.synonyms.iter().cloned());
            self.store.upsert_master_entry(&master)?;
        }

        let summary = ImportSummary {
            domains: catalogue.domains.len(),
            fields: catalogue.fields.len(),
            entries: catalogue.entries.len(),
        };
        info!(
            domains = summary.domains,
            fields = summary.fields,
            entries = summary.entries,
            "taxonomy imported"
        );
        Ok(summary)
    }
}

/// Explicit entry ids must not be reused for a different (field, label)
fn check_entry_ids(entries: &[CatalogueEntry], existing: &Taxonomy) -> LexigraphResult<()> {
    let mut claimed: HashMap<&MasterEntryId, (&FieldId, String)> = existing
        .entries
        .iter()
        .map(|e| (&e.id, (&e.field_id, normalize_key(&e.label))))
        .collect();

    for entry in entries {
        let Some(id) = &entry.id else { continue };
        let target = (&entry.field_id, normalize_key(&entry.label));
        match claimed.get(id) {
            Some(owner) if *owner != target => {
                return Err(LexigraphError::InvalidInput(format!(
                    "entry id {} is used for both '{}' and another entry",
                    id, entry.label
                )));
            }
            Some(_) => {}
            None => {
                claimed.insert(id, target);
            }
        }
    }
    Ok(())
}

fn collaborator_from(config: &Config) -> Option<Arc<dyn UnderstandingClient>> {
    match HttpClient::from_config(&config.extraction) {
        Ok(client) => Some(Arc::new(client)),
        Err(CollaboratorError::Unavailable(reason)) => {
            info!(%reason, "collaborator unavailable, using rule-based extraction");
            None
        }
        Err(e) => {
            tracing::warn!(error = %e, "collaborator setup failed, using rule-based extraction");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::{Direction, NodeType};

    const CATALOGUE: &str = r##"
domains:
  - id: d-marketing
    name: Marketing
    color: "#f97316"
fields:
  - id: f-search
    domain_id: d-marketing
    name: Search
entries:
  - id: e-seo
    field_id: f-search
    label: SEO
    synonyms: [Search Engine Optimization]
"##;

    fn api() -> KnowledgeApi {
        KnowledgeApi::in_memory(Config::default())
    }

    fn owner() -> OwnerId {
        OwnerId::from("u1")
    }

    #[test]
    fn import_is_idempotent() {
        let api = api();
        let first = api.import_taxonomy_yaml(CATALOGUE).unwrap();
        api.import_taxonomy_yaml(CATALOGUE).unwrap();

        assert_eq!(
            first,
            ImportSummary {
                domains: 1,
                fields: 1,
                entries: 1
            }
        );
        let taxonomy = api.taxonomy().unwrap();
        assert_eq!(taxonomy.domains.len(), 1);
        assert_eq!(taxonomy.entries.len(), 1);
        assert_eq!(taxonomy.domains[0].color.as_deref(), Some("#f97316"));
    }

    #[test]
    fn import_rejects_dangling_field() {
        let api = api();
        let bad = "entries:\n  - field_id: f-missing\n    label: SEO\n";
        let err = api.import_taxonomy_yaml(bad).unwrap_err();
        assert!(matches!(err, ApiError::Graph(LexigraphError::InvalidInput(_))));
        assert!(api.taxonomy().unwrap().entries.is_empty());
    }

    #[test]
    fn import_rejects_reused_entry_id() {
        let api = api();
        let clash = r#"
domains:
  - id: d1
    name: Marketing
fields:
  - id: f1
    domain_id: d1
    name: Sales
entries:
  - id: e1
    field_id: f1
    label: SEO
  - id: e1
    field_id: f1
    label: CRM
"#;
        let err = api.import_taxonomy_yaml(clash).unwrap_err();
        assert!(matches!(err, ApiError::Graph(LexigraphError::InvalidInput(_))));
        let taxonomy = api.taxonomy().unwrap();
        assert!(taxonomy.domains.is_empty());
        assert!(taxonomy.entries.is_empty());
    }

    #[test]
    fn import_rejects_id_taken_by_stored_entry() {
        let api = api();
        api.import_taxonomy_yaml(CATALOGUE).unwrap();

        let clash = "entries:\n  - id: e-seo\n    field_id: f-search\n    label: CRM\n";
        let err = api.import_taxonomy_yaml(clash).unwrap_err();
        assert!(matches!(err, ApiError::Graph(LexigraphError::InvalidInput(_))));

        let taxonomy = api.taxonomy().unwrap();
        assert_eq!(taxonomy.entries.len(), 1);
        assert_eq!(taxonomy.entries[0].label, "SEO");
    }

    #[tokio::test]
    async fn classify_after_import() {
        let api = api();
        api.import_taxonomy_yaml(CATALOGUE).unwrap();

        let c = api
            .classify("search engine optimization")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(c.master_entry_id, MasterEntryId::from("e-seo"));
        assert!(api.classify("Kubernetes").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn manual_checkpoint_defaults_to_active_set() {
        let api = api();
        let task = TaskId::from("t1");
        let outcome = api
            .process_text(
                &ProcessTextRequest::new(
                    "Draft the SEO plan for GraphQL",
                    "note",
                    "n1",
                    Direction::SelfAuthored,
                    owner(),
                )
                .in_task(task.clone())
                .in_phase(ClusterType::Ideation),
            )
            .await
            .unwrap();

        let checkpoint = api
            .add_checkpoint(&task, &owner(), None, Some("before review".to_string()))
            .unwrap();
        assert_eq!(checkpoint.source, CheckpointSource::Manual);
        assert_eq!(checkpoint.node_ids.len(), outcome.nodes.len());

        // auto + manual
        assert_eq!(api.list_checkpoints(Some(&task), None).unwrap().len(), 2);
    }

    #[tokio::test]
    async fn link_contact_only_for_persons() {
        let api = api();
        let outcome = api
            .process_text(&ProcessTextRequest::new(
                "Sent the SEO proposal to Tanaka",
                "email",
                "e1",
                Direction::Sent,
                owner(),
            ))
            .await
            .unwrap();
        let seo = outcome
            .nodes
            .iter()
            .find(|n| n.node_type == NodeType::Keyword)
            .unwrap();
        let tanaka = outcome
            .nodes
            .iter()
            .find(|n| n.node_type == NodeType::Person)
            .unwrap();

        let linked = api
            .link_contact(&owner(), &tanaka.id, ContactId::from("c-42"))
            .unwrap();
        assert_eq!(linked.contact_id, Some(ContactId::from("c-42")));
        assert!(matches!(
            api.link_contact(&owner(), &seo.id, ContactId::from("c-42")),
            Err(LexigraphError::WrongNodeType { .. })
        ));
        assert!(matches!(
            api.confirm_node(&OwnerId::from("u2"), &tanaka.id),
            Err(LexigraphError::NodeNotFound(_))
        ));
    }
}
