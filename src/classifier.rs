//! Taxonomy classifier
//!
//! Exact and synonym matches resolve locally. On a miss the collaborator is
//! offered the whole field catalogue; an accepted pick registers a master
//! entry so the next lookup for the same label takes the local path.

use crate::collaborator::{FieldChoiceRequest, FieldOption, UnderstandingClient};
use crate::error::LexigraphResult;
use crate::graph::{normalize_key, Classification, MasterEntry, Node, Taxonomy};
use crate::storage::GraphStore;
use std::sync::Arc;
use tracing::{debug, warn};

pub struct TaxonomyClassifier {
    store: Arc<dyn GraphStore>,
    client: Option<Arc<dyn UnderstandingClient>>,
    min_confidence: f64,
}

fn catalogue(taxonomy: &Taxonomy) -> Vec<FieldOption> {
    taxonomy
        .fields
        .iter()
        .map(|field| FieldOption {
            field_id: field.id.to_string(),
            domain: taxonomy
                .domain(&field.domain_id)
                .map(|d| d.name.clone())
                .unwrap_or_default(),
            field: field.name.clone(),
            description: field.description.clone(),
        })
        .collect()
}

impl TaxonomyClassifier {
    pub fn new(
        store: Arc<dyn GraphStore>,
        client: Option<Arc<dyn UnderstandingClient>>,
        min_confidence: f64,
    ) -> Self {
        Self {
            store,
            client,
            min_confidence,
        }
    }

    /// Place `label` in the hierarchy, or `None` if it cannot be placed
    /// with enough confidence.
    pub async fn classify(&self, label: &str) -> LexigraphResult<Option<Classification>> {
        let key = normalize_key(label);
        if key.is_empty() {
            return Ok(None);
        }

        let taxonomy = self.store.load_taxonomy()?;
        if let Some(entry) = taxonomy.find_entry(&key) {
            return Ok(taxonomy.classification_of(entry));
        }

        let Some(client) = &self.client else {
            return Ok(None);
        };
        if taxonomy.fields.is_empty() {
            return Ok(None);
        }

        let request = FieldChoiceRequest {
            label: label.trim().to_string(),
            fields: catalogue(&taxonomy),
        };
        let choice = match client.choose_field(&request).await {
            Ok(choice) => choice,
            Err(e) => {
                warn!(error = %e, label = %request.label, "field choice failed");
                return Ok(None);
            }
        };

        let Some(field_id) = choice.field_id else {
            debug!(label = %request.label, "collaborator found no field");
            return Ok(None);
        };
        if choice.confidence < self.min_confidence {
            debug!(label = %request.label, confidence = choice.confidence, "field pick below threshold");
            return Ok(None);
        }
        let Some(field) = taxonomy.fields.iter().find(|f| f.id.as_str() == field_id) else {
            warn!(field_id = %field_id, "collaborator picked an unknown field");
            return Ok(None);
        };

        let entry = self
            .store
            .upsert_master_entry(&MasterEntry::new(field.id.clone(), label.trim()))?;
        debug!(label = %request.label, entry_id = %entry.id, "registered master entry");

        Ok(Some(Classification {
            domain_id: field.domain_id.clone(),
            field_id: field.id.clone(),
            master_entry_id: entry.id,
        }))
    }

    /// Classify the node's label and persist the links. Returns the
    /// classification, if any; an already classified node is left alone.
    pub async fn classify_node(&self, node: &mut Node) -> LexigraphResult<Option<Classification>> {
        if node.is_classified() {
            return Ok(None);
        }
        let Some(classification) = self.classify(&node.label).await? else {
            return Ok(None);
        };
        node.master_entry_id = Some(classification.master_entry_id.clone());
        node.domain_id = Some(classification.domain_id.clone());
        node.field_id = Some(classification.field_id.clone());
        self.store.update_node_links(node)?;
        Ok(Some(classification))
    }
}
