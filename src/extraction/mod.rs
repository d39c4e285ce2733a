//! Extraction gateway: collaborator first, rules as the fallback
//!
//! The gateway never fails. Any collaborator error (no credentials, network,
//! bad status, malformed reply) is logged and the rule-based extractor runs
//! instead. Both paths produce the same shape: per-category lists,
//! deduplicated by normalized key, in order of first appearance, capped.

mod rules;

pub use rules::extract as extract_rule_based;

use crate::collaborator::{ExtractionRequest, RawItem, UnderstandingClient};
use crate::config::ExtractionConfig;
use crate::graph::{normalize_key, NodeType};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, warn};

/// Per-category result caps
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtractionLimits {
    pub max_keywords: usize,
    pub max_persons: usize,
    pub max_projects: usize,
}

impl Default for ExtractionLimits {
    fn default() -> Self {
        Self {
            max_keywords: 8,
            max_persons: 5,
            max_projects: 3,
        }
    }
}

impl From<&ExtractionConfig> for ExtractionLimits {
    fn from(config: &ExtractionConfig) -> Self {
        Self {
            max_keywords: config.max_keywords,
            max_persons: config.max_persons,
            max_projects: config.max_projects,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExtractionOrigin {
    Collaborator,
    RuleBased,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractedItem {
    pub label: String,
    pub confidence: f64,
}

impl ExtractedItem {
    pub fn new(label: impl Into<String>, confidence: f64) -> Self {
        Self {
            label: label.into(),
            confidence,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Extraction {
    pub keywords: Vec<ExtractedItem>,
    pub persons: Vec<ExtractedItem>,
    pub projects: Vec<ExtractedItem>,
    pub origin: ExtractionOrigin,
}

impl Extraction {
    pub fn is_empty(&self) -> bool {
        self.keywords.is_empty() && self.persons.is_empty() && self.projects.is_empty()
    }

    /// Items the caller should keep, tagged with their node type.
    ///
    /// `min_confidence` applies only to collaborator output; rule-based
    /// items are always accepted.
    pub fn accepted(&self, min_confidence: f64) -> Vec<(NodeType, &ExtractedItem)> {
        let groups = [
            (NodeType::Keyword, &self.keywords),
            (NodeType::Person, &self.persons),
            (NodeType::Project, &self.projects),
        ];
        groups
            .into_iter()
            .flat_map(|(node_type, items)| items.iter().map(move |item| (node_type, item)))
            .filter(|(_, item)| {
                self.origin == ExtractionOrigin::RuleBased || item.confidence >= min_confidence
            })
            .collect()
    }
}

/// Trim, drop empties, dedupe by normalized key (first wins), cap.
pub(crate) fn finish(items: impl IntoIterator<Item = ExtractedItem>, cap: usize) -> Vec<ExtractedItem> {
    let mut seen = HashSet::new();
    items
        .into_iter()
        .filter_map(|item| {
            let label = item.label.trim();
            let key = normalize_key(label);
            if key.is_empty() || !seen.insert(key) {
                return None;
            }
            Some(ExtractedItem::new(label, item.confidence))
        })
        .take(cap)
        .collect()
}

fn from_raw(items: Vec<RawItem>, cap: usize) -> Vec<ExtractedItem> {
    finish(
        items.into_iter().map(|raw| {
            let confidence = if raw.confidence.is_nan() {
                0.0
            } else {
                raw.confidence.clamp(0.0, 1.0)
            };
            ExtractedItem::new(raw.label, confidence)
        }),
        cap,
    )
}

/// Wraps the collaborator with the deterministic fallback.
#[derive(Clone)]
pub struct ExtractionGateway {
    client: Option<Arc<dyn UnderstandingClient>>,
    limits: ExtractionLimits,
}

impl ExtractionGateway {
    pub fn new(client: Option<Arc<dyn UnderstandingClient>>, limits: ExtractionLimits) -> Self {
        Self { client, limits }
    }

    /// A gateway that only ever runs the rules
    pub fn rule_based(limits: ExtractionLimits) -> Self {
        Self::new(None, limits)
    }

    pub fn limits(&self) -> ExtractionLimits {
        self.limits
    }

    pub fn has_collaborator(&self) -> bool {
        self.client.is_some()
    }

    pub async fn extract(&self, text: &str) -> Extraction {
        self.extract_with(text, self.limits).await
    }

    pub async fn extract_with(&self, text: &str, limits: ExtractionLimits) -> Extraction {
        if text.trim().is_empty() {
            return rules::extract("", &limits);
        }

        let Some(client) = &self.client else {
            return rules::extract(text, &limits);
        };

        let request = ExtractionRequest {
            text: text.to_string(),
            max_keywords: limits.max_keywords,
            max_persons: limits.max_persons,
            max_projects: limits.max_projects,
        };
        match client.extract(&request).await {
            Ok(raw) => {
                let extraction = Extraction {
                    keywords: from_raw(raw.keywords, limits.max_keywords),
                    persons: from_raw(raw.persons, limits.max_persons),
                    projects: from_raw(raw.projects, limits.max_projects),
                    origin: ExtractionOrigin::Collaborator,
                };
                debug!(
                    keywords = extraction.keywords.len(),
                    persons = extraction.persons.len(),
                    projects = extraction.projects.len(),
                    "collaborator extraction"
                );
                extraction
            }
            Err(e) => {
                warn!(error = %e, "collaborator extraction failed, using rules");
                rules::extract(text, &limits)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collaborator::{MockClient, RawExtraction};

    #[test]
    fn finish_dedupes_and_caps() {
        let items = vec![
            ExtractedItem::new("  Rust ", 0.9),
            ExtractedItem::new("rust", 0.8),
            ExtractedItem::new("", 0.9),
            ExtractedItem::new("Go", 0.9),
            ExtractedItem::new("Zig", 0.9),
        ];
        let out = finish(items, 2);
        assert_eq!(out.len(), 2);
        assert_eq!(out[0].label, "Rust");
        assert_eq!(out[1].label, "Go");
    }

    #[test]
    fn min_confidence_applies_only_to_collaborator_items() {
        let mut extraction = Extraction {
            keywords: vec![ExtractedItem::new("SEO", 0.9), ExtractedItem::new("Ads", 0.4)],
            persons: vec![ExtractedItem::new("Tanaka", 0.5), ExtractedItem::new("Sato", 0.7)],
            projects: vec![ExtractedItem::new("Phoenix", 0.69)],
            origin: ExtractionOrigin::Collaborator,
        };
        let kept: Vec<_> = extraction
            .accepted(0.7)
            .into_iter()
            .map(|(t, i)| (t, i.label.clone()))
            .collect();
        // the threshold itself is inclusive
        assert_eq!(
            kept,
            vec![
                (NodeType::Keyword, "SEO".to_string()),
                (NodeType::Person, "Sato".to_string()),
            ]
        );

        extraction.origin = ExtractionOrigin::RuleBased;
        assert_eq!(extraction.accepted(0.7).len(), 5);
    }

    #[tokio::test]
    async fn without_collaborator_runs_rules() {
        let gateway = ExtractionGateway::rule_based(ExtractionLimits::default());
        let result = gateway.extract("Sent the SEO proposal to Tanaka").await;
        assert_eq!(result.origin, ExtractionOrigin::RuleBased);
        assert_eq!(result.keywords[0].label, "SEO");
        assert_eq!(result.persons[0].label, "Tanaka");
    }

    #[tokio::test]
    async fn collaborator_failure_falls_back() {
        let client = Arc::new(MockClient::failing());
        let gateway = ExtractionGateway::new(
            Some(client.clone() as Arc<dyn UnderstandingClient>),
            ExtractionLimits::default(),
        );
        let result = gateway.extract("Deploying GraphQL today").await;

        assert_eq!(client.extract_calls(), 1);
        assert_eq!(result.origin, ExtractionOrigin::RuleBased);
        assert_eq!(result.keywords[0].label, "GraphQL");
    }

    #[tokio::test]
    async fn collaborator_result_is_normalized() {
        let client = Arc::new(MockClient::default().with_extraction(RawExtraction {
            keywords: vec![
                RawItem::new("SEO", 1.4),
                RawItem::new("seo", 0.9),
                RawItem::new("Content", f64::NAN),
            ],
            persons: vec![RawItem::new("Tanaka", 0.95)],
            projects: vec![],
        }));
        let limits = ExtractionLimits {
            max_keywords: 8,
            max_persons: 0,
            max_projects: 3,
        };
        let gateway = ExtractionGateway::new(Some(client as Arc<dyn UnderstandingClient>), limits);
        let result = gateway.extract("anything").await;

        assert_eq!(result.origin, ExtractionOrigin::Collaborator);
        assert_eq!(result.keywords.len(), 2);
        assert_eq!(result.keywords[0].confidence, 1.0);
        assert_eq!(result.keywords[1].confidence, 0.0);
        assert!(result.persons.is_empty());
    }

    #[tokio::test]
    async fn blank_text_skips_collaborator() {
        let client = Arc::new(MockClient::failing());
        let gateway = ExtractionGateway::new(
            Some(client.clone() as Arc<dyn UnderstandingClient>),
            ExtractionLimits::default(),
        );
        assert!(gateway.extract("   ").await.is_empty());
        assert_eq!(client.extract_calls(), 0);
    }
}
