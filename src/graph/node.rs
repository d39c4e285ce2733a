//! Concept node representation and the understanding-level state machine

use super::cluster::ClusterType;
use super::id::{ContactId, DomainId, FieldId, MasterEntryId, NodeId, OwnerId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Kind of concept a node tracks
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeType {
    Keyword,
    Person,
    Project,
}

impl NodeType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Keyword => "keyword",
            Self::Person => "person",
            Self::Project => "project",
        }
    }
}

impl FromStr for NodeType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "keyword" => Ok(Self::Keyword),
            "person" => Ok(Self::Person),
            "project" => Ok(Self::Project),
            other => Err(format!("unknown node type: {}", other)),
        }
    }
}

impl std::fmt::Display for NodeType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which way the text carrying a sighting travelled, relative to the owner
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    /// Owner sent it to someone else
    Sent,
    /// Owner received it
    Received,
    /// Owner wrote it for themselves (notes, drafts)
    #[serde(rename = "self")]
    SelfAuthored,
}

impl Direction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Sent => "sent",
            Self::Received => "received",
            Self::SelfAuthored => "self",
        }
    }
}

impl FromStr for Direction {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "sent" => Ok(Self::Sent),
            "received" => Ok(Self::Received),
            "self" => Ok(Self::SelfAuthored),
            other => Err(format!("unknown direction: {}", other)),
        }
    }
}

/// How actively an owner has reused a concept.
///
/// Ordered: `Recognition < Understanding < Mastery`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnderstandingLevel {
    Recognition,
    Understanding,
    Mastery,
}

impl UnderstandingLevel {
    /// Derive the level from the full sighting history.
    ///
    /// - mastery: at least two `sent` sightings and at least one `received`
    /// - understanding: at least one `sent` or `self` sighting
    /// - recognition: everything else (only received, or empty)
    ///
    /// Self-authored material alone never reaches mastery; an inbound
    /// sighting has to exist first.
    pub fn from_contexts(contexts: &[SourceContext]) -> Self {
        let mut sent = 0usize;
        let mut received = 0usize;
        let mut own = 0usize;
        for ctx in contexts {
            match ctx.direction {
                Direction::Sent => sent += 1,
                Direction::Received => received += 1,
                Direction::SelfAuthored => own += 1,
            }
        }

        if sent >= 2 && received >= 1 {
            Self::Mastery
        } else if sent + own >= 1 {
            Self::Understanding
        } else {
            Self::Recognition
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Recognition => "recognition",
            Self::Understanding => "understanding",
            Self::Mastery => "mastery",
        }
    }
}

impl FromStr for UnderstandingLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "recognition" => Ok(Self::Recognition),
            "understanding" => Ok(Self::Understanding),
            "mastery" => Ok(Self::Mastery),
            other => Err(format!("unknown understanding level: {}", other)),
        }
    }
}

/// One sighting of a concept in a piece of text
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceContext {
    /// Kind of source (e.g. "message", "task_conversation", "note")
    pub source_type: String,
    /// Identifier of the source item in the host application
    pub source_id: String,
    pub direction: Direction,
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phase: Option<ClusterType>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub conversation_turn_id: Option<String>,
}

impl SourceContext {
    /// Create a context stamped with the current time
    pub fn new(
        source_type: impl Into<String>,
        source_id: impl Into<String>,
        direction: Direction,
    ) -> Self {
        Self {
            source_type: source_type.into(),
            source_id: source_id.into(),
            direction,
            timestamp: Utc::now(),
            phase: None,
            conversation_turn_id: None,
        }
    }

    pub fn with_phase(mut self, phase: ClusterType) -> Self {
        self.phase = Some(phase);
        self
    }

    pub fn with_turn(mut self, turn_id: impl Into<String>) -> Self {
        self.conversation_turn_id = Some(turn_id.into());
        self
    }

    pub fn at(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = timestamp;
        self
    }
}

/// Fold a label into its deduplication key: trimmed, lowercased,
/// internal whitespace runs collapsed to a single space.
pub fn normalize_key(label: &str) -> String {
    label
        .split_whitespace()
        .map(|w| w.to_lowercase())
        .collect::<Vec<_>>()
        .join(" ")
}

/// A tracked concept for one owner.
///
/// `frequency`, `understanding_level`, `first_seen_at` and `last_seen_at` are
/// derived from `source_contexts`; they change only through
/// [`Node::record_sighting`] or [`Node::recompute`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Node {
    pub id: NodeId,
    /// Display label as first seen
    pub label: String,
    pub normalized_key: String,
    pub node_type: NodeType,
    pub owner_id: OwnerId,
    pub frequency: usize,
    pub understanding_level: UnderstandingLevel,
    pub first_seen_at: DateTime<Utc>,
    pub last_seen_at: DateTime<Utc>,
    pub master_entry_id: Option<MasterEntryId>,
    pub domain_id: Option<DomainId>,
    pub field_id: Option<FieldId>,
    /// Only meaningful for `NodeType::Person`
    pub contact_id: Option<ContactId>,
    pub confirmed: bool,
    pub source_contexts: Vec<SourceContext>,
}

impl Node {
    /// Create a node from its first sighting
    pub fn new(
        label: impl Into<String>,
        node_type: NodeType,
        owner_id: OwnerId,
        context: SourceContext,
    ) -> Self {
        let label = label.into().trim().to_string();
        let normalized_key = normalize_key(&label);
        let seen = context.timestamp;
        let mut node = Self {
            id: NodeId::new(),
            label,
            normalized_key,
            node_type,
            owner_id,
            frequency: 0,
            understanding_level: UnderstandingLevel::Recognition,
            first_seen_at: seen,
            last_seen_at: seen,
            master_entry_id: None,
            domain_id: None,
            field_id: None,
            contact_id: None,
            confirmed: false,
            source_contexts: vec![context],
        };
        node.recompute();
        node
    }

    /// Append a sighting and recompute everything derived from the history
    pub fn record_sighting(&mut self, context: SourceContext) {
        self.source_contexts.push(context);
        self.recompute();
    }

    /// Recompute derived fields from `source_contexts`
    pub fn recompute(&mut self) {
        self.frequency = self.source_contexts.len();
        self.understanding_level = UnderstandingLevel::from_contexts(&self.source_contexts);
        if let Some(first) = self.source_contexts.iter().map(|c| c.timestamp).min() {
            self.first_seen_at = first;
        }
        if let Some(last) = self.source_contexts.iter().map(|c| c.timestamp).max() {
            self.last_seen_at = last;
        }
    }

    /// True if this node is in the taxonomy
    pub fn is_classified(&self) -> bool {
        self.master_entry_id.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx(direction: Direction) -> SourceContext {
        SourceContext::new("message", "m-1", direction)
    }

    #[test]
    fn normalize_key_folds_case_and_whitespace() {
        assert_eq!(normalize_key("  Machine   Learning \t"), "machine learning");
        assert_eq!(normalize_key("SEO"), "seo");
        assert_eq!(normalize_key("田中さん"), "田中さん");
    }

    #[test]
    fn empty_history_is_recognition() {
        assert_eq!(UnderstandingLevel::from_contexts(&[]), UnderstandingLevel::Recognition);
    }

    #[test]
    fn received_only_is_recognition() {
        let contexts = vec![ctx(Direction::Received), ctx(Direction::Received)];
        assert_eq!(
            UnderstandingLevel::from_contexts(&contexts),
            UnderstandingLevel::Recognition
        );
    }

    #[test]
    fn one_sent_is_understanding() {
        let contexts = vec![ctx(Direction::Received), ctx(Direction::Sent)];
        assert_eq!(
            UnderstandingLevel::from_contexts(&contexts),
            UnderstandingLevel::Understanding
        );
    }

    #[test]
    fn two_sent_with_received_is_mastery() {
        let contexts = vec![
            ctx(Direction::Received),
            ctx(Direction::Sent),
            ctx(Direction::Sent),
        ];
        assert_eq!(
            UnderstandingLevel::from_contexts(&contexts),
            UnderstandingLevel::Mastery
        );
    }

    #[test]
    fn sent_without_received_is_capped_at_understanding() {
        let contexts = vec![ctx(Direction::Sent), ctx(Direction::Sent), ctx(Direction::Sent)];
        assert_eq!(
            UnderstandingLevel::from_contexts(&contexts),
            UnderstandingLevel::Understanding
        );
    }

    #[test]
    fn self_authored_only_is_capped_at_understanding() {
        let contexts = vec![
            ctx(Direction::SelfAuthored),
            ctx(Direction::SelfAuthored),
            ctx(Direction::SelfAuthored),
        ];
        assert_eq!(
            UnderstandingLevel::from_contexts(&contexts),
            UnderstandingLevel::Understanding
        );
    }

    #[test]
    fn level_follows_history_not_a_counter() {
        let mut node = Node::new("SEO", NodeType::Keyword, OwnerId::from("u1"), ctx(Direction::Sent));
        node.record_sighting(ctx(Direction::Sent));
        node.record_sighting(ctx(Direction::Received));
        assert_eq!(node.understanding_level, UnderstandingLevel::Mastery);

        // Pruning history moves the level back down
        node.source_contexts.truncate(1);
        node.recompute();
        assert_eq!(node.frequency, 1);
        assert_eq!(node.understanding_level, UnderstandingLevel::Understanding);
    }

    #[test]
    fn record_sighting_tracks_seen_range() {
        let t0 = Utc::now() - chrono::Duration::hours(2);
        let t1 = Utc::now();
        let mut node = Node::new(
            " Tanaka ",
            NodeType::Person,
            OwnerId::from("u1"),
            ctx(Direction::Received).at(t0),
        );
        node.record_sighting(ctx(Direction::Sent).at(t1));

        assert_eq!(node.label, "Tanaka");
        assert_eq!(node.normalized_key, "tanaka");
        assert_eq!(node.first_seen_at, t0);
        assert_eq!(node.last_seen_at, t1);
        assert_eq!(node.frequency, 2);
    }

    #[test]
    fn direction_serializes_self_keyword() {
        let json = serde_json::to_string(&Direction::SelfAuthored).unwrap();
        assert_eq!(json, "\"self\"");
        let back: Direction = serde_json::from_str("\"self\"").unwrap();
        assert_eq!(back, Direction::SelfAuthored);
    }
}
