//! Shared domain → field → master entry hierarchy

use super::id::{DomainId, FieldId, MasterEntryId};
use super::node::normalize_key;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Domain {
    pub id: DomainId,
    pub name: String,
    /// Display color (e.g. "#3b82f6")
    #[serde(default)]
    pub color: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Field {
    pub id: FieldId,
    pub domain_id: DomainId,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
}

impl Domain {
    pub fn new(id: DomainId, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            color: None,
        }
    }
}

impl Field {
    pub fn new(id: FieldId, domain_id: DomainId, name: impl Into<String>) -> Self {
        Self {
            id,
            domain_id,
            name: name.into(),
            description: None,
        }
    }
}

/// A canonical concept shared by every owner
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MasterEntry {
    pub id: MasterEntryId,
    pub field_id: FieldId,
    pub label: String,
    #[serde(default)]
    pub synonyms: BTreeSet<String>,
}

impl MasterEntry {
    pub fn new(field_id: FieldId, label: impl Into<String>) -> Self {
        Self {
            id: MasterEntryId::new(),
            field_id,
            label: label.into(),
            synonyms: BTreeSet::new(),
        }
    }

    pub fn with_synonym(mut self, synonym: impl Into<String>) -> Self {
        self.synonyms.insert(synonym.into());
        self
    }

    /// True if the normalized key matches the label or any synonym
    pub fn matches(&self, key: &str) -> bool {
        normalize_key(&self.label) == key || self.synonyms.iter().any(|s| normalize_key(s) == key)
    }
}

/// Where a label landed in the hierarchy
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Classification {
    pub domain_id: DomainId,
    pub field_id: FieldId,
    pub master_entry_id: MasterEntryId,
}

/// Full catalogue snapshot
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Taxonomy {
    #[serde(default)]
    pub domains: Vec<Domain>,
    #[serde(default)]
    pub fields: Vec<Field>,
    #[serde(default)]
    pub entries: Vec<MasterEntry>,
}

impl Taxonomy {
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn domain(&self, id: &DomainId) -> Option<&Domain> {
        self.domains.iter().find(|d| d.id == *id)
    }

    pub fn field(&self, id: &FieldId) -> Option<&Field> {
        self.fields.iter().find(|f| f.id == *id)
    }

    /// Exact or synonym match on the normalized key.
    ///
    /// When several entries match, the one with the smallest id wins so that
    /// repeated lookups agree.
    pub fn find_entry(&self, key: &str) -> Option<&MasterEntry> {
        self.entries
            .iter()
            .filter(|e| e.matches(key))
            .min_by(|a, b| a.id.cmp(&b.id))
    }

    /// Resolve an entry to its full classification path
    pub fn classification_of(&self, entry: &MasterEntry) -> Option<Classification> {
        let field = self.field(&entry.field_id)?;
        Some(Classification {
            domain_id: field.domain_id.clone(),
            field_id: field.id.clone(),
            master_entry_id: entry.id.clone(),
        })
    }
}
