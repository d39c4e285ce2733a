//! Crate-level error type

use crate::graph::{NodeId, NodeType};
use crate::storage::StorageError;
use thiserror::Error;

/// Errors surfaced by graph operations.
///
/// Extraction and classification failures never appear here: they degrade
/// to "no enrichment happened" inside their components.
#[derive(Debug, Error)]
pub enum LexigraphError {
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("node not found: {0}")]
    NodeNotFound(NodeId),

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("node {node} is a {actual}, expected {expected}")]
    WrongNodeType {
        node: NodeId,
        expected: NodeType,
        actual: NodeType,
    },
}

pub type LexigraphResult<T> = Result<T, LexigraphError>;
