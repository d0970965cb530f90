use thiserror::Error;

use crate::data::DataError;

/// Invalid graph topology. Raised at construction, before anything runs.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum GraphError {
    #[error("graph has no nodes")]
    Empty,

    #[error("node '{0}' registered twice")]
    DuplicateNode(String),

    #[error("node '{node}' depends on unknown node '{predecessor}'")]
    UnknownPredecessor { node: String, predecessor: String },

    #[error("dependency cycle among nodes: {}", .nodes.join(", "))]
    Cycle { nodes: Vec<String> },

    #[error("expected exactly one entry node, found {}: [{}]", .nodes.len(), .nodes.join(", "))]
    EntryCount { nodes: Vec<String> },

    #[error("expected exactly one terminal node, found {}: [{}]", .nodes.len(), .nodes.join(", "))]
    TerminalCount { nodes: Vec<String> },
}

/// A single stage failed. The executor substitutes the stage's fallback
/// output and carries on.
#[derive(Debug, Error)]
pub enum StageError {
    #[error("missing input field '{0}'")]
    MissingInput(String),

    #[error(transparent)]
    Data(#[from] DataError),

    #[error("stage panicked: {0}")]
    Panicked(String),

    #[error("{0}")]
    Failed(String),
}
