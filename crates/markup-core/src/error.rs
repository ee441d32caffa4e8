use thiserror::Error;

use crate::tag::Tag;
use crate::tree::NodeId;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TreeError {
    #[error("node {0:?} is not attached to the document")]
    Detached(NodeId),
    #[error("node {0:?} cannot hold children")]
    NotAContainer(NodeId),
    #[error("unknown node {0:?}")]
    UnknownNode(NodeId),
    #[error("offset {offset} out of bounds for node {node:?} (len {len})")]
    OffsetOutOfBounds {
        node: NodeId,
        offset: usize,
        len: usize,
    },
}

#[derive(Debug, Error)]
pub enum PolicyError {
    #[error("invalid tag policy: {0}")]
    Json(#[from] serde_json::Error),
    #[error("tag policy declares no leaf tags")]
    NoLeafTags,
    #[error("default leaf `{0}` is not a leaf tag of the policy")]
    DefaultLeafNotAllowed(Tag),
}

#[derive(Debug, Error)]
pub enum EditorError {
    #[error(transparent)]
    Tree(#[from] TreeError),
    #[error(transparent)]
    Policy(#[from] PolicyError),
    #[error("invalid document value: {0}")]
    Value(#[from] serde_json::Error),
}

#[derive(Debug, Clone)]
pub struct CommandError {
    message: String,
}

impl CommandError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

impl std::fmt::Display for CommandError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.message)
    }
}

impl std::error::Error for CommandError {}

impl From<EditorError> for CommandError {
    fn from(value: EditorError) -> Self {
        CommandError::new(value.to_string())
    }
}

#[derive(Debug, Clone)]
pub struct QueryError {
    message: String,
}

impl QueryError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

impl std::fmt::Display for QueryError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.message)
    }
}

impl std::error::Error for QueryError {}
