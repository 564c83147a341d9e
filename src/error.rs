use thiserror::Error;

use crate::{ConversationId, NodeId};

/// Rejections from the cascade scheduler.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CascadeError {
    #[error("node {0} does not exist")]
    UnknownNode(NodeId),

    /// The requested subtree touches nodes already being removed.
    #[error("node {0} is already part of an active deletion")]
    Overlap(NodeId),
}

/// Failures surfaced by a completion stream.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProviderError {
    /// A single chunk could not be decoded. The stream keeps going.
    #[error("malformed chunk: {0}")]
    Decode(String),

    #[error("transport failure: {0}")]
    Transport(String),

    #[error("provider error: {0}")]
    Provider(String),
}

impl ProviderError {
    /// Whether the stream can continue past this error.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, ProviderError::Decode(_))
    }
}

#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("conversation {0} not found")]
    NotFound(ConversationId),

    #[error("storage failure: {0}")]
    Storage(String),

    #[error("serialization failure: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Failures of the host-shell operations on [`crate::Workspace`].
#[derive(Debug, Error)]
pub enum WorkspaceError {
    #[error("unknown conversation {0}")]
    UnknownConversation(ConversationId),

    #[error(transparent)]
    Persistence(#[from] PersistenceError),

    #[error("rejected snapshot: {0}")]
    Invalid(#[from] InvariantViolation),
}

/// A broken structural invariant found by [`crate::check_invariants`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InvariantViolation {
    #[error("{parent} lists {child} as a child but the child does not point back")]
    MissingBackReference { parent: NodeId, child: NodeId },

    #[error("{child} points at parent {parent} which does not list it")]
    MissingChildEntry { parent: NodeId, child: NodeId },

    #[error("{child} points at parent {parent} which does not exist")]
    DanglingParent { parent: NodeId, child: NodeId },

    #[error("parent chain from {0} does not reach a root")]
    Cycle(NodeId),

    #[error("node stored under key {key} has id {id}")]
    KeyMismatch { key: NodeId, id: NodeId },

    #[error("{parent} lists {child} more than once")]
    DuplicateChild { parent: NodeId, child: NodeId },
}
