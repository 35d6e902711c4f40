//! Runtime error taxonomy.
//!
//! Validation issues are not errors: they are collected as data by the
//! validator and returned in a batch before any node runs. Everything here
//! is an execution-time failure.

use thiserror::Error;
use uuid::Uuid;

use crate::types::{JobStatus, NodeType};

/// Result alias used across the engine.
pub type EngineResult<T> = Result<T, EngineError>;

/// Errors that occur while executing a workflow or managing jobs.
#[derive(Debug, Error)]
pub enum EngineError {
    /// Dataset resolution or shape error.
    #[error("Dataset error: {message}")]
    Dataset {
        /// Description of the dataset failure.
        message: String,
    },

    /// A node handler failed. Fatal for the owning job.
    #[error("Node {node_id} ({node_type}) failed: {message}")]
    Node {
        /// Id of the failing node.
        node_id: String,
        /// Type of the failing node.
        node_type: NodeType,
        /// Underlying failure description.
        message: String,
    },

    /// A registry lookup failed for a slug that must resolve.
    #[error("Unknown {category} '{slug}'")]
    UnknownSlug {
        /// Registry category (algorithm, operation, metric, plot).
        category: &'static str,
        /// The slug that failed to resolve.
        slug: String,
    },

    /// Model training or inference error.
    #[error("Model error: {message}")]
    Model {
        /// Description of the model failure.
        message: String,
    },

    /// The workflow graph failed validation before execution.
    #[error("Workflow validation failed: {}", messages.join("; "))]
    Validation {
        /// Collected validation error messages.
        messages: Vec<String>,
    },

    /// A job was asked to do something its current status forbids.
    #[error("Job {job_id} is {status:?}: {message}")]
    InvalidJobState {
        /// The job in question.
        job_id: Uuid,
        /// Its current status.
        status: JobStatus,
        /// Why the request was rejected.
        message: String,
    },

    /// Execution was cancelled between node dispatches.
    #[error("Execution cancelled")]
    Cancelled,

    /// Artifact store failure.
    #[error("Artifact error: {0}")]
    Artifact(String),

    /// Job store failure.
    #[error("Storage error: {0}")]
    Storage(String),

    /// Internal state error.
    #[error("State error: {0}")]
    State(String),
}

impl EngineError {
    /// Wraps an error with node context unless it already carries one.
    pub fn for_node(self, node_id: &str, node_type: NodeType) -> EngineError {
        match self {
            err @ EngineError::Node { .. } => err,
            err @ EngineError::Cancelled => err,
            other => EngineError::Node {
                node_id: node_id.to_string(),
                node_type,
                message: other.to_string(),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn for_node_wraps_plain_errors() {
        let err = EngineError::Dataset {
            message: "missing".into(),
        }
        .for_node("ds-1", NodeType::Dataset);
        assert!(matches!(err, EngineError::Node { ref node_id, .. } if node_id == "ds-1"));
        assert!(err.to_string().contains("DATASET"));
    }

    #[test]
    fn for_node_keeps_existing_node_context() {
        let err = EngineError::Node {
            node_id: "first".into(),
            node_type: NodeType::Model,
            message: "boom".into(),
        }
        .for_node("second", NodeType::Evaluate);
        assert!(matches!(err, EngineError::Node { ref node_id, .. } if node_id == "first"));
    }

    #[test]
    fn cancelled_is_never_rewrapped() {
        let err = EngineError::Cancelled.for_node("n", NodeType::Split);
        assert!(matches!(err, EngineError::Cancelled));
    }
}
