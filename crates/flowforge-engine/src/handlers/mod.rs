//! Node handlers, one module per node type.
//!
//! Every handler has the same shape: it reads its configuration from the
//! node, reads and writes the shared [`ExecutionContext`], and returns
//! `Err` only for failures that must abort the whole job. Best-effort
//! sub-steps (preprocessing operations, plot renderings) log and skip
//! instead.

pub mod dataset;
pub mod evaluate;
pub mod model;
pub mod preprocess;
pub mod save;
pub mod split;
pub mod visualize;

use flowforge_core::{EngineError, EngineResult, WorkflowNode};

use crate::context::ExecutionContext;

/// Builds a node-scoped error.
pub(crate) fn node_err(node: &WorkflowNode, message: impl Into<String>) -> EngineError {
    EngineError::Node {
        node_id: node.id.clone(),
        node_type: node.node_type,
        message: message.into(),
    }
}

/// Extracts a required string config key.
pub(crate) fn require_str<'a>(node: &'a WorkflowNode, key: &str) -> EngineResult<&'a str> {
    node.config_str(key)
        .ok_or_else(|| node_err(node, format!("missing required config '{}'", key)))
}

/// The table the node should operate on: processed when available, raw
/// otherwise.
pub(crate) fn require_data<'a>(
    ctx: &'a ExecutionContext,
    node: &WorkflowNode,
) -> EngineResult<&'a flowforge_core::TabularData> {
    ctx.current_data()
        .ok_or_else(|| node_err(node, "no dataset has been loaded upstream"))
}
