//! SAVE - serializes the trained model into the artifact store.

use flowforge_core::{EngineResult, WorkflowNode};
use flowforge_artifact::{ArtifactMetadata, ModelArtifact};

use super::node_err;
use crate::context::ExecutionContext;

pub fn execute(
    ctx: &mut ExecutionContext,
    node: &WorkflowNode,
    upstream: &[&str],
) -> EngineResult<()> {
    let output = ctx
        .upstream_model_output(upstream)
        .ok_or_else(|| node_err(node, "no trained model available to save"))?;

    let model_bytes = output
        .model
        .to_bytes()
        .map_err(|e| node_err(node, e.to_string()))?;
    let metadata = ArtifactMetadata::new(
        output.algorithm.clone(),
        ctx.problem_type.map(|p| p.to_string()),
        env!("CARGO_PKG_VERSION"),
    );
    let artifact = ModelArtifact::new(metadata, model_bytes);

    let reference = ctx
        .artifacts
        .save(&artifact)
        .map_err(|e| node_err(node, format!("artifact save failed: {e}")))?;

    tracing::info!(
        execution_id = %ctx.execution_id,
        node_id = %node.id,
        reference = %reference,
        "Model artifact saved"
    );

    ctx.model_reference = Some(reference);
    Ok(())
}
