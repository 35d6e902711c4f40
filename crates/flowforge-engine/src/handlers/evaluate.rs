//! EVALUATE - computes requested metrics against the upstream model output.

use flowforge_core::{EngineResult, WorkflowNode};

use super::node_err;
use crate::context::ExecutionContext;

pub fn execute(
    ctx: &mut ExecutionContext,
    node: &WorkflowNode,
    upstream: &[&str],
) -> EngineResult<()> {
    let keys = node.config_str_list("metrics");
    if keys.is_empty() {
        return Err(node_err(node, "no metrics selected"));
    }

    let output = ctx
        .upstream_model_output(upstream)
        .ok_or_else(|| node_err(node, "no trained model output available upstream"))?;

    let computed = ctx.registries.metrics.compute(
        &keys,
        &output.y_eval,
        &output.predictions,
        output.probabilities.as_deref(),
    );

    tracing::debug!(
        execution_id = %ctx.execution_id,
        node_id = %node.id,
        requested = keys.len(),
        computed = computed.len(),
        "Metrics evaluated"
    );

    ctx.metrics.extend(computed);
    Ok(())
}
