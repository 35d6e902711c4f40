//! VISUALIZE - renders requested plots; failures drop the plot, never the
//! node.

use flowforge_core::{EngineResult, ProblemType, WorkflowNode};

use super::node_err;
use crate::context::ExecutionContext;
use crate::registry::plots::PlotView;

pub fn execute(
    ctx: &mut ExecutionContext,
    node: &WorkflowNode,
    upstream: &[&str],
) -> EngineResult<()> {
    let keys = node.config_str_list("plots");
    if keys.is_empty() {
        tracing::debug!(
            execution_id = %ctx.execution_id,
            node_id = %node.id,
            "No plots selected, producing empty output"
        );
        return Ok(());
    }

    let output = ctx
        .upstream_model_output(upstream)
        .ok_or_else(|| node_err(node, "no trained model output available upstream"))?;

    let view = PlotView {
        problem_type: ctx.problem_type.unwrap_or(ProblemType::Classification),
        y_true: &output.y_eval,
        y_pred: &output.predictions,
        probabilities: output.probabilities.as_deref(),
        feature_names: &ctx.feature_names,
    };

    let mut rendered = Vec::new();
    for key in &keys {
        match ctx.registries.plots.render(key, &view) {
            None => {
                // Unknown plot keys are omitted, matching metric semantics.
                tracing::debug!(
                    execution_id = %ctx.execution_id,
                    node_id = %node.id,
                    key = %key,
                    "Requested plot not in registry, omitted"
                );
            }
            Some(Ok(plot)) => rendered.push(plot),
            Some(Err(e)) => {
                tracing::warn!(
                    execution_id = %ctx.execution_id,
                    node_id = %node.id,
                    key = %key,
                    error = %e,
                    "Plot rendering failed, dropped"
                );
            }
        }
    }

    tracing::debug!(
        execution_id = %ctx.execution_id,
        node_id = %node.id,
        requested = keys.len(),
        rendered = rendered.len(),
        "Plots rendered"
    );

    ctx.plots.extend(rendered);
    Ok(())
}
