//! DATASET - resolves a dataset reference into tabular data.

use flowforge_core::{EngineResult, ProblemType, WorkflowNode};

use super::{node_err, require_str};
use crate::context::ExecutionContext;

pub fn execute(
    ctx: &mut ExecutionContext,
    node: &WorkflowNode,
    _upstream: &[&str],
) -> EngineResult<()> {
    let reference = require_str(node, "dataset")?;
    let problem_type: ProblemType = node
        .config_str("problem_type")
        .unwrap_or("classification")
        .parse()
        .map_err(|e: String| node_err(node, e))?;
    let target_column = require_str(node, "target_column")?.to_string();

    let data = ctx
        .datasets
        .load(reference)
        .map_err(|e| node_err(node, e.to_string()))?;

    if data.column_index(&target_column).is_none() {
        return Err(node_err(
            node,
            format!("target column '{}' not present in dataset '{}'", target_column, reference),
        ));
    }

    tracing::debug!(
        execution_id = %ctx.execution_id,
        dataset = reference,
        rows = data.n_rows(),
        columns = data.n_columns(),
        "Dataset loaded"
    );

    ctx.raw_data = Some(data);
    ctx.problem_type = Some(problem_type);
    ctx.target_column = Some(target_column);
    Ok(())
}
