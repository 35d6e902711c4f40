//! PREPROCESS - applies an ordered list of named operations.
//!
//! Operations are best-effort by default: an unresolved slug or a failing
//! operation is skipped with a warning and does not fail the node. Setting
//! `strict: true` on the node promotes both cases to hard failures.

use std::collections::HashMap;

use flowforge_core::{EngineResult, WorkflowNode};

use super::{node_err, require_data};
use crate::context::ExecutionContext;

/// One requested operation: slug plus optional parameters.
struct OperationSpec {
    slug: String,
    params: HashMap<String, serde_json::Value>,
}

/// Accepts both `"impute_mean"` and `{"slug": "impute_mean", "params": {..}}`.
fn operation_specs(node: &WorkflowNode) -> Vec<OperationSpec> {
    let Some(serde_json::Value::Array(items)) = node.config_value("operations") else {
        return Vec::new();
    };
    items
        .iter()
        .filter_map(|item| match item {
            serde_json::Value::String(slug) => Some(OperationSpec {
                slug: slug.clone(),
                params: HashMap::new(),
            }),
            serde_json::Value::Object(map) => {
                let slug = map.get("slug")?.as_str()?.to_string();
                let params = match map.get("params") {
                    Some(serde_json::Value::Object(params)) => {
                        params.iter().map(|(k, v)| (k.clone(), v.clone())).collect()
                    }
                    _ => HashMap::new(),
                };
                Some(OperationSpec { slug, params })
            }
            _ => None,
        })
        .collect()
}

pub fn execute(
    ctx: &mut ExecutionContext,
    node: &WorkflowNode,
    _upstream: &[&str],
) -> EngineResult<()> {
    let strict = node.config_bool("strict").unwrap_or(false);
    let specs = operation_specs(node);
    let target_column = ctx.target_column.clone();

    let mut data = require_data(ctx, node)?.clone();
    let mut applied = 0usize;

    for spec in &specs {
        let Some(operation) = ctx.registries.operations.resolve(&spec.slug) else {
            if strict {
                return Err(node_err(
                    node,
                    format!("unknown preprocessing operation '{}'", spec.slug),
                ));
            }
            tracing::warn!(
                execution_id = %ctx.execution_id,
                node_id = %node.id,
                slug = %spec.slug,
                "Preprocessing operation not found, skipped"
            );
            continue;
        };

        match operation.apply(&data, &spec.params, target_column.as_deref()) {
            Ok(transformed) => {
                data = transformed;
                applied += 1;
            }
            Err(e) => {
                if strict {
                    return Err(node_err(
                        node,
                        format!("operation '{}' failed: {e}", spec.slug),
                    ));
                }
                tracing::warn!(
                    execution_id = %ctx.execution_id,
                    node_id = %node.id,
                    slug = %spec.slug,
                    error = %e,
                    "Preprocessing operation failed, skipped"
                );
            }
        }
    }

    tracing::debug!(
        execution_id = %ctx.execution_id,
        node_id = %node.id,
        requested = specs.len(),
        applied,
        "Preprocessing complete"
    );

    ctx.processed_data = Some(data);
    Ok(())
}
