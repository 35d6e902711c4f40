//! Sequential workflow executor.
//!
//! Drives node handlers in the validator's topological order, owns the
//! per-node state machine, and assembles the terminal result. One executor
//! run owns one thread and one context; there is no intra-job parallelism
//! even when the graph shape would permit it.

use std::sync::Arc;
use std::sync::atomic::AtomicBool;
use std::time::Instant;

use flowforge_core::{
    DatasetProvider, EngineError, EngineResult, NodeRunStatus, NodeType, StatusSink, WorkflowGraph,
    WorkflowNode, WorkflowResult,
};
use flowforge_artifact::ArtifactStore;
use flowforge_graph::Validator;

use crate::context::ExecutionContext;
use crate::handlers;
use crate::registry::Registries;

/// Executes validated workflow graphs.
pub struct Executor {
    registries: Arc<Registries>,
    datasets: Arc<dyn DatasetProvider>,
    artifacts: Arc<dyn ArtifactStore>,
}

impl Executor {
    pub fn new(
        registries: Arc<Registries>,
        datasets: Arc<dyn DatasetProvider>,
        artifacts: Arc<dyn ArtifactStore>,
    ) -> Self {
        Self {
            registries,
            datasets,
            artifacts,
        }
    }

    pub fn registries(&self) -> &Arc<Registries> {
        &self.registries
    }

    /// Runs the graph to completion.
    ///
    /// Validates first (validation issues never reach node handlers),
    /// dispatches each node in topological order, forwards every state
    /// transition to `sink`, and assembles the result once all scheduled
    /// nodes are terminal. The first handler error aborts the run; nodes
    /// after the failed one stay Pending forever.
    pub fn execute(
        &self,
        graph: &WorkflowGraph,
        sink: &dyn StatusSink,
        cancel: Arc<AtomicBool>,
        execution_id: String,
    ) -> EngineResult<WorkflowResult> {
        let report = Validator::new(self.registries.as_ref()).validate(graph);
        if !report.valid {
            return Err(EngineError::Validation {
                messages: report.error_messages(),
            });
        }
        let order = report
            .execution_order
            .ok_or_else(|| EngineError::State("valid graph without execution order".to_string()))?;

        let start = Instant::now();
        let mut ctx = ExecutionContext::new(
            Arc::clone(&self.registries),
            Arc::clone(&self.datasets),
            Arc::clone(&self.artifacts),
        )?
        .with_execution_id(execution_id)
        .with_cancel_token(cancel);

        tracing::info!(
            execution_id = %ctx.execution_id,
            nodes = order.len(),
            "Starting workflow execution"
        );

        for node_id in &order {
            // Cooperative cancellation checkpoint: checked before every
            // dispatch, never mid-node.
            if ctx.is_cancelled() {
                tracing::info!(
                    execution_id = %ctx.execution_id,
                    node_id = %node_id,
                    "Cancellation observed before dispatch"
                );
                return Err(EngineError::Cancelled);
            }

            let node = graph
                .node(node_id)
                .ok_or_else(|| EngineError::State(format!("ordered node '{}' missing", node_id)))?;

            if node.node_type == NodeType::Unknown {
                tracing::warn!(
                    execution_id = %ctx.execution_id,
                    node_id = %node.id,
                    "Unrecognized node type, skipped"
                );
                sink.on_transition(&node.id, NodeRunStatus::Skipped, None);
                continue;
            }

            sink.on_transition(&node.id, NodeRunStatus::Running, None);
            let node_start = Instant::now();

            tracing::debug!(
                execution_id = %ctx.execution_id,
                node_id = %node.id,
                node_type = %node.node_type,
                "Dispatching node"
            );

            match dispatch(&mut ctx, graph, node) {
                Ok(()) => {
                    tracing::debug!(
                        execution_id = %ctx.execution_id,
                        node_id = %node.id,
                        duration_ms = node_start.elapsed().as_millis() as u64,
                        "Node completed"
                    );
                    sink.on_transition(&node.id, NodeRunStatus::Completed, None);
                }
                Err(e) => {
                    let e = e.for_node(&node.id, node.node_type);
                    tracing::error!(
                        execution_id = %ctx.execution_id,
                        node_id = %node.id,
                        error = %e,
                        "Node failed, aborting run"
                    );
                    sink.on_transition(&node.id, NodeRunStatus::Failed, Some(&e.to_string()));
                    return Err(e);
                }
            }
        }

        let result = assemble_result(&ctx, start.elapsed().as_millis() as u64)?;
        tracing::info!(
            execution_id = %ctx.execution_id,
            duration_ms = result.duration_ms,
            metrics = result.metrics.len(),
            plots = result.plots.len(),
            "Workflow execution completed"
        );
        Ok(result)
    }
}

/// Routes a node to its handler. Upstream ids are passed in edge declaration
/// order so multi-input nodes can apply first-edge-wins selection.
fn dispatch(
    ctx: &mut ExecutionContext,
    graph: &WorkflowGraph,
    node: &WorkflowNode,
) -> EngineResult<()> {
    let upstream = graph.upstream_of(&node.id);
    match node.node_type {
        NodeType::Dataset => handlers::dataset::execute(ctx, node, &upstream),
        NodeType::Preprocess => handlers::preprocess::execute(ctx, node, &upstream),
        NodeType::Split => handlers::split::execute(ctx, node, &upstream),
        NodeType::Model => handlers::model::execute(ctx, node, &upstream),
        NodeType::Evaluate => handlers::evaluate::execute(ctx, node, &upstream),
        NodeType::Visualize => handlers::visualize::execute(ctx, node, &upstream),
        NodeType::Save => handlers::save::execute(ctx, node, &upstream),
        // Skipped by the executor before dispatch.
        NodeType::Unknown => Ok(()),
    }
}

/// Reads the accumulated context into the terminal artifact. Called only
/// after every scheduled node reached a terminal status.
fn assemble_result(ctx: &ExecutionContext, duration_ms: u64) -> EngineResult<WorkflowResult> {
    let output = ctx
        .primary_output()
        .ok_or_else(|| EngineError::State("no MODEL node produced an output".to_string()))?;
    let problem_type = ctx
        .problem_type
        .ok_or_else(|| EngineError::State("no DATASET node set a problem type".to_string()))?;

    let (train_samples, test_samples) = match &ctx.split {
        Some(split) => (split.y_train.len(), split.y_test.len()),
        None => (output.train_samples, output.y_eval.len()),
    };

    Ok(WorkflowResult {
        algorithm: output.algorithm.clone(),
        problem_type,
        duration_ms,
        hyperparameters: output.hyperparameters.clone(),
        metrics: ctx.metrics.clone(),
        plots: ctx.plots.clone(),
        train_samples,
        test_samples,
        feature_count: ctx.feature_names.len(),
        model_reference: ctx.model_reference.clone(),
    })
}
