//! `flowforge validate` - validate a workflow graph file.

use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::Args;

use flowforge_core::WorkflowGraph;
use flowforge_engine::Registries;
use flowforge_graph::Validator;

#[derive(Debug, Args)]
pub struct ValidateArgs {
    /// Workflow graph JSON file.
    pub workflow: PathBuf,
}

pub fn execute(args: ValidateArgs) -> Result<()> {
    let contents = std::fs::read_to_string(&args.workflow)
        .with_context(|| format!("failed to read {}", args.workflow.display()))?;
    let graph = WorkflowGraph::from_json(&contents)
        .with_context(|| format!("failed to parse {}", args.workflow.display()))?;

    let registries = Registries::builtin();
    let report = Validator::new(&registries).validate(&graph);

    for warning in &report.warnings {
        match &warning.node_id {
            Some(id) => println!("warning [{}]: {}", id, warning.message),
            None => println!("warning: {}", warning.message),
        }
    }
    for error in &report.errors {
        match &error.node_id {
            Some(id) => println!("error [{}]: {}", id, error.message),
            None => println!("error: {}", error.message),
        }
    }

    if let Some(order) = &report.execution_order {
        println!("execution order: {}", order.join(" -> "));
    }

    if !report.valid {
        bail!(
            "workflow is invalid: {} error(s), {} warning(s)",
            report.errors.len(),
            report.warnings.len()
        );
    }

    println!(
        "workflow is valid ({} node(s), {} warning(s))",
        graph.nodes.len(),
        report.warnings.len()
    );
    Ok(())
}
