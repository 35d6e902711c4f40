//! `flowforge run` - submit a workflow and execute it in-process.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{anyhow, bail, Context, Result};
use clap::Args;

use flowforge_artifact::FsArtifactStore;
use flowforge_config::FlowforgeConfig;
use flowforge_core::{DatasetProvider, JobStore, TabularData, WorkflowGraph};
use flowforge_engine::{
    ExecuteOutcome, JobOrchestrator, JsonFileDatasetProvider, MemoryDatasetProvider, Registries,
};
use flowforge_storage::RedbJobStore;

#[derive(Debug, Args)]
pub struct RunArgs {
    /// Workflow graph JSON file.
    pub workflow: PathBuf,

    /// Dataset bindings as `name=path.json` pairs; may be repeated.
    /// When omitted, datasets resolve from the configured dataset dir.
    #[arg(long = "data", value_name = "NAME=PATH")]
    pub data: Vec<String>,

    /// Job priority (higher runs first when queued behind other jobs).
    #[arg(long)]
    pub priority: Option<i64>,
}

pub fn execute(args: RunArgs, config_path: Option<&Path>) -> Result<()> {
    let config = FlowforgeConfig::load(config_path)?;

    let contents = std::fs::read_to_string(&args.workflow)
        .with_context(|| format!("failed to read {}", args.workflow.display()))?;
    let graph = WorkflowGraph::from_json(&contents)
        .with_context(|| format!("failed to parse {}", args.workflow.display()))?;

    let datasets = build_dataset_provider(&args.data, &config)?;
    let store: Arc<dyn JobStore> = Arc::new(RedbJobStore::open(config.job_store_path())?);
    let artifacts = Arc::new(FsArtifactStore::new(config.artifact_dir())?);
    let orchestrator = JobOrchestrator::new(
        Arc::clone(&store),
        Arc::new(Registries::builtin()),
        datasets,
        artifacts,
    );

    let priority = args.priority.unwrap_or(config.jobs.default_priority);
    let job = orchestrator.submit(&graph, priority)?;
    println!("job {} submitted", job.id);

    match orchestrator.execute(job.id)? {
        ExecuteOutcome::AlreadyCompleted => {
            println!("job {} was already completed", job.id);
        }
        ExecuteOutcome::Completed(result) => {
            println!("job {} completed in {} ms", job.id, result.duration_ms);
            println!(
                "  algorithm: {} ({})",
                result.algorithm, result.problem_type
            );
            println!(
                "  samples: {} train / {} test, {} feature(s)",
                result.train_samples, result.test_samples, result.feature_count
            );
            for metric in &result.metrics {
                println!("  {}: {:.4}", metric.key, metric.value);
            }
            for plot in &result.plots {
                println!("  plot: {} ({} bytes)", plot.key, plot.image.len());
            }
            if let Some(reference) = &result.model_reference {
                println!("  model artifact: {}", reference);
            }
        }
    }

    Ok(())
}

fn build_dataset_provider(
    pairs: &[String],
    config: &FlowforgeConfig,
) -> Result<Arc<dyn DatasetProvider>> {
    if pairs.is_empty() {
        let root = config
            .storage
            .dataset_dir
            .clone()
            .ok_or_else(|| anyhow!("no --data bindings given and no dataset dir configured"))?;
        return Ok(Arc::new(JsonFileDatasetProvider::new(root)));
    }

    let provider = MemoryDatasetProvider::new();
    for pair in pairs {
        let Some((name, path)) = pair.split_once('=') else {
            bail!("invalid --data binding '{pair}', expected NAME=PATH");
        };
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read dataset file {path}"))?;
        let data: TabularData = serde_json::from_str(&contents)
            .with_context(|| format!("failed to parse dataset file {path}"))?;
        let data = TabularData::new(data.columns, data.rows)?;
        provider.insert(name, data);
    }
    Ok(Arc::new(provider))
}
