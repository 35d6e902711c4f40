//! Execution context - the single mutable pipeline state of one run.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tempfile::TempDir;

use flowforge_core::{
    DatasetProvider, EngineError, EngineResult, Metric, ProblemType, RenderedPlot, TabularData,
};
use flowforge_artifact::ArtifactStore;

use crate::registry::models::TrainedModel;
use crate::registry::Registries;

/// Train/test partition produced by the SPLIT step.
#[derive(Clone, Debug, Default)]
pub struct SplitData {
    pub x_train: Vec<Vec<f64>>,
    pub y_train: Vec<f64>,
    pub x_test: Vec<Vec<f64>>,
    pub y_test: Vec<f64>,
}

/// Everything one MODEL node produced, keyed by its node id in the context
/// so downstream nodes can select the output of their first upstream edge.
pub struct ModelOutput {
    pub algorithm: String,
    pub model: Box<dyn TrainedModel>,
    /// Targets of the evaluation set the predictions were made on.
    pub y_eval: Vec<f64>,
    pub predictions: Vec<f64>,
    pub probabilities: Option<Vec<Vec<f64>>>,
    pub hyperparameters: HashMap<String, serde_json::Value>,
    pub training_duration_ms: u64,
    pub train_samples: usize,
}

/// The pipeline state threaded through node handlers during one run.
///
/// Exclusively owned by one executor for one run; fields accumulate as
/// execution proceeds. The scratch directory is deleted on drop, which
/// covers success, node failure, and panic unwind alike.
pub struct ExecutionContext {
    /// Unique id for tracing; matches the job id when run under a job.
    pub execution_id: String,
    pub registries: Arc<Registries>,
    pub datasets: Arc<dyn DatasetProvider>,
    pub artifacts: Arc<dyn ArtifactStore>,
    cancel: Arc<AtomicBool>,
    scratch: TempDir,

    // Accumulated pipeline state.
    pub raw_data: Option<TabularData>,
    pub processed_data: Option<TabularData>,
    pub split: Option<SplitData>,
    pub feature_names: Vec<String>,
    pub problem_type: Option<ProblemType>,
    pub target_column: Option<String>,
    /// Outputs of executed MODEL nodes, by node id.
    pub model_outputs: HashMap<String, ModelOutput>,
    /// The first MODEL node that produced an output; result assembly and
    /// fallback lookups use it.
    pub primary_model: Option<String>,
    pub metrics: Vec<Metric>,
    pub plots: Vec<RenderedPlot>,
    pub model_reference: Option<String>,
}

impl ExecutionContext {
    pub fn new(
        registries: Arc<Registries>,
        datasets: Arc<dyn DatasetProvider>,
        artifacts: Arc<dyn ArtifactStore>,
    ) -> EngineResult<Self> {
        let scratch = TempDir::new()
            .map_err(|e| EngineError::State(format!("failed to create scratch dir: {e}")))?;

        Ok(Self {
            execution_id: uuid::Uuid::now_v7().to_string(),
            registries,
            datasets,
            artifacts,
            cancel: Arc::new(AtomicBool::new(false)),
            scratch,
            raw_data: None,
            processed_data: None,
            split: None,
            feature_names: Vec::new(),
            problem_type: None,
            target_column: None,
            model_outputs: HashMap::new(),
            primary_model: None,
            metrics: Vec::new(),
            plots: Vec::new(),
            model_reference: None,
        })
    }

    /// Associates the context with an externally provided execution id.
    pub fn with_execution_id(mut self, execution_id: String) -> Self {
        self.execution_id = execution_id;
        self
    }

    /// Installs a cooperative cancellation token.
    pub fn with_cancel_token(mut self, cancel: Arc<AtomicBool>) -> Self {
        self.cancel = cancel;
        self
    }

    /// Checked by the executor before every node dispatch. A node already
    /// running is never interrupted.
    pub fn is_cancelled(&self) -> bool {
        self.cancel.load(Ordering::Relaxed)
    }

    /// Job-scoped temporary area for handler scratch files.
    pub fn scratch_dir(&self) -> &Path {
        self.scratch.path()
    }

    /// The most processed table available: processed data when a PREPROCESS
    /// step ran, raw data otherwise.
    pub fn current_data(&self) -> Option<&TabularData> {
        self.processed_data.as_ref().or(self.raw_data.as_ref())
    }

    /// Records a MODEL node output, keeping the first one as primary.
    pub fn record_model_output(&mut self, node_id: &str, output: ModelOutput) {
        if self.primary_model.is_none() {
            self.primary_model = Some(node_id.to_string());
        }
        self.model_outputs.insert(node_id.to_string(), output);
    }

    /// The output of the first upstream node that produced one, falling back
    /// to the primary model. This is where "first edge wins" is decided for
    /// EVALUATE, VISUALIZE, and SAVE.
    pub fn upstream_model_output(&self, upstream: &[&str]) -> Option<&ModelOutput> {
        upstream
            .iter()
            .find_map(|id| self.model_outputs.get(*id))
            .or_else(|| self.primary_output())
    }

    /// The primary model output, if any MODEL node has executed.
    pub fn primary_output(&self) -> Option<&ModelOutput> {
        self.primary_model
            .as_deref()
            .and_then(|id| self.model_outputs.get(id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::MemoryDatasetProvider;
    use crate::registry::models::ModelAlgorithm;
    use flowforge_artifact::FsArtifactStore;

    fn context() -> ExecutionContext {
        let artifacts = FsArtifactStore::new(std::env::temp_dir().join("ff-ctx-test")).unwrap();
        ExecutionContext::new(
            Arc::new(Registries::builtin()),
            Arc::new(MemoryDatasetProvider::new()),
            Arc::new(artifacts),
        )
        .expect("context")
    }

    fn dummy_output(algorithm: &str) -> ModelOutput {
        let model = crate::registry::models::MajorityClass
            .train(&[vec![0.0]], &[1.0], &HashMap::new())
            .unwrap();
        ModelOutput {
            algorithm: algorithm.to_string(),
            model,
            y_eval: vec![1.0],
            predictions: vec![1.0],
            probabilities: None,
            hyperparameters: HashMap::new(),
            training_duration_ms: 0,
            train_samples: 1,
        }
    }

    #[test]
    fn scratch_dir_is_removed_on_drop() {
        let ctx = context();
        let path = ctx.scratch_dir().to_path_buf();
        assert!(path.is_dir());
        drop(ctx);
        assert!(!path.exists());
    }

    #[test]
    fn current_data_prefers_processed() {
        let mut ctx = context();
        assert!(ctx.current_data().is_none());

        let raw = TabularData::new(vec!["a".into()], vec![vec![1.0]]).unwrap();
        ctx.raw_data = Some(raw.clone());
        assert_eq!(ctx.current_data(), Some(&raw));

        let processed = TabularData::new(vec!["a".into()], vec![vec![2.0]]).unwrap();
        ctx.processed_data = Some(processed.clone());
        assert_eq!(ctx.current_data(), Some(&processed));
    }

    #[test]
    fn cancellation_token_is_shared() {
        let flag = Arc::new(AtomicBool::new(false));
        let ctx = context().with_cancel_token(Arc::clone(&flag));
        assert!(!ctx.is_cancelled());
        flag.store(true, Ordering::Relaxed);
        assert!(ctx.is_cancelled());
    }

    #[test]
    fn first_recorded_model_is_primary() {
        let mut ctx = context();
        ctx.record_model_output("m1", dummy_output("first"));
        ctx.record_model_output("m2", dummy_output("second"));

        assert_eq!(ctx.primary_model.as_deref(), Some("m1"));
        assert_eq!(ctx.primary_output().unwrap().algorithm, "first");
    }

    #[test]
    fn upstream_selection_takes_first_matching_edge() {
        let mut ctx = context();
        ctx.record_model_output("m1", dummy_output("first"));
        ctx.record_model_output("m2", dummy_output("second"));

        let selected = ctx.upstream_model_output(&["m2", "m1"]).unwrap();
        assert_eq!(selected.algorithm, "second");

        // Unknown upstream ids fall back to the primary model.
        let fallback = ctx.upstream_model_output(&["nope"]).unwrap();
        assert_eq!(fallback.algorithm, "first");
    }
}
