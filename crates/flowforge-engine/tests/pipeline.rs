//! End-to-end pipeline tests over the in-memory job store.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde_json::json;

use flowforge_core::{
    EngineError, JobStatus, JobStore, NodeRunStatus, NodeType, TabularData, WorkflowEdge,
    WorkflowGraph, WorkflowNode,
};
use flowforge_artifact::FsArtifactStore;
use flowforge_engine::registry::models::{ModelAlgorithm, TrainedModel};
use flowforge_engine::{
    ExecuteOutcome, JobOrchestrator, MemoryDatasetProvider, MemoryJobStore, Registries, WorkerPool,
};

/// 100 rows, two separable classes (50/50).
fn two_class_dataset() -> TabularData {
    let mut rows = Vec::with_capacity(100);
    for i in 0..50 {
        let jitter = (i % 10) as f64 * 0.05;
        rows.push(vec![jitter, 1.0 - jitter, 0.0]);
        rows.push(vec![10.0 + jitter, 11.0 - jitter, 1.0]);
    }
    TabularData::new(vec!["x1".into(), "x2".into(), "label".into()], rows).expect("dataset")
}

/// Same clusters with one missing cell, so impute_mean has work to do.
fn gapped_dataset() -> TabularData {
    let mut data = two_class_dataset();
    data.rows[3][0] = f64::NAN;
    data
}

fn dataset_node(id: &str) -> WorkflowNode {
    WorkflowNode::new(id, NodeType::Dataset)
        .with_config("dataset", json!("clusters"))
        .with_config("problem_type", json!("classification"))
        .with_config("target_column", json!("label"))
}

fn split_node(id: &str) -> WorkflowNode {
    WorkflowNode::new(id, NodeType::Split)
        .with_config("test_size", json!(0.2))
        .with_config("random_seed", json!(42))
}

fn model_node(id: &str, algorithm: &str) -> WorkflowNode {
    WorkflowNode::new(id, NodeType::Model).with_config("algorithm", json!(algorithm))
}

fn evaluate_node(id: &str, metrics: serde_json::Value) -> WorkflowNode {
    WorkflowNode::new(id, NodeType::Evaluate).with_config("metrics", metrics)
}

struct Fixture {
    orchestrator: Arc<JobOrchestrator>,
    store: Arc<MemoryJobStore>,
    _artifact_dir: tempfile::TempDir,
}

fn fixture() -> Fixture {
    fixture_with(Registries::builtin())
}

fn fixture_with(registries: Registries) -> Fixture {
    let store = Arc::new(MemoryJobStore::new());
    let datasets = MemoryDatasetProvider::new();
    datasets.insert("clusters", two_class_dataset());
    datasets.insert("clusters_gapped", gapped_dataset());

    let artifact_dir = tempfile::tempdir().expect("artifact dir");
    let artifacts = FsArtifactStore::new(artifact_dir.path()).expect("artifact store");

    let orchestrator = Arc::new(JobOrchestrator::new(
        Arc::clone(&store) as Arc<dyn JobStore>,
        Arc::new(registries),
        Arc::new(datasets),
        Arc::new(artifacts),
    ));

    Fixture {
        orchestrator,
        store,
        _artifact_dir: artifact_dir,
    }
}

fn scenario_a_graph() -> WorkflowGraph {
    WorkflowGraph::new(
        vec![
            dataset_node("ds").with_config("dataset", json!("clusters_gapped")),
            WorkflowNode::new("pp", NodeType::Preprocess)
                .with_config("operations", json!(["impute_mean"])),
            split_node("sp"),
            model_node("ml", "logistic_regression"),
            evaluate_node("ev", json!(["accuracy"])),
        ],
        vec![
            WorkflowEdge::new("ds", "pp"),
            WorkflowEdge::new("pp", "sp"),
            WorkflowEdge::new("sp", "ml"),
            WorkflowEdge::new("ml", "ev"),
        ],
    )
}

#[test]
fn scenario_a_full_pipeline() {
    let fx = fixture();
    let job = fx.orchestrator.submit(&scenario_a_graph(), 0).expect("submit");
    assert_eq!(job.status, JobStatus::Queued);

    let outcome = fx.orchestrator.execute(job.id).expect("execute");
    let ExecuteOutcome::Completed(result) = outcome else {
        panic!("expected completed outcome");
    };

    assert_eq!(result.train_samples, 80);
    assert_eq!(result.test_samples, 20);
    assert_eq!(result.feature_count, 2);
    assert_eq!(result.algorithm, "logistic_regression");
    assert_eq!(result.metrics.len(), 1);
    let accuracy = result.metric("accuracy").expect("accuracy present");
    assert!((0.0..=1.0).contains(&accuracy), "accuracy {accuracy}");

    let stored = fx.store.job(job.id).unwrap();
    assert_eq!(stored.status, JobStatus::Completed);
    assert!(stored.started_at.is_some());
    assert!(stored.completed_at.is_some());

    for node in fx.store.job_nodes(job.id).unwrap() {
        assert_eq!(node.status, NodeRunStatus::Completed, "node {}", node.node_id);
        assert!(node.duration_ms.is_some());
    }

    assert!(fx.store.result(job.id).unwrap().is_some());
}

#[test]
fn execution_is_deterministic_across_jobs() {
    let fx = fixture();
    let graph = scenario_a_graph();

    let mut accuracies = Vec::new();
    for _ in 0..2 {
        let job = fx.orchestrator.submit(&graph, 0).unwrap();
        let ExecuteOutcome::Completed(result) = fx.orchestrator.execute(job.id).unwrap() else {
            panic!("expected completion");
        };
        assert_eq!(result.test_samples, 20);
        accuracies.push(result.metric("accuracy").unwrap());
    }
    assert_eq!(accuracies[0], accuracies[1]);
}

#[test]
fn idempotent_re_entry_on_completed_job() {
    let fx = fixture();
    let job = fx.orchestrator.submit(&scenario_a_graph(), 0).unwrap();
    fx.orchestrator.execute(job.id).unwrap();

    let nodes_before = fx.store.job_nodes(job.id).unwrap();
    let outcome = fx.orchestrator.execute(job.id).expect("re-entry");
    assert!(matches!(outcome, ExecuteOutcome::AlreadyCompleted));
    let nodes_after = fx.store.job_nodes(job.id).unwrap();
    assert_eq!(nodes_before, nodes_after);
}

/// Always-failing algorithm used to exercise fail-fast semantics.
struct ExplodingAlgorithm;

impl ModelAlgorithm for ExplodingAlgorithm {
    fn slug(&self) -> &str {
        "exploding"
    }

    fn problem_type(&self) -> flowforge_core::ProblemType {
        flowforge_core::ProblemType::Classification
    }

    fn train(
        &self,
        _x: &[Vec<f64>],
        _y: &[f64],
        _params: &HashMap<String, serde_json::Value>,
    ) -> flowforge_core::EngineResult<Box<dyn TrainedModel>> {
        Err(EngineError::Model {
            message: "training diverged".to_string(),
        })
    }
}

#[test]
fn fail_fast_leaves_later_nodes_pending() {
    let registries = Registries::builtin();
    registries.models.register(Arc::new(ExplodingAlgorithm));
    let fx = fixture_with(registries);

    let graph = WorkflowGraph::new(
        vec![
            dataset_node("ds"),
            split_node("sp"),
            model_node("ml", "exploding"),
            evaluate_node("ev", json!(["accuracy"])),
        ],
        vec![
            WorkflowEdge::new("ds", "sp"),
            WorkflowEdge::new("sp", "ml"),
            WorkflowEdge::new("ml", "ev"),
        ],
    );

    let job = fx.orchestrator.submit(&graph, 0).unwrap();
    let err = fx.orchestrator.execute(job.id).expect_err("job must fail");
    assert!(matches!(err, EngineError::Node { .. }));

    let stored = fx.store.job(job.id).unwrap();
    assert_eq!(stored.status, JobStatus::Failed);
    assert!(stored.error_message.as_deref().unwrap_or("").contains("training diverged"));

    let nodes: HashMap<String, NodeRunStatus> = fx
        .store
        .job_nodes(job.id)
        .unwrap()
        .into_iter()
        .map(|n| (n.node_id.clone(), n.status))
        .collect();
    assert_eq!(nodes["ds"], NodeRunStatus::Completed);
    assert_eq!(nodes["sp"], NodeRunStatus::Completed);
    assert_eq!(nodes["ml"], NodeRunStatus::Failed);
    // The node after the failure never left Pending.
    assert_eq!(nodes["ev"], NodeRunStatus::Pending);
}

#[test]
fn unknown_metric_keys_are_omitted_without_error() {
    let fx = fixture();
    let graph = WorkflowGraph::new(
        vec![
            dataset_node("ds"),
            split_node("sp"),
            model_node("ml", "logistic_regression"),
            evaluate_node("ev", json!(["accuracy", "telepathy"])),
        ],
        vec![
            WorkflowEdge::new("ds", "sp"),
            WorkflowEdge::new("sp", "ml"),
            WorkflowEdge::new("ml", "ev"),
        ],
    );

    let job = fx.orchestrator.submit(&graph, 0).unwrap();
    let ExecuteOutcome::Completed(result) = fx.orchestrator.execute(job.id).unwrap() else {
        panic!("expected completion");
    };
    let keys: Vec<&str> = result.metrics.iter().map(|m| m.key.as_str()).collect();
    assert_eq!(keys, vec!["accuracy"]);
}

#[test]
fn scenario_b_visualize_without_plots_completes_with_empty_output() {
    let fx = fixture();
    let graph = WorkflowGraph::new(
        vec![
            dataset_node("ds"),
            split_node("sp"),
            model_node("ml", "logistic_regression"),
            WorkflowNode::new("vz", NodeType::Visualize),
        ],
        vec![
            WorkflowEdge::new("ds", "sp"),
            WorkflowEdge::new("sp", "ml"),
            WorkflowEdge::new("ml", "vz"),
        ],
    );

    let job = fx.orchestrator.submit(&graph, 0).expect("warning is not an error");
    let ExecuteOutcome::Completed(result) = fx.orchestrator.execute(job.id).unwrap() else {
        panic!("expected completion");
    };
    assert!(result.plots.is_empty());
}

#[test]
fn scenario_c_evaluate_uses_first_upstream_edge() {
    let fx = fixture();
    // Two models; the first declared upstream edge of "ev" points at the
    // majority-class baseline, so its (poor) predictions must be evaluated
    // even though the logistic model executes first and is primary.
    let graph = WorkflowGraph::new(
        vec![
            dataset_node("ds"),
            split_node("sp"),
            model_node("good", "logistic_regression"),
            model_node("base", "majority_class"),
            evaluate_node("ev", json!(["accuracy"])),
        ],
        vec![
            WorkflowEdge::new("ds", "sp"),
            WorkflowEdge::new("sp", "good"),
            WorkflowEdge::new("sp", "base"),
            WorkflowEdge::new("base", "ev"),
            WorkflowEdge::new("good", "ev"),
        ],
    );

    let job = fx.orchestrator.submit(&graph, 0).unwrap();
    let ExecuteOutcome::Completed(result) = fx.orchestrator.execute(job.id).unwrap() else {
        panic!("expected completion");
    };

    // The baseline predicts one constant class; on a balanced 20-row test
    // set that caps accuracy well below the separable logistic fit.
    let accuracy = result.metric("accuracy").unwrap();
    assert!(accuracy < 0.8, "expected baseline accuracy, got {accuracy}");
}

#[test]
fn save_node_persists_a_loadable_artifact() {
    let fx = fixture();
    let graph = WorkflowGraph::new(
        vec![
            dataset_node("ds"),
            split_node("sp"),
            model_node("ml", "logistic_regression"),
            WorkflowNode::new("sv", NodeType::Save),
        ],
        vec![
            WorkflowEdge::new("ds", "sp"),
            WorkflowEdge::new("sp", "ml"),
            WorkflowEdge::new("ml", "sv"),
        ],
    );

    let job = fx.orchestrator.submit(&graph, 0).unwrap();
    let ExecuteOutcome::Completed(result) = fx.orchestrator.execute(job.id).unwrap() else {
        panic!("expected completion");
    };
    let reference = result.model_reference.expect("artifact reference");
    assert!(reference.ends_with(".ffm"));
}

#[test]
fn unknown_node_type_is_skipped_without_failing_the_job() {
    let fx = fixture();
    let json = r#"{
      "nodes": [
        {"id": "ds", "type": "DATASET", "config": {"dataset": "clusters", "problem_type": "classification", "target_column": "label"}},
        {"id": "mystery", "type": "QUANTUM_ANNEAL"},
        {"id": "ml", "type": "MODEL", "config": {"algorithm": "logistic_regression"}}
      ],
      "edges": [
        {"source": "ds", "target": "mystery"},
        {"source": "ds", "target": "ml"}
      ]
    }"#;
    let graph = WorkflowGraph::from_json(json).expect("parse graph");

    let job = fx.orchestrator.submit(&graph, 0).unwrap();
    assert!(matches!(
        fx.orchestrator.execute(job.id).unwrap(),
        ExecuteOutcome::Completed(_)
    ));

    let nodes: HashMap<String, NodeRunStatus> = fx
        .store
        .job_nodes(job.id)
        .unwrap()
        .into_iter()
        .map(|n| (n.node_id.clone(), n.status))
        .collect();
    assert_eq!(nodes["mystery"], NodeRunStatus::Skipped);
    assert_eq!(nodes["ml"], NodeRunStatus::Completed);
}

#[test]
fn invalid_graph_is_rejected_at_submission() {
    let fx = fixture();
    let graph = WorkflowGraph::new(vec![dataset_node("ds")], vec![]);
    let err = fx.orchestrator.submit(&graph, 0).expect_err("no model node");
    assert!(matches!(err, EngineError::Validation { .. }));
}

#[test]
fn cancel_and_retry_lifecycle() {
    let fx = fixture();
    let job = fx.orchestrator.submit(&scenario_a_graph(), 3).unwrap();

    // Queued -> Cancelled directly.
    let cancelled = fx.orchestrator.cancel(job.id).expect("cancel queued job");
    assert_eq!(cancelled.status, JobStatus::Cancelled);

    // A cancelled job cannot be executed or cancelled again.
    assert!(matches!(
        fx.orchestrator.execute(job.id),
        Err(EngineError::InvalidJobState { .. })
    ));
    assert!(fx.orchestrator.cancel(job.id).is_err());

    // Retry creates a fresh job on the same snapshot with the same priority;
    // the original keeps its audit record.
    let retried = fx.orchestrator.retry(job.id).expect("retry");
    assert_ne!(retried.id, job.id);
    assert_eq!(retried.snapshot_id, job.snapshot_id);
    assert_eq!(retried.priority, 3);
    assert_eq!(retried.status, JobStatus::Queued);
    assert_eq!(fx.store.job(job.id).unwrap().status, JobStatus::Cancelled);

    let ExecuteOutcome::Completed(_) = fx.orchestrator.execute(retried.id).unwrap() else {
        panic!("retried job should complete");
    };

    // Completed jobs are not retried.
    assert!(fx.orchestrator.retry(retried.id).is_err());
}

#[test]
fn worker_pool_drains_the_queue() {
    let fx = fixture();
    let graph = scenario_a_graph();
    let jobs: Vec<_> = (0..3)
        .map(|i| fx.orchestrator.submit(&graph, i).unwrap())
        .collect();

    let pool = WorkerPool::start(Arc::clone(&fx.orchestrator), 2).expect("start pool");

    let deadline = Instant::now() + Duration::from_secs(30);
    loop {
        let all_done = jobs
            .iter()
            .all(|j| fx.store.job(j.id).unwrap().status == JobStatus::Completed);
        if all_done {
            break;
        }
        assert!(Instant::now() < deadline, "workers did not drain the queue");
        std::thread::sleep(Duration::from_millis(50));
    }

    pool.shutdown();
}

#[test]
fn scenario_a_runs_identically_over_the_persistent_store() {
    let dir = tempfile::tempdir().expect("store dir");
    let store = Arc::new(
        flowforge_storage::RedbJobStore::open(dir.path().join("jobs.redb")).expect("open store"),
    );
    let datasets = MemoryDatasetProvider::new();
    datasets.insert("clusters", two_class_dataset());
    datasets.insert("clusters_gapped", gapped_dataset());
    let artifact_dir = tempfile::tempdir().expect("artifact dir");
    let artifacts = FsArtifactStore::new(artifact_dir.path()).expect("artifact store");

    let orchestrator = JobOrchestrator::new(
        Arc::clone(&store) as Arc<dyn JobStore>,
        Arc::new(Registries::builtin()),
        Arc::new(datasets),
        Arc::new(artifacts),
    );

    let job = orchestrator.submit(&scenario_a_graph(), 0).unwrap();
    let ExecuteOutcome::Completed(result) = orchestrator.execute(job.id).unwrap() else {
        panic!("expected completion");
    };
    assert_eq!(result.train_samples, 80);
    assert_eq!(result.test_samples, 20);

    assert_eq!(store.job(job.id).unwrap().status, JobStatus::Completed);
    assert!(store.result(job.id).unwrap().is_some());
    assert!(store
        .job_nodes(job.id)
        .unwrap()
        .iter()
        .all(|n| n.status == NodeRunStatus::Completed));
}

#[test]
fn cross_validation_reports_fold_scores() {
    let fx = fixture();
    let graph = WorkflowGraph::new(
        vec![
            dataset_node("ds"),
            split_node("sp"),
            model_node("ml", "logistic_regression")
                .with_config("training_mode", json!("cross_validation"))
                .with_config("cv_folds", json!(4)),
            evaluate_node("ev", json!(["accuracy"])),
        ],
        vec![
            WorkflowEdge::new("ds", "sp"),
            WorkflowEdge::new("sp", "ml"),
            WorkflowEdge::new("ml", "ev"),
        ],
    );

    let job = fx.orchestrator.submit(&graph, 0).unwrap();
    let ExecuteOutcome::Completed(result) = fx.orchestrator.execute(job.id).unwrap() else {
        panic!("expected completion");
    };

    let mean = result.metric("cv_mean_score").expect("cv mean");
    assert!((0.0..=1.0).contains(&mean));
    assert!(result.metric("cv_std_score").is_some());
    assert!(result.metric("accuracy").is_some());
}

/// Operation that always fails at runtime while resolving fine at
/// validation time.
struct FaultyOperation;

impl flowforge_engine::registry::preprocess::PreprocessOperation for FaultyOperation {
    fn slug(&self) -> &str {
        "faulty_scale"
    }

    fn apply(
        &self,
        _data: &TabularData,
        _params: &HashMap<String, serde_json::Value>,
        _target_column: Option<&str>,
    ) -> flowforge_core::EngineResult<TabularData> {
        Err(EngineError::Dataset {
            message: "numerical overflow".to_string(),
        })
    }
}

fn faulty_preprocess_graph(strict: bool) -> WorkflowGraph {
    let mut pp = WorkflowNode::new("pp", NodeType::Preprocess)
        .with_config("operations", json!(["impute_mean", "faulty_scale"]));
    if strict {
        pp = pp.with_config("strict", json!(true));
    }
    WorkflowGraph::new(
        vec![
            dataset_node("ds"),
            pp,
            split_node("sp"),
            model_node("ml", "logistic_regression"),
            evaluate_node("ev", json!(["accuracy"])),
        ],
        vec![
            WorkflowEdge::new("ds", "pp"),
            WorkflowEdge::new("pp", "sp"),
            WorkflowEdge::new("sp", "ml"),
            WorkflowEdge::new("ml", "ev"),
        ],
    )
}

#[test]
fn preprocess_sub_step_failures_skip_and_warn_by_default() {
    let registries = Registries::builtin();
    registries.operations.register(Arc::new(FaultyOperation));
    let fx = fixture_with(registries);

    let job = fx.orchestrator.submit(&faulty_preprocess_graph(false), 0).unwrap();
    let ExecuteOutcome::Completed(result) = fx.orchestrator.execute(job.id).unwrap() else {
        panic!("expected completion despite the failing sub-step");
    };
    assert!(result.metric("accuracy").is_some());
}

#[test]
fn strict_preprocess_promotes_sub_step_failure_to_node_failure() {
    let registries = Registries::builtin();
    registries.operations.register(Arc::new(FaultyOperation));
    let fx = fixture_with(registries);

    let job = fx.orchestrator.submit(&faulty_preprocess_graph(true), 0).unwrap();
    let err = fx.orchestrator.execute(job.id).expect_err("strict mode fails the node");
    assert!(err.to_string().contains("faulty_scale"));
    assert_eq!(fx.store.job(job.id).unwrap().status, JobStatus::Failed);
}
