//! MODEL - resolves an algorithm by slug and trains it.
//!
//! Three training modes: direct fit, k-fold cross-validation (reporting
//! mean/std score as metrics), and a search-optimized mode whose optimizer
//! integration is a stub that falls back to the direct fit.

use std::collections::HashMap;
use std::time::Instant;

use flowforge_core::{EngineResult, Metric, ProblemType, WorkflowNode};

use super::{node_err, require_data, require_str};
use crate::context::{ExecutionContext, ModelOutput};
use crate::registry::models::ModelAlgorithm;

const DEFAULT_CV_FOLDS: u64 = 5;

pub fn execute(
    ctx: &mut ExecutionContext,
    node: &WorkflowNode,
    _upstream: &[&str],
) -> EngineResult<()> {
    let slug = require_str(node, "algorithm")?.to_string();
    let algorithm = ctx
        .registries
        .models
        .resolve(&slug)
        .ok_or_else(|| node_err(node, format!("unknown algorithm '{}'", slug)))?;

    let hyperparameters: HashMap<String, serde_json::Value> =
        match node.config_value("hyperparameters") {
            Some(serde_json::Value::Object(map)) => {
                map.iter().map(|(k, v)| (k.clone(), v.clone())).collect()
            }
            _ => HashMap::new(),
        };

    let mode = node.config_str("training_mode").unwrap_or("direct");
    match mode {
        "direct" | "cross_validation" => {}
        "search" => {
            // TODO: wire the hyperparameter search optimizer; until then the
            // search mode trains with the configured defaults.
            tracing::warn!(
                execution_id = %ctx.execution_id,
                node_id = %node.id,
                "Search-optimized training not yet available, falling back to direct fit"
            );
        }
        other => {
            return Err(node_err(node, format!("unknown training mode '{}'", other)));
        }
    }

    // Training set: the upstream split when present, the full table when the
    // model is wired directly to a DATASET or PREPROCESS node.
    let (x_train, y_train, x_eval, y_eval) = match &ctx.split {
        Some(split) => (
            split.x_train.clone(),
            split.y_train.clone(),
            split.x_test.clone(),
            split.y_test.clone(),
        ),
        None => {
            let target = ctx
                .target_column
                .clone()
                .ok_or_else(|| node_err(node, "no target column set by an upstream DATASET node"))?;
            let data = require_data(ctx, node)?;
            let (x, y, feature_names) = data
                .features_and_target(&target)
                .map_err(|e| node_err(node, e.to_string()))?;
            if ctx.feature_names.is_empty() {
                ctx.feature_names = feature_names;
            }
            (x.clone(), y.clone(), x, y)
        }
    };

    if mode == "cross_validation" {
        let folds = node.config_u64("cv_folds").unwrap_or(DEFAULT_CV_FOLDS).max(2) as usize;
        let scores = cross_validate(ctx, node, algorithm.as_ref(), &x_train, &y_train, &hyperparameters, folds)?;
        let mean = scores.iter().sum::<f64>() / scores.len() as f64;
        let variance =
            scores.iter().map(|s| (s - mean).powi(2)).sum::<f64>() / scores.len() as f64;
        ctx.metrics.push(Metric::new("cv_mean_score", mean));
        ctx.metrics.push(Metric::new("cv_std_score", variance.sqrt()));
        tracing::debug!(
            execution_id = %ctx.execution_id,
            node_id = %node.id,
            folds,
            mean,
            "Cross-validation complete"
        );
    }

    let start = Instant::now();
    let model = algorithm
        .train(&x_train, &y_train, &hyperparameters)
        .map_err(|e| node_err(node, e.to_string()))?;
    let training_duration_ms = start.elapsed().as_millis() as u64;

    let predictions = model.predict(&x_eval);
    let probabilities = model.predict_proba(&x_eval);

    tracing::info!(
        execution_id = %ctx.execution_id,
        node_id = %node.id,
        algorithm = %slug,
        train_samples = y_train.len(),
        duration_ms = training_duration_ms,
        "Model trained"
    );

    ctx.record_model_output(
        &node.id,
        ModelOutput {
            algorithm: slug,
            model,
            y_eval,
            predictions,
            probabilities,
            hyperparameters,
            training_duration_ms,
            train_samples: y_train.len(),
        },
    );
    Ok(())
}

/// Scores `folds` held-out folds; accuracy for classification, r2 for
/// regression.
fn cross_validate(
    ctx: &ExecutionContext,
    node: &WorkflowNode,
    algorithm: &dyn ModelAlgorithm,
    x: &[Vec<f64>],
    y: &[f64],
    hyperparameters: &HashMap<String, serde_json::Value>,
    folds: usize,
) -> EngineResult<Vec<f64>> {
    let n = y.len();
    if n < folds {
        return Err(node_err(
            node,
            format!("{} rows cannot be split into {} folds", n, folds),
        ));
    }

    let score_key = match ctx.problem_type {
        Some(ProblemType::Regression) => "r2",
        _ => "accuracy",
    };
    let keys = vec![score_key.to_string()];

    let mut scores = Vec::with_capacity(folds);
    for fold in 0..folds {
        let mut x_train = Vec::new();
        let mut y_train = Vec::new();
        let mut x_held = Vec::new();
        let mut y_held = Vec::new();
        for i in 0..n {
            if i % folds == fold {
                x_held.push(x[i].clone());
                y_held.push(y[i]);
            } else {
                x_train.push(x[i].clone());
                y_train.push(y[i]);
            }
        }

        let model = algorithm
            .train(&x_train, &y_train, hyperparameters)
            .map_err(|e| node_err(node, format!("fold {fold} training failed: {e}")))?;
        let predictions = model.predict(&x_held);
        let computed = ctx
            .registries
            .metrics
            .compute(&keys, &y_held, &predictions, None);
        let score = computed.first().map(|m| m.value).unwrap_or(0.0);
        scores.push(score);
    }
    Ok(scores)
}
