//! Evaluation metric registry and built-in metrics.
//!
//! Unknown metric keys are silently omitted from the output; requesting a
//! metric this build does not ship is not an error.

use std::sync::Arc;

use dashmap::DashMap;

use flowforge_core::Metric;

/// A single named metric over true/predicted values.
///
/// Returns `None` when the metric is undefined for the given inputs (e.g. a
/// probability-based metric without probabilities).
pub trait MetricFn: Send + Sync {
    fn key(&self) -> &str;

    fn compute(&self, y_true: &[f64], y_pred: &[f64], y_proba: Option<&[Vec<f64>]>) -> Option<f64>;
}

/// Concurrent metric registry.
pub struct MetricsRegistry {
    metrics: DashMap<String, Arc<dyn MetricFn>>,
}

impl MetricsRegistry {
    pub fn new() -> Self {
        Self {
            metrics: DashMap::new(),
        }
    }

    pub fn builtin() -> Self {
        let registry = Self::new();
        registry.register(Arc::new(Accuracy));
        registry.register(Arc::new(Precision));
        registry.register(Arc::new(Recall));
        registry.register(Arc::new(F1));
        registry.register(Arc::new(MeanSquaredError));
        registry.register(Arc::new(RootMeanSquaredError));
        registry.register(Arc::new(MeanAbsoluteError));
        registry.register(Arc::new(R2));
        registry
    }

    pub fn register(&self, metric: Arc<dyn MetricFn>) {
        self.metrics.insert(metric.key().to_string(), metric);
    }

    pub fn contains(&self, key: &str) -> bool {
        self.metrics.contains_key(key)
    }

    /// Computes the requested metrics in request order. Keys unknown to the
    /// registry, and metrics undefined for the inputs, are omitted.
    pub fn compute(
        &self,
        keys: &[String],
        y_true: &[f64],
        y_pred: &[f64],
        y_proba: Option<&[Vec<f64>]>,
    ) -> Vec<Metric> {
        let mut out = Vec::with_capacity(keys.len());
        for key in keys {
            let Some(metric) = self.metrics.get(key.as_str()) else {
                tracing::debug!(key = %key, "Requested metric not in registry, omitted");
                continue;
            };
            if let Some(value) = metric.compute(y_true, y_pred, y_proba) {
                out.push(Metric::new(key.clone(), value));
            }
        }
        out
    }
}

impl Default for MetricsRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Binary confusion counts with 1.0 as the positive class.
fn confusion(y_true: &[f64], y_pred: &[f64]) -> (f64, f64, f64, f64) {
    let mut tp = 0.0;
    let mut fp = 0.0;
    let mut tn = 0.0;
    let mut fn_ = 0.0;
    for (t, p) in y_true.iter().zip(y_pred) {
        match (*t == 1.0, *p == 1.0) {
            (true, true) => tp += 1.0,
            (false, true) => fp += 1.0,
            (false, false) => tn += 1.0,
            (true, false) => fn_ += 1.0,
        }
    }
    (tp, fp, tn, fn_)
}

struct Accuracy;

impl MetricFn for Accuracy {
    fn key(&self) -> &str {
        "accuracy"
    }

    fn compute(&self, y_true: &[f64], y_pred: &[f64], _: Option<&[Vec<f64>]>) -> Option<f64> {
        if y_true.is_empty() || y_true.len() != y_pred.len() {
            return None;
        }
        let correct = y_true.iter().zip(y_pred).filter(|(t, p)| t == p).count();
        Some(correct as f64 / y_true.len() as f64)
    }
}

struct Precision;

impl MetricFn for Precision {
    fn key(&self) -> &str {
        "precision"
    }

    fn compute(&self, y_true: &[f64], y_pred: &[f64], _: Option<&[Vec<f64>]>) -> Option<f64> {
        if y_true.is_empty() || y_true.len() != y_pred.len() {
            return None;
        }
        let (tp, fp, _, _) = confusion(y_true, y_pred);
        if tp + fp == 0.0 {
            return Some(0.0);
        }
        Some(tp / (tp + fp))
    }
}

struct Recall;

impl MetricFn for Recall {
    fn key(&self) -> &str {
        "recall"
    }

    fn compute(&self, y_true: &[f64], y_pred: &[f64], _: Option<&[Vec<f64>]>) -> Option<f64> {
        if y_true.is_empty() || y_true.len() != y_pred.len() {
            return None;
        }
        let (tp, _, _, fn_) = confusion(y_true, y_pred);
        if tp + fn_ == 0.0 {
            return Some(0.0);
        }
        Some(tp / (tp + fn_))
    }
}

struct F1;

impl MetricFn for F1 {
    fn key(&self) -> &str {
        "f1"
    }

    fn compute(&self, y_true: &[f64], y_pred: &[f64], proba: Option<&[Vec<f64>]>) -> Option<f64> {
        let precision = Precision.compute(y_true, y_pred, proba)?;
        let recall = Recall.compute(y_true, y_pred, proba)?;
        if precision + recall == 0.0 {
            return Some(0.0);
        }
        Some(2.0 * precision * recall / (precision + recall))
    }
}

struct MeanSquaredError;

impl MetricFn for MeanSquaredError {
    fn key(&self) -> &str {
        "mse"
    }

    fn compute(&self, y_true: &[f64], y_pred: &[f64], _: Option<&[Vec<f64>]>) -> Option<f64> {
        if y_true.is_empty() || y_true.len() != y_pred.len() {
            return None;
        }
        let sum: f64 = y_true
            .iter()
            .zip(y_pred)
            .map(|(t, p)| (t - p).powi(2))
            .sum();
        Some(sum / y_true.len() as f64)
    }
}

struct RootMeanSquaredError;

impl MetricFn for RootMeanSquaredError {
    fn key(&self) -> &str {
        "rmse"
    }

    fn compute(&self, y_true: &[f64], y_pred: &[f64], proba: Option<&[Vec<f64>]>) -> Option<f64> {
        MeanSquaredError.compute(y_true, y_pred, proba).map(f64::sqrt)
    }
}

struct MeanAbsoluteError;

impl MetricFn for MeanAbsoluteError {
    fn key(&self) -> &str {
        "mae"
    }

    fn compute(&self, y_true: &[f64], y_pred: &[f64], _: Option<&[Vec<f64>]>) -> Option<f64> {
        if y_true.is_empty() || y_true.len() != y_pred.len() {
            return None;
        }
        let sum: f64 = y_true.iter().zip(y_pred).map(|(t, p)| (t - p).abs()).sum();
        Some(sum / y_true.len() as f64)
    }
}

struct R2;

impl MetricFn for R2 {
    fn key(&self) -> &str {
        "r2"
    }

    fn compute(&self, y_true: &[f64], y_pred: &[f64], _: Option<&[Vec<f64>]>) -> Option<f64> {
        if y_true.is_empty() || y_true.len() != y_pred.len() {
            return None;
        }
        let mean: f64 = y_true.iter().sum::<f64>() / y_true.len() as f64;
        let ss_tot: f64 = y_true.iter().map(|t| (t - mean).powi(2)).sum();
        let ss_res: f64 = y_true
            .iter()
            .zip(y_pred)
            .map(|(t, p)| (t - p).powi(2))
            .sum();
        if ss_tot == 0.0 {
            return None;
        }
        Some(1.0 - ss_res / ss_tot)
    }
}
