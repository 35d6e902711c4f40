//! Model algorithm registry and the built-in reference algorithms.
//!
//! Algorithm internals are opaque to the engine: everything goes through
//! `ModelAlgorithm` (training) and `TrainedModel` (inference + export). The
//! built-ins are small deterministic reference implementations, not a
//! machine-learning library.

use std::collections::HashMap;
use std::sync::Arc;

use dashmap::DashMap;
use serde::{Deserialize, Serialize};

use flowforge_core::{EngineError, EngineResult, ProblemType};

/// A fitted model: inference plus serialization for the artifact store.
pub trait TrainedModel: Send {
    fn algorithm(&self) -> &str;

    /// Predicted values, one per input row.
    fn predict(&self, x: &[Vec<f64>]) -> Vec<f64>;

    /// Class probabilities, one distribution per input row. `None` when the
    /// algorithm does not support probability estimates.
    fn predict_proba(&self, x: &[Vec<f64>]) -> Option<Vec<Vec<f64>>>;

    /// Opaque model bytes for the artifact payload.
    fn to_bytes(&self) -> EngineResult<Vec<u8>>;
}

/// A trainable algorithm resolved by slug from the registry.
pub trait ModelAlgorithm: Send + Sync {
    fn slug(&self) -> &str;

    fn problem_type(&self) -> ProblemType;

    fn train(
        &self,
        x: &[Vec<f64>],
        y: &[f64],
        params: &HashMap<String, serde_json::Value>,
    ) -> EngineResult<Box<dyn TrainedModel>>;
}

/// Concurrent algorithm registry.
pub struct ModelRegistry {
    algorithms: DashMap<String, Arc<dyn ModelAlgorithm>>,
}

impl ModelRegistry {
    pub fn new() -> Self {
        Self {
            algorithms: DashMap::new(),
        }
    }

    pub fn builtin() -> Self {
        let registry = Self::new();
        registry.register(Arc::new(LogisticRegression));
        registry.register(Arc::new(LinearRegression));
        registry.register(Arc::new(MajorityClass));
        registry
    }

    pub fn register(&self, algorithm: Arc<dyn ModelAlgorithm>) {
        let slug = algorithm.slug().to_string();
        if self.algorithms.insert(slug.clone(), algorithm).is_some() {
            tracing::warn!(slug = %slug, "Algorithm re-registered, previous entry replaced");
        }
    }

    pub fn resolve(&self, slug: &str) -> Option<Arc<dyn ModelAlgorithm>> {
        self.algorithms.get(slug).map(|e| Arc::clone(e.value()))
    }

    pub fn contains(&self, slug: &str) -> bool {
        self.algorithms.contains_key(slug)
    }

    pub fn list_slugs(&self) -> Vec<String> {
        self.algorithms.iter().map(|e| e.key().clone()).collect()
    }
}

impl Default for ModelRegistry {
    fn default() -> Self {
        Self::new()
    }
}

fn param_f64(params: &HashMap<String, serde_json::Value>, key: &str, default: f64) -> f64 {
    params.get(key).and_then(|v| v.as_f64()).unwrap_or(default)
}

fn param_u64(params: &HashMap<String, serde_json::Value>, key: &str, default: u64) -> u64 {
    params.get(key).and_then(|v| v.as_u64()).unwrap_or(default)
}

fn check_shape(x: &[Vec<f64>], y: &[f64]) -> EngineResult<usize> {
    if x.is_empty() || y.is_empty() {
        return Err(EngineError::Model {
            message: "training data is empty".to_string(),
        });
    }
    if x.len() != y.len() {
        return Err(EngineError::Model {
            message: format!("feature rows ({}) and targets ({}) differ", x.len(), y.len()),
        });
    }
    Ok(x[0].len())
}

fn sigmoid(z: f64) -> f64 {
    1.0 / (1.0 + (-z).exp())
}

/// Binary logistic regression fit by full-batch gradient descent.
///
/// Deterministic: weights start at zero and the update order is fixed, so a
/// fixed dataset always yields the same model.
pub struct LogisticRegression;

#[derive(Debug, Serialize, Deserialize)]
struct LogisticWeights {
    weights: Vec<f64>,
    bias: f64,
}

struct FittedLogistic {
    inner: LogisticWeights,
}

impl ModelAlgorithm for LogisticRegression {
    fn slug(&self) -> &str {
        "logistic_regression"
    }

    fn problem_type(&self) -> ProblemType {
        ProblemType::Classification
    }

    fn train(
        &self,
        x: &[Vec<f64>],
        y: &[f64],
        params: &HashMap<String, serde_json::Value>,
    ) -> EngineResult<Box<dyn TrainedModel>> {
        let n_features = check_shape(x, y)?;
        if y.iter().any(|v| *v != 0.0 && *v != 1.0) {
            return Err(EngineError::Model {
                message: "logistic_regression expects binary targets encoded as 0/1".to_string(),
            });
        }

        let learning_rate = param_f64(params, "learning_rate", 0.1);
        let epochs = param_u64(params, "epochs", 200);
        let n = x.len() as f64;

        let mut weights = vec![0.0; n_features];
        let mut bias = 0.0;
        for _ in 0..epochs {
            let mut grad_w = vec![0.0; n_features];
            let mut grad_b = 0.0;
            for (row, target) in x.iter().zip(y) {
                let z = bias + row.iter().zip(&weights).map(|(a, b)| a * b).sum::<f64>();
                let err = sigmoid(z) - target;
                for (g, feature) in grad_w.iter_mut().zip(row) {
                    *g += err * feature;
                }
                grad_b += err;
            }
            for (w, g) in weights.iter_mut().zip(&grad_w) {
                *w -= learning_rate * g / n;
            }
            bias -= learning_rate * grad_b / n;
        }

        Ok(Box::new(FittedLogistic {
            inner: LogisticWeights { weights, bias },
        }))
    }
}

impl FittedLogistic {
    fn probability(&self, row: &[f64]) -> f64 {
        let z = self.inner.bias
            + row
                .iter()
                .zip(&self.inner.weights)
                .map(|(a, b)| a * b)
                .sum::<f64>();
        sigmoid(z)
    }
}

impl TrainedModel for FittedLogistic {
    fn algorithm(&self) -> &str {
        "logistic_regression"
    }

    fn predict(&self, x: &[Vec<f64>]) -> Vec<f64> {
        x.iter()
            .map(|row| if self.probability(row) >= 0.5 { 1.0 } else { 0.0 })
            .collect()
    }

    fn predict_proba(&self, x: &[Vec<f64>]) -> Option<Vec<Vec<f64>>> {
        Some(
            x.iter()
                .map(|row| {
                    let p = self.probability(row);
                    vec![1.0 - p, p]
                })
                .collect(),
        )
    }

    fn to_bytes(&self) -> EngineResult<Vec<u8>> {
        serde_json::to_vec(&self.inner)
            .map_err(|e| EngineError::Model {
                message: format!("failed to serialize model: {e}"),
            })
    }
}

/// Ordinary least squares by full-batch gradient descent.
pub struct LinearRegression;

#[derive(Debug, Serialize, Deserialize)]
struct LinearWeights {
    weights: Vec<f64>,
    bias: f64,
}

struct FittedLinear {
    inner: LinearWeights,
}

impl ModelAlgorithm for LinearRegression {
    fn slug(&self) -> &str {
        "linear_regression"
    }

    fn problem_type(&self) -> ProblemType {
        ProblemType::Regression
    }

    fn train(
        &self,
        x: &[Vec<f64>],
        y: &[f64],
        params: &HashMap<String, serde_json::Value>,
    ) -> EngineResult<Box<dyn TrainedModel>> {
        let n_features = check_shape(x, y)?;
        let learning_rate = param_f64(params, "learning_rate", 0.01);
        let epochs = param_u64(params, "epochs", 500);
        let n = x.len() as f64;

        let mut weights = vec![0.0; n_features];
        let mut bias = 0.0;
        for _ in 0..epochs {
            let mut grad_w = vec![0.0; n_features];
            let mut grad_b = 0.0;
            for (row, target) in x.iter().zip(y) {
                let prediction =
                    bias + row.iter().zip(&weights).map(|(a, b)| a * b).sum::<f64>();
                let err = prediction - target;
                for (g, feature) in grad_w.iter_mut().zip(row) {
                    *g += err * feature;
                }
                grad_b += err;
            }
            for (w, g) in weights.iter_mut().zip(&grad_w) {
                *w -= learning_rate * g / n;
            }
            bias -= learning_rate * grad_b / n;
        }

        Ok(Box::new(FittedLinear {
            inner: LinearWeights { weights, bias },
        }))
    }
}

impl TrainedModel for FittedLinear {
    fn algorithm(&self) -> &str {
        "linear_regression"
    }

    fn predict(&self, x: &[Vec<f64>]) -> Vec<f64> {
        x.iter()
            .map(|row| {
                self.inner.bias
                    + row
                        .iter()
                        .zip(&self.inner.weights)
                        .map(|(a, b)| a * b)
                        .sum::<f64>()
            })
            .collect()
    }

    fn predict_proba(&self, _x: &[Vec<f64>]) -> Option<Vec<Vec<f64>>> {
        None
    }

    fn to_bytes(&self) -> EngineResult<Vec<u8>> {
        serde_json::to_vec(&self.inner)
            .map_err(|e| EngineError::Model {
                message: format!("failed to serialize model: {e}"),
            })
    }
}

/// Baseline classifier predicting the most frequent training class.
pub struct MajorityClass;

#[derive(Debug, Serialize, Deserialize)]
struct MajorityWeights {
    majority: f64,
    positive_rate: f64,
}

struct FittedMajority {
    inner: MajorityWeights,
}

impl ModelAlgorithm for MajorityClass {
    fn slug(&self) -> &str {
        "majority_class"
    }

    fn problem_type(&self) -> ProblemType {
        ProblemType::Classification
    }

    fn train(
        &self,
        x: &[Vec<f64>],
        y: &[f64],
        _params: &HashMap<String, serde_json::Value>,
    ) -> EngineResult<Box<dyn TrainedModel>> {
        check_shape(x, y)?;
        let positives = y.iter().filter(|v| **v == 1.0).count() as f64;
        let positive_rate = positives / y.len() as f64;
        Ok(Box::new(FittedMajority {
            inner: MajorityWeights {
                majority: if positive_rate >= 0.5 { 1.0 } else { 0.0 },
                positive_rate,
            },
        }))
    }
}

impl TrainedModel for FittedMajority {
    fn algorithm(&self) -> &str {
        "majority_class"
    }

    fn predict(&self, x: &[Vec<f64>]) -> Vec<f64> {
        vec![self.inner.majority; x.len()]
    }

    fn predict_proba(&self, x: &[Vec<f64>]) -> Option<Vec<Vec<f64>>> {
        let p = self.inner.positive_rate;
        Some(vec![vec![1.0 - p, p]; x.len()])
    }

    fn to_bytes(&self) -> EngineResult<Vec<u8>> {
        serde_json::to_vec(&self.inner)
            .map_err(|e| EngineError::Model {
                message: format!("failed to serialize model: {e}"),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Two clearly separated clusters around 0 and 10.
    fn separable_data() -> (Vec<Vec<f64>>, Vec<f64>) {
        let mut x = Vec::new();
        let mut y = Vec::new();
        for i in 0..20 {
            let offset = (i % 5) as f64 * 0.1;
            x.push(vec![offset, offset]);
            y.push(0.0);
            x.push(vec![10.0 + offset, 10.0 + offset]);
            y.push(1.0);
        }
        (x, y)
    }

    #[test]
    fn logistic_regression_separates_clusters() {
        let (x, y) = separable_data();
        let model = LogisticRegression
            .train(&x, &y, &HashMap::new())
            .expect("train");

        let predictions = model.predict(&x);
        let correct = predictions
            .iter()
            .zip(&y)
            .filter(|(p, t)| p == t)
            .count();
        assert_eq!(correct, x.len());

        let probabilities = model.predict_proba(&x).expect("probabilities");
        for row in &probabilities {
            assert_eq!(row.len(), 2);
            assert!((row[0] + row[1] - 1.0).abs() < 1e-9);
        }
    }

    #[test]
    fn logistic_regression_is_deterministic() {
        let (x, y) = separable_data();
        let a = LogisticRegression
            .train(&x, &y, &HashMap::new())
            .unwrap()
            .to_bytes()
            .unwrap();
        let b = LogisticRegression
            .train(&x, &y, &HashMap::new())
            .unwrap()
            .to_bytes()
            .unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn logistic_regression_rejects_non_binary_targets() {
        let x = vec![vec![1.0], vec![2.0]];
        let y = vec![0.0, 2.0];
        assert!(LogisticRegression.train(&x, &y, &HashMap::new()).is_err());
    }

    #[test]
    fn linear_regression_fits_a_line() {
        // y = 2x + 1
        let x: Vec<Vec<f64>> = (0..10).map(|i| vec![i as f64]).collect();
        let y: Vec<f64> = (0..10).map(|i| 2.0 * i as f64 + 1.0).collect();

        let mut params = HashMap::new();
        params.insert("epochs".to_string(), serde_json::json!(5000));
        params.insert("learning_rate".to_string(), serde_json::json!(0.02));

        let model = LinearRegression.train(&x, &y, &params).expect("train");
        let predictions = model.predict(&x);
        for (p, t) in predictions.iter().zip(&y) {
            assert!((p - t).abs() < 0.5, "predicted {p}, expected {t}");
        }
        assert!(model.predict_proba(&x).is_none());
    }

    #[test]
    fn majority_class_predicts_the_mode() {
        let x = vec![vec![0.0]; 10];
        let y = vec![1.0, 1.0, 1.0, 1.0, 1.0, 1.0, 1.0, 0.0, 0.0, 0.0];
        let model = MajorityClass.train(&x, &y, &HashMap::new()).unwrap();
        assert_eq!(model.predict(&x), vec![1.0; 10]);
    }

    #[test]
    fn empty_training_data_is_an_error() {
        assert!(LogisticRegression
            .train(&[], &[], &HashMap::new())
            .is_err());
    }
}
