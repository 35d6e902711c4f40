//! Terminal artifacts of a successful run.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// The learning problem the workflow solves.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProblemType {
    Classification,
    Regression,
}

impl ProblemType {
    pub fn is_classification(&self) -> bool {
        matches!(self, ProblemType::Classification)
    }
}

impl fmt::Display for ProblemType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProblemType::Classification => f.write_str("classification"),
            ProblemType::Regression => f.write_str("regression"),
        }
    }
}

impl FromStr for ProblemType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "classification" => Ok(ProblemType::Classification),
            "regression" => Ok(ProblemType::Regression),
            other => Err(format!("unknown problem type '{}'", other)),
        }
    }
}

/// One computed evaluation metric.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Metric {
    pub key: String,
    pub value: f64,
}

impl Metric {
    pub fn new(key: impl Into<String>, value: f64) -> Self {
        Self {
            key: key.into(),
            value,
        }
    }
}

/// One rendered plot. The image payload is opaque to the engine.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RenderedPlot {
    pub key: String,
    pub name: String,
    pub image: Vec<u8>,
}

/// Terminal artifact of one successful job.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct WorkflowResult {
    pub algorithm: String,
    pub problem_type: ProblemType,
    pub duration_ms: u64,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub hyperparameters: HashMap<String, serde_json::Value>,
    pub metrics: Vec<Metric>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub plots: Vec<RenderedPlot>,
    pub train_samples: usize,
    pub test_samples: usize,
    pub feature_count: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model_reference: Option<String>,
}

impl WorkflowResult {
    /// Looks up a metric value by key.
    pub fn metric(&self, key: &str) -> Option<f64> {
        self.metrics.iter().find(|m| m.key == key).map(|m| m.value)
    }
}
