//! Preprocessing operation registry and built-in transforms.

use std::collections::HashMap;
use std::sync::Arc;

use dashmap::DashMap;

use flowforge_core::{EngineError, EngineResult, TabularData};

/// A named column transform. Operations never mutate their input.
pub trait PreprocessOperation: Send + Sync {
    fn slug(&self) -> &str;

    /// Applies the transform. The target column, when known, is left
    /// untouched by scaling operations.
    fn apply(
        &self,
        data: &TabularData,
        params: &HashMap<String, serde_json::Value>,
        target_column: Option<&str>,
    ) -> EngineResult<TabularData>;
}

/// Concurrent operation registry.
pub struct PreprocessRegistry {
    operations: DashMap<String, Arc<dyn PreprocessOperation>>,
}

impl PreprocessRegistry {
    pub fn new() -> Self {
        Self {
            operations: DashMap::new(),
        }
    }

    pub fn builtin() -> Self {
        let registry = Self::new();
        registry.register(Arc::new(ImputeMean));
        registry.register(Arc::new(StandardScale));
        registry.register(Arc::new(MinMaxScale));
        registry.register(Arc::new(DropMissingRows));
        registry
    }

    pub fn register(&self, operation: Arc<dyn PreprocessOperation>) {
        self.operations
            .insert(operation.slug().to_string(), operation);
    }

    pub fn resolve(&self, slug: &str) -> Option<Arc<dyn PreprocessOperation>> {
        self.operations.get(slug).map(|e| Arc::clone(e.value()))
    }

    pub fn contains(&self, slug: &str) -> bool {
        self.operations.contains_key(slug)
    }
}

impl Default for PreprocessRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Column indices a scaling operation should touch: everything but the
/// target.
fn feature_indices(data: &TabularData, target_column: Option<&str>) -> Vec<usize> {
    let target_idx = target_column.and_then(|t| data.column_index(t));
    (0..data.n_columns())
        .filter(|i| Some(*i) != target_idx)
        .collect()
}

fn column_mean(data: &TabularData, index: usize) -> f64 {
    let values: Vec<f64> = data
        .rows
        .iter()
        .map(|r| r[index])
        .filter(|v| !v.is_nan())
        .collect();
    if values.is_empty() {
        0.0
    } else {
        values.iter().sum::<f64>() / values.len() as f64
    }
}

/// Replaces missing cells with the column mean over non-missing cells.
pub struct ImputeMean;

impl PreprocessOperation for ImputeMean {
    fn slug(&self) -> &str {
        "impute_mean"
    }

    fn apply(
        &self,
        data: &TabularData,
        _params: &HashMap<String, serde_json::Value>,
        _target_column: Option<&str>,
    ) -> EngineResult<TabularData> {
        let means: Vec<f64> = (0..data.n_columns()).map(|i| column_mean(data, i)).collect();
        let rows = data
            .rows
            .iter()
            .map(|row| {
                row.iter()
                    .enumerate()
                    .map(|(i, v)| if v.is_nan() { means[i] } else { *v })
                    .collect()
            })
            .collect();
        TabularData::new(data.columns.clone(), rows)
    }
}

/// Z-score standardization of feature columns.
pub struct StandardScale;

impl PreprocessOperation for StandardScale {
    fn slug(&self) -> &str {
        "standard_scale"
    }

    fn apply(
        &self,
        data: &TabularData,
        _params: &HashMap<String, serde_json::Value>,
        target_column: Option<&str>,
    ) -> EngineResult<TabularData> {
        let indices = feature_indices(data, target_column);
        let mut rows = data.rows.clone();
        for &i in &indices {
            let mean = column_mean(data, i);
            let variance = data
                .rows
                .iter()
                .map(|r| r[i])
                .filter(|v| !v.is_nan())
                .map(|v| (v - mean).powi(2))
                .sum::<f64>()
                / data.n_rows().max(1) as f64;
            let std_dev = variance.sqrt();
            if std_dev == 0.0 {
                // Constant column; leave values centered at zero.
                for row in rows.iter_mut() {
                    if !row[i].is_nan() {
                        row[i] = 0.0;
                    }
                }
                continue;
            }
            for row in rows.iter_mut() {
                if !row[i].is_nan() {
                    row[i] = (row[i] - mean) / std_dev;
                }
            }
        }
        TabularData::new(data.columns.clone(), rows)
    }
}

/// Rescales feature columns into `[0, 1]`.
pub struct MinMaxScale;

impl PreprocessOperation for MinMaxScale {
    fn slug(&self) -> &str {
        "min_max_scale"
    }

    fn apply(
        &self,
        data: &TabularData,
        _params: &HashMap<String, serde_json::Value>,
        target_column: Option<&str>,
    ) -> EngineResult<TabularData> {
        let indices = feature_indices(data, target_column);
        let mut rows = data.rows.clone();
        for &i in &indices {
            let values: Vec<f64> = data
                .rows
                .iter()
                .map(|r| r[i])
                .filter(|v| !v.is_nan())
                .collect();
            let Some(min) = values.iter().copied().reduce(f64::min) else {
                continue;
            };
            let max = values.iter().copied().reduce(f64::max).expect("non-empty");
            let range = max - min;
            for row in rows.iter_mut() {
                if !row[i].is_nan() {
                    row[i] = if range == 0.0 { 0.0 } else { (row[i] - min) / range };
                }
            }
        }
        TabularData::new(data.columns.clone(), rows)
    }
}

/// Drops rows containing any missing cell.
pub struct DropMissingRows;

impl PreprocessOperation for DropMissingRows {
    fn slug(&self) -> &str {
        "drop_missing_rows"
    }

    fn apply(
        &self,
        data: &TabularData,
        _params: &HashMap<String, serde_json::Value>,
        _target_column: Option<&str>,
    ) -> EngineResult<TabularData> {
        let rows: Vec<Vec<f64>> = data
            .rows
            .iter()
            .filter(|row| row.iter().all(|v| !v.is_nan()))
            .cloned()
            .collect();
        if rows.is_empty() {
            return Err(EngineError::Dataset {
                message: "drop_missing_rows removed every row".to_string(),
            });
        }
        TabularData::new(data.columns.clone(), rows)
    }
}
