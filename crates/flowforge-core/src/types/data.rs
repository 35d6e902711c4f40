//! Tabular data passed between pipeline steps.
//!
//! Cells are `f64`; `NaN` marks a missing value. Categorical targets are
//! expected to be pre-encoded as class indices by the dataset provider.

use serde::{Deserialize, Serialize};

use crate::error::{EngineError, EngineResult};

/// Named columns over row-major `f64` cells.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TabularData {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<f64>>,
}

impl TabularData {
    /// Builds a table, rejecting rows whose width does not match the header.
    pub fn new(columns: Vec<String>, rows: Vec<Vec<f64>>) -> EngineResult<Self> {
        let width = columns.len();
        if let Some(pos) = rows.iter().position(|r| r.len() != width) {
            return Err(EngineError::Dataset {
                message: format!(
                    "row {} has {} cells, expected {}",
                    pos,
                    rows[pos].len(),
                    width
                ),
            });
        }
        Ok(Self { columns, rows })
    }

    pub fn n_rows(&self) -> usize {
        self.rows.len()
    }

    pub fn n_columns(&self) -> usize {
        self.columns.len()
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    /// All values of one column, in row order.
    pub fn column_values(&self, index: usize) -> Vec<f64> {
        self.rows.iter().map(|r| r[index]).collect()
    }

    /// Splits the table into a feature matrix, the target vector, and the
    /// feature column names, dropping the target column from the features.
    pub fn features_and_target(&self, target: &str) -> EngineResult<(Vec<Vec<f64>>, Vec<f64>, Vec<String>)> {
        let target_idx = self.column_index(target).ok_or_else(|| EngineError::Dataset {
            message: format!("target column '{}' not found", target),
        })?;

        let feature_names: Vec<String> = self
            .columns
            .iter()
            .enumerate()
            .filter(|(i, _)| *i != target_idx)
            .map(|(_, c)| c.clone())
            .collect();

        let mut features = Vec::with_capacity(self.rows.len());
        let mut target_values = Vec::with_capacity(self.rows.len());
        for row in &self.rows {
            let mut feature_row = Vec::with_capacity(row.len() - 1);
            for (i, cell) in row.iter().enumerate() {
                if i == target_idx {
                    target_values.push(*cell);
                } else {
                    feature_row.push(*cell);
                }
            }
            features.push(feature_row);
        }

        Ok((features, target_values, feature_names))
    }

    /// Distinct non-missing values of a column, sorted ascending.
    pub fn distinct_values(&self, index: usize) -> Vec<f64> {
        let mut values: Vec<f64> = self
            .rows
            .iter()
            .map(|r| r[index])
            .filter(|v| !v.is_nan())
            .collect();
        values.sort_by(|a, b| a.partial_cmp(b).expect("non-NaN values compare"));
        values.dedup();
        values
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table() -> TabularData {
        TabularData::new(
            vec!["x".into(), "y".into(), "label".into()],
            vec![
                vec![1.0, 2.0, 0.0],
                vec![3.0, 4.0, 1.0],
                vec![5.0, 6.0, 1.0],
            ],
        )
        .expect("well-formed table")
    }

    #[test]
    fn rejects_ragged_rows() {
        let err = TabularData::new(vec!["a".into(), "b".into()], vec![vec![1.0]])
            .expect_err("ragged row should fail");
        assert!(err.to_string().contains("row 0"));
    }

    #[test]
    fn features_and_target_drops_target_column() {
        let (x, y, names) = table().features_and_target("label").expect("split");
        assert_eq!(names, vec!["x", "y"]);
        assert_eq!(x, vec![vec![1.0, 2.0], vec![3.0, 4.0], vec![5.0, 6.0]]);
        assert_eq!(y, vec![0.0, 1.0, 1.0]);
    }

    #[test]
    fn missing_target_column_is_an_error() {
        let err = table().features_and_target("nope").expect_err("unknown column");
        assert!(err.to_string().contains("nope"));
    }

    #[test]
    fn distinct_values_skips_missing() {
        let data = TabularData::new(
            vec!["v".into()],
            vec![vec![1.0], vec![f64::NAN], vec![1.0], vec![0.0]],
        )
        .unwrap();
        assert_eq!(data.distinct_values(0), vec![0.0, 1.0]);
    }
}
