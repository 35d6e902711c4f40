//! Dataset providers.

use std::path::{Path, PathBuf};

use dashmap::DashMap;

use flowforge_core::{DatasetProvider, EngineError, EngineResult, TabularData};

/// In-memory provider, used by tests and by callers that materialize data
/// themselves before submitting a workflow.
pub struct MemoryDatasetProvider {
    datasets: DashMap<String, TabularData>,
}

impl MemoryDatasetProvider {
    pub fn new() -> Self {
        Self {
            datasets: DashMap::new(),
        }
    }

    pub fn insert(&self, reference: impl Into<String>, data: TabularData) {
        self.datasets.insert(reference.into(), data);
    }
}

impl Default for MemoryDatasetProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl DatasetProvider for MemoryDatasetProvider {
    fn load(&self, reference: &str) -> EngineResult<TabularData> {
        self.datasets
            .get(reference)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| EngineError::Dataset {
                message: format!("unknown dataset '{}'", reference),
            })
    }
}

/// Loads datasets from `<root>/<reference>.json` files containing the
/// canonical `{columns, rows}` representation.
pub struct JsonFileDatasetProvider {
    root: PathBuf,
}

impl JsonFileDatasetProvider {
    pub fn new<P: AsRef<Path>>(root: P) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
        }
    }
}

impl DatasetProvider for JsonFileDatasetProvider {
    fn load(&self, reference: &str) -> EngineResult<TabularData> {
        // References are names, not paths.
        if reference.contains('/') || reference.contains("..") {
            return Err(EngineError::Dataset {
                message: format!("invalid dataset reference '{}'", reference),
            });
        }

        let path = self.root.join(format!("{reference}.json"));
        let contents = std::fs::read_to_string(&path).map_err(|e| EngineError::Dataset {
            message: format!("failed to read dataset '{}': {e}", reference),
        })?;
        let data: TabularData =
            serde_json::from_str(&contents).map_err(|e| EngineError::Dataset {
                message: format!("failed to parse dataset '{}': {e}", reference),
            })?;
        // Re-validate shape; the JSON may have been written by hand.
        TabularData::new(data.columns, data.rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn memory_provider_round_trip() {
        let provider = MemoryDatasetProvider::new();
        let data = TabularData::new(vec!["a".into()], vec![vec![1.0]]).unwrap();
        provider.insert("iris", data.clone());

        assert_eq!(provider.load("iris").unwrap(), data);
        assert!(provider.load("missing").is_err());
    }

    #[test]
    fn file_provider_reads_canonical_json() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("points.json"),
            r#"{"columns":["x","y"],"rows":[[1.0,2.0],[3.0,4.0]]}"#,
        )
        .unwrap();

        let provider = JsonFileDatasetProvider::new(dir.path());
        let data = provider.load("points").unwrap();
        assert_eq!(data.n_rows(), 2);
        assert_eq!(data.columns, vec!["x", "y"]);
    }

    #[test]
    fn file_provider_rejects_path_traversal() {
        let provider = JsonFileDatasetProvider::new("/tmp");
        assert!(provider.load("../etc/passwd").is_err());
    }
}
