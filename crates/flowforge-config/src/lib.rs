//! Configuration primitives for flowforge tooling.
//!
//! Parses the TOML-based `~/.flowforge/config.toml` (or an explicitly given
//! path) so the CLI and embedding services share a single schema for storage
//! locations and worker sizing.

use std::path::{Path, PathBuf};

use dirs::home_dir;
use serde::{Deserialize, Serialize};
use thiserror::Error;

const CONFIG_DIR: &str = ".flowforge";
const CONFIG_FILE: &str = "config.toml";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("I/O error reading {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Failed to parse {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
}

/// Application configuration loaded from TOML.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct FlowforgeConfig {
    /// Storage locations.
    pub storage: StorageConfig,

    /// Job execution settings.
    pub jobs: JobsConfig,
}

/// Where the job store and artifacts live.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Path of the embedded job database.
    pub job_store_path: Option<PathBuf>,

    /// Directory model artifacts are written to.
    pub artifact_dir: Option<PathBuf>,

    /// Directory JSON datasets are resolved from.
    pub dataset_dir: Option<PathBuf>,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            job_store_path: None,
            artifact_dir: None,
            dataset_dir: None,
        }
    }
}

/// Worker pool sizing and defaults applied to submitted jobs.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct JobsConfig {
    /// Number of concurrent job workers.
    pub workers: usize,

    /// Default priority for jobs submitted without one.
    pub default_priority: i64,
}

impl Default for JobsConfig {
    fn default() -> Self {
        Self {
            workers: 2,
            default_priority: 0,
        }
    }
}

impl FlowforgeConfig {
    /// Default config location: `~/.flowforge/config.toml`.
    pub fn default_path() -> Option<PathBuf> {
        home_dir().map(|home| home.join(CONFIG_DIR).join(CONFIG_FILE))
    }

    /// The directory state files default into.
    pub fn data_dir() -> PathBuf {
        home_dir()
            .map(|home| home.join(CONFIG_DIR))
            .unwrap_or_else(|| PathBuf::from(CONFIG_DIR))
    }

    /// Loads configuration from `path`, or from the default location when
    /// `path` is `None`. A missing file yields the default configuration.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let path = match path {
            Some(p) => p.to_path_buf(),
            None => match Self::default_path() {
                Some(p) => p,
                None => return Ok(Self::default()),
            },
        };

        if !path.is_file() {
            return Ok(Self::default());
        }

        let contents = std::fs::read_to_string(&path).map_err(|source| ConfigError::Io {
            path: path.clone(),
            source,
        })?;
        toml::from_str(&contents).map_err(|source| ConfigError::Parse { path, source })
    }

    /// Resolved job store path with the home-directory default applied.
    pub fn job_store_path(&self) -> PathBuf {
        self.storage
            .job_store_path
            .clone()
            .unwrap_or_else(|| Self::data_dir().join("jobs.redb"))
    }

    /// Resolved artifact directory with the home-directory default applied.
    pub fn artifact_dir(&self) -> PathBuf {
        self.storage
            .artifact_dir
            .clone()
            .unwrap_or_else(|| Self::data_dir().join("artifacts"))
    }
}
