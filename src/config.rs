//! Configuration loaded from a YAML file
//!
//! Every section and field has a default, so an absent file or a partial
//! file both load. The collaborator API key never lives in the file: only
//! the name of the environment variable holding it does.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid config {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub database: DatabaseConfig,
    pub extraction: ExtractionConfig,
    pub taxonomy: TaxonomyConfig,
    pub worker: WorkerConfig,
    pub checkpoints: CheckpointConfig,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// SQLite file; `None` means `<data_dir>/lexigraph/lexigraph.db`
    pub path: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtractionConfig {
    pub max_keywords: usize,
    pub max_persons: usize,
    pub max_projects: usize,
    /// Collaborator items below this confidence are dropped
    pub min_confidence: f64,
    /// Base URL of an OpenAI-compatible API; `None` disables the collaborator
    pub endpoint: Option<String>,
    pub model: String,
    /// Name of the environment variable holding the API key
    pub api_key_env: String,
    pub timeout_secs: u64,
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            max_keywords: 8,
            max_persons: 5,
            max_projects: 3,
            min_confidence: 0.7,
            endpoint: None,
            model: "gpt-4o-mini".to_string(),
            api_key_env: "LEXIGRAPH_API_KEY".to_string(),
            timeout_secs: 30,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TaxonomyConfig {
    /// Classify newly seen, unclassified nodes during ingest
    pub classify_on_ingest: bool,
    /// Collaborator field picks below this confidence are rejected
    pub min_confidence: f64,
}

impl Default for TaxonomyConfig {
    fn default() -> Self {
        Self {
            classify_on_ingest: false,
            min_confidence: 0.7,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkerConfig {
    pub queue_capacity: usize,
    /// Jobs processed at once
    pub concurrency: usize,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            queue_capacity: 256,
            concurrency: 4,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CheckpointConfig {
    /// Record an auto checkpoint whenever a task's active set changes
    pub auto: bool,
}

impl Default for CheckpointConfig {
    fn default() -> Self {
        Self { auto: true }
    }
}

impl Config {
    /// Default location: `<data_dir>/lexigraph/config.yaml`
    pub fn default_path() -> Option<PathBuf> {
        dirs::data_dir().map(|d| d.join("lexigraph").join("config.yaml"))
    }

    /// Load from `path`, falling back to defaults if the file does not exist
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            tracing::debug!(path = %path.display(), "no config file, using defaults");
            return Ok(Self::default());
        }
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_yaml(&text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn from_yaml(text: &str) -> Result<Self, serde_yaml::Error> {
        if text.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_yaml::from_str(text)
    }

    /// Configured database path, or the default under the data directory
    pub fn database_path(&self) -> PathBuf {
        self.database.path.clone().unwrap_or_else(|| {
            dirs::data_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join("lexigraph")
                .join("lexigraph.db")
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let config = Config::default();
        assert_eq!(config.extraction.max_keywords, 8);
        assert_eq!(config.extraction.max_persons, 5);
        assert_eq!(config.extraction.max_projects, 3);
        assert_eq!(config.extraction.min_confidence, 0.7);
        assert!(config.extraction.endpoint.is_none());
        assert!(config.checkpoints.auto);
        assert!(!config.taxonomy.classify_on_ingest);
    }

    #[test]
    fn partial_yaml_keeps_other_defaults() {
        let config = Config::from_yaml(
            "extraction:\n  max_keywords: 4\n  endpoint: https://api.example.com/v1\nworker:\n  concurrency: 1\n",
        )
        .unwrap();
        assert_eq!(config.extraction.max_keywords, 4);
        assert_eq!(config.extraction.max_persons, 5);
        assert_eq!(
            config.extraction.endpoint.as_deref(),
            Some("https://api.example.com/v1")
        );
        assert_eq!(config.worker.concurrency, 1);
        assert_eq!(config.worker.queue_capacity, 256);
    }

    #[test]
    fn empty_yaml_is_default() {
        assert_eq!(Config::from_yaml("  \n").unwrap(), Config::default());
    }

    #[test]
    fn missing_file_is_default() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::load(&dir.path().join("absent.yaml")).unwrap();
        assert_eq!(config, Config::default());
    }

    #[test]
    fn malformed_file_reports_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.yaml");
        std::fs::write(&path, "extraction: [not, a, map]").unwrap();
        let err = Config::load(&path).unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
        assert!(err.to_string().contains("config.yaml"));
    }
}
