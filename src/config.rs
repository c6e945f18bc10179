//! Configuration management for DataFog.
//!
//! Settings come from an optional TOML file, overridden by `DATAFOG_*`
//! environment variables. Validation is fail-fast: an invalid operation set
//! or unknown backend id is a fatal [`ConfigError`] surfaced before any item
//! processing begins.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::models::{EntityType, OperationSet};
use crate::ner::RECOGNIZER_IDS;
use crate::ocr::EXTRACTOR_IDS;

/// Default per-item chunk size for long texts.
pub const DEFAULT_TEXT_CHUNK_LENGTH: usize = 1000;

/// Configuration errors. Always fatal.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("unknown recognizer backend '{0}' (expected one of: {1})")]
    UnknownRecognizer(String, String),

    #[error("unknown extractor backend '{0}' (expected one of: {1})")]
    UnknownExtractor(String, String),

    #[error("invalid operations: {0}")]
    InvalidOperations(String),

    #[error("invalid value for {key}: {reason}")]
    InvalidValue { key: String, reason: String },

    #[error("failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
}

fn default_operations() -> String {
    "annotate_pii".to_string()
}

fn default_recognizer() -> String {
    "pattern".to_string()
}

fn default_extractor() -> String {
    "tesseract".to_string()
}

fn default_max_concurrency() -> usize {
    4
}

fn default_distributed_threshold() -> usize {
    64
}

fn default_text_chunk_length() -> usize {
    DEFAULT_TEXT_CHUNK_LENGTH
}

fn default_fetch_timeout() -> u64 {
    30
}

fn default_extract_timeout() -> u64 {
    60
}

fn default_recognize_timeout() -> u64 {
    30
}

fn default_type_priority() -> Vec<String> {
    [
        "EMAIL",
        "PHONE_NUMBER",
        "SSN",
        "CREDIT_CARD",
        "PERSON",
        "ORG",
        "GPE",
        "LOC",
        "DATE",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

/// DataFog runtime configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DataFogConfig {
    /// Comma-separated default operations for pipeline runs.
    #[serde(default = "default_operations")]
    pub operations: String,

    /// Entity recognizer backend id.
    #[serde(default = "default_recognizer")]
    pub recognizer_backend: String,

    /// Text extractor backend id.
    #[serde(default = "default_extractor")]
    pub extractor_backend: String,

    /// Maximum in-flight items per batch.
    #[serde(default = "default_max_concurrency")]
    pub max_concurrency: usize,

    /// Batch size at which work is handed to the distributed runner.
    #[serde(default = "default_distributed_threshold")]
    pub distributed_threshold: usize,

    /// Label priority order for consolidation tie-breaks.
    #[serde(default = "default_type_priority")]
    pub type_priority: Vec<String>,

    /// Chunk size for splitting long texts before recognition.
    #[serde(default = "default_text_chunk_length")]
    pub text_chunk_length: usize,

    /// Per-stage timeouts, in seconds.
    #[serde(default = "default_fetch_timeout")]
    pub fetch_timeout_secs: u64,
    #[serde(default = "default_extract_timeout")]
    pub extract_timeout_secs: u64,
    #[serde(default = "default_recognize_timeout")]
    pub recognize_timeout_secs: u64,
}

impl Default for DataFogConfig {
    fn default() -> Self {
        Self {
            operations: default_operations(),
            recognizer_backend: default_recognizer(),
            extractor_backend: default_extractor(),
            max_concurrency: default_max_concurrency(),
            distributed_threshold: default_distributed_threshold(),
            type_priority: default_type_priority(),
            text_chunk_length: default_text_chunk_length(),
            fetch_timeout_secs: default_fetch_timeout(),
            extract_timeout_secs: default_extract_timeout(),
            recognize_timeout_secs: default_recognize_timeout(),
        }
    }
}

impl DataFogConfig {
    /// Load configuration: file (explicit path or discovered), then
    /// environment overrides, then validation.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = match path.map(PathBuf::from).or_else(Self::discover_file) {
            Some(path) => {
                let raw = std::fs::read_to_string(&path).map_err(|source| ConfigError::Read {
                    path: path.clone(),
                    source,
                })?;
                toml::from_str(&raw).map_err(|source| ConfigError::Parse { path, source })?
            }
            None => Self::default(),
        };

        config.apply_env();
        config.validate()?;
        Ok(config)
    }

    /// Standard config file locations, first match wins.
    fn discover_file() -> Option<PathBuf> {
        [
            Some(PathBuf::from("datafog.toml")),
            dirs::config_dir().map(|d| d.join("datafog").join("config.toml")),
        ]
        .into_iter()
        .flatten()
        .find(|p| p.exists())
    }

    /// Apply `DATAFOG_*` environment variable overrides.
    fn apply_env(&mut self) {
        if let Ok(v) = std::env::var("DATAFOG_OPERATIONS") {
            self.operations = v;
        }
        if let Ok(v) = std::env::var("DATAFOG_RECOGNIZER_BACKEND") {
            self.recognizer_backend = v;
        }
        if let Ok(v) = std::env::var("DATAFOG_EXTRACTOR_BACKEND") {
            self.extractor_backend = v;
        }
        if let Ok(v) = std::env::var("DATAFOG_MAX_CONCURRENCY") {
            if let Ok(n) = v.parse() {
                self.max_concurrency = n;
            }
        }
        if let Ok(v) = std::env::var("DATAFOG_DISTRIBUTED_THRESHOLD") {
            if let Ok(n) = v.parse() {
                self.distributed_threshold = n;
            }
        }
    }

    /// Validate backend ids, the operation set, and numeric bounds.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !RECOGNIZER_IDS.contains(&self.recognizer_backend.as_str()) {
            return Err(ConfigError::UnknownRecognizer(
                self.recognizer_backend.clone(),
                RECOGNIZER_IDS.join(", "),
            ));
        }
        if !EXTRACTOR_IDS.contains(&self.extractor_backend.as_str()) {
            return Err(ConfigError::UnknownExtractor(
                self.extractor_backend.clone(),
                EXTRACTOR_IDS.join(", "),
            ));
        }
        OperationSet::parse(&self.operations).map_err(ConfigError::InvalidOperations)?;
        if self.max_concurrency == 0 {
            return Err(ConfigError::InvalidValue {
                key: "max_concurrency".to_string(),
                reason: "must be at least 1".to_string(),
            });
        }
        if self.text_chunk_length == 0 {
            return Err(ConfigError::InvalidValue {
                key: "text_chunk_length".to_string(),
                reason: "must be at least 1".to_string(),
            });
        }
        Ok(())
    }

    /// Parsed default operation set.
    pub fn operation_set(&self) -> Result<OperationSet, ConfigError> {
        OperationSet::parse(&self.operations).map_err(ConfigError::InvalidOperations)
    }

    /// Consolidation priority order as entity types.
    pub fn priority_order(&self) -> Vec<EntityType> {
        self.type_priority
            .iter()
            .map(|s| EntityType::from(s.as_str()))
            .collect()
    }

    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.fetch_timeout_secs)
    }

    pub fn extract_timeout(&self) -> Duration {
        Duration::from_secs(self.extract_timeout_secs)
    }

    pub fn recognize_timeout(&self) -> Duration {
        Duration::from_secs(self.recognize_timeout_secs)
    }
}
