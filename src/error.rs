//! Error Taxonomy
//!
//! Fatal errors (configuration, registry fetch) abort a run. Validation
//! errors are per node and only decide whether a descriptor is kept.

use std::path::PathBuf;
use thiserror::Error;

/// Invalid or incomplete run configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing :environment")]
    MissingEnvironment,
    #[error("supported file types are 'yaml json all', got '{0}'")]
    UnsupportedFileType(String),
    #[error("invalid configuration in {path:?}: {reason}")]
    Invalid { path: PathBuf, reason: String },
}

/// Failure while querying the node registry
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("failed to read {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("malformed node document {path:?}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("malformed node document {path:?}: {reason}")]
    Malformed { path: PathBuf, reason: String },
    #[error("invalid search pattern '{pattern}': {reason}")]
    Query { pattern: String, reason: String },
    #[error("unsupported search index '{0}'")]
    UnsupportedIndex(String),
}

/// A descriptor lacks a required field
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("{} missing '{field}'", .node.as_deref().unwrap_or("<unnamed node>"))]
    MissingField { node: Option<String>, field: String },
}

impl ValidationError {
    /// Name of the field that failed the check
    pub fn field(&self) -> &str {
        match self {
            ValidationError::MissingField { field, .. } => field,
        }
    }
}

/// Anything that can stop a batch conversion
#[derive(Debug, Error)]
pub enum ConvertError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Fetch(#[from] FetchError),
    #[error("JSON encoding failed: {0}")]
    Json(#[from] serde_json::Error),
    #[error("YAML encoding failed: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

pub type ConvertResult<T> = std::result::Result<T, ConvertError>;
