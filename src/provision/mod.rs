//! Provisioning Step
//!
//! Writes one resource file per environment (and per format when `all` is
//! requested) into the configured directory, with the configured owner,
//! group and mode on both the directory and the files.

mod ownership;

pub use ownership::{parse_mode, Ownership};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use crate::config::{ConversionConfig, OutputFormat, SearchOptions};
use crate::convert::convert_environment;
use crate::error::ConfigError;
use crate::registry::NodeSource;

pub const DEFAULT_CONFIG_FILE: &str = "nodes_db.yml";
const DEFAULT_DIR: &str = "/var/lib/nodes_db";
const DEFAULT_NODE_PATH: &str = "nodes";
const DEFAULT_MODE: &str = "0755";

/// Which resource files to produce
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileType {
    All,
    Json,
    Yaml,
}

impl FileType {
    pub fn parse(selector: &str) -> Result<Self, ConfigError> {
        match selector {
            "all" => Ok(FileType::All),
            "json" => Ok(FileType::Json),
            "yaml" => Ok(FileType::Yaml),
            other => Err(ConfigError::UnsupportedFileType(other.to_string())),
        }
    }

    pub fn formats(&self) -> Vec<OutputFormat> {
        match self {
            FileType::All => OutputFormat::ALL.to_vec(),
            FileType::Json => vec![OutputFormat::Json],
            FileType::Yaml => vec![OutputFormat::Yaml],
        }
    }
}

/// Settings of a whole provisioning run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProvisionConfig {
    pub environments: Vec<String>,
    pub search_pattern: Option<String>,
    pub cluster_attribute: Option<String>,
    pub application_attribute: Option<String>,
    pub ignore_node_error: bool,
    pub username: Option<String>,
    pub file_type: String,
    pub dir: PathBuf,
    pub owner: Option<String>,
    pub group: Option<String>,
    pub mode: String,
    /// Directory holding the exported node documents
    pub node_path: PathBuf,
    pub os_name_from_platform: bool,
}

impl Default for ProvisionConfig {
    fn default() -> Self {
        Self {
            environments: Vec::new(),
            search_pattern: None,
            cluster_attribute: None,
            application_attribute: None,
            ignore_node_error: false,
            username: None,
            file_type: "json".to_string(),
            dir: PathBuf::from(DEFAULT_DIR),
            owner: None,
            group: None,
            mode: DEFAULT_MODE.to_string(),
            node_path: PathBuf::from(DEFAULT_NODE_PATH),
            os_name_from_platform: false,
        }
    }
}

impl ProvisionConfig {
    /// Load a YAML (or JSON) config file, then apply environment overrides
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).with_context(|| format!("Failed to read config file {:?}", path))?;
        let mut config: ProvisionConfig = serde_yaml::from_str(&content).map_err(|e| ConfigError::Invalid {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
        config.apply_overrides(|key| std::env::var(key).ok());
        Ok(config)
    }

    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(node_path) = lookup("NODES_DB_NODE_PATH") {
            self.node_path = PathBuf::from(node_path);
        }
        if let Some(dir) = lookup("NODES_DB_DIR") {
            self.dir = PathBuf::from(dir);
        }
        if let Some(file_type) = lookup("NODES_DB_FILE_TYPE") {
            self.file_type = file_type;
        }
    }

    /// Per-environment options handed to the converter
    pub fn search_options(&self, environment: &str, format: OutputFormat) -> SearchOptions {
        SearchOptions {
            environment: Some(environment.to_string()),
            search_pattern: self.search_pattern.clone(),
            cluster_attribute: self.cluster_attribute.clone(),
            application_attribute: self.application_attribute.clone(),
            ignore_node_error: self.ignore_node_error,
            username: self.username.clone(),
            file_type: Some(format.extension().to_string()),
            os_name_from_platform: self.os_name_from_platform,
        }
    }
}

pub struct Provisioner {
    config: ProvisionConfig,
    file_type: FileType,
    ownership: Ownership,
}

impl Provisioner {
    /// Rejects unsupported file types and unknown owners before anything is written
    pub fn new(config: ProvisionConfig) -> Result<Self> {
        let file_type = FileType::parse(&config.file_type)?;
        let mode = parse_mode(&config.mode)?;
        let ownership = Ownership::resolve(config.owner.as_deref(), config.group.as_deref(), mode)?;
        Ok(Self {
            config,
            file_type,
            ownership,
        })
    }

    pub fn config(&self) -> &ProvisionConfig {
        &self.config
    }

    /// Path of the resource file for one environment and format
    pub fn output_path(&self, environment: &str, format: OutputFormat) -> PathBuf {
        self.config.dir.join(format!("{}.{}", environment, format.extension()))
    }

    /// Convert every environment and write the files; returns the paths written
    pub fn run(&self, source: &dyn NodeSource) -> Result<Vec<PathBuf>> {
        let dir = &self.config.dir;
        fs::create_dir_all(dir).with_context(|| format!("Failed to create output directory {:?}", dir))?;
        self.ownership.apply(dir)?;

        if self.config.environments.is_empty() {
            warn!("No environments configured, nothing to provision");
        }

        let mut written = Vec::new();
        for environment in &self.config.environments {
            for format in self.file_type.formats() {
                let conversion = ConversionConfig::from_options(self.config.search_options(environment, format))?;
                let Some(content) = convert_environment(source, &conversion)
                    .with_context(|| format!("Failed to convert environment '{}'", environment))?
                else {
                    continue;
                };

                let path = self.output_path(environment, format);
                write_file(&path, &content)?;
                self.ownership.apply(&path)?;
                written.push(path);
            }
        }

        info!("Provisioned {} resource files in {:?}", written.len(), dir);
        Ok(written)
    }
}

/// Writes only when the content differs from what is already on disk
fn write_file(path: &Path, content: &str) -> Result<()> {
    if fs::read_to_string(path).map(|current| current == content).unwrap_or(false) {
        debug!("{:?} is up to date", path);
        return Ok(());
    }
    fs::write(path, content).with_context(|| format!("Failed to write {:?}", path))?;
    info!("Wrote {:?}", path);
    Ok(())
}
