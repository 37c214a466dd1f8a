//! Conversion Configuration
//!
//! One immutable `ConversionConfig` per environment run, built either
//! directly or from loosely-typed `SearchOptions`.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::ConfigError;

pub const DEFAULT_USERNAME: &str = "rundeck";
pub const DEFAULT_FILE_TYPE: &str = "json";

/// Raw key the `osName` field is read from. Looks like a misspelling of
/// `platform`; kept as is until the consumers confirm which one they expect.
pub const OS_NAME_SOURCE_KEY: &str = "paltform";
const PLATFORM_KEY: &str = "platform";

/// Serialization format of a resource file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    Json,
    Yaml,
}

impl OutputFormat {
    pub const ALL: [OutputFormat; 2] = [OutputFormat::Json, OutputFormat::Yaml];

    /// Known selectors only; anything else is `None`
    pub fn parse(selector: &str) -> Option<Self> {
        match selector {
            "json" => Some(OutputFormat::Json),
            "yaml" => Some(OutputFormat::Yaml),
            _ => None,
        }
    }

    pub fn extension(&self) -> &'static str {
        match self {
            OutputFormat::Json => "json",
            OutputFormat::Yaml => "yaml",
        }
    }
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

/// Options as supplied by the caller, every one of them optional
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchOptions {
    pub environment: Option<String>,
    pub search_pattern: Option<String>,
    pub cluster_attribute: Option<String>,
    pub application_attribute: Option<String>,
    pub ignore_node_error: bool,
    pub username: Option<String>,
    pub file_type: Option<String>,
    pub os_name_from_platform: bool,
}

/// Settings for converting one environment
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConversionConfig {
    pub environment: String,
    pub search_pattern: String,
    pub cluster_attribute: Option<String>,
    pub application_attribute: Option<String>,
    pub ignore_node_error: bool,
    pub username: String,
    /// Output selector; only `json` and `yaml` produce output
    pub file_type: String,
    /// Read `osName` from `platform` instead of the literal legacy key
    pub os_name_from_platform: bool,
}

impl ConversionConfig {
    pub fn new(environment: impl Into<String>) -> Self {
        let environment = environment.into();
        Self {
            search_pattern: default_search_pattern(&environment),
            environment,
            cluster_attribute: None,
            application_attribute: None,
            ignore_node_error: false,
            username: DEFAULT_USERNAME.to_string(),
            file_type: DEFAULT_FILE_TYPE.to_string(),
            os_name_from_platform: false,
        }
    }

    pub fn from_options(options: SearchOptions) -> Result<Self, ConfigError> {
        let environment = options.environment.ok_or(ConfigError::MissingEnvironment)?;
        let mut config = Self::new(environment);
        if let Some(pattern) = options.search_pattern {
            config.search_pattern = pattern;
        }
        if let Some(username) = options.username {
            config.username = username;
        }
        if let Some(file_type) = options.file_type {
            config.file_type = file_type;
        }
        config.cluster_attribute = options.cluster_attribute;
        config.application_attribute = options.application_attribute;
        config.ignore_node_error = options.ignore_node_error;
        config.os_name_from_platform = options.os_name_from_platform;
        Ok(config)
    }

    pub fn with_search_pattern(mut self, pattern: impl Into<String>) -> Self {
        self.search_pattern = pattern.into();
        self
    }

    pub fn with_cluster_attribute(mut self, name: impl Into<String>) -> Self {
        self.cluster_attribute = Some(name.into());
        self
    }

    pub fn with_application_attribute(mut self, name: impl Into<String>) -> Self {
        self.application_attribute = Some(name.into());
        self
    }

    pub fn with_ignore_node_error(mut self, ignore: bool) -> Self {
        self.ignore_node_error = ignore;
        self
    }

    pub fn with_username(mut self, username: impl Into<String>) -> Self {
        self.username = username.into();
        self
    }

    pub fn with_file_type(mut self, file_type: impl Into<String>) -> Self {
        self.file_type = file_type.into();
        self
    }

    pub fn with_os_name_from_platform(mut self, enabled: bool) -> Self {
        self.os_name_from_platform = enabled;
        self
    }

    pub fn output_format(&self) -> Option<OutputFormat> {
        OutputFormat::parse(&self.file_type)
    }

    pub fn os_name_key(&self) -> &'static str {
        if self.os_name_from_platform {
            PLATFORM_KEY
        } else {
            OS_NAME_SOURCE_KEY
        }
    }
}

impl TryFrom<SearchOptions> for ConversionConfig {
    type Error = ConfigError;

    fn try_from(options: SearchOptions) -> Result<Self, Self::Error> {
        Self::from_options(options)
    }
}

pub fn default_search_pattern(environment: &str) -> String {
    format!("chef_environment:{}", environment)
}
