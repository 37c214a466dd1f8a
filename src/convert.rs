//! Batch Converter
//!
//! Runs every record of an environment through normalize + validate,
//! applies the error-tolerance policy and renders the surviving
//! descriptors as one resource document.

use indexmap::IndexMap;
use tracing::{debug, info, warn};

use crate::config::{ConversionConfig, OutputFormat};
use crate::error::ConvertResult;
use crate::node::{normalize, validate, NodeDescriptor, RawNodeRecord};
use crate::registry::{NodeSource, NODE_INDEX};

/// Descriptors keyed by node name, in first-seen order
pub type ResultSet = IndexMap<String, NodeDescriptor>;

pub struct BatchConverter<'a> {
    config: &'a ConversionConfig,
}

impl<'a> BatchConverter<'a> {
    pub fn new(config: &'a ConversionConfig) -> Self {
        Self { config }
    }

    /// Normalize and filter; a later node with the same name replaces the earlier one
    pub fn collect(&self, records: &[RawNodeRecord]) -> ResultSet {
        let mut nodes = ResultSet::new();

        for record in records {
            let descriptor = normalize(record, self.config);

            if let Err(error) = validate(&descriptor, self.config) {
                if !self.config.ignore_node_error {
                    warn!("{}, node ignored", error);
                    continue;
                }
                debug!("{}, node kept (ignore_node_error)", error);
            }

            let identity = descriptor.identity();
            if nodes.insert(identity.clone(), descriptor).is_some() {
                debug!("Duplicate node '{}' replaced by a later record", identity);
            }
        }

        nodes
    }

    /// Rendered document, or `None` when the configured selector is not a known format
    #[tracing::instrument(skip(self, records), fields(environment = %self.config.environment, records = records.len()))]
    pub fn convert(&self, records: &[RawNodeRecord]) -> ConvertResult<Option<String>> {
        let nodes = self.collect(records);
        info!("{} of {} nodes kept", nodes.len(), records.len());

        match self.config.output_format() {
            Some(format) => render(&nodes, format).map(Some),
            None => {
                warn!("Unknown file type '{}', no output produced", self.config.file_type);
                Ok(None)
            }
        }
    }
}

/// Serialize a result set; JSON is pretty-printed with two-space indents
pub fn render(nodes: &ResultSet, format: OutputFormat) -> ConvertResult<String> {
    Ok(match format {
        OutputFormat::Json => serde_json::to_string_pretty(nodes)?,
        OutputFormat::Yaml => serde_yaml::to_string(nodes)?,
    })
}

pub fn convert(records: &[RawNodeRecord], config: &ConversionConfig) -> ConvertResult<Option<String>> {
    BatchConverter::new(config).convert(records)
}

/// Fetch the environment's nodes and convert them
pub fn convert_environment(source: &dyn NodeSource, config: &ConversionConfig) -> ConvertResult<Option<String>> {
    let records = source.search(NODE_INDEX, &config.search_pattern)?;
    info!(
        "Search '{}' returned {} nodes for environment '{}'",
        config.search_pattern,
        records.len(),
        config.environment
    );
    convert(&records, config)
}
