//! nodes_db
//!
//! Turns configuration-management node inventory into resource files for a
//! job runner:
//! - Search the node registry per environment
//! - Normalize each node into a fixed, flat attribute schema
//! - Validate required fields under a configurable tolerance policy
//! - Render the result as JSON or YAML and provision it to disk

pub mod config;
pub mod convert;
pub mod error;
pub mod node;
pub mod provision;
pub mod registry;

/// Log filter used when `RUST_LOG` is unset
pub const DEFAULT_LOG_FILTER: &str = "nodes_db=info";

// Re-exports for convenience
pub use config::{ConversionConfig, OutputFormat, SearchOptions};
pub use convert::{convert, convert_environment, BatchConverter, ResultSet};
pub use error::{ConfigError, ConvertError, FetchError, ValidationError};
pub use node::{normalize, validate, NodeDescriptor, RawNodeRecord};
pub use provision::{ProvisionConfig, Provisioner};
pub use registry::{DirectorySource, MemorySource, NodeSource};
