//! Registry Module
//!
//! The query side of the pipeline: a `NodeSource` answers a search pattern
//! with the matching raw node records. Failures here are fatal for the run.

mod directory;
pub mod query;

pub use directory::DirectorySource;
pub use query::Query;

use tracing::debug;

use crate::error::FetchError;
use crate::node::RawNodeRecord;

/// The only index node descriptors are built from
pub const NODE_INDEX: &str = "node";

/// Trait for registries that can be searched for nodes
pub trait NodeSource: Send + Sync {
    /// Records of `index` matching `pattern`, in a stable order
    fn search(&self, index: &str, pattern: &str) -> Result<Vec<RawNodeRecord>, FetchError>;
}

pub(crate) fn ensure_node_index(index: &str) -> Result<(), FetchError> {
    if index == NODE_INDEX {
        Ok(())
    } else {
        Err(FetchError::UnsupportedIndex(index.to_string()))
    }
}

/// Records held in memory, filtered on every search
#[derive(Debug, Clone, Default)]
pub struct MemorySource {
    records: Vec<RawNodeRecord>,
}

impl MemorySource {
    pub fn new(records: Vec<RawNodeRecord>) -> Self {
        Self { records }
    }

    pub fn push(&mut self, record: RawNodeRecord) {
        self.records.push(record);
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

impl NodeSource for MemorySource {
    fn search(&self, index: &str, pattern: &str) -> Result<Vec<RawNodeRecord>, FetchError> {
        ensure_node_index(index)?;
        let query = Query::parse(pattern)?;
        let found: Vec<RawNodeRecord> = self
            .records
            .iter()
            .filter(|record| query.matches(record))
            .cloned()
            .collect();
        debug!("Search '{}' matched {} of {} in-memory nodes", pattern, found.len(), self.records.len());
        Ok(found)
    }
}
