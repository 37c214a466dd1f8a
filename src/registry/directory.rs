//! Directory-backed registry
//!
//! Reads node documents exported with `knife node show -F json` (or
//! `knife download nodes`), one JSON file per node. Attribute layers are
//! merged with the registry's precedence before searching.

use serde_json::{Map, Value};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use super::{ensure_node_index, NodeSource, Query};
use crate::error::FetchError;
use crate::node::{RawNodeRecord, RunList};

/// Lowest precedence first
const ATTRIBUTE_LAYERS: [&str; 4] = ["default", "normal", "override", "automatic"];
const RESERVED_KEYS: [&str; 5] = ["name", "chef_environment", "run_list", "json_class", "chef_type"];

pub struct DirectorySource {
    root: PathBuf,
}

impl DirectorySource {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Every node document under the root, sorted by file name
    pub fn load_all(&self) -> Result<Vec<RawNodeRecord>, FetchError> {
        let io_error = |source| FetchError::Io {
            path: self.root.clone(),
            source,
        };

        let mut paths = Vec::new();
        for entry in fs::read_dir(&self.root).map_err(io_error)? {
            let path = entry.map_err(io_error)?.path();
            if path.is_file() && path.extension().and_then(|s| s.to_str()) == Some("json") {
                paths.push(path);
            }
        }
        paths.sort();

        let records = paths.iter().map(|path| load_document(path)).collect::<Result<Vec<_>, _>>()?;
        info!("Loaded {} node documents from {:?}", records.len(), self.root);
        Ok(records)
    }
}

impl NodeSource for DirectorySource {
    fn search(&self, index: &str, pattern: &str) -> Result<Vec<RawNodeRecord>, FetchError> {
        ensure_node_index(index)?;
        let query = Query::parse(pattern)?;
        let found: Vec<RawNodeRecord> = self
            .load_all()?
            .into_iter()
            .filter(|record| query.matches(record))
            .collect();
        debug!("Search '{}' matched {} nodes in {:?}", pattern, found.len(), self.root);
        Ok(found)
    }
}

fn load_document(path: &Path) -> Result<RawNodeRecord, FetchError> {
    let content = fs::read_to_string(path).map_err(|source| FetchError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let document: Value = serde_json::from_str(&content).map_err(|source| FetchError::Parse {
        path: path.to_path_buf(),
        source,
    })?;

    let fallback_name = path
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or_default();
    record_from_document(document, fallback_name).map_err(|reason| FetchError::Malformed {
        path: path.to_path_buf(),
        reason,
    })
}

/// Build a record from one node document
pub fn record_from_document(document: Value, fallback_name: &str) -> Result<RawNodeRecord, String> {
    let Value::Object(mut document) = document else {
        return Err("node document is not a JSON object".to_string());
    };

    let name = match document.remove("name") {
        Some(Value::String(name)) => name,
        _ => fallback_name.to_string(),
    };
    let chef_environment = match document.remove("chef_environment") {
        Some(Value::String(env)) => Some(env),
        _ => None,
    };
    let run_list = match document.remove("run_list") {
        Some(Value::Array(entries)) => Some(RunList::from_entries(
            entries.iter().filter_map(Value::as_str),
        )),
        Some(Value::Null) | None => None,
        Some(_) => return Err("run_list must be a list".to_string()),
    };

    let layered = ATTRIBUTE_LAYERS.iter().any(|layer| document.contains_key(*layer));
    let attributes = if layered {
        let mut merged = Map::new();
        for layer in ATTRIBUTE_LAYERS {
            if let Some(Value::Object(attrs)) = document.get(layer) {
                deep_merge(&mut merged, attrs);
            }
        }
        merged
    } else {
        document
            .into_iter()
            .filter(|(key, _)| !RESERVED_KEYS.contains(&key.as_str()))
            .collect()
    };

    Ok(RawNodeRecord {
        name,
        chef_environment,
        run_list,
        attributes,
    })
}

/// Overlay wins, except that nested mappings merge key by key
fn deep_merge(base: &mut Map<String, Value>, overlay: &Map<String, Value>) {
    for (key, value) in overlay {
        match (base.get_mut(key), value) {
            (Some(Value::Object(existing)), Value::Object(incoming)) => deep_merge(existing, incoming),
            _ => {
                base.insert(key.clone(), value.clone());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::NODE_INDEX;
    use serde_json::json;

    #[test]
    fn test_layers_merge_with_precedence() {
        let document = json!({
            "name": "app1",
            "chef_environment": "prod",
            "run_list": ["role[app]"],
            "default": { "ntp": { "server": "pool", "burst": true }, "tier": "gold" },
            "normal": { "ntp": { "server": "ntp1" } },
            "override": { "tier": "platinum" },
            "automatic": { "fqdn": "app1.example.com", "tier": "auto" }
        });
        let record = record_from_document(document, "ignored").unwrap();

        assert_eq!(record.name, "app1");
        assert_eq!(record.chef_environment.as_deref(), Some("prod"));
        assert_eq!(record.run_list.unwrap().roles(), vec!["app"]);
        assert_eq!(record.attributes["ntp"], json!({ "server": "ntp1", "burst": true }));
        assert_eq!(record.attributes["tier"], json!("auto"));
        assert_eq!(record.attributes["fqdn"], json!("app1.example.com"));
    }

    #[test]
    fn test_flat_document_keeps_non_reserved_keys() {
        let document = json!({ "json_class": "Chef::Node", "fqdn": "a.example.com", "ipaddress": "10.0.0.1" });
        let record = record_from_document(document, "a").unwrap();
        assert_eq!(record.name, "a");
        assert_eq!(record.run_list, None);
        assert_eq!(record.attributes.len(), 2);
        assert!(!record.has_key("json_class"));
    }

    #[test]
    fn test_non_object_document_is_malformed() {
        assert!(record_from_document(json!([1, 2]), "x").is_err());
        assert!(record_from_document(json!({ "run_list": "role[x]" }), "x").is_err());
    }

    #[test]
    fn test_directory_search() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("b.json"), r#"{"name":"b","chef_environment":"prod","automatic":{}}"#).unwrap();
        fs::write(dir.path().join("a.json"), r#"{"name":"a","chef_environment":"prod","automatic":{}}"#).unwrap();
        fs::write(dir.path().join("c.json"), r#"{"name":"c","chef_environment":"dev","automatic":{}}"#).unwrap();
        fs::write(dir.path().join("notes.txt"), "not a node").unwrap();

        let source = DirectorySource::new(dir.path());
        let found = source.search(NODE_INDEX, "chef_environment:prod").unwrap();
        let names: Vec<&str> = found.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names, vec!["a", "b"]);
    }

    #[test]
    fn test_broken_document_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("bad.json"), "{ not json").unwrap();
        let err = DirectorySource::new(dir.path()).search(NODE_INDEX, "*:*").unwrap_err();
        assert!(matches!(err, FetchError::Parse { .. }));
    }

    #[test]
    fn test_missing_directory_is_fatal() {
        let err = DirectorySource::new("/nonexistent/nodes_db/nodes").load_all().unwrap_err();
        assert!(matches!(err, FetchError::Io { .. }));
    }
}
