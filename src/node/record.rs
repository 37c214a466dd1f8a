//! Raw Node Records
//!
//! A node as the registry hands it over: name, environment, run-list and a
//! bag of merged attributes with no fixed shape. Every accessor is tolerant,
//! so a missing or mistyped branch reads as absent instead of failing.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

/// One entry of a run-list
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum RunListItem {
    Recipe(String),
    Role(String),
}

impl RunListItem {
    /// Parse `recipe[name]`, `role[name]` or a bare recipe name
    pub fn parse(entry: &str) -> Self {
        let entry = entry.trim();
        if let Some(name) = bracketed(entry, "role") {
            RunListItem::Role(name.to_string())
        } else if let Some(name) = bracketed(entry, "recipe") {
            RunListItem::Recipe(name.to_string())
        } else {
            RunListItem::Recipe(entry.to_string())
        }
    }

    pub fn name(&self) -> &str {
        match self {
            RunListItem::Recipe(name) | RunListItem::Role(name) => name,
        }
    }
}

fn bracketed<'a>(entry: &'a str, kind: &str) -> Option<&'a str> {
    entry
        .strip_prefix(kind)
        .and_then(|rest| rest.strip_prefix('['))
        .and_then(|rest| rest.strip_suffix(']'))
}

impl fmt::Display for RunListItem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RunListItem::Recipe(name) => write!(f, "recipe[{}]", name),
            RunListItem::Role(name) => write!(f, "role[{}]", name),
        }
    }
}

/// Ordered recipes and roles applied to a node
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "Vec<String>", into = "Vec<String>")]
pub struct RunList {
    items: Vec<RunListItem>,
}

impl RunList {
    pub fn new(items: Vec<RunListItem>) -> Self {
        Self { items }
    }

    pub fn from_entries<I, S>(entries: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            items: entries.into_iter().map(|e| RunListItem::parse(e.as_ref())).collect(),
        }
    }

    pub fn items(&self) -> &[RunListItem] {
        &self.items
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Recipe names in run-list order
    pub fn recipes(&self) -> Vec<String> {
        self.items
            .iter()
            .filter_map(|item| match item {
                RunListItem::Recipe(name) => Some(name.clone()),
                RunListItem::Role(_) => None,
            })
            .collect()
    }

    /// Role names in run-list order
    pub fn roles(&self) -> Vec<String> {
        self.items
            .iter()
            .filter_map(|item| match item {
                RunListItem::Role(name) => Some(name.clone()),
                RunListItem::Recipe(_) => None,
            })
            .collect()
    }
}

impl From<Vec<String>> for RunList {
    fn from(entries: Vec<String>) -> Self {
        RunList::from_entries(entries)
    }
}

impl From<RunList> for Vec<String> {
    fn from(run_list: RunList) -> Self {
        run_list.items.iter().map(|item| item.to_string()).collect()
    }
}

/// A node record as returned by the registry
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawNodeRecord {
    pub name: String,
    #[serde(default)]
    pub chef_environment: Option<String>,
    #[serde(default)]
    pub run_list: Option<RunList>,
    #[serde(default)]
    pub attributes: Map<String, Value>,
}

impl RawNodeRecord {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn with_environment(mut self, environment: impl Into<String>) -> Self {
        self.chef_environment = Some(environment.into());
        self
    }

    pub fn with_run_list(mut self, run_list: RunList) -> Self {
        self.run_list = Some(run_list);
        self
    }

    pub fn with_attribute(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.attributes.insert(key.into(), value.into());
        self
    }

    /// Whether the top-level attribute exists at all (even if null)
    pub fn has_key(&self, key: &str) -> bool {
        self.attributes.contains_key(key)
    }

    /// Top-level attribute lookup
    pub fn attr(&self, key: &str) -> Option<&Value> {
        self.attributes.get(key)
    }

    /// Nested lookup; absent as soon as a step is missing or not a mapping
    pub fn path(&self, keys: &[&str]) -> Option<&Value> {
        let (first, rest) = keys.split_first()?;
        rest.iter()
            .try_fold(self.attributes.get(*first)?, |value, key| value.as_object()?.get(*key))
    }

    /// Top-level attribute, null when absent
    pub fn attr_or_null(&self, key: &str) -> Value {
        self.attr(key).cloned().unwrap_or(Value::Null)
    }

    /// Nested attribute, null when absent
    pub fn path_or_null(&self, keys: &[&str]) -> Value {
        self.path(keys).cloned().unwrap_or(Value::Null)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_run_list_decomposition() {
        let run_list = RunList::from_entries(["recipe[base]", "role[web]", "nginx::default", "role[monitoring]"]);
        assert_eq!(run_list.recipes(), vec!["base", "nginx::default"]);
        assert_eq!(run_list.roles(), vec!["web", "monitoring"]);
    }

    #[test]
    fn test_run_list_serializes_as_strings() {
        let run_list = RunList::from_entries(["role[db]", "mysql"]);
        let value = serde_json::to_value(&run_list).unwrap();
        assert_eq!(value, json!(["role[db]", "recipe[mysql]"]));

        let back: RunList = serde_json::from_value(value).unwrap();
        assert_eq!(back, run_list);
    }

    #[test]
    fn test_nested_lookup_tolerates_missing_branches() {
        let record = RawNodeRecord::new("n1")
            .with_attribute("kernel", json!({ "machine": "x86_64" }))
            .with_attribute("memory", json!("not a mapping"));

        assert_eq!(record.path(&["kernel", "machine"]), Some(&json!("x86_64")));
        assert_eq!(record.path(&["kernel", "release"]), None);
        assert_eq!(record.path(&["memory", "total"]), None);
        assert_eq!(record.path(&["cpu", "total"]), None);
        assert_eq!(record.path(&[]), None);
        assert_eq!(record.path_or_null(&["ec2", "instance_id"]), Value::Null);
    }

    #[test]
    fn test_has_key_sees_explicit_null() {
        let record = RawNodeRecord::new("n1").with_attribute("ec2", Value::Null);
        assert!(record.has_key("ec2"));
        assert_eq!(record.attr_or_null("ec2"), Value::Null);
        assert!(!record.has_key("gce"));
    }
}
