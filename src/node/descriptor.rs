//! Node Descriptors
//!
//! The flat record consumed by the job runner. The fixed schema lives in a
//! struct; cluster/application attributes live in an ordered side table and
//! are merged in when the descriptor is serialized.

use indexmap::IndexMap;
use serde::ser::{Serialize, SerializeMap, Serializer};
use serde_json::{json, Value};

/// Cloud placement keys, only emitted when the node carries cloud metadata
#[derive(Debug, Clone, PartialEq)]
pub struct CloudPlacement {
    pub node_id: Value,
    pub node_type: Value,
    pub node_zone: Value,
    pub node_wan_address: String,
}

/// Normalized node, ready for the resource file
#[derive(Debug, Clone, PartialEq)]
pub struct NodeDescriptor {
    pub nodename: Value,
    pub hostname: Value,
    pub os_version: Value,
    pub os_family: Value,
    pub os_name: Value,
    pub os_arch: Value,
    pub username: String,
    pub description: Option<String>,
    pub machine: Value,
    pub ipaddress: Value,
    pub ip6address: Value,
    pub chef_environment: Option<String>,
    pub environment: Option<String>,
    pub recipes: Vec<String>,
    pub roles: Vec<String>,
    pub fqdn: Value,
    pub domain: Value,
    pub kernel_machine: Value,
    pub kernel_os: Value,
    pub kernel_release: Value,
    pub os: Value,
    pub platform: Value,
    pub platform_version: Value,
    pub tags: Vec<Value>,
    /// `None` when the node reported no filesystem data at all
    pub disks: Option<Vec<String>>,
    pub memory: u64,
    pub cpu: Value,
    pub node_region: Option<String>,
    pub cloud: Option<CloudPlacement>,
    /// Dynamically named keys (cluster/application attributes)
    pub extra: IndexMap<String, Value>,
}

impl NodeDescriptor {
    /// Fixed-schema keys in output order
    fn fixed_fields(&self) -> Vec<(&'static str, Value)> {
        let mut fields = vec![
            ("nodename", self.nodename.clone()),
            ("hostname", self.hostname.clone()),
            ("osVersion", self.os_version.clone()),
            ("osFamily", self.os_family.clone()),
            ("osName", self.os_name.clone()),
            ("osArch", self.os_arch.clone()),
            ("username", json!(self.username)),
            ("description", json!(self.description)),
            ("machine", self.machine.clone()),
            ("ipaddress", self.ipaddress.clone()),
            ("ip6address", self.ip6address.clone()),
            ("chef_environment", json!(self.chef_environment)),
            ("environment", json!(self.environment)),
            ("recipes", json!(self.recipes)),
            ("roles", json!(self.roles)),
            ("fqdn", self.fqdn.clone()),
            ("domain", self.domain.clone()),
            ("kernel_machine", self.kernel_machine.clone()),
            ("kernel_os", self.kernel_os.clone()),
            ("kernel_release", self.kernel_release.clone()),
            ("os", self.os.clone()),
            ("platform", self.platform.clone()),
            ("platform_version", self.platform_version.clone()),
            ("tags", Value::Array(self.tags.clone())),
            ("disks", json!(self.disks)),
            ("memory", json!(self.memory)),
            ("cpu", self.cpu.clone()),
            ("node_region", json!(self.node_region)),
        ];

        if let Some(cloud) = &self.cloud {
            fields.push(("node_id", cloud.node_id.clone()));
            fields.push(("node_type", cloud.node_type.clone()));
            fields.push(("node_zone", cloud.node_zone.clone()));
            fields.push(("node_wan_address", json!(cloud.node_wan_address)));
        }

        fields
    }

    /// Ordered key/value view; dynamic keys replace fixed keys of the same name in place
    pub fn to_map(&self) -> IndexMap<String, Value> {
        let mut map: IndexMap<String, Value> = self
            .fixed_fields()
            .into_iter()
            .map(|(key, value)| (key.to_string(), value))
            .collect();
        for (key, value) in &self.extra {
            map.insert(key.clone(), value.clone());
        }
        map
    }

    /// Value of an output key, `None` if the key is not emitted
    pub fn get(&self, key: &str) -> Option<Value> {
        if let Some(value) = self.extra.get(key) {
            return Some(value.clone());
        }
        self.fixed_fields()
            .into_iter()
            .find(|(name, _)| *name == key)
            .map(|(_, value)| value)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    /// Key under which the descriptor is stored in a result set
    pub fn identity(&self) -> String {
        match self.get("nodename") {
            Some(Value::String(name)) => name,
            Some(Value::Null) | None => String::new(),
            Some(other) => other.to_string(),
        }
    }
}

impl Serialize for NodeDescriptor {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let map = self.to_map();
        let mut out = serializer.serialize_map(Some(map.len()))?;
        for (key, value) in &map {
            out.serialize_entry(key, value)?;
        }
        out.end()
    }
}
