//! Node Normalizer
//!
//! Maps one raw registry record onto the fixed descriptor schema. The mapping
//! is total: absent facts become null or empty defaults, never errors.

use indexmap::IndexMap;
use serde_json::Value;

use super::descriptor::{CloudPlacement, NodeDescriptor};
use super::record::RawNodeRecord;
use crate::config::ConversionConfig;

const SWAP_FS_TYPE: &str = "swap";
const DEVICE_PREFIX: &str = "/dev";

/// Build the descriptor for a single node
pub fn normalize(raw: &RawNodeRecord, config: &ConversionConfig) -> NodeDescriptor {
    let (recipes, roles) = match &raw.run_list {
        Some(run_list) => (run_list.recipes(), run_list.roles()),
        None => (Vec::new(), Vec::new()),
    };

    let (node_region, cloud) = match cloud_placement(raw) {
        Some((region, placement)) => (region, Some(placement)),
        None => (None, None),
    };

    NodeDescriptor {
        nodename: raw.attr_or_null("fqdn"),
        // The slot is claimed by the IP address first, but the hostname fact
        // always overwrites it, so only the fact survives.
        hostname: raw.attr_or_null("hostname"),
        os_version: raw.attr_or_null("platform_version"),
        os_family: raw.attr_or_null("platform_family"),
        os_name: raw.attr_or_null(config.os_name_key()),
        os_arch: raw.attr_or_null("machine"),
        username: config.username.clone(),
        description: None,
        machine: raw.attr_or_null("machine"),
        ipaddress: raw.attr_or_null("ipaddress"),
        ip6address: raw.attr_or_null("ip6address"),
        chef_environment: raw.chef_environment.clone(),
        environment: raw.chef_environment.clone(),
        recipes,
        roles,
        fqdn: raw.attr_or_null("fqdn"),
        domain: raw.attr_or_null("domain"),
        kernel_machine: raw.path_or_null(&["kernel", "machine"]),
        kernel_os: raw.path_or_null(&["kernel", "os"]),
        kernel_release: raw.path_or_null(&["kernel", "release"]),
        os: raw.attr_or_null("os"),
        platform: raw.attr_or_null("platform"),
        platform_version: raw.attr_or_null("platform_version"),
        tags: flatten_tags(raw.attr("tags")),
        disks: raw.attr("filesystem").map(mounted_devices),
        memory: memory_total(raw),
        cpu: cpu_total(raw),
        node_region,
        cloud,
        extra: dynamic_attributes(raw, config),
    }
}

/// `tags` as a flat list; a mapping contributes its key/value pairs
fn flatten_tags(tags: Option<&Value>) -> Vec<Value> {
    let mut out = Vec::new();
    match tags {
        None | Some(Value::Null) => {}
        Some(Value::Object(map)) => {
            for (key, value) in map {
                out.push(Value::String(key.clone()));
                flatten_into(value, &mut out);
            }
        }
        Some(other) => flatten_into(other, &mut out),
    }
    out
}

/// Deep-flatten nested lists; scalars and mappings are kept whole
pub(crate) fn flatten_into(value: &Value, out: &mut Vec<Value>) {
    match value {
        Value::Array(items) => items.iter().for_each(|item| flatten_into(item, out)),
        other => out.push(other.clone()),
    }
}

fn mounted_devices(filesystem: &Value) -> Vec<String> {
    let Some(devices) = filesystem.as_object() else {
        return Vec::new();
    };

    devices
        .iter()
        .filter(|(device, info)| {
            let Some(info) = info.as_object() else {
                return false;
            };
            device.starts_with(DEVICE_PREFIX)
                && info.get("fs_type").and_then(Value::as_str) != Some(SWAP_FS_TYPE)
                && info.contains_key("mount")
        })
        .map(|(device, _)| device.clone())
        .collect()
}

/// `memory.total` with every non-digit stripped, in units of 1024
fn memory_total(raw: &RawNodeRecord) -> u64 {
    let total = match raw.path(&["memory", "total"]) {
        None | Some(Value::Null) | Some(Value::Bool(false)) => return 0,
        Some(Value::String(text)) => text.clone(),
        Some(other) => other.to_string(),
    };

    let amount = total
        .chars()
        .filter_map(|c| c.to_digit(10))
        .fold(0u64, |acc, digit| acc.saturating_mul(10).saturating_add(u64::from(digit)));
    amount / 1024
}

fn cpu_total(raw: &RawNodeRecord) -> Value {
    match raw.attr("cpu") {
        None | Some(Value::Null) | Some(Value::Bool(false)) => Value::from(0),
        Some(_) => raw.path_or_null(&["cpu", "total"]),
    }
}

/// Region and placement from the EC2 metadata block, if any
fn cloud_placement(raw: &RawNodeRecord) -> Option<(Option<String>, CloudPlacement)> {
    let ec2 = raw.attr("ec2")?.as_object()?;
    let field = |key: &str| ec2.get(key).cloned().unwrap_or(Value::Null);

    let zone = field("placement_availability_zone");
    let region = zone.as_str().map(|zone| {
        let mut region = zone.to_string();
        region.pop();
        region
    });

    let wan_address = match ec2.get("public_ipv4") {
        None | Some(Value::Null) => String::new(),
        Some(Value::String(address)) => address.clone(),
        Some(other) => other.to_string(),
    };

    Some((
        region,
        CloudPlacement {
            node_id: field("instance_id"),
            node_type: field("instance_type"),
            node_zone: zone,
            node_wan_address: wan_address,
        },
    ))
}

fn dynamic_attributes(raw: &RawNodeRecord, config: &ConversionConfig) -> IndexMap<String, Value> {
    let mut extra = IndexMap::new();

    if let Some(cluster) = &config.cluster_attribute {
        extra.insert(cluster.clone(), raw.attr_or_null(cluster));
    }

    if let Some(application) = &config.application_attribute {
        match raw.attr(application) {
            Some(Value::String(name)) => {
                extra.insert(application.clone(), Value::String(name.clone()));
            }
            Some(list @ Value::Array(_)) => {
                let mut flat = Vec::new();
                flatten_into(list, &mut flat);
                extra.insert(application.clone(), Value::Array(flat));
            }
            _ => {}
        }
    }

    extra
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::record::RunList;
    use serde_json::json;

    fn config() -> ConversionConfig {
        ConversionConfig::new("production")
    }

    fn full_record() -> RawNodeRecord {
        RawNodeRecord::new("web1")
            .with_environment("production")
            .with_run_list(RunList::from_entries(["recipe[base]", "role[web]"]))
            .with_attribute("fqdn", "web1.example.com")
            .with_attribute("hostname", "web1")
            .with_attribute("domain", "example.com")
            .with_attribute("ipaddress", "10.0.0.5")
            .with_attribute("ip6address", "fe80::1")
            .with_attribute("machine", "x86_64")
            .with_attribute("os", "linux")
            .with_attribute("platform", "ubuntu")
            .with_attribute("platform_family", "debian")
            .with_attribute("platform_version", "22.04")
            .with_attribute("kernel", json!({ "machine": "x86_64", "os": "GNU/Linux", "release": "5.15.0" }))
            .with_attribute("memory", json!({ "total": "16384000 kB" }))
            .with_attribute("cpu", json!({ "total": 4 }))
            .with_attribute("tags", json!(["frontend", ["blue", "green"]]))
    }

    #[test]
    fn test_identity_and_platform_fields() {
        let descriptor = normalize(&full_record(), &config());

        assert_eq!(descriptor.nodename, json!("web1.example.com"));
        assert_eq!(descriptor.hostname, json!("web1"));
        assert_eq!(descriptor.fqdn, json!("web1.example.com"));
        assert_eq!(descriptor.os_version, json!("22.04"));
        assert_eq!(descriptor.os_family, json!("debian"));
        assert_eq!(descriptor.os_arch, json!("x86_64"));
        assert_eq!(descriptor.username, "rundeck");
        assert_eq!(descriptor.description, None);
        assert_eq!(descriptor.chef_environment.as_deref(), Some("production"));
        assert_eq!(descriptor.environment, descriptor.chef_environment);
        assert_eq!(descriptor.recipes, vec!["base"]);
        assert_eq!(descriptor.roles, vec!["web"]);
        assert_eq!(descriptor.kernel_release, json!("5.15.0"));
        assert_eq!(descriptor.memory, 16000);
        assert_eq!(descriptor.cpu, json!(4));
        assert_eq!(descriptor.tags, vec![json!("frontend"), json!("blue"), json!("green")]);
    }

    #[test]
    fn test_hostname_is_the_fact_not_the_ip() {
        let record = RawNodeRecord::new("n").with_attribute("ipaddress", "10.1.1.1");
        let descriptor = normalize(&record, &config());
        assert_eq!(descriptor.hostname, Value::Null);
        assert_eq!(descriptor.ipaddress, json!("10.1.1.1"));
    }

    #[test]
    fn test_os_name_reads_literal_key_by_default() {
        let record = full_record().with_attribute("paltform", "legacy");
        assert_eq!(normalize(&record, &config()).os_name, json!("legacy"));
        assert_eq!(normalize(&full_record(), &config()).os_name, Value::Null);

        let switched = config().with_os_name_from_platform(true);
        assert_eq!(normalize(&full_record(), &switched).os_name, json!("ubuntu"));
    }

    #[test]
    fn test_empty_record_fills_every_fixed_key() {
        let descriptor = normalize(&RawNodeRecord::new("bare"), &config());
        let map = descriptor.to_map();

        for key in [
            "nodename", "hostname", "osVersion", "osFamily", "osName", "osArch", "username",
            "description", "machine", "ipaddress", "ip6address", "chef_environment", "environment",
            "recipes", "roles", "fqdn", "domain", "kernel_machine", "kernel_os", "kernel_release",
            "os", "platform", "platform_version", "tags", "disks", "memory", "cpu", "node_region",
        ] {
            assert!(map.contains_key(key), "missing key {}", key);
        }
        assert_eq!(map["recipes"], json!([]));
        assert_eq!(map["tags"], json!([]));
        assert_eq!(map["disks"], Value::Null);
        assert_eq!(map["memory"], json!(0));
        assert_eq!(map["cpu"], json!(0));
        assert_eq!(map["kernel_os"], Value::Null);
        assert!(!map.contains_key("node_id"));
    }

    #[test]
    fn test_disks_distinguish_no_data_from_no_match() {
        let none = normalize(&RawNodeRecord::new("a"), &config());
        assert_eq!(none.disks, None);

        let unmatched = RawNodeRecord::new("b").with_attribute(
            "filesystem",
            json!({
                "tmpfs": { "fs_type": "tmpfs", "mount": "/run" },
                "/dev/sdb1": { "fs_type": "swap", "mount": "none" },
                "/dev/sdc1": { "fs_type": "ext4" }
            }),
        );
        assert_eq!(normalize(&unmatched, &config()).disks, Some(vec![]));

        let matched = RawNodeRecord::new("c").with_attribute(
            "filesystem",
            json!({
                "/dev/sda1": { "fs_type": "ext4", "mount": "/" },
                "/dev/sda2": { "fs_type": "swap", "mount": "none" },
                "/dev/mapper/data": { "fs_type": "xfs", "mount": "/data" }
            }),
        );
        let mut disks = normalize(&matched, &config()).disks.unwrap();
        disks.sort();
        assert_eq!(disks, vec!["/dev/mapper/data", "/dev/sda1"]);
    }

    #[test]
    fn test_memory_parse_edge_cases() {
        let with_total = |total: Value| {
            let record = RawNodeRecord::new("m").with_attribute("memory", json!({ "total": total }));
            normalize(&record, &config()).memory
        };
        assert_eq!(with_total(json!("2048kB")), 2);
        assert_eq!(with_total(json!("1023 kB")), 0);
        assert_eq!(with_total(json!("kB")), 0);
        assert_eq!(with_total(json!(4096)), 4);
        assert_eq!(with_total(Value::Null), 0);

        let no_total = RawNodeRecord::new("m").with_attribute("memory", json!({ "free": "10 kB" }));
        assert_eq!(normalize(&no_total, &config()).memory, 0);
    }

    #[test]
    fn test_falsy_cpu_block_is_zero() {
        let record = RawNodeRecord::new("c").with_attribute("cpu", false);
        assert_eq!(normalize(&record, &config()).cpu, json!(0));
        let record = RawNodeRecord::new("c").with_attribute("cpu", Value::Null);
        assert_eq!(normalize(&record, &config()).cpu, json!(0));
    }

    #[test]
    fn test_cpu_block_without_total_is_null() {
        let record = RawNodeRecord::new("c").with_attribute("cpu", json!({ "real": 2 }));
        assert_eq!(normalize(&record, &config()).cpu, Value::Null);
    }

    #[test]
    fn test_cloud_placement() {
        let record = full_record().with_attribute(
            "ec2",
            json!({
                "placement_availability_zone": "us-east-1a",
                "instance_id": "i-0abc",
                "instance_type": "m5.large",
                "public_ipv4": "54.1.2.3"
            }),
        );
        let map = normalize(&record, &config()).to_map();
        assert_eq!(map["node_region"], json!("us-east-1"));
        assert_eq!(map["node_zone"], json!("us-east-1a"));
        assert_eq!(map["node_id"], json!("i-0abc"));
        assert_eq!(map["node_type"], json!("m5.large"));
        assert_eq!(map["node_wan_address"], json!("54.1.2.3"));

        let keys: Vec<&str> = map.keys().map(String::as_str).collect();
        let region_at = keys.iter().position(|k| *k == "node_region").unwrap();
        assert_eq!(&keys[region_at..], ["node_region", "node_id", "node_type", "node_zone", "node_wan_address"]);
    }

    #[test]
    fn test_cloud_without_public_address_stringifies_to_empty() {
        let record = RawNodeRecord::new("vpc").with_attribute("ec2", json!({ "instance_id": "i-1" }));
        let descriptor = normalize(&record, &config());
        assert_eq!(descriptor.node_region, None);
        let cloud = descriptor.cloud.unwrap();
        assert_eq!(cloud.node_wan_address, "");
        assert_eq!(cloud.node_zone, Value::Null);
    }

    #[test]
    fn test_no_cloud_block_omits_cloud_keys() {
        let descriptor = normalize(&full_record(), &config());
        assert!(descriptor.contains_key("node_region"));
        assert_eq!(descriptor.get("node_region"), Some(Value::Null));
        for key in ["node_id", "node_type", "node_zone", "node_wan_address"] {
            assert!(!descriptor.contains_key(key));
        }
    }

    #[test]
    fn test_cluster_attribute_always_present_when_configured() {
        let cfg = config().with_cluster_attribute("cluster");
        let descriptor = normalize(&full_record(), &cfg);
        assert_eq!(descriptor.get("cluster"), Some(Value::Null));

        let record = full_record().with_attribute("cluster", json!({ "name": "east" }));
        assert_eq!(normalize(&record, &cfg).get("cluster"), Some(json!({ "name": "east" })));
    }

    #[test]
    fn test_application_attribute_only_for_strings_and_lists() {
        let cfg = config().with_application_attribute("apps");

        let as_string = full_record().with_attribute("apps", "billing");
        assert_eq!(normalize(&as_string, &cfg).get("apps"), Some(json!("billing")));

        let as_list = full_record().with_attribute("apps", json!(["billing", ["search"]]));
        assert_eq!(normalize(&as_list, &cfg).get("apps"), Some(json!(["billing", "search"])));

        let as_number = full_record().with_attribute("apps", 3);
        assert!(!normalize(&as_number, &cfg).contains_key("apps"));
        assert!(!normalize(&full_record(), &cfg).contains_key("apps"));
    }

    #[test]
    fn test_dynamic_key_replaces_fixed_key_in_place() {
        let cfg = config().with_cluster_attribute("domain");
        let record = full_record().with_attribute("domain", "corp.example.com");
        let map = normalize(&record, &cfg).to_map();
        let keys: Vec<&String> = map.keys().collect();
        assert_eq!(keys.iter().filter(|k| k.as_str() == "domain").count(), 1);
        assert_eq!(map["domain"], json!("corp.example.com"));
        assert_eq!(map.get_index_of("domain"), Some(16));
    }

    #[test]
    fn test_tags_mapping_flattens_to_pairs() {
        assert_eq!(flatten_tags(Some(&json!({ "team": "ops" }))), vec![json!("team"), json!("ops")]);
        assert_eq!(flatten_tags(Some(&json!("solo"))), vec![json!("solo")]);
        assert!(flatten_tags(Some(&Value::Null)).is_empty());
    }
}
