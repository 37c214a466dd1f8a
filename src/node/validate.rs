//! Required-field checks for descriptors.

use serde_json::Value;

use super::descriptor::NodeDescriptor;
use crate::config::ConversionConfig;
use crate::error::ValidationError;

const REQUIRED_FIELDS: [&str; 3] = ["hostname", "fqdn", "ipaddress"];

/// Null, absent and `""` are empty; zero, `false` and `[]` are not.
pub fn is_present(value: Option<&Value>) -> bool {
    match value {
        None | Some(Value::Null) => false,
        Some(Value::String(text)) => !text.is_empty(),
        Some(_) => true,
    }
}

/// Fails on the first required field that is empty
pub fn validate(descriptor: &NodeDescriptor, config: &ConversionConfig) -> Result<(), ValidationError> {
    let mut fields: Vec<&str> = REQUIRED_FIELDS.to_vec();
    fields.extend(config.cluster_attribute.as_deref());
    fields.extend(config.application_attribute.as_deref());

    for field in fields {
        if !is_present(descriptor.get(field).as_ref()) {
            return Err(ValidationError::MissingField {
                node: match descriptor.identity() {
                    name if name.is_empty() => None,
                    name => Some(name),
                },
                field: field.to_string(),
            });
        }
    }
    Ok(())
}
