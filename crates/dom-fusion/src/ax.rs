//! Flattens `Accessibility.getFullAXTree` into records keyed by backend
//! node id. The AX tree's own hierarchy is discarded: structure comes from
//! the DOM, the AX payload only contributes role, name, and state.

use std::collections::HashMap;

use serde_json::Value;

use pagelens_core_types::BackendNodeId;

use crate::error::FusionError;
use crate::model::{AxProperty, AxRecord};

pub fn parse_ax_tree(raw: &Value) -> Result<HashMap<BackendNodeId, AxRecord>, FusionError> {
    let nodes = raw
        .get("nodes")
        .and_then(Value::as_array)
        .ok_or_else(|| FusionError::malformed("ax tree missing nodes"))?;

    let mut lookup = HashMap::with_capacity(nodes.len());
    for node in nodes {
        let Some(backend) = node.get("backendDOMNodeId").and_then(Value::as_u64) else {
            continue;
        };
        let record = AxRecord {
            role: ax_value(node.get("role")),
            name: ax_value(node.get("name")).filter(|n| !n.is_empty()),
            description: ax_value(node.get("description")).filter(|d| !d.is_empty()),
            ignored: node.get("ignored").and_then(Value::as_bool).unwrap_or(false),
            properties: node
                .get("properties")
                .and_then(Value::as_array)
                .map(|props| {
                    props
                        .iter()
                        .filter_map(|p| {
                            let name = p.get("name")?.as_str()?.to_string();
                            let value = p.get("value")?.get("value")?.clone();
                            Some(AxProperty { name, value })
                        })
                        .collect()
                })
                .unwrap_or_default(),
        };
        // The first record for a backend id wins; later duplicates come
        // from ignored wrapper generations.
        lookup.entry(BackendNodeId(backend)).or_insert(record);
    }
    Ok(lookup)
}

fn ax_value(field: Option<&Value>) -> Option<String> {
    field?
        .get("value")
        .and_then(Value::as_str)
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn joins_role_name_and_properties_by_backend_id() {
        let raw = json!({
            "nodes": [
                {
                    "nodeId": "1",
                    "backendDOMNodeId": 42,
                    "ignored": false,
                    "role": { "type": "role", "value": "button" },
                    "name": { "type": "computedString", "value": "Submit order" },
                    "properties": [
                        { "name": "focusable", "value": { "type": "booleanOrUndefined", "value": true } },
                        { "name": "disabled", "value": { "type": "booleanOrUndefined", "value": false } }
                    ]
                },
                { "nodeId": "2", "ignored": true, "role": { "value": "none" } }
            ]
        });
        let lookup = parse_ax_tree(&raw).expect("parse");
        assert_eq!(lookup.len(), 1);
        let record = &lookup[&BackendNodeId(42)];
        assert_eq!(record.role.as_deref(), Some("button"));
        assert_eq!(record.name.as_deref(), Some("Submit order"));
        assert_eq!(record.bool_property("focusable"), Some(true));
        assert_eq!(record.bool_property("disabled"), Some(false));
    }

    #[test]
    fn empty_names_become_none() {
        let raw = json!({
            "nodes": [{
                "backendDOMNodeId": 7,
                "role": { "value": "generic" },
                "name": { "value": "" }
            }]
        });
        let lookup = parse_ax_tree(&raw).expect("parse");
        assert_eq!(lookup[&BackendNodeId(7)].name, None);
    }
}
