//! Tool descriptors as advertised by a worker's `tools/list`.

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

/// A tool a worker can execute.
///
/// `input_schema` is forwarded to providers verbatim and never interpreted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolDescriptor {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default = "empty_object_schema")]
    pub input_schema: Value,
}

fn empty_object_schema() -> Value {
    json!({ "type": "object", "properties": {} })
}

impl ToolDescriptor {
    pub fn new(name: impl Into<String>, description: impl Into<String>, input_schema: Value) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            input_schema,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deserializes_worker_catalog_entry() {
        let raw = json!({
            "name": "roll_dice",
            "description": "Roll dice using standard notation",
            "inputSchema": {"type": "object", "properties": {"expression": {"type": "string"}}}
        });
        let tool: ToolDescriptor = serde_json::from_value(raw).unwrap();
        assert_eq!(tool.name, "roll_dice");
        assert_eq!(tool.input_schema["properties"]["expression"]["type"], "string");
    }

    #[test]
    fn missing_schema_defaults_to_empty_object() {
        let tool: ToolDescriptor = serde_json::from_value(json!({"name": "end_turn"})).unwrap();
        assert_eq!(tool.description, "");
        assert_eq!(tool.input_schema["type"], "object");
    }
}
