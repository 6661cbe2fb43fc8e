//! Translation from provider tool schemas to the model's format.
//!
//! The model's function-calling contract rejects schema-metadata keys
//! that MCP servers routinely emit, so they are stripped here.

use crate::{AiTool, ToolDescriptor};

/// Top-level schema keys the Gemini function-declaration format does not accept.
const STRIPPED_KEYS: [&str; 2] = ["additionalProperties", "$schema"];

/// Convert a provider tool descriptor into a model-facing tool.
///
/// Drops the transport-only keys from the top level of the parameter
/// schema and passes everything else through untouched, which also makes
/// the translation idempotent.
pub fn to_model_tool(tool: &ToolDescriptor) -> AiTool {
    let parameters = match &tool.input_schema {
        serde_json::Value::Object(map) => serde_json::Value::Object(
            map.iter()
                .filter(|(key, _)| !STRIPPED_KEYS.contains(&key.as_str()))
                .map(|(key, value)| (key.clone(), value.clone()))
                .collect(),
        ),
        other => other.clone(),
    };

    AiTool {
        name: tool.name.clone(),
        description: tool.description.clone(),
        parameters,
    }
}
