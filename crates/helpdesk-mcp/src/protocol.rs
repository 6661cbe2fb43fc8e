//! JSON-RPC 2.0 message shapes for the MCP stdio transport.

use helpdesk_ai::ToolDescriptor;
use serde_json::{json, Value};

pub(crate) const PROTOCOL_VERSION: &str = "2024-11-05";
pub(crate) const CLIENT_NAME: &str = "helpdesk";

/// Build a request with the given id.
pub(crate) fn request(id: u64, method: &str, params: Value) -> Value {
    json!({
        "jsonrpc": "2.0",
        "id": id,
        "method": method,
        "params": params,
    })
}

/// Build a notification (no id, no response expected).
pub(crate) fn notification(method: &str) -> Value {
    json!({
        "jsonrpc": "2.0",
        "method": method,
    })
}

pub(crate) fn initialize_params() -> Value {
    json!({
        "protocolVersion": PROTOCOL_VERSION,
        "capabilities": {},
        "clientInfo": {
            "name": CLIENT_NAME,
            "version": env!("CARGO_PKG_VERSION"),
        },
    })
}

pub(crate) fn call_params(name: &str, args: &Value) -> Value {
    json!({
        "name": name,
        "arguments": args,
    })
}

/// Parse a `tools/list` result into descriptors.
///
/// A missing or malformed catalog is an empty list, not an error; entries
/// that do not deserialize are skipped.
pub(crate) fn parse_tool_catalog(result: &Value) -> Vec<ToolDescriptor> {
    let Some(entries) = result["tools"].as_array() else {
        return Vec::new();
    };
    entries
        .iter()
        .filter_map(|entry| serde_json::from_value(entry.clone()).ok())
        .collect()
}

/// Extract the first text-bearing content item from a `tools/call` result.
pub(crate) fn first_text_content(result: &Value) -> Option<String> {
    result["content"]
        .as_array()?
        .iter()
        .find_map(|item| item["text"].as_str())
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_catalog_with_entries() {
        let tools = parse_tool_catalog(&json!({
            "tools": [
                {"name": "search_docs", "description": "Search", "inputSchema": {"type": "object"}},
                {"name": "open_ticket", "description": "Open a ticket", "inputSchema": {}}
            ]
        }));
        assert_eq!(tools.len(), 2);
        assert_eq!(tools[0].name, "search_docs");
        assert_eq!(tools[1].name, "open_ticket");
    }

    #[test]
    fn malformed_catalog_is_empty() {
        assert!(parse_tool_catalog(&json!({})).is_empty());
        assert!(parse_tool_catalog(&json!({"tools": "nope"})).is_empty());
        assert!(parse_tool_catalog(&Value::Null).is_empty());
    }

    #[test]
    fn entries_missing_a_name_are_skipped() {
        let tools = parse_tool_catalog(&json!({
            "tools": [
                {"description": "nameless"},
                {"name": "search_docs"}
            ]
        }));
        assert_eq!(tools.len(), 1);
        assert_eq!(tools[0].name, "search_docs");
    }

    #[test]
    fn first_text_content_picks_first_text_item() {
        let result = json!({
            "content": [
                {"type": "image", "data": "..."},
                {"type": "text", "text": "Docs result"},
                {"type": "text", "text": "later"}
            ]
        });
        assert_eq!(first_text_content(&result), Some("Docs result".into()));
    }

    #[test]
    fn first_text_content_none_without_text() {
        assert_eq!(first_text_content(&json!({"content": []})), None);
        assert_eq!(first_text_content(&json!({})), None);
    }

    #[test]
    fn request_carries_id_and_method() {
        let req = request(7, "tools/list", json!({}));
        assert_eq!(req["jsonrpc"], "2.0");
        assert_eq!(req["id"], 7);
        assert_eq!(req["method"], "tools/list");
    }
}
