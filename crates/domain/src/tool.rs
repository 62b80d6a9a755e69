use serde::{Deserialize, Serialize};

/// Tool call as requested by a backend (provider-agnostic).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    pub call_id: String,
    pub tool_name: String,
    pub arguments: serde_json::Value,
}

/// Tool definition exposed to the backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    /// JSON Schema for the tool's parameters.
    pub parameters: serde_json::Value,
}

/// Parse streamed tool-call arguments.
///
/// Backends sometimes send an empty string for no-argument calls, and
/// occasionally malformed JSON. Both become an empty object.
pub fn parse_tool_arguments(raw: &str) -> serde_json::Value {
    let raw = raw.trim();
    if raw.is_empty() {
        return serde_json::Value::Object(Default::default());
    }
    match serde_json::from_str(raw) {
        Ok(v @ serde_json::Value::Object(_)) => v,
        Ok(other) => {
            tracing::warn!(arguments = %other, "tool arguments are not an object, using {{}}");
            serde_json::Value::Object(Default::default())
        }
        Err(e) => {
            tracing::warn!(error = %e, arguments = %raw, "malformed tool arguments, using {{}}");
            serde_json::Value::Object(Default::default())
        }
    }
}
