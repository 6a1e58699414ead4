//! Tool definitions and tool-call request/response types.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Tool definition advertised through `tools/list`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Tool {
    /// Tool name (unique identifier)
    pub name: String,

    /// Human-readable description
    pub description: String,

    /// JSON Schema for input parameters
    #[serde(rename = "inputSchema")]
    pub input_schema: Value,

    /// Optional tool annotations for behavior hints
    #[serde(skip_serializing_if = "Option::is_none")]
    pub annotations: Option<ToolAnnotations>,
}

impl Tool {
    pub fn new(name: impl Into<String>, description: impl Into<String>, input_schema: Value) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            input_schema,
            annotations: None,
        }
    }

    pub fn read_only(mut self) -> Self {
        self.annotations = Some(ToolAnnotations {
            read_only_hint: Some(true),
            destructive_hint: None,
        });
        self
    }

    pub fn destructive(mut self) -> Self {
        self.annotations = Some(ToolAnnotations {
            read_only_hint: Some(false),
            destructive_hint: Some(true),
        });
        self
    }
}

/// Behavior hints for clients.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ToolAnnotations {
    #[serde(rename = "readOnlyHint", skip_serializing_if = "Option::is_none")]
    pub read_only_hint: Option<bool>,

    #[serde(rename = "destructiveHint", skip_serializing_if = "Option::is_none")]
    pub destructive_hint: Option<bool>,
}

/// Tool call request (the `params` of `tools/call`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCall {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub arguments: Option<Value>,
}

/// Tool call response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolResult {
    pub content: Vec<ToolContent>,
    #[serde(rename = "isError", skip_serializing_if = "Option::is_none")]
    pub is_error: Option<bool>,
}

impl ToolResult {
    /// Successful result carrying one text body.
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            content: vec![ToolContent::Text { text: text.into() }],
            is_error: None,
        }
    }

    /// Successful result carrying a JSON object rendered as text.
    pub fn json(value: &Value) -> Self {
        let text = serde_json::to_string_pretty(value).unwrap_or_else(|_| "{}".to_string());
        Self::text(text)
    }

    /// Failed result; the message is the client-visible error string.
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            content: vec![ToolContent::Text {
                text: message.into(),
            }],
            is_error: Some(true),
        }
    }
}

/// Tool result content.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ToolContent {
    #[serde(rename = "text")]
    Text { text: String },
}

impl ToolContent {
    pub fn as_text(&self) -> &str {
        match self {
            ToolContent::Text { text } => text,
        }
    }
}

/// `tools/list` response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListToolsResponse {
    pub tools: Vec<Tool>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tool_serializes_input_schema_camel_case() {
        let tool = Tool::new(
            "list_databases",
            "List all databases on the server",
            serde_json::json!({"type": "object", "properties": {}}),
        )
        .read_only();
        let text = serde_json::to_string(&tool).unwrap();
        assert!(text.contains("inputSchema"));
        assert!(text.contains("readOnlyHint"));
    }

    #[test]
    fn error_result_sets_is_error() {
        let result = ToolResult::error("Error: Database name cannot be empty");
        assert_eq!(result.is_error, Some(true));
        assert_eq!(
            result.content[0].as_text(),
            "Error: Database name cannot be empty"
        );
    }

    #[test]
    fn tool_call_parses_arguments() {
        let raw = r#"{"name":"execute_query","arguments":{"query":"SELECT 1"}}"#;
        let call: ToolCall = serde_json::from_str(raw).unwrap();
        assert_eq!(call.name, "execute_query");
        assert!(call.arguments.is_some());
    }
}
