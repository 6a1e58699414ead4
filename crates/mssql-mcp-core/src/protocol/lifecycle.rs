//! MCP lifecycle messages: initialize handshake and capability advertisement.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Client -> server `initialize` request parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InitializeRequest {
    #[serde(rename = "protocolVersion")]
    pub protocol_version: String,
    #[serde(default)]
    pub capabilities: Value,
    #[serde(rename = "clientInfo", default)]
    pub client_info: Option<ClientInfo>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientInfo {
    pub name: String,
    #[serde(default)]
    pub version: Option<String>,
}

/// Server -> client `initialize` result.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InitializeResponse {
    #[serde(rename = "protocolVersion")]
    pub protocol_version: String,
    pub capabilities: ServerCapabilities,
    #[serde(rename = "serverInfo")]
    pub server_info: ServerInfo,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub instructions: Option<String>,
}

/// Capabilities this server advertises. Tools only; no resources or prompts.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ServerCapabilities {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tools: Option<ToolsCapability>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ToolsCapability {
    #[serde(rename = "listChanged", skip_serializing_if = "Option::is_none")]
    pub list_changed: Option<bool>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerInfo {
    pub name: String,
    pub version: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn initialize_request_parses_minimal_payload() {
        let raw = r#"{"protocolVersion":"2025-06-18","capabilities":{}}"#;
        let req: InitializeRequest = serde_json::from_str(raw).unwrap();
        assert_eq!(req.protocol_version, "2025-06-18");
        assert!(req.client_info.is_none());
    }

    #[test]
    fn initialize_response_serializes_camel_case() {
        let resp = InitializeResponse {
            protocol_version: crate::protocol::PROTOCOL_VERSION.to_string(),
            capabilities: ServerCapabilities {
                tools: Some(ToolsCapability {
                    list_changed: Some(false),
                }),
            },
            server_info: ServerInfo {
                name: "mssql-mcp-server".to_string(),
                version: "0.4.1".to_string(),
                description: None,
            },
            instructions: None,
        };
        let text = serde_json::to_string(&resp).unwrap();
        assert!(text.contains("protocolVersion"));
        assert!(text.contains("serverInfo"));
        assert!(text.contains("listChanged"));
    }
}
