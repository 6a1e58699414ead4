//! Canonical error types for the MSSQL MCP server.
//!
//! The hierarchy follows the protocol layering: [`ProtocolError`] covers
//! JSON-RPC and MCP lifecycle violations, [`ToolError`] covers tool lookup
//! and input validation, and [`McpError`] is the top-level type every public
//! API returns. Database-side failures live in `mssql-mcp-db` and are
//! rendered into tool *text* output rather than JSON-RPC errors, so they do
//! not appear here.

use thiserror::Error;

/// Canonical result type for protocol-level operations.
pub type McpResult<T> = Result<T, McpError>;

#[derive(Debug, Error)]
pub enum McpError {
    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    #[error("Tool error: {0}")]
    Tool(#[from] ToolError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Other(#[from] anyhow::Error),
}

impl McpError {
    pub fn invalid_params(msg: impl Into<String>) -> Self {
        Self::Protocol(ProtocolError::InvalidParams(msg.into()))
    }

    pub fn method_not_found(msg: impl Into<String>) -> Self {
        Self::Protocol(ProtocolError::MethodNotFound(msg.into()))
    }

    pub fn invalid_request(msg: impl Into<String>) -> Self {
        Self::Protocol(ProtocolError::InvalidRequest(msg.into()))
    }

    pub fn internal_error(msg: impl Into<String>) -> Self {
        Self::Protocol(ProtocolError::InternalError(msg.into()))
    }

    pub fn tool_not_found(name: impl Into<String>) -> Self {
        Self::Tool(ToolError::NotFound(name.into()))
    }
}

#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("Invalid JSON-RPC version: {0}")]
    InvalidVersion(String),

    #[error("Method not found: {0}")]
    MethodNotFound(String),

    #[error("Invalid parameters: {0}")]
    InvalidParams(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Internal error: {0}")]
    InternalError(String),

    #[error("Initialization failed: {0}")]
    InitializationFailed(String),

    #[error("Connection closed")]
    ConnectionClosed,
}

#[derive(Debug, Error)]
pub enum ToolError {
    #[error("Tool not found: {0}")]
    NotFound(String),

    #[error("Tool not enabled: {0}")]
    Disabled(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

/// JSON-RPC error codes used on the wire.
pub mod error_codes {
    // Standard JSON-RPC errors
    pub const PARSE_ERROR: i32 = -32700;
    pub const INVALID_REQUEST: i32 = -32600;
    pub const METHOD_NOT_FOUND: i32 = -32601;
    pub const INVALID_PARAMS: i32 = -32602;
    pub const INTERNAL_ERROR: i32 = -32603;

    // MCP-specific error codes
    pub const INITIALIZATION_FAILED: i32 = -32000;
    pub const TOOL_EXECUTION_ERROR: i32 = -32003;
}

impl From<McpError> for crate::protocol::JsonRpcError {
    fn from(err: McpError) -> Self {
        use crate::protocol::JsonRpcError;

        match err {
            McpError::Protocol(ProtocolError::InvalidVersion(v)) => JsonRpcError::new(
                error_codes::INVALID_REQUEST,
                format!("Invalid JSON-RPC version: {v}"),
            ),
            McpError::Protocol(ProtocolError::MethodNotFound(m)) => JsonRpcError::new(
                error_codes::METHOD_NOT_FOUND,
                format!("Method not found: {m}"),
            ),
            McpError::Protocol(ProtocolError::InvalidParams(msg)) => {
                JsonRpcError::new(error_codes::INVALID_PARAMS, format!("Invalid params: {msg}"))
            }
            McpError::Protocol(ProtocolError::InvalidRequest(msg)) => JsonRpcError::new(
                error_codes::INVALID_REQUEST,
                format!("Invalid request: {msg}"),
            ),
            McpError::Protocol(ProtocolError::InternalError(msg)) => {
                JsonRpcError::new(error_codes::INTERNAL_ERROR, format!("Internal error: {msg}"))
            }
            McpError::Protocol(ProtocolError::InitializationFailed(msg)) => {
                JsonRpcError::new(error_codes::INITIALIZATION_FAILED, msg)
            }
            McpError::Protocol(ProtocolError::ConnectionClosed) => {
                JsonRpcError::new(error_codes::INTERNAL_ERROR, "Connection closed".to_string())
            }
            McpError::Tool(ToolError::NotFound(name)) => JsonRpcError::new(
                error_codes::METHOD_NOT_FOUND,
                format!("Tool not found: {name}"),
            ),
            McpError::Tool(ToolError::Disabled(name)) => JsonRpcError::new(
                error_codes::METHOD_NOT_FOUND,
                format!("Tool not enabled: {name}"),
            ),
            McpError::Tool(ToolError::InvalidInput(msg)) => JsonRpcError::new(
                error_codes::INVALID_PARAMS,
                format!("Invalid tool input: {msg}"),
            ),
            McpError::Serialization(e) => JsonRpcError::new(
                error_codes::PARSE_ERROR,
                format!("Serialization error: {e}"),
            ),
            McpError::Io(e) => {
                JsonRpcError::new(error_codes::INTERNAL_ERROR, format!("IO error: {e}"))
            }
            McpError::Other(e) => JsonRpcError::new(error_codes::INTERNAL_ERROR, e.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::JsonRpcError;

    #[test]
    fn error_variants_map_to_rpc_codes() {
        let cases = vec![
            (
                McpError::method_not_found("list_widgets"),
                error_codes::METHOD_NOT_FOUND,
            ),
            (
                McpError::invalid_params("missing sql"),
                error_codes::INVALID_PARAMS,
            ),
            (
                McpError::internal_error("boom"),
                error_codes::INTERNAL_ERROR,
            ),
            (
                McpError::tool_not_found("execute_query"),
                error_codes::METHOD_NOT_FOUND,
            ),
        ];
        for (err, code) in cases {
            let rpc: JsonRpcError = err.into();
            assert_eq!(rpc.code, code);
            assert!(!rpc.message.is_empty());
        }
    }
}
