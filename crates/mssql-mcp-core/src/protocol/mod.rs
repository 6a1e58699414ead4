//! MCP protocol layer: JSON-RPC 2.0 framing and lifecycle messages.

pub mod constants;
pub mod jsonrpc;
pub mod lifecycle;

pub use constants::{methods, JSONRPC_VERSION, PROTOCOL_VERSION};
pub use jsonrpc::{
    validate_message, JsonRpcError, JsonRpcMessage, JsonRpcRequest, JsonRpcResponse, RequestId,
};
pub use lifecycle::{InitializeRequest, InitializeResponse, ServerInfo, ToolsCapability};
