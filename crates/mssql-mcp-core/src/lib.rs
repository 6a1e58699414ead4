//! # MSSQL MCP Core
//!
//! Protocol types, configuration loading and the canonical error model shared
//! by the MSSQL MCP server crates.
//!
//! This crate is transport- and driver-agnostic: it knows the JSON-RPC 2.0
//! wire shapes of the Model Context Protocol, the tool/result types the
//! server exposes, and the connection profile that selects between
//! server-scoped and database-scoped tool sets. It does not open sockets and
//! it does not talk TDS.

pub mod config;
pub mod error;
pub mod protocol;
pub mod timefmt;
pub mod types;

pub use config::{ConnectionProfile, ServerMode};
pub use error::{McpError, McpResult, ProtocolError, ToolError};
pub use protocol::{JsonRpcError, JsonRpcMessage, JsonRpcRequest, JsonRpcResponse, RequestId};
pub use types::tools::{Tool, ToolAnnotations, ToolCall, ToolContent, ToolResult};
