//! Handler traits for the server loop.

use async_trait::async_trait;

use mssql_mcp_core::error::McpResult;
use mssql_mcp_core::types::tools::{ListToolsResponse, ToolCall, ToolResult};

/// Processes `tools/list` and `tools/call`.
#[async_trait]
pub trait ToolHandler: Send + Sync {
    async fn handle_tool_call(&self, call: ToolCall) -> McpResult<ToolResult>;

    async fn list_tools(&self) -> McpResult<ListToolsResponse>;
}
