//! # MSSQL MCP Server
//!
//! The dispatcher layer: session management, tool registry, tool
//! implementations and the server loop, assembled over
//! [`mssql_mcp_core`], [`mssql_mcp_transport`] and [`mssql_mcp_db`].

pub mod handlers;
pub mod registry;
pub mod server;
pub mod sessions;
pub mod tools;

pub use handlers::ToolHandler;
pub use server::McpServer;
pub use sessions::{SessionManager, SessionSnapshot, SESSION_RETENTION};
pub use tools::SqlServerTools;
