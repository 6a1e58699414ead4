//! Transport layer for the MSSQL MCP server.
//!
//! MCP clients talk to this server over stdio with newline-delimited JSON;
//! the [`Transport`] trait keeps the server loop testable against in-memory
//! implementations.

pub mod stdio;

use async_trait::async_trait;
use mssql_mcp_core::protocol::JsonRpcMessage;
use thiserror::Error;

pub use stdio::StdioTransport;

pub type Result<T> = std::result::Result<T, TransportError>;

#[derive(Debug, Error)]
pub enum TransportError {
    /// The peer closed the stream (EOF on stdin).
    #[error("connection closed")]
    ConnectionClosed,

    #[error("receive failed: {0}")]
    ReceiveFailed(String),

    #[error("send failed: {0}")]
    SendFailed(String),

    #[error("malformed message: {0}")]
    Malformed(#[from] serde_json::Error),
}

/// Bidirectional, message-oriented JSON-RPC transport.
#[async_trait]
pub trait Transport: Send {
    async fn send_message(&mut self, message: JsonRpcMessage) -> Result<()>;

    async fn receive_message(&mut self) -> Result<JsonRpcMessage>;

    async fn close(&mut self) -> Result<()>;
}
