//! The MCP server loop.
//!
//! Single-threaded request decoding over the transport; each tool invocation
//! runs to completion before the response is written back. Background work
//! happens inside the session manager, not here.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

use mssql_mcp_core::error::{McpError, McpResult};
use mssql_mcp_core::protocol::{
    methods, InitializeRequest, InitializeResponse, JsonRpcError, JsonRpcMessage, JsonRpcRequest,
    JsonRpcResponse, ServerInfo, PROTOCOL_VERSION,
};
use mssql_mcp_core::protocol::lifecycle::{ServerCapabilities, ToolsCapability};
use mssql_mcp_core::types::tools::ToolCall;
use mssql_mcp_transport::{StdioTransport, Transport, TransportError};

use crate::handlers::ToolHandler;

pub struct McpServer {
    info: ServerInfo,
    handler: Arc<dyn ToolHandler>,
    initialized: AtomicBool,
    shutting_down: AtomicBool,
}

impl McpServer {
    pub fn new(info: ServerInfo, handler: Arc<dyn ToolHandler>) -> Self {
        Self {
            info,
            handler,
            initialized: AtomicBool::new(false),
            shutting_down: AtomicBool::new(false),
        }
    }

    /// Serve over stdio until EOF or `shutdown`.
    pub async fn run_stdio(&self) -> McpResult<()> {
        let mut transport = StdioTransport::new();
        self.run_with_transport(&mut transport).await
    }

    pub async fn run_with_transport(&self, transport: &mut dyn Transport) -> McpResult<()> {
        info!(server = self.info.name.as_str(), "server loop started");

        loop {
            match transport.receive_message().await {
                Ok(JsonRpcMessage::Request(request)) => {
                    if request.is_notification() {
                        self.handle_notification(&request);
                        continue;
                    }
                    let response = self.handle_request(request).await;
                    if let Err(e) = transport.send_message(JsonRpcMessage::Response(response)).await
                    {
                        error!("failed to send response: {e}");
                        break;
                    }
                    if self.shutting_down.load(Ordering::Acquire) {
                        break;
                    }
                }
                Ok(JsonRpcMessage::Response(_)) => {
                    warn!("ignoring unexpected response message");
                }
                Err(TransportError::ConnectionClosed) => {
                    info!("client closed the connection");
                    break;
                }
                Err(TransportError::Malformed(e)) => {
                    warn!("malformed message: {e}");
                    let response = JsonRpcResponse::error(
                        JsonRpcError::parse_error(format!("invalid JSON: {e}")),
                        None,
                    );
                    if transport
                        .send_message(JsonRpcMessage::Response(response))
                        .await
                        .is_err()
                    {
                        break;
                    }
                }
                Err(e) => {
                    error!("transport error: {e}");
                    break;
                }
            }
        }

        info!("server loop finished");
        Ok(())
    }

    fn handle_notification(&self, request: &JsonRpcRequest) {
        match request.method.as_str() {
            methods::INITIALIZED => {
                self.initialized.store(true, Ordering::Release);
                debug!("client initialized");
            }
            other => debug!(method = other, "ignoring notification"),
        }
    }

    async fn handle_request(&self, request: JsonRpcRequest) -> JsonRpcResponse {
        debug!(method = request.method.as_str(), "handling request");
        let id = request.id.clone();

        match request.method.as_str() {
            methods::INITIALIZE => {
                let init: Result<InitializeRequest, _> =
                    serde_json::from_value(request.params.unwrap_or_default());
                match init {
                    Ok(init) => {
                        debug!(
                            client_version = init.protocol_version.as_str(),
                            "initialize handshake"
                        );
                        let response = InitializeResponse {
                            protocol_version: PROTOCOL_VERSION.to_string(),
                            capabilities: ServerCapabilities {
                                tools: Some(ToolsCapability {
                                    list_changed: Some(false),
                                }),
                            },
                            server_info: self.info.clone(),
                            instructions: None,
                        };
                        self.success(response, id)
                    }
                    Err(e) => JsonRpcResponse::error(
                        JsonRpcError::invalid_params(format!("invalid initialize request: {e}")),
                        id,
                    ),
                }
            }
            methods::PING => JsonRpcResponse::success(serde_json::json!({}), id),
            methods::SHUTDOWN => {
                info!("shutdown requested");
                self.shutting_down.store(true, Ordering::Release);
                JsonRpcResponse::success(serde_json::json!({}), id)
            }
            methods::TOOLS_LIST => match self.handler.list_tools().await {
                Ok(response) => self.success(response, id),
                Err(e) => JsonRpcResponse::error(e.into(), id),
            },
            methods::TOOLS_CALL => {
                let params = request.params.unwrap_or_default();
                let Some(name) = params.get("name").and_then(|v| v.as_str()) else {
                    return JsonRpcResponse::error(
                        JsonRpcError::invalid_params("tool call requires a name"),
                        id,
                    );
                };
                let call = ToolCall {
                    name: name.to_string(),
                    arguments: params.get("arguments").cloned(),
                };
                match self.handler.handle_tool_call(call).await {
                    Ok(result) => self.success(result, id),
                    Err(e) => JsonRpcResponse::error(e.into(), id),
                }
            }
            other => JsonRpcResponse::error(JsonRpcError::method_not_found(other), id),
        }
    }

    fn success<T: serde::Serialize>(
        &self,
        value: T,
        id: Option<mssql_mcp_core::protocol::RequestId>,
    ) -> JsonRpcResponse {
        match serde_json::to_value(value) {
            Ok(value) => JsonRpcResponse::success(value, id),
            Err(e) => JsonRpcResponse::error(
                McpError::Serialization(e).into(),
                id,
            ),
        }
    }
}
