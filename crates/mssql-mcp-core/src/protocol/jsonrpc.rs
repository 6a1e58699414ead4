//! JSON-RPC 2.0 message types.
//!
//! Requests without an `id` are notifications; the untagged
//! [`JsonRpcMessage`] enum distinguishes requests from responses by shape.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::borrow::Cow;

use crate::protocol::constants::JSONRPC_VERSION;

/// JSON-RPC 2.0 request ID: string or number.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RequestId {
    String(String),
    Number(i64),
}

impl RequestId {
    pub fn string(s: impl Into<String>) -> Self {
        Self::String(s.into())
    }

    pub fn number(n: i64) -> Self {
        Self::Number(n)
    }
}

impl std::fmt::Display for RequestId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RequestId::String(s) => write!(f, "{s}"),
            RequestId::Number(n) => write!(f, "{n}"),
        }
    }
}

impl From<i64> for RequestId {
    fn from(n: i64) -> Self {
        RequestId::Number(n)
    }
}

impl From<String> for RequestId {
    fn from(s: String) -> Self {
        RequestId::String(s)
    }
}

/// JSON-RPC 2.0 request.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct JsonRpcRequest {
    pub jsonrpc: Cow<'static, str>,
    pub method: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<RequestId>,
}

impl JsonRpcRequest {
    pub fn new(method: impl Into<String>, params: Option<Value>, id: Option<RequestId>) -> Self {
        Self {
            jsonrpc: Cow::Borrowed(JSONRPC_VERSION),
            method: method.into(),
            params,
            id,
        }
    }

    pub fn notification(method: impl Into<String>, params: Option<Value>) -> Self {
        Self::new(method, params, None)
    }

    pub fn is_notification(&self) -> bool {
        self.id.is_none()
    }
}

/// JSON-RPC 2.0 response.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct JsonRpcResponse {
    pub jsonrpc: Cow<'static, str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<JsonRpcError>,
    pub id: Option<RequestId>,
}

impl JsonRpcResponse {
    pub fn success(result: Value, id: Option<RequestId>) -> Self {
        Self {
            jsonrpc: Cow::Borrowed(JSONRPC_VERSION),
            result: Some(result),
            error: None,
            id,
        }
    }

    pub fn error(error: JsonRpcError, id: Option<RequestId>) -> Self {
        Self {
            jsonrpc: Cow::Borrowed(JSONRPC_VERSION),
            result: None,
            error: Some(error),
            id,
        }
    }
}

/// JSON-RPC 2.0 error object.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct JsonRpcError {
    pub code: i32,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl JsonRpcError {
    pub fn new(code: i32, message: String) -> Self {
        Self {
            code,
            message,
            data: None,
        }
    }

    pub fn parse_error(message: impl Into<String>) -> Self {
        Self::new(crate::error::error_codes::PARSE_ERROR, message.into())
    }

    pub fn invalid_request(message: impl Into<String>) -> Self {
        Self::new(crate::error::error_codes::INVALID_REQUEST, message.into())
    }

    pub fn method_not_found(method: &str) -> Self {
        Self::new(
            crate::error::error_codes::METHOD_NOT_FOUND,
            format!("Method not found: {method}"),
        )
    }

    pub fn invalid_params(message: impl Into<String>) -> Self {
        Self::new(crate::error::error_codes::INVALID_PARAMS, message.into())
    }

    pub fn internal_error(message: impl Into<String>) -> Self {
        Self::new(crate::error::error_codes::INTERNAL_ERROR, message.into())
    }
}

/// Any JSON-RPC 2.0 message.
///
/// Serde tries `Request` first: it requires a `method`, which responses
/// never carry, while every field that distinguishes a response is optional.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum JsonRpcMessage {
    Request(JsonRpcRequest),
    Response(JsonRpcResponse),
}

impl JsonRpcMessage {
    pub fn request_id(&self) -> Option<&RequestId> {
        match self {
            JsonRpcMessage::Request(req) => req.id.as_ref(),
            JsonRpcMessage::Response(resp) => resp.id.as_ref(),
        }
    }
}

/// Validate the version field and basic shape of an incoming message.
pub fn validate_message(message: &JsonRpcMessage) -> Result<(), crate::error::ProtocolError> {
    match message {
        JsonRpcMessage::Request(request) => {
            if request.jsonrpc != JSONRPC_VERSION {
                return Err(crate::error::ProtocolError::InvalidVersion(
                    request.jsonrpc.to_string(),
                ));
            }
            if request.method.is_empty() {
                return Err(crate::error::ProtocolError::InvalidRequest(
                    "method name cannot be empty".to_string(),
                ));
            }
        }
        JsonRpcMessage::Response(response) => {
            if response.jsonrpc != JSONRPC_VERSION {
                return Err(crate::error::ProtocolError::InvalidVersion(
                    response.jsonrpc.to_string(),
                ));
            }
            if response.result.is_some() == response.error.is_some() {
                return Err(crate::error::ProtocolError::InvalidRequest(
                    "response must carry exactly one of result or error".to_string(),
                ));
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_roundtrip() {
        let request = JsonRpcRequest::new(
            "tools/call",
            Some(serde_json::json!({"name": "list_databases"})),
            Some(RequestId::number(7)),
        );
        let text = serde_json::to_string(&request).unwrap();
        let back: JsonRpcRequest = serde_json::from_str(&text).unwrap();
        assert_eq!(request, back);
    }

    #[test]
    fn message_enum_distinguishes_request_and_response() {
        let raw = r#"{"jsonrpc":"2.0","method":"ping","id":1}"#;
        let msg: JsonRpcMessage = serde_json::from_str(raw).unwrap();
        assert!(matches!(msg, JsonRpcMessage::Request(_)));

        let raw = r#"{"jsonrpc":"2.0","result":{},"id":1}"#;
        let msg: JsonRpcMessage = serde_json::from_str(raw).unwrap();
        assert!(matches!(msg, JsonRpcMessage::Response(_)));
    }

    #[test]
    fn notification_has_no_id() {
        let n = JsonRpcRequest::notification("notifications/initialized", None);
        assert!(n.is_notification());
        let text = serde_json::to_string(&n).unwrap();
        assert!(!text.contains("\"id\""));
    }

    #[test]
    fn validate_rejects_bad_version() {
        let mut request = JsonRpcRequest::new("ping", None, Some(RequestId::number(1)));
        request.jsonrpc = Cow::Borrowed("1.0");
        let msg = JsonRpcMessage::Request(request);
        assert!(validate_message(&msg).is_err());
    }

    #[test]
    fn validate_rejects_response_with_both_result_and_error() {
        let mut response =
            JsonRpcResponse::success(serde_json::json!({}), Some(RequestId::number(1)));
        response.error = Some(JsonRpcError::internal_error("x"));
        assert!(validate_message(&JsonRpcMessage::Response(response)).is_err());
    }
}
