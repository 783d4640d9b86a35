//! JSON-RPC 2.0 wire types
//!
//! The gateway speaks a JSON-RPC dialect over Streamable HTTP. Inbound bodies are
//! classified by shape rather than deserialized into a fixed enum, because a single
//! POST may carry requests, notifications, client responses, or a batch of them.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// JSON-RPC version tag stamped on every outbound message
pub const JSONRPC_VERSION: &str = "2.0";

/// Header carrying the session identifier on every request after the handshake
pub const SESSION_ID_HEADER: &str = "mcp-session-id";

/// Standard and server-defined JSON-RPC error codes
pub mod error_codes {
    pub const PARSE_ERROR: i64 = -32700;
    pub const INVALID_REQUEST: i64 = -32600;
    pub const METHOD_NOT_FOUND: i64 = -32601;
    pub const INVALID_PARAMS: i64 = -32602;
    pub const INTERNAL_ERROR: i64 = -32603;
    /// Envelope code for session/handshake errors
    pub const SERVER_ERROR: i64 = -32000;
}

/// JSON-RPC error object
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JsonRpcError {
    pub code: i64,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl JsonRpcError {
    pub fn new(code: i64, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            data: None,
        }
    }

    pub fn method_not_found(method: &str) -> Self {
        Self::new(
            error_codes::METHOD_NOT_FOUND,
            format!("Method not found: {}", method),
        )
    }

    pub fn invalid_params(message: impl Into<String>) -> Self {
        Self::new(error_codes::INVALID_PARAMS, message)
    }
}

/// JSON-RPC response: exactly one of `result` / `error` is set.
///
/// Also used as the error envelope for HTTP-level failures, in which case `id` is the
/// request id when one could be extracted and `null` otherwise.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JsonRpcResponse {
    pub jsonrpc: String,
    pub id: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<JsonRpcError>,
}

impl JsonRpcResponse {
    pub fn success(id: Value, result: Value) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            id,
            result: Some(result),
            error: None,
        }
    }

    pub fn failure(id: Value, error: JsonRpcError) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            id,
            result: None,
            error: Some(error),
        }
    }

    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }
}

/// JSON-RPC notification (no id, no response expected)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JsonRpcNotification {
    pub jsonrpc: String,
    pub method: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
}

/// A single inbound JSON-RPC message, classified by shape
#[derive(Debug, Clone, PartialEq)]
pub enum IncomingMessage {
    Request {
        id: Value,
        method: String,
        params: Option<Value>,
    },
    Notification {
        method: String,
        params: Option<Value>,
    },
    /// A client's answer to a server-initiated request
    Response { id: Value },
}

impl IncomingMessage {
    /// Classify one JSON value. Returns a human-readable reason on failure.
    pub fn classify(value: &Value) -> Result<Self, String> {
        let obj = value
            .as_object()
            .ok_or_else(|| "JSON-RPC message must be an object".to_string())?;

        if obj.get("jsonrpc").and_then(Value::as_str) != Some(JSONRPC_VERSION) {
            return Err("JSON-RPC message must declare jsonrpc \"2.0\"".to_string());
        }

        let id = obj.get("id").filter(|id| is_valid_id(id)).cloned();

        if let Some(method) = obj.get("method") {
            let method = method
                .as_str()
                .ok_or_else(|| "JSON-RPC method must be a string".to_string())?
                .to_string();
            let params = obj.get("params").cloned();
            return Ok(match id {
                Some(id) => IncomingMessage::Request { id, method, params },
                None => IncomingMessage::Notification { method, params },
            });
        }

        match id {
            Some(id) if obj.contains_key("result") || obj.contains_key("error") => {
                Ok(IncomingMessage::Response { id })
            }
            _ => Err("Body must contain a JSON-RPC request, notification, or response".to_string()),
        }
    }

    pub fn method(&self) -> Option<&str> {
        match self {
            IncomingMessage::Request { method, .. } | IncomingMessage::Notification { method, .. } => {
                Some(method)
            }
            IncomingMessage::Response { .. } => None,
        }
    }

    pub fn is_request(&self) -> bool {
        matches!(self, IncomingMessage::Request { .. })
    }
}

fn is_valid_id(id: &Value) -> bool {
    id.is_string() || id.is_number()
}

/// Client implementation info sent with `initialize`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Implementation {
    pub name: String,
    pub version: String,
}

/// `initialize` request params
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InitializeParams {
    pub protocol_version: String,
    pub capabilities: serde_json::Map<String, Value>,
    pub client_info: Implementation,
}

/// Whether a POST body is a well-formed handshake.
///
/// A batch counts as a handshake when any member is one.
pub fn is_initialize_request(body: &Value) -> bool {
    match body {
        Value::Array(items) => items.iter().any(is_single_initialize),
        other => is_single_initialize(other),
    }
}

fn is_single_initialize(value: &Value) -> bool {
    match IncomingMessage::classify(value) {
        Ok(IncomingMessage::Request { method, params, .. }) if method == "initialize" => params
            .map(|p| serde_json::from_value::<InitializeParams>(p).is_ok())
            .unwrap_or(false),
        _ => false,
    }
}

/// Best-effort request id extraction for error envelopes
pub fn request_id_of(body: &Value) -> Value {
    body.get("id")
        .filter(|id| is_valid_id(id))
        .cloned()
        .unwrap_or(Value::Null)
}
