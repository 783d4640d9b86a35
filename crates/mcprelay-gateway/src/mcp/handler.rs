//! McpRelay Gateway MCP Handler
//!
//! Answers the JSON-RPC messages forwarded to a session's transport: the handshake,
//! `ping`, tool listing and invocation, and `logging/setLevel`.

use std::sync::Arc;

use mcprelay_core::protocol::Implementation;
use mcprelay_core::{
    error_codes, IncomingMessage, InitializeParams, JsonRpcError, JsonRpcResponse, LogLevel,
    SessionState, ToolResult,
};
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::registry::{ToolContext, ToolRegistry};
use crate::services::NotificationEmitter;
use crate::session::SessionTransport;

#[derive(Debug, Deserialize)]
struct CallToolParams {
    name: String,
    #[serde(default)]
    arguments: Option<Value>,
}

#[derive(Debug, Deserialize)]
struct SetLevelParams {
    level: LogLevel,
}

/// McpRelay Gateway Handler
///
/// One instance is shared by every session; per-session state lives on the
/// transport passed with each message.
#[derive(Clone)]
pub struct McpHandler {
    registry: Arc<ToolRegistry>,
    emitter: Arc<dyn NotificationEmitter>,
    server_info: Implementation,
}

impl McpHandler {
    pub fn new(
        registry: Arc<ToolRegistry>,
        emitter: Arc<dyn NotificationEmitter>,
        server_info: Implementation,
    ) -> Self {
        Self {
            registry,
            emitter,
            server_info,
        }
    }

    pub fn server_info(&self) -> &Implementation {
        &self.server_info
    }

    pub fn capabilities() -> Value {
        json!({
            "tools": {"listChanged": true},
            "logging": {}
        })
    }

    /// Handle one classified message. Returns `None` for notifications and client
    /// responses, which get no reply.
    pub async fn handle_message(
        &self,
        transport: &Arc<SessionTransport>,
        message: IncomingMessage,
    ) -> Option<JsonRpcResponse> {
        self.handle_message_streaming(transport, message, None).await
    }

    /// Like [`handle_message`](Self::handle_message), with notifications raised by a
    /// tool call written to `response` ahead of the reply
    pub async fn handle_message_streaming(
        &self,
        transport: &Arc<SessionTransport>,
        message: IncomingMessage,
        response: Option<mpsc::UnboundedSender<String>>,
    ) -> Option<JsonRpcResponse> {
        let (id, method, params) = match message {
            IncomingMessage::Request { id, method, params } => (id, method, params),
            IncomingMessage::Notification { method, .. } => {
                debug!(session_id = %transport.id(), method = %method, "[McpHandler] Notification received");
                return None;
            }
            IncomingMessage::Response { id } => {
                debug!(session_id = %transport.id(), id = %id, "[McpHandler] Client response ignored");
                return None;
            }
        };

        let outcome = match method.as_str() {
            "initialize" => self.initialize(transport, params),
            _ if transport.state() != SessionState::Active => Err(JsonRpcError::new(
                error_codes::INVALID_REQUEST,
                "Server not initialized",
            )),
            "ping" => Ok(json!({})),
            "tools/list" => self.list_tools(),
            "tools/call" => self.call_tool(transport, params, response).await,
            "logging/setLevel" => Self::set_level(transport, params),
            other => {
                debug!(session_id = %transport.id(), method = other, "[McpHandler] Unknown method");
                Err(JsonRpcError::method_not_found(other))
            }
        };

        Some(match outcome {
            Ok(result) => JsonRpcResponse::success(id, result),
            Err(error) => JsonRpcResponse::failure(id, error),
        })
    }

    fn initialize(
        &self,
        transport: &Arc<SessionTransport>,
        params: Option<Value>,
    ) -> Result<Value, JsonRpcError> {
        if transport.state() != SessionState::Initializing {
            return Err(JsonRpcError::new(
                error_codes::INVALID_REQUEST,
                "Invalid Request: Server already initialized",
            ));
        }

        let params: InitializeParams = params
            .map(serde_json::from_value)
            .transpose()
            .map_err(|e| JsonRpcError::invalid_params(format!("Invalid initialize params: {}", e)))?
            .ok_or_else(|| JsonRpcError::invalid_params("Missing initialize params"))?;

        transport.activate(&params.protocol_version);
        info!(
            session_id = %transport.id(),
            client = %params.client_info.name,
            client_version = %params.client_info.version,
            protocol_version = %params.protocol_version,
            "[McpHandler] Client initialized"
        );

        Ok(json!({
            "protocolVersion": params.protocol_version,
            "capabilities": Self::capabilities(),
            "serverInfo": self.server_info,
        }))
    }

    fn list_tools(&self) -> Result<Value, JsonRpcError> {
        let tools = self.registry.current_tools();
        serde_json::to_value(&tools)
            .map(|tools| json!({ "tools": tools }))
            .map_err(|e| JsonRpcError::new(error_codes::INTERNAL_ERROR, e.to_string()))
    }

    async fn call_tool(
        &self,
        transport: &Arc<SessionTransport>,
        params: Option<Value>,
        response: Option<mpsc::UnboundedSender<String>>,
    ) -> Result<Value, JsonRpcError> {
        let params: CallToolParams = params
            .ok_or_else(|| JsonRpcError::invalid_params("Missing tools/call params"))
            .and_then(|p| {
                serde_json::from_value(p)
                    .map_err(|e| JsonRpcError::invalid_params(format!("Invalid tools/call params: {}", e)))
            })?;

        let mut ctx = ToolContext::new(Arc::clone(transport), Arc::clone(&self.emitter));
        if let Some(response) = response {
            ctx = ctx.with_response_stream(response);
        }
        let result = match self
            .registry
            .invoke(&params.name, params.arguments.as_ref(), ctx)
            .await
        {
            Ok(result) => result,
            Err(e) => {
                warn!(
                    session_id = %transport.id(),
                    tool = %params.name,
                    error = %e,
                    "[McpHandler] Tool invocation failed"
                );
                ToolResult::from(e)
            }
        };

        serde_json::to_value(&result)
            .map_err(|e| JsonRpcError::new(error_codes::INTERNAL_ERROR, e.to_string()))
    }

    fn set_level(transport: &Arc<SessionTransport>, params: Option<Value>) -> Result<Value, JsonRpcError> {
        let params: SetLevelParams = params
            .map(serde_json::from_value)
            .transpose()
            .map_err(|e| JsonRpcError::invalid_params(format!("Invalid logging level: {}", e)))?
            .ok_or_else(|| JsonRpcError::invalid_params("Missing logging/setLevel params"))?;
        transport.set_min_level(params.level);
        Ok(json!({}))
    }
}
