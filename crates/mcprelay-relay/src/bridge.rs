//! MCP Bridge - the relay's single upstream MCP connection
//!
//! Connects lazily on first use and again whenever the previous connection has
//! closed or a call on it failed. Upstream `notifications/message` are published
//! to the [`SseGateway`] from the receive side of the transport, in arrival order;
//! `tools/list_changed` refreshes the cached tool list.

use std::future::Future;
use std::sync::Arc;

use parking_lot::RwLock;
use rmcp::model::{
    CallToolRequestParams, ClientCapabilities, ClientInfo, ClientJsonRpcMessage, Implementation,
    JsonRpcMessage, JsonRpcNotification, ServerJsonRpcMessage, ServerNotification,
};
use rmcp::service::{NotificationContext, Peer, RunningService};
use rmcp::transport::{StreamableHttpClientTransport, Transport};
use rmcp::{RoleClient, ServiceExt};
use serde_json::{json, Value};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::sse_gateway::SseGateway;

pub type RelayClient = RunningService<RoleClient, RelayClientHandler>;

#[derive(Debug, thiserror::Error)]
pub enum BridgeError {
    #[error("failed to connect to {url}: {reason}")]
    Connect { url: String, reason: String },

    #[error("tool call failed: {0}")]
    Call(String),

    #[error("tool reported an error: {0}")]
    Tool(String),
}

/// Transport wrapper that publishes upstream log messages as they are received.
///
/// The client service hands each notification to its own task, so publishing from
/// the handler callback would not keep the upstream order.
pub struct PublishingTransport<T> {
    inner: T,
    gateway: Arc<SseGateway>,
}

impl<T> PublishingTransport<T> {
    pub fn new(inner: T, gateway: Arc<SseGateway>) -> Self {
        Self { inner, gateway }
    }

    fn relay(&self, message: &ServerJsonRpcMessage) {
        let JsonRpcMessage::Notification(JsonRpcNotification {
            notification: ServerNotification::LoggingMessageNotification(notification),
            ..
        }) = message
        else {
            return;
        };

        let text = match &notification.params.data {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        };
        let delivered = self.gateway.publish(&text);
        debug!(
            level = ?notification.params.level,
            delivered,
            "[McpBridge] Upstream message relayed: {}",
            text
        );
    }
}

impl<T> Transport<RoleClient> for PublishingTransport<T>
where
    T: Transport<RoleClient>,
{
    type Error = T::Error;

    fn send(
        &mut self,
        item: ClientJsonRpcMessage,
    ) -> impl Future<Output = Result<(), Self::Error>> + Send + 'static {
        self.inner.send(item)
    }

    fn receive(&mut self) -> impl Future<Output = Option<ServerJsonRpcMessage>> + Send {
        async move {
            let message = self.inner.receive().await?;
            self.relay(&message);
            Some(message)
        }
    }

    fn close(&mut self) -> impl Future<Output = Result<(), Self::Error>> + Send {
        self.inner.close()
    }
}

/// Client-side handler for upstream notifications
#[derive(Clone)]
pub struct RelayClientHandler {
    info: ClientInfo,
    tools: Arc<RwLock<Vec<String>>>,
}

impl std::fmt::Debug for RelayClientHandler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RelayClientHandler")
            .field("client", &self.info.client_info.name)
            .field("tools", &self.tools.read().len())
            .finish()
    }
}

impl RelayClientHandler {
    pub fn new(tools: Arc<RwLock<Vec<String>>>) -> Self {
        Self {
            info: ClientInfo {
                protocol_version: Default::default(),
                capabilities: ClientCapabilities::default(),
                client_info: Implementation {
                    name: "mcp-client-for-sse-server".to_string(),
                    version: env!("CARGO_PKG_VERSION").to_string(),
                    ..Default::default()
                },
                ..Default::default()
            },
            tools,
        }
    }
}

async fn refresh_tools(peer: &Peer<RoleClient>, cache: &RwLock<Vec<String>>) {
    match peer.list_all_tools().await {
        Ok(tools) => {
            let names: Vec<String> = tools.into_iter().map(|t| t.name.to_string()).collect();
            info!(tools = ?names, "[McpBridge] Tool list refreshed");
            *cache.write() = names;
        }
        Err(e) => warn!(error = %e, "[McpBridge] Failed to refresh tool list"),
    }
}

impl rmcp::ClientHandler for RelayClientHandler {
    fn get_info(&self) -> ClientInfo {
        self.info.clone()
    }

    fn on_tool_list_changed(
        &self,
        context: NotificationContext<RoleClient>,
    ) -> impl std::future::Future<Output = ()> + Send + '_ {
        let tools = Arc::clone(&self.tools);
        async move {
            debug!("[McpBridge] Upstream sent tools/list_changed");
            // Requests from inside a notification callback would wait on the same
            // service loop that is delivering the notification
            tokio::spawn(async move {
                refresh_tools(&context.peer, &tools).await;
            });
        }
    }
}

#[derive(Debug, Clone)]
pub struct BridgeConfig {
    /// Upstream Streamable HTTP endpoint
    pub upstream_url: String,
    /// Tool invoked by `send_message`
    pub tool_name: String,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            upstream_url: "http://localhost:3000/mcp".to_string(),
            tool_name: "multi-greet".to_string(),
        }
    }
}

pub struct McpBridge {
    config: BridgeConfig,
    gateway: Arc<SseGateway>,
    tools: Arc<RwLock<Vec<String>>>,
    client: Mutex<Option<RelayClient>>,
    /// Peer of the current connection, readable while `client` is held for a connect
    live: RwLock<Option<Peer<RoleClient>>>,
}

impl McpBridge {
    pub fn new(config: BridgeConfig, gateway: Arc<SseGateway>) -> Self {
        Self {
            config,
            gateway,
            tools: Arc::new(RwLock::new(Vec::new())),
            client: Mutex::new(None),
            live: RwLock::new(None),
        }
    }

    pub fn config(&self) -> &BridgeConfig {
        &self.config
    }

    /// Upstream tool names as of the last refresh
    pub fn cached_tools(&self) -> Vec<String> {
        self.tools.read().clone()
    }

    /// Whether the last established connection is still open. Never waits on an
    /// in-flight connect.
    pub fn is_connected(&self) -> bool {
        self.live
            .read()
            .as_ref()
            .is_some_and(|peer| !peer.is_transport_closed())
    }

    async fn connect(&self) -> Result<RelayClient, BridgeError> {
        let url = self.config.upstream_url.as_str();
        info!(url = %url, "[McpBridge] Connecting upstream");

        let handler = RelayClientHandler::new(Arc::clone(&self.tools));
        let transport = PublishingTransport::new(
            StreamableHttpClientTransport::from_uri(url),
            Arc::clone(&self.gateway),
        );
        let client = handler
            .serve(transport)
            .await
            .map_err(|e| BridgeError::Connect {
                url: url.to_string(),
                reason: e.to_string(),
            })?;

        refresh_tools(client.peer(), &self.tools).await;
        Ok(client)
    }

    /// Peer of the live connection, connecting first if there is none
    async fn peer(&self) -> Result<Peer<RoleClient>, BridgeError> {
        let mut slot = self.client.lock().await;
        if let Some(client) = slot.as_ref() {
            if !client.peer().is_transport_closed() {
                return Ok(client.peer().clone());
            }
            info!("[McpBridge] Upstream connection closed, reconnecting");
        }

        let client = self.connect().await?;
        let peer = client.peer().clone();
        *self.live.write() = Some(peer.clone());
        if let Some(stale) = slot.replace(client) {
            let _ = stale.cancel().await;
        }
        Ok(peer)
    }

    /// Connect now instead of on the next `send_message`
    pub async fn ensure_connected(&self) -> Result<(), BridgeError> {
        self.peer().await.map(|_| ())
    }

    /// Drop the current connection so the next call reconnects
    async fn reset(&self) {
        self.live.write().take();
        if let Some(client) = self.client.lock().await.take() {
            let _ = client.cancel().await;
        }
    }

    /// Invoke the configured tool with `{name: message}` and return its text items
    pub async fn send_message(&self, message: &str) -> Result<Vec<String>, BridgeError> {
        let peer = self.peer().await?;
        let params = CallToolRequestParams {
            name: self.config.tool_name.clone().into(),
            arguments: json!({ "name": message }).as_object().cloned(),
            task: None,
            meta: None,
        };

        let result = match peer.call_tool(params).await {
            Ok(result) => result,
            Err(e) => {
                warn!(error = %e, tool = %self.config.tool_name, "[McpBridge] Tool call failed");
                self.reset().await;
                return Err(BridgeError::Call(e.to_string()));
            }
        };

        let texts: Vec<String> = result
            .content
            .into_iter()
            .filter_map(|c| serde_json::to_value(c).ok())
            .filter_map(|v| v.get("text").and_then(Value::as_str).map(String::from))
            .collect();

        if result.is_error.unwrap_or(false) {
            return Err(BridgeError::Tool(texts.join("\n")));
        }
        Ok(texts)
    }

    pub async fn shutdown(&self) {
        self.reset().await;
        debug!("[McpBridge] Upstream connection closed");
    }
}
