//! Test: a stock rmcp client against the gateway
//!
//! Validates that:
//! 1. The handshake yields a session the client keeps using
//! 2. Tool calls return the expected content
//! 3. `tools/list_changed` reaches the client over GET
//! 4. A tool's `notifications/message` reach the client before its result returns

use std::sync::Arc;
use std::time::Duration;

use mcprelay_gateway::GatewayConfig;
use parking_lot::Mutex;
use rmcp::model::{
    CallToolRequestParams, ClientCapabilities, ClientInfo, Implementation,
    LoggingMessageNotificationParam,
};
use rmcp::service::NotificationContext;
use rmcp::transport::StreamableHttpClientTransport;
use rmcp::{RoleClient, ServiceExt};
use serde_json::{json, Value};
use tests::{quick_gateway_config, TestGateway, WAIT};
use tokio::sync::Notify;

/// Client handler that records what the gateway pushes
#[derive(Clone, Default)]
struct RecordingClient {
    tools_changed: Arc<Notify>,
    messages: Arc<Mutex<Vec<String>>>,
}

impl rmcp::ClientHandler for RecordingClient {
    fn get_info(&self) -> ClientInfo {
        ClientInfo {
            protocol_version: Default::default(),
            capabilities: ClientCapabilities::default(),
            client_info: Implementation {
                name: "recording-client".to_string(),
                version: "1.0.0".to_string(),
                ..Default::default()
            },
            ..Default::default()
        }
    }

    fn on_tool_list_changed(
        &self,
        _context: NotificationContext<RoleClient>,
    ) -> impl std::future::Future<Output = ()> + Send + '_ {
        self.tools_changed.notify_one();
        async {}
    }

    fn on_logging_message(
        &self,
        params: LoggingMessageNotificationParam,
        _context: NotificationContext<RoleClient>,
    ) -> impl std::future::Future<Output = ()> + Send + '_ {
        if let Value::String(text) = params.data {
            self.messages.lock().push(text);
        }
        async {}
    }
}

fn call(name: &str, arguments: Value) -> CallToolRequestParams {
    CallToolRequestParams {
        name: name.to_string().into(),
        arguments: arguments.as_object().cloned(),
        task: None,
        meta: None,
    }
}

fn texts(result: &rmcp::model::CallToolResult) -> Vec<String> {
    result
        .content
        .iter()
        .filter_map(|c| serde_json::to_value(c).ok())
        .filter_map(|v| v.get("text").and_then(Value::as_str).map(String::from))
        .collect()
}

#[tokio::test(flavor = "multi_thread")]
async fn test_list_and_call_tools() {
    let gateway = TestGateway::start(quick_gateway_config()).await;

    let transport = StreamableHttpClientTransport::from_uri(gateway.mcp_url().as_str());
    let client = RecordingClient::default()
        .serve(transport)
        .await
        .expect("client should connect");

    let info = client.peer_info().expect("server info after handshake");
    assert_eq!(info.server_info.name, "remote-mcp-server");
    assert_eq!(gateway.server.sessions().len(), 1);

    let tools = client
        .list_tools(Default::default())
        .await
        .expect("list_tools should work");
    let single = tools
        .tools
        .iter()
        .map(|t| t.name.to_string())
        .find(|n| n.starts_with("single-greeting-"))
        .expect("single greet tool");
    assert!(tools.tools.iter().any(|t| t.name == "multi-greet"));

    let result = client
        .call_tool(call(&single, json!({ "name": "Ada" })))
        .await
        .expect("call_tool should work");
    assert_eq!(texts(&result), vec!["Hey Ada! Welcome to my world!"]);
    assert_ne!(result.is_error, Some(true));

    let missing = client
        .call_tool(call(&single, json!({})))
        .await
        .expect("invocation errors are results");
    assert_eq!(missing.is_error, Some(true));

    client.cancel().await.ok();
    gateway.stop().await;
}

#[tokio::test(flavor = "multi_thread")]
async fn test_notifications_reach_client() {
    let gateway = TestGateway::start(GatewayConfig {
        tool_refresh_interval: Duration::from_millis(500),
        ..quick_gateway_config()
    })
    .await;

    let handler = RecordingClient::default();
    let transport = StreamableHttpClientTransport::from_uri(gateway.mcp_url().as_str());
    let client = handler
        .clone()
        .serve(transport)
        .await
        .expect("client should connect");

    tokio::time::timeout(WAIT, handler.tools_changed.notified())
        .await
        .expect("tools/list_changed within 5s");

    let result = client
        .call_tool(call("multi-greet", json!({ "name": "Bo" })))
        .await
        .expect("call_tool should work");
    assert_eq!(texts(&result), vec!["Hope you enjoy your day!"]);

    let messages = handler.messages.lock().clone();
    let first = messages.iter().position(|m| m == "First greet to Bo");
    let second = messages.iter().position(|m| m == "Second greet to Bo");
    assert!(
        matches!((first, second), (Some(a), Some(b)) if a < b),
        "messages: {:?}",
        messages
    );
    assert_eq!(messages.first().map(String::as_str), Some("SSE Connection established"));

    client.cancel().await.ok();
    gateway.stop().await;
}
