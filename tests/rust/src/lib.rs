//! Shared test utilities for McpRelay integration tests.

use std::collections::VecDeque;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use futures::{Stream, StreamExt};
use mcprelay_gateway::{DemoStreamConfig, GatewayConfig, GatewayServer};
use mcprelay_relay::{BridgeConfig, RelayConfig, RelayServer, SseDecoder};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;

pub use mcprelay_core::SESSION_ID_HEADER;

/// Default wait for anything that should happen "soon"
pub const WAIT: Duration = Duration::from_secs(5);

/// Route test output through `RUST_LOG` when set
pub fn init_test_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Gateway config with short timers; the refresh ticker is effectively off
pub fn quick_gateway_config() -> GatewayConfig {
    GatewayConfig {
        tool_refresh_interval: Duration::from_secs(3600),
        greet_spacing: Duration::from_millis(300),
        demo_stream: DemoStreamConfig {
            interval: Duration::from_millis(100),
            messages: 2,
        },
        ..GatewayConfig::default()
    }
}

async fn ephemeral_listener() -> (TcpListener, String) {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind to random port");
    let base_url = format!("http://127.0.0.1:{}", listener.local_addr().unwrap().port());
    (listener, base_url)
}

/// Gateway running on an ephemeral port
pub struct TestGateway {
    pub server: Arc<GatewayServer>,
    pub base_url: String,
    handle: JoinHandle<anyhow::Result<()>>,
}

impl TestGateway {
    pub async fn start(config: GatewayConfig) -> Self {
        init_test_tracing();
        let (listener, base_url) = ephemeral_listener().await;
        let server = Arc::new(GatewayServer::new(config));
        let handle = {
            let server = Arc::clone(&server);
            tokio::spawn(async move { server.serve(listener).await })
        };
        Self {
            server,
            base_url,
            handle,
        }
    }

    pub fn mcp_url(&self) -> String {
        format!("{}/mcp", self.base_url)
    }

    pub async fn stop(self) {
        self.server.cleanup().await;
        let _ = tokio::time::timeout(WAIT, self.handle).await;
    }
}

/// Relay running on an ephemeral port in front of `upstream_url`
pub struct TestRelay {
    pub server: Arc<RelayServer>,
    pub base_url: String,
    handle: JoinHandle<anyhow::Result<()>>,
}

impl TestRelay {
    pub async fn start(upstream_url: &str) -> Self {
        init_test_tracing();
        let (listener, base_url) = ephemeral_listener().await;
        let config = RelayConfig {
            bridge: BridgeConfig {
                upstream_url: upstream_url.to_string(),
                ..BridgeConfig::default()
            },
            ..RelayConfig::default()
        };
        let server = Arc::new(RelayServer::new(config));
        let handle = {
            let server = Arc::clone(&server);
            tokio::spawn(async move { server.serve(listener).await })
        };
        Self {
            server,
            base_url,
            handle,
        }
    }

    pub fn stream_url(&self) -> String {
        format!("{}/stream", self.base_url)
    }

    pub async fn stop(self) {
        self.server.cleanup().await;
        let _ = tokio::time::timeout(WAIT, self.handle).await;
    }
}

/// Raw JSON-RPC over HTTP against a gateway
pub mod mcp {
    use super::SESSION_ID_HEADER;
    use serde_json::{json, Value};

    pub fn initialize_body(id: i64) -> Value {
        json!({
            "jsonrpc": "2.0",
            "id": id,
            "method": "initialize",
            "params": {
                "protocolVersion": "2025-03-26",
                "capabilities": {},
                "clientInfo": { "name": "integration-test", "version": "1.0.0" }
            }
        })
    }

    pub fn request(id: i64, method: &str, params: Value) -> Value {
        json!({ "jsonrpc": "2.0", "id": id, "method": method, "params": params })
    }

    pub fn call_tool(id: i64, name: &str, arguments: Value) -> Value {
        request(id, "tools/call", json!({ "name": name, "arguments": arguments }))
    }

    pub async fn post(
        http: &reqwest::Client,
        url: &str,
        session: Option<&str>,
        body: &Value,
    ) -> reqwest::Response {
        let mut request = http
            .post(url)
            .header(reqwest::header::ACCEPT, "application/json, text/event-stream")
            .json(body);
        if let Some(session) = session {
            request = request.header(SESSION_ID_HEADER, session);
        }
        request.send().await.expect("POST /mcp")
    }

    pub fn is_event_stream(response: &reqwest::Response) -> bool {
        response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .is_some_and(|ct| ct.starts_with("text/event-stream"))
    }

    /// POST and decode the reply. A streamed reply is read to its end and its
    /// final frame, the JSON-RPC response, is returned.
    pub async fn post_json(
        http: &reqwest::Client,
        url: &str,
        session: Option<&str>,
        body: &Value,
    ) -> (reqwest::StatusCode, Value) {
        let response = post(http, url, session, body).await;
        let status = response.status();
        if !is_event_stream(&response) {
            let value = response.json().await.expect("JSON body");
            return (status, value);
        }

        let frames = super::SseReader::new(response).collect(super::WAIT).await;
        let last = frames.last().expect("response frame on the stream");
        (status, serde_json::from_str(last).expect("JSON frame"))
    }

    /// Handshake and return the minted session id
    pub async fn initialize(http: &reqwest::Client, url: &str) -> String {
        let response = post(http, url, None, &initialize_body(0)).await;
        assert_eq!(response.status(), reqwest::StatusCode::OK);
        let session = response
            .headers()
            .get(SESSION_ID_HEADER)
            .and_then(|v| v.to_str().ok())
            .expect("session header on handshake")
            .to_string();
        let initialized = json!({ "jsonrpc": "2.0", "method": "notifications/initialized" });
        let ack = post(http, url, Some(&session), &initialized).await;
        assert_eq!(ack.status(), reqwest::StatusCode::ACCEPTED);
        session
    }

    pub async fn open_stream(
        http: &reqwest::Client,
        url: &str,
        session: Option<&str>,
    ) -> reqwest::Response {
        let mut request = http.get(url).header(reqwest::header::ACCEPT, "text/event-stream");
        if let Some(session) = session {
            request = request.header(SESSION_ID_HEADER, session);
        }
        request.send().await.expect("GET /mcp")
    }

    /// Text of `notifications/message`, if `event` is one
    pub fn message_text(event: &Value) -> Option<&str> {
        (event["method"] == "notifications/message")
            .then(|| event["params"]["data"].as_str())
            .flatten()
    }

    pub fn is_tools_changed(event: &Value) -> bool {
        event["method"] == "notifications/tools/list_changed"
    }
}

type ByteStream = Pin<Box<dyn Stream<Item = reqwest::Result<Bytes>> + Send>>;

/// Reads `data:` payloads off a streaming response
pub struct SseReader {
    body: ByteStream,
    decoder: SseDecoder,
    pending: VecDeque<String>,
}

impl SseReader {
    pub fn new(response: reqwest::Response) -> Self {
        Self {
            body: Box::pin(response.bytes_stream()),
            decoder: SseDecoder::default(),
            pending: VecDeque::new(),
        }
    }

    /// Next event payload, `None` on timeout or end of stream
    pub async fn next(&mut self, timeout: Duration) -> Option<String> {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            if let Some(event) = self.pending.pop_front() {
                return Some(event);
            }
            let chunk = tokio::time::timeout_at(deadline, self.body.next()).await.ok()??;
            let bytes = chunk.ok()?;
            self.pending.extend(self.decoder.push(&bytes));
        }
    }

    /// Next payload parsed as JSON
    pub async fn next_json(&mut self, timeout: Duration) -> Option<serde_json::Value> {
        let event = self.next(timeout).await?;
        serde_json::from_str(&event).ok()
    }

    /// Skip payloads until one satisfies `predicate`
    pub async fn wait_for<F>(&mut self, timeout: Duration, predicate: F) -> Option<String>
    where
        F: Fn(&str) -> bool,
    {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            let remaining = deadline.saturating_duration_since(tokio::time::Instant::now());
            if remaining.is_zero() {
                return None;
            }
            let event = self.next(remaining).await?;
            if predicate(&event) {
                return Some(event);
            }
        }
    }

    /// Everything that arrives within `window`
    pub async fn collect(&mut self, window: Duration) -> Vec<String> {
        let deadline = tokio::time::Instant::now() + window;
        let mut events = Vec::new();
        loop {
            let remaining = deadline.saturating_duration_since(tokio::time::Instant::now());
            if remaining.is_zero() {
                return events;
            }
            match self.next(remaining).await {
                Some(event) => events.push(event),
                None => return events,
            }
        }
    }
}

/// Poll `condition` until it holds or `timeout` elapses
pub async fn eventually<F>(timeout: Duration, mut condition: F) -> bool
where
    F: FnMut() -> bool,
{
    let deadline = tokio::time::Instant::now() + timeout;
    while tokio::time::Instant::now() < deadline {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    condition()
}
