//! Relay Server
//!
//! Plain HTTP front for the bridge: `POST /send-message` calls the upstream tool and
//! returns its text items, `GET /stream` subscribes to relayed upstream messages.

use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{middleware, Json, Router};
use futures::{Stream, StreamExt};
use mcprelay_gateway::server::logging_middleware;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio::net::TcpListener;
use tokio_stream::wrappers::UnboundedReceiverStream;
use tokio_util::sync::CancellationToken;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use crate::bridge::{BridgeConfig, McpBridge};
use crate::sse_gateway::SseGateway;

pub const DEFAULT_RELAY_PORT: u16 = 3001;

/// Body returned when the upstream call fails for any reason
pub const SEND_FAILURE_MESSAGE: &str = "Failed to get response from MCP";

/// Relay server configuration
#[derive(Debug, Clone)]
pub struct RelayConfig {
    pub host: String,
    pub port: u16,
    pub enable_cors: bool,
    pub bridge: BridgeConfig,
    /// Interval of SSE keep-alive comments on `/stream`
    pub sse_keep_alive: Duration,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: DEFAULT_RELAY_PORT,
            enable_cors: true,
            bridge: BridgeConfig::default(),
            sse_keep_alive: Duration::from_secs(15),
        }
    }
}

impl RelayConfig {
    pub fn addr(&self) -> Result<SocketAddr, std::net::AddrParseError> {
        format!("{}:{}", self.host, self.port).parse()
    }

    pub fn stream_url(&self) -> String {
        format!("http://localhost:{}/stream", self.port)
    }
}

#[derive(Debug, Deserialize)]
pub struct SendMessageRequest {
    pub message: String,
}

#[derive(Debug, Serialize, Deserialize, PartialEq)]
pub struct SendMessageResponse {
    pub reply: Vec<String>,
}

#[derive(Clone)]
struct RelayState {
    bridge: Arc<McpBridge>,
    gateway: Arc<SseGateway>,
    keep_alive: Duration,
}

pub struct RelayServer {
    config: RelayConfig,
    gateway: Arc<SseGateway>,
    bridge: Arc<McpBridge>,
    shutdown: CancellationToken,
}

impl RelayServer {
    pub fn new(config: RelayConfig) -> Self {
        info!("[Relay] Initializing...");
        let gateway = SseGateway::new();
        let bridge = Arc::new(McpBridge::new(config.bridge.clone(), Arc::clone(&gateway)));
        Self {
            config,
            gateway,
            bridge,
            shutdown: CancellationToken::new(),
        }
    }

    pub fn config(&self) -> &RelayConfig {
        &self.config
    }

    pub fn gateway(&self) -> Arc<SseGateway> {
        Arc::clone(&self.gateway)
    }

    pub fn bridge(&self) -> Arc<McpBridge> {
        Arc::clone(&self.bridge)
    }

    pub fn router(&self) -> Router {
        let state = RelayState {
            bridge: Arc::clone(&self.bridge),
            gateway: Arc::clone(&self.gateway),
            keep_alive: self.config.sse_keep_alive,
        };

        let mut router = Router::new()
            .route("/health", get(health))
            .route("/send-message", post(send_message))
            .route("/stream", get(stream))
            .with_state(state)
            .layer(TraceLayer::new_for_http())
            .layer(middleware::from_fn(
                logging_middleware::http_logging_middleware,
            ));

        if self.config.enable_cors {
            router = router.layer(
                CorsLayer::new()
                    .allow_origin(Any)
                    .allow_methods(Any)
                    .allow_headers(Any),
            );
        }
        router
    }

    pub async fn run(&self) -> anyhow::Result<()> {
        let addr = self.config.addr()?;
        let listener = TcpListener::bind(addr).await?;
        self.serve(listener).await
    }

    pub async fn serve(&self, listener: TcpListener) -> anyhow::Result<()> {
        let addr = listener.local_addr()?;
        info!("[Relay] Starting on {}", addr);
        info!("[Relay] Upstream: {}", self.config.bridge.upstream_url);

        axum::serve(listener, self.router())
            .with_graceful_shutdown(self.shutdown.clone().cancelled_owned())
            .await?;

        info!("[Relay] Stopped");
        Ok(())
    }

    /// End subscriber streams, drop the upstream connection and stop serving
    pub async fn cleanup(&self) {
        info!("[Relay] Shutting down");
        self.gateway.close_all();
        self.bridge.shutdown().await;
        self.shutdown.cancel();
    }
}

async fn health(State(state): State<RelayState>) -> Json<serde_json::Value> {
    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "subscribers": state.gateway.subscriber_count(),
        "upstream_connected": state.bridge.is_connected(),
        "upstream_tools": state.bridge.cached_tools(),
    }))
}

async fn send_message(
    State(state): State<RelayState>,
    Json(body): Json<SendMessageRequest>,
) -> Response {
    match state.bridge.send_message(&body.message).await {
        Ok(reply) => Json(SendMessageResponse { reply }).into_response(),
        Err(e) => {
            warn!(error = %e, "[Relay] send-message failed");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "error": SEND_FAILURE_MESSAGE })),
            )
                .into_response()
        }
    }
}

async fn stream(
    State(state): State<RelayState>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let (subscription, rx) = state.gateway.subscribe();

    // The subscription lives as long as the response body
    let events = UnboundedReceiverStream::new(rx).map(move |text| {
        let _ = &subscription;
        Ok::<_, Infallible>(Event::default().data(text))
    });

    Sse::new(events).keep_alive(KeepAlive::new().interval(state.keep_alive))
}
