//! Gateway Server
//!
//! HTTP server exposing the tool registry over the Streamable HTTP transport.
//! Owns the session store, the registry and its refresh ticker; `cleanup` tears all
//! of them down.

mod dispatcher;
mod error;
mod handlers;
pub mod logging_middleware;
mod state;

pub use dispatcher::ProtocolDispatcher;
pub use error::DispatchError;
pub use state::AppState;

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::{middleware, routing::get, Router};
use mcprelay_core::protocol::Implementation;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::mcp::{DemoStreamConfig, McpHandler};
use crate::registry::{GreetCatalog, ToolCatalog, ToolRegistry};
use crate::services::{NotificationBroadcaster, NotificationEmitter};
use crate::session::SessionStore;

pub const DEFAULT_GATEWAY_PORT: u16 = 3000;

/// Gateway server configuration
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    pub host: String,
    pub port: u16,
    /// Enable CORS for browser access
    pub enable_cors: bool,
    /// Name reported in `serverInfo`
    pub server_name: String,
    pub server_version: String,
    /// Period of the tool-set refresh ticker
    pub tool_refresh_interval: Duration,
    /// Delay after each greeting of the multi-greet tool
    pub greet_spacing: Duration,
    pub demo_stream: DemoStreamConfig,
    /// Interval of SSE keep-alive comments
    pub sse_keep_alive: Duration,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: DEFAULT_GATEWAY_PORT,
            enable_cors: true,
            server_name: "remote-mcp-server".to_string(),
            server_version: env!("CARGO_PKG_VERSION").to_string(),
            tool_refresh_interval: Duration::from_secs(5),
            greet_spacing: Duration::from_secs(1),
            demo_stream: DemoStreamConfig::default(),
            sse_keep_alive: Duration::from_secs(15),
        }
    }
}

impl GatewayConfig {
    pub fn addr(&self) -> Result<SocketAddr, std::net::AddrParseError> {
        format!("{}:{}", self.host, self.port).parse()
    }

    /// Uses localhost for consistency with client configurations
    pub fn base_url(&self) -> String {
        format!("http://localhost:{}", self.port)
    }

    pub fn mcp_url(&self) -> String {
        format!("{}/mcp", self.base_url())
    }
}

/// MCP Gateway Server
pub struct GatewayServer {
    config: GatewayConfig,
    sessions: Arc<SessionStore>,
    registry: Arc<ToolRegistry>,
    broadcaster: Arc<NotificationBroadcaster>,
    dispatcher: ProtocolDispatcher,
    shutdown: CancellationToken,
}

impl GatewayServer {
    /// Gateway serving the built-in greeting tools
    pub fn new(config: GatewayConfig) -> Self {
        let catalog = Arc::new(GreetCatalog::new(config.greet_spacing));
        Self::with_catalog(config, catalog)
    }

    pub fn with_catalog(config: GatewayConfig, catalog: Arc<dyn ToolCatalog>) -> Self {
        info!("[Gateway] Initializing...");

        let sessions = SessionStore::new();
        let broadcaster = Arc::new(NotificationBroadcaster::new(Arc::clone(&sessions)));
        let emitter: Arc<dyn NotificationEmitter> = broadcaster.clone();
        let registry = ToolRegistry::new(catalog, config.tool_refresh_interval);

        let handler = McpHandler::new(
            Arc::clone(&registry),
            Arc::clone(&emitter),
            Implementation {
                name: config.server_name.clone(),
                version: config.server_version.clone(),
            },
        );
        let dispatcher = ProtocolDispatcher::new(
            Arc::clone(&sessions),
            handler,
            emitter,
            config.demo_stream.clone(),
            config.sse_keep_alive,
        );

        Self {
            config,
            sessions,
            registry,
            broadcaster,
            dispatcher,
            shutdown: CancellationToken::new(),
        }
    }

    pub fn config(&self) -> &GatewayConfig {
        &self.config
    }

    pub fn sessions(&self) -> Arc<SessionStore> {
        Arc::clone(&self.sessions)
    }

    pub fn registry(&self) -> Arc<ToolRegistry> {
        Arc::clone(&self.registry)
    }

    pub fn broadcaster(&self) -> Arc<NotificationBroadcaster> {
        Arc::clone(&self.broadcaster)
    }

    /// Build the Axum router
    pub fn router(&self) -> Router {
        let state = AppState {
            dispatcher: self.dispatcher.clone(),
            registry: Arc::clone(&self.registry),
        };

        let mut router = Router::new()
            .route("/health", get(handlers::health))
            .route(
                "/mcp",
                get(handlers::mcp_get)
                    .post(handlers::mcp_post)
                    .delete(handlers::mcp_delete),
            )
            .route("/mcp/session-id", get(handlers::session_id))
            .with_state(state)
            .layer(TraceLayer::new_for_http())
            .layer(middleware::from_fn(
                logging_middleware::http_logging_middleware,
            ));

        if self.config.enable_cors {
            let cors = CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any)
                .expose_headers(Any);
            router = router.layer(cors);
        }

        router
    }

    /// Bind the configured address and serve until `cleanup` is called
    pub async fn run(&self) -> anyhow::Result<()> {
        let addr = self.config.addr()?;
        let listener = TcpListener::bind(addr).await?;
        self.serve(listener).await
    }

    /// Serve on an already bound listener
    pub async fn serve(&self, listener: TcpListener) -> anyhow::Result<()> {
        let addr = listener.local_addr()?;
        info!("[Gateway] Starting on {}", addr);
        info!(
            "[Gateway] CORS: {}",
            if self.config.enable_cors {
                "enabled"
            } else {
                "disabled"
            }
        );

        let emitter: Arc<dyn NotificationEmitter> = self.broadcaster.clone();
        self.registry.start(emitter);

        info!("[Gateway] Ready to accept connections");
        axum::serve(listener, self.router())
            .with_graceful_shutdown(self.shutdown.clone().cancelled_owned())
            .await?;

        info!("[Gateway] Stopped");
        Ok(())
    }

    /// Stop the refresh ticker, close every session and stop accepting connections
    pub async fn cleanup(&self) {
        info!("[Gateway] Shutting down");
        self.registry.shutdown().await;
        self.sessions.close_all();
        self.shutdown.cancel();
    }

    /// Start the server in the background
    pub fn spawn(self: Arc<Self>) -> tokio::task::JoinHandle<anyhow::Result<()>> {
        tokio::spawn(async move { self.run().await })
    }
}
