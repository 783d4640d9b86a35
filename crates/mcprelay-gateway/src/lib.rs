//! McpRelay Gateway
//!
//! Session-scoped Streamable HTTP server for a self-mutating tool registry:
//! - `session`: per-session transports and the store that owns them
//! - `registry`: the tool snapshot, its refresh ticker and the built-in tools
//! - `services`: notification fan-out to session streams
//! - `mcp`: JSON-RPC method handling
//! - `server`: axum router, dispatcher and lifecycle

pub mod logging;
pub mod mcp;
pub mod registry;
pub mod server;
pub mod services;
pub mod session;

pub use mcp::{DemoStreamConfig, McpHandler};
pub use registry::{
    GreetCatalog, RegisteredTool, ToolCatalog, ToolContext, ToolHandler, ToolRegistry,
    ToolSnapshot, MULTI_GREET_TOOL, SINGLE_GREET_PREFIX,
};
pub use server::{DispatchError, GatewayConfig, GatewayServer, ProtocolDispatcher};
pub use services::{BroadcastReport, Delivery, NotificationBroadcaster, NotificationEmitter};
pub use session::{SessionStore, SessionTransport};
