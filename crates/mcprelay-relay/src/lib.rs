//! McpRelay Relay
//!
//! Outward-facing half of the system:
//! - `sse_gateway`: fan-out of relayed text to passive `GET /stream` subscribers
//! - `bridge`: the single upstream MCP client connection
//! - `server`: the relay HTTP surface
//! - `stream_client`: the reconnecting consumer of `/stream`

pub mod bridge;
pub mod server;
pub mod sse_gateway;
pub mod stream_client;

pub use bridge::{BridgeConfig, BridgeError, McpBridge, PublishingTransport, RelayClientHandler};
pub use server::{
    RelayConfig, RelayServer, SendMessageRequest, SendMessageResponse, DEFAULT_RELAY_PORT,
    SEND_FAILURE_MESSAGE,
};
pub use sse_gateway::{SseGateway, Subscription};
pub use stream_client::{
    DisplayLog, ReconnectingStreamClient, SseDecoder, StreamClientConfig, StreamState,
};
