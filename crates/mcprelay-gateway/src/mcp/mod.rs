//! MCP protocol layer
//!
//! - `handler`: answers JSON-RPC messages forwarded to a session
//! - `demo_stream`: timed sequence sent when a notification stream opens

mod demo_stream;
mod handler;

pub use demo_stream::{spawn_demo_stream, DemoStreamConfig, STREAM_COMPLETE, STREAM_ESTABLISHED};
pub use handler::McpHandler;
