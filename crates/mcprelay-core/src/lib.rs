//! McpRelay Core
//!
//! Shared domain types for the gateway and the relay:
//! - JSON-RPC wire format and the `mcp-session-id` header contract
//! - Tool descriptors, parameter schemas and argument validation
//! - Server-to-client notifications
//! - Error taxonomy (invocation and transport errors)

pub mod error;
pub mod notification;
pub mod protocol;
pub mod session;
pub mod tool;

pub use error::{InvocationError, TransportError};
pub use notification::{LogLevel, Notification};
pub use protocol::{
    error_codes, is_initialize_request, IncomingMessage, InitializeParams, JsonRpcError,
    JsonRpcNotification, JsonRpcResponse, JSONRPC_VERSION, SESSION_ID_HEADER,
};
pub use session::{SessionId, SessionState};
pub use tool::{
    ParamField, ParamKind, ParamSchema, ParamValue, ToolArguments, ToolContent, ToolDescriptor,
    ToolResult,
};
