//! Server-to-client notifications
//!
//! Notifications are fire-and-forget. They are stamped with the JSON-RPC version tag
//! when converted to the wire form and carry no id.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::protocol::{JsonRpcNotification, JSONRPC_VERSION};

pub const METHOD_MESSAGE: &str = "notifications/message";
pub const METHOD_TOOLS_LIST_CHANGED: &str = "notifications/tools/list_changed";

/// Syslog-style severity used by `notifications/message` and `logging/setLevel`
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    #[default]
    Debug,
    Info,
    Notice,
    Warning,
    Error,
    Critical,
    Alert,
    Emergency,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notification {
    /// Log-style message (`notifications/message`)
    Message { level: LogLevel, data: String },
    /// The tool list was replaced (`notifications/tools/list_changed`)
    ToolsListChanged,
}

impl Notification {
    pub fn info(data: impl Into<String>) -> Self {
        Notification::Message {
            level: LogLevel::Info,
            data: data.into(),
        }
    }

    pub fn method(&self) -> &'static str {
        match self {
            Notification::Message { .. } => METHOD_MESSAGE,
            Notification::ToolsListChanged => METHOD_TOOLS_LIST_CHANGED,
        }
    }

    /// Severity of a message notification; `None` for list-changed
    pub fn level(&self) -> Option<LogLevel> {
        match self {
            Notification::Message { level, .. } => Some(*level),
            Notification::ToolsListChanged => None,
        }
    }

    pub fn to_json_rpc(&self) -> JsonRpcNotification {
        let params = match self {
            Notification::Message { level, data } => Some(json!({
                "level": level,
                "data": data,
            })),
            Notification::ToolsListChanged => None,
        };
        JsonRpcNotification {
            jsonrpc: JSONRPC_VERSION.to_string(),
            method: self.method().to_string(),
            params,
        }
    }

    /// Parse a wire notification. Unknown methods and malformed params yield `None`.
    pub fn from_json_rpc(value: &Value) -> Option<Self> {
        let method = value.get("method")?.as_str()?;
        match method {
            METHOD_TOOLS_LIST_CHANGED => Some(Notification::ToolsListChanged),
            METHOD_MESSAGE => {
                let params = value.get("params")?;
                let level = serde_json::from_value(params.get("level")?.clone()).ok()?;
                let data = match params.get("data")? {
                    Value::String(s) => s.clone(),
                    other => other.to_string(),
                };
                Some(Notification::Message { level, data })
            }
            _ => None,
        }
    }
}
