//! Error taxonomy shared across crates
//!
//! Protocol and internal errors are HTTP-level concerns and live in the gateway.
//! The two kinds defined here cross crate boundaries:
//! - `InvocationError`: tool-level failure, reported to the caller as a tool result
//! - `TransportError`: write failure on an established session stream

use crate::tool::ParamKind;

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum InvocationError {
    #[error("Tool not found: {0}")]
    UnknownTool(String),

    #[error("Tool arguments are missing")]
    MissingArguments,

    #[error("Missing required argument: {0}")]
    MissingField(String),

    #[error("Argument '{name}' must be of type {expected}")]
    InvalidField { name: String, expected: ParamKind },

    #[error("Unknown argument: {0}")]
    UnknownField(String),

    #[error("{0}")]
    Failed(String),
}

#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("session {0} has no open stream")]
    NoStream(String),

    #[error("session {0} is closed")]
    Closed(String),

    #[error("failed to encode message: {0}")]
    Encode(#[from] serde_json::Error),
}
