//! HTTP-level errors of the `/mcp` endpoint
//!
//! Every variant renders as a JSON-RPC error envelope; only the status code and the
//! error code differ.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use mcprelay_core::{error_codes, JsonRpcError, JsonRpcResponse};
use serde_json::Value;
use tracing::error;

#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    /// Body is not JSON
    #[error("Parse error: {0}")]
    Parse(String),

    /// Missing, unknown or unusable session id, or a non-handshake body without one
    #[error("Bad Request: invalid session ID or method.")]
    InvalidSession { id: Value },

    /// Well-formed JSON that breaks the transport rules
    #[error("{message}")]
    BadRequest { code: i64, message: String, id: Value },

    /// The session already has an open notification stream
    #[error("Conflict: session already has an open stream")]
    StreamConflict,

    #[error("Internal server error.")]
    Internal(#[source] anyhow::Error),
}

impl DispatchError {
    pub fn invalid_session() -> Self {
        DispatchError::InvalidSession { id: Value::Null }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            DispatchError::Parse(_)
            | DispatchError::InvalidSession { .. }
            | DispatchError::BadRequest { .. } => StatusCode::BAD_REQUEST,
            DispatchError::StreamConflict => StatusCode::CONFLICT,
            DispatchError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn to_envelope(&self) -> JsonRpcResponse {
        let (code, id) = match self {
            DispatchError::Parse(_) => (error_codes::PARSE_ERROR, Value::Null),
            DispatchError::InvalidSession { id } => (error_codes::SERVER_ERROR, id.clone()),
            DispatchError::BadRequest { code, id, .. } => (*code, id.clone()),
            DispatchError::StreamConflict | DispatchError::Internal(_) => {
                (error_codes::SERVER_ERROR, Value::Null)
            }
        };
        JsonRpcResponse::failure(id, JsonRpcError::new(code, self.to_string()))
    }
}

impl IntoResponse for DispatchError {
    fn into_response(self) -> Response {
        if let DispatchError::Internal(e) = &self {
            error!(error = ?e, "[Dispatcher] Internal error");
        }
        (self.status(), Json(self.to_envelope())).into_response()
    }
}
