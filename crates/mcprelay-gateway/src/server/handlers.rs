//! HTTP handlers for the gateway server

use axum::{
    body::Bytes,
    extract::State,
    http::{header, HeaderMap},
    response::{IntoResponse, Json, Response},
};
use mcprelay_core::{SessionId, SESSION_ID_HEADER};
use serde::Serialize;
use tracing::debug;

use super::dispatcher::ProtocolDispatcher;
use super::error::DispatchError;
use super::state::AppState;

/// Session id from the request headers. A header that is present but not valid
/// UTF-8 is as good as an unknown id.
fn session_header(headers: &HeaderMap) -> Result<Option<&str>, DispatchError> {
    headers
        .get(SESSION_ID_HEADER)
        .map(|v| v.to_str().map_err(|_| DispatchError::invalid_session()))
        .transpose()
}

fn accepts_event_stream(headers: &HeaderMap) -> bool {
    headers
        .get_all(header::ACCEPT)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .any(|v| v.contains("text/event-stream"))
}

pub async fn mcp_post(
    State(dispatcher): State<ProtocolDispatcher>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Response, DispatchError> {
    dispatcher
        .handle_post(session_header(&headers)?, accepts_event_stream(&headers), &body)
        .await
}

pub async fn mcp_get(
    State(dispatcher): State<ProtocolDispatcher>,
    headers: HeaderMap,
) -> Result<Response, DispatchError> {
    let sse = dispatcher.handle_stream_open(session_header(&headers)?)?;
    Ok(sse.into_response())
}

pub async fn mcp_delete(
    State(dispatcher): State<ProtocolDispatcher>,
    headers: HeaderMap,
) -> Result<Response, DispatchError> {
    let status = dispatcher.handle_delete(session_header(&headers)?)?;
    Ok(status.into_response())
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionIdResponse {
    pub session_id: SessionId,
}

/// Fresh identifier for clients that want one before the handshake
pub async fn session_id() -> Json<SessionIdResponse> {
    Json(SessionIdResponse {
        session_id: SessionId::generate(),
    })
}

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub sessions: usize,
    pub tools_generation: u64,
}

pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    debug!("[Gateway] Health check");
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        sessions: state.dispatcher.sessions().len(),
        tools_generation: state.registry.generation(),
    })
}
