//! Protocol Dispatcher
//!
//! Maps stateless HTTP calls on `/mcp` onto sessions:
//! - POST without a session id must be a handshake; it mints and binds a new session
//! - POST with a known session id is forwarded to that session's transport; a
//!   single `tools/call` from a client that accepts SSE is answered on a stream so
//!   the tool's notifications precede its result
//! - GET opens the session's single notification stream
//! - DELETE closes the session

use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    body::Bytes,
    http::{HeaderName, HeaderValue, StatusCode},
    response::{
        sse::{Event, KeepAlive, Sse},
        IntoResponse, Response,
    },
    Json,
};
use futures::{Stream, StreamExt};
use mcprelay_core::protocol::request_id_of;
use mcprelay_core::{
    error_codes, is_initialize_request, IncomingMessage, JsonRpcError, JsonRpcResponse,
    SessionState, SESSION_ID_HEADER,
};
use serde_json::Value;
use tokio::sync::mpsc;
use tokio_stream::wrappers::UnboundedReceiverStream;
use tracing::{debug, info, warn};

use super::error::DispatchError;
use crate::mcp::{spawn_demo_stream, DemoStreamConfig, McpHandler};
use crate::services::NotificationEmitter;
use crate::session::{SessionStore, SessionTransport, StreamAttachError};

#[derive(Clone)]
pub struct ProtocolDispatcher {
    sessions: Arc<SessionStore>,
    handler: McpHandler,
    emitter: Arc<dyn NotificationEmitter>,
    demo_stream: DemoStreamConfig,
    keep_alive: Duration,
}

/// Detaches the stream and closes its session when the SSE response is dropped
struct StreamGuard {
    transport: Arc<SessionTransport>,
    stream_id: u64,
}

impl Drop for StreamGuard {
    fn drop(&mut self) {
        debug!(
            session_id = %self.transport.id(),
            stream_id = self.stream_id,
            "[Dispatcher] Stream disconnected"
        );
        self.transport.detach_stream(self.stream_id);
        self.transport.close();
    }
}

/// JSON-RPC payload of a POST: one message or a batch
enum Payload {
    Single(IncomingMessage),
    Batch(Vec<Value>),
}

const TOOLS_CALL: &str = "tools/call";

impl ProtocolDispatcher {
    pub fn new(
        sessions: Arc<SessionStore>,
        handler: McpHandler,
        emitter: Arc<dyn NotificationEmitter>,
        demo_stream: DemoStreamConfig,
        keep_alive: Duration,
    ) -> Self {
        Self {
            sessions,
            handler,
            emitter,
            demo_stream,
            keep_alive,
        }
    }

    pub fn sessions(&self) -> &Arc<SessionStore> {
        &self.sessions
    }

    /// POST /mcp: handshake or continuation.
    ///
    /// `accepts_stream` is whether the client listed `text/event-stream` in `Accept`.
    pub async fn handle_post(
        &self,
        session_id: Option<&str>,
        accepts_stream: bool,
        body: &Bytes,
    ) -> Result<Response, DispatchError> {
        let body: Value =
            serde_json::from_slice(body).map_err(|e| DispatchError::Parse(e.to_string()))?;
        let request_id = request_id_of(&body);
        let handshake = is_initialize_request(&body);

        match session_id {
            Some(id) => {
                let transport = self
                    .sessions
                    .get(id)
                    .ok_or(DispatchError::InvalidSession { id: request_id.clone() })?;
                if handshake {
                    return Err(DispatchError::BadRequest {
                        code: error_codes::INVALID_REQUEST,
                        message: "Invalid Request: Server already initialized".to_string(),
                        id: request_id,
                    });
                }
                let mut response = self
                    .forward(Arc::clone(&transport), body, accepts_stream)
                    .await?;
                set_session_header(&mut response, &transport)?;
                Ok(response)
            }
            None if handshake => self.handshake(body).await,
            None => {
                debug!("[Dispatcher] Rejecting non-handshake POST without session id");
                Err(DispatchError::InvalidSession { id: request_id })
            }
        }
    }

    async fn handshake(&self, body: Value) -> Result<Response, DispatchError> {
        let transport = SessionTransport::new(self.sessions.create());
        let mut response = self.forward(Arc::clone(&transport), body, false).await?;

        if transport.state() != SessionState::Active {
            warn!(session_id = %transport.id(), "[Dispatcher] Handshake did not activate session");
            transport.close();
            return Ok(response);
        }

        self.sessions
            .bind(Arc::clone(&transport))
            .map_err(|e| DispatchError::Internal(e.into()))?;
        set_session_header(&mut response, &transport)?;
        info!(
            session_id = %transport.id(),
            protocol_version = ?transport.protocol_version(),
            "[Dispatcher] Session established"
        );
        Ok(response)
    }

    /// Hand the body to the session transport and shape its replies into a response.
    ///
    /// Runs on its own task so a panicking handler surfaces as a 500 rather than a
    /// dropped connection.
    async fn forward(
        &self,
        transport: Arc<SessionTransport>,
        body: Value,
        accepts_stream: bool,
    ) -> Result<Response, DispatchError> {
        let payload = match body {
            Value::Array(items) if items.is_empty() => {
                return Err(DispatchError::BadRequest {
                    code: error_codes::INVALID_REQUEST,
                    message: "Invalid Request: empty batch".to_string(),
                    id: Value::Null,
                })
            }
            Value::Array(items) => Payload::Batch(items),
            single => {
                let message =
                    IncomingMessage::classify(&single).map_err(|reason| DispatchError::BadRequest {
                        code: error_codes::INVALID_REQUEST,
                        message: format!("Invalid Request: {}", reason),
                        id: request_id_of(&single),
                    })?;
                Payload::Single(message)
            }
        };

        let payload = match payload {
            Payload::Single(message)
                if accepts_stream
                    && message.is_request()
                    && message.method() == Some(TOOLS_CALL) =>
            {
                return Ok(self.stream_reply(transport, message));
            }
            other => other,
        };

        let handler = self.handler.clone();
        let task = tokio::spawn(async move {
            let items = match payload {
                Payload::Single(message) => {
                    let reply = handler.handle_message(&transport, message).await;
                    return (reply.into_iter().collect::<Vec<_>>(), false);
                }
                Payload::Batch(items) => items,
            };

            let mut replies = Vec::new();
            for item in items {
                match IncomingMessage::classify(&item) {
                    Ok(message) => {
                        if let Some(reply) = handler.handle_message(&transport, message).await {
                            replies.push(reply);
                        }
                    }
                    Err(reason) => replies.push(JsonRpcResponse::failure(
                        request_id_of(&item),
                        JsonRpcError::new(
                            error_codes::INVALID_REQUEST,
                            format!("Invalid Request: {}", reason),
                        ),
                    )),
                }
            }
            (replies, true)
        });

        let (mut replies, is_batch) = task
            .await
            .map_err(|e| DispatchError::Internal(anyhow::anyhow!("request handler failed: {}", e)))?;

        Ok(match (replies.len(), is_batch) {
            (0, _) => StatusCode::ACCEPTED.into_response(),
            (_, true) => Json(replies).into_response(),
            (_, false) => match replies.pop() {
                Some(reply) => Json(reply).into_response(),
                None => StatusCode::ACCEPTED.into_response(),
            },
        })
    }

    /// Answer one tool call on an SSE response: every notification the tool raises,
    /// then the result frame, then end of stream
    fn stream_reply(&self, transport: Arc<SessionTransport>, message: IncomingMessage) -> Response {
        let request_id = match &message {
            IncomingMessage::Request { id, .. } => id.clone(),
            _ => Value::Null,
        };
        debug!(session_id = %transport.id(), id = %request_id, "[Dispatcher] Streaming tool call reply");

        let (tx, rx) = mpsc::unbounded_channel::<String>();
        let handler = self.handler.clone();
        tokio::spawn(async move {
            let call = {
                let transport = Arc::clone(&transport);
                let tx = tx.clone();
                tokio::spawn(async move {
                    handler
                        .handle_message_streaming(&transport, message, Some(tx))
                        .await
                })
            };
            let reply = match call.await {
                Ok(Some(reply)) => reply,
                Ok(None) => return,
                Err(e) => JsonRpcResponse::failure(
                    request_id,
                    JsonRpcError::new(
                        error_codes::INTERNAL_ERROR,
                        format!("request handler failed: {}", e),
                    ),
                ),
            };

            match serde_json::to_string(&reply) {
                Ok(frame) => {
                    if tx.send(frame).is_err() {
                        debug!(
                            session_id = %transport.id(),
                            "[Dispatcher] Client left before the tool result"
                        );
                    }
                }
                Err(e) => warn!(error = %e, "[Dispatcher] Failed to encode tool result"),
            }
        });

        let events = UnboundedReceiverStream::new(rx)
            .map(|frame| Ok::<_, Infallible>(Event::default().data(frame)));
        Sse::new(events).into_response()
    }

    /// GET /mcp: open the session's notification stream
    pub fn handle_stream_open(
        &self,
        session_id: Option<&str>,
    ) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, DispatchError> {
        let id = session_id.ok_or_else(DispatchError::invalid_session)?;
        let transport = self
            .sessions
            .get(id)
            .ok_or_else(DispatchError::invalid_session)?;

        let attachment = transport.attach_stream().map_err(|e| match e {
            StreamAttachError::AlreadyAttached => DispatchError::StreamConflict,
            StreamAttachError::Closed => DispatchError::invalid_session(),
        })?;
        info!(
            session_id = %transport.id(),
            stream_id = attachment.stream_id,
            "[Dispatcher] Notification stream opened"
        );

        spawn_demo_stream(
            Arc::clone(&transport),
            Arc::clone(&self.emitter),
            self.demo_stream.clone(),
            attachment.token.clone(),
        );

        let guard = StreamGuard {
            transport,
            stream_id: attachment.stream_id,
        };
        let stream = UnboundedReceiverStream::new(attachment.receiver).map(move |payload| {
            let _ = &guard;
            Ok::<_, Infallible>(Event::default().data(payload))
        });

        Ok(Sse::new(stream).keep_alive(KeepAlive::new().interval(self.keep_alive)))
    }

    /// DELETE /mcp: terminate the session
    pub fn handle_delete(&self, session_id: Option<&str>) -> Result<StatusCode, DispatchError> {
        let id = session_id.ok_or_else(DispatchError::invalid_session)?;
        self.sessions
            .remove(id)
            .ok_or_else(DispatchError::invalid_session)?;
        info!(session_id = %id, "[Dispatcher] Session terminated by client");
        Ok(StatusCode::OK)
    }
}

fn set_session_header(
    response: &mut Response,
    transport: &SessionTransport,
) -> Result<(), DispatchError> {
    let value = HeaderValue::from_str(transport.id().as_str())
        .map_err(|e| DispatchError::Internal(e.into()))?;
    response
        .headers_mut()
        .insert(HeaderName::from_static(SESSION_ID_HEADER), value);
    Ok(())
}
