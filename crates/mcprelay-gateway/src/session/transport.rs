//! Per-session transport
//!
//! A `SessionTransport` is the single binding between a session id and the outside
//! world. Request/response traffic is carried by individual POSTs; notifications a
//! tool emits while answering one go out on that POST's own response stream.
//! Everything else server-initiated is written into the one standalone SSE stream
//! opened by `GET /mcp`.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use mcprelay_core::{LogLevel, Notification, SessionId, SessionState, TransportError};
use parking_lot::{Mutex, RwLock};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// Why a stream could not be attached
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum StreamAttachError {
    #[error("session is closed")]
    Closed,
    #[error("session already has an open stream")]
    AlreadyAttached,
}

/// Receiving half of an attached stream, handed to the HTTP layer
pub struct StreamAttachment {
    pub stream_id: u64,
    pub receiver: mpsc::UnboundedReceiver<String>,
    /// Cancelled when this stream detaches or the session closes
    pub token: CancellationToken,
}

struct StreamSink {
    stream_id: u64,
    tx: mpsc::UnboundedSender<String>,
    token: CancellationToken,
}

pub struct SessionTransport {
    id: SessionId,
    state: RwLock<SessionState>,
    stream: Mutex<Option<StreamSink>>,
    next_stream_id: AtomicU64,
    min_level: RwLock<LogLevel>,
    protocol_version: RwLock<Option<String>>,
    closed: CancellationToken,
}

impl std::fmt::Debug for SessionTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionTransport")
            .field("id", &self.id)
            .field("state", &*self.state.read())
            .field("protocol_version", &*self.protocol_version.read())
            .field("has_stream", &self.has_stream())
            .finish()
    }
}

impl SessionTransport {
    pub fn new(id: SessionId) -> Arc<Self> {
        Arc::new(Self {
            id,
            state: RwLock::new(SessionState::Initializing),
            stream: Mutex::new(None),
            next_stream_id: AtomicU64::new(1),
            min_level: RwLock::new(LogLevel::default()),
            protocol_version: RwLock::new(None),
            closed: CancellationToken::new(),
        })
    }

    pub fn id(&self) -> &SessionId {
        &self.id
    }

    pub fn state(&self) -> SessionState {
        *self.state.read()
    }

    pub fn is_closed(&self) -> bool {
        self.state() == SessionState::Closed
    }

    /// Complete the handshake. Returns false if the session was not initializing.
    pub fn activate(&self, protocol_version: &str) -> bool {
        let mut state = self.state.write();
        if !state.can_transition_to(SessionState::Active) {
            return false;
        }
        *state = SessionState::Active;
        *self.protocol_version.write() = Some(protocol_version.to_string());
        true
    }

    /// Version agreed during the handshake
    pub fn protocol_version(&self) -> Option<String> {
        self.protocol_version.read().clone()
    }

    pub fn set_min_level(&self, level: LogLevel) {
        debug!(session_id = %self.id, level = ?level, "[Session] Logging level set");
        *self.min_level.write() = level;
    }

    pub fn min_level(&self) -> LogLevel {
        *self.min_level.read()
    }

    /// Close the transport. Idempotent; returns true only for the call that closed it.
    ///
    /// Drops the stream sender (ending the SSE response) and cancels every timer
    /// scheduled against the session.
    pub fn close(&self) -> bool {
        {
            let mut state = self.state.write();
            if *state == SessionState::Closed {
                return false;
            }
            *state = SessionState::Closed;
        }
        if let Some(sink) = self.stream.lock().take() {
            sink.token.cancel();
        }
        self.closed.cancel();
        info!(session_id = %self.id, "[Session] Closed");
        true
    }

    /// Token cancelled when the session closes
    pub fn closed_token(&self) -> CancellationToken {
        self.closed.clone()
    }

    pub fn has_stream(&self) -> bool {
        self.stream.lock().is_some()
    }

    /// Attach the standalone notification stream. Only one may be open at a time.
    pub fn attach_stream(&self) -> Result<StreamAttachment, StreamAttachError> {
        if self.is_closed() {
            return Err(StreamAttachError::Closed);
        }
        let mut slot = self.stream.lock();
        if slot.as_ref().is_some_and(|sink| !sink.tx.is_closed()) {
            return Err(StreamAttachError::AlreadyAttached);
        }

        let stream_id = self.next_stream_id.fetch_add(1, Ordering::Relaxed);
        let (tx, receiver) = mpsc::unbounded_channel();
        let token = self.closed.child_token();
        *slot = Some(StreamSink {
            stream_id,
            tx,
            token: token.clone(),
        });
        debug!(session_id = %self.id, stream_id, "[Session] Stream attached");

        Ok(StreamAttachment {
            stream_id,
            receiver,
            token,
        })
    }

    /// Detach a stream if it is still the current one
    pub fn detach_stream(&self, stream_id: u64) {
        let mut slot = self.stream.lock();
        if slot.as_ref().is_some_and(|sink| sink.stream_id == stream_id) {
            if let Some(sink) = slot.take() {
                sink.token.cancel();
            }
            debug!(session_id = %self.id, stream_id, "[Session] Stream detached");
        }
    }

    /// Serialize a notification for this session, or `None` when it is below the
    /// session's logging level
    fn encode(&self, notification: &Notification) -> Result<Option<String>, TransportError> {
        if self.is_closed() {
            return Err(TransportError::Closed(self.id.to_string()));
        }
        if notification
            .level()
            .is_some_and(|level| level < self.min_level())
        {
            return Ok(None);
        }
        Ok(Some(serde_json::to_string(&notification.to_json_rpc())?))
    }

    /// Write a notification to the open stream.
    ///
    /// Returns `Ok(false)` when the notification is below the session's logging level.
    pub fn send(&self, notification: &Notification) -> Result<bool, TransportError> {
        let Some(payload) = self.encode(notification)? else {
            return Ok(false);
        };
        let slot = self.stream.lock();
        let sink = slot
            .as_ref()
            .ok_or_else(|| TransportError::NoStream(self.id.to_string()))?;
        sink.tx
            .send(payload)
            .map_err(|_| TransportError::Closed(self.id.to_string()))?;
        Ok(true)
    }

    /// Write a notification to the response stream of an in-flight request.
    ///
    /// Same level filtering as [`send`](Self::send). A failed write means the client
    /// dropped that response and leaves the session open.
    pub fn send_related(
        &self,
        response: &mpsc::UnboundedSender<String>,
        notification: &Notification,
    ) -> Result<bool, TransportError> {
        let Some(payload) = self.encode(notification)? else {
            return Ok(false);
        };
        response
            .send(payload)
            .map_err(|_| TransportError::Closed(self.id.to_string()))?;
        Ok(true)
    }
}
