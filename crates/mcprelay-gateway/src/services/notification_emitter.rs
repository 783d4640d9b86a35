//! Notification Emitter Trait
//!
//! Tools and the registry ticker depend on this trait rather than on the broadcaster,
//! so handlers can be exercised against a recording emitter in tests.

use std::sync::Arc;

use mcprelay_core::Notification;

use crate::session::SessionTransport;

/// Outcome of writing one notification to one session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    Sent,
    /// Below the session's logging level
    Filtered,
    /// Session has no open stream; the notification is dropped
    NoStream,
    /// Stream write failed. On the standalone stream this also closes the session.
    Failed,
}

/// Result of a fan-out to every bound session
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BroadcastReport {
    pub attempted: usize,
    pub delivered: usize,
}

/// Emits server-initiated notifications to connected sessions
///
/// **Object Safety**: takes concrete references so it can live behind `Arc<dyn _>`.
pub trait NotificationEmitter: Send + Sync {
    /// Write a notification to one session's stream
    fn emit_to(&self, transport: &Arc<SessionTransport>, notification: &Notification) -> Delivery;

    /// Emit tools/list_changed to every bound session
    fn emit_tools_changed(&self) -> BroadcastReport;
}
