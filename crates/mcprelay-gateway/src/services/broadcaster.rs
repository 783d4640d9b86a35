//! Notification Broadcaster - fans server-initiated notifications out to sessions
//!
//! A failed write closes the offending session and never aborts the fan-out, so one
//! dead client cannot starve the rest.

use std::sync::Arc;

use mcprelay_core::{Notification, TransportError};
use tracing::{debug, info, trace, warn};

use super::notification_emitter::{BroadcastReport, Delivery, NotificationEmitter};
use crate::session::{SessionStore, SessionTransport};

#[derive(Clone)]
pub struct NotificationBroadcaster {
    sessions: Arc<SessionStore>,
}

impl NotificationBroadcaster {
    pub fn new(sessions: Arc<SessionStore>) -> Self {
        Self { sessions }
    }

    pub fn send(&self, transport: &Arc<SessionTransport>, notification: &Notification) -> Delivery {
        match transport.send(notification) {
            Ok(true) => {
                trace!(
                    session_id = %transport.id(),
                    method = notification.method(),
                    "[Broadcaster] Notification sent"
                );
                Delivery::Sent
            }
            Ok(false) => Delivery::Filtered,
            Err(TransportError::NoStream(_)) => {
                debug!(
                    session_id = %transport.id(),
                    method = notification.method(),
                    "[Broadcaster] No open stream, notification dropped"
                );
                Delivery::NoStream
            }
            Err(e) => {
                warn!(
                    session_id = %transport.id(),
                    method = notification.method(),
                    error = %e,
                    "[Broadcaster] Write failed, closing session"
                );
                transport.close();
                Delivery::Failed
            }
        }
    }

    /// Send to every bound session
    pub fn broadcast_all(&self, notification: &Notification) -> BroadcastReport {
        let mut report = BroadcastReport::default();
        for transport in self.sessions.transports() {
            report.attempted += 1;
            if self.send(&transport, notification) == Delivery::Sent {
                report.delivered += 1;
            }
        }
        if report.attempted > 0 {
            info!(
                method = notification.method(),
                attempted = report.attempted,
                delivered = report.delivered,
                "[Broadcaster] Broadcast complete"
            );
        }
        report
    }
}

impl NotificationEmitter for NotificationBroadcaster {
    fn emit_to(&self, transport: &Arc<SessionTransport>, notification: &Notification) -> Delivery {
        self.send(transport, notification)
    }

    fn emit_tools_changed(&self) -> BroadcastReport {
        self.broadcast_all(&Notification::ToolsListChanged)
    }
}
