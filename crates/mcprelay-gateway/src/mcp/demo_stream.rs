//! Timed message sequence sent on every freshly opened notification stream

use std::sync::Arc;
use std::time::Duration;

use chrono::{SecondsFormat, Utc};
use mcprelay_core::Notification;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::services::{Delivery, NotificationEmitter};
use crate::session::SessionTransport;

pub const STREAM_ESTABLISHED: &str = "SSE Connection established";
pub const STREAM_COMPLETE: &str = "Streaming complete!";

#[derive(Debug, Clone)]
pub struct DemoStreamConfig {
    /// Spacing between timed messages
    pub interval: Duration,
    /// Number of timed messages before the completion marker
    pub messages: u32,
}

impl Default for DemoStreamConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(1),
            messages: 2,
        }
    }
}

/// Send the greeting, then `messages` timestamped messages one `interval` apart,
/// then the completion marker. Stops early when `token` is cancelled or a write fails.
pub fn spawn_demo_stream(
    transport: Arc<SessionTransport>,
    emitter: Arc<dyn NotificationEmitter>,
    config: DemoStreamConfig,
    token: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        if !delivered(emitter.emit_to(&transport, &Notification::info(STREAM_ESTABLISHED))) {
            return;
        }

        let start = tokio::time::Instant::now() + config.interval;
        let mut interval = tokio::time::interval_at(start, config.interval);
        for n in 1..=config.messages {
            tokio::select! {
                _ = token.cancelled() => {
                    debug!(session_id = %transport.id(), "[DemoStream] Cancelled");
                    return;
                }
                _ = interval.tick() => {}
            }
            let text = format!(
                "Message {} at {}",
                n,
                Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
            );
            if !delivered(emitter.emit_to(&transport, &Notification::info(text))) {
                return;
            }
        }

        emitter.emit_to(&transport, &Notification::info(STREAM_COMPLETE));
        debug!(session_id = %transport.id(), "[DemoStream] Complete");
    })
}

fn delivered(delivery: Delivery) -> bool {
    matches!(delivery, Delivery::Sent | Delivery::Filtered)
}
