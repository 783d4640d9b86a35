//! SSE Gateway - fans notification text out to passive subscribers
//!
//! Independent of MCP sessions: a subscriber is an open `GET /stream` response and
//! nothing more. Each subscriber owns a [`Subscription`] guard; dropping it (client
//! disconnect) removes the sink.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use tokio::sync::mpsc;
use tracing::{debug, info, trace};

#[derive(Debug, Default)]
pub struct SseGateway {
    subscribers: Mutex<BTreeMap<u64, mpsc::UnboundedSender<String>>>,
    next_id: AtomicU64,
}

/// Membership of one subscriber; removes it from the gateway on drop
#[derive(Debug)]
pub struct Subscription {
    id: u64,
    gateway: Weak<SseGateway>,
}

impl Subscription {
    pub fn id(&self) -> u64 {
        self.id
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(gateway) = self.gateway.upgrade() {
            gateway.unsubscribe(self.id);
        }
    }
}

impl SseGateway {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn subscribe(self: &Arc<Self>) -> (Subscription, mpsc::UnboundedReceiver<String>) {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = mpsc::unbounded_channel();
        let total = {
            let mut subscribers = self.subscribers.lock();
            subscribers.insert(id, tx);
            subscribers.len()
        };
        info!(subscriber = id, total, "[SseGateway] Subscriber connected");

        (
            Subscription {
                id,
                gateway: Arc::downgrade(self),
            },
            rx,
        )
    }

    fn unsubscribe(&self, id: u64) {
        let mut subscribers = self.subscribers.lock();
        if subscribers.remove(&id).is_some() {
            info!(subscriber = id, total = subscribers.len(), "[SseGateway] Subscriber disconnected");
        }
    }

    /// Write `text` to every current subscriber in subscription order.
    ///
    /// A failed write is skipped; the failing subscriber is removed when its
    /// connection drops. Returns the number of successful writes.
    pub fn publish(&self, text: &str) -> usize {
        let subscribers = self.subscribers.lock();
        let mut delivered = 0;
        for (id, tx) in subscribers.iter() {
            match tx.send(text.to_string()) {
                Ok(()) => delivered += 1,
                Err(_) => debug!(subscriber = id, "[SseGateway] Write to closed subscriber skipped"),
            }
        }
        trace!(delivered, total = subscribers.len(), "[SseGateway] Published");
        delivered
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.lock().len()
    }

    /// End every subscriber stream
    pub fn close_all(&self) {
        let mut subscribers = self.subscribers.lock();
        if !subscribers.is_empty() {
            info!(count = subscribers.len(), "[SseGateway] Closing all subscribers");
        }
        subscribers.clear();
    }
}
