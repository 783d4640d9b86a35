//! Session store
//!
//! Concurrent map from session id to its transport. Entries are inserted only after a
//! successful handshake and removed when the transport closes, so lookups never see a
//! half-initialized session.

use std::sync::Arc;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use mcprelay_core::SessionId;
use tracing::{debug, info};

use super::transport::SessionTransport;

#[derive(Debug, thiserror::Error)]
pub enum SessionStoreError {
    #[error("session {0} is already bound")]
    AlreadyBound(SessionId),
}

#[derive(Debug, Default)]
pub struct SessionStore {
    sessions: DashMap<SessionId, Arc<SessionTransport>>,
}

impl SessionStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Mint an id not currently bound in the store
    pub fn create(&self) -> SessionId {
        loop {
            let id = SessionId::generate();
            if !self.sessions.contains_key(&id) {
                return id;
            }
        }
    }

    pub fn get(&self, id: &str) -> Option<Arc<SessionTransport>> {
        self.sessions.get(id).map(|entry| Arc::clone(entry.value()))
    }

    pub fn contains(&self, id: &str) -> bool {
        self.sessions.contains_key(id)
    }

    /// Bind a transport to its id.
    ///
    /// A watcher task removes the entry once the transport closes, whichever side
    /// closed it.
    pub fn bind(self: &Arc<Self>, transport: Arc<SessionTransport>) -> Result<(), SessionStoreError> {
        let id = transport.id().clone();
        match self.sessions.entry(id.clone()) {
            Entry::Occupied(_) => return Err(SessionStoreError::AlreadyBound(id)),
            Entry::Vacant(slot) => {
                slot.insert(Arc::clone(&transport));
            }
        }
        info!(session_id = %id, total = self.sessions.len(), "[SessionStore] Session bound");

        let closed = transport.closed_token();
        let store = Arc::downgrade(self);
        tokio::spawn(async move {
            closed.cancelled().await;
            if let Some(store) = store.upgrade() {
                store.evict(&id, &transport);
            }
        });
        Ok(())
    }

    /// Close and remove a session. Idempotent.
    pub fn remove(&self, id: &str) -> Option<Arc<SessionTransport>> {
        let (_, transport) = self.sessions.remove(id)?;
        transport.close();
        info!(session_id = %id, total = self.sessions.len(), "[SessionStore] Session removed");
        Some(transport)
    }

    // Only remove the entry if it still points at the transport that closed
    fn evict(&self, id: &SessionId, transport: &Arc<SessionTransport>) {
        let removed = self
            .sessions
            .remove_if(id, |_, current| Arc::ptr_eq(current, transport))
            .is_some();
        if removed {
            debug!(session_id = %id, total = self.sessions.len(), "[SessionStore] Closed session evicted");
        }
    }

    /// Snapshot of every bound transport
    pub fn transports(&self) -> Vec<Arc<SessionTransport>> {
        self.sessions
            .iter()
            .map(|entry| Arc::clone(entry.value()))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    pub fn close_all(&self) {
        let ids: Vec<SessionId> = self.sessions.iter().map(|e| e.key().clone()).collect();
        for id in &ids {
            self.remove(id.as_str());
        }
        if !ids.is_empty() {
            info!(count = ids.len(), "[SessionStore] All sessions closed");
        }
    }
}
