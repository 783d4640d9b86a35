//! Shared router state

use std::sync::Arc;

use axum::extract::FromRef;

use super::dispatcher::ProtocolDispatcher;
use crate::registry::ToolRegistry;

#[derive(Clone)]
pub struct AppState {
    pub dispatcher: ProtocolDispatcher,
    pub registry: Arc<ToolRegistry>,
}

impl FromRef<AppState> for ProtocolDispatcher {
    fn from_ref(state: &AppState) -> Self {
        state.dispatcher.clone()
    }
}
