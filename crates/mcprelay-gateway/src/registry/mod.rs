//! Tool Registry
//!
//! Holds the current snapshot of invocable tools. The snapshot is rebuilt wholesale
//! from a [`ToolCatalog`] on every refresh tick and swapped in atomically, after
//! which every bound session is told the list changed. Invocations resolve the tool
//! against the snapshot current at call time, so a name taken from a stale listing
//! surfaces as an ordinary `Tool not found` result.

mod greet;

pub use greet::{GreetCatalog, MULTI_GREET_TOOL, SINGLE_GREET_PREFIX};

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use mcprelay_core::{InvocationError, Notification, ToolArguments, ToolDescriptor, ToolResult};
use parking_lot::{Mutex, RwLock};
use serde_json::Value;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::services::{Delivery, NotificationEmitter};
use crate::session::SessionTransport;

/// Business logic behind one tool
#[async_trait]
pub trait ToolHandler: Send + Sync {
    async fn call(&self, args: ToolArguments, ctx: ToolContext) -> Result<ToolResult, InvocationError>;
}

/// What a handler may touch while it runs: the invoking session and a way to push
/// notifications to it.
///
/// With a response stream attached, notifications follow the request's own reply
/// and arrive ahead of the result. Without one they go to the session's standalone
/// stream.
#[derive(Clone)]
pub struct ToolContext {
    transport: Arc<SessionTransport>,
    emitter: Arc<dyn NotificationEmitter>,
    response: Option<mpsc::UnboundedSender<String>>,
}

impl ToolContext {
    pub fn new(transport: Arc<SessionTransport>, emitter: Arc<dyn NotificationEmitter>) -> Self {
        Self {
            transport,
            emitter,
            response: None,
        }
    }

    pub fn with_response_stream(mut self, response: mpsc::UnboundedSender<String>) -> Self {
        self.response = Some(response);
        self
    }

    pub fn transport(&self) -> &Arc<SessionTransport> {
        &self.transport
    }

    /// Push a notification to the invoking session. Never fails the invocation.
    pub fn notify(&self, notification: Notification) -> Delivery {
        let Some(response) = &self.response else {
            return self.emitter.emit_to(&self.transport, &notification);
        };
        match self.transport.send_related(response, &notification) {
            Ok(true) => Delivery::Sent,
            Ok(false) => Delivery::Filtered,
            Err(e) => {
                debug!(
                    session_id = %self.transport.id(),
                    error = %e,
                    "[ToolContext] Response stream gone, notification dropped"
                );
                Delivery::Failed
            }
        }
    }
}

#[derive(Clone)]
pub struct RegisteredTool {
    pub descriptor: ToolDescriptor,
    pub handler: Arc<dyn ToolHandler>,
}

/// Source of a fresh tool set on each refresh
pub trait ToolCatalog: Send + Sync {
    fn build(&self) -> Vec<RegisteredTool>;
}

/// Immutable tool set published by one refresh
pub struct ToolSnapshot {
    pub generation: u64,
    pub tools: Vec<RegisteredTool>,
}

impl ToolSnapshot {
    pub fn find(&self, name: &str) -> Option<&RegisteredTool> {
        self.tools.iter().find(|t| t.descriptor.name == name)
    }

    pub fn descriptors(&self) -> Vec<ToolDescriptor> {
        self.tools.iter().map(|t| t.descriptor.clone()).collect()
    }
}

pub struct ToolRegistry {
    catalog: Arc<dyn ToolCatalog>,
    snapshot: RwLock<Arc<ToolSnapshot>>,
    generation: AtomicU64,
    refresh_interval: Duration,
    shutdown: CancellationToken,
    ticker: Mutex<Option<JoinHandle<()>>>,
}

impl ToolRegistry {
    pub fn new(catalog: Arc<dyn ToolCatalog>, refresh_interval: Duration) -> Arc<Self> {
        let tools = catalog.build();
        Arc::new(Self {
            catalog,
            snapshot: RwLock::new(Arc::new(ToolSnapshot { generation: 1, tools })),
            generation: AtomicU64::new(1),
            refresh_interval,
            shutdown: CancellationToken::new(),
            ticker: Mutex::new(None),
        })
    }

    pub fn snapshot(&self) -> Arc<ToolSnapshot> {
        Arc::clone(&self.snapshot.read())
    }

    pub fn current_tools(&self) -> Vec<ToolDescriptor> {
        self.snapshot().descriptors()
    }

    pub fn generation(&self) -> u64 {
        self.snapshot().generation
    }

    /// Rebuild the tool set from the catalog and swap it in. Returns the new generation.
    pub fn refresh(&self) -> u64 {
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        let tools = self.catalog.build();
        let names: Vec<String> = tools.iter().map(|t| t.descriptor.name.clone()).collect();
        *self.snapshot.write() = Arc::new(ToolSnapshot { generation, tools });
        debug!(generation, tools = ?names, "[ToolRegistry] Tool set replaced");
        generation
    }

    /// Validate `arguments` against the current declaration of `name` and run it.
    pub async fn invoke(
        &self,
        name: &str,
        arguments: Option<&Value>,
        ctx: ToolContext,
    ) -> Result<ToolResult, InvocationError> {
        let tool = self
            .snapshot()
            .find(name)
            .cloned()
            .ok_or_else(|| InvocationError::UnknownTool(name.to_string()))?;

        let args = tool.descriptor.input_schema.validate(arguments)?;
        debug!(
            tool = name,
            session_id = %ctx.transport().id(),
            "[ToolRegistry] Invoking tool"
        );
        tool.handler.call(args, ctx).await
    }

    /// Start the refresh ticker. Each tick replaces the tool set and announces it.
    ///
    /// Calling this again while a ticker is running, or after `shutdown`, is a no-op.
    pub fn start(self: &Arc<Self>, emitter: Arc<dyn NotificationEmitter>) {
        let mut slot = self.ticker.lock();
        if self.shutdown.is_cancelled() || slot.as_ref().is_some_and(|h| !h.is_finished()) {
            return;
        }

        let registry = Arc::clone(self);
        let shutdown = self.shutdown.clone();
        let period = self.refresh_interval;
        info!(interval_ms = period.as_millis() as u64, "[ToolRegistry] Refresh ticker started");

        *slot = Some(tokio::spawn(async move {
            let mut interval = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    _ = interval.tick() => {
                        let generation = registry.refresh();
                        let report = emitter.emit_tools_changed();
                        debug!(
                            generation,
                            attempted = report.attempted,
                            delivered = report.delivered,
                            "[ToolRegistry] Tool list change announced"
                        );
                    }
                }
            }
            debug!("[ToolRegistry] Refresh ticker stopped");
        }));
    }

    pub fn is_running(&self) -> bool {
        self.ticker.lock().as_ref().is_some_and(|h| !h.is_finished())
    }

    /// Stop the ticker and wait for it to exit
    pub async fn shutdown(&self) {
        self.shutdown.cancel();
        let handle = self.ticker.lock().take();
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                warn!(error = %e, "[ToolRegistry] Refresh ticker ended abnormally");
            }
        }
    }
}
