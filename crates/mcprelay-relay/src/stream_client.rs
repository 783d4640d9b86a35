//! Reconnecting Stream Client
//!
//! Consumer side of the relay: holds a `GET /stream` connection open, appends every
//! event to a display log and reconnects after a fixed delay whenever the connection
//! fails or ends. `shutdown` cancels both the live connection and any pending retry.

use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use parking_lot::{Mutex, RwLock};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

#[derive(Debug, Clone)]
pub struct StreamClientConfig {
    pub url: String,
    /// Wait between a dropped connection and the next attempt
    pub reconnect_delay: Duration,
}

impl Default for StreamClientConfig {
    fn default() -> Self {
        Self {
            url: "http://localhost:3001/stream".to_string(),
            reconnect_delay: Duration::from_secs(3),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamState {
    Disconnected,
    Connecting,
    Streaming,
    /// Terminal, after `shutdown`
    Stopped,
}

/// Incremental `text/event-stream` decoder.
///
/// Joins the `data:` lines of each event with `\n` and yields the event at the blank
/// line that ends it. Comment lines (keep-alives) and other fields are ignored.
#[derive(Debug, Default)]
pub struct SseDecoder {
    buffer: Vec<u8>,
    data: Vec<String>,
}

impl SseDecoder {
    pub fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        self.buffer.extend_from_slice(chunk);
        let mut events = Vec::new();

        while let Some(pos) = self.buffer.iter().position(|b| *b == b'\n') {
            let raw: Vec<u8> = self.buffer.drain(..=pos).collect();
            let line = String::from_utf8_lossy(&raw[..pos]);
            let line = line.strip_suffix('\r').unwrap_or(&line);

            if line.is_empty() {
                if !self.data.is_empty() {
                    events.push(self.data.join("\n"));
                    self.data.clear();
                }
            } else if let Some(value) = line.strip_prefix("data:") {
                self.data
                    .push(value.strip_prefix(' ').unwrap_or(value).to_string());
            }
        }
        events
    }
}

/// Received events in arrival order
#[derive(Debug, Default)]
pub struct DisplayLog {
    entries: RwLock<Vec<String>>,
}

impl DisplayLog {
    pub fn entries(&self) -> Vec<String> {
        self.entries.read().clone()
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    /// Entries from index `from` onward
    pub fn since(&self, from: usize) -> Vec<String> {
        self.entries.read().iter().skip(from).cloned().collect()
    }

    fn append(&self, entry: String) -> usize {
        let mut entries = self.entries.write();
        entries.push(entry);
        entries.len()
    }
}

pub struct ReconnectingStreamClient {
    config: StreamClientConfig,
    http: reqwest::Client,
    log: Arc<DisplayLog>,
    state: watch::Sender<StreamState>,
    received: watch::Sender<usize>,
    shutdown: CancellationToken,
    task: Mutex<Option<JoinHandle<()>>>,
}

enum Outcome {
    Ended,
    Failed(String),
    Cancelled,
}

impl ReconnectingStreamClient {
    pub fn new(config: StreamClientConfig) -> Arc<Self> {
        let (state, _) = watch::channel(StreamState::Disconnected);
        let (received, _) = watch::channel(0);
        Arc::new(Self {
            config,
            http: reqwest::Client::new(),
            log: Arc::new(DisplayLog::default()),
            state,
            received,
            shutdown: CancellationToken::new(),
            task: Mutex::new(None),
        })
    }

    pub fn log(&self) -> Arc<DisplayLog> {
        Arc::clone(&self.log)
    }

    pub fn state(&self) -> StreamState {
        *self.state.borrow()
    }

    pub fn watch_state(&self) -> watch::Receiver<StreamState> {
        self.state.subscribe()
    }

    /// Length of the display log, updated after each received event
    pub fn watch_received(&self) -> watch::Receiver<usize> {
        self.received.subscribe()
    }

    /// Start the connect loop. No-op if already running or stopped.
    pub fn start(self: &Arc<Self>) {
        let mut slot = self.task.lock();
        if self.shutdown.is_cancelled() || slot.as_ref().is_some_and(|h| !h.is_finished()) {
            return;
        }
        let client = Arc::clone(self);
        *slot = Some(tokio::spawn(async move { client.run().await }));
    }

    async fn run(self: Arc<Self>) {
        loop {
            self.state.send_replace(StreamState::Connecting);
            debug!(url = %self.config.url, "[StreamClient] Connecting");

            match self.stream_once().await {
                Outcome::Cancelled => break,
                Outcome::Ended => info!("[StreamClient] Stream ended"),
                Outcome::Failed(reason) => warn!(error = %reason, "[StreamClient] Connection failed"),
            }

            self.state.send_replace(StreamState::Disconnected);
            info!(
                delay_ms = self.config.reconnect_delay.as_millis() as u64,
                "[StreamClient] Reconnecting after delay"
            );
            tokio::select! {
                _ = self.shutdown.cancelled() => break,
                _ = tokio::time::sleep(self.config.reconnect_delay) => {}
            }
        }
        self.state.send_replace(StreamState::Stopped);
        debug!("[StreamClient] Stopped");
    }

    async fn stream_once(&self) -> Outcome {
        let request = self
            .http
            .get(&self.config.url)
            .header(reqwest::header::ACCEPT, "text/event-stream")
            .send();

        let response = tokio::select! {
            _ = self.shutdown.cancelled() => return Outcome::Cancelled,
            response = request => response,
        };
        let response = match response.and_then(|r| r.error_for_status()) {
            Ok(response) => response,
            Err(e) => return Outcome::Failed(e.to_string()),
        };

        self.state.send_replace(StreamState::Streaming);
        info!(url = %self.config.url, "[StreamClient] Streaming");

        let mut body = response.bytes_stream();
        let mut decoder = SseDecoder::default();
        loop {
            let chunk = tokio::select! {
                _ = self.shutdown.cancelled() => return Outcome::Cancelled,
                chunk = body.next() => chunk,
            };
            match chunk {
                Some(Ok(bytes)) => {
                    for event in decoder.push(&bytes) {
                        debug!("[StreamClient] Received: {}", event);
                        let len = self.log.append(event);
                        self.received.send_replace(len);
                    }
                }
                Some(Err(e)) => return Outcome::Failed(e.to_string()),
                None => return Outcome::Ended,
            }
        }
    }

    /// Close the live connection, cancel any pending retry and wait for the loop to exit
    pub async fn shutdown(&self) {
        self.shutdown.cancel();
        let handle = self.task.lock().take();
        match handle {
            Some(handle) => {
                if let Err(e) = handle.await {
                    warn!(error = %e, "[StreamClient] Connect loop ended abnormally");
                }
            }
            None => {
                self.state.send_replace(StreamState::Stopped);
            }
        }
    }
}
