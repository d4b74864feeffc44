//! Server-sent events content source
//!
//! A background task holds a streaming connection to the upstream, decodes
//! each event with the configured [`FeedAdapter`] and appends the result to
//! a bounded buffer. `fetch_since` reads from that buffer, so the scheduler
//! polls an SSE upstream exactly like any other source.
//!
//! The upstream emits frames like:
//!
//! ```text
//! event: update
//! data: {"data":{"node":{"hash":"0x5f2e...","text":"gm"}}}
//!
//! : keep-alive
//! ```

use crate::ContentSource;
use async_trait::async_trait;
use feedsift_core::{ContentItem, Cursor, Error, FeedAdapter, Result, SourceKind};
use futures::StreamExt;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, error, info, warn};

/// Failed attempts after which immediate retries yield to backoff, and
/// after which the backoff starts over
const MAX_RECONNECT_ATTEMPTS: u32 = 5;

/// One decoded server-sent event
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SseEvent {
    pub event: Option<String>,
    pub id: Option<String>,
    pub data: String,
}

/// Incremental decoder for a `text/event-stream` body
///
/// Chunks may split lines and events at any byte; the decoder buffers
/// until an event is complete.
#[derive(Debug, Default)]
pub struct SseDecoder {
    buffer: String,
    pending: SseEvent,
    has_data: bool,
}

impl SseDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed a chunk and return every event it completes
    pub fn feed(&mut self, chunk: &[u8]) -> Vec<SseEvent> {
        self.buffer.push_str(&String::from_utf8_lossy(chunk));

        let mut events = Vec::new();
        while let Some(newline) = self.buffer.find('\n') {
            let line: String = self.buffer.drain(..=newline).collect();
            let line = line.trim_end_matches(['\n', '\r']);

            if line.is_empty() {
                if self.has_data {
                    events.push(std::mem::take(&mut self.pending));
                    self.has_data = false;
                } else {
                    self.pending = SseEvent::default();
                }
                continue;
            }

            self.process_line(line);
        }
        events
    }

    fn process_line(&mut self, line: &str) {
        // Comment lines carry keep-alives
        if line.starts_with(':') {
            return;
        }

        let (field, value) = match line.split_once(':') {
            Some((field, value)) => (field, value.strip_prefix(' ').unwrap_or(value)),
            None => (line, ""),
        };

        match field {
            "data" => {
                if self.has_data {
                    self.pending.data.push('\n');
                }
                self.pending.data.push_str(value);
                self.has_data = true;
            }
            "event" => self.pending.event = Some(value.to_string()),
            "id" => self.pending.id = Some(value.to_string()),
            _ => {}
        }
    }
}

/// Connection settings for an SSE upstream
#[derive(Debug, Clone)]
pub struct SseOptions {
    /// Maximum number of buffered items; the oldest are dropped first
    pub buffer_capacity: usize,

    /// Delay before the first reconnect; doubles per failed attempt
    pub reconnect_base: Duration,

    /// Upper bound on a reconnect delay
    pub reconnect_max: Duration,

    /// Timeout for establishing the connection
    pub connect_timeout: Duration,
}

impl Default for SseOptions {
    fn default() -> Self {
        Self {
            buffer_capacity: 1024,
            reconnect_base: Duration::from_secs(5),
            reconnect_max: Duration::from_secs(60),
            connect_timeout: Duration::from_secs(30),
        }
    }
}

impl SseOptions {
    /// Delay before reconnect attempt number `attempt` (1-indexed)
    pub fn reconnect_delay(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt.min(16));
        self.reconnect_base
            .saturating_mul(factor)
            .min(self.reconnect_max)
    }
}

#[derive(Debug, Default)]
struct Buffer {
    items: VecDeque<ContentItem>,
    last_cursor: Cursor,
    dropped: u64,
}

#[derive(Debug, Default)]
struct Shared {
    buffer: Mutex<Buffer>,
    connected: AtomicBool,
    last_error: Mutex<Option<String>>,
}

/// Source fed by a long-lived server-sent events connection
///
/// Items get local sequence cursors in arrival order; upstream positions
/// do not survive reconnects.
pub struct SseStreamSource {
    kind: SourceKind,
    url: String,
    adapter: Arc<dyn FeedAdapter>,
    options: SseOptions,
    client: reqwest::Client,
    shared: Arc<Shared>,
}

impl SseStreamSource {
    pub fn new(
        kind: SourceKind,
        url: impl Into<String>,
        adapter: Arc<dyn FeedAdapter>,
        options: SseOptions,
    ) -> Result<Self> {
        // No read timeout: the stream is expected to stay open
        let client = reqwest::Client::builder()
            .connect_timeout(options.connect_timeout)
            .build()
            .map_err(|e| Error::config(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self {
            kind,
            url: url.into(),
            adapter,
            options,
            client,
            shared: Arc::new(Shared::default()),
        })
    }

    /// Whether the upstream connection is currently open
    pub fn is_connected(&self) -> bool {
        self.shared.connected.load(Ordering::Relaxed)
    }

    fn connection(&self) -> Connection {
        Connection {
            kind: self.kind.clone(),
            url: self.url.clone(),
            adapter: self.adapter.clone(),
            options: self.options.clone(),
            client: self.client.clone(),
            shared: self.shared.clone(),
        }
    }
}

#[async_trait]
impl ContentSource for SseStreamSource {
    fn kind(&self) -> &SourceKind {
        &self.kind
    }

    async fn fetch_since(&self, since: Cursor) -> Result<Vec<ContentItem>> {
        let items: Vec<ContentItem> = self
            .shared
            .buffer
            .lock()
            .items
            .iter()
            .filter(|item| item.cursor > since)
            .cloned()
            .collect();

        if items.is_empty() && !self.is_connected() {
            if let Some(reason) = self.shared.last_error.lock().clone() {
                return Err(Error::source_unavailable(self.kind.as_str(), reason));
            }
        }
        Ok(items)
    }

    fn dropped(&self) -> u64 {
        self.shared.buffer.lock().dropped
    }

    fn start(&self, tracker: &TaskTracker, cancel: CancellationToken) {
        let connection = self.connection();
        tracker.spawn(async move { connection.run(cancel).await });
    }
}

/// State owned by the background connection task
struct Connection {
    kind: SourceKind,
    url: String,
    adapter: Arc<dyn FeedAdapter>,
    options: SseOptions,
    client: reqwest::Client,
    shared: Arc<Shared>,
}

/// How one connection ended
#[derive(Debug)]
enum Disconnect {
    /// Upstream finished the response
    Closed,
    /// The connection could not be opened or broke mid-stream
    Transport(Error),
    /// Upstream answered with an error status
    Rejected(Error),
}

/// Reconnect bookkeeping across connections
#[derive(Debug, Default)]
struct Reconnect {
    /// Backoff attempts since the last successful connect
    attempts: u32,
    /// Immediate retries since an event was last received
    immediate: u32,
}

impl Connection {
    async fn run(self, cancel: CancellationToken) {
        info!(source = %self.kind, url = %self.url, "starting SSE source");
        let mut reconnect = Reconnect::default();

        loop {
            let disconnect = tokio::select! {
                _ = cancel.cancelled() => break,
                disconnect = self.connect_and_read(&mut reconnect) => disconnect,
            };
            self.shared.connected.store(false, Ordering::Relaxed);

            let delay = match disconnect {
                Disconnect::Closed => {
                    info!(source = %self.kind, "SSE stream closed by upstream, reconnecting");
                    *self.shared.last_error.lock() = None;
                    self.options.reconnect_base
                }
                Disconnect::Transport(e) => {
                    *self.shared.last_error.lock() = Some(e.to_string());
                    if reconnect.immediate < MAX_RECONNECT_ATTEMPTS {
                        reconnect.immediate += 1;
                        error!(
                            source = %self.kind,
                            retry = reconnect.immediate,
                            error = %e,
                            "SSE connection error, reconnecting immediately"
                        );
                        Duration::ZERO
                    } else {
                        reconnect.immediate = 0;
                        self.backoff(&mut reconnect, &e)
                    }
                }
                Disconnect::Rejected(e) => {
                    *self.shared.last_error.lock() = Some(e.to_string());
                    self.backoff(&mut reconnect, &e)
                }
            };

            if delay.is_zero() {
                continue;
            }
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(delay) => {}
            }
        }

        self.shared.connected.store(false, Ordering::Relaxed);
        info!(source = %self.kind, "SSE source stopped");
    }

    fn backoff(&self, reconnect: &mut Reconnect, e: &Error) -> Duration {
        reconnect.attempts += 1;
        let delay = self.options.reconnect_delay(reconnect.attempts);
        error!(
            source = %self.kind,
            attempt = reconnect.attempts,
            max_attempts = MAX_RECONNECT_ATTEMPTS,
            delay_ms = delay.as_millis() as u64,
            error = %e,
            "SSE connection failed"
        );
        if reconnect.attempts >= MAX_RECONNECT_ATTEMPTS {
            warn!(source = %self.kind, "reconnect attempts exhausted, resetting backoff");
            reconnect.attempts = 0;
        }
        delay
    }

    async fn connect_and_read(&self, reconnect: &mut Reconnect) -> Disconnect {
        debug!(source = %self.kind, url = %self.url, "connecting to SSE stream");
        let response = match self
            .client
            .get(&self.url)
            .header("Accept", "text/event-stream")
            .send()
            .await
        {
            Ok(response) => response,
            Err(e) => return Disconnect::Transport(self.unavailable(e.to_string())),
        };

        let status = response.status();
        if !status.is_success() {
            return Disconnect::Rejected(self.unavailable(format!("HTTP {}", status.as_u16())));
        }

        info!(source = %self.kind, "connected to SSE stream");
        reconnect.attempts = 0;
        self.shared.connected.store(true, Ordering::Relaxed);
        *self.shared.last_error.lock() = None;

        let mut decoder = SseDecoder::new();
        let mut body = response.bytes_stream();
        while let Some(chunk) = body.next().await {
            let chunk = match chunk {
                Ok(chunk) => chunk,
                Err(e) => return Disconnect::Transport(self.unavailable(e.to_string())),
            };
            for event in decoder.feed(&chunk) {
                if self.accept(event) {
                    reconnect.immediate = 0;
                }
            }
        }
        Disconnect::Closed
    }

    fn unavailable(&self, reason: impl Into<String>) -> Error {
        Error::source_unavailable(self.kind.as_str(), reason)
    }

    /// Buffer one event; returns whether it held an update
    fn accept(&self, event: SseEvent) -> bool {
        if event.data.trim().is_empty() {
            return false;
        }

        let parsed = match self.adapter.parse_str(&event.data) {
            Ok(parsed) => parsed,
            Err(e) => {
                warn!(source = %self.kind, error = %e, "skipping malformed SSE event");
                return false;
            }
        };

        let mut buffer = self.shared.buffer.lock();
        let cursor = buffer.last_cursor.next();
        buffer.last_cursor = cursor;
        buffer.items.push_back(ContentItem::new(
            parsed.id,
            self.kind.clone(),
            parsed.payload,
            cursor,
        ));

        let excess = buffer.items.len().saturating_sub(self.options.buffer_capacity);
        if excess > 0 {
            let dropped: Vec<ContentItem> = buffer.items.drain(..excess).collect();
            buffer.dropped += excess as u64;
            if let (Some(first), Some(last)) = (dropped.first(), dropped.last()) {
                warn!(
                    source = %self.kind,
                    dropped = excess,
                    from_cursor = %first.cursor,
                    to_cursor = %last.cursor,
                    total_dropped = buffer.dropped,
                    "SSE buffer full, dropped oldest unfetched items"
                );
            }
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decoder_handles_split_chunks() {
        let mut decoder = SseDecoder::new();
        assert!(decoder.feed(b"event: update\nda").is_empty());
        assert!(decoder.feed(b"ta: {\"a\":1}\n").is_empty());

        let events = decoder.feed(b"\n");
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].event.as_deref(), Some("update"));
        assert_eq!(events[0].data, "{\"a\":1}");
    }

    #[test]
    fn test_decoder_joins_multiline_data_and_skips_comments() {
        let mut decoder = SseDecoder::new();
        let events = decoder.feed(b": keep-alive\n\ndata: line one\r\ndata: line two\r\nid: 7\r\n\r\n");
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].data, "line one\nline two");
        assert_eq!(events[0].id.as_deref(), Some("7"));
    }

    #[test]
    fn test_reconnect_delay_doubles_and_caps() {
        let options = SseOptions::default();
        assert_eq!(options.reconnect_delay(1), Duration::from_secs(10));
        assert_eq!(options.reconnect_delay(2), Duration::from_secs(20));
        assert_eq!(options.reconnect_delay(4), Duration::from_secs(60));
        assert_eq!(options.reconnect_delay(40), Duration::from_secs(60));
    }
}
