//! HTTP polling content source

use crate::ContentSource;
use async_trait::async_trait;
use feedsift_core::{ContentItem, Cursor, Error, FeedAdapter, Result, SourceKind};
use parking_lot::Mutex;
use reqwest::StatusCode;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Number of item ids remembered for cursor assignment
const FALLBACK_MEMORY: usize = 4096;

/// Source that polls a JSON endpoint
///
/// The endpoint answers with either a JSON array of updates or an object
/// holding them under `items`. Each update is normalized with the
/// configured [`FeedAdapter`]. When the adapter reads upstream cursors the
/// request carries `?since=<cursor>`. Otherwise updates are given local
/// sequence numbers, stable per id, so re-served updates are not seen as
/// new, and no `since` is sent since the upstream could not interpret it.
pub struct HttpPollSource {
    kind: SourceKind,
    url: String,
    client: reqwest::Client,
    adapter: Arc<dyn FeedAdapter>,
    fallback: Mutex<FallbackCursors>,
}

impl HttpPollSource {
    /// Create a new polling source
    pub fn new(
        kind: SourceKind,
        url: impl Into<String>,
        adapter: Arc<dyn FeedAdapter>,
        request_timeout: Duration,
    ) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(request_timeout)
            .build()
            .map_err(|e| Error::config(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self {
            kind,
            url: url.into(),
            client,
            adapter,
            fallback: Mutex::new(FallbackCursors::default()),
        })
    }

    fn unavailable(&self, reason: impl Into<String>) -> Error {
        Error::source_unavailable(self.kind.as_str(), reason)
    }
}

#[async_trait]
impl ContentSource for HttpPollSource {
    fn kind(&self) -> &SourceKind {
        &self.kind
    }

    async fn fetch_since(&self, since: Cursor) -> Result<Vec<ContentItem>> {
        let mut request = self.client.get(&self.url);
        if self.adapter.reports_cursor() {
            request = request.query(&[("since", since.value())]);
        }

        let response = request
            .header("Accept", "application/json")
            .send()
            .await
            .map_err(|e| self.unavailable(e.to_string()))?;

        let status = response.status();
        if status == StatusCode::TOO_MANY_REQUESTS {
            return Err(self.unavailable("rate limited (HTTP 429)"));
        }
        if !status.is_success() {
            return Err(self.unavailable(format!("HTTP {}", status.as_u16())));
        }

        let body: serde_json::Value = response
            .json()
            .await
            .map_err(|e| self.unavailable(format!("invalid body: {}", e)))?;

        let updates = match body {
            serde_json::Value::Array(updates) => updates,
            serde_json::Value::Object(mut map) => match map.remove("items") {
                Some(serde_json::Value::Array(updates)) => updates,
                _ => return Err(self.unavailable("response has no `items` array")),
            },
            _ => return Err(self.unavailable("response is not a JSON array or object")),
        };

        let mut items = Vec::with_capacity(updates.len());
        let mut fallback = self.fallback.lock();
        for update in &updates {
            match self.adapter.parse(update) {
                Ok(parsed) => {
                    let cursor = match parsed.cursor {
                        Some(cursor) => cursor,
                        None => fallback.cursor_for(&parsed.id),
                    };
                    items.push(parsed.into_item(self.kind.clone(), cursor));
                }
                Err(e) => {
                    warn!(
                        source = %self.kind,
                        adapter = self.adapter.name(),
                        error = %e,
                        "skipping malformed update"
                    );
                }
            }
        }

        debug!(source = %self.kind, since = %since, fetched = items.len(), "HTTP poll complete");
        Ok(items)
    }
}

/// Local cursors for updates whose upstream reports none
#[derive(Debug, Default)]
struct FallbackCursors {
    last: u64,
    known: HashMap<String, Cursor>,
    order: VecDeque<String>,
}

impl FallbackCursors {
    fn cursor_for(&mut self, id: &str) -> Cursor {
        if let Some(cursor) = self.known.get(id) {
            return *cursor;
        }

        self.last += 1;
        let cursor = Cursor::new(self.last);
        self.known.insert(id.to_string(), cursor);
        self.order.push_back(id.to_string());

        if self.order.len() > FALLBACK_MEMORY {
            if let Some(oldest) = self.order.pop_front() {
                self.known.remove(&oldest);
            }
        }
        cursor
    }
}
