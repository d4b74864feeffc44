//! Polling wrapper applied around every content source

use crate::ContentSource;
use feedsift_core::{ContentItem, Cursor, SourceKind};
use std::collections::HashSet;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use tracing::{debug, error, warn};

/// Content source adapter used by the scheduler
///
/// `poll` never fails. A failed fetch is logged and reported as "no new
/// items this cycle"; the caller keeps its cursor and asks again next cycle.
#[derive(Clone)]
pub struct SourceAdapter {
    source: Arc<dyn ContentSource>,
    consecutive_failures: Arc<AtomicU32>,
}

impl SourceAdapter {
    pub fn new(source: Arc<dyn ContentSource>) -> Self {
        Self {
            source,
            consecutive_failures: Arc::new(AtomicU32::new(0)),
        }
    }

    pub fn kind(&self) -> &SourceKind {
        self.source.kind()
    }

    pub fn source(&self) -> &Arc<dyn ContentSource> {
        &self.source
    }

    /// Number of failed polls since the last successful one
    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures.load(Ordering::Relaxed)
    }

    /// Whether the most recent poll reached the source
    pub fn last_poll_succeeded(&self) -> bool {
        self.consecutive_failures() == 0
    }

    /// Items after `since`, ordered by cursor ascending
    ///
    /// Duplicate ids within one batch are collapsed to their first
    /// occurrence.
    pub async fn poll(&self, since: Cursor) -> Vec<ContentItem> {
        match self.source.fetch_since(since).await {
            Ok(items) => {
                self.consecutive_failures.store(0, Ordering::Relaxed);
                let items = normalize(items, since);
                if !items.is_empty() {
                    debug!(
                        source = %self.kind(),
                        since = %since,
                        count = items.len(),
                        "polled new items"
                    );
                }
                items
            }
            Err(e) => {
                let failures = self.consecutive_failures.fetch_add(1, Ordering::Relaxed) + 1;
                if e.is_transient() {
                    warn!(
                        source = %self.kind(),
                        since = %since,
                        consecutive_failures = failures,
                        error = %e,
                        "poll failed, retrying next cycle"
                    );
                } else {
                    error!(
                        source = %self.kind(),
                        since = %since,
                        consecutive_failures = failures,
                        error = %e,
                        "poll failed with a non-transient error"
                    );
                }
                Vec::new()
            }
        }
    }
}

fn normalize(mut items: Vec<ContentItem>, since: Cursor) -> Vec<ContentItem> {
    items.retain(|item| item.cursor > since);
    items.sort_by_key(|item| item.cursor);

    let mut seen = HashSet::with_capacity(items.len());
    items.retain(|item| seen.insert(item.id.clone()));
    items
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::MemorySource;

    #[tokio::test]
    async fn test_poll_orders_and_filters() {
        let source = Arc::new(MemorySource::new("casts"));
        source.push_at("c", "third", Cursor::new(3));
        source.push_at("a", "first", Cursor::new(1));
        source.push_at("b", "second", Cursor::new(2));
        source.push_at("b", "second again", Cursor::new(4));

        let adapter = SourceAdapter::new(source);
        let items = adapter.poll(Cursor::new(1)).await;

        let ids: Vec<_> = items.iter().map(|i| i.id.as_str()).collect();
        assert_eq!(ids, vec!["b", "c"]);
        assert!(adapter.last_poll_succeeded());
    }

    #[tokio::test]
    async fn test_failed_poll_is_empty() {
        let source = Arc::new(MemorySource::new("casts"));
        source.push("a", "gm");
        source.set_failing(true);

        let adapter = SourceAdapter::new(source.clone());
        assert!(adapter.poll(Cursor::ORIGIN).await.is_empty());
        assert!(adapter.poll(Cursor::ORIGIN).await.is_empty());
        assert_eq!(adapter.consecutive_failures(), 2);

        source.set_failing(false);
        assert_eq!(adapter.poll(Cursor::ORIGIN).await.len(), 1);
        assert!(adapter.last_poll_succeeded());
    }
}
