//! Subscription registry
//!
//! The registry is the only shared mutable structure in the pipeline. The
//! subscription map and the per-source watermarks have their own locks,
//! and each subscription synchronizes its own queue, so a slow evaluation
//! for one subscription never blocks enqueue or dequeue on another.

use crate::subscription::{Enqueued, Subscription, SubscriptionState};
use feedsift_core::{
    ContentItem, Cursor, Error, EvaluationResult, Prompt, Result, SourceKind, SubscriptionId,
};
use feedsift_telemetry::PipelineMetrics;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use tracing::{debug, info};

/// Registry settings applied to every new subscription
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegistryConfig {
    /// Pending results per subscription before eviction starts
    #[serde(default = "default_high_water_mark")]
    pub high_water_mark: usize,

    /// Item keys remembered per subscription for duplicate suppression
    #[serde(default = "default_dedupe_window")]
    pub dedupe_window: usize,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            high_water_mark: default_high_water_mark(),
            dedupe_window: default_dedupe_window(),
        }
    }
}

impl RegistryConfig {
    pub fn validate(&self) -> Result<()> {
        if self.high_water_mark == 0 {
            return Err(Error::config("registry.high_water_mark must be non-zero"));
        }
        if self.dedupe_window < self.high_water_mark {
            return Err(Error::config(
                "registry.dedupe_window must be at least high_water_mark",
            ));
        }
        Ok(())
    }
}

fn default_high_water_mark() -> usize {
    10_000
}

fn default_dedupe_window() -> usize {
    65_536
}

/// Registry of live subscriptions
#[derive(Default)]
pub struct SubscriptionRegistry {
    subscriptions: RwLock<HashMap<SubscriptionId, Arc<Subscription>>>,
    /// Highest cursor the scheduler has observed per source ("now")
    watermarks: RwLock<HashMap<SourceKind, Cursor>>,
    config: RegistryConfig,
    metrics: PipelineMetrics,
}

impl SubscriptionRegistry {
    pub fn new(config: RegistryConfig, metrics: PipelineMetrics) -> Self {
        Self {
            subscriptions: RwLock::new(HashMap::new()),
            watermarks: RwLock::new(HashMap::new()),
            config,
            metrics,
        }
    }

    pub fn config(&self) -> &RegistryConfig {
        &self.config
    }

    /// Create an active subscription whose cursors start at the current
    /// watermark of every source, so it never sees historical backlog
    ///
    /// `source_filter` of `None` subscribes to every source.
    pub fn register(
        &self,
        prompt: Prompt,
        source_filter: Option<BTreeSet<SourceKind>>,
    ) -> SubscriptionId {
        let cursors = self.watermarks.read().clone();
        let subscription = Arc::new(Subscription::new(
            prompt,
            source_filter,
            cursors,
            self.config.high_water_mark,
            self.config.dedupe_window,
        ));
        let id = subscription.id();

        info!(
            subscription = %id,
            prompt = %subscription.prompt().preview(100),
            sources = ?subscription.source_filter(),
            "subscription registered"
        );

        self.subscriptions.write().insert(id, subscription);
        self.metrics.subscription_opened();
        id
    }

    /// Close a subscription and remove it from future fan-out
    ///
    /// Returns false if it was already gone.
    pub fn unregister(&self, id: SubscriptionId) -> bool {
        let removed = self.subscriptions.write().remove(&id);
        match removed {
            Some(subscription) => {
                subscription.close();
                self.metrics.subscription_closed();
                info!(subscription = %id, "subscription unregistered");
                true
            }
            None => false,
        }
    }

    pub fn get(&self, id: SubscriptionId) -> Option<Arc<Subscription>> {
        self.subscriptions.read().get(&id).cloned()
    }

    /// Snapshot of the active subscriptions interested in a source
    pub fn active_subscriptions_for(&self, source: &SourceKind) -> Vec<SubscriptionId> {
        self.subscriptions
            .read()
            .values()
            .filter(|s| s.accepts(source) && s.state() == SubscriptionState::Active)
            .map(|s| s.id())
            .collect()
    }

    /// Reserve an item for evaluation on behalf of a subscription
    ///
    /// Returns the prompt to evaluate with, or `None` if the subscription is
    /// gone, not active, already past the item, or already evaluating it.
    pub fn claim(&self, id: SubscriptionId, item: &ContentItem) -> Option<Prompt> {
        let subscription = self.get(id)?;
        subscription
            .claim(item)
            .then(|| subscription.prompt().clone())
    }

    /// Append a result to a subscription's outbound queue
    ///
    /// Fails with [`Error::SubscriptionNotFound`] once the subscription is
    /// closed; callers treat that as a no-op.
    pub fn enqueue(&self, id: SubscriptionId, result: EvaluationResult) -> Result<Enqueued> {
        let subscription = self.get(id).ok_or(Error::SubscriptionNotFound(id))?;
        let outcome = subscription.enqueue(result)?;

        match outcome {
            Enqueued::Queued { evicted } if evicted > 0 => {
                self.metrics.record_evictions(evicted);
                debug!(subscription = %id, evicted, "queue over high-water mark");
            }
            Enqueued::Duplicate => {
                debug!(subscription = %id, "duplicate result dropped");
            }
            _ => {}
        }
        Ok(outcome)
    }

    /// Record that a subscription finished evaluating an item
    pub fn advance_cursor(&self, id: SubscriptionId, item: &ContentItem) -> Result<()> {
        let subscription = self.get(id).ok_or(Error::SubscriptionNotFound(id))?;
        subscription.complete(item);
        Ok(())
    }

    /// Publish the highest cursor seen for a source
    pub fn observe_watermark(&self, source: &SourceKind, cursor: Cursor) {
        let mut watermarks = self.watermarks.write();
        let current = watermarks.entry(source.clone()).or_insert(Cursor::ORIGIN);
        if cursor > *current {
            *current = cursor;
        }
    }

    pub fn watermark(&self, source: &SourceKind) -> Option<Cursor> {
        self.watermarks.read().get(source).copied()
    }

    /// Stop handing out new work; in-flight results are still accepted
    pub fn drain_all(&self) {
        for subscription in self.subscriptions.read().values() {
            subscription.drain();
        }
    }

    pub fn len(&self) -> usize {
        self.subscriptions.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Summaries of every live subscription
    pub fn summaries(&self) -> Vec<SubscriptionSummary> {
        self.subscriptions
            .read()
            .values()
            .map(|s| SubscriptionSummary {
                id: s.id(),
                state: s.state(),
                sources: s
                    .source_filter()
                    .map(|f| f.iter().cloned().collect())
                    .unwrap_or_default(),
                pending: s.pending(),
                pending_matches: s.pending_matches(),
                in_flight: s.in_flight(),
                evicted: s.evicted(),
            })
            .collect()
    }
}

/// Point-in-time view of one subscription
#[derive(Debug, Clone, Serialize)]
pub struct SubscriptionSummary {
    pub id: SubscriptionId,
    pub state: SubscriptionState,
    /// Empty when subscribed to every source
    pub sources: Vec<SourceKind>,
    pub pending: usize,
    pub pending_matches: usize,
    pub in_flight: usize,
    pub evicted: u64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use feedsift_core::ContentPayload;

    fn item(id: &str, cursor: u64) -> ContentItem {
        ContentItem::new(
            id,
            SourceKind::from("casts"),
            ContentPayload::text("gm"),
            Cursor::new(cursor),
        )
    }

    #[test]
    fn test_register_and_unregister() {
        let registry = SubscriptionRegistry::default();
        let id = registry.register(Prompt::new("test"), None);

        assert_eq!(registry.len(), 1);
        assert_eq!(
            registry.active_subscriptions_for(&SourceKind::from("casts")),
            vec![id]
        );

        assert!(registry.unregister(id));
        assert!(!registry.unregister(id));
        assert!(registry.is_empty());
        assert!(registry
            .active_subscriptions_for(&SourceKind::from("casts"))
            .is_empty());
    }

    #[test]
    fn test_new_subscription_starts_at_watermark() {
        let registry = SubscriptionRegistry::default();
        let casts = SourceKind::from("casts");
        registry.observe_watermark(&casts, Cursor::new(2));
        let id = registry.register(Prompt::new("test"), None);

        assert!(registry.claim(id, &item("1", 1)).is_none());
        assert!(registry.claim(id, &item("2", 2)).is_none());
        assert!(registry.claim(id, &item("3", 3)).is_some());
    }

    #[test]
    fn test_watermark_never_moves_backwards() {
        let registry = SubscriptionRegistry::default();
        let casts = SourceKind::from("casts");
        registry.observe_watermark(&casts, Cursor::new(5));
        registry.observe_watermark(&casts, Cursor::new(3));
        assert_eq!(registry.watermark(&casts), Some(Cursor::new(5)));
    }

    #[test]
    fn test_enqueue_after_unregister_is_not_found() {
        let registry = SubscriptionRegistry::default();
        let id = registry.register(Prompt::new("test"), None);
        let first = item("1", 1);
        assert!(registry.claim(id, &first).is_some());

        registry.unregister(id);
        let err = registry
            .enqueue(id, EvaluationResult::matched(id, &first, "yes"))
            .unwrap_err();
        assert!(matches!(err, Error::SubscriptionNotFound(_)));
        assert!(registry.advance_cursor(id, &first).is_err());
    }

    #[test]
    fn test_enqueue_counts_evictions() {
        let metrics = PipelineMetrics::new();
        let registry = SubscriptionRegistry::new(
            RegistryConfig {
                high_water_mark: 2,
                dedupe_window: 100,
            },
            metrics.clone(),
        );
        let id = registry.register(Prompt::new("test"), None);

        for n in 1..=3 {
            let result = EvaluationResult::no_match(id, &item(&n.to_string(), n));
            registry.enqueue(id, result).unwrap();
        }

        assert_eq!(metrics.snapshot().evictions, 1);
        assert_eq!(registry.get(id).unwrap().pending(), 2);
    }

    #[test]
    fn test_config_validation() {
        assert!(RegistryConfig::default().validate().is_ok());
        let config = RegistryConfig {
            high_water_mark: 0,
            dedupe_window: 10,
        };
        assert!(config.validate().is_err());
    }
}
