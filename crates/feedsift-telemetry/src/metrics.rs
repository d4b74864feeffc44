//! Pipeline metrics
//!
//! Every recording goes to two places: an in-process counter that backs the
//! `/stats` endpoint and tests, and the `metrics` facade that the Prometheus
//! exporter scrapes.

use feedsift_core::{SourceKind, Verdict};
use serde::Serialize;
use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

pub const ITEMS_POLLED: &str = "feedsift_items_polled_total";
pub const POLL_FAILURES: &str = "feedsift_poll_failures_total";
pub const SOURCE_DROPS: &str = "feedsift_source_items_dropped_total";
pub const EVALUATIONS: &str = "feedsift_evaluations_total";
pub const CLASSIFIER_TIMEOUTS: &str = "feedsift_classifier_timeouts_total";
pub const CLASSIFIER_LATENCY: &str = "feedsift_classifier_latency_ms";
pub const QUEUE_EVICTIONS: &str = "feedsift_queue_evictions_total";
pub const EVENTS_DELIVERED: &str = "feedsift_events_delivered_total";
pub const ACTIVE_SUBSCRIPTIONS: &str = "feedsift_active_subscriptions";

/// Register metric descriptions with the installed recorder
pub fn describe_metrics() {
    metrics::describe_counter!(ITEMS_POLLED, "Content items returned by source polls");
    metrics::describe_counter!(POLL_FAILURES, "Source polls that failed");
    metrics::describe_counter!(
        SOURCE_DROPS,
        "Items a source discarded from its buffer before they were polled"
    );
    metrics::describe_counter!(EVALUATIONS, "Completed evaluations by verdict");
    metrics::describe_counter!(
        CLASSIFIER_TIMEOUTS,
        "Evaluations resolved as no match after the classifier deadline"
    );
    metrics::describe_histogram!(
        CLASSIFIER_LATENCY,
        metrics::Unit::Milliseconds,
        "Evaluation latency including retries"
    );
    metrics::describe_counter!(
        QUEUE_EVICTIONS,
        "Results dropped from a subscription queue over its high-water mark"
    );
    metrics::describe_counter!(EVENTS_DELIVERED, "Match events written to clients");
    metrics::describe_gauge!(ACTIVE_SUBSCRIPTIONS, "Currently registered subscriptions");
}

/// Metrics recorder shared by the scheduler, registry and delivery loops
#[derive(Clone, Default)]
pub struct PipelineMetrics {
    inner: Arc<MetricsInner>,
}

#[derive(Default)]
struct MetricsInner {
    items_polled: AtomicU64,
    poll_failures: AtomicU64,
    source_drops: AtomicU64,
    evaluations: AtomicU64,
    matches: AtomicU64,
    timeouts: AtomicU64,
    evictions: AtomicU64,
    events_delivered: AtomicU64,
    active_subscriptions: AtomicI64,
    total_latency_ms: AtomicU64,
}

impl PipelineMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record items returned by one poll of a source
    pub fn record_poll(&self, source: &SourceKind, items: usize) {
        self.inner
            .items_polled
            .fetch_add(items as u64, Ordering::Relaxed);
        metrics::counter!(ITEMS_POLLED, "source" => source.as_str().to_owned())
            .increment(items as u64);
    }

    /// Record a failed poll of a source
    pub fn record_poll_failure(&self, source: &SourceKind) {
        self.inner.poll_failures.fetch_add(1, Ordering::Relaxed);
        metrics::counter!(POLL_FAILURES, "source" => source.as_str().to_owned()).increment(1);
    }

    /// Record items a source dropped before they were polled
    pub fn record_source_drops(&self, source: &SourceKind, count: u64) {
        if count == 0 {
            return;
        }
        self.inner.source_drops.fetch_add(count, Ordering::Relaxed);
        metrics::counter!(SOURCE_DROPS, "source" => source.as_str().to_owned()).increment(count);
    }

    /// Record one completed evaluation
    pub fn record_evaluation(&self, verdict: Verdict, timed_out: bool, latency: Duration) {
        let latency_ms = latency.as_millis() as u64;
        self.inner.evaluations.fetch_add(1, Ordering::Relaxed);
        self.inner
            .total_latency_ms
            .fetch_add(latency_ms, Ordering::Relaxed);
        if verdict.is_match() {
            self.inner.matches.fetch_add(1, Ordering::Relaxed);
        }

        metrics::counter!(EVALUATIONS, "verdict" => verdict.as_str()).increment(1);
        metrics::histogram!(CLASSIFIER_LATENCY).record(latency_ms as f64);

        if timed_out {
            self.inner.timeouts.fetch_add(1, Ordering::Relaxed);
            metrics::counter!(CLASSIFIER_TIMEOUTS).increment(1);
        }
    }

    /// Record results evicted from a subscription queue
    pub fn record_evictions(&self, count: usize) {
        if count == 0 {
            return;
        }
        self.inner
            .evictions
            .fetch_add(count as u64, Ordering::Relaxed);
        metrics::counter!(QUEUE_EVICTIONS).increment(count as u64);
    }

    /// Record one match event written to a client
    pub fn record_delivery(&self) {
        self.inner.events_delivered.fetch_add(1, Ordering::Relaxed);
        metrics::counter!(EVENTS_DELIVERED).increment(1);
    }

    pub fn subscription_opened(&self) {
        let active = self.inner.active_subscriptions.fetch_add(1, Ordering::Relaxed) + 1;
        metrics::gauge!(ACTIVE_SUBSCRIPTIONS).set(active as f64);
    }

    pub fn subscription_closed(&self) {
        let active = self.inner.active_subscriptions.fetch_sub(1, Ordering::Relaxed) - 1;
        metrics::gauge!(ACTIVE_SUBSCRIPTIONS).set(active as f64);
    }

    /// Get current metrics snapshot
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            items_polled: self.inner.items_polled.load(Ordering::Relaxed),
            poll_failures: self.inner.poll_failures.load(Ordering::Relaxed),
            source_drops: self.inner.source_drops.load(Ordering::Relaxed),
            evaluations: self.inner.evaluations.load(Ordering::Relaxed),
            matches: self.inner.matches.load(Ordering::Relaxed),
            timeouts: self.inner.timeouts.load(Ordering::Relaxed),
            evictions: self.inner.evictions.load(Ordering::Relaxed),
            events_delivered: self.inner.events_delivered.load(Ordering::Relaxed),
            active_subscriptions: self.inner.active_subscriptions.load(Ordering::Relaxed).max(0)
                as u64,
            total_latency_ms: self.inner.total_latency_ms.load(Ordering::Relaxed),
        }
    }
}

/// Snapshot of current metrics
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct MetricsSnapshot {
    pub items_polled: u64,
    pub poll_failures: u64,
    pub source_drops: u64,
    pub evaluations: u64,
    pub matches: u64,
    pub timeouts: u64,
    pub evictions: u64,
    pub events_delivered: u64,
    pub active_subscriptions: u64,
    pub total_latency_ms: u64,
}

impl MetricsSnapshot {
    /// Average evaluation latency
    pub fn avg_latency_ms(&self) -> u64 {
        if self.evaluations == 0 {
            0
        } else {
            self.total_latency_ms / self.evaluations
        }
    }

    /// Fraction of evaluations that matched
    pub fn match_rate(&self) -> f64 {
        if self.evaluations == 0 {
            0.0
        } else {
            self.matches as f64 / self.evaluations as f64
        }
    }
}
