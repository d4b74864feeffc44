//! Per-connection delivery loop
//!
//! A delivery loop drains one subscription's queue. `Match` results are
//! handed to the caller for transmission; `NoMatch` results are consumed
//! and dropped. On a quiet subscription the loop hands out keep-alives, and
//! each one the caller asks for counts as client activity. The idle timeout
//! therefore only fires when the caller stops pulling, which happens when
//! the client stops reading. The loop also ends on server shutdown or once
//! the subscription closes, and dropping it unregisters the subscription,
//! which is how a broken client connection is cleaned up.

use crate::registry::SubscriptionRegistry;
use crate::subscription::Subscription;
use feedsift_core::{Error, EvaluationResult, Result, SubscriptionId};
use feedsift_telemetry::PipelineMetrics;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// Delivery settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeliveryConfig {
    /// End the stream after this long without client activity
    #[serde(default = "default_idle_timeout_secs")]
    pub idle_timeout_secs: u64,

    /// Interval between keep-alive comments on the wire
    #[serde(default = "default_keepalive_secs")]
    pub keepalive_secs: u64,
}

impl Default for DeliveryConfig {
    fn default() -> Self {
        Self {
            idle_timeout_secs: default_idle_timeout_secs(),
            keepalive_secs: default_keepalive_secs(),
        }
    }
}

impl DeliveryConfig {
    pub fn idle_timeout(&self) -> Duration {
        Duration::from_secs(self.idle_timeout_secs)
    }

    pub fn keepalive(&self) -> Duration {
        Duration::from_secs(self.keepalive_secs)
    }

    pub fn validate(&self) -> Result<()> {
        if self.idle_timeout_secs == 0 {
            return Err(Error::config("delivery.idle_timeout_secs must be non-zero"));
        }
        if self.keepalive_secs == 0 {
            return Err(Error::config("delivery.keepalive_secs must be non-zero"));
        }
        Ok(())
    }
}

fn default_idle_timeout_secs() -> u64 {
    600
}

fn default_keepalive_secs() -> u64 {
    15
}

/// Why a delivery loop stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryEnd {
    IdleTimeout,
    Shutdown,
    Closed,
}

/// One step of a delivery loop
#[derive(Debug, Clone, PartialEq)]
pub enum Delivery {
    /// A `Match` result to send
    Match(EvaluationResult),
    /// Nothing matched for a keep-alive interval
    KeepAlive,
}

impl Delivery {
    pub fn into_match(self) -> Option<EvaluationResult> {
        match self {
            Delivery::Match(result) => Some(result),
            Delivery::KeepAlive => None,
        }
    }
}

/// Drains one subscription's queue for one connection
pub struct DeliveryLoop {
    registry: Arc<SubscriptionRegistry>,
    subscription: Arc<Subscription>,
    idle_timeout: Duration,
    keepalive: Option<Duration>,
    cancel: CancellationToken,
    metrics: PipelineMetrics,
    last_activity: Instant,
    ended: Option<DeliveryEnd>,
}

impl DeliveryLoop {
    pub fn new(
        registry: Arc<SubscriptionRegistry>,
        id: SubscriptionId,
        idle_timeout: Duration,
        cancel: CancellationToken,
        metrics: PipelineMetrics,
    ) -> Result<Self> {
        let subscription = registry.get(id).ok_or(Error::SubscriptionNotFound(id))?;
        Ok(Self {
            registry,
            subscription,
            idle_timeout,
            keepalive: None,
            cancel,
            metrics,
            last_activity: Instant::now(),
            ended: None,
        })
    }

    /// Hand out a keep-alive after `interval` without a match
    ///
    /// Without keep-alives only delivered matches count as activity.
    pub fn with_keepalive(mut self, interval: Duration) -> Self {
        self.keepalive = Some(interval);
        self
    }

    pub fn subscription_id(&self) -> SubscriptionId {
        self.subscription.id()
    }

    /// Why the loop stopped, once it has
    pub fn ended(&self) -> Option<DeliveryEnd> {
        self.ended
    }

    /// Next item to send, or `None` once the stream is over
    pub async fn next(&mut self) -> Option<Delivery> {
        if self.ended.is_some() {
            return None;
        }

        loop {
            while let Some(result) = self.subscription.pop() {
                if result.is_match() {
                    self.last_activity = Instant::now();
                    self.metrics.record_delivery();
                    return Some(Delivery::Match(result));
                }
            }

            if self.cancel.is_cancelled() {
                return self.finish(DeliveryEnd::Shutdown);
            }
            if self.subscription.is_finished() {
                return self.finish(DeliveryEnd::Closed);
            }

            // The caller was away longer than the timeout
            let deadline = self.last_activity + self.idle_timeout;
            if Instant::now() >= deadline {
                return self.finish(DeliveryEnd::IdleTimeout);
            }

            let keepalive_at = self
                .keepalive
                .map(|interval| self.last_activity + interval)
                .filter(|at| *at < deadline);

            tokio::select! {
                _ = self.subscription.changed() => {}
                _ = self.cancel.cancelled() => {}
                _ = sleep_until_some(keepalive_at) => {
                    self.last_activity = Instant::now();
                    return Some(Delivery::KeepAlive);
                }
                _ = tokio::time::sleep_until(deadline) => {
                    return self.finish(DeliveryEnd::IdleTimeout);
                }
            }
        }
    }

    fn finish(&mut self, reason: DeliveryEnd) -> Option<Delivery> {
        match reason {
            DeliveryEnd::IdleTimeout => info!(
                subscription = %self.subscription.id(),
                idle_secs = self.idle_timeout.as_secs(),
                "closing idle stream"
            ),
            _ => debug!(subscription = %self.subscription.id(), ?reason, "delivery ended"),
        }
        self.ended = Some(reason);
        None
    }
}

async fn sleep_until_some(at: Option<Instant>) {
    match at {
        Some(at) => tokio::time::sleep_until(at).await,
        None => std::future::pending().await,
    }
}

impl Drop for DeliveryLoop {
    fn drop(&mut self) {
        if self.registry.unregister(self.subscription.id()) && self.ended.is_none() {
            debug!(subscription = %self.subscription.id(), "client disconnected");
        }
    }
}
