//! feedsift Telemetry
//!
//! Metrics for the evaluation pipeline.
//!
//! Provides:
//! - In-process counters for the stats endpoint
//! - Prometheus metric names and descriptions

pub mod metrics;

pub use crate::metrics::{describe_metrics, MetricsSnapshot, PipelineMetrics};

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::metrics::{MetricsSnapshot, PipelineMetrics};
}
