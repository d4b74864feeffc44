//! Shared application state

use crate::config::ServerConfig;
use feedsift_classifiers::{Classifier, ClassifierClient, LlmClassifier};
use feedsift_core::{Result, SourceKind};
use feedsift_pipeline::{Scheduler, SubscriptionRegistry};
use feedsift_sources::{ContentSource, SourceConfig};
use feedsift_telemetry::PipelineMetrics;
use metrics_exporter_prometheus::PrometheusHandle;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::info;

/// State shared by every request handler
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<ServerConfig>,
    pub registry: Arc<SubscriptionRegistry>,
    pub scheduler: Arc<Scheduler>,
    pub metrics: PipelineMetrics,
    /// Prometheus handle for rendering `/metrics`
    pub metrics_handle: Option<PrometheusHandle>,
    /// Cancelled once the scheduler has shut down; ends open streams
    pub shutdown: CancellationToken,
}

impl AppState {
    /// Build the pipeline described by a validated configuration
    pub fn new(config: ServerConfig, metrics_handle: Option<PrometheusHandle>) -> Result<Self> {
        config.validate()?;

        let classifier: Arc<dyn Classifier> =
            Arc::new(LlmClassifier::new(config.classifier.clone())?);
        let sources = config
            .sources
            .iter()
            .map(SourceConfig::build)
            .collect::<Result<Vec<_>>>()?;

        Ok(Self::with_components(
            config,
            classifier,
            sources,
            metrics_handle,
        ))
    }

    /// Build the pipeline around an existing classifier and sources
    pub fn with_components(
        config: ServerConfig,
        classifier: Arc<dyn Classifier>,
        sources: Vec<Arc<dyn ContentSource>>,
        metrics_handle: Option<PrometheusHandle>,
    ) -> Self {
        let metrics = PipelineMetrics::new();
        let registry = Arc::new(SubscriptionRegistry::new(
            config.registry.clone(),
            metrics.clone(),
        ));
        let client = ClassifierClient::new(classifier, config.classifier.policy.clone());
        let scheduler = Arc::new(Scheduler::new(
            registry.clone(),
            client,
            sources,
            config.scheduler.clone(),
            config.classifier.max_concurrency,
            metrics.clone(),
        ));

        info!(
            sources = ?scheduler.source_kinds(),
            max_concurrency = config.classifier.max_concurrency,
            "pipeline initialized"
        );

        Self {
            config: Arc::new(config),
            registry,
            scheduler,
            metrics,
            metrics_handle,
            shutdown: CancellationToken::new(),
        }
    }

    pub fn has_source(&self, kind: &SourceKind) -> bool {
        self.scheduler.source_kinds().contains(kind)
    }

    /// Stop the pipeline, then end open streams once queued matches are out
    pub async fn shutdown(&self) {
        self.scheduler.shutdown().await;
        self.shutdown.cancel();
    }
}
