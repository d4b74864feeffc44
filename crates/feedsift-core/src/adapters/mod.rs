//! Feed Adapters
//!
//! Pluggable adapters for normalizing update payloads from content feeds.

pub mod configurable;
mod discovery;

pub use configurable::{article_adapter, AdapterConfig, ConfigurableAdapter};
pub use discovery::DiscoveryAdapter;

use crate::feed_adapter::AdapterRegistry;
use std::sync::Arc;

/// Create a registry holding the built-in adapters
///
/// `casts` is an alias of `discovery` and `json_feed` of `article`.
pub fn default_registry() -> AdapterRegistry {
    let mut registry = AdapterRegistry::new();

    let discovery = Arc::new(DiscoveryAdapter::new());
    registry.register("discovery", discovery.clone());
    registry.register("casts", discovery);

    let article = Arc::new(article_adapter());
    registry.register("article", article.clone());
    registry.register("json_feed", article);

    registry
}
