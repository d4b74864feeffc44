//! Per-source configuration

use crate::{ContentSource, HttpPollSource, MemorySource, SseOptions, SseStreamSource};
use feedsift_core::adapters::{default_registry, AdapterConfig, ConfigurableAdapter, DiscoveryAdapter};
use feedsift_core::{Error, FeedAdapter, Result, SourceKind};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

/// How a source is reached
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceType {
    /// Long-lived `text/event-stream` connection
    #[default]
    Sse,
    /// Periodic `GET <url>?since=<cursor>`
    HttpPoll,
    /// In-process list, for local runs
    Memory,
}

/// Configuration for one content source
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceConfig {
    /// Source name; clients filter on it
    pub name: String,

    #[serde(rename = "type", default)]
    pub source_type: SourceType,

    /// Upstream URL (required for `sse` and `http_poll`)
    #[serde(default)]
    pub url: Option<String>,

    /// Built-in adapter name
    #[serde(default = "default_adapter")]
    pub adapter: String,

    /// Field mapping for a custom update format; overrides `adapter`
    #[serde(default)]
    pub fields: Option<AdapterConfig>,

    /// Base URL for links built by the discovery adapter
    #[serde(default)]
    pub link_base: Option<String>,

    /// Per-request timeout for `http_poll`
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,

    /// Items buffered between polls for `sse`
    #[serde(default = "default_buffer_capacity")]
    pub buffer_capacity: usize,

    /// First reconnect delay for `sse`
    #[serde(default = "default_reconnect_base_ms")]
    pub reconnect_base_ms: u64,

    /// Reconnect delay cap for `sse`
    #[serde(default = "default_reconnect_max_ms")]
    pub reconnect_max_ms: u64,
}

impl SourceConfig {
    /// Create a configuration with defaults for everything but name and type
    pub fn new(name: impl Into<String>, source_type: SourceType) -> Self {
        Self {
            name: name.into(),
            source_type,
            url: None,
            adapter: default_adapter(),
            fields: None,
            link_base: None,
            request_timeout_ms: default_request_timeout_ms(),
            buffer_capacity: default_buffer_capacity(),
            reconnect_base_ms: default_reconnect_base_ms(),
            reconnect_max_ms: default_reconnect_max_ms(),
        }
    }

    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = Some(url.into());
        self
    }

    pub fn kind(&self) -> SourceKind {
        SourceKind::new(self.name.clone())
    }

    /// Check the configuration before any connection is made
    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(Error::config("source name must not be empty"));
        }
        if self.name.contains(',') {
            return Err(Error::config(format!(
                "source name '{}' must not contain ','",
                self.name
            )));
        }

        match self.source_type {
            SourceType::Sse | SourceType::HttpPoll => {
                let url = self.url.as_deref().ok_or_else(|| {
                    Error::config(format!("source '{}' requires a url", self.name))
                })?;
                if !(url.starts_with("http://") || url.starts_with("https://")) {
                    return Err(Error::config(format!(
                        "source '{}' url must be http(s): {}",
                        self.name, url
                    )));
                }
            }
            SourceType::Memory => {}
        }

        self.feed_adapter()?;
        if self.request_timeout_ms == 0 {
            return Err(Error::config(format!(
                "source '{}' request_timeout_ms must be non-zero",
                self.name
            )));
        }
        if self.buffer_capacity == 0 {
            return Err(Error::config(format!(
                "source '{}' buffer_capacity must be non-zero",
                self.name
            )));
        }
        if self.reconnect_base_ms > self.reconnect_max_ms {
            return Err(Error::config(format!(
                "source '{}' reconnect_base_ms exceeds reconnect_max_ms",
                self.name
            )));
        }
        Ok(())
    }

    /// Resolve the feed adapter for this source
    ///
    /// `fields` wins over `adapter`; otherwise the name is looked up in the
    /// built-in registry.
    pub fn feed_adapter(&self) -> Result<Arc<dyn FeedAdapter>> {
        if let Some(fields) = &self.fields {
            return Ok(Arc::new(ConfigurableAdapter::new(fields.clone())));
        }

        let registry = default_registry();
        let adapter = registry.get(&self.adapter).ok_or_else(|| {
            Error::config(format!(
                "source '{}' uses unknown adapter '{}' (known: {})",
                self.name,
                self.adapter,
                registry.list().join(", ")
            ))
        })?;

        match &self.link_base {
            Some(base) if adapter.name() == "discovery" => {
                Ok(Arc::new(DiscoveryAdapter::with_link_base(base)))
            }
            _ => Ok(adapter),
        }
    }

    /// Build the content source described by this configuration
    pub fn build(&self) -> Result<Arc<dyn ContentSource>> {
        self.validate()?;
        let url = self.url.clone().unwrap_or_default();

        Ok(match self.source_type {
            SourceType::Sse => Arc::new(SseStreamSource::new(
                self.kind(),
                url,
                self.feed_adapter()?,
                SseOptions {
                    buffer_capacity: self.buffer_capacity,
                    reconnect_base: Duration::from_millis(self.reconnect_base_ms),
                    reconnect_max: Duration::from_millis(self.reconnect_max_ms),
                    ..SseOptions::default()
                },
            )?),
            SourceType::HttpPoll => Arc::new(HttpPollSource::new(
                self.kind(),
                url,
                self.feed_adapter()?,
                Duration::from_millis(self.request_timeout_ms),
            )?),
            SourceType::Memory => Arc::new(MemorySource::new(self.kind())),
        })
    }
}

fn default_adapter() -> String {
    "discovery".to_string()
}

fn default_request_timeout_ms() -> u64 {
    10_000
}

fn default_buffer_capacity() -> usize {
    1024
}

fn default_reconnect_base_ms() -> u64 {
    5_000
}

fn default_reconnect_max_ms() -> u64 {
    60_000
}
