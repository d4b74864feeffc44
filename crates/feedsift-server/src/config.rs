//! Server configuration

use crate::cli::ServeArgs;
use feedsift_classifiers::ClassifierConfig;
use feedsift_core::{Error, Result};
use feedsift_pipeline::{DeliveryConfig, RegistryConfig, SchedulerConfig};
use feedsift_sources::SourceConfig;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::net::SocketAddr;
use std::path::Path;

/// Top-level server configuration, read from YAML
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Listen address
    #[serde(default)]
    pub listen: ListenConfig,

    /// Classifier backend
    pub classifier: ClassifierConfig,

    /// Content sources, polled by name
    pub sources: Vec<SourceConfig>,

    #[serde(default)]
    pub scheduler: SchedulerConfig,

    /// Per-subscription queue bounds
    #[serde(default)]
    pub registry: RegistryConfig,

    #[serde(default)]
    pub delivery: DeliveryConfig,
}

impl ServerConfig {
    /// Read a configuration file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            Error::config(format!("cannot read {}: {}", path.display(), e))
        })?;
        Self::from_yaml(&content)
            .map_err(|e| Error::config(format!("{}: {}", path.display(), e)))
    }

    pub fn from_yaml(content: &str) -> std::result::Result<Self, serde_yaml::Error> {
        serde_yaml::from_str(content)
    }

    /// Apply command-line overrides on top of the file
    pub fn apply_overrides(&mut self, args: &ServeArgs) {
        if let Some(address) = &args.listen {
            self.listen.address = address.clone();
        }
        if let Some(port) = args.port {
            self.listen.port = port;
        }
        if let Some(endpoint) = &args.classifier_endpoint {
            self.classifier.endpoint = endpoint.clone();
        }
        if let Some(key) = &args.api_key {
            self.classifier.api_key = Some(key.clone());
        }
    }

    /// Check everything needed before any source is polled
    pub fn validate(&self) -> Result<()> {
        if self.sources.is_empty() {
            return Err(Error::config("at least one source must be configured"));
        }

        let mut names = HashSet::new();
        for source in &self.sources {
            if !names.insert(source.name.as_str()) {
                return Err(Error::config(format!(
                    "duplicate source name '{}'",
                    source.name
                )));
            }
            source.validate()?;
        }

        self.classifier.validate()?;
        self.scheduler.validate()?;
        self.registry.validate()?;
        self.delivery.validate()?;
        self.listen.socket_addr()?;
        Ok(())
    }
}

/// Where the HTTP server binds
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListenConfig {
    #[serde(default = "default_address")]
    pub address: String,

    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ListenConfig {
    fn default() -> Self {
        Self {
            address: default_address(),
            port: default_port(),
        }
    }
}

impl ListenConfig {
    pub fn socket_addr(&self) -> Result<SocketAddr> {
        format!("{}:{}", self.address, self.port)
            .parse()
            .map_err(|e| Error::config(format!("invalid listen address: {}", e)))
    }
}

fn default_address() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

#[cfg(test)]
mod tests {
    use super::*;

    const MINIMAL: &str = r#"
classifier:
  endpoint: http://localhost:11434/v1
  model: llama3
  base_prompt: You filter social posts.
sources:
  - name: casts
    type: http_poll
    url: http://localhost:9000/casts
"#;

    #[test]
    fn test_minimal_config_gets_defaults() {
        let config = ServerConfig::from_yaml(MINIMAL).unwrap();
        config.validate().unwrap();

        assert_eq!(config.listen.port, 8080);
        assert_eq!(config.scheduler.poll_interval_ms, 5_000);
        assert_eq!(config.registry.high_water_mark, 10_000);
        assert_eq!(config.delivery.keepalive_secs, 15);
        assert_eq!(config.classifier.policy.timeout_ms, 15_000);
    }

    #[test]
    fn test_no_sources_is_invalid() {
        let mut config = ServerConfig::from_yaml(MINIMAL).unwrap();
        config.sources.clear();
        let err = config.validate().unwrap_err();
        assert!(matches!(err, Error::ConfigurationInvalid(_)));
    }

    #[test]
    fn test_duplicate_source_names_are_invalid() {
        let mut config = ServerConfig::from_yaml(MINIMAL).unwrap();
        config.sources.push(config.sources[0].clone());
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("duplicate source name 'casts'"));
    }

    #[test]
    fn test_zero_poll_interval_is_invalid() {
        let mut config = ServerConfig::from_yaml(MINIMAL).unwrap();
        config.scheduler.poll_interval_ms = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_cli_overrides() {
        let mut config = ServerConfig::from_yaml(MINIMAL).unwrap();
        config.apply_overrides(&ServeArgs {
            port: Some(9090),
            api_key: Some("sk-test".to_string()),
            ..Default::default()
        });

        assert_eq!(config.listen.port, 9090);
        assert_eq!(config.listen.address, "0.0.0.0");
        assert_eq!(config.classifier.api_key.as_deref(), Some("sk-test"));
    }

    #[test]
    fn test_missing_file_is_config_error() {
        let err = ServerConfig::load("/nonexistent/feedsift.yaml").unwrap_err();
        assert!(matches!(err, Error::ConfigurationInvalid(_)));
    }
}
