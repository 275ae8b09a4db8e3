//! Run configuration types
//!
//! Defines the structure of the YAML configuration file: the two API
//! endpoints, run-wide naming and wait defaults, and per-check overrides.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

use crate::checks::{CheckContext, CheckOptions, Names};
use crate::client::{HarvesterClient, RancherClient};

/// Errors that can occur during configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse config: {0}")]
    Parse(#[from] serde_yaml::Error),

    #[error("invalid configuration: {0}")]
    Invalid(String),

    #[error("failed to create client: {0}")]
    Client(#[from] crate::client::ClientError),
}

/// One API endpoint: base URL plus bearer token.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EndpointConfig {
    pub url: String,
    pub token: String,
    /// Skip TLS certificate verification (self-signed lab installs).
    #[serde(default)]
    pub insecure: bool,
}

/// Run-wide settings: resource naming and wait defaults.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunConfig {
    /// Base name every created resource derives from.
    #[serde(default = "default_unique_name")]
    pub unique_name: String,

    /// RKE2 version for the guest cluster.
    #[serde(default = "default_kubernetes_version")]
    pub kubernetes_version: String,

    /// Default budget for each wait.
    #[serde(default = "default_wait_timeout", with = "humantime_serde")]
    pub wait_timeout: Duration,

    /// Default delay between poll attempts.
    #[serde(default = "default_poll_interval", with = "humantime_serde")]
    pub poll_interval: Duration,
}

fn default_unique_name() -> String {
    "drover-e2e".to_string()
}

fn default_kubernetes_version() -> String {
    "v1.26.10+rke2r2".to_string()
}

fn default_wait_timeout() -> Duration {
    Duration::from_secs(600)
}

fn default_poll_interval() -> Duration {
    Duration::from_secs(5)
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            unique_name: default_unique_name(),
            kubernetes_version: default_kubernetes_version(),
            wait_timeout: default_wait_timeout(),
            poll_interval: default_poll_interval(),
        }
    }
}

/// Configuration for a single check
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckConfig {
    /// Whether this check is enabled
    #[serde(default = "default_enabled")]
    pub enabled: bool,

    /// Wait budget for this check's polls
    #[serde(
        default,
        with = "humantime_serde",
        skip_serializing_if = "Option::is_none"
    )]
    pub timeout: Option<Duration>,

    /// Delay between poll attempts
    #[serde(
        default,
        with = "humantime_serde",
        skip_serializing_if = "Option::is_none"
    )]
    pub interval: Option<Duration>,

    /// Additional check-specific options
    #[serde(default, flatten)]
    pub extra: HashMap<String, serde_json::Value>,
}

fn default_enabled() -> bool {
    true
}

impl Default for CheckConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            timeout: None,
            interval: None,
            extra: HashMap::new(),
        }
    }
}

impl CheckConfig {
    /// Convert to CheckOptions, falling back to the check's defaults.
    pub fn to_check_options(&self, defaults: &CheckOptions) -> CheckOptions {
        CheckOptions {
            timeout: self.timeout.or(defaults.timeout),
            interval: self.interval.or(defaults.interval),
            extra: self.extra.clone(),
        }
    }
}

/// Top-level configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Rancher management server
    pub rancher: EndpointConfig,

    /// Harvester cluster being imported
    pub harvester: EndpointConfig,

    /// Run-wide settings
    #[serde(default)]
    pub run: RunConfig,

    /// Check configurations (check name -> config)
    #[serde(default)]
    pub checks: HashMap<String, CheckConfig>,
}

impl Config {
    /// Load configuration from a YAML file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }

    /// Parse configuration from a YAML string
    pub fn from_yaml(yaml: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.rancher.url.is_empty() {
            return Err(ConfigError::Invalid("rancher.url is empty".into()));
        }
        if self.harvester.url.is_empty() {
            return Err(ConfigError::Invalid("harvester.url is empty".into()));
        }
        if self.run.unique_name.is_empty() {
            return Err(ConfigError::Invalid("run.unique_name is empty".into()));
        }
        Ok(())
    }

    /// Build the shared check context: clients, derived names, wait
    /// defaults and the cancel flag every poll observes.
    pub fn to_check_context(&self) -> Result<CheckContext, ConfigError> {
        let rancher = RancherClient::new(
            &self.rancher.url,
            &self.rancher.token,
            self.rancher.insecure,
        )?;
        let harvester = HarvesterClient::new(
            &self.harvester.url,
            &self.harvester.token,
            self.harvester.insecure,
        )?;

        Ok(CheckContext {
            rancher: Arc::new(rancher),
            harvester: Arc::new(harvester),
            names: Names::new(&self.run.unique_name),
            kubernetes_version: self.run.kubernetes_version.clone(),
            wait_timeout: self.run.wait_timeout,
            poll_interval: self.run.poll_interval,
            cancel: Arc::new(AtomicBool::new(false)),
        })
    }

    /// Get configuration for a specific check
    pub fn check_config(&self, name: &str) -> Option<&CheckConfig> {
        self.checks.get(name)
    }

    /// Check if a specific check is enabled (default: enabled)
    pub fn is_check_enabled(&self, name: &str) -> bool {
        self.checks.get(name).map(|c| c.enabled).unwrap_or(true)
    }

    /// Generate a default configuration
    pub fn default_config() -> Self {
        Config {
            rancher: EndpointConfig {
                url: "https://rancher.example.com".to_string(),
                token: "token-xxxxx:secret".to_string(),
                insecure: false,
            },
            harvester: EndpointConfig {
                url: "https://harvester.example.com".to_string(),
                token: "token-yyyyy:secret".to_string(),
                insecure: false,
            },
            run: RunConfig::default(),
            checks: {
                let mut checks = HashMap::new();
                checks.insert("import".to_string(), CheckConfig::default());
                checks.insert("credential".to_string(), CheckConfig::default());
                checks.insert("network".to_string(), CheckConfig::default());
                checks.insert("image".to_string(), CheckConfig::default());
                checks.insert("provision".to_string(), CheckConfig::default());
                checks
            },
        }
    }

    /// Serialize to YAML string
    pub fn to_yaml(&self) -> Result<String, ConfigError> {
        Ok(serde_yaml::to_string(self)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE_CONFIG: &str = r#"
rancher:
  url: https://rancher.local
  token: token-abc:secret
  insecure: true
harvester:
  url: https://harvester.local
  token: token-def:secret
run:
  unique_name: ci-417
  kubernetes_version: v1.27.8+rke2r1
  wait_timeout: 10m
  poll_interval: 5s
checks:
  image:
    enabled: true
    timeout: 20m
    image_url: http://mirror.local/focal.img
  provision:
    enabled: false
"#;

    #[test]
    fn parse_sample_config() {
        let config = Config::from_yaml(SAMPLE_CONFIG).unwrap();
        assert_eq!(config.rancher.url, "https://rancher.local");
        assert!(config.rancher.insecure);
        assert!(!config.harvester.insecure);
        assert_eq!(config.run.unique_name, "ci-417");
        assert_eq!(config.run.wait_timeout, Duration::from_secs(600));
        assert_eq!(config.run.poll_interval, Duration::from_secs(5));
    }

    #[test]
    fn check_overrides_parse() {
        let config = Config::from_yaml(SAMPLE_CONFIG).unwrap();
        let image = config.check_config("image").unwrap();
        assert_eq!(image.timeout, Some(Duration::from_secs(1200)));
        assert_eq!(
            image.extra.get("image_url").and_then(|v| v.as_str()),
            Some("http://mirror.local/focal.img")
        );
    }

    #[test]
    fn check_enabled_defaults() {
        let config = Config::from_yaml(SAMPLE_CONFIG).unwrap();
        assert!(config.is_check_enabled("image"));
        assert!(!config.is_check_enabled("provision"));
        assert!(config.is_check_enabled("import"));
    }

    #[test]
    fn empty_rancher_url_is_rejected() {
        let yaml = r#"
rancher:
  url: ""
  token: t
harvester:
  url: https://harvester.local
  token: t
"#;
        assert!(matches!(
            Config::from_yaml(yaml),
            Err(ConfigError::Invalid(_))
        ));
    }

    #[test]
    fn default_config_roundtrips() {
        let config = Config::default_config();
        let yaml = config.to_yaml().unwrap();
        let parsed = Config::from_yaml(&yaml).unwrap();
        assert_eq!(parsed.run.unique_name, config.run.unique_name);
        assert_eq!(parsed.checks.len(), config.checks.len());
    }

    #[test]
    fn to_check_options_layers_over_defaults() {
        let defaults = CheckOptions {
            timeout: Some(Duration::from_secs(300)),
            interval: Some(Duration::from_secs(5)),
            extra: HashMap::new(),
        };
        let check = CheckConfig {
            enabled: true,
            timeout: Some(Duration::from_secs(60)),
            interval: None,
            extra: HashMap::new(),
        };
        let opts = check.to_check_options(&defaults);
        assert_eq!(opts.timeout, Some(Duration::from_secs(60)));
        assert_eq!(opts.interval, Some(Duration::from_secs(5)));
    }
}
