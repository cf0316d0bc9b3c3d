// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

// Node Configuration Types
//
// Defines the configuration schema for a Conduit coordination node:
// - Kubernetes-style manifest format (apiVersion/kind/metadata/spec)
// - Event bus sizing
// - Channel supervision (reconnect cadence, shutdown bound, rate limits)
// - Policy and model catalog sources
// - Constraints resolver behaviour
// - Logging and metrics settings

use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::domain::llm::FallbackStrategy;
use crate::domain::model_catalog::ModelCatalog;
use crate::domain::policy::Policy;

pub const API_VERSION: &str = "conduit/v1";
pub const KIND: &str = "NodeConfig";

/// Top-level Kubernetes-style node configuration manifest
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeConfigManifest {
    /// API version (must be "conduit/v1")
    #[serde(rename = "apiVersion")]
    pub api_version: String,

    /// Resource kind (must be "NodeConfig")
    pub kind: String,

    pub metadata: ManifestMetadata,

    #[serde(default)]
    pub spec: NodeConfigSpec,
}

/// Manifest metadata (Kubernetes-style)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ManifestMetadata {
    /// Human-readable node name
    pub name: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub labels: Option<HashMap<String, String>>,
}

/// Node configuration body (content under spec:)
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NodeConfigSpec {
    #[serde(default)]
    pub event_bus: EventBusConfig,

    #[serde(default)]
    pub channels: ChannelsConfig,

    #[serde(default)]
    pub policy: PolicySourceConfig,

    #[serde(default)]
    pub catalog: CatalogSourceConfig,

    #[serde(default)]
    pub resolver: ResolverConfig,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub observability: Option<ObservabilityConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventBusConfig {
    /// Bounded queue length per subscriber; overflow drops events for that subscriber
    #[serde(default = "default_subscriber_capacity")]
    pub subscriber_capacity: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChannelsConfig {
    /// How often a supervisor retries a channel that is not connected
    #[serde(default = "default_reconnect_interval", with = "humantime_serde")]
    pub reconnect_interval: Duration,

    /// Upper bound on how long shutdown waits for supervisors to disconnect
    #[serde(default = "default_shutdown_timeout", with = "humantime_serde")]
    pub shutdown_timeout: Duration,

    /// Outbound rate limit applied to every registered channel
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rate_limit: Option<RateLimitConfig>,

    /// Per-channel limits, keyed by channel id (take precedence over `rate_limit`)
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub rate_limit_overrides: HashMap<String, RateLimitConfig>,
}

/// Fixed-window send limit
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateLimitConfig {
    /// Maximum number of sends allowed within one window
    pub max_sends: u32,

    #[serde(with = "humantime_serde")]
    pub window: Duration,
}

impl ChannelsConfig {
    /// Effective rate limit for a channel id
    pub fn rate_limit_for(&self, channel_id: &str) -> Option<RateLimitConfig> {
        self.rate_limit_overrides
            .get(channel_id)
            .copied()
            .or(self.rate_limit)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PolicySourceConfig {
    /// Policy document (YAML/JSON). Absent: empty policy that asks for everything.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,
}

impl PolicySourceConfig {
    pub fn load(&self) -> anyhow::Result<Policy> {
        match &self.path {
            Some(path) => {
                let bytes = std::fs::read(path)
                    .with_context(|| format!("Failed to read policy file {:?}", path))?;
                Policy::from_bytes(&bytes)
                    .with_context(|| format!("Invalid policy file {:?}", path))
            }
            None => Ok(Policy::default()),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CatalogSourceConfig {
    /// Model catalog document (YAML/JSON). Absent: embedded default catalog.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,
}

impl CatalogSourceConfig {
    pub fn load(&self) -> anyhow::Result<ModelCatalog> {
        match &self.path {
            Some(path) => {
                let bytes = std::fs::read(path)
                    .with_context(|| format!("Failed to read model catalog {:?}", path))?;
                ModelCatalog::from_bytes(&bytes)
                    .with_context(|| format!("Invalid model catalog {:?}", path))
            }
            None => ModelCatalog::embedded().context("Embedded model catalog is invalid"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResolverConfig {
    #[serde(default)]
    pub fallback_strategy: FallbackStrategy,

    /// Maximum links followed when `fallback_strategy` is `verify-chain`
    #[serde(default = "default_max_fallback_hops")]
    pub max_fallback_hops: usize,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ObservabilityConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub logging: Option<LoggingConfig>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub metrics: Option<MetricsConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (e.g., "info", "debug", "trace")
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Output format ("json" or "text")
    #[serde(default = "default_log_format")]
    pub format: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Prometheus listener port
    #[serde(default = "default_metrics_port")]
    pub port: u16,
}

// Default value functions
fn default_true() -> bool {
    true
}

fn default_subscriber_capacity() -> usize {
    256
}

fn default_reconnect_interval() -> Duration {
    Duration::from_secs(30)
}

fn default_shutdown_timeout() -> Duration {
    Duration::from_secs(5)
}

fn default_max_fallback_hops() -> usize {
    3
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "text".to_string()
}

fn default_metrics_port() -> u16 {
    9090
}

impl Default for EventBusConfig {
    fn default() -> Self {
        Self {
            subscriber_capacity: default_subscriber_capacity(),
        }
    }
}

impl Default for ChannelsConfig {
    fn default() -> Self {
        Self {
            reconnect_interval: default_reconnect_interval(),
            shutdown_timeout: default_shutdown_timeout(),
            rate_limit: None,
            rate_limit_overrides: HashMap::new(),
        }
    }
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            fallback_strategy: FallbackStrategy::default(),
            max_fallback_hops: default_max_fallback_hops(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

impl Default for NodeConfigManifest {
    fn default() -> Self {
        Self {
            api_version: API_VERSION.to_string(),
            kind: KIND.to_string(),
            metadata: ManifestMetadata {
                name: "conduit-node".to_string(),
                version: None,
                labels: None,
            },
            spec: NodeConfigSpec::default(),
        }
    }
}

impl NodeConfigManifest {
    /// Load configuration from YAML file
    pub fn from_yaml_file(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config = serde_yaml::from_str(&content)?;
        Ok(config)
    }

    /// Save configuration to YAML file
    pub fn to_yaml_file(&self, path: impl AsRef<Path>) -> anyhow::Result<()> {
        let yaml = serde_yaml::to_string(self)?;
        std::fs::write(path, yaml)?;
        Ok(())
    }

    /// Parse configuration from YAML string
    pub fn from_yaml_str(yaml: &str) -> anyhow::Result<Self> {
        let config = serde_yaml::from_str(yaml)?;
        Ok(config)
    }

    /// Discover configuration file using precedence order
    /// 1. CONDUIT_CONFIG_PATH environment variable
    /// 2. ./conduit-config.yaml (working directory)
    /// 3. ~/.conduit/config.yaml (user home)
    /// 4. /etc/conduit/config.yaml (system, Unix)
    pub fn discover_config() -> Option<PathBuf> {
        if let Ok(path) = std::env::var("CONDUIT_CONFIG_PATH") {
            let path = PathBuf::from(path);
            if path.exists() {
                return Some(path);
            }
        }

        let cwd = PathBuf::from("./conduit-config.yaml");
        if cwd.exists() {
            return Some(cwd);
        }

        if let Some(home) = dirs::home_dir() {
            let user_config = home.join(".conduit").join("config.yaml");
            if user_config.exists() {
                return Some(user_config);
            }
        }

        #[cfg(unix)]
        {
            let system_config = PathBuf::from("/etc/conduit/config.yaml");
            if system_config.exists() {
                return Some(system_config);
            }
        }

        None
    }

    /// Load configuration with discovery, fallback to default
    pub fn load_or_default(cli_path: Option<PathBuf>) -> anyhow::Result<Self> {
        // Explicit path must exist and parse
        if let Some(path) = cli_path {
            tracing::info!("Loading configuration from explicit path: {:?}", path);
            let mut config = Self::from_yaml_file(&path).map_err(|e| {
                anyhow::anyhow!("Failed to load config at {:?}: {}", path, e)
            })?;
            config.apply_env_overrides();
            return Ok(config);
        }

        if let Some(config_path) = Self::discover_config() {
            tracing::info!("Loading configuration from discovered path: {:?}", config_path);
            let mut config = Self::from_yaml_file(config_path)?;
            config.apply_env_overrides();
            Ok(config)
        } else {
            tracing::warn!("No configuration file found in standard locations. Using defaults.");
            let mut config = Self::default();
            config.apply_env_overrides();
            Ok(config)
        }
    }

    /// Apply environment variable overrides to configuration
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides_from(|key| std::env::var(key).ok());
    }

    /// Apply overrides using an arbitrary variable lookup
    pub fn apply_overrides_from(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(level) = lookup("CONDUIT_LOG_LEVEL") {
            tracing::info!("Environment override: CONDUIT_LOG_LEVEL={}", level);
            let observability = self.spec.observability.get_or_insert_with(Default::default);
            observability
                .logging
                .get_or_insert_with(LoggingConfig::default)
                .level = level;
        }

        if let Some(val) = lookup("CONDUIT_RECONNECT_INTERVAL_SECS") {
            match val.parse::<u64>() {
                Ok(secs) if secs > 0 => {
                    tracing::info!("Environment override: CONDUIT_RECONNECT_INTERVAL_SECS={}", secs);
                    self.spec.channels.reconnect_interval = Duration::from_secs(secs);
                }
                _ => {
                    tracing::warn!(
                        "Invalid value for CONDUIT_RECONNECT_INTERVAL_SECS: '{}'. Expected a positive integer. Ignoring.",
                        val
                    );
                }
            }
        }
    }

    /// Validate configuration
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.api_version != API_VERSION {
            anyhow::bail!(
                "Invalid apiVersion: '{}'. Must be '{}'",
                self.api_version,
                API_VERSION
            );
        }

        if self.kind != KIND {
            anyhow::bail!("Invalid kind: '{}'. Must be '{}'", self.kind, KIND);
        }

        if self.metadata.name.is_empty() {
            anyhow::bail!("metadata.name cannot be empty");
        }

        if self.spec.event_bus.subscriber_capacity == 0 {
            anyhow::bail!("spec.event_bus.subscriber_capacity must be greater than zero");
        }

        let channels = &self.spec.channels;
        if channels.reconnect_interval.is_zero() {
            anyhow::bail!("spec.channels.reconnect_interval must be greater than zero");
        }

        if channels.shutdown_timeout.is_zero() {
            anyhow::bail!("spec.channels.shutdown_timeout must be greater than zero");
        }

        if let Some(limit) = &channels.rate_limit {
            validate_rate_limit("spec.channels.rate_limit", limit)?;
        }

        for (channel_id, limit) in &channels.rate_limit_overrides {
            validate_rate_limit(
                &format!("spec.channels.rate_limit_overrides.{}", channel_id),
                limit,
            )?;
        }

        if self.spec.resolver.fallback_strategy == FallbackStrategy::VerifyChain
            && self.spec.resolver.max_fallback_hops == 0
        {
            anyhow::bail!("spec.resolver.max_fallback_hops must be at least 1 for verify-chain");
        }

        if let Some(logging) = self.spec.observability.as_ref().and_then(|o| o.logging.as_ref()) {
            if logging.format != "json" && logging.format != "text" {
                anyhow::bail!(
                    "Invalid logging format: '{}'. Must be 'json' or 'text'",
                    logging.format
                );
            }
        }

        Ok(())
    }

    /// Configured log level, if any
    pub fn log_level(&self) -> Option<&str> {
        self.spec
            .observability
            .as_ref()
            .and_then(|o| o.logging.as_ref())
            .map(|l| l.level.as_str())
    }
}

fn validate_rate_limit(field: &str, limit: &RateLimitConfig) -> anyhow::Result<()> {
    if limit.max_sends == 0 {
        anyhow::bail!("{}.max_sends must be greater than zero", field);
    }
    if limit.window.is_zero() {
        anyhow::bail!("{}.window must be greater than zero", field);
    }
    Ok(())
}
