// Copyright (c) 2026 Fleetkeeper Maintainers
// SPDX-License-Identifier: AGPL-3.0

// Agent Configuration Types
//
// Defines the configuration schema for the fleetkeeper host agent, including:
// - Store selection (control plane or in-memory)
// - Reconcile cadence and upgrade forgiveness window
// - Fleet lock backoff and deadlines
// - Probe and observability settings

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::domain::system::NodeHandler;

pub const CONFIG_PATH_ENV: &str = "FLEETKEEPER_CONFIG_PATH";

/// Top-level agent configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    /// Namespace holding this host's ManagedNode and the ConfigSets it applies
    #[serde(default = "default_namespace")]
    pub namespace: String,

    /// ManagedNode name; defaults to the host name
    #[serde(default)]
    pub node_name: Option<String>,

    /// Interval between two driver passes
    #[serde(default = "default_reconcile_interval", with = "humantime_serde")]
    pub reconcile_interval: Duration,

    #[serde(default)]
    pub upgrade: UpgradeConfig,

    #[serde(default)]
    pub locker: LockerConfig,

    #[serde(default)]
    pub store: StoreConfig,

    #[serde(default)]
    pub probes: ProbeConfig,

    #[serde(default)]
    pub observability: ObservabilityConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpgradeConfig {
    /// Tolerance around a scheduled time within which the upgrade is due now
    #[serde(default = "default_forgiveness", with = "humantime_serde")]
    pub forgiveness_period: Duration,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LockerConfig {
    #[serde(default = "default_backoff_min", with = "humantime_serde")]
    pub backoff_min: Duration,

    #[serde(default = "default_backoff_max", with = "humantime_serde")]
    pub backoff_max: Duration,

    #[serde(default = "default_lock_timeout", with = "humantime_serde")]
    pub lock_timeout: Duration,

    #[serde(default = "default_unlock_timeout", with = "humantime_serde")]
    pub unlock_timeout: Duration,

    #[serde(default = "default_unlock_timeout", with = "humantime_serde")]
    pub has_lock_timeout: Duration,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum StoreKind {
    ControlPlane,
    InMemory,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    #[serde(default = "default_store_kind")]
    pub kind: StoreKind,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_url: Option<String>,

    /// Bearer token file; ignored when missing
    #[serde(default = "default_token_path")]
    pub token_path: PathBuf,

    #[serde(default = "default_api_group")]
    pub group: String,

    #[serde(default = "default_api_version")]
    pub version: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProbeConfig {
    #[serde(default = "default_probe_bind")]
    pub bind_address: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObservabilityConfig {
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// "text" or "json"
    #[serde(default = "default_log_format")]
    pub log_format: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metrics_address: Option<String>,
}

fn default_namespace() -> String {
    "default".to_string()
}

fn default_reconcile_interval() -> Duration {
    Duration::from_secs(60)
}

fn default_forgiveness() -> Duration {
    Duration::from_secs(60)
}

fn default_backoff_min() -> Duration {
    Duration::from_secs(3)
}

fn default_backoff_max() -> Duration {
    Duration::from_secs(180)
}

fn default_lock_timeout() -> Duration {
    Duration::from_secs(3 * 3600)
}

fn default_unlock_timeout() -> Duration {
    Duration::from_secs(3600)
}

fn default_store_kind() -> StoreKind {
    StoreKind::ControlPlane
}

fn default_token_path() -> PathBuf {
    PathBuf::from("/var/run/secrets/kubernetes.io/serviceaccount/token")
}

fn default_api_group() -> String {
    crate::domain::node::API_GROUP.to_string()
}

fn default_api_version() -> String {
    crate::domain::node::API_VERSION.to_string()
}

fn default_probe_bind() -> String {
    "0.0.0.0:8081".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "text".to_string()
}

impl Default for UpgradeConfig {
    fn default() -> Self {
        Self {
            forgiveness_period: default_forgiveness(),
        }
    }
}

impl Default for LockerConfig {
    fn default() -> Self {
        Self {
            backoff_min: default_backoff_min(),
            backoff_max: default_backoff_max(),
            lock_timeout: default_lock_timeout(),
            unlock_timeout: default_unlock_timeout(),
            has_lock_timeout: default_unlock_timeout(),
        }
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            kind: default_store_kind(),
            api_url: Some("https://kubernetes.default.svc".to_string()),
            token_path: default_token_path(),
            group: default_api_group(),
            version: default_api_version(),
        }
    }
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            bind_address: default_probe_bind(),
        }
    }
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            log_format: default_log_format(),
            metrics_address: Some("0.0.0.0:9090".to_string()),
        }
    }
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            namespace: default_namespace(),
            node_name: None,
            reconcile_interval: default_reconcile_interval(),
            upgrade: UpgradeConfig::default(),
            locker: LockerConfig::default(),
            store: StoreConfig::default(),
            probes: ProbeConfig::default(),
            observability: ObservabilityConfig::default(),
        }
    }
}

impl AgentConfig {
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

    pub fn from_yaml_str(yaml: &str) -> anyhow::Result<Self> {
        let config = serde_yaml::from_str(yaml)?;
        Ok(config)
    }

    /// Discover configuration file using precedence order
    /// 1. FLEETKEEPER_CONFIG_PATH environment variable
    /// 2. ./fleetkeeper.yaml (working directory)
    /// 3. ~/.fleetkeeper/config.yaml (user home)
    /// 4. /etc/fleetkeeper/config.yaml (system)
    pub fn discover_config() -> Option<PathBuf> {
        if let Ok(path) = std::env::var(CONFIG_PATH_ENV) {
            let path = PathBuf::from(path);
            if path.exists() {
                return Some(path);
            }
        }

        let cwd = PathBuf::from("./fleetkeeper.yaml");
        if cwd.exists() {
            return Some(cwd);
        }

        if let Some(home) = dirs::home_dir() {
            let user_config = home.join(".fleetkeeper").join("config.yaml");
            if user_config.exists() {
                return Some(user_config);
            }
        }

        let system_config = PathBuf::from("/etc/fleetkeeper/config.yaml");
        if system_config.exists() {
            return Some(system_config);
        }

        None
    }

    /// Load configuration with discovery, fallback to default
    pub fn load_or_default(cli_path: Option<PathBuf>) -> anyhow::Result<Self> {
        // Explicit path must exist
        if let Some(path) = cli_path {
            tracing::info!("Loading configuration from explicit path: {:?}", path);
            let mut config = Self::from_yaml_file(&path)
                .map_err(|e| anyhow::anyhow!("Failed to load config at {:?}: {}", path, e))?;
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

    fn apply_overrides_from(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(val) = lookup("FLEETKEEPER_NAMESPACE") {
            tracing::info!("Environment override: FLEETKEEPER_NAMESPACE={}", val);
            self.namespace = val;
        }

        if let Some(val) = lookup("FLEETKEEPER_API_URL") {
            tracing::info!("Environment override: FLEETKEEPER_API_URL={}", val);
            self.store.api_url = Some(val);
        }

        if let Some(val) = lookup("FLEETKEEPER_FORGIVENESS_PERIOD") {
            match humantime::parse_duration(&val) {
                Ok(period) => {
                    tracing::info!("Environment override: FLEETKEEPER_FORGIVENESS_PERIOD={}", val);
                    self.upgrade.forgiveness_period = period;
                }
                Err(_) => {
                    tracing::warn!(
                        "Invalid value for FLEETKEEPER_FORGIVENESS_PERIOD: '{}'. Expected a duration like 1m. Ignoring.",
                        val
                    );
                }
            }
        }
    }

    /// ManagedNode name for this host: the configured name, else the
    /// host name reported by the node handler.
    pub fn resolve_node_name(&self, node: &dyn NodeHandler) -> anyhow::Result<String> {
        if let Some(name) = self.node_name.as_ref().filter(|n| !n.is_empty()) {
            return Ok(name.clone());
        }
        Ok(node.hostname()?)
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.namespace.is_empty() {
            anyhow::bail!("namespace cannot be empty");
        }

        if self.reconcile_interval.is_zero() {
            anyhow::bail!("reconcile_interval must be greater than zero");
        }

        if self.locker.backoff_min > self.locker.backoff_max {
            anyhow::bail!(
                "locker.backoff_min ({:?}) exceeds locker.backoff_max ({:?})",
                self.locker.backoff_min,
                self.locker.backoff_max
            );
        }

        if self.locker.lock_timeout.is_zero() {
            anyhow::bail!("locker.lock_timeout must be greater than zero");
        }

        if self.store.kind == StoreKind::ControlPlane
            && self.store.api_url.as_deref().map_or(true, str::is_empty)
        {
            anyhow::bail!("store.api_url is required for the control-plane store");
        }

        match self.observability.log_format.as_str() {
            "text" | "json" => {}
            other => anyhow::bail!("Invalid observability.log_format: '{}'", other),
        }

        Ok(())
    }
}
