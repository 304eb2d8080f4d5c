//! Configuration management for Pilot services.
//!
//! All Pilot services share a unified configuration file at
//! `~/.pilot/config.json`.
//!
//! # Configuration Priority
//!
//! 1. Explicit config file values
//! 2. Default values
//!
//! Every section carries `#[serde(default)]` so a partial config file is
//! always valid; a missing file yields the defaults.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

/// Get the configuration directory path.
pub fn config_dir() -> PathBuf {
    directories::UserDirs::new().map_or_else(
        || PathBuf::from(".pilot"),
        |dirs| dirs.home_dir().join(".pilot"),
    )
}

/// Get the configuration file path.
pub fn config_path() -> PathBuf {
    config_dir().join("config.json")
}

/// Global network configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetworkConfig {
    /// Bind address for the management API.
    /// Default: "127.0.0.1" (conservative, local only)
    #[serde(default = "default_bind_address")]
    pub bind: String,

    /// Port for the management API.
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            bind: default_bind_address(),
            port: default_port(),
        }
    }
}

fn default_bind_address() -> String {
    "127.0.0.1".into()
}

fn default_port() -> u16 {
    4420
}

/// Storage locations for persisted state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Base directory for all persisted state.
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
        }
    }
}

fn default_data_dir() -> PathBuf {
    config_dir().join("data")
}

/// Policy engine configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PolicyConfig {
    /// Rules file path. Defaults to `<data_dir>/rules.json`.
    #[serde(default)]
    pub rules_file: Option<PathBuf>,
}

/// Task scheduler configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// Seconds between scheduling passes.
    #[serde(default = "default_interval_secs")]
    pub interval_secs: u64,

    /// Default retry budget for submitted tasks.
    #[serde(default = "default_max_retries")]
    pub default_max_retries: u32,

    /// Base delay for exponential retry backoff, in seconds.
    #[serde(default = "default_backoff_base_secs")]
    pub backoff_base_secs: u64,

    /// Default per-invocation timeout for action handlers, in seconds.
    #[serde(default = "default_action_timeout_secs")]
    pub action_timeout_secs: u64,

    /// Per-action-type timeout overrides, keyed by action kind name.
    #[serde(default)]
    pub action_timeouts: HashMap<String, u64>,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            interval_secs: default_interval_secs(),
            default_max_retries: default_max_retries(),
            backoff_base_secs: default_backoff_base_secs(),
            action_timeout_secs: default_action_timeout_secs(),
            action_timeouts: HashMap::new(),
        }
    }
}

fn default_interval_secs() -> u64 {
    30
}

fn default_max_retries() -> u32 {
    3
}

fn default_backoff_base_secs() -> u64 {
    30
}

fn default_action_timeout_secs() -> u64 {
    120
}

/// Reasoning collaborator (plan generator) configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlannerConfig {
    /// Chat endpoint of the reasoning collaborator. When unset the plan
    /// generator degrades to its deterministic fallback plan.
    #[serde(default)]
    pub endpoint: Option<String>,

    /// Model identifier passed to the collaborator.
    #[serde(default = "default_planner_model")]
    pub model: String,

    /// Sampling temperature.
    #[serde(default = "default_temperature")]
    pub temperature: f64,

    /// Request timeout, in seconds.
    #[serde(default = "default_planner_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for PlannerConfig {
    fn default() -> Self {
        Self {
            endpoint: None,
            model: default_planner_model(),
            temperature: default_temperature(),
            timeout_secs: default_planner_timeout_secs(),
        }
    }
}

fn default_planner_model() -> String {
    "default".into()
}

fn default_temperature() -> f64 {
    0.7
}

fn default_planner_timeout_secs() -> u64 {
    300
}

/// Notification sink configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NotificationConfig {
    /// Whether outbound notifications are enabled.
    #[serde(default)]
    pub enabled: bool,

    /// Webhook endpoint receiving failure/decision events.
    #[serde(default)]
    pub endpoint: Option<String>,
}

/// Observability configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObservabilityConfig {
    /// Base log level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Log output format: "pretty" or "json".
    #[serde(default = "default_log_format")]
    pub log_format: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            log_format: default_log_format(),
        }
    }
}

fn default_log_level() -> String {
    "info".into()
}

fn default_log_format() -> String {
    "pretty".into()
}

/// Unified Pilot configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub network: NetworkConfig,

    #[serde(default)]
    pub storage: StorageConfig,

    #[serde(default)]
    pub policy: PolicyConfig,

    #[serde(default)]
    pub scheduler: SchedulerConfig,

    #[serde(default)]
    pub planner: PlannerConfig,

    #[serde(default)]
    pub notifications: NotificationConfig,

    #[serde(default)]
    pub observability: ObservabilityConfig,
}

impl Config {
    /// Load configuration from the default location.
    ///
    /// A missing file yields the defaults; a malformed file is an error.
    pub fn load() -> Result<Self> {
        Self::load_from(&config_path())
    }

    /// Load configuration from a specific path.
    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let raw = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        serde_json::from_str(&raw)
            .with_context(|| format!("Failed to parse config file {}", path.display()))
    }

    /// Persist this configuration to a specific path.
    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create config directory {}", parent.display()))?;
        }
        let raw = serde_json::to_string_pretty(self)?;
        fs::write(path, raw)
            .with_context(|| format!("Failed to write config file {}", path.display()))
    }

    /// Path of the policy rules file.
    pub fn rules_path(&self) -> PathBuf {
        self.policy
            .rules_file
            .clone()
            .unwrap_or_else(|| self.storage.data_dir.join("rules.json"))
    }

    /// Path of the decision log database.
    pub fn decisions_db_path(&self) -> PathBuf {
        self.storage.data_dir.join("decisions.db")
    }

    /// Path of the task registry snapshot.
    pub fn tasks_snapshot_path(&self) -> PathBuf {
        self.storage.data_dir.join("tasks.json")
    }

    /// Path of the operator overrides file.
    pub fn overrides_path(&self) -> PathBuf {
        self.storage.data_dir.join("overrides.json")
    }
}
