//! Configuration for the warden daemon.
//!
//! Loads settings from /etc/warden/config.toml or uses defaults. Every
//! component receives its section at construction; nothing reads ambient
//! process state.

use crate::alert::AlertPolicy;
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::{info, warn};

/// Config file path
pub const CONFIG_PATH: &str = "/etc/warden/config.toml";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: toml::de::Error,
    },
}

/// Monitoring and healing settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitorConfig {
    /// Seconds between continuous-mode cycles
    #[serde(default = "default_interval")]
    pub interval_secs: u64,

    /// Restart attempts per incident before escalating
    #[serde(default = "default_max_attempts")]
    pub max_restart_attempts: u32,

    /// Per-attempt restart timeout handed to the inventory
    #[serde(default = "default_restart_timeout")]
    pub restart_timeout_secs: u64,

    /// Wait between restart attempts of one incident
    #[serde(default = "default_retry_delay")]
    pub retry_delay_secs: u64,

    /// Label key that marks a resource as managed
    #[serde(default = "default_managed_label")]
    pub managed_label: String,

    /// Resources whose failure is always critical
    #[serde(default)]
    pub critical_resources: Vec<String>,
}

fn default_interval() -> u64 {
    30
}

fn default_max_attempts() -> u32 {
    3
}

fn default_restart_timeout() -> u64 {
    10
}

fn default_retry_delay() -> u64 {
    2
}

fn default_managed_label() -> String {
    crate::resource::DEFAULT_MANAGED_LABEL.to_string()
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            interval_secs: default_interval(),
            max_restart_attempts: default_max_attempts(),
            restart_timeout_secs: default_restart_timeout(),
            retry_delay_secs: default_retry_delay(),
            managed_label: default_managed_label(),
            critical_resources: Vec::new(),
        }
    }
}

impl MonitorConfig {
    pub fn is_critical(&self, name: &str) -> bool {
        self.critical_resources.iter().any(|c| c == name)
    }
}

/// Decision engine (LLM) settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    #[serde(default = "default_llm_enabled")]
    pub enabled: bool,

    #[serde(default = "default_llm_endpoint")]
    pub endpoint: String,

    #[serde(default = "default_llm_model")]
    pub model: String,

    /// Per-call timeout; a timeout is an engine failure, never retried
    #[serde(default = "default_llm_timeout")]
    pub timeout_secs: u64,

    /// Tool-bearing rounds before the loop forces a final answer
    #[serde(default = "default_max_iterations")]
    pub max_iterations: u32,
}

fn default_llm_enabled() -> bool {
    true
}

fn default_llm_endpoint() -> String {
    "http://127.0.0.1:11434".to_string()
}

fn default_llm_model() -> String {
    "llama3.2:latest".to_string()
}

fn default_llm_timeout() -> u64 {
    120
}

fn default_max_iterations() -> u32 {
    3
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            enabled: default_llm_enabled(),
            endpoint: default_llm_endpoint(),
            model: default_llm_model(),
            timeout_secs: default_llm_timeout(),
            max_iterations: default_max_iterations(),
        }
    }
}

/// SMTP alert delivery settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmailConfig {
    #[serde(default = "default_smtp_host")]
    pub smtp_host: String,

    #[serde(default = "default_smtp_port")]
    pub smtp_port: u16,

    /// Sender address; also the SMTP login user when `username` is unset
    #[serde(default)]
    pub from: String,

    #[serde(default)]
    pub to: String,

    #[serde(default)]
    pub username: Option<String>,

    /// App password, not an account password
    #[serde(default)]
    pub password: String,
}

fn default_smtp_host() -> String {
    "smtp.gmail.com".to_string()
}

fn default_smtp_port() -> u16 {
    587
}

impl Default for EmailConfig {
    fn default() -> Self {
        Self {
            smtp_host: default_smtp_host(),
            smtp_port: default_smtp_port(),
            from: String::new(),
            to: String::new(),
            username: None,
            password: String::new(),
        }
    }
}

/// Inventory service location
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InventoryConfig {
    #[serde(default = "default_inventory_endpoint")]
    pub endpoint: String,
}

fn default_inventory_endpoint() -> String {
    "http://127.0.0.1:8001".to_string()
}

impl Default for InventoryConfig {
    fn default() -> Self {
        Self {
            endpoint: default_inventory_endpoint(),
        }
    }
}

/// Top-level daemon configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WardenConfig {
    #[serde(default)]
    pub monitor: MonitorConfig,

    #[serde(default)]
    pub llm: LlmConfig,

    #[serde(default)]
    pub email: EmailConfig,

    #[serde(default)]
    pub inventory: InventoryConfig,

    #[serde(default)]
    pub alerts: AlertPolicy,
}

impl WardenConfig {
    /// Load from a toml file, falling back to defaults when the file does
    /// not exist. A present-but-broken file is an error, not a silent
    /// fallback.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            warn!("config {} not found, using defaults", path.display());
            return Ok(Self::default());
        }

        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        let config: Self = toml::from_str(&raw).map_err(|source| ConfigError::Parse {
            path: path.display().to_string(),
            source,
        })?;
        info!("loaded config from {}", path.display());
        Ok(config)
    }
}
