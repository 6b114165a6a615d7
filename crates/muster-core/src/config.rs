//! Configuration management for muster
//!
//! Both daemons load a TOML file (falling back to defaults when none exists)
//! and the server additionally honors `MUSTER_ADMIN_USERNAME` /
//! `MUSTER_ADMIN_PASSWORD` environment overrides so credentials never have to
//! live on disk.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::ConfigError;

/// Get the default configuration directory
pub fn default_config_dir() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("muster")
}

/// Get the default configuration file path
pub fn default_config_path() -> PathBuf {
    default_config_dir().join("config.toml")
}

/// Load configuration from a file
pub fn load_config<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T, ConfigError> {
    if !path.exists() {
        return Err(ConfigError::NotFound(path.to_path_buf()));
    }

    let content = std::fs::read_to_string(path)
        .map_err(|e| ConfigError::Invalid(format!("Failed to read config: {}", e)))?;

    let config: T = toml::from_str(&content)?;
    Ok(config)
}

/// Save configuration to a file
pub fn save_config<T: serde::Serialize>(path: &Path, config: &T) -> Result<(), ConfigError> {
    let content = toml::to_string_pretty(config)?;

    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .map_err(|e| ConfigError::Invalid(format!("Failed to create config dir: {}", e)))?;
    }

    std::fs::write(path, content)
        .map_err(|e| ConfigError::Invalid(format!("Failed to write config: {}", e)))?;

    Ok(())
}

/// Configuration for the muster server daemon
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Address to bind the HTTP server to
    pub bind_address: String,

    /// How long an agent may go without a heartbeat before it is expired.
    /// Must exceed the dashboard's poll cadence (5-10s) so a briefly slow
    /// agent is not expired between two polls.
    #[serde(with = "secs")]
    pub heartbeat_timeout: Duration,

    /// Interval between liveness monitor sweeps
    #[serde(with = "secs")]
    pub liveness_interval: Duration,

    /// Per-agent deadline for a dispatched command's result
    #[serde(with = "secs")]
    pub dispatch_timeout: Duration,

    /// Operator session lifetime (fixed expiry, no sliding extension)
    #[serde(with = "secs")]
    pub session_ttl: Duration,

    /// Admin username
    pub admin_username: String,

    /// Admin password
    pub admin_password: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8000".to_string(),
            heartbeat_timeout: Duration::from_secs(20),
            liveness_interval: Duration::from_secs(2),
            dispatch_timeout: Duration::from_secs(5),
            session_ttl: Duration::from_secs(3600),
            admin_username: "admin".to_string(),
            admin_password: "password".to_string(),
        }
    }
}

impl ServerConfig {
    /// Apply credential overrides from the environment.
    pub fn apply_env_overrides(&mut self) {
        if let Ok(username) = std::env::var("MUSTER_ADMIN_USERNAME") {
            self.admin_username = username;
        }
        if let Ok(password) = std::env::var("MUSTER_ADMIN_PASSWORD") {
            self.admin_password = password;
        }
    }
}

/// Configuration for the muster agent daemon
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
    /// Server URL to connect to (http://host:port or ws://host:port)
    pub server_url: String,

    /// Agent name; defaults to the machine hostname when empty
    pub name: String,

    /// Interval between heartbeats
    #[serde(with = "secs")]
    pub heartbeat_interval: Duration,

    /// Per-command execution timeout
    #[serde(with = "secs")]
    pub exec_timeout: Duration,

    /// Backoff configuration for reconnections
    pub backoff: BackoffConfig,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            server_url: "http://127.0.0.1:8000".to_string(),
            name: String::new(),
            heartbeat_interval: Duration::from_secs(5),
            exec_timeout: Duration::from_secs(30),
            backoff: BackoffConfig::default(),
        }
    }
}

/// Exponential backoff configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BackoffConfig {
    /// Initial delay
    #[serde(with = "secs")]
    pub initial: Duration,

    /// Maximum delay
    #[serde(with = "secs")]
    pub max: Duration,

    /// Multiplier for each retry
    pub multiplier: f64,

    /// Jitter factor (0.0 to 1.0)
    pub jitter: f64,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            initial: Duration::from_secs(1),
            max: Duration::from_secs(60),
            multiplier: 2.0,
            jitter: 0.25,
        }
    }
}

// Helper module for Duration serialization as integer seconds
mod secs {
    use serde::{self, Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(duration.as_secs())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = u64::deserialize(deserializer)?;
        Ok(Duration::from_secs(secs))
    }
}
