//! Configuration management for redmine-mcp.
//!
//! Handles loading and saving configuration from TOML files, with
//! environment variable overrides applied on top. Config files are stored
//! in platform-specific locations:
//!
//! - **macOS/Linux**: `~/.config/redmine-mcp/config.toml`
//! - **Windows**: `%APPDATA%\redmine-mcp\config.toml`
//!
//! # Example
//!
//! ```ignore
//! use redmine_mcp_core::config::Config;
//!
//! let mut config = Config::load()?;
//! config.apply_env_overrides();
//! config.validate()?;
//! ```

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info};

/// Config file name.
const CONFIG_FILE_NAME: &str = "config.toml";

/// Config directory name.
const CONFIG_DIR_NAME: &str = "redmine-mcp";

// =============================================================================
// Configuration structures
// =============================================================================

/// Main configuration structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Backend connection
    #[serde(default)]
    pub redmine: RedmineConfig,

    /// Transport/server settings
    #[serde(default)]
    pub server: ServerConfig,

    /// Metrics collector settings
    #[serde(default)]
    pub metrics: MetricsConfig,
}

/// How the gateway authenticates against the backend.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthMode {
    /// Static `X-Redmine-API-Key` header
    #[default]
    ApiKey,
    /// Per-request `Authorization: Bearer` token
    Bearer,
}

impl std::str::FromStr for AuthMode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "api_key" | "apikey" | "key" => Ok(AuthMode::ApiKey),
            "bearer" | "oauth" => Ok(AuthMode::Bearer),
            other => Err(Error::Config(format!(
                "Invalid auth mode '{}'. Expected api_key or bearer",
                other
            ))),
        }
    }
}

/// Redmine backend configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RedmineConfig {
    /// Redmine instance URL
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    /// API key (prefer the REDMINE_API_KEY env var)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    #[serde(default)]
    pub auth: AuthMode,
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,
    #[serde(default = "default_read_timeout")]
    pub read_timeout_secs: u64,
    /// Page ceiling for auto-pagination
    #[serde(default = "default_max_pages")]
    pub max_pages: u32,
}

/// Deployment flavour; production hides internal error details from peers.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Environment {
    #[default]
    Development,
    Production,
}

impl Environment {
    pub fn is_production(&self) -> bool {
        matches!(self, Environment::Production)
    }
}

/// Server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default)]
    pub environment: Environment,
}

/// Metrics configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsConfig {
    /// Calls at or above this duration are kept in the slow-request log
    #[serde(default = "default_slow_threshold")]
    pub slow_threshold_secs: f64,
    #[serde(default = "default_max_slow_requests")]
    pub max_slow_requests: usize,
}

fn default_connect_timeout() -> u64 {
    30
}

fn default_read_timeout() -> u64 {
    60
}

fn default_max_pages() -> u32 {
    100
}

fn default_host() -> String {
    "localhost".to_string()
}

fn default_port() -> u16 {
    3100
}

fn default_slow_threshold() -> f64 {
    1.0
}

fn default_max_slow_requests() -> usize {
    100
}

impl Default for RedmineConfig {
    fn default() -> Self {
        Self {
            url: None,
            api_key: None,
            auth: AuthMode::default(),
            connect_timeout_secs: default_connect_timeout(),
            read_timeout_secs: default_read_timeout(),
            max_pages: default_max_pages(),
        }
    }
}

impl RedmineConfig {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    pub fn read_timeout(&self) -> Duration {
        Duration::from_secs(self.read_timeout_secs)
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            environment: Environment::default(),
        }
    }
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            slow_threshold_secs: default_slow_threshold(),
            max_slow_requests: default_max_slow_requests(),
        }
    }
}

impl MetricsConfig {
    /// Out-of-range values saturate; `Config::validate` rejects them up front.
    pub fn slow_threshold(&self) -> Duration {
        Duration::try_from_secs_f64(self.slow_threshold_secs.max(0.0)).unwrap_or(Duration::MAX)
    }
}

// =============================================================================
// Config implementation
// =============================================================================

impl Config {
    /// Get the configuration directory path.
    pub fn config_dir() -> Result<PathBuf> {
        dirs::config_dir()
            .map(|p| p.join(CONFIG_DIR_NAME))
            .ok_or_else(|| Error::Config("Could not determine config directory".to_string()))
    }

    /// Get the configuration file path.
    pub fn config_path() -> Result<PathBuf> {
        Ok(Self::config_dir()?.join(CONFIG_FILE_NAME))
    }

    /// Load configuration from the default location.
    ///
    /// Returns a default config if the file doesn't exist.
    pub fn load() -> Result<Self> {
        let path = Self::config_path()?;
        Self::load_from(&path)
    }

    /// Load configuration from a specific path.
    ///
    /// Returns a default config if the file doesn't exist.
    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            debug!(path = ?path, "Config file does not exist, using defaults");
            return Ok(Self::default());
        }

        debug!(path = ?path, "Loading config");

        let contents = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("Failed to read config file: {}", e)))?;

        let config: Config = toml::from_str(&contents)
            .map_err(|e| Error::Config(format!("Failed to parse config file: {}", e)))?;

        info!(path = ?path, "Config loaded successfully");
        Ok(config)
    }

    /// Save configuration to the default location.
    pub fn save(&self) -> Result<()> {
        let path = Self::config_path()?;
        self.save_to(&path)
    }

    /// Save configuration to a specific path.
    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| Error::Config(format!("Failed to create config directory: {}", e)))?;
        }

        debug!(path = ?path, "Saving config");

        let contents = toml::to_string_pretty(self)
            .map_err(|e| Error::Config(format!("Failed to serialize config: {}", e)))?;

        std::fs::write(path, contents)
            .map_err(|e| Error::Config(format!("Failed to write config file: {}", e)))?;

        info!(path = ?path, "Config saved successfully");
        Ok(())
    }

    /// Apply overrides from the process environment.
    pub fn apply_env_overrides(&mut self) -> Result<()> {
        self.apply_overrides(|key| std::env::var(key).ok())
    }

    /// Apply overrides from an arbitrary lookup (used by tests).
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        const OVERRIDES: &[(&str, &str)] = &[
            ("REDMINE_URL", "redmine.url"),
            ("REDMINE_API_KEY", "redmine.api_key"),
            ("REDMINE_AUTH", "redmine.auth"),
            ("HTTP_TIMEOUT", "redmine.connect_timeout_secs"),
            ("HTTP_READ_TIMEOUT", "redmine.read_timeout_secs"),
            ("MCP_HOST", "server.host"),
            ("MCP_PORT", "server.port"),
            ("MCP_ENV", "server.environment"),
            ("METRICS_SLOW_THRESHOLD", "metrics.slow_threshold_secs"),
        ];

        for (var, key) in OVERRIDES {
            if let Some(value) = lookup(var).filter(|v| !v.is_empty()) {
                debug!(var = var, "Applying environment override");
                self.set(key, &value)?;
            }
        }
        Ok(())
    }

    /// Check that the backend can be addressed with the configured credentials.
    pub fn validate(&self) -> Result<()> {
        let url = self
            .redmine
            .url
            .as_deref()
            .filter(|u| !u.trim().is_empty())
            .ok_or_else(|| Error::Config("REDMINE_URL must be set".to_string()))?;

        if !(url.starts_with("http://") || url.starts_with("https://")) {
            return Err(Error::Config(
                "REDMINE_URL must start with http:// or https://".to_string(),
            ));
        }

        if self.redmine.auth == AuthMode::ApiKey
            && self.redmine.api_key.as_deref().map_or(true, str::is_empty)
        {
            return Err(Error::Config("REDMINE_API_KEY must be set".to_string()));
        }

        if self.redmine.max_pages == 0 {
            return Err(Error::Config("redmine.max_pages must be at least 1".to_string()));
        }
        if self.redmine.read_timeout_secs == 0 {
            return Err(Error::Config(
                "redmine.read_timeout_secs must be at least 1".to_string(),
            ));
        }

        check_slow_threshold(self.metrics.slow_threshold_secs)
    }

    /// Set a configuration value by key path.
    ///
    /// Key format: `section.field` (e.g., `redmine.url`, `server.port`)
    pub fn set(&mut self, key: &str, value: &str) -> Result<()> {
        let (section, field) = split_key(key)?;

        match section {
            "redmine" => {
                let config = &mut self.redmine;
                match field {
                    "url" => config.url = Some(value.to_string()),
                    "api_key" | "key" => config.api_key = Some(value.to_string()),
                    "auth" => config.auth = value.parse()?,
                    "connect_timeout_secs" | "timeout" => {
                        config.connect_timeout_secs = parse_number(key, value)?
                    }
                    "read_timeout_secs" | "read_timeout" => {
                        config.read_timeout_secs = parse_number(key, value)?
                    }
                    "max_pages" => config.max_pages = parse_number(key, value)?,
                    _ => {
                        return Err(Error::Config(format!(
                            "Unknown redmine config field: {}",
                            field
                        )))
                    }
                }
            }
            "server" => {
                let config = &mut self.server;
                match field {
                    "host" => config.host = value.to_string(),
                    "port" => config.port = parse_number(key, value)?,
                    "environment" | "env" => {
                        config.environment = match value {
                            "production" => Environment::Production,
                            "development" | "test" => Environment::Development,
                            other => {
                                return Err(Error::Config(format!(
                                    "Invalid environment '{}'. Expected development or production",
                                    other
                                )))
                            }
                        }
                    }
                    _ => {
                        return Err(Error::Config(format!(
                            "Unknown server config field: {}",
                            field
                        )))
                    }
                }
            }
            "metrics" => {
                let config = &mut self.metrics;
                match field {
                    "slow_threshold_secs" | "slow_threshold" => {
                        let secs = parse_number(key, value)?;
                        check_slow_threshold(secs)?;
                        config.slow_threshold_secs = secs;
                    }
                    "max_slow_requests" => config.max_slow_requests = parse_number(key, value)?,
                    _ => {
                        return Err(Error::Config(format!(
                            "Unknown metrics config field: {}",
                            field
                        )))
                    }
                }
            }
            _ => {
                return Err(Error::Config(format!("Unknown section: {}", section)));
            }
        }

        Ok(())
    }

    /// Get a configuration value by key path.
    ///
    /// Secrets are returned as-is; callers decide whether to mask them.
    pub fn get(&self, key: &str) -> Result<Option<String>> {
        let (section, field) = split_key(key)?;

        match section {
            "redmine" => {
                let config = &self.redmine;
                match field {
                    "url" => Ok(config.url.clone()),
                    "api_key" | "key" => Ok(config.api_key.clone()),
                    "auth" => Ok(Some(
                        match config.auth {
                            AuthMode::ApiKey => "api_key",
                            AuthMode::Bearer => "bearer",
                        }
                        .to_string(),
                    )),
                    "connect_timeout_secs" | "timeout" => {
                        Ok(Some(config.connect_timeout_secs.to_string()))
                    }
                    "read_timeout_secs" | "read_timeout" => {
                        Ok(Some(config.read_timeout_secs.to_string()))
                    }
                    "max_pages" => Ok(Some(config.max_pages.to_string())),
                    _ => Err(Error::Config(format!(
                        "Unknown redmine config field: {}",
                        field
                    ))),
                }
            }
            "server" => {
                let config = &self.server;
                match field {
                    "host" => Ok(Some(config.host.clone())),
                    "port" => Ok(Some(config.port.to_string())),
                    "environment" | "env" => Ok(Some(
                        if config.environment.is_production() {
                            "production"
                        } else {
                            "development"
                        }
                        .to_string(),
                    )),
                    _ => Err(Error::Config(format!(
                        "Unknown server config field: {}",
                        field
                    ))),
                }
            }
            "metrics" => {
                let config = &self.metrics;
                match field {
                    "slow_threshold_secs" | "slow_threshold" => {
                        Ok(Some(config.slow_threshold_secs.to_string()))
                    }
                    "max_slow_requests" => Ok(Some(config.max_slow_requests.to_string())),
                    _ => Err(Error::Config(format!(
                        "Unknown metrics config field: {}",
                        field
                    ))),
                }
            }
            _ => Err(Error::Config(format!("Unknown section: {}", section))),
        }
    }
}

fn split_key(key: &str) -> Result<(&str, &str)> {
    let parts: Vec<&str> = key.split('.').collect();
    if parts.len() != 2 {
        return Err(Error::Config(format!(
            "Invalid config key '{}'. Expected format: section.field",
            key
        )));
    }
    Ok((parts[0], parts[1]))
}

/// A slow threshold must be a finite, non-negative number of seconds that
/// fits in a `Duration`.
fn check_slow_threshold(secs: f64) -> Result<()> {
    if secs < 0.0 || Duration::try_from_secs_f64(secs).is_err() {
        return Err(Error::Config(format!(
            "metrics.slow_threshold_secs must be a non-negative number of seconds, got {}",
            secs
        )));
    }
    Ok(())
}

fn parse_number<T: std::str::FromStr>(key: &str, value: &str) -> Result<T> {
    value
        .trim()
        .parse()
        .map_err(|_| Error::Config(format!("Invalid numeric value for {}: {}", key, value)))
}

// =============================================================================
// Tests
// =============================================================================
