//! Configuration management for Riptide components

use riptide_core::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Worker pool and deadline settings for plugin execution
    #[serde(default)]
    pub plugin_execution: PluginExecutionConfig,

    /// Detector selection settings
    #[serde(default)]
    pub plugin_manager: PluginManagerConfig,

    /// Out-of-band callback server used by some detectors
    #[serde(default)]
    pub callback_server: CallbackServerConfig,

    /// Out-of-process plugin servers
    #[serde(default)]
    pub language_servers: Vec<LanguageServerConfig>,

    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Config {
    /// Load configuration from a TOML file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            Error::Configuration(format!("Failed to read config file {:?}: {}", path, e))
        })?;
        Self::from_toml(&content)
    }

    /// Parse configuration from TOML string
    pub fn from_toml(content: &str) -> Result<Self> {
        toml::from_str(content)
            .map_err(|e| Error::Configuration(format!("Failed to parse config: {}", e)))
    }

    pub fn builder() -> ConfigBuilder {
        ConfigBuilder::new()
    }

    /// Merge with environment variables (RIPTIDE_ prefix)
    pub fn merge_env(self) -> Self {
        self.merge_vars(|key| std::env::var(key).ok())
    }

    fn merge_vars(mut self, var: impl Fn(&str) -> Option<String>) -> Self {
        // Plugin execution
        if let Some(val) = var("RIPTIDE_MAX_CONCURRENCY") {
            if let Ok(n) = val.parse() {
                self.plugin_execution.max_concurrency = n;
            }
        }
        if let Some(val) = var("RIPTIDE_PLUGIN_TIMEOUT_SECONDS") {
            if let Ok(n) = val.parse() {
                self.plugin_execution.plugin_timeout_seconds = Some(n);
            }
        }

        // Detector selection
        if let Some(val) = var("RIPTIDE_DETECTORS_INCLUDE") {
            self.plugin_manager.detectors_include = split_list(&val);
        }
        if let Some(val) = var("RIPTIDE_DETECTORS_EXCLUDE") {
            self.plugin_manager.detectors_exclude = split_list(&val);
        }

        if let Some(val) = var("RIPTIDE_CALLBACK_SERVER_ENABLED") {
            if let Ok(b) = val.parse() {
                self.callback_server.enabled = b;
            }
        }

        // Logging
        if let Some(val) = var("RIPTIDE_LOG_LEVEL") {
            self.logging.level = val;
        }
        if let Some(val) = var("RIPTIDE_LOG_FORMAT") {
            self.logging.format = val;
        }

        self
    }
}

fn split_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect()
}

/// Plugin execution configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PluginExecutionConfig {
    /// Maximum number of plugins running at once
    #[serde(default = "default_max_concurrency")]
    pub max_concurrency: usize,

    /// Per-plugin deadline in seconds (unset = no deadline)
    #[serde(default)]
    pub plugin_timeout_seconds: Option<u64>,
}

fn default_max_concurrency() -> usize {
    32
}

impl Default for PluginExecutionConfig {
    fn default() -> Self {
        Self {
            max_concurrency: 32,
            plugin_timeout_seconds: None,
        }
    }
}

impl PluginExecutionConfig {
    pub fn plugin_timeout(&self) -> Option<Duration> {
        self.plugin_timeout_seconds.map(Duration::from_secs)
    }
}

/// Detector selection configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PluginManagerConfig {
    /// Only run detectors with these names (empty = all)
    #[serde(default)]
    pub detectors_include: Vec<String>,

    /// Never run detectors with these names
    #[serde(default)]
    pub detectors_exclude: Vec<String>,
}

/// Callback server configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CallbackServerConfig {
    /// Whether detectors that need a callback server may run
    #[serde(default)]
    pub enabled: bool,
}

/// One out-of-process plugin server
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LanguageServerConfig {
    /// `host:port` or base URL of the server
    pub address: String,

    /// Command used to launch the server locally (optional)
    #[serde(default)]
    pub command: Option<String>,

    /// Per-call RPC deadline in seconds
    #[serde(default = "default_deadline")]
    pub deadline_seconds: u64,

    /// Health check attempts before the server is considered unreachable
    #[serde(default = "default_health_check_attempts")]
    pub health_check_attempts: u32,

    /// Largest accepted response body in bytes
    #[serde(default = "default_max_inbound_message_bytes")]
    pub max_inbound_message_bytes: usize,

    /// Identifier passed to the server for its logs
    #[serde(default)]
    pub log_id: Option<String>,
}

fn default_deadline() -> u64 {
    120
}

fn default_health_check_attempts() -> u32 {
    3
}

fn default_max_inbound_message_bytes() -> usize {
    10 * 1024 * 1024
}

impl LanguageServerConfig {
    pub fn new(address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            command: None,
            deadline_seconds: default_deadline(),
            health_check_attempts: default_health_check_attempts(),
            max_inbound_message_bytes: default_max_inbound_message_bytes(),
            log_id: None,
        }
    }

    pub fn deadline(&self) -> Duration {
        Duration::from_secs(self.deadline_seconds)
    }

    /// Base URL of the server; a bare `host:port` gets an `http://` scheme
    pub fn base_url(&self) -> String {
        let address = self.address.trim_end_matches('/');
        if address.starts_with("http://") || address.starts_with("https://") {
            address.to_string()
        } else {
            format!("http://{}", address)
        }
    }

    /// Port part of the address, if any
    pub fn port(&self) -> Option<u16> {
        let address = self.address.trim_end_matches('/');
        let authority = address
            .split_once("://")
            .map(|(_, rest)| rest)
            .unwrap_or(address);
        let authority = authority.split('/').next().unwrap_or(authority);
        authority.rsplit_once(':').and_then(|(_, p)| p.parse().ok())
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log format (pretty, json, compact)
    #[serde(default = "default_log_format")]
    pub format: String,
}

fn default_log_level() -> String {
    String::from("info")
}

fn default_log_format() -> String {
    String::from("pretty")
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

/// Builder for constructing Config
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    pub fn new() -> Self {
        Self {
            config: Config::default(),
        }
    }

    pub fn max_concurrency(mut self, n: usize) -> Self {
        self.config.plugin_execution.max_concurrency = n;
        self
    }

    pub fn plugin_timeout_seconds(mut self, seconds: u64) -> Self {
        self.config.plugin_execution.plugin_timeout_seconds = Some(seconds);
        self
    }

    pub fn include_detector(mut self, name: impl Into<String>) -> Self {
        self.config.plugin_manager.detectors_include.push(name.into());
        self
    }

    pub fn exclude_detector(mut self, name: impl Into<String>) -> Self {
        self.config.plugin_manager.detectors_exclude.push(name.into());
        self
    }

    pub fn callback_server_enabled(mut self, enabled: bool) -> Self {
        self.config.callback_server.enabled = enabled;
        self
    }

    pub fn language_server(mut self, server: LanguageServerConfig) -> Self {
        self.config.language_servers.push(server);
        self
    }

    pub fn log_level(mut self, level: impl Into<String>) -> Self {
        self.config.logging.level = level.into();
        self
    }

    pub fn build(self) -> Config {
        self.config
    }
}

impl Default for ConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}
