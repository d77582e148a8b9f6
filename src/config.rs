//! Configuration System
//!
//! Handles loading configuration from files and environment variables.
//! Supports TOML config files and environment variable overrides.

use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::client::{ClientConfig, Target, TsdbClient};
use crate::query::Version;
use crate::tags::TagSet;

/// Main configuration structure
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub client: ClientSettings,

    #[serde(default)]
    pub tsdb: TsdbSettings,

    #[serde(default)]
    pub targets: Vec<TargetConfig>,

    #[serde(default)]
    pub logging: LoggingConfig,
}

/// HTTP client configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ClientSettings {
    #[serde(default = "default_timeout")]
    pub timeout_ms: u64,

    #[serde(default = "default_user_agent")]
    pub user_agent: String,

    #[serde(default)]
    pub accept_invalid_certs: bool,
}

fn default_timeout() -> u64 {
    30_000 // 30 seconds
}

fn default_user_agent() -> String {
    format!("tsdb-relay/{}", env!("CARGO_PKG_VERSION"))
}

impl Default for ClientSettings {
    fn default() -> Self {
        Self {
            timeout_ms: default_timeout(),
            user_agent: default_user_agent(),
            accept_invalid_certs: false,
        }
    }
}

/// OpenTSDB server settings
#[derive(Debug, Clone, Deserialize)]
pub struct TsdbSettings {
    /// Version used to parse query strings and for targets without their own
    #[serde(default = "default_version")]
    pub version: Version,
}

fn default_version() -> Version {
    Version::V2_2
}

impl Default for TsdbSettings {
    fn default() -> Self {
        Self {
            version: default_version(),
        }
    }
}

/// A backend the relay fans out to
#[derive(Debug, Clone, Deserialize)]
pub struct TargetConfig {
    pub host: String,

    /// Response size limit in bytes, -1 for none
    #[serde(default = "default_limit")]
    pub limit: i64,

    #[serde(default)]
    pub filter_tags: bool,

    #[serde(default)]
    pub synthetic_tags: TagSet,

    pub version: Option<Version>,
}

fn default_limit() -> i64 {
    -1
}

impl TargetConfig {
    pub fn new(host: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            limit: default_limit(),
            filter_tags: false,
            synthetic_tags: TagSet::new(),
            version: None,
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,

    #[serde(default = "default_log_format")]
    pub format: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "pretty".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

impl Config {
    /// Load configuration from a file
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Io {
            path: path.to_path_buf(),
            error: e.to_string(),
        })?;

        let config: Config = toml::from_str(&content).map_err(|e| ConfigError::Parse {
            path: path.to_path_buf(),
            error: e.to_string(),
        })?;

        Ok(config)
    }

    /// Load configuration from environment variables only
    pub fn from_env() -> Self {
        let mut config = Config::default();
        config.apply_env_overrides();
        config
    }

    /// Load configuration with environment variable overrides
    pub fn load_with_env(path: &Path) -> Result<Self, ConfigError> {
        let mut config = Self::load(path)?;
        config.apply_env_overrides();
        Ok(config)
    }

    /// Load from default locations or environment
    pub fn load_default() -> Self {
        let config_paths = [
            dirs::config_dir().map(|p| p.join("tsdb-relay").join("config.toml")),
            Some(PathBuf::from("/etc/tsdb-relay/config.toml")),
            Some(PathBuf::from("./tsdb-relay.toml")),
        ];

        for path_opt in config_paths.iter().flatten() {
            if path_opt.exists() {
                match Self::load_with_env(path_opt) {
                    Ok(config) => {
                        tracing::info!("Loaded config from {:?}", path_opt);
                        return config;
                    }
                    Err(e) => {
                        tracing::warn!("Failed to load config from {:?}: {}", path_opt, e);
                    }
                }
            }
        }

        tracing::info!("Using default config with environment overrides");
        Self::from_env()
    }

    /// Apply environment variable overrides to an existing config
    fn apply_env_overrides(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    fn apply_overrides(&mut self, var: impl Fn(&str) -> Option<String>) {
        // Client overrides
        if let Some(timeout) = var("TSDB_RELAY_TIMEOUT_MS") {
            if let Ok(t) = timeout.parse() {
                self.client.timeout_ms = t;
            }
        }
        if let Some(user_agent) = var("TSDB_RELAY_USER_AGENT") {
            self.client.user_agent = user_agent;
        }

        // OpenTSDB overrides
        if let Some(version) = var("TSDB_RELAY_VERSION") {
            match version.parse() {
                Ok(v) => self.tsdb.version = v,
                Err(e) => tracing::warn!(error = %e, "Ignoring TSDB_RELAY_VERSION"),
            }
        }
        if let Some(hosts) = var("TSDB_RELAY_TARGETS") {
            self.targets = hosts
                .split(',')
                .map(str::trim)
                .filter(|h| !h.is_empty())
                .map(TargetConfig::new)
                .collect();
        }

        // Logging overrides
        if let Some(level) = var("TSDB_RELAY_LOG_LEVEL") {
            self.logging.level = level;
        }
        if let Some(format) = var("TSDB_RELAY_LOG_FORMAT") {
            self.logging.format = format;
        }
    }

    pub fn client_config(&self) -> ClientConfig {
        ClientConfig {
            timeout_ms: self.client.timeout_ms,
            user_agent: self.client.user_agent.clone(),
            accept_invalid_certs: self.client.accept_invalid_certs,
        }
    }

    /// Targets sharing `client`, in configuration order
    pub fn build_targets(&self, client: &TsdbClient) -> Vec<Target> {
        self.targets
            .iter()
            .map(|t| {
                Target::new(client.clone(), t.host.clone())
                    .limit(t.limit)
                    .filter_tags(t.filter_tags)
                    .with_version(t.version.unwrap_or(self.tsdb.version))
                    .synthetic_tags(t.synthetic_tags.clone())
            })
            .collect()
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path:?}: {error}")]
    Io { path: PathBuf, error: String },

    #[error("Failed to parse config file {path:?}: {error}")]
    Parse { path: PathBuf, error: String },
}

/// Generate a default config file content
pub fn generate_default_config() -> String {
    r#"# tsdb-relay Configuration
#
# Environment variables override these settings:
# - TSDB_RELAY_TIMEOUT_MS
# - TSDB_RELAY_USER_AGENT
# - TSDB_RELAY_VERSION
# - TSDB_RELAY_TARGETS (comma-separated hosts, replaces [[targets]])
# - TSDB_RELAY_LOG_LEVEL
# - TSDB_RELAY_LOG_FORMAT

[client]
# Request timeout in milliseconds
timeout_ms = 30000

# Skip TLS certificate verification
accept_invalid_certs = false

[tsdb]
# OpenTSDB version; 2.2 and later use filters instead of legacy tags
version = "2.2"

# Backends to fan out to, merged in this order
[[targets]]
host = "localhost:4242"

# Response size limit in bytes, -1 for none
limit = -1

# Drop tag keys the query did not ask for
filter_tags = false

# Tags added to every series from this target
# synthetic_tags = { dc = "east" }

# Per-target OpenTSDB version
# version = "2.4"

[logging]
# Log level: trace, debug, info, warn, error
level = "info"

# Log format: pretty (for development) or json (for production)
format = "pretty"
"#
    .to_string()
}
