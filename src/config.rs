// Configuration File Support
//
// This module provides configuration file parsing for the scangate gateway.
// Supports TOML format with environment variable overrides.
// Configuration files are loaded from XDG config directory: ~/.config/scangate/config.toml

use crate::tools::{
    catalog, DEFAULT_LAB_SUFFIX, DEFAULT_MAX_ARGUMENT_LENGTH, DEFAULT_MAX_STDERR_BYTES,
    DEFAULT_MAX_STDOUT_BYTES, DEFAULT_MAX_TIMEOUT,
};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct Config {
    /// Logging configuration
    pub logging: LoggingConfig,

    /// Which targets may be scanned
    pub targets: TargetsConfig,

    /// Global ceilings, overridable per tool
    pub limits: LimitsConfig,

    /// Metrics configuration
    pub metrics: MetricsConfig,

    /// Per-tool overrides keyed by tool name
    pub tools: BTreeMap<String, ToolOverride>,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,

    /// Log format (json, pretty, compact)
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "compact".to_string(),
        }
    }
}

/// Target scope configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct TargetsConfig {
    /// Hostname suffix of the internal lab
    pub lab_suffix: String,
}

impl Default for TargetsConfig {
    fn default() -> Self {
        Self {
            lab_suffix: DEFAULT_LAB_SUFFIX.to_string(),
        }
    }
}

/// Resource ceilings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct LimitsConfig {
    /// Longest accepted argument string, in characters
    pub max_argument_length: usize,

    /// Captured stdout ceiling per call
    pub max_stdout_bytes: usize,

    /// Captured stderr ceiling per call
    pub max_stderr_bytes: usize,

    /// Upper bound for caller timeout overrides
    pub max_timeout_secs: u64,

    /// Working directory for child processes (system temp dir if unset)
    pub working_dir: Option<PathBuf>,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_argument_length: DEFAULT_MAX_ARGUMENT_LENGTH,
            max_stdout_bytes: DEFAULT_MAX_STDOUT_BYTES,
            max_stderr_bytes: DEFAULT_MAX_STDERR_BYTES,
            max_timeout_secs: DEFAULT_MAX_TIMEOUT.as_secs(),
            working_dir: None,
        }
    }
}

/// Metrics configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct MetricsConfig {
    /// Whether to enable metrics collection
    pub enabled: bool,

    /// Port for metrics server
    pub port: u16,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            port: 9090,
        }
    }
}

/// Per-tool settings; unset fields keep the built-in defaults
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ToolOverride {
    /// Disabled tools are not registered
    pub enabled: bool,
    pub timeout_secs: Option<u64>,
    pub concurrency: Option<usize>,
    pub failure_threshold: Option<u32>,
    pub recovery_timeout_secs: Option<u64>,
    pub half_open_successes: Option<u32>,
    pub allowed_flag_prefixes: Option<Vec<String>>,
    pub max_argument_length: Option<usize>,
    pub max_stdout_bytes: Option<usize>,
    pub max_stderr_bytes: Option<usize>,
}

impl Default for ToolOverride {
    fn default() -> Self {
        Self {
            enabled: true,
            timeout_secs: None,
            concurrency: None,
            failure_threshold: None,
            recovery_timeout_secs: None,
            half_open_successes: None,
            allowed_flag_prefixes: None,
            max_argument_length: None,
            max_stdout_bytes: None,
            max_stderr_bytes: None,
        }
    }
}

impl Config {
    /// Load configuration from the default XDG config directory
    ///
    /// # Errors
    ///
    /// Returns an error if the config file exists but cannot be parsed.
    /// If the config file does not exist, returns default configuration.
    pub fn load() -> Result<Self> {
        let config_path = Self::config_path();
        Self::load_from_path(&config_path)
    }

    /// Load configuration from a specific path
    ///
    /// # Errors
    ///
    /// Returns an error if the config file exists but cannot be parsed
    /// or fails validation. A missing file yields the defaults, with
    /// environment overrides still applied.
    pub fn load_from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        let config = if path.exists() {
            let content = fs::read_to_string(path)
                .with_context(|| format!("Failed to read config file from {:?}", path))?;
            let config: Config = toml::from_str(&content)
                .with_context(|| format!("Failed to parse config file from {:?}", path))?;
            tracing::info!("Loaded configuration from {:?}", path);
            config
        } else {
            tracing::debug!("Config file not found at {:?}, using defaults", path);
            Self::default()
        };

        let config = config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Get the default configuration file path
    ///
    /// Returns `~/.config/scangate/config.toml` on Linux
    pub fn config_path() -> PathBuf {
        match dirs::config_dir() {
            Some(dir) => dir.join("scangate").join("config.toml"),
            None => {
                let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
                PathBuf::from(home)
                    .join(".config")
                    .join("scangate")
                    .join("config.toml")
            }
        }
    }

    /// Apply environment variable overrides to the configuration
    ///
    /// Environment variables take precedence over config file values:
    /// - SCANGATE_LOG_LEVEL
    /// - SCANGATE_LOG_FORMAT
    /// - SCANGATE_LAB_SUFFIX
    /// - SCANGATE_METRICS_ENABLED
    /// - SCANGATE_METRICS_PORT
    /// - SCANGATE_MAX_ARGUMENT_LENGTH
    fn apply_env_overrides(mut self) -> Self {
        if let Ok(level) = std::env::var("SCANGATE_LOG_LEVEL") {
            self.logging.level = level;
        }
        if let Ok(format) = std::env::var("SCANGATE_LOG_FORMAT") {
            self.logging.format = format;
        }

        if let Ok(suffix) = std::env::var("SCANGATE_LAB_SUFFIX") {
            if !suffix.trim().is_empty() {
                self.targets.lab_suffix = suffix;
            }
        }

        if let Ok(enabled) = std::env::var("SCANGATE_METRICS_ENABLED") {
            self.metrics.enabled = enabled.parse().unwrap_or(self.metrics.enabled);
        }
        if let Ok(port) = std::env::var("SCANGATE_METRICS_PORT") {
            if let Ok(port) = port.parse::<u16>() {
                self.metrics.port = port;
            }
        }

        if let Ok(length) = std::env::var("SCANGATE_MAX_ARGUMENT_LENGTH") {
            if let Ok(length) = length.parse::<usize>() {
                if length > 0 {
                    self.limits.max_argument_length = length;
                }
            }
        }

        self
    }

    /// Validate the configuration
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid.
    pub fn validate(&self) -> Result<()> {
        match self.logging.level.to_lowercase().as_str() {
            "trace" | "debug" | "info" | "warn" | "error" => {}
            _ => anyhow::bail!(
                "Invalid log level: {}. Must be one of: trace, debug, info, warn, error",
                self.logging.level
            ),
        }

        match self.logging.format.to_lowercase().as_str() {
            "json" | "pretty" | "compact" => {}
            _ => anyhow::bail!(
                "Invalid log format: {}. Must be one of: json, pretty, compact",
                self.logging.format
            ),
        }

        if self.targets.lab_suffix.trim().trim_start_matches('.').is_empty() {
            anyhow::bail!("Lab suffix must not be empty");
        }

        if self.limits.max_argument_length == 0 {
            anyhow::bail!("max_argument_length must be > 0");
        }
        if self.limits.max_stdout_bytes == 0 || self.limits.max_stderr_bytes == 0 {
            anyhow::bail!("Output ceilings must be > 0");
        }
        if self.limits.max_timeout_secs == 0 {
            anyhow::bail!("max_timeout_secs must be > 0");
        }

        if self.metrics.port == 0 {
            anyhow::bail!("Metrics port must be > 0");
        }

        let known: Vec<String> = catalog::builtin().into_iter().map(|t| t.name).collect();
        for (name, tool) in &self.tools {
            if !known.contains(name) {
                anyhow::bail!(
                    "Unknown tool '{}' in [tools]. Known tools: {}",
                    name,
                    known.join(", ")
                );
            }
            if tool.concurrency == Some(0) {
                anyhow::bail!("Tool '{}' concurrency must be > 0", name);
            }
            if tool.failure_threshold == Some(0) {
                anyhow::bail!("Tool '{}' failure_threshold must be > 0", name);
            }
            if tool.half_open_successes == Some(0) {
                anyhow::bail!("Tool '{}' half_open_successes must be > 0", name);
            }
            if tool.timeout_secs == Some(0) {
                anyhow::bail!("Tool '{}' timeout_secs must be > 0", name);
            }
            if tool.max_argument_length == Some(0)
                || tool.max_stdout_bytes == Some(0)
                || tool.max_stderr_bytes == Some(0)
            {
                anyhow::bail!("Tool '{}' ceilings must be > 0", name);
            }
        }

        Ok(())
    }
}
