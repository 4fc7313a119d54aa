//! Tool Registry
//!
//! One `ToolClass` per tool name: the contract, its resolved ceilings, and
//! the breaker and slot pool shared by every call to that tool. Built once
//! at startup; misconfiguration surfaces here, before any invocation.

use crate::config::{Config, LimitsConfig, ToolOverride};
use crate::tools::{
    catalog, BreakerConfig, CircuitBreaker, ConcurrencyGovernor, OutputLimits, ToolSpec,
    DEFAULT_MAX_ARGUMENT_LENGTH,
};
use std::collections::BTreeMap;
use std::time::Duration;
use tracing::{debug, info};

/// Construction-time misconfiguration
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RegistryError {
    #[error("Tool '{0}' has an empty command")]
    EmptyCommand(String),

    #[error("Tool '{0}' must allow at least one concurrent execution")]
    ZeroConcurrency(String),

    #[error("Tool '{0}' breaker thresholds must be > 0")]
    ZeroThreshold(String),

    #[error("Tool '{0}' is registered twice")]
    Duplicate(String),

    #[error("Override for unknown tool '{0}'")]
    UnknownOverride(String),
}

/// Ceilings applied to one tool's calls
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ToolLimits {
    pub max_argument_length: usize,
    pub output: OutputLimits,
}

impl Default for ToolLimits {
    fn default() -> Self {
        Self {
            max_argument_length: DEFAULT_MAX_ARGUMENT_LENGTH,
            output: OutputLimits::default(),
        }
    }
}

impl From<&LimitsConfig> for ToolLimits {
    fn from(limits: &LimitsConfig) -> Self {
        Self {
            max_argument_length: limits.max_argument_length,
            output: OutputLimits {
                max_stdout_bytes: limits.max_stdout_bytes,
                max_stderr_bytes: limits.max_stderr_bytes,
            },
        }
    }
}

/// A registered tool and its shared per-class state
#[derive(Debug)]
pub struct ToolClass {
    spec: ToolSpec,
    limits: ToolLimits,
    breaker: CircuitBreaker,
    governor: ConcurrencyGovernor,
}

impl ToolClass {
    fn new(spec: ToolSpec, limits: ToolLimits) -> Self {
        let breaker = CircuitBreaker::new(spec.name.clone(), spec.breaker);
        let governor = ConcurrencyGovernor::new(spec.name.clone(), spec.default_concurrency);
        Self {
            spec,
            limits,
            breaker,
            governor,
        }
    }

    pub fn name(&self) -> &str {
        &self.spec.name
    }

    pub fn spec(&self) -> &ToolSpec {
        &self.spec
    }

    pub fn limits(&self) -> &ToolLimits {
        &self.limits
    }

    pub fn breaker(&self) -> &CircuitBreaker {
        &self.breaker
    }

    pub fn governor(&self) -> &ConcurrencyGovernor {
        &self.governor
    }
}

/// All tool classes, keyed by name
#[derive(Debug, Default)]
pub struct ToolRegistry {
    tools: BTreeMap<String, ToolClass>,
}

impl ToolRegistry {
    /// Empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// The built-in catalog with default limits
    pub fn builtin() -> Result<Self, RegistryError> {
        let mut registry = Self::new();
        for spec in catalog::builtin() {
            registry.register(spec, ToolLimits::default())?;
        }
        Ok(registry)
    }

    /// The built-in catalog with `[limits]` and `[tools.<name>]` applied
    pub fn from_config(config: &Config) -> Result<Self, RegistryError> {
        let builtin = catalog::builtin();
        if let Some(unknown) = config
            .tools
            .keys()
            .find(|name| !builtin.iter().any(|spec| &spec.name == *name))
        {
            return Err(RegistryError::UnknownOverride(unknown.clone()));
        }

        let global = ToolLimits::from(&config.limits);
        let mut registry = Self::new();
        for spec in builtin {
            match config.tools.get(&spec.name) {
                Some(tool) if !tool.enabled => {
                    info!(tool = %spec.name, "Tool disabled by configuration");
                }
                Some(tool) => {
                    let limits = override_limits(global, tool);
                    registry.register(override_spec(spec, tool), limits)?;
                }
                None => registry.register(spec, global)?,
            }
        }
        Ok(registry)
    }

    /// Add one tool class
    pub fn register(&mut self, spec: ToolSpec, limits: ToolLimits) -> Result<(), RegistryError> {
        check_spec(&spec)?;
        if self.tools.contains_key(&spec.name) {
            return Err(RegistryError::Duplicate(spec.name));
        }
        debug!(
            tool = %spec.name,
            command = %spec.command,
            concurrency = spec.default_concurrency,
            timeout_secs = spec.default_timeout.as_secs(),
            "Registered tool"
        );
        self.tools
            .insert(spec.name.clone(), ToolClass::new(spec, limits));
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&ToolClass> {
        self.tools.get(name)
    }

    /// Tool names in sorted order
    pub fn names(&self) -> Vec<String> {
        self.tools.keys().cloned().collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ToolClass> {
        self.tools.values()
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}

fn check_spec(spec: &ToolSpec) -> Result<(), RegistryError> {
    if spec.command.trim().is_empty() {
        return Err(RegistryError::EmptyCommand(spec.name.clone()));
    }
    if spec.default_concurrency == 0 {
        return Err(RegistryError::ZeroConcurrency(spec.name.clone()));
    }
    if spec.breaker.failure_threshold == 0 || spec.breaker.half_open_successes == 0 {
        return Err(RegistryError::ZeroThreshold(spec.name.clone()));
    }
    Ok(())
}

fn override_spec(mut spec: ToolSpec, tool: &ToolOverride) -> ToolSpec {
    if let Some(secs) = tool.timeout_secs {
        spec.default_timeout = Duration::from_secs(secs);
    }
    if let Some(concurrency) = tool.concurrency {
        spec.default_concurrency = concurrency;
    }
    spec.breaker = BreakerConfig {
        failure_threshold: tool.failure_threshold.unwrap_or(spec.breaker.failure_threshold),
        recovery_timeout: tool
            .recovery_timeout_secs
            .map(Duration::from_secs)
            .unwrap_or(spec.breaker.recovery_timeout),
        half_open_successes: tool
            .half_open_successes
            .unwrap_or(spec.breaker.half_open_successes),
    };
    if let Some(prefixes) = &tool.allowed_flag_prefixes {
        spec.allowed_flag_prefixes = Some(prefixes.clone());
    }
    spec
}

fn override_limits(global: ToolLimits, tool: &ToolOverride) -> ToolLimits {
    ToolLimits {
        max_argument_length: tool.max_argument_length.unwrap_or(global.max_argument_length),
        output: OutputLimits {
            max_stdout_bytes: tool.max_stdout_bytes.unwrap_or(global.output.max_stdout_bytes),
            max_stderr_bytes: tool.max_stderr_bytes.unwrap_or(global.output.max_stderr_bytes),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_registry() {
        let registry = ToolRegistry::builtin().unwrap();
        assert_eq!(
            registry.names(),
            vec!["gobuster", "hydra", "masscan", "nmap", "sqlmap"]
        );
        let nmap = registry.get("nmap").unwrap();
        assert_eq!(nmap.governor().capacity(), 1);
        assert_eq!(nmap.breaker().name(), "nmap");
        assert_eq!(registry.get("gobuster").unwrap().governor().capacity(), 2);
        assert!(registry.get("nikto").is_none());
    }

    #[test]
    fn test_register_rejects_bad_specs() {
        let mut registry = ToolRegistry::new();
        assert_eq!(
            registry.register(ToolSpec::simple("blank", "  "), ToolLimits::default()),
            Err(RegistryError::EmptyCommand("blank".to_string()))
        );
        assert_eq!(
            registry.register(
                ToolSpec::simple("idle", "true").with_concurrency(0),
                ToolLimits::default()
            ),
            Err(RegistryError::ZeroConcurrency("idle".to_string()))
        );
        let breaker = BreakerConfig {
            failure_threshold: 0,
            ..Default::default()
        };
        assert_eq!(
            registry.register(
                ToolSpec::simple("fragile", "true").with_breaker(breaker),
                ToolLimits::default()
            ),
            Err(RegistryError::ZeroThreshold("fragile".to_string()))
        );
        assert!(registry.is_empty());
    }

    #[test]
    fn test_register_rejects_duplicates() {
        let mut registry = ToolRegistry::new();
        registry
            .register(ToolSpec::simple("portcheck", "true"), ToolLimits::default())
            .unwrap();
        assert_eq!(
            registry.register(ToolSpec::simple("portcheck", "false"), ToolLimits::default()),
            Err(RegistryError::Duplicate("portcheck".to_string()))
        );
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_from_config_applies_overrides() {
        let mut config = Config::default();
        config.limits.max_stdout_bytes = 4096;
        config.tools.insert(
            "nmap".to_string(),
            ToolOverride {
                timeout_secs: Some(30),
                concurrency: Some(3),
                failure_threshold: Some(2),
                recovery_timeout_secs: Some(5),
                max_argument_length: Some(64),
                ..Default::default()
            },
        );
        config.tools.insert(
            "hydra".to_string(),
            ToolOverride {
                enabled: false,
                ..Default::default()
            },
        );

        let registry = ToolRegistry::from_config(&config).unwrap();
        assert!(registry.get("hydra").is_none());

        let nmap = registry.get("nmap").unwrap();
        assert_eq!(nmap.spec().default_timeout, Duration::from_secs(30));
        assert_eq!(nmap.governor().capacity(), 3);
        assert_eq!(nmap.breaker().config().failure_threshold, 2);
        assert_eq!(
            nmap.breaker().config().recovery_timeout,
            Duration::from_secs(5)
        );
        assert_eq!(nmap.limits().max_argument_length, 64);
        assert_eq!(nmap.limits().output.max_stdout_bytes, 4096);

        let masscan = registry.get("masscan").unwrap();
        assert_eq!(masscan.limits().max_argument_length, 2048);
        assert_eq!(masscan.limits().output.max_stdout_bytes, 4096);
    }

    #[test]
    fn test_from_config_rejects_unknown_override() {
        let mut config = Config::default();
        config
            .tools
            .insert("nikto".to_string(), ToolOverride::default());
        assert_eq!(
            ToolRegistry::from_config(&config).unwrap_err(),
            RegistryError::UnknownOverride("nikto".to_string())
        );
    }

    #[test]
    fn test_from_config_rejects_zero_concurrency() {
        let mut config = Config::default();
        config.tools.insert(
            "sqlmap".to_string(),
            ToolOverride {
                concurrency: Some(0),
                ..Default::default()
            },
        );
        assert_eq!(
            ToolRegistry::from_config(&config).unwrap_err(),
            RegistryError::ZeroConcurrency("sqlmap".to_string())
        );
    }
}
