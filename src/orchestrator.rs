//! Execution Orchestrator
//!
//! Composes, for one call: circuit breaker check, concurrency slot,
//! specialization and validation, sandboxed execution, then breaker
//! accounting and metrics. Every path ends in an `InvocationResult`; the
//! only thing that never reaches a caller is a panic from the runner.

use crate::config::Config;
use crate::metrics::{MetricsSink, NoopMetrics};
use crate::registry::{RegistryError, ToolClass, ToolRegistry};
use crate::tools::{
    BreakerSnapshot, CallOutcome, CircuitState, CommandRunner, ErrorKind, ExecutionTimeout,
    InvocationRequest, InvocationResult, SandboxedExecutor, Specialization, TargetPolicy,
    DEFAULT_MAX_TIMEOUT,
};
use futures::FutureExt;
use serde::{Deserialize, Serialize};
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, info_span, warn, Instrument};
use uuid::Uuid;

/// Static contract plus live breaker view for one tool
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolDescription {
    pub name: String,
    pub command: String,
    /// `simple` or `multi_mode`
    pub kind: String,
    pub allowed_flag_prefixes: Option<Vec<String>>,
    pub allowed_modes: Option<Vec<String>>,
    pub default_arguments: Option<String>,
    pub required_arguments: Vec<String>,
    pub default_timeout_secs: u64,
    pub default_concurrency: usize,
    pub max_argument_length: usize,
    pub max_stdout_bytes: usize,
    pub max_stderr_bytes: usize,
    pub counted_failures: Vec<ErrorKind>,
    pub circuit_breaker: BreakerSnapshot,
}

impl ToolDescription {
    fn of(class: &ToolClass) -> Self {
        let spec = class.spec();
        let kind = match spec.specialization {
            Specialization::Simple { .. } => "simple",
            Specialization::MultiMode { .. } => "multi_mode",
        };
        Self {
            name: spec.name.clone(),
            command: spec.command.clone(),
            kind: kind.to_string(),
            allowed_flag_prefixes: spec.allowed_flag_prefixes.clone(),
            allowed_modes: spec.specialization.allowed_modes(),
            default_arguments: spec.default_arguments.clone(),
            required_arguments: spec.required_arguments.clone(),
            default_timeout_secs: spec.default_timeout.as_secs(),
            default_concurrency: class.governor().capacity(),
            max_argument_length: class.limits().max_argument_length,
            max_stdout_bytes: class.limits().output.max_stdout_bytes,
            max_stderr_bytes: class.limits().output.max_stderr_bytes,
            counted_failures: spec.counted_failures.clone(),
            circuit_breaker: class.breaker().snapshot(),
        }
    }
}

/// Entry point for tool invocations
#[derive(Clone)]
pub struct Orchestrator {
    registry: Arc<ToolRegistry>,
    runner: Arc<dyn CommandRunner>,
    metrics: Arc<dyn MetricsSink>,
    policy: TargetPolicy,
    max_timeout: Duration,
}

impl std::fmt::Debug for Orchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Orchestrator")
            .field("tools", &self.registry.names())
            .field("policy", &self.policy)
            .field("max_timeout", &self.max_timeout)
            .finish()
    }
}

impl Orchestrator {
    /// Create an orchestrator with the default target policy and no metrics
    pub fn new(registry: Arc<ToolRegistry>, runner: Arc<dyn CommandRunner>) -> Self {
        Self {
            registry,
            runner,
            metrics: Arc::new(NoopMetrics),
            policy: TargetPolicy::default(),
            max_timeout: DEFAULT_MAX_TIMEOUT,
        }
    }

    /// Build the registry and sandboxed executor from configuration
    pub fn from_config(
        config: &Config,
        metrics: Arc<dyn MetricsSink>,
    ) -> Result<Self, RegistryError> {
        let registry = ToolRegistry::from_config(config)?;
        let runner = match &config.limits.working_dir {
            Some(dir) => SandboxedExecutor::with_working_dir(dir),
            None => SandboxedExecutor::new(),
        };
        Ok(Self::new(Arc::new(registry), Arc::new(runner))
            .with_metrics(metrics)
            .with_target_policy(TargetPolicy::new(&config.targets.lab_suffix))
            .with_max_timeout(Duration::from_secs(config.limits.max_timeout_secs)))
    }

    pub fn with_metrics(mut self, metrics: Arc<dyn MetricsSink>) -> Self {
        self.metrics = metrics;
        self
    }

    pub fn with_target_policy(mut self, policy: TargetPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Ceiling for caller timeout overrides
    pub fn with_max_timeout(mut self, max_timeout: Duration) -> Self {
        self.max_timeout = max_timeout;
        self
    }

    pub fn registry(&self) -> &ToolRegistry {
        &self.registry
    }

    pub fn target_policy(&self) -> &TargetPolicy {
        &self.policy
    }

    /// Run one invocation to completion
    ///
    /// Unknown tools return NOT_FOUND without touching any breaker or
    /// metric. Dropping the returned future kills the child, frees the
    /// concurrency slot and releases a half-open trial.
    pub async fn execute(&self, tool_name: &str, request: InvocationRequest) -> InvocationResult {
        let started = Instant::now();
        let correlation_id = request
            .correlation_id
            .clone()
            .filter(|id| !id.trim().is_empty())
            .unwrap_or_else(|| Uuid::new_v4().to_string());

        let span = info_span!("invocation", tool = %tool_name, correlation_id = %correlation_id);
        async move {
            let Some(class) = self.registry.get(tool_name) else {
                warn!("Unknown tool requested");
                return InvocationResult::error(
                    ErrorKind::NotFound,
                    format!("Unknown tool '{}'", tool_name),
                )
                .stamped(correlation_id, started.elapsed());
            };

            let result = self
                .run(class, &request)
                .await
                .stamped(correlation_id, started.elapsed());

            self.metrics.record(
                tool_name,
                result.is_success(),
                started.elapsed(),
                result.timed_out,
                result.error_kind,
            );
            self.metrics
                .record_breaker_state(tool_name, class.breaker().state());

            info!(
                exit_code = result.exit_code,
                error_kind = result.error_kind.map(|k| k.as_str()),
                "{}",
                result.summary()
            );
            result
        }
        .instrument(span)
        .await
    }

    async fn run(&self, class: &ToolClass, request: &InvocationRequest) -> InvocationResult {
        let permit = match class.breaker().try_acquire() {
            Ok(permit) => permit,
            Err(open) => {
                warn!(retry_after = ?open.retry_after, "Rejected, circuit breaker open");
                return InvocationResult::error(ErrorKind::CircuitOpen, open.to_string());
            }
        };

        let Some(_slot) = class.governor().acquire().await else {
            permit.record(CallOutcome::Neutral);
            return InvocationResult::error(
                ErrorKind::ExecutionFailed,
                "concurrency gate closed",
            );
        };

        let command = match class.spec().prepare(
            request,
            &self.policy,
            class.limits().max_argument_length,
        ) {
            Ok(command) => command,
            Err(e) => {
                debug!(error = %e, kind = %e.kind(), "Validation failed");
                permit.record(CallOutcome::Neutral);
                return InvocationResult::error(e.kind(), e.to_string());
            }
        };

        let timeout = ExecutionTimeout::resolve(
            request.timeout_override(),
            class.spec().default_timeout,
            self.max_timeout,
        );
        info!(
            command = %command,
            timeout_secs = timeout.duration().as_secs(),
            trial = permit.is_trial(),
            "Executing"
        );

        let outcome = AssertUnwindSafe(self.runner.run(&command, timeout, class.limits().output))
            .catch_unwind()
            .await;

        match outcome {
            Ok(result) => {
                let call = match result.error_kind {
                    Some(kind) if class.spec().counts_as_failure(kind) => CallOutcome::Failure,
                    Some(_) => CallOutcome::Neutral,
                    None => CallOutcome::Success,
                };
                permit.record(call);
                result
            }
            Err(panic) => {
                error!(panic = %panic_message(panic.as_ref()), "Runner panicked");
                permit.record(CallOutcome::Neutral);
                InvocationResult::error(
                    ErrorKind::ExecutionFailed,
                    "internal error while executing tool",
                )
            }
        }
    }

    /// Contract and breaker snapshot of one tool
    pub fn describe(&self, tool_name: &str) -> Option<ToolDescription> {
        self.registry.get(tool_name).map(ToolDescription::of)
    }

    /// Registered tool names, sorted
    pub fn tool_names(&self) -> Vec<String> {
        self.registry.names()
    }

    pub fn circuit_breaker_state(&self, tool_name: &str) -> Option<CircuitState> {
        self.registry.get(tool_name).map(|c| c.breaker().state())
    }

    /// Whether the tool's executable can be found on the sandbox path
    pub fn executable_resolvable(&self, tool_name: &str) -> bool {
        self.registry
            .get(tool_name)
            .is_some_and(|c| self.runner.resolve(&c.spec().command).is_some())
    }

    /// Operator override; returns false for unknown tools
    pub fn force_open(&self, tool_name: &str) -> bool {
        let Some(class) = self.registry.get(tool_name) else {
            return false;
        };
        class.breaker().force_open();
        self.metrics
            .record_breaker_state(tool_name, CircuitState::Open);
        true
    }

    /// Operator override; returns false for unknown tools
    pub fn force_close(&self, tool_name: &str) -> bool {
        let Some(class) = self.registry.get(tool_name) else {
            return false;
        };
        class.breaker().force_close();
        self.metrics
            .record_breaker_state(tool_name, CircuitState::Closed);
        true
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
