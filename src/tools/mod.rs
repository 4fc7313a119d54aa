//! Tool Execution Subsystem
//!
//! Everything between an untrusted invocation request and a finished OS
//! process: validation, per-tool specialization, fault isolation,
//! admission control, and sandboxed execution.
//!
//! # Security Features
//!
//! - **Scoped Targets**: only private IPv4 space and internal-lab hostnames
//! - **List Invocation**: commands are executed as argument vectors, never through a shell
//! - **Token Grammar**: caller arguments are split and restricted to a safe alphabet
//! - **Flag Allowlists**: each tool declares which flags it accepts
//! - **Timeout Enforcement**: every execution has a wall-clock budget
//! - **Resource Limits**: output ceilings and per-tool concurrency caps
//!
//! # Architecture
//!
//! The module is organized into:
//! - `validator.rs`: target policy and argument tokenizing
//! - `spec.rs`: per-tool contracts and command assembly
//! - `catalog.rs`: the built-in scanners
//! - `circuit_breaker.rs`: per-tool fault isolation
//! - `governor.rs`: per-tool concurrency slots
//! - `executor.rs`: subprocess execution with timeout handling
//! - `timeout.rs`: timeout resolution
//!
//! # Example
//!
//! ```
//! use scangate::tools::{catalog, InvocationRequest, TargetPolicy};
//!
//! let nmap = catalog::nmap();
//! let request = InvocationRequest::new("10.0.0.1", "-sV -p 22");
//! let command = nmap.prepare(&request, &TargetPolicy::default(), 2048).unwrap();
//! assert_eq!(command.to_string(), "nmap -sV -p 22 10.0.0.1");
//! ```

pub mod catalog;
mod circuit_breaker;
mod executor;
mod governor;
mod invocation;
mod spec;
mod timeout;
mod validator;

pub use circuit_breaker::{
    BreakerConfig, BreakerPermit, BreakerSnapshot, CallOutcome, CircuitBreaker, CircuitOpenError,
    CircuitState, DEFAULT_FAILURE_THRESHOLD, DEFAULT_RECOVERY_TIMEOUT,
};
pub use executor::{
    CommandRunner, OutputLimits, SandboxedExecutor, DEFAULT_MAX_STDERR_BYTES,
    DEFAULT_MAX_STDOUT_BYTES, SANDBOX_LOCALE, SANDBOX_PATH,
};
pub use governor::{ConcurrencyGovernor, DEFAULT_CONCURRENCY};
pub use invocation::{
    CapturedOutput, ErrorKind, InvocationRequest, InvocationResult, EXIT_EXECUTION_FAILED,
    EXIT_NOT_FOUND, EXIT_TIMEOUT, EXIT_VALIDATION,
};
pub use spec::{
    resolve_mode, CommandContext, ModeSpec, PreCheck, Specialization, TargetFormat,
    TargetPlacement, ToolBehavior, ToolSpec, DEFAULT_TOOL_TIMEOUT,
};
pub use timeout::{ExecutionTimeout, TimedOut, DEFAULT_MAX_TIMEOUT, MIN_TIMEOUT};
pub use validator::{
    is_flag, validate_arguments, validate_arguments_with_limit, validate_target, TargetKind,
    TargetPolicy, ValidatedCommand, ValidationError, DEFAULT_LAB_SUFFIX,
    DEFAULT_MAX_ARGUMENT_LENGTH,
};
