//! Invocation Request / Result
//!
//! The data that crosses the gateway boundary: what a caller asks for and
//! the structured outcome it always gets back.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// Exit code reported when the executable cannot be resolved
pub const EXIT_NOT_FOUND: i32 = 127;

/// Exit code reported when the wall-clock timeout expires
pub const EXIT_TIMEOUT: i32 = 124;

/// Exit code reported for engine-level execution faults
pub const EXIT_EXECUTION_FAILED: i32 = 1;

/// Exit code reported for requests rejected during validation
pub const EXIT_VALIDATION: i32 = 2;

/// Machine-readable error taxonomy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorKind {
    InvalidTarget,
    DisallowedToken,
    FlagNotAllowed,
    ModeNotAllowed,
    NotFound,
    Timeout,
    CircuitOpen,
    ExecutionFailed,
}

impl ErrorKind {
    /// Stable label used in logs and metric labels
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::InvalidTarget => "INVALID_TARGET",
            ErrorKind::DisallowedToken => "DISALLOWED_TOKEN",
            ErrorKind::FlagNotAllowed => "FLAG_NOT_ALLOWED",
            ErrorKind::ModeNotAllowed => "MODE_NOT_ALLOWED",
            ErrorKind::NotFound => "NOT_FOUND",
            ErrorKind::Timeout => "TIMEOUT",
            ErrorKind::CircuitOpen => "CIRCUIT_OPEN",
            ErrorKind::ExecutionFailed => "EXECUTION_FAILED",
        }
    }

    /// Whether this kind is raised before anything is executed
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            ErrorKind::InvalidTarget
                | ErrorKind::DisallowedToken
                | ErrorKind::FlagNotAllowed
                | ErrorKind::ModeNotAllowed
        )
    }

    /// Conventional exit code for results carrying this kind
    pub fn exit_code(&self) -> i32 {
        match self {
            ErrorKind::NotFound => EXIT_NOT_FOUND,
            ErrorKind::Timeout => EXIT_TIMEOUT,
            ErrorKind::CircuitOpen | ErrorKind::ExecutionFailed => EXIT_EXECUTION_FAILED,
            _ => EXIT_VALIDATION,
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A caller's request to run one tool once against one target
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvocationRequest {
    /// Host, address or CIDR to scan
    pub target: String,

    /// Raw argument string, shell-word split but never shell-executed
    #[serde(default)]
    pub arguments: String,

    /// Per-call timeout in seconds (clamped by the gateway)
    #[serde(default)]
    pub timeout_secs: Option<u64>,

    /// Caller-chosen id echoed back in the result
    #[serde(default)]
    pub correlation_id: Option<String>,
}

impl InvocationRequest {
    pub fn new(target: impl Into<String>, arguments: impl Into<String>) -> Self {
        Self {
            target: target.into(),
            arguments: arguments.into(),
            timeout_secs: None,
            correlation_id: None,
        }
    }

    pub fn with_timeout_secs(mut self, secs: u64) -> Self {
        self.timeout_secs = Some(secs);
        self
    }

    pub fn with_correlation_id(mut self, id: impl Into<String>) -> Self {
        self.correlation_id = Some(id.into());
        self
    }

    /// Timeout override as a duration, if any
    pub fn timeout_override(&self) -> Option<Duration> {
        self.timeout_secs.map(Duration::from_secs)
    }
}

/// Structured outcome of one invocation
///
/// Every path through the gateway (rejection, validation failure, timeout,
/// crash, success) produces exactly one of these.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InvocationResult {
    pub stdout: String,
    pub stderr: String,
    pub exit_code: i32,
    pub stdout_truncated: bool,
    pub stderr_truncated: bool,
    pub timed_out: bool,
    pub error_kind: Option<ErrorKind>,
    pub error_message: Option<String>,
    pub execution_time_ms: f64,
    pub correlation_id: String,
}

impl InvocationResult {
    /// Result for a process that ran to completion
    pub fn completed(exit_code: i32, stdout: CapturedOutput, stderr: CapturedOutput) -> Self {
        Self {
            stdout: stdout.text(),
            stderr: stderr.text(),
            exit_code,
            stdout_truncated: stdout.truncated,
            stderr_truncated: stderr.truncated,
            timed_out: false,
            error_kind: None,
            error_message: None,
            execution_time_ms: 0.0,
            correlation_id: String::new(),
        }
    }

    /// Result for a process killed at the deadline
    pub fn timed_out(timeout: Duration, stdout: CapturedOutput, stderr: CapturedOutput) -> Self {
        let mut result = Self::completed(EXIT_TIMEOUT, stdout, stderr);
        result.timed_out = true;
        result.error_kind = Some(ErrorKind::Timeout);
        result.error_message = Some(format!("execution timed out after {:?}", timeout));
        result
    }

    /// Result for anything that never produced a process outcome
    ///
    /// The message is also placed in stderr so line-oriented callers see it.
    pub fn error(kind: ErrorKind, message: impl Into<String>) -> Self {
        let message = message.into();
        Self {
            stdout: String::new(),
            stderr: message.clone(),
            exit_code: kind.exit_code(),
            stdout_truncated: false,
            stderr_truncated: false,
            timed_out: kind == ErrorKind::Timeout,
            error_kind: Some(kind),
            error_message: Some(message),
            execution_time_ms: 0.0,
            correlation_id: String::new(),
        }
    }

    /// Stamp the call-level fields right before returning to the caller
    pub(crate) fn stamped(mut self, correlation_id: String, elapsed: Duration) -> Self {
        self.correlation_id = correlation_id;
        self.execution_time_ms = elapsed.as_secs_f64() * 1000.0;
        self
    }

    /// Ran to completion with exit code zero
    pub fn is_success(&self) -> bool {
        self.error_kind.is_none() && self.exit_code == 0
    }

    /// Get a human-readable summary
    pub fn summary(&self) -> String {
        match self.error_kind {
            Some(ErrorKind::Timeout) => {
                format!("Timeout after {:.0}ms", self.execution_time_ms)
            }
            Some(kind) => format!(
                "{} ({})",
                kind,
                self.error_message.as_deref().unwrap_or("no detail")
            ),
            None => format!(
                "Exited {} ({:.0}ms, {} bytes output{})",
                self.exit_code,
                self.execution_time_ms,
                self.stdout.len(),
                if self.stdout_truncated { ", truncated" } else { "" }
            ),
        }
    }
}

/// Bytes captured from one output stream, already capped
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CapturedOutput {
    pub bytes: Vec<u8>,
    pub truncated: bool,
}

impl CapturedOutput {
    /// Decoded output, never longer than the captured bytes
    ///
    /// A character cut in half by the cap is dropped and any other invalid
    /// byte becomes `?`.
    pub fn text(&self) -> String {
        let bytes = if self.truncated {
            without_partial_char(&self.bytes)
        } else {
            self.bytes.as_slice()
        };
        let mut text = String::with_capacity(bytes.len());
        for chunk in bytes.utf8_chunks() {
            text.push_str(chunk.valid());
            text.extend(std::iter::repeat('?').take(chunk.invalid().len()));
        }
        text
    }
}

/// Strip a multi-byte sequence left incomplete at the end
fn without_partial_char(bytes: &[u8]) -> &[u8] {
    let tail_start = bytes.len().saturating_sub(3);
    for index in (tail_start..bytes.len()).rev() {
        let width = match bytes[index] {
            0x80..=0xBF => continue,
            0xC0..=0xDF => 2,
            0xE0..=0xEF => 3,
            0xF0..=0xF7 => 4,
            _ => 1,
        };
        if bytes.len() - index < width {
            return &bytes[..index];
        }
        return bytes;
    }
    bytes
}
