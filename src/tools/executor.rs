//! Sandboxed Executor
//!
//! This module spawns exactly one OS process per invocation and supervises
//! it until it exits, is killed at the deadline, or the call is dropped.
//! Expected failures (missing executable, timeout, spawn errors) come back
//! as typed `InvocationResult` values, never as errors.

use super::invocation::{CapturedOutput, ErrorKind, InvocationResult};
use super::timeout::{ExecutionTimeout, TimedOut};
use super::validator::ValidatedCommand;
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};
use std::time::Instant;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::Command as TokioCommand;
use tracing::{debug, info, warn};

/// Search path given to every child and used to resolve executables
pub const SANDBOX_PATH: &str = "/usr/local/sbin:/usr/local/bin:/usr/sbin:/usr/bin:/sbin:/bin";

/// The only locale a child ever sees
pub const SANDBOX_LOCALE: &str = "C.UTF-8";

/// Maximum stdout kept per invocation (1MB)
pub const DEFAULT_MAX_STDOUT_BYTES: usize = 1024 * 1024;

/// Maximum stderr kept per invocation (256KB)
pub const DEFAULT_MAX_STDERR_BYTES: usize = 256 * 1024;

const READ_CHUNK_SIZE: usize = 16 * 1024;

/// Per-stream output ceilings
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OutputLimits {
    pub max_stdout_bytes: usize,
    pub max_stderr_bytes: usize,
}

impl Default for OutputLimits {
    fn default() -> Self {
        Self {
            max_stdout_bytes: DEFAULT_MAX_STDOUT_BYTES,
            max_stderr_bytes: DEFAULT_MAX_STDERR_BYTES,
        }
    }
}

/// Runs a validated command to completion
///
/// The orchestrator only talks to this trait, so tests can swap in a
/// scripted runner.
#[async_trait]
pub trait CommandRunner: Send + Sync {
    /// Run the command under the given budget and output limits
    async fn run(
        &self,
        command: &ValidatedCommand,
        timeout: ExecutionTimeout,
        limits: OutputLimits,
    ) -> InvocationResult;

    /// Resolve an executable name the way `run` would, without spawning
    fn resolve(&self, program: &str) -> Option<PathBuf>;
}

/// Process executor with a scrubbed environment
///
/// # Security
///
/// 1. Uses `tokio::process::Command` with an argument vector, never a shell
/// 2. Clears the inherited environment; only `PATH` and the locale are set
/// 3. Resolves the executable on every call against a fixed search path
/// 4. Caps captured output per stream and keeps draining past the cap
/// 5. Kills the child on timeout and when the call is dropped
#[derive(Debug, Clone)]
pub struct SandboxedExecutor {
    search_path: String,
    working_dir: PathBuf,
}

impl Default for SandboxedExecutor {
    fn default() -> Self {
        Self::new()
    }
}

impl SandboxedExecutor {
    /// Create an executor running children in the system temp directory
    pub fn new() -> Self {
        Self {
            search_path: SANDBOX_PATH.to_string(),
            working_dir: std::env::temp_dir(),
        }
    }

    /// Create an executor running children in a specific directory
    pub fn with_working_dir(dir: impl Into<PathBuf>) -> Self {
        Self {
            working_dir: dir.into(),
            ..Self::new()
        }
    }

    pub fn working_dir(&self) -> &Path {
        &self.working_dir
    }

    pub fn search_path(&self) -> &str {
        &self.search_path
    }

    /// Run one command
    ///
    /// Never fails: every fault is folded into the returned result.
    pub async fn execute(
        &self,
        command: &ValidatedCommand,
        timeout: ExecutionTimeout,
        limits: OutputLimits,
    ) -> InvocationResult {
        let start = Instant::now();
        let mut result = self.execute_inner(command, timeout, limits).await;
        result.execution_time_ms = start.elapsed().as_secs_f64() * 1000.0;
        result
    }

    async fn execute_inner(
        &self,
        command: &ValidatedCommand,
        timeout: ExecutionTimeout,
        limits: OutputLimits,
    ) -> InvocationResult {
        let program = command.program();

        let Some(path) = self.resolve_program(program) else {
            warn!("Executable '{}' not found on sandbox path", program);
            return InvocationResult::error(
                ErrorKind::NotFound,
                format!("executable '{}' not found", program),
            );
        };

        info!("Executing: {} ({} args)", program, command.args().len());
        debug!("Command line: {}", command);

        let mut process = TokioCommand::new(&path);
        process
            .args(command.args())
            .env_clear()
            .env("PATH", &self.search_path)
            .env("LANG", SANDBOX_LOCALE)
            .env("LC_ALL", SANDBOX_LOCALE)
            .current_dir(&self.working_dir)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let mut child = match process.spawn() {
            Ok(child) => child,
            Err(e) => {
                warn!("Failed to spawn {}: {}", program, e);
                return InvocationResult::error(
                    ErrorKind::ExecutionFailed,
                    format!("failed to spawn '{}': {}", program, e),
                );
            }
        };

        let stdout_pipe = child.stdout.take();
        let stderr_pipe = child.stderr.take();
        let mut stdout = CapturedOutput::default();
        let mut stderr = CapturedOutput::default();

        let outcome = timeout
            .run(async {
                let (_, _, status) = tokio::join!(
                    read_capped(stdout_pipe, limits.max_stdout_bytes, &mut stdout),
                    read_capped(stderr_pipe, limits.max_stderr_bytes, &mut stderr),
                    child.wait(),
                );
                status
            })
            .await;

        match outcome {
            Ok(Ok(status)) => {
                let exit_code = exit_code_of(status);
                if exit_code == 0 {
                    info!("Command succeeded: {}", program);
                } else {
                    warn!("Command failed: {} (exit code: {})", program, exit_code);
                }
                InvocationResult::completed(exit_code, stdout, stderr)
            }
            Ok(Err(e)) => {
                warn!("Failed waiting for {}: {}", program, e);
                terminate(&mut child, program).await;
                InvocationResult::error(
                    ErrorKind::ExecutionFailed,
                    format!("failed waiting for '{}': {}", program, e),
                )
            }
            Err(TimedOut(limit)) => {
                warn!("Command timed out after {:?}: {}", limit, program);
                terminate(&mut child, program).await;
                InvocationResult::timed_out(limit, stdout, stderr)
            }
        }
    }

    fn resolve_program(&self, program: &str) -> Option<PathBuf> {
        which::which_in(program, Some(&self.search_path), &self.working_dir).ok()
    }
}

#[async_trait]
impl CommandRunner for SandboxedExecutor {
    async fn run(
        &self,
        command: &ValidatedCommand,
        timeout: ExecutionTimeout,
        limits: OutputLimits,
    ) -> InvocationResult {
        self.execute(command, timeout, limits).await
    }

    fn resolve(&self, program: &str) -> Option<PathBuf> {
        self.resolve_program(program)
    }
}

/// Kill and reap; a child that already exited is fine
async fn terminate(child: &mut tokio::process::Child, program: &str) {
    if let Err(e) = child.kill().await {
        debug!("Kill of {} reported: {}", program, e);
    }
}

/// Read a pipe to EOF, keeping at most `cap` bytes
async fn read_capped<R>(reader: Option<R>, cap: usize, sink: &mut CapturedOutput)
where
    R: AsyncRead + Unpin,
{
    let Some(mut reader) = reader else {
        return;
    };
    let mut chunk = vec![0u8; READ_CHUNK_SIZE];
    loop {
        match reader.read(&mut chunk).await {
            Ok(0) => break,
            Ok(n) => {
                let room = cap.saturating_sub(sink.bytes.len());
                if n > room {
                    sink.truncated = true;
                }
                sink.bytes.extend_from_slice(&chunk[..n.min(room)]);
            }
            Err(e) => {
                debug!("Output pipe read error: {}", e);
                break;
            }
        }
    }
}

#[cfg(unix)]
fn exit_code_of(status: ExitStatus) -> i32 {
    use std::os::unix::process::ExitStatusExt;
    status
        .code()
        .or_else(|| status.signal().map(|signal| 128 + signal))
        .unwrap_or(1)
}

#[cfg(not(unix))]
fn exit_code_of(status: ExitStatus) -> i32 {
    status.code().unwrap_or(1)
}
