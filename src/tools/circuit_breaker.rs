//! Circuit Breaker
//!
//! Per-tool-class fault isolation. After enough consecutive counted
//! failures the breaker opens and calls are rejected without reaching the
//! executor; once the recovery timeout has passed a single trial call is
//! let through to decide whether to close again.
//!
//! ```text
//!   CLOSED ──(threshold failures)──▶ OPEN ──(recovery elapsed)──▶ HALF_OPEN
//!     ▲                               ▲                              │
//!     │                               └────────(trial fails)─────────┤
//!     └───────────────────────(trial succeeds)───────────────────────┘
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;
use tokio::time::Instant;
use tracing::{info, warn};

/// Default consecutive failures before opening
pub const DEFAULT_FAILURE_THRESHOLD: u32 = 5;

/// Default wait before a trial call is allowed
pub const DEFAULT_RECOVERY_TIMEOUT: Duration = Duration::from_secs(60);

/// Breaker state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

impl CircuitState {
    pub fn as_str(&self) -> &'static str {
        match self {
            CircuitState::Closed => "CLOSED",
            CircuitState::Open => "OPEN",
            CircuitState::HalfOpen => "HALF_OPEN",
        }
    }

    /// Numeric encoding for gauges: 0 closed, 1 half-open, 2 open
    pub fn as_gauge(&self) -> i64 {
        match self {
            CircuitState::Closed => 0,
            CircuitState::HalfOpen => 1,
            CircuitState::Open => 2,
        }
    }
}

/// Breaker thresholds
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BreakerConfig {
    /// Consecutive counted failures that open the breaker
    pub failure_threshold: u32,

    /// Time since the last failure before a trial call is admitted
    pub recovery_timeout: Duration,

    /// Successful trials needed to close from half-open
    pub half_open_successes: u32,
}

impl Default for BreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: DEFAULT_FAILURE_THRESHOLD,
            recovery_timeout: DEFAULT_RECOVERY_TIMEOUT,
            half_open_successes: 1,
        }
    }
}

/// How a call admitted by the breaker ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallOutcome {
    Success,
    /// A failure the tool declares as its own fault
    Failure,
    /// Neither: validation rejections, engine faults
    Neutral,
}

/// Returned when a call is rejected
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Circuit breaker open for {tool}")]
pub struct CircuitOpenError {
    pub tool: String,
    /// Time left before a trial call may be admitted, when known
    pub retry_after: Option<Duration>,
}

/// Point-in-time view of a breaker
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BreakerSnapshot {
    pub state: CircuitState,
    pub consecutive_failures: u32,
    pub half_open_successes: u32,
    pub last_failure_at: Option<DateTime<Utc>>,
    pub forced_open: bool,
    pub failure_threshold: u32,
    pub recovery_timeout_secs: u64,
    pub half_open_success_threshold: u32,
}

#[derive(Debug)]
struct BreakerInner {
    state: CircuitState,
    consecutive_failures: u32,
    last_failure: Option<Instant>,
    last_failure_at: Option<DateTime<Utc>>,
    half_open_successes: u32,
    trial_in_flight: bool,
    forced_open: bool,
}

impl BreakerInner {
    fn new() -> Self {
        Self {
            state: CircuitState::Closed,
            consecutive_failures: 0,
            last_failure: None,
            last_failure_at: None,
            half_open_successes: 0,
            trial_in_flight: false,
            forced_open: false,
        }
    }
}

/// Fault-isolation state machine for one tool class
#[derive(Debug)]
pub struct CircuitBreaker {
    name: String,
    config: BreakerConfig,
    inner: Mutex<BreakerInner>,
}

impl CircuitBreaker {
    pub fn new(name: impl Into<String>, config: BreakerConfig) -> Self {
        Self {
            name: name.into(),
            config,
            inner: Mutex::new(BreakerInner::new()),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn config(&self) -> &BreakerConfig {
        &self.config
    }

    fn lock(&self) -> MutexGuard<'_, BreakerInner> {
        // State stays consistent even if a holder panicked mid-update.
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Current state, without triggering any transition
    pub fn state(&self) -> CircuitState {
        self.lock().state
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.lock().consecutive_failures
    }

    /// Ask to run one call
    ///
    /// An OPEN breaker whose recovery timeout has been exceeded moves to HALF_OPEN
    /// and admits exactly one trial; everything else while OPEN, or while a
    /// trial is in flight, is rejected.
    pub fn try_acquire(&self) -> Result<BreakerPermit<'_>, CircuitOpenError> {
        let mut inner = self.lock();
        match inner.state {
            CircuitState::Closed => Ok(BreakerPermit::new(self, false)),
            CircuitState::Open => {
                if inner.forced_open {
                    return Err(self.rejection(None));
                }
                // Never recovered by elapsed time if no failure was recorded.
                let Some(last_failure) = inner.last_failure else {
                    return Err(self.rejection(None));
                };
                let elapsed = last_failure.elapsed();
                if elapsed > self.config.recovery_timeout {
                    inner.state = CircuitState::HalfOpen;
                    inner.half_open_successes = 0;
                    inner.trial_in_flight = true;
                    info!(tool = %self.name, "Circuit breaker HALF_OPEN, admitting trial call");
                    Ok(BreakerPermit::new(self, true))
                } else {
                    Err(self.rejection(Some(self.config.recovery_timeout - elapsed)))
                }
            }
            CircuitState::HalfOpen => {
                if inner.trial_in_flight {
                    Err(self.rejection(None))
                } else {
                    inner.trial_in_flight = true;
                    Ok(BreakerPermit::new(self, true))
                }
            }
        }
    }

    fn rejection(&self, retry_after: Option<Duration>) -> CircuitOpenError {
        CircuitOpenError {
            tool: self.name.clone(),
            retry_after,
        }
    }

    fn settle(&self, outcome: CallOutcome, trial: bool) {
        let mut inner = self.lock();
        if trial {
            inner.trial_in_flight = false;
        }

        match outcome {
            CallOutcome::Success => match inner.state {
                CircuitState::Closed => inner.consecutive_failures = 0,
                CircuitState::HalfOpen if trial => {
                    inner.half_open_successes += 1;
                    if inner.half_open_successes >= self.config.half_open_successes {
                        inner.state = CircuitState::Closed;
                        inner.consecutive_failures = 0;
                        inner.half_open_successes = 0;
                        info!(tool = %self.name, "Circuit breaker CLOSED after successful trial");
                    }
                }
                _ => {}
            },
            CallOutcome::Failure => {
                inner.last_failure = Some(Instant::now());
                inner.last_failure_at = Some(Utc::now());
                inner.consecutive_failures = inner.consecutive_failures.saturating_add(1);
                match inner.state {
                    CircuitState::Closed => {
                        if inner.consecutive_failures >= self.config.failure_threshold {
                            inner.state = CircuitState::Open;
                            warn!(
                                tool = %self.name,
                                failures = inner.consecutive_failures,
                                "Circuit breaker OPENED"
                            );
                        }
                    }
                    CircuitState::HalfOpen => {
                        inner.state = CircuitState::Open;
                        inner.half_open_successes = 0;
                        warn!(tool = %self.name, "Trial call failed, circuit breaker re-OPENED");
                    }
                    CircuitState::Open => {}
                }
            }
            CallOutcome::Neutral => {}
        }
    }

    /// Open the breaker until `force_close` is called
    pub fn force_open(&self) {
        let mut inner = self.lock();
        inner.state = CircuitState::Open;
        inner.forced_open = true;
        inner.trial_in_flight = false;
        inner.half_open_successes = 0;
        warn!(tool = %self.name, "Circuit breaker forced OPEN");
    }

    /// Close the breaker and clear failure accounting
    pub fn force_close(&self) {
        let mut inner = self.lock();
        inner.state = CircuitState::Closed;
        inner.forced_open = false;
        inner.trial_in_flight = false;
        inner.consecutive_failures = 0;
        inner.half_open_successes = 0;
        info!(tool = %self.name, "Circuit breaker forced CLOSED");
    }

    pub fn snapshot(&self) -> BreakerSnapshot {
        let inner = self.lock();
        BreakerSnapshot {
            state: inner.state,
            consecutive_failures: inner.consecutive_failures,
            half_open_successes: inner.half_open_successes,
            last_failure_at: inner.last_failure_at,
            forced_open: inner.forced_open,
            failure_threshold: self.config.failure_threshold,
            recovery_timeout_secs: self.config.recovery_timeout.as_secs(),
            half_open_success_threshold: self.config.half_open_successes,
        }
    }
}

/// Admission granted by a breaker
///
/// Settle it with `record`. Dropping it unsettled (the call was cancelled)
/// frees the half-open trial slot without counting anything.
#[derive(Debug)]
#[must_use = "a permit must be settled with record()"]
pub struct BreakerPermit<'a> {
    breaker: &'a CircuitBreaker,
    trial: bool,
    settled: bool,
}

impl<'a> BreakerPermit<'a> {
    fn new(breaker: &'a CircuitBreaker, trial: bool) -> Self {
        Self {
            breaker,
            trial,
            settled: false,
        }
    }

    /// Whether this permit is the half-open trial call
    pub fn is_trial(&self) -> bool {
        self.trial
    }

    pub fn record(mut self, outcome: CallOutcome) {
        self.settled = true;
        self.breaker.settle(outcome, self.trial);
    }
}

impl Drop for BreakerPermit<'_> {
    fn drop(&mut self) {
        if !self.settled {
            self.breaker.settle(CallOutcome::Neutral, self.trial);
        }
    }
}
