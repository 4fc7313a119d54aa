//! Execution Timeout Management
//!
//! Resolves the wall-clock budget for one invocation and races a future
//! against it.

use std::future::Future;
use std::time::Duration;
use tokio::time;

/// Smallest budget any invocation gets
pub const MIN_TIMEOUT: Duration = Duration::from_secs(1);

/// Default ceiling for caller-supplied overrides (1 hour)
pub const DEFAULT_MAX_TIMEOUT: Duration = Duration::from_secs(3600);

/// Returned when the budget runs out before the future completes
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("execution timed out after {0:?}")]
pub struct TimedOut(pub Duration);

/// Wall-clock budget for one invocation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExecutionTimeout {
    duration: Duration,
}

impl Default for ExecutionTimeout {
    fn default() -> Self {
        Self::new(Duration::from_secs(60))
    }
}

impl ExecutionTimeout {
    /// Create a new execution timeout
    ///
    /// # Example
    ///
    /// ```
    /// use std::time::Duration;
    /// use scangate::tools::ExecutionTimeout;
    ///
    /// let timeout = ExecutionTimeout::new(Duration::from_secs(30));
    /// assert_eq!(timeout.duration(), Duration::from_secs(30));
    /// ```
    pub fn new(duration: Duration) -> Self {
        Self { duration }
    }

    /// Create a timeout from seconds
    pub fn from_secs(secs: u64) -> Self {
        Self::new(Duration::from_secs(secs))
    }

    /// Pick the caller override if present, else the tool default
    ///
    /// Overrides are clamped to `[MIN_TIMEOUT, max]`; the tool default is
    /// trusted as configured.
    ///
    /// ```
    /// use std::time::Duration;
    /// use scangate::tools::ExecutionTimeout;
    ///
    /// let default = Duration::from_secs(300);
    /// let max = Duration::from_secs(600);
    /// let t = ExecutionTimeout::resolve(Some(Duration::from_secs(9999)), default, max);
    /// assert_eq!(t.duration(), max);
    /// ```
    pub fn resolve(requested: Option<Duration>, default: Duration, max: Duration) -> Self {
        match requested {
            Some(requested) => Self::new(requested.clamp(MIN_TIMEOUT, max.max(MIN_TIMEOUT))),
            None => Self::new(default),
        }
    }

    /// Get the timeout duration
    pub fn duration(&self) -> Duration {
        self.duration
    }

    /// Execute a future with a timeout
    ///
    /// The future is dropped when the budget expires; whatever it owns is
    /// released through its destructors.
    pub async fn run<F, T>(&self, future: F) -> Result<T, TimedOut>
    where
        F: Future<Output = T>,
    {
        time::timeout(self.duration, future)
            .await
            .map_err(|_| TimedOut(self.duration))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timeout_default() {
        let timeout = ExecutionTimeout::default();
        assert_eq!(timeout.duration(), Duration::from_secs(60));
    }

    #[test]
    fn test_resolve_uses_default_without_override() {
        let timeout = ExecutionTimeout::resolve(None, Duration::from_secs(90), DEFAULT_MAX_TIMEOUT);
        assert_eq!(timeout.duration(), Duration::from_secs(90));
    }

    #[test]
    fn test_resolve_clamps_override() {
        let default = Duration::from_secs(90);
        let max = Duration::from_secs(120);

        let low = ExecutionTimeout::resolve(Some(Duration::ZERO), default, max);
        assert_eq!(low.duration(), MIN_TIMEOUT);

        let high = ExecutionTimeout::resolve(Some(Duration::from_secs(500)), default, max);
        assert_eq!(high.duration(), max);

        let within = ExecutionTimeout::resolve(Some(Duration::from_secs(30)), default, max);
        assert_eq!(within.duration(), Duration::from_secs(30));
    }

    #[test]
    fn test_resolve_tolerates_tiny_max() {
        let timeout = ExecutionTimeout::resolve(
            Some(Duration::from_secs(5)),
            Duration::from_secs(5),
            Duration::ZERO,
        );
        assert_eq!(timeout.duration(), MIN_TIMEOUT);
    }

    #[tokio::test]
    async fn test_timeout_run_success() {
        let timeout = ExecutionTimeout::from_secs(10);
        let result = timeout.run(async { "test value" }).await;
        assert_eq!(result, Ok("test value"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_run_timeout() {
        let timeout = ExecutionTimeout::from_secs(1);

        let result = timeout
            .run(async {
                tokio::time::sleep(Duration::from_secs(2)).await;
            })
            .await;

        assert_eq!(result, Err(TimedOut(Duration::from_secs(1))));
        assert!(result.unwrap_err().to_string().contains("timed out"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_run_just_in_time() {
        let timeout = ExecutionTimeout::from_secs(1);

        let result = timeout
            .run(async {
                tokio::time::sleep(Duration::from_millis(500)).await;
                42
            })
            .await;

        assert_eq!(result, Ok(42));
    }
}
