// Prometheus metrics for scangate
//
// Exposes metrics on /metrics HTTP endpoint:
// - Invocations per tool and status (counter)
// - Execution latencies per tool (histogram)
// - Timeouts and errors per tool (counter)
// - Circuit breaker state per tool (gauge)

use crate::tools::{CircuitState, ErrorKind};
use lazy_static::lazy_static;
use prometheus::{CounterVec, Encoder, HistogramVec, IntGaugeVec, Registry, TextEncoder};
use std::sync::Arc;
use std::time::Duration;

lazy_static! {
    pub static ref REGISTRY: Arc<Registry> = Arc::new(Registry::new());

    pub static ref TOOL_INVOCATIONS_TOTAL: CounterVec = CounterVec::new(
        prometheus::Opts::new("scangate_tool_invocations_total", "Total number of tool invocations"),
        &["tool", "status"]
    ).expect("Failed to create tool invocations metric");

    pub static ref TOOL_DURATION_SECONDS: HistogramVec = HistogramVec::new(
        prometheus::HistogramOpts::new("scangate_tool_duration_seconds", "Tool invocation duration in seconds")
            .buckets(vec![0.1, 0.5, 1.0, 5.0, 15.0, 60.0, 300.0, 900.0, 3600.0]),
        &["tool"]
    ).expect("Failed to create tool duration metric");

    pub static ref TOOL_TIMEOUTS_TOTAL: CounterVec = CounterVec::new(
        prometheus::Opts::new("scangate_tool_timeouts_total", "Total number of tool invocations killed at their deadline"),
        &["tool"]
    ).expect("Failed to create tool timeouts metric");

    pub static ref TOOL_ERRORS_TOTAL: CounterVec = CounterVec::new(
        prometheus::Opts::new("scangate_tool_errors_total", "Total number of failed tool invocations by error kind"),
        &["tool", "kind"]
    ).expect("Failed to create tool errors metric");

    pub static ref CIRCUIT_BREAKER_STATE: IntGaugeVec = IntGaugeVec::new(
        prometheus::Opts::new("scangate_circuit_breaker_state", "Circuit breaker state (0 closed, 1 half-open, 2 open)"),
        &["tool"]
    ).expect("Failed to create circuit breaker state metric");
}

fn register<C>(collector: C) -> prometheus::Result<()>
where
    C: prometheus::core::Collector + 'static,
{
    match REGISTRY.register(Box::new(collector)) {
        Err(prometheus::Error::AlreadyReg) => Ok(()),
        other => other,
    }
}

/// Initialize metrics registry; calling it again is harmless
pub fn init() -> prometheus::Result<()> {
    register(TOOL_INVOCATIONS_TOTAL.clone())?;
    register(TOOL_DURATION_SECONDS.clone())?;
    register(TOOL_TIMEOUTS_TOTAL.clone())?;
    register(TOOL_ERRORS_TOTAL.clone())?;
    register(CIRCUIT_BREAKER_STATE.clone())?;
    Ok(())
}

/// Gather all metrics in Prometheus text format
pub fn gather_metrics() -> anyhow::Result<String> {
    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();
    let mut buffer = Vec::new();
    encoder
        .encode(&metric_families, &mut buffer)
        .map_err(|e| anyhow::anyhow!("Failed to encode metrics: {}", e))?;
    String::from_utf8(buffer).map_err(|e| anyhow::anyhow!("Invalid UTF-8 in metrics: {}", e))
}

/// Where the orchestrator reports finished invocations
pub trait MetricsSink: Send + Sync {
    fn record(
        &self,
        tool: &str,
        success: bool,
        duration: Duration,
        timed_out: bool,
        error_kind: Option<ErrorKind>,
    );

    fn record_breaker_state(&self, _tool: &str, _state: CircuitState) {}
}

/// Discards everything
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopMetrics;

impl MetricsSink for NoopMetrics {
    fn record(&self, _: &str, _: bool, _: Duration, _: bool, _: Option<ErrorKind>) {}
}

/// Feeds the process-wide Prometheus registry
#[derive(Debug, Clone, Copy)]
pub struct PrometheusMetrics {
    _registered: (),
}

impl PrometheusMetrics {
    /// Register the collectors and return a sink writing to them
    pub fn new() -> prometheus::Result<Self> {
        init()?;
        Ok(Self { _registered: () })
    }
}

impl MetricsSink for PrometheusMetrics {
    fn record(
        &self,
        tool: &str,
        success: bool,
        duration: Duration,
        timed_out: bool,
        error_kind: Option<ErrorKind>,
    ) {
        let status = match (success, error_kind) {
            (true, _) => "success",
            (false, Some(ErrorKind::Timeout)) => "timeout",
            (false, Some(_)) => "error",
            (false, None) => "nonzero_exit",
        };
        TOOL_INVOCATIONS_TOTAL
            .with_label_values(&[tool, status])
            .inc();
        TOOL_DURATION_SECONDS
            .with_label_values(&[tool])
            .observe(duration.as_secs_f64());
        if timed_out {
            TOOL_TIMEOUTS_TOTAL.with_label_values(&[tool]).inc();
        }
        if let Some(kind) = error_kind {
            TOOL_ERRORS_TOTAL
                .with_label_values(&[tool, kind.as_str()])
                .inc();
        }
    }

    fn record_breaker_state(&self, tool: &str, state: CircuitState) {
        CIRCUIT_BREAKER_STATE
            .with_label_values(&[tool])
            .set(state.as_gauge());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_is_idempotent() {
        assert!(init().is_ok());
        assert!(init().is_ok());
    }

    #[test]
    fn test_prometheus_sink_records() {
        let sink = PrometheusMetrics::new().unwrap();
        let before = TOOL_INVOCATIONS_TOTAL
            .with_label_values(&["metrics-test", "timeout"])
            .get();

        sink.record(
            "metrics-test",
            false,
            Duration::from_millis(1500),
            true,
            Some(ErrorKind::Timeout),
        );
        sink.record_breaker_state("metrics-test", CircuitState::Open);

        let after = TOOL_INVOCATIONS_TOTAL
            .with_label_values(&["metrics-test", "timeout"])
            .get();
        assert_eq!(after - before, 1.0);
        assert_eq!(
            CIRCUIT_BREAKER_STATE
                .with_label_values(&["metrics-test"])
                .get(),
            2
        );

        let text = gather_metrics().unwrap();
        assert!(text.contains("scangate_tool_timeouts_total"));
        assert!(text.contains("kind=\"TIMEOUT\""));
    }

    #[test]
    fn test_noop_sink() {
        let sink = NoopMetrics;
        sink.record("nmap", true, Duration::ZERO, false, None);
        sink.record_breaker_state("nmap", CircuitState::Closed);
    }
}
