// HTTP server for metrics, health and tool descriptions
//
// Listens on (default: 0.0.0.0:9090):
// - /metrics       Prometheus text format
// - /health        JSON health report, 503 while any breaker is open
// - /tools/{name}  JSON tool description, 404 for unknown tools

use anyhow::{Context, Result};
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use std::net::SocketAddr;
use tower_http::trace::TraceLayer;
use tracing::{error, info};

use crate::health::HealthReport;
use crate::metrics;
use crate::orchestrator::Orchestrator;

/// Build the router without binding a socket
pub fn router(orchestrator: Orchestrator) -> Router {
    Router::new()
        .route("/metrics", get(metrics_handler))
        .route("/health", get(health_handler))
        .route("/tools/{name}", get(tool_handler))
        .layer(TraceLayer::new_for_http())
        .with_state(orchestrator)
}

/// Start the metrics HTTP server
///
/// # Arguments
/// * `port` - Port to listen on (default 9090)
/// * `orchestrator` - Gateway whose tools are reported
pub async fn start_metrics_server(port: u16, orchestrator: Orchestrator) -> Result<()> {
    metrics::init().context("Failed to initialize metrics")?;

    let app = router(orchestrator);
    let addr = SocketAddr::from(([0, 0, 0, 0], port));

    info!("Starting metrics server on {}", addr);

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .context("Failed to bind metrics server")?;

    axum::serve(listener, app)
        .await
        .context("Metrics server error")?;

    Ok(())
}

/// Metrics endpoint handler
async fn metrics_handler() -> Response {
    match metrics::gather_metrics() {
        Ok(metrics_text) => (StatusCode::OK, metrics_text).into_response(),
        Err(e) => {
            error!("Failed to gather metrics: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("Error gathering metrics: {}", e),
            )
                .into_response()
        }
    }
}

/// Health check endpoint
async fn health_handler(State(orchestrator): State<Orchestrator>) -> Response {
    let report = HealthReport::collect(&orchestrator);
    let status = if report.is_healthy() {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (status, Json(report)).into_response()
}

/// Tool description endpoint
async fn tool_handler(
    State(orchestrator): State<Orchestrator>,
    Path(name): Path<String>,
) -> Response {
    match orchestrator.describe(&name) {
        Some(description) => Json(description).into_response(),
        None => (StatusCode::NOT_FOUND, format!("Unknown tool '{}'", name)).into_response(),
    }
}
