//! JSON-lines transport
//!
//! One JSON object per line in, one per line out. Requests carry an `op`
//! tag:
//!
//! ```text
//! {"op":"execute","tool":"nmap","target":"10.0.0.5","arguments":"-p 22"}
//! {"op":"describe","tool":"gobuster"}
//! {"op":"list"}
//! {"op":"health"}
//! ```
//!
//! Each `execute` runs in its own task, so a slow scan does not hold up
//! the lines behind it; responses may therefore arrive out of order and
//! carry the correlation id to match them up. A single writer task owns the
//! output so lines are never interleaved.

use crate::health::HealthReport;
use crate::orchestrator::{Orchestrator, ToolDescription};
use crate::tools::{InvocationRequest, InvocationResult};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;
use tokio::task::{JoinError, JoinSet};
use tracing::{debug, warn};

const RESPONSE_QUEUE: usize = 64;

/// Incoming line
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum LineRequest {
    Execute {
        tool: String,
        #[serde(flatten)]
        request: InvocationRequest,
    },
    Describe {
        tool: String,
    },
    List,
    Health,
}

/// Outgoing line
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum LineResponse {
    Execute {
        tool: String,
        #[serde(flatten)]
        result: InvocationResult,
    },
    Describe {
        #[serde(flatten)]
        description: ToolDescription,
    },
    List {
        tools: Vec<String>,
    },
    Health {
        #[serde(flatten)]
        report: HealthReport,
    },
    Error {
        message: String,
    },
}

/// Answer the requests that need no process
fn answer(orchestrator: &Orchestrator, request: LineRequest) -> LineResponse {
    match request {
        LineRequest::Describe { tool } => match orchestrator.describe(&tool) {
            Some(description) => LineResponse::Describe { description },
            None => LineResponse::Error {
                message: format!("Unknown tool '{}'", tool),
            },
        },
        LineRequest::List => LineResponse::List {
            tools: orchestrator.tool_names(),
        },
        LineRequest::Health => LineResponse::Health {
            report: HealthReport::collect(orchestrator),
        },
        LineRequest::Execute { tool, .. } => LineResponse::Error {
            message: format!("execute for '{}' must run asynchronously", tool),
        },
    }
}

/// Serve requests from `reader` until EOF, then wait for in-flight calls
pub async fn serve<R, W>(orchestrator: Orchestrator, reader: R, writer: W) -> Result<()>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin + Send + 'static,
{
    let (tx, mut rx) = mpsc::channel::<LineResponse>(RESPONSE_QUEUE);

    let writer_task = tokio::spawn(async move {
        let mut writer = writer;
        while let Some(response) = rx.recv().await {
            let mut line =
                serde_json::to_vec(&response).context("Failed to encode response")?;
            line.push(b'\n');
            writer
                .write_all(&line)
                .await
                .context("Failed to write response")?;
            writer.flush().await.context("Failed to flush response")?;
        }
        Ok::<_, anyhow::Error>(())
    });

    let mut calls = JoinSet::new();
    let mut lines = reader.lines();
    while let Some(line) = lines.next_line().await.context("Failed to read request")? {
        reap_finished(&mut calls);
        if line.trim().is_empty() {
            continue;
        }

        let response = match serde_json::from_str::<LineRequest>(&line) {
            Ok(LineRequest::Execute { tool, request }) => {
                let orchestrator = orchestrator.clone();
                let tx = tx.clone();
                calls.spawn(async move {
                    let result = orchestrator.execute(&tool, request).await;
                    // Receiver only goes away if the writer failed.
                    let _ = tx.send(LineResponse::Execute { tool, result }).await;
                });
                continue;
            }
            Ok(request) => {
                debug!(?request, "Line request");
                answer(&orchestrator, request)
            }
            Err(e) => {
                warn!("Malformed request line: {}", e);
                LineResponse::Error {
                    message: format!("invalid request: {}", e),
                }
            }
        };

        if tx.send(response).await.is_err() {
            break;
        }
    }

    while let Some(finished) = calls.join_next().await {
        log_join_failure(finished);
    }
    drop(tx);

    writer_task.await.context("Response writer panicked")?
}

/// Drop completed call tasks so a long session does not accumulate them
fn reap_finished(calls: &mut JoinSet<()>) -> usize {
    let mut reaped = 0;
    while let Some(finished) = calls.try_join_next() {
        log_join_failure(finished);
        reaped += 1;
    }
    reaped
}

fn log_join_failure(finished: Result<(), JoinError>) {
    if let Err(e) = finished {
        warn!("Line call task failed: {}", e);
    }
}
