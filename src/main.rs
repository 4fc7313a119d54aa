// scangate - Main Entry Point
//
// CLI over the execution gateway:
// - run: one invocation, result as JSON on stdout, exit code mirrored
// - describe / list / health: introspection
// - serve: JSON-lines on stdin/stdout, optional metrics endpoint

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use scangate::config::Config;
use scangate::health::HealthReport;
use scangate::line_protocol;
use scangate::logging;
use scangate::metrics::{MetricsSink, NoopMetrics, PrometheusMetrics};
use scangate::metrics_server;
use scangate::orchestrator::Orchestrator;
use scangate::tools::InvocationRequest;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use tokio::io::BufReader;
use tracing::{error, info};

/// scangate: sandboxed gateway for network security scanners
#[derive(Parser, Debug)]
#[command(name = "scangate")]
#[command(version)]
#[command(about = "Run curated security scanners against approved lab targets", long_about = None)]
struct Args {
    /// Configuration file (default: ~/.config/scangate/config.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run one tool once against one target
    Run {
        /// Tool name (see `list`)
        tool: String,

        /// Private IPv4 address, CIDR, or lab hostname
        target: String,

        /// Argument string passed to the tool after validation
        #[arg(long, default_value = "", allow_hyphen_values = true)]
        args: String,

        /// Timeout override in seconds
        #[arg(long)]
        timeout: Option<u64>,

        /// Correlation id to stamp on the result
        #[arg(long)]
        correlation_id: Option<String>,
    },
    /// Show a tool's contract and breaker state
    Describe {
        /// Tool name
        tool: String,
    },
    /// List registered tools
    List,
    /// Print the health report; exits non-zero when degraded
    Health,
    /// Serve JSON-lines requests on stdin/stdout
    Serve {
        /// Also expose /metrics, /health and /tools on this port
        #[arg(long)]
        metrics_port: Option<u16>,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();
    match run(args).await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(args: Args) -> Result<ExitCode> {
    let config = match &args.config {
        Some(path) => Config::load_from_path(path),
        None => Config::load(),
    }
    .context("Failed to load configuration")?;

    logging::init(&config.logging, args.verbose)?;

    let serving_metrics = matches!(
        args.command,
        Commands::Serve {
            metrics_port: Some(_)
        }
    );
    let sink: Arc<dyn MetricsSink> = if config.metrics.enabled || serving_metrics {
        Arc::new(PrometheusMetrics::new().context("Failed to initialize metrics")?)
    } else {
        Arc::new(NoopMetrics)
    };
    let orchestrator =
        Orchestrator::from_config(&config, sink).context("Invalid tool configuration")?;

    match args.command {
        Commands::Run {
            tool,
            target,
            args,
            timeout,
            correlation_id,
        } => {
            let mut request = InvocationRequest::new(target, args);
            if let Some(secs) = timeout {
                request = request.with_timeout_secs(secs);
            }
            if let Some(id) = correlation_id {
                request = request.with_correlation_id(id);
            }

            let result = orchestrator.execute(&tool, request).await;
            println!("{}", serde_json::to_string_pretty(&result)?);
            Ok(exit_code(result.exit_code))
        }
        Commands::Describe { tool } => {
            let description = orchestrator
                .describe(&tool)
                .with_context(|| format!("Unknown tool '{}'", tool))?;
            println!("{}", serde_json::to_string_pretty(&description)?);
            Ok(ExitCode::SUCCESS)
        }
        Commands::List => {
            for name in orchestrator.tool_names() {
                println!("{}", name);
            }
            Ok(ExitCode::SUCCESS)
        }
        Commands::Health => {
            let report = HealthReport::collect(&orchestrator);
            println!("{}", serde_json::to_string_pretty(&report)?);
            Ok(if report.is_healthy() {
                ExitCode::SUCCESS
            } else {
                ExitCode::FAILURE
            })
        }
        Commands::Serve { metrics_port } => {
            let port = metrics_port.or(config.metrics.enabled.then_some(config.metrics.port));
            if let Some(port) = port {
                let server = orchestrator.clone();
                tokio::spawn(async move {
                    if let Err(e) = metrics_server::start_metrics_server(port, server).await {
                        error!("Metrics server stopped: {:#}", e);
                    }
                });
            }

            info!(tools = ?orchestrator.tool_names(), "Serving JSON-lines on stdin/stdout");
            let stdin = BufReader::new(tokio::io::stdin());
            line_protocol::serve(orchestrator, stdin, tokio::io::stdout()).await?;
            Ok(ExitCode::SUCCESS)
        }
    }
}

/// Process exit status for a result code; out-of-range codes become 1
fn exit_code(code: i32) -> ExitCode {
    u8::try_from(code).map(ExitCode::from).unwrap_or(ExitCode::FAILURE)
}
