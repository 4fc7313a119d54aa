//! scangate
//!
//! A gateway that lets an orchestrating caller run a curated set of network
//! security scanners against pre-approved lab targets only. Every call is
//! validated, isolated per tool behind a circuit breaker and a concurrency
//! cap, and executed without a shell in a scrubbed environment.
//!
//! ```no_run
//! use scangate::orchestrator::Orchestrator;
//! use scangate::registry::ToolRegistry;
//! use scangate::tools::{InvocationRequest, SandboxedExecutor};
//! use std::sync::Arc;
//!
//! # async fn demo() -> anyhow::Result<()> {
//! let registry = Arc::new(ToolRegistry::builtin()?);
//! let gateway = Orchestrator::new(registry, Arc::new(SandboxedExecutor::new()));
//!
//! let result = gateway
//!     .execute("nmap", InvocationRequest::new("10.0.0.5", "-sV -p 22,80"))
//!     .await;
//! println!("{}", result.summary());
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod health;
pub mod line_protocol;
pub mod logging;
pub mod metrics;
pub mod metrics_server;
pub mod orchestrator;
pub mod registry;
pub mod tools;
