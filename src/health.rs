//! Health reporting
//!
//! A point-in-time view of every tool class, for `/health`, the line
//! protocol and the `health` subcommand.

use crate::orchestrator::Orchestrator;
use crate::tools::CircuitState;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    /// At least one circuit breaker is open
    Degraded,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolHealth {
    pub name: String,
    pub circuit_state: CircuitState,
    pub executable_resolvable: bool,
    pub in_flight: usize,
    pub capacity: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthReport {
    pub status: HealthStatus,
    pub tools: Vec<ToolHealth>,
}

impl HealthReport {
    pub fn collect(orchestrator: &Orchestrator) -> Self {
        let tools: Vec<ToolHealth> = orchestrator
            .registry()
            .iter()
            .map(|class| ToolHealth {
                name: class.name().to_string(),
                circuit_state: class.breaker().state(),
                executable_resolvable: orchestrator.executable_resolvable(class.name()),
                in_flight: class.governor().in_flight(),
                capacity: class.governor().capacity(),
            })
            .collect();

        let status = if tools.iter().any(|t| t.circuit_state == CircuitState::Open) {
            HealthStatus::Degraded
        } else {
            HealthStatus::Healthy
        };

        Self { status, tools }
    }

    pub fn is_healthy(&self) -> bool {
        self.status == HealthStatus::Healthy
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::ToolRegistry;
    use crate::tools::SandboxedExecutor;
    use std::sync::Arc;

    fn orchestrator() -> Orchestrator {
        Orchestrator::new(
            Arc::new(ToolRegistry::builtin().unwrap()),
            Arc::new(SandboxedExecutor::new()),
        )
    }

    #[test]
    fn test_healthy_by_default() {
        let report = HealthReport::collect(&orchestrator());
        assert!(report.is_healthy());
        assert_eq!(report.tools.len(), 5);
        assert!(report
            .tools
            .iter()
            .all(|t| t.circuit_state == CircuitState::Closed && t.in_flight == 0));
    }

    #[test]
    fn test_open_breaker_degrades() {
        let orchestrator = orchestrator();
        orchestrator.force_open("hydra");
        let report = HealthReport::collect(&orchestrator);
        assert_eq!(report.status, HealthStatus::Degraded);

        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["status"], "degraded");
        let hydra = report.tools.iter().find(|t| t.name == "hydra").unwrap();
        assert_eq!(hydra.circuit_state, CircuitState::Open);
    }
}
