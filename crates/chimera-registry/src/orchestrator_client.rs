use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;

use crate::health::{DriftReport, NodeHealth};
use crate::registry::Registry;

#[derive(Debug, Error, Clone)]
pub enum OrchestratorClientError {
    #[error("transport error talking to orchestrator: {0}")]
    TransportError(String),
}

/// Agent-to-orchestrator protocol: report health and drift, receive and
/// acknowledge healing commands.
#[async_trait]
pub trait OrchestratorClient: Send + Sync {
    async fn report_health(&self, health: NodeHealth) -> Result<(), OrchestratorClientError>;
    async fn report_drift(&self, report: DriftReport) -> Result<(), OrchestratorClientError>;
    async fn fetch_healing_command(&self, node_id: &str) -> Result<Option<String>, OrchestratorClientError>;
    async fn acknowledge_healing(&self, node_id: &str, success: bool) -> Result<(), OrchestratorClientError>;
}

/// Client for when the agent and orchestrator share a process — calls
/// straight through to the registry, never fails. Holds the registry via
/// `Arc` so an agent built on top of this client can be spawned onto its
/// own task; the edge is one-way, the registry never references its clients.
pub struct InProcessOrchestratorClient {
    registry: Arc<Registry>,
}

impl InProcessOrchestratorClient {
    pub fn new(registry: Arc<Registry>) -> Self {
        Self { registry }
    }
}

#[async_trait]
impl OrchestratorClient for InProcessOrchestratorClient {
    async fn report_health(&self, health: NodeHealth) -> Result<(), OrchestratorClientError> {
        self.registry.update_health(health);
        Ok(())
    }

    async fn report_drift(&self, report: DriftReport) -> Result<(), OrchestratorClientError> {
        self.registry.update_drift(report);
        Ok(())
    }

    async fn fetch_healing_command(&self, node_id: &str) -> Result<Option<String>, OrchestratorClientError> {
        Ok(self.registry.pop_healing_command(node_id))
    }

    async fn acknowledge_healing(&self, node_id: &str, success: bool) -> Result<(), OrchestratorClientError> {
        self.registry.acknowledge_healing(node_id, success);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::health::AgentStatus;

    #[tokio::test]
    async fn in_process_client_routes_straight_to_registry() {
        let registry = Arc::new(Registry::new());
        let client = InProcessOrchestratorClient::new(registry.clone());
        client.report_health(NodeHealth::new("web-1", AgentStatus::Healthy)).await.unwrap();
        assert!(registry.get("web-1").unwrap().health.is_some());
    }
}
