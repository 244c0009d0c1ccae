use std::collections::HashMap;

use chrono::{DateTime, Duration, Utc};
use parking_lot::RwLock;
use tracing::info;

use crate::health::{AgentStatus, DriftReport, NodeHealth};

/// Tracked state for a single agent, owned exclusively by the registry.
#[derive(Debug, Clone)]
pub struct AgentRecord {
    pub node_id: String,
    pub health: Option<NodeHealth>,
    pub drift_report: Option<DriftReport>,
    pub last_seen: DateTime<Utc>,
    pub pending_healing_command: Option<String>,
}

impl AgentRecord {
    fn new(node_id: impl Into<String>) -> Self {
        Self {
            node_id: node_id.into(),
            health: None,
            drift_report: None,
            last_seen: Utc::now(),
            pending_healing_command: None,
        }
    }

    pub fn is_stale(&self, stale_threshold: Duration) -> bool {
        Utc::now() - self.last_seen > stale_threshold
    }
}

/// Single-writer registry of every agent in the fleet, read and written
/// under one lock so fleet-wide queries always see a consistent snapshot.
#[derive(Default)]
pub struct Registry {
    agents: RwLock<HashMap<String, AgentRecord>>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, node_id: &str) -> AgentRecord {
        let mut agents = self.agents.write();
        if !agents.contains_key(node_id) {
            agents.insert(node_id.to_string(), AgentRecord::new(node_id));
            info!(node_id, "agent registered");
        }
        agents[node_id].clone()
    }

    pub fn update_health(&self, health: NodeHealth) {
        self.register(&health.node_id);
        let mut agents = self.agents.write();
        if let Some(record) = agents.get_mut(&health.node_id) {
            record.last_seen = Utc::now();
            record.health = Some(health);
        }
    }

    pub fn update_drift(&self, report: DriftReport) {
        self.register(&report.node_id);
        let mut agents = self.agents.write();
        if let Some(record) = agents.get_mut(&report.node_id) {
            record.last_seen = Utc::now();
            record.drift_report = Some(report);
        }
    }

    pub fn set_healing_command(&self, node_id: &str, command: impl Into<String>) {
        self.register(node_id);
        let mut agents = self.agents.write();
        if let Some(record) = agents.get_mut(node_id) {
            record.pending_healing_command = Some(command.into());
        }
    }

    pub fn pop_healing_command(&self, node_id: &str) -> Option<String> {
        let mut agents = self.agents.write();
        agents.get_mut(node_id).and_then(|r| r.pending_healing_command.take())
    }

    pub fn acknowledge_healing(&self, node_id: &str, success: bool) {
        let mut agents = self.agents.write();
        if let Some(record) = agents.get_mut(node_id) {
            record.last_seen = Utc::now();
            if success {
                record.drift_report = None;
                info!(node_id, "agent healed successfully");
            } else {
                tracing::warn!(node_id, "agent healing failed");
            }
        }
    }

    pub fn get_all(&self) -> Vec<AgentRecord> {
        self.agents.read().values().cloned().collect()
    }

    pub fn get(&self, node_id: &str) -> Option<AgentRecord> {
        self.agents.read().get(node_id).cloned()
    }

    pub fn remove(&self, node_id: &str) {
        self.agents.write().remove(node_id);
    }

    pub fn get_healthy(&self, stale_threshold: Duration) -> Vec<AgentRecord> {
        self.agents
            .read()
            .values()
            .filter(|r| matches!(&r.health, Some(h) if h.status == AgentStatus::Healthy) && !r.is_stale(stale_threshold))
            .cloned()
            .collect()
    }

    pub fn get_drifted(&self, stale_threshold: Duration) -> Vec<AgentRecord> {
        self.agents
            .read()
            .values()
            .filter(|r| matches!(&r.health, Some(h) if h.status == AgentStatus::DriftDetected) && !r.is_stale(stale_threshold))
            .cloned()
            .collect()
    }

    pub fn get_stale(&self, stale_threshold: Duration) -> Vec<AgentRecord> {
        self.agents.read().values().filter(|r| r.is_stale(stale_threshold)).cloned().collect()
    }

    pub fn total_count(&self) -> usize {
        self.agents.read().len()
    }

    pub fn healthy_count(&self, stale_threshold: Duration) -> usize {
        self.get_healthy(stale_threshold).len()
    }

    pub fn drifted_count(&self, stale_threshold: Duration) -> usize {
        self.get_drifted(stale_threshold).len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn register_is_idempotent() {
        let registry = Registry::new();
        registry.register("web-1");
        registry.register("web-1");
        assert_eq!(registry.total_count(), 1);
    }

    #[test]
    fn healing_command_round_trips_once() {
        let registry = Registry::new();
        registry.set_healing_command("web-1", "systemctl restart openclaw");
        assert_eq!(registry.pop_healing_command("web-1").as_deref(), Some("systemctl restart openclaw"));
        assert_eq!(registry.pop_healing_command("web-1"), None);
    }

    #[test]
    fn acknowledge_healing_clears_drift_on_success() {
        let registry = Registry::new();
        registry.update_drift(DriftReport {
            node_id: "web-1".to_string(),
            expected: chimera_types::Fingerprint::parse("abc123def456abc123def456abc1234").unwrap(),
            actual: chimera_types::Fingerprint::parse("deadbeefdeadbeefdeadbeefdeadbeef").unwrap(),
            severity: chimera_types::Severity::High,
            detected_at: Utc::now(),
            details: "mismatch".to_string(),
        });
        registry.acknowledge_healing("web-1", true);
        assert!(registry.get("web-1").unwrap().drift_report.is_none());
    }

    #[test]
    fn stale_threshold_gates_health_and_drift_queries() {
        let registry = Registry::new();
        registry.update_health(NodeHealth::new("web-1", AgentStatus::Healthy));
        assert_eq!(registry.healthy_count(Duration::seconds(60)), 1);
        assert_eq!(registry.get_stale(Duration::seconds(0)).len(), 1);
    }
}
