use chimera_types::{Fingerprint, Severity};
use chrono::{DateTime, Utc};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AgentStatus {
    Healthy,
    Degraded,
    DriftDetected,
    Healing,
    Unreachable,
    Unknown,
}

/// Health report an agent emits on every heartbeat.
#[derive(Debug, Clone, PartialEq)]
pub struct NodeHealth {
    pub node_id: String,
    pub status: AgentStatus,
    pub timestamp: DateTime<Utc>,
    pub cpu_percent: f64,
    pub memory_percent: f64,
    pub disk_percent: f64,
    pub current_fingerprint: Option<Fingerprint>,
    pub expected_fingerprint: Option<Fingerprint>,
}

impl NodeHealth {
    pub fn new(node_id: impl Into<String>, status: AgentStatus) -> Self {
        Self {
            node_id: node_id.into(),
            status,
            timestamp: Utc::now(),
            cpu_percent: 0.0,
            memory_percent: 0.0,
            disk_percent: 0.0,
            current_fingerprint: None,
            expected_fingerprint: None,
        }
    }

    pub fn is_healthy(&self) -> bool {
        self.status == AgentStatus::Healthy
    }

    /// True only when both fingerprints are known and they disagree.
    pub fn has_drift(&self) -> bool {
        match (&self.current_fingerprint, &self.expected_fingerprint) {
            (Some(current), Some(expected)) => current != expected,
            _ => false,
        }
    }
}

/// Drift observed directly by an agent on its own node.
#[derive(Debug, Clone, PartialEq)]
pub struct DriftReport {
    pub node_id: String,
    pub expected: Fingerprint,
    pub actual: Fingerprint,
    pub severity: Severity,
    pub detected_at: DateTime<Utc>,
    pub details: String,
}

impl DriftReport {
    pub fn is_drift(&self) -> bool {
        self.expected != self.actual
    }
}

/// Same severity rule the drift service uses: an all-zero sentinel hash
/// is HIGH (the node never built anything), any other mismatch is MEDIUM.
/// Both fingerprints are confirmed present before this is called, so the
/// absent-fingerprint (CRITICAL) case doesn't arise here.
pub fn calculate_drift_severity(actual: &Fingerprint) -> Severity {
    if actual.is_zero_sentinel() {
        Severity::High
    } else {
        Severity::Medium
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fp(s: &str) -> Fingerprint {
        Fingerprint::parse(s).unwrap()
    }

    #[test]
    fn has_drift_requires_both_fingerprints_present_and_unequal() {
        let mut health = NodeHealth::new("web-1", AgentStatus::Healthy);
        assert!(!health.has_drift());
        health.current_fingerprint = Some(fp("abc123def456abc123def456abc1234"));
        assert!(!health.has_drift());
        health.expected_fingerprint = Some(fp("abc123def456abc123def456abc1234"));
        assert!(!health.has_drift());
        health.expected_fingerprint = Some(fp("deadbeefdeadbeefdeadbeefdeadbeef"));
        assert!(health.has_drift());
    }

    #[test]
    fn zero_sentinel_is_high_other_mismatch_is_medium() {
        assert_eq!(calculate_drift_severity(&fp(&"0".repeat(32))), Severity::High);
        assert_eq!(calculate_drift_severity(&fp("abc123def456abc123def456abc1234")), Severity::Medium);
    }
}
