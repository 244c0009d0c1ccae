//! Drift detection and analysis service: not just whether a node has
//! drifted, but how severe it is, what to do about it, and what else
//! might be affected.

#![forbid(unsafe_code)]

use std::collections::HashMap;

use chimera_ports::DriftDetector;
use chimera_types::{Fingerprint, Node, Severity};
use chrono::{DateTime, Utc};
use futures_util::future::join_all;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HealingAction {
    None,
    Rollback,
    Rebuild,
    RestartService,
}

/// Comprehensive drift analysis for a single node.
#[derive(Debug, Clone)]
pub struct DriftAnalysis {
    pub node: Node,
    pub expected: Fingerprint,
    pub actual: Option<Fingerprint>,
    pub severity: Severity,
    pub healing_action: HealingAction,
    pub blast_radius: Vec<Node>,
    pub recommended_fix: String,
    pub detected_at: DateTime<Utc>,
}

impl DriftAnalysis {
    pub fn needs_healing(&self) -> bool {
        self.healing_action != HealingAction::None
    }

    pub fn is_critical(&self) -> bool {
        self.severity == Severity::Critical
    }
}

/// Domain service wrapping a [`DriftDetector`] capability with severity
/// classification, healing-action selection, and blast-radius analysis.
pub struct DriftDetectionService<D: DriftDetector> {
    detector: D,
}

impl<D: DriftDetector> DriftDetectionService<D> {
    pub fn new(detector: D) -> Self {
        Self { detector }
    }

    pub async fn analyze(&self, node: &Node, expected: &Fingerprint) -> DriftAnalysis {
        self.analyze_with_fleet(node, expected, &[]).await
    }

    async fn analyze_with_fleet(&self, node: &Node, expected: &Fingerprint, all_nodes: &[Node]) -> DriftAnalysis {
        let report = match self.detector.check_node(node, expected).await {
            Ok(report) => report,
            Err(_) => {
                return DriftAnalysis {
                    node: node.clone(),
                    expected: expected.clone(),
                    actual: None,
                    severity: Severity::Critical,
                    healing_action: HealingAction::Rollback,
                    blast_radius: calculate_blast_radius(node, all_nodes),
                    recommended_fix: fix_recommendation(HealingAction::Rollback, node),
                    detected_at: Utc::now(),
                };
            }
        };

        if report.is_congruent {
            return DriftAnalysis {
                node: node.clone(),
                expected: expected.clone(),
                actual: Some(expected.clone()),
                severity: Severity::Low,
                healing_action: HealingAction::None,
                blast_radius: Vec::new(),
                recommended_fix: "No action needed - system is congruent.".to_string(),
                detected_at: Utc::now(),
            };
        }

        let actual = report.actual;
        let severity = calculate_severity(&actual);
        let healing_action = determine_healing_action(severity);
        DriftAnalysis {
            node: node.clone(),
            expected: expected.clone(),
            recommended_fix: fix_recommendation(healing_action, node),
            blast_radius: calculate_blast_radius(node, all_nodes),
            severity,
            healing_action,
            actual,
            detected_at: Utc::now(),
        }
    }

    /// Analyzes every node concurrently, sorted most-to-least severe.
    pub async fn analyze_fleet(&self, nodes: &[Node], expected: &Fingerprint) -> Vec<DriftAnalysis> {
        let mut analyses: Vec<DriftAnalysis> =
            join_all(nodes.iter().map(|n| self.analyze_with_fleet(n, expected, nodes))).await;
        analyses.sort_by(|a, b| b.severity.cmp(&a.severity));
        analyses
    }

    /// Groups analyses by recommended action, always returning all four
    /// buckets even when a bucket is empty.
    pub fn healing_plan(&self, analyses: &[DriftAnalysis]) -> HashMap<HealingAction, Vec<DriftAnalysis>> {
        let mut plan = HashMap::new();
        plan.insert(HealingAction::Rollback, Vec::new());
        plan.insert(HealingAction::Rebuild, Vec::new());
        plan.insert(HealingAction::RestartService, Vec::new());
        plan.insert(HealingAction::None, Vec::new());

        for analysis in analyses {
            plan.entry(analysis.healing_action).or_default().push(analysis.clone());
        }
        plan
    }
}

fn calculate_severity(actual: &Option<Fingerprint>) -> Severity {
    match actual {
        None => Severity::Critical,
        Some(fp) if fp.is_zero_sentinel() => Severity::High,
        Some(_) => Severity::Medium,
    }
}

fn determine_healing_action(severity: Severity) -> HealingAction {
    match severity {
        Severity::Critical => HealingAction::Rollback,
        Severity::High => HealingAction::Rebuild,
        Severity::Medium => HealingAction::RestartService,
        Severity::Low => HealingAction::None,
    }
}

fn fix_recommendation(action: HealingAction, node: &Node) -> String {
    match action {
        HealingAction::None => "No fix required.".to_string(),
        HealingAction::Rollback => format!(
            "Rollback node {} to previous generation. Critical drift detected - immediate rollback recommended.",
            node.host()
        ),
        HealingAction::Rebuild => format!(
            "Rebuild node {} with expected configuration. Significant drift detected - full rebuild required.",
            node.host()
        ),
        HealingAction::RestartService => format!(
            "Restart affected services on {}. Minor drift detected - service restart should resolve.",
            node.host()
        ),
    }
}

/// Nodes sharing `node`'s host-prefix grouping, excluding `node` itself.
fn calculate_blast_radius(node: &Node, all_nodes: &[Node]) -> Vec<Node> {
    let prefix = node.host_prefix();
    all_nodes.iter().filter(|n| *n != node && n.host_prefix() == prefix).cloned().collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use chimera_ports::DriftDetectorError;
    use chimera_types::CongruenceReport;

    struct FakeDetector {
        actual: Option<Fingerprint>,
    }

    #[async_trait]
    impl DriftDetector for FakeDetector {
        async fn check_node(&self, node: &Node, expected: &Fingerprint) -> Result<CongruenceReport, DriftDetectorError> {
            Ok(match &self.actual {
                Some(fp) if fp == expected => CongruenceReport::congruent(node.clone(), fp.clone()),
                other => CongruenceReport::drifted(node.clone(), expected.clone(), other.clone(), "mismatch"),
            })
        }

        async fn get_actual_fingerprint(&self, _node: &Node) -> Result<Option<Fingerprint>, DriftDetectorError> {
            Ok(self.actual.clone())
        }
    }

    fn node(host: &str) -> Node {
        Node::parse(host).unwrap()
    }

    fn fp(s: &str) -> Fingerprint {
        Fingerprint::parse(s).unwrap()
    }

    #[tokio::test]
    async fn congruent_node_is_low_severity_no_action() {
        let expected = fp("abc123def456abc123def456abc1234");
        let service = DriftDetectionService::new(FakeDetector { actual: Some(expected.clone()) });
        let analysis = service.analyze(&node("web-1"), &expected).await;
        assert_eq!(analysis.severity, Severity::Low);
        assert!(!analysis.needs_healing());
    }

    #[tokio::test]
    async fn unreachable_node_is_critical_rollback() {
        let expected = fp("abc123def456abc123def456abc1234");
        let service = DriftDetectionService::new(FakeDetector { actual: None });
        let analysis = service.analyze(&node("web-1"), &expected).await;
        assert_eq!(analysis.severity, Severity::Critical);
        assert_eq!(analysis.healing_action, HealingAction::Rollback);
    }

    #[tokio::test]
    async fn zero_sentinel_is_high_rebuild() {
        let expected = fp("abc123def456abc123def456abc1234");
        let sentinel = fp(&"0".repeat(32));
        let service = DriftDetectionService::new(FakeDetector { actual: Some(sentinel) });
        let analysis = service.analyze(&node("web-1"), &expected).await;
        assert_eq!(analysis.severity, Severity::High);
        assert_eq!(analysis.healing_action, HealingAction::Rebuild);
    }

    #[tokio::test]
    async fn mismatch_is_medium_restart() {
        let expected = fp("abc123def456abc123def456abc1234");
        let other = fp("deadbeefdeadbeefdeadbeefdeadbeef");
        let service = DriftDetectionService::new(FakeDetector { actual: Some(other) });
        let analysis = service.analyze(&node("web-1"), &expected).await;
        assert_eq!(analysis.severity, Severity::Medium);
        assert_eq!(analysis.healing_action, HealingAction::RestartService);
    }

    #[tokio::test]
    async fn fleet_analysis_sorts_most_severe_first() {
        let expected = fp("abc123def456abc123def456abc1234");
        let service = DriftDetectionService::new(FakeDetector { actual: None });
        let analyses = service.analyze_fleet(&[node("web-1"), node("web-2")], &expected).await;
        assert!(analyses.iter().all(|a| a.severity == Severity::Critical));
    }

    #[test]
    fn blast_radius_groups_by_host_prefix() {
        let fleet = vec![node("web-1.internal"), node("web-2.internal"), node("db-1.internal")];
        let radius = calculate_blast_radius(&node("web-3.internal"), &fleet);
        assert_eq!(radius.len(), 2);
    }

    #[test]
    fn healing_plan_has_all_four_buckets() {
        let expected = fp("abc123def456abc123def456abc1234");
        let analysis = DriftAnalysis {
            node: node("web-1"),
            expected: expected.clone(),
            actual: None,
            severity: Severity::Critical,
            healing_action: HealingAction::Rollback,
            blast_radius: vec![],
            recommended_fix: String::new(),
            detected_at: Utc::now(),
        };
        let service = DriftDetectionService::new(FakeDetector { actual: None });
        let plan = service.healing_plan(&[analysis]);
        assert_eq!(plan.len(), 4);
        assert_eq!(plan[&HealingAction::Rollback].len(), 1);
        assert!(plan[&HealingAction::None].is_empty());
    }
}
