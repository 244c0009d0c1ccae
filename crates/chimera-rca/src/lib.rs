//! Heuristic root-cause analysis over correlated drift and health
//! signals. No machine learning here — every conclusion traces back to
//! one of a fixed set of temporal, spatial, or severity rules.

#![forbid(unsafe_code)]

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fmt;

use chimera_registry::{AgentStatus, DriftReport, NodeHealth};
use chimera_types::Severity;
use chrono::{DateTime, Duration, Utc};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CauseCategory {
    LocalIssue,
    UpstreamConfigChange,
    DeployRelated,
    NetworkPartition,
    Unknown,
}

impl fmt::Display for CauseCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::LocalIssue => "local issue",
            Self::UpstreamConfigChange => "upstream config change",
            Self::DeployRelated => "deploy related",
            Self::NetworkPartition => "network partition",
            Self::Unknown => "unknown",
        };
        write!(f, "{s}")
    }
}

/// A single contributing signal in the causal analysis, weighted 0.0-1.0.
#[derive(Debug, Clone, PartialEq)]
pub struct CausalFactor {
    pub description: String,
    pub weight: f64,
    pub evidence: String,
}

impl CausalFactor {
    fn new(description: impl Into<String>, weight: f64, evidence: impl Into<String>) -> Self {
        Self {
            description: description.into(),
            weight,
            evidence: evidence.into(),
        }
    }
}

/// An ordered narrative from root cause (first step) to observed symptom
/// (last step).
#[derive(Debug, Clone, PartialEq)]
pub struct CausalChain {
    pub steps: Vec<String>,
    pub affected_node_ids: BTreeSet<String>,
}

impl CausalChain {
    pub fn root(&self) -> &str {
        self.steps.first().map(String::as_str).unwrap_or("")
    }

    pub fn symptom(&self) -> &str {
        self.steps.last().map(String::as_str).unwrap_or("")
    }

    pub fn depth(&self) -> usize {
        self.steps.len()
    }
}

/// Complete root-cause analysis result.
#[derive(Debug, Clone, PartialEq)]
pub struct RootCauseReport {
    pub probable_cause: CauseCategory,
    pub confidence: f64,
    pub summary: String,
    pub causal_chain: CausalChain,
    pub contributing_factors: Vec<CausalFactor>,
    pub affected_node_ids: BTreeSet<String>,
    pub analyzed_at: DateTime<Utc>,
}

impl RootCauseReport {
    pub fn is_high_confidence(&self) -> bool {
        self.confidence >= 0.7
    }
}

fn severity_weight(severity: Severity) -> f64 {
    match severity {
        Severity::Low => 0.1,
        Severity::Medium => 0.3,
        Severity::High => 0.7,
        Severity::Critical => 1.0,
    }
}

/// Heuristic analyzer correlating drift reports, node health, deployment
/// timestamps, and node-group membership into a probable root cause.
pub struct RootCauseAnalyzer {
    temporal_window: Duration,
    upstream_threshold_ratio: f64,
}

impl Default for RootCauseAnalyzer {
    fn default() -> Self {
        Self {
            temporal_window: Duration::seconds(60),
            upstream_threshold_ratio: 0.5,
        }
    }
}

impl RootCauseAnalyzer {
    pub fn new(temporal_window_seconds: i64, upstream_threshold_ratio: f64) -> Self {
        Self {
            temporal_window: Duration::seconds(temporal_window_seconds),
            upstream_threshold_ratio,
        }
    }

    pub fn analyze(
        &self,
        drift_reports: &[DriftReport],
        health_snapshots: &[NodeHealth],
        deploy_timestamps: Option<&[DateTime<Utc>]>,
        node_groups: Option<&HashMap<String, String>>,
    ) -> RootCauseReport {
        if drift_reports.is_empty() {
            return self.empty_report();
        }

        let mut factors = Vec::new();

        let clusters = self.find_temporal_clusters(drift_reports);
        factors.extend(self.evaluate_temporal(&clusters, drift_reports));

        if let Some(groups) = node_groups {
            factors.extend(self.evaluate_spatial(drift_reports, groups));
        }

        if let Some(deploys) = deploy_timestamps {
            factors.extend(self.evaluate_deploy_proximity(drift_reports, deploys));
        }

        factors.extend(self.evaluate_health_signals(health_snapshots));
        factors.extend(self.evaluate_severity(drift_reports));

        let cause = self.classify_cause(&factors, drift_reports);
        let confidence = self.compute_confidence(&factors);
        let chain = self.build_causal_chain(cause, drift_reports);
        let affected: BTreeSet<String> = drift_reports.iter().map(|r| r.node_id.clone()).collect();
        let summary = self.generate_summary(cause, confidence, drift_reports, &factors);

        RootCauseReport {
            probable_cause: cause,
            confidence,
            summary,
            causal_chain: chain,
            contributing_factors: factors,
            affected_node_ids: affected,
            analyzed_at: Utc::now(),
        }
    }

    fn find_temporal_clusters<'a>(&self, reports: &'a [DriftReport]) -> Vec<Vec<&'a DriftReport>> {
        let mut sorted: Vec<&DriftReport> = reports.iter().collect();
        sorted.sort_by_key(|r| r.detected_at);

        let mut clusters: Vec<Vec<&DriftReport>> = Vec::new();
        for report in sorted {
            match clusters.last_mut() {
                Some(cluster) if report.detected_at - cluster.last().unwrap().detected_at <= self.temporal_window => {
                    cluster.push(report);
                }
                _ => clusters.push(vec![report]),
            }
        }
        clusters
    }

    fn evaluate_temporal(&self, clusters: &[Vec<&DriftReport>], all_reports: &[DriftReport]) -> Vec<CausalFactor> {
        let total_nodes = all_reports.iter().map(|r| &r.node_id).collect::<BTreeSet<_>>().len().max(1);
        let window_secs = self.temporal_window.num_seconds();

        clusters
            .iter()
            .map(|cluster| {
                let cluster_nodes: BTreeSet<&str> = cluster.iter().map(|r| r.node_id.as_str()).collect();
                if cluster_nodes.len() > 1 {
                    let weight = (cluster_nodes.len() as f64 / total_nodes as f64).min(1.0);
                    let node_list = cluster_nodes.iter().copied().collect::<Vec<_>>().join(", ");
                    CausalFactor::new(
                        format!("{} nodes drifted within {window_secs}s window", cluster_nodes.len()),
                        weight,
                        format!("Correlated nodes: {node_list}"),
                    )
                } else {
                    CausalFactor::new("Single node drift (isolated event)", 0.3, format!("Node: {}", cluster[0].node_id))
                }
            })
            .collect()
    }

    fn evaluate_spatial(&self, reports: &[DriftReport], node_groups: &HashMap<String, String>) -> Vec<CausalFactor> {
        let mut group_hits: BTreeMap<String, Vec<String>> = BTreeMap::new();
        for report in reports {
            let group = node_groups.get(&report.node_id).cloned().unwrap_or_else(|| "unknown".to_string());
            group_hits.entry(group).or_default().push(report.node_id.clone());
        }

        group_hits
            .into_iter()
            .filter(|(group, ids)| group != "unknown" && ids.len() > 1)
            .map(|(group, mut ids)| {
                ids.sort();
                CausalFactor::new(
                    format!("Multiple drifts in group '{group}' ({} nodes)", ids.len()),
                    (ids.len() as f64 * 0.2).min(0.8),
                    format!("Affected nodes: {}", ids.join(", ")),
                )
            })
            .collect()
    }

    fn evaluate_deploy_proximity(&self, reports: &[DriftReport], deploy_timestamps: &[DateTime<Utc>]) -> Vec<CausalFactor> {
        let window_secs = self.temporal_window.num_seconds() as f64;
        let mut factors = Vec::new();

        for report in reports {
            for deploy_ts in deploy_timestamps {
                let delta = (report.detected_at - *deploy_ts).num_milliseconds() as f64 / 1000.0;
                let delta = delta.abs();
                if delta <= window_secs {
                    let weight = (1.0 - delta / window_secs).max(0.3);
                    factors.push(CausalFactor::new(
                        format!("Drift on {} detected {delta:.0}s after a deployment", report.node_id),
                        weight,
                        format!("Deploy at {}, drift at {}", deploy_ts.to_rfc3339(), report.detected_at.to_rfc3339()),
                    ));
                    break;
                }
            }
        }
        factors
    }

    fn evaluate_health_signals(&self, snapshots: &[NodeHealth]) -> Vec<CausalFactor> {
        let mut factors = Vec::new();

        let unreachable: Vec<&str> = snapshots.iter().filter(|s| s.status == AgentStatus::Unreachable).map(|s| s.node_id.as_str()).collect();
        if !unreachable.is_empty() {
            let mut ids = unreachable.clone();
            ids.sort_unstable();
            factors.push(CausalFactor::new(
                format!("{} node(s) unreachable (possible network partition)", unreachable.len()),
                (unreachable.len() as f64 * 0.25).min(0.8),
                format!("Unreachable nodes: {}", ids.join(", ")),
            ));
        }

        let degraded: Vec<&str> = snapshots.iter().filter(|s| s.status == AgentStatus::Degraded).map(|s| s.node_id.as_str()).collect();
        if !degraded.is_empty() {
            let mut ids = degraded.clone();
            ids.sort_unstable();
            factors.push(CausalFactor::new(
                format!("{} node(s) in degraded state", degraded.len()),
                (degraded.len() as f64 * 0.15).min(0.6),
                format!("Degraded nodes: {}", ids.join(", ")),
            ));
        }

        factors
    }

    fn evaluate_severity(&self, reports: &[DriftReport]) -> Vec<CausalFactor> {
        let critical_count = reports.iter().filter(|r| r.severity == Severity::Critical).count();
        if critical_count == 0 {
            return Vec::new();
        }
        vec![CausalFactor::new(
            format!("{critical_count} critical-severity drift(s) detected"),
            (critical_count as f64 * 0.2).min(0.6),
            format!("Critical drifts: {critical_count}/{}", reports.len()),
        )]
    }

    fn classify_cause(&self, factors: &[CausalFactor], reports: &[DriftReport]) -> CauseCategory {
        let distinct_nodes: BTreeSet<&str> = reports.iter().map(|r| r.node_id.as_str()).collect();

        let partition_weight: f64 = factors
            .iter()
            .filter(|f| f.description.to_lowercase().contains("unreachable") || f.description.to_lowercase().contains("network partition"))
            .map(|f| f.weight)
            .sum();
        if partition_weight >= 0.5 {
            return CauseCategory::NetworkPartition;
        }

        let deploy_weight: f64 = factors
            .iter()
            .filter(|f| f.description.to_lowercase().contains("deployment") || f.description.to_lowercase().contains("deploy"))
            .map(|f| f.weight)
            .sum();
        if deploy_weight >= 0.5 {
            return CauseCategory::DeployRelated;
        }

        if distinct_nodes.len() > 1 {
            let temporal_weight: f64 = factors
                .iter()
                .filter(|f| f.description.to_lowercase().contains("nodes drifted within"))
                .map(|f| f.weight)
                .sum();
            if temporal_weight >= self.upstream_threshold_ratio {
                return CauseCategory::UpstreamConfigChange;
            }
        }

        if distinct_nodes.len() == 1 {
            return CauseCategory::LocalIssue;
        }

        if distinct_nodes.len() > 1 {
            return CauseCategory::UpstreamConfigChange;
        }

        CauseCategory::Unknown
    }

    fn compute_confidence(&self, factors: &[CausalFactor]) -> f64 {
        if factors.is_empty() {
            return 0.0;
        }
        let avg_weight = factors.iter().map(|f| f.weight).sum::<f64>() / factors.len() as f64;
        let corroboration_bonus = (factors.len() as f64 * 0.03).min(0.15);
        round3((avg_weight + corroboration_bonus).min(1.0))
    }

    fn build_causal_chain(&self, cause: CauseCategory, reports: &[DriftReport]) -> CausalChain {
        let affected: BTreeSet<String> = reports.iter().map(|r| r.node_id.clone()).collect();
        let node_list = affected.iter().cloned().collect::<Vec<_>>().join(", ");

        let steps = match cause {
            CauseCategory::UpstreamConfigChange => vec![
                "Upstream configuration source changed".to_string(),
                format!("New configuration propagated to {} node(s)", affected.len()),
                format!("Configuration drift detected on: {node_list}"),
            ],
            CauseCategory::LocalIssue => {
                let node_id = affected.iter().next().cloned().unwrap_or_default();
                vec![
                    format!("Local state diverged on node {node_id}"),
                    "Node configuration no longer matches expected fingerprint".to_string(),
                    format!("Drift detected on: {node_id}"),
                ]
            }
            CauseCategory::DeployRelated => vec![
                "Deployment executed on the fleet".to_string(),
                "Post-deploy state does not match expected configuration".to_string(),
                format!("Drift detected on: {node_list}"),
            ],
            CauseCategory::NetworkPartition => vec![
                "Network connectivity disrupted".to_string(),
                "Nodes became unreachable or reported stale state".to_string(),
                format!("Drift/unreachability observed on: {node_list}"),
            ],
            CauseCategory::Unknown => vec!["Root cause undetermined".to_string(), format!("Drift observed on: {node_list}")],
        };

        CausalChain {
            steps,
            affected_node_ids: affected,
        }
    }

    fn generate_summary(&self, cause: CauseCategory, confidence: f64, reports: &[DriftReport], factors: &[CausalFactor]) -> String {
        let node_count = reports.iter().map(|r| &r.node_id).collect::<BTreeSet<_>>().len();
        let pct = (confidence * 100.0) as i64;
        format!(
            "Root cause analysis identified '{cause}' as the probable cause with {pct}% confidence. \
             {node_count} node(s) affected, {} corroborating signal(s) evaluated.",
            factors.len()
        )
    }

    fn empty_report(&self) -> RootCauseReport {
        RootCauseReport {
            probable_cause: CauseCategory::Unknown,
            confidence: 0.0,
            summary: "No drift reports provided for analysis.".to_string(),
            causal_chain: CausalChain {
                steps: vec!["No events to analyze".to_string()],
                affected_node_ids: BTreeSet::new(),
            },
            contributing_factors: Vec::new(),
            affected_node_ids: BTreeSet::new(),
            analyzed_at: Utc::now(),
        }
    }
}

fn round3(value: f64) -> f64 {
    (value * 1000.0).round() / 1000.0
}

#[cfg(test)]
mod tests {
    use super::*;

    fn drift(node_id: &str, severity: Severity, detected_at: DateTime<Utc>) -> DriftReport {
        DriftReport {
            node_id: node_id.to_string(),
            expected: chimera_types::Fingerprint::parse("aaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa").unwrap(),
            actual: chimera_types::Fingerprint::parse("bbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbb").unwrap(),
            severity,
            detected_at,
            details: "mismatch".to_string(),
        }
    }

    #[test]
    fn no_reports_yields_unknown_zero_confidence() {
        let analyzer = RootCauseAnalyzer::default();
        let report = analyzer.analyze(&[], &[], None, None);
        assert_eq!(report.probable_cause, CauseCategory::Unknown);
        assert_eq!(report.confidence, 0.0);
    }

    #[test]
    fn single_node_drift_is_local_issue() {
        let analyzer = RootCauseAnalyzer::default();
        let now = Utc::now();
        let report = analyzer.analyze(&[drift("web-1", Severity::Medium, now)], &[], None, None);
        assert_eq!(report.probable_cause, CauseCategory::LocalIssue);
        assert_eq!(report.causal_chain.symptom(), "Drift detected on: web-1");
    }

    #[test]
    fn simultaneous_multi_node_drift_is_upstream_config_change() {
        let analyzer = RootCauseAnalyzer::default();
        let now = Utc::now();
        let reports = vec![
            drift("web-1", Severity::Medium, now),
            drift("web-2", Severity::Medium, now + Duration::seconds(5)),
            drift("web-3", Severity::Medium, now + Duration::seconds(10)),
        ];
        let report = analyzer.analyze(&reports, &[], None, None);
        assert_eq!(report.probable_cause, CauseCategory::UpstreamConfigChange);
    }

    #[test]
    fn deploy_proximity_dominates_when_weight_is_high() {
        let analyzer = RootCauseAnalyzer::default();
        let deploy_time = Utc::now();
        let reports = vec![drift("web-1", Severity::High, deploy_time + Duration::seconds(2))];
        let report = analyzer.analyze(&reports, &[], Some(&[deploy_time]), None);
        assert_eq!(report.probable_cause, CauseCategory::DeployRelated);
    }

    #[test]
    fn unreachable_nodes_signal_network_partition() {
        let analyzer = RootCauseAnalyzer::default();
        let now = Utc::now();
        let reports = vec![drift("web-1", Severity::Critical, now), drift("web-2", Severity::Critical, now)];
        let snapshots = vec![
            NodeHealth::new("web-1", AgentStatus::Unreachable),
            NodeHealth::new("web-2", AgentStatus::Unreachable),
            NodeHealth::new("web-3", AgentStatus::Unreachable),
        ];
        let report = analyzer.analyze(&reports, &snapshots, None, None);
        assert_eq!(report.probable_cause, CauseCategory::NetworkPartition);
    }

    #[test]
    fn confidence_is_bounded_and_rounded() {
        let analyzer = RootCauseAnalyzer::default();
        let now = Utc::now();
        let report = analyzer.analyze(&[drift("web-1", Severity::Critical, now)], &[], None, None);
        assert!((0.0..=1.0).contains(&report.confidence));
    }
}
