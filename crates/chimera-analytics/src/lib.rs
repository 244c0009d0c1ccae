//! Heuristic risk scoring over a node's drift history: how often it
//! drifts, how recently, and how severely, rolled into one score.

#![forbid(unsafe_code)]

use std::collections::HashMap;
use std::fmt;

use chimera_types::{Node, Severity};
use chrono::{DateTime, Duration, Utc};
use parking_lot::RwLock;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum RiskLevel {
    Low,
    Medium,
    High,
    Critical,
}

impl RiskLevel {
    fn from_score(score: f64) -> Self {
        if score >= 0.8 {
            Self::Critical
        } else if score >= 0.5 {
            Self::High
        } else if score >= 0.25 {
            Self::Medium
        } else {
            Self::Low
        }
    }
}

impl fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Low => "LOW",
            Self::Medium => "MEDIUM",
            Self::High => "HIGH",
            Self::Critical => "CRITICAL",
        };
        write!(f, "{s}")
    }
}

/// Risk assessment for a single node at a point in time.
#[derive(Debug, Clone, PartialEq)]
pub struct RiskScore {
    pub node: Node,
    pub score: f64,
    pub level: RiskLevel,
    pub factors: HashMap<String, f64>,
    pub predicted_drift_probability: f64,
    pub assessed_at: DateTime<Utc>,
}

impl RiskScore {
    pub fn is_high_risk(&self) -> bool {
        matches!(self.level, RiskLevel::High | RiskLevel::Critical)
    }
}

#[derive(Debug, Clone)]
struct DriftHistoryEntry {
    node: Node,
    severity: Severity,
    detected_at: DateTime<Utc>,
    resolved: bool,
    resolution_time_seconds: Option<f64>,
}

fn severity_weight(severity: Severity) -> f64 {
    match severity {
        Severity::Low => 0.1,
        Severity::Medium => 0.3,
        Severity::High => 0.7,
        Severity::Critical => 1.0,
    }
}

/// In-memory, append-only store of drift history feeding the risk model.
pub struct PredictiveAnalytics {
    history: RwLock<Vec<DriftHistoryEntry>>,
    window_hours: u32,
}

impl PredictiveAnalytics {
    pub fn new(history_window_hours: u32) -> Self {
        Self {
            history: RwLock::new(Vec::new()),
            window_hours: history_window_hours,
        }
    }

    pub fn record_drift(&self, node: Node, severity: Severity, detected_at: Option<DateTime<Utc>>) {
        self.history.write().push(DriftHistoryEntry {
            node,
            severity,
            detected_at: detected_at.unwrap_or_else(Utc::now),
            resolved: false,
            resolution_time_seconds: None,
        });
    }

    /// Marks the most recent unresolved entry for `node` as resolved.
    pub fn record_resolution(&self, node: &Node, resolution_time_seconds: f64) {
        let mut history = self.history.write();
        if let Some(entry) = history.iter_mut().rev().find(|e| &e.node == node && !e.resolved) {
            entry.resolved = true;
            entry.resolution_time_seconds = Some(resolution_time_seconds);
        }
    }

    fn relevant_entries(&self, node: &Node, now: DateTime<Utc>) -> Vec<DriftHistoryEntry> {
        let window_start = now - Duration::hours(self.window_hours as i64);
        self.history
            .read()
            .iter()
            .filter(|e| &e.node == node && e.detected_at >= window_start)
            .cloned()
            .collect()
    }

    pub fn assess_risk(&self, node: &Node) -> RiskScore {
        let now = Utc::now();
        let relevant = self.relevant_entries(node, now);

        if relevant.is_empty() {
            return RiskScore {
                node: node.clone(),
                score: 0.0,
                level: RiskLevel::Low,
                factors: HashMap::from([("frequency".to_string(), 0.0), ("recency".to_string(), 0.0), ("severity".to_string(), 0.0)]),
                predicted_drift_probability: 0.05,
                assessed_at: now,
            };
        }

        let frequency = (relevant.len() as f64 / 10.0).min(1.0);

        let most_recent = relevant.iter().map(|e| e.detected_at).max().unwrap();
        let hours_since = (now - most_recent).num_milliseconds() as f64 / 3_600_000.0;
        let recency = (1.0 - hours_since / self.window_hours as f64).max(0.0);

        let severity_max = relevant.iter().map(|e| severity_weight(e.severity)).fold(0.0_f64, f64::max);

        let score = frequency * 0.3 + recency * 0.4 + severity_max * 0.3;

        RiskScore {
            node: node.clone(),
            score: round3(score),
            level: RiskLevel::from_score(score),
            factors: HashMap::from([
                ("frequency".to_string(), round3(frequency)),
                ("recency".to_string(), round3(recency)),
                ("severity".to_string(), round3(severity_max)),
            ]),
            predicted_drift_probability: round3((score * 1.2).min(1.0)),
            assessed_at: now,
        }
    }

    /// Risk for every node in `nodes`, sorted highest-score first.
    pub fn assess_fleet(&self, nodes: &[Node]) -> Vec<RiskScore> {
        let mut scores: Vec<RiskScore> = nodes.iter().map(|n| self.assess_risk(n)).collect();
        scores.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        scores
    }

    /// Drift counts per `bucket_hours`-wide bucket across the trailing
    /// window, oldest first.
    pub fn detect_trend(&self, node: &Node, bucket_hours: u32) -> Vec<u32> {
        let now = Utc::now();
        let relevant = self.relevant_entries(node, now);

        let num_buckets = (self.window_hours / bucket_hours).max(1) as usize;
        let mut buckets = vec![0u32; num_buckets];

        for entry in &relevant {
            let hours_ago = (now - entry.detected_at).num_milliseconds() as f64 / 3_600_000.0;
            let bucket_idx = ((hours_ago / bucket_hours as f64) as usize).min(num_buckets - 1);
            buckets[num_buckets - 1 - bucket_idx] += 1;
        }

        buckets
    }

    pub fn is_trending_up(&self, node: &Node, bucket_hours: u32) -> bool {
        let trend = self.detect_trend(node, bucket_hours);
        if trend.len() < 2 {
            return false;
        }
        let mid = trend.len() / 2;
        let first_half = trend[..mid].iter().sum::<u32>() as f64 / mid.max(1) as f64;
        let second_half = trend[mid..].iter().sum::<u32>() as f64 / (trend.len() - mid).max(1) as f64;
        second_half > first_half * 1.5
    }

    pub fn mean_time_to_resolution(&self, node: &Node) -> Option<f64> {
        let history = self.history.read();
        let resolved: Vec<f64> = history
            .iter()
            .filter(|e| &e.node == node)
            .filter_map(|e| if e.resolved { e.resolution_time_seconds } else { None })
            .collect();
        if resolved.is_empty() {
            None
        } else {
            Some(resolved.iter().sum::<f64>() / resolved.len() as f64)
        }
    }

    pub fn fleet_risk_summary(&self, nodes: &[Node]) -> HashMap<String, usize> {
        let mut summary = HashMap::from([
            ("LOW".to_string(), 0),
            ("MEDIUM".to_string(), 0),
            ("HIGH".to_string(), 0),
            ("CRITICAL".to_string(), 0),
        ]);
        for score in self.assess_fleet(nodes) {
            *summary.entry(score.level.to_string()).or_insert(0) += 1;
        }
        summary
    }
}

fn round3(value: f64) -> f64 {
    (value * 1000.0).round() / 1000.0
}
