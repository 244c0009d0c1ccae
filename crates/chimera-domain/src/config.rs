use serde::Deserialize;

/// The exhaustive configuration surface the core recognizes. Loading
/// this from a file or environment is outside this workspace's scope;
/// callers populate it however they see fit and hand it to the
/// relevant component constructors.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct ChimeraConfig {
    pub heartbeat_interval_seconds: u64,
    pub drift_check_interval_seconds: u64,
    pub auto_heal: bool,
    pub autonomous_loop: AutonomousLoopConfig,
    pub analytics: AnalyticsConfig,
    pub stale_threshold_seconds: u64,
    pub rca: RcaConfig,
    pub playbook: PlaybookConfig,
}

impl Default for ChimeraConfig {
    fn default() -> Self {
        Self {
            heartbeat_interval_seconds: 5,
            drift_check_interval_seconds: 30,
            auto_heal: true,
            autonomous_loop: AutonomousLoopConfig::default(),
            analytics: AnalyticsConfig::default(),
            stale_threshold_seconds: 60,
            rca: RcaConfig::default(),
            playbook: PlaybookConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(default)]
pub struct AutonomousLoopConfig {
    pub interval_seconds: u64,
    pub run_once: bool,
}

impl Default for AutonomousLoopConfig {
    fn default() -> Self {
        Self {
            interval_seconds: 10,
            run_once: false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(default)]
pub struct AnalyticsConfig {
    pub history_window_hours: u64,
}

impl Default for AnalyticsConfig {
    fn default() -> Self {
        Self { history_window_hours: 168 }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(default)]
pub struct RcaConfig {
    pub temporal_window_seconds: u64,
    pub upstream_threshold_ratio: f64,
}

impl Default for RcaConfig {
    fn default() -> Self {
        Self {
            temporal_window_seconds: 60,
            upstream_threshold_ratio: 0.5,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(default)]
pub struct PlaybookConfig {
    pub default_timeout_seconds: u64,
}

impl Default for PlaybookConfig {
    fn default() -> Self {
        Self { default_timeout_seconds: 60 }
    }
}
