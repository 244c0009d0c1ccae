use std::path::Path;
use std::time::Duration;

use chimera_domain::playbook::ALLOWED_COMMANDS;
use chimera_ports::FingerprintSource;
use parking_lot::RwLock;
use thiserror::Error;
use tracing::{error, info, warn};

use crate::health::{calculate_drift_severity, AgentStatus, DriftReport, NodeHealth};
use crate::orchestrator_client::OrchestratorClient;

#[derive(Debug, Error, Clone)]
pub enum HealingFileError {
    #[error("cannot stat healing file: {0}")]
    NotFound(String),
    #[error("healing file {path} not owned by root (owner uid={uid})")]
    NotOwnedByRoot { path: String, uid: u32 },
    #[error("healing file {0} is world-writable")]
    WorldWritable(String),
    #[error("platform does not support ownership/permission checks")]
    UnsupportedPlatform,
}

/// Refuses to trust a healing-command file unless it's root-owned and
/// not world-writable. Called before every read of a healing file.
#[cfg(unix)]
pub fn validate_healing_file(path: &Path) -> Result<(), HealingFileError> {
    use std::os::unix::fs::MetadataExt;

    let meta = std::fs::metadata(path).map_err(|_| HealingFileError::NotFound(path.display().to_string()))?;

    if meta.uid() != 0 {
        return Err(HealingFileError::NotOwnedByRoot {
            path: path.display().to_string(),
            uid: meta.uid(),
        });
    }

    const S_IWOTH: u32 = 0o002;
    if meta.mode() & S_IWOTH != 0 {
        return Err(HealingFileError::WorldWritable(path.display().to_string()));
    }

    Ok(())
}

#[cfg(not(unix))]
pub fn validate_healing_file(_path: &Path) -> Result<(), HealingFileError> {
    Err(HealingFileError::UnsupportedPlatform)
}

/// Bound on how long a pulled healing command may run before it's killed.
const HEALING_COMMAND_TIMEOUT: Duration = Duration::from_secs(60);

fn validate_healing_command(command: &str) -> Result<Vec<String>, String> {
    let parts = shell_words::split(command).map_err(|e| e.to_string())?;
    let Some(first) = parts.first() else {
        return Err("Empty healing command".to_string());
    };
    let executable = first.rsplit('/').next().unwrap_or(first);
    if !ALLOWED_COMMANDS.contains(&executable) {
        let mut allowed: Vec<&str> = ALLOWED_COMMANDS.to_vec();
        allowed.sort_unstable();
        return Err(format!("Command '{executable}' not in allowlist. Allowed: {}", allowed.join(", ")));
    }
    Ok(parts)
}

/// Runs on each fleet node: emits heartbeats, checks for local drift,
/// and picks up and executes healing commands handed down by the
/// orchestrator.
pub struct NodeAgent<C: OrchestratorClient, F: FingerprintSource> {
    node_id: String,
    client: C,
    fingerprint_source: F,
    health: RwLock<NodeHealth>,
    last_drift_report: RwLock<Option<DriftReport>>,
}

impl<C: OrchestratorClient, F: FingerprintSource> NodeAgent<C, F> {
    pub fn new(node_id: impl Into<String>, client: C, fingerprint_source: F) -> Self {
        let node_id = node_id.into();
        Self {
            health: RwLock::new(NodeHealth::new(&node_id, AgentStatus::Unknown)),
            last_drift_report: RwLock::new(None),
            node_id,
            client,
            fingerprint_source,
        }
    }

    pub fn health(&self) -> NodeHealth {
        self.health.read().clone()
    }

    pub fn last_drift_report(&self) -> Option<DriftReport> {
        self.last_drift_report.read().clone()
    }

    /// One heartbeat cycle: read local fingerprints, report health.
    pub async fn heartbeat_once(&self) -> Result<(), crate::orchestrator_client::OrchestratorClientError> {
        let current = self.fingerprint_source.current_fingerprint().await.ok().flatten();
        let expected = self.fingerprint_source.expected_fingerprint().await.ok().flatten();

        let mut health = NodeHealth::new(&self.node_id, AgentStatus::Healthy);
        health.current_fingerprint = current;
        health.expected_fingerprint = expected;
        *self.health.write() = health.clone();
        self.client.report_health(health).await
    }

    /// One drift-check cycle: compares current vs expected, emits a
    /// `DriftReport` to the orchestrator when they disagree.
    pub async fn check_drift_once(&self) -> Result<(), crate::orchestrator_client::OrchestratorClientError> {
        let current = self.fingerprint_source.current_fingerprint().await.ok().flatten();
        let expected = self.fingerprint_source.expected_fingerprint().await.ok().flatten();

        let (Some(current), Some(expected)) = (current, expected) else {
            return Ok(());
        };
        if current == expected {
            return Ok(());
        }

        let severity = calculate_drift_severity(&current);
        let report = DriftReport {
            node_id: self.node_id.clone(),
            expected: expected.clone(),
            actual: current.clone(),
            severity,
            detected_at: chrono::Utc::now(),
            details: format!("Drift detected: expected={expected}, actual={current}"),
        };

        *self.last_drift_report.write() = Some(report.clone());
        let mut health = NodeHealth::new(&self.node_id, AgentStatus::DriftDetected);
        health.current_fingerprint = Some(current);
        health.expected_fingerprint = Some(expected);
        *self.health.write() = health;

        self.client.report_drift(report).await
    }

    /// Pulls a pending healing command from the orchestrator and runs
    /// it, subject to the same allowlist the playbook engine enforces.
    pub async fn run_pending_healing_command(&self) -> Result<(), crate::orchestrator_client::OrchestratorClientError> {
        let Some(command) = self.client.fetch_healing_command(&self.node_id).await? else {
            return Ok(());
        };

        *self.health.write() = NodeHealth::new(&self.node_id, AgentStatus::Healing);

        let success = match validate_healing_command(&command) {
            Ok(parts) => {
                let mut cmd = tokio::process::Command::new(&parts[0]);
                cmd.args(&parts[1..]);
                cmd.kill_on_drop(true);

                match tokio::time::timeout(HEALING_COMMAND_TIMEOUT, cmd.output()).await {
                    Ok(Ok(output)) if output.status.success() => {
                        info!(node_id = %self.node_id, command = parts[0], "healing command succeeded");
                        true
                    }
                    Ok(Ok(output)) => {
                        warn!(node_id = %self.node_id, code = ?output.status.code(), "healing command failed");
                        false
                    }
                    Ok(Err(e)) => {
                        error!(node_id = %self.node_id, error = %e, "healing execution failed");
                        false
                    }
                    Err(_) => {
                        warn!(node_id = %self.node_id, timeout = HEALING_COMMAND_TIMEOUT.as_secs(), "healing command timed out");
                        false
                    }
                }
            }
            Err(reason) => {
                error!(node_id = %self.node_id, reason, "healing command rejected");
                false
            }
        };

        *self.health.write() = NodeHealth::new(&self.node_id, if success { AgentStatus::Healthy } else { AgentStatus::Degraded });
        self.client.acknowledge_healing(&self.node_id, success).await
    }

    /// Reads, validates, and atomically consumes a healing command file
    /// dropped at `path` for this node before `run_pending_healing_command`
    /// would otherwise poll the orchestrator.
    pub fn claim_healing_file(path: &Path) -> Result<Option<String>, HealingFileError> {
        if !path.exists() {
            return Ok(None);
        }
        validate_healing_file(path)?;
        let contents = std::fs::read_to_string(path).map_err(|_| HealingFileError::NotFound(path.display().to_string()))?;
        std::fs::remove_file(path).ok();
        let command = contents.trim().to_string();
        Ok(if command.is_empty() { None } else { Some(command) })
    }
}

pub fn healing_file_path(healing_dir: &Path, node_id: &str) -> std::path::PathBuf {
    healing_dir.join(format!("heal_{node_id}"))
}
