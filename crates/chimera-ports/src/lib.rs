//! Capability traits consumed by the Chimera core.
//!
//! Every trait here models an external collaborator: the core calls
//! through these, never through a concrete adapter. Adapters (the real
//! Nix CLI, an SSH fan-out executor, a cloud provider SDK) live outside
//! this workspace and implement these traits.

#![forbid(unsafe_code)]

use async_trait::async_trait;
use chimera_types::{CongruenceReport, Fingerprint, Node};
use thiserror::Error;

// ─── Nix ──────────────────────────────────────────────────────────────────────

#[derive(Debug, Error, Clone)]
pub enum NixError {
    #[error("nix build failed: {0}")]
    BuildFailed(String),
    #[error("nix is not installed or not on PATH")]
    NotInstalled,
}

/// Builds and instantiates declarative configuration artifacts.
#[async_trait]
pub trait Nix: Send + Sync {
    async fn build(&self, path: &str) -> Result<Fingerprint, NixError>;
    async fn instantiate(&self, path: &str) -> Result<String, NixError>;
    /// Constructs an invocation wrapper; does not run it.
    async fn shell(&self, path: &str, command: &str) -> Result<String, NixError>;
}

// ─── RemoteExecutor ───────────────────────────────────────────────────────────

#[derive(Debug, Error, Clone)]
pub enum RemoteExecError {
    #[error("transport error: {0}")]
    TransportError(String),
    #[error("command failed on {node}: {reason}")]
    CommandFailed { node: String, reason: String },
}

/// Executes commands on fleet nodes. All operations are concurrent across
/// the supplied node set.
#[async_trait]
pub trait RemoteExecutor: Send + Sync {
    async fn sync_artifact(&self, nodes: &[Node], artifact_path: &str) -> Result<(), RemoteExecError>;
    async fn exec_command(&self, nodes: &[Node], command: &str) -> Result<(), RemoteExecError>;
    async fn current_fingerprint(&self, node: &Node) -> Result<Option<Fingerprint>, RemoteExecError>;
    async fn rollback(&self, nodes: &[Node], generation: Option<&str>) -> Result<(), RemoteExecError>;
}

// ─── DriftDetector ────────────────────────────────────────────────────────────

#[derive(Debug, Error, Clone)]
pub enum DriftDetectorError {
    #[error("transport error checking node: {0}")]
    TransportError(String),
}

/// The capability the drift-analysis service reads through.
#[async_trait]
pub trait DriftDetector: Send + Sync {
    async fn check_node(&self, node: &Node, expected: &Fingerprint) -> Result<CongruenceReport, DriftDetectorError>;
    async fn get_actual_fingerprint(&self, node: &Node) -> Result<Option<Fingerprint>, DriftDetectorError>;
}

// ─── FingerprintSource (agent-local probe) ───────────────────────────────────

#[derive(Debug, Error, Clone)]
pub enum FingerprintSourceError {
    #[error("failed to read local fingerprint: {0}")]
    ProbeFailed(String),
}

/// The agent-side capability for reading this node's own current and
/// expected fingerprints. Kept separate from `RemoteExecutor`, which is
/// the orchestrator-side capability for reading some *other* node's state.
#[async_trait]
pub trait FingerprintSource: Send + Sync {
    async fn current_fingerprint(&self) -> Result<Option<Fingerprint>, FingerprintSourceError>;
    async fn expected_fingerprint(&self) -> Result<Option<Fingerprint>, FingerprintSourceError>;
}

// ─── CloudProvider ────────────────────────────────────────────────────────────

#[derive(Debug, Error, Clone)]
pub enum CloudProviderError {
    #[error("cloud provider error: {0}")]
    ProviderError(String),
}

/// Boundary-only capability; not consumed by the healing loop. Exists so
/// an external fleet-discovery/provisioning adapter has a typed seam.
#[async_trait]
pub trait CloudProvider: Send + Sync {
    async fn discover_nodes(&self) -> Result<Vec<Node>, CloudProviderError>;
    async fn provision_node(&self, spec: &serde_json::Value) -> Result<Node, CloudProviderError>;
    async fn decommission_node(&self, node: &Node) -> Result<(), CloudProviderError>;
    async fn get_metadata(&self, node: &Node) -> Result<serde_json::Value, CloudProviderError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_messages_are_non_empty() {
        assert!(!NixError::NotInstalled.to_string().is_empty());
        assert!(!RemoteExecError::TransportError("x".into()).to_string().is_empty());
        assert!(!DriftDetectorError::TransportError("x".into()).to_string().is_empty());
        assert!(!FingerprintSourceError::ProbeFailed("x".into()).to_string().is_empty());
        assert!(!CloudProviderError::ProviderError("x".into()).to_string().is_empty());
    }
}
