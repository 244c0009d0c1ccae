use std::path::{Path, PathBuf};

use chimera_events::DomainEvent;
use chimera_types::{Fingerprint, SessionId};
use chrono::Utc;
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DeploymentError {
    #[error("deployment {session} cannot transition from {from:?}: {reason}")]
    InvalidTransition {
        session: SessionId,
        from: DeploymentStatus,
        reason: &'static str,
    },
    #[error("nix config path does not exist: {0}")]
    ConfigNotFound(PathBuf),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeploymentStatus {
    Pending,
    Building,
    Running,
    Completed,
    Failed,
}

/// Source of the declarative configuration being deployed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NixConfig {
    path: PathBuf,
}

impl NixConfig {
    pub fn new(path: impl Into<PathBuf>) -> Result<Self, DeploymentError> {
        let path = path.into();
        if !path.exists() {
            return Err(DeploymentError::ConfigNotFound(path));
        }
        Ok(Self { path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn is_flake(&self) -> bool {
        self.path.file_name().and_then(|n| n.to_str()) == Some("flake.nix")
    }
}

/// Aggregate root for a single deployment run, keyed by `SessionId`.
///
/// Every transition consumes `self` and returns the successor instance;
/// there is no way to mutate a `Deployment` in place, matching the
/// exclusive-ownership discipline the rest of this workspace uses for
/// other owned aggregates.
#[derive(Debug, Clone)]
pub struct Deployment {
    session_id: SessionId,
    config: NixConfig,
    status: DeploymentStatus,
    fingerprint: Option<Fingerprint>,
    error_message: Option<String>,
    events: Vec<DomainEvent>,
}

impl Deployment {
    pub fn new(session_id: SessionId, config: NixConfig) -> Self {
        Self {
            session_id,
            config,
            status: DeploymentStatus::Pending,
            fingerprint: None,
            error_message: None,
            events: Vec::new(),
        }
    }

    pub fn session_id(&self) -> &SessionId {
        &self.session_id
    }

    pub fn config(&self) -> &NixConfig {
        &self.config
    }

    pub fn status(&self) -> DeploymentStatus {
        self.status
    }

    pub fn fingerprint(&self) -> Option<&Fingerprint> {
        self.fingerprint.as_ref()
    }

    pub fn error_message(&self) -> Option<&str> {
        self.error_message.as_deref()
    }

    /// Events emitted across this aggregate's lifetime, in transition order.
    pub fn events(&self) -> &[DomainEvent] {
        &self.events
    }

    pub fn start_build(mut self) -> Result<Self, DeploymentError> {
        if self.status != DeploymentStatus::Pending {
            return Err(DeploymentError::InvalidTransition {
                session: self.session_id,
                from: self.status,
                reason: "start_build requires PENDING",
            });
        }
        self.status = DeploymentStatus::Building;
        self.events.push(DomainEvent::Started {
            aggregate_id: self.session_id.clone(),
            occurred_at: Utc::now(),
        });
        Ok(self)
    }

    pub fn complete_build(mut self, fingerprint: Fingerprint) -> Result<Self, DeploymentError> {
        if self.status != DeploymentStatus::Building {
            return Err(DeploymentError::InvalidTransition {
                session: self.session_id,
                from: self.status,
                reason: "complete_build requires BUILDING",
            });
        }
        self.events.push(DomainEvent::BuildCompleted {
            aggregate_id: self.session_id.clone(),
            occurred_at: Utc::now(),
            fingerprint: fingerprint.as_str().to_string(),
        });
        self.fingerprint = Some(fingerprint);
        self.status = DeploymentStatus::Running;
        Ok(self)
    }

    pub fn complete(mut self) -> Result<Self, DeploymentError> {
        if self.status != DeploymentStatus::Running {
            return Err(DeploymentError::InvalidTransition {
                session: self.session_id,
                from: self.status,
                reason: "complete requires RUNNING",
            });
        }
        self.status = DeploymentStatus::Completed;
        self.events.push(DomainEvent::Completed {
            aggregate_id: self.session_id.clone(),
            occurred_at: Utc::now(),
        });
        Ok(self)
    }

    /// Unconditional: any state may transition to FAILED.
    pub fn fail(mut self, message: impl Into<String>) -> Self {
        let message = message.into();
        self.status = DeploymentStatus::Failed;
        self.events.push(DomainEvent::Failed {
            aggregate_id: self.session_id.clone(),
            occurred_at: Utc::now(),
            reason: message.clone(),
        });
        self.error_message = Some(message);
        self
    }
}
