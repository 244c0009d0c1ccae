//! Core domain entities of the Chimera fleet control plane: the
//! Deployment aggregate, the remediation Playbook aggregate, SLO
//! tracking, RBAC policy evaluation, and the typed configuration
//! surface.

#![forbid(unsafe_code)]

pub mod config;
pub mod deployment;
pub mod playbook;
pub mod policy;
pub mod slo;

pub use config::{AnalyticsConfig, AutonomousLoopConfig, ChimeraConfig, PlaybookConfig, RcaConfig};
pub use deployment::{Deployment, DeploymentError, NixConfig};
pub use playbook::{Playbook, PlaybookStep};
pub use policy::{Permission, PolicyDecision, PolicyEngine, Role};
pub use slo::{Slo, SloReport, SloStatus};
