use std::collections::{HashMap, HashSet};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Permission {
    Deploy,
    Rollback,
    HealRestart,
    HealRebuild,
    HealRollback,
    ViewStatus,
    ManageNodes,
    ManageSlos,
    Admin,
}

impl Permission {
    fn name(self) -> &'static str {
        match self {
            Self::Deploy => "DEPLOY",
            Self::Rollback => "ROLLBACK",
            Self::HealRestart => "HEAL_RESTART",
            Self::HealRebuild => "HEAL_REBUILD",
            Self::HealRollback => "HEAL_ROLLBACK",
            Self::ViewStatus => "VIEW_STATUS",
            Self::ManageNodes => "MANAGE_NODES",
            Self::ManageSlos => "MANAGE_SLOS",
            Self::Admin => "ADMIN",
        }
    }
}

/// Result of evaluating a principal's access to a permission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PolicyDecision {
    pub allowed: bool,
    pub reason: String,
    pub permission: Permission,
    pub principal: String,
}

impl PolicyDecision {
    fn allow(permission: Permission, principal: &str, reason: String) -> Self {
        Self {
            allowed: true,
            reason,
            permission,
            principal: principal.to_string(),
        }
    }

    fn deny(permission: Permission, principal: &str, reason: String) -> Self {
        Self {
            allowed: false,
            reason,
            permission,
            principal: principal.to_string(),
        }
    }
}

/// An RBAC role: a named set of permissions. `Admin` implies every
/// other permission.
#[derive(Debug, Clone)]
pub struct Role {
    pub name: String,
    pub permissions: HashSet<Permission>,
    pub description: String,
}

impl Role {
    pub fn new(name: impl Into<String>, permissions: impl IntoIterator<Item = Permission>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            permissions: permissions.into_iter().collect(),
            description: description.into(),
        }
    }

    pub fn has_permission(&self, permission: Permission) -> bool {
        self.permissions.contains(&Permission::Admin) || self.permissions.contains(&permission)
    }

    pub fn grant(&mut self, permission: Permission) {
        self.permissions.insert(permission);
    }

    pub fn revoke(&mut self, permission: Permission) {
        self.permissions.remove(&permission);
    }
}

pub fn viewer_role() -> Role {
    Role::new("viewer", [Permission::ViewStatus], "Read-only access to fleet status")
}

pub fn operator_role() -> Role {
    Role::new(
        "operator",
        [Permission::ViewStatus, Permission::Deploy, Permission::Rollback, Permission::HealRestart],
        "Can deploy and perform basic healing",
    )
}

pub fn admin_role() -> Role {
    Role::new("admin", [Permission::Admin], "Full administrative access")
}

/// Evaluates authorization decisions: deny unless some assigned role
/// grants the permission (directly or via `Admin`).
#[derive(Debug, Default)]
pub struct PolicyEngine {
    principal_roles: HashMap<String, Vec<Role>>,
}

impl PolicyEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn assign_role(&mut self, principal: impl Into<String>, role: Role) {
        self.principal_roles.entry(principal.into()).or_default().push(role);
    }

    pub fn evaluate(&self, principal: &str, permission: Permission) -> PolicyDecision {
        let Some(roles) = self.principal_roles.get(principal) else {
            return PolicyDecision::deny(permission, principal, format!("No roles assigned to {principal}"));
        };

        for role in roles {
            if role.has_permission(permission) {
                return PolicyDecision::allow(permission, principal, format!("Granted via role '{}'", role.name));
            }
        }

        PolicyDecision::deny(
            permission,
            principal,
            format!("None of {principal}'s roles grant {}", permission.name()),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_roles_denies() {
        let engine = PolicyEngine::new();
        let decision = engine.evaluate("alice", Permission::Deploy);
        assert!(!decision.allowed);
    }

    #[test]
    fn operator_can_deploy_but_not_manage_nodes() {
        let mut engine = PolicyEngine::new();
        engine.assign_role("alice", operator_role());
        assert!(engine.evaluate("alice", Permission::Deploy).allowed);
        assert!(!engine.evaluate("alice", Permission::ManageNodes).allowed);
    }

    #[test]
    fn admin_implies_everything() {
        let mut engine = PolicyEngine::new();
        engine.assign_role("root", admin_role());
        assert!(engine.evaluate("root", Permission::ManageSlos).allowed);
    }
}
