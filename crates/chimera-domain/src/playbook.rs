/// The executables a Playbook step's command may invoke.
///
/// Kept here rather than in the agent/registry crate so a playbook can be
/// validated without pulling in anything that actually executes commands.
pub const ALLOWED_COMMANDS: &[&str] = &["nix-env", "nixos-rebuild", "systemctl", "nix-build", "nix-store"];

/// A single remediation step within a playbook.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlaybookStep {
    pub name: String,
    pub command: String,
    pub timeout_seconds: u32,
    pub rollback_on_failure: bool,
}

/// A reproducible, validated sequence of remediation steps for the
/// playbook marketplace.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Playbook {
    pub id: String,
    pub name: String,
    pub description: String,
    pub author: String,
    pub version: String,
    pub tags: Vec<String>,
    pub steps: Vec<PlaybookStep>,
    pub target_os: String,
}

impl Playbook {
    pub fn step_count(&self) -> usize {
        self.steps.len()
    }

    /// Validates every step's command against [`ALLOWED_COMMANDS`]. An
    /// empty return means the playbook is valid.
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();

        if self.steps.is_empty() {
            errors.push("Playbook must contain at least one step".to_string());
        }

        for (i, step) in self.steps.iter().enumerate() {
            if step.name.trim().is_empty() {
                errors.push(format!("Step {i}: name must not be empty"));
            }

            if step.command.trim().is_empty() {
                errors.push(format!("Step {i} ({}): command must not be empty", step.name));
                continue;
            }

            let parts = match shell_words::split(&step.command) {
                Ok(parts) => parts,
                Err(e) => {
                    errors.push(format!("Step {i} ({}): invalid command syntax: {e}", step.name));
                    continue;
                }
            };

            let Some(first) = parts.first() else {
                errors.push(format!("Step {i} ({}): command must not be empty", step.name));
                continue;
            };

            let executable = first.rsplit('/').next().unwrap_or(first);
            if !ALLOWED_COMMANDS.contains(&executable) {
                let mut allowed: Vec<&str> = ALLOWED_COMMANDS.to_vec();
                allowed.sort_unstable();
                errors.push(format!(
                    "Step {i} ({}): command '{executable}' not in allowlist. Allowed: {}",
                    step.name,
                    allowed.join(", ")
                ));
            }

            if step.timeout_seconds == 0 {
                errors.push(format!(
                    "Step {i} ({}): timeout must be positive, got {}",
                    step.name, step.timeout_seconds
                ));
            }
        }

        errors
    }
}
