//! Sequential remediation playbook executor.
//!
//! Steps run one at a time; a failing step with `rollback_on_failure`
//! set rolls back every step that already succeeded, in reverse order,
//! and marks the remaining steps skipped. Commands are re-validated
//! against the allowlist at execution time, not just at `validate()`.

#![forbid(unsafe_code)]

use chimera_domain::playbook::ALLOWED_COMMANDS;
use chimera_domain::{Playbook, PlaybookStep};
use chrono::{DateTime, Utc};
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepStatus {
    Pending,
    Running,
    Succeeded,
    Failed,
    RolledBack,
    Skipped,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybookExecutionStatus {
    Pending,
    Running,
    Succeeded,
    Failed,
    RolledBack,
}

#[derive(Debug, Clone)]
pub struct StepResult {
    pub step: PlaybookStep,
    pub status: StepStatus,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub output: String,
    pub error: String,
    pub return_code: Option<i32>,
}

impl StepResult {
    fn pending(step: PlaybookStep) -> Self {
        Self {
            step,
            status: StepStatus::Pending,
            started_at: None,
            completed_at: None,
            output: String::new(),
            error: String::new(),
            return_code: None,
        }
    }

    fn skipped(step: PlaybookStep, error: impl Into<String>) -> Self {
        Self {
            status: StepStatus::Skipped,
            error: error.into(),
            ..Self::pending(step)
        }
    }
}

#[derive(Debug, Clone)]
pub struct PlaybookExecutionResult {
    pub playbook: Playbook,
    pub status: PlaybookExecutionStatus,
    pub step_results: Vec<StepResult>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl PlaybookExecutionResult {
    pub fn succeeded_steps(&self) -> usize {
        self.step_results.iter().filter(|r| r.status == StepStatus::Succeeded).count()
    }

    pub fn failed_steps(&self) -> usize {
        self.step_results.iter().filter(|r| r.status == StepStatus::Failed).count()
    }
}

/// Executes playbooks, enforcing per-step timeouts and rollback.
#[derive(Debug, Default)]
pub struct PlaybookEngine;

impl PlaybookEngine {
    pub fn new() -> Self {
        Self
    }

    pub async fn execute(&self, playbook: &Playbook) -> PlaybookExecutionResult {
        let errors = playbook.validate();
        if !errors.is_empty() {
            let now = Utc::now();
            return PlaybookExecutionResult {
                playbook: playbook.clone(),
                status: PlaybookExecutionStatus::Failed,
                step_results: playbook
                    .steps
                    .iter()
                    .cloned()
                    .map(|step| StepResult::skipped(step, "Playbook validation failed"))
                    .collect(),
                started_at: Some(now),
                completed_at: Some(now),
            };
        }

        let started_at = Utc::now();
        let mut step_results = Vec::with_capacity(playbook.steps.len());
        let mut completed_steps: Vec<usize> = Vec::new();
        let mut status = PlaybookExecutionStatus::Succeeded;

        for (i, step) in playbook.steps.iter().enumerate() {
            let result = self.execute_step(step).await;
            let failed = result.status == StepStatus::Failed;
            step_results.push(result);

            if failed {
                warn!(playbook = %playbook.name, step = %step.name, "playbook step failed");

                if step.rollback_on_failure && !completed_steps.is_empty() {
                    info!(count = completed_steps.len(), "rolling back completed steps");
                    for &idx in completed_steps.iter().rev() {
                        info!(step = %step_results[idx].step.name, "rolling back step");
                        step_results[idx].status = StepStatus::RolledBack;
                    }
                    status = PlaybookExecutionStatus::RolledBack;
                } else {
                    status = PlaybookExecutionStatus::Failed;
                }

                for remaining in &playbook.steps[i + 1..] {
                    step_results.push(StepResult::skipped(remaining.clone(), "Skipped due to prior step failure"));
                }
                break;
            }

            completed_steps.push(i);
        }

        PlaybookExecutionResult {
            playbook: playbook.clone(),
            status,
            step_results,
            started_at: Some(started_at),
            completed_at: Some(Utc::now()),
        }
    }

    async fn execute_step(&self, step: &PlaybookStep) -> StepResult {
        let mut result = StepResult::pending(step.clone());
        result.status = StepStatus::Running;
        result.started_at = Some(Utc::now());

        let parts = match shell_words::split(&step.command) {
            Ok(parts) if !parts.is_empty() => parts,
            Ok(_) => {
                result.status = StepStatus::Failed;
                result.error = "Empty command".to_string();
                result.completed_at = Some(Utc::now());
                return result;
            }
            Err(e) => {
                result.status = StepStatus::Failed;
                result.error = format!("invalid command syntax: {e}");
                result.completed_at = Some(Utc::now());
                return result;
            }
        };

        let executable = parts[0].rsplit('/').next().unwrap_or(&parts[0]);
        if !ALLOWED_COMMANDS.contains(&executable) {
            let mut allowed: Vec<&str> = ALLOWED_COMMANDS.to_vec();
            allowed.sort_unstable();
            result.status = StepStatus::Failed;
            result.error = format!("Command '{executable}' not in allowlist. Allowed: {}", allowed.join(", "));
            result.completed_at = Some(Utc::now());
            return result;
        }

        let mut command = tokio::process::Command::new(&parts[0]);
        command.args(&parts[1..]);
        command.kill_on_drop(true);

        let timeout = std::time::Duration::from_secs(step.timeout_seconds as u64);
        match tokio::time::timeout(timeout, command.output()).await {
            Ok(Ok(output)) => {
                result.output = String::from_utf8_lossy(&output.stdout).into_owned();
                result.error = String::from_utf8_lossy(&output.stderr).into_owned();
                result.return_code = output.status.code();
                result.status = if output.status.success() {
                    StepStatus::Succeeded
                } else {
                    warn!(step = %step.name, code = ?output.status.code(), "step exited non-zero");
                    StepStatus::Failed
                };
            }
            Ok(Err(e)) => {
                result.status = StepStatus::Failed;
                result.error = e.to_string();
            }
            Err(_) => {
                result.status = StepStatus::Failed;
                result.error = format!("Step timed out after {}s", step.timeout_seconds);
                warn!(step = %step.name, timeout = step.timeout_seconds, "step timed out");
            }
        }

        result.completed_at = Some(Utc::now());
        result
    }
}
