//! Generic DAG workflow orchestrator.
//!
//! A [`Workflow`] is a set of named [`Step`]s with dependency edges. It
//! knows nothing about deployments, Nix, or remote execution; the
//! deployment workflow is just one particular wiring of steps built by
//! a caller elsewhere in this workspace.

#![forbid(unsafe_code)]

use std::collections::{HashMap, HashSet};

use futures_util::future::{join_all, BoxFuture};
use thiserror::Error;
use tracing::{debug, warn};

pub type Context = HashMap<String, serde_json::Value>;
pub type StepValue = serde_json::Value;
pub type CompletedResults = HashMap<String, StepValue>;

#[derive(Debug, Error, Clone)]
#[error("{0}")]
pub struct StepError(pub String);

#[derive(Debug, Error, Clone)]
pub enum OrchestrationError {
    #[error("circular dependency involving step '{0}'")]
    CircularDependency(String),
    #[error("unsatisfied dependencies, steps never became ready: {0:?}")]
    UnsatisfiedDependencies(Vec<String>),
    #[error("critical step '{name}' failed: {cause}")]
    CriticalStepFailed { name: String, cause: StepError },
}

type StepFn = Box<dyn for<'a> Fn(&'a Context, &'a CompletedResults) -> BoxFuture<'a, Result<StepValue, StepError>> + Send + Sync>;

/// A single node in the workflow DAG.
pub struct Step {
    pub name: String,
    pub depends_on: Vec<String>,
    pub is_critical: bool,
    execute: StepFn,
}

impl Step {
    pub fn new(
        name: impl Into<String>,
        depends_on: Vec<String>,
        is_critical: bool,
        execute: impl for<'a> Fn(&'a Context, &'a CompletedResults) -> BoxFuture<'a, Result<StepValue, StepError>> + Send + Sync + 'static,
    ) -> Self {
        Self {
            name: name.into(),
            depends_on,
            is_critical,
            execute: Box::new(execute),
        }
    }
}

/// An unordered collection of steps executed in dependency-respecting
/// waves, each wave's steps running concurrently.
pub struct Workflow {
    steps: Vec<Step>,
}

impl Workflow {
    pub fn new(steps: Vec<Step>) -> Self {
        Self { steps }
    }

    fn check_acyclic(&self) -> Result<(), OrchestrationError> {
        let by_name: HashMap<&str, &Step> = self.steps.iter().map(|s| (s.name.as_str(), s)).collect();

        #[derive(Clone, Copy, PartialEq)]
        enum Mark {
            Visiting,
            Done,
        }
        let mut marks: HashMap<&str, Mark> = HashMap::new();

        fn visit<'a>(
            name: &'a str,
            by_name: &HashMap<&'a str, &'a Step>,
            marks: &mut HashMap<&'a str, Mark>,
        ) -> Result<(), OrchestrationError> {
            match marks.get(name) {
                Some(Mark::Done) => return Ok(()),
                Some(Mark::Visiting) => return Err(OrchestrationError::CircularDependency(name.to_string())),
                None => {}
            }
            marks.insert(name, Mark::Visiting);
            if let Some(step) = by_name.get(name) {
                for dep in &step.depends_on {
                    visit(dep, by_name, marks)?;
                }
            }
            marks.insert(name, Mark::Done);
            Ok(())
        }

        for step in &self.steps {
            visit(&step.name, &by_name, &mut marks)?;
        }
        Ok(())
    }

    /// Runs every step exactly once, in dependency order, and returns the
    /// map of step name to result.
    pub async fn run(&self, context: &Context) -> Result<CompletedResults, OrchestrationError> {
        self.check_acyclic()?;

        let mut completed: CompletedResults = HashMap::new();
        let mut pending: HashSet<&str> = self.steps.iter().map(|s| s.name.as_str()).collect();

        while !pending.is_empty() {
            let ready: Vec<&Step> = self
                .steps
                .iter()
                .filter(|s| pending.contains(s.name.as_str()))
                .filter(|s| s.depends_on.iter().all(|d| completed.contains_key(d)))
                .collect();

            if ready.is_empty() {
                let remaining: Vec<String> = pending.iter().map(|s| s.to_string()).collect();
                return Err(OrchestrationError::UnsatisfiedDependencies(remaining));
            }

            debug!(wave_size = ready.len(), "executing orchestration wave");

            let snapshot = completed.clone();
            let futures = ready.iter().map(|step| {
                let snapshot = &snapshot;
                async move { (step.name.as_str(), step.is_critical, (step.execute)(context, snapshot).await) }
            });
            let results = join_all(futures).await;

            for (name, is_critical, result) in results {
                pending.remove(name);
                match result {
                    Ok(value) => {
                        completed.insert(name.to_string(), value);
                    }
                    Err(err) if is_critical => {
                        return Err(OrchestrationError::CriticalStepFailed {
                            name: name.to_string(),
                            cause: err,
                        });
                    }
                    Err(err) => {
                        warn!(step = name, error = %err, "non-critical step failed, recording error as its result");
                        completed.insert(name.to_string(), serde_json::json!({ "error": err.0 }));
                    }
                }
            }
        }

        Ok(completed)
    }
}
