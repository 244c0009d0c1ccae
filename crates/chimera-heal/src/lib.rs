//! Autonomous healing loop: resolve the fleet's expected configuration
//! once, then repeatedly scan every node for drift and redeploy to
//! whichever nodes have fallen out of congruence.

#![forbid(unsafe_code)]

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chimera_orchestrator::{Context, OrchestrationError, Step, Workflow};
use chimera_ports::{Nix, NixError, RemoteExecutor};
use chimera_types::{CongruenceReport, Node};
use thiserror::Error;
use tracing::{info, warn};

#[derive(Debug, Error)]
pub enum HealError {
    #[error("could not resolve the expected fingerprint, loop will not start: {0}")]
    ExpectedFingerprintUnavailable(NixError),
}

/// Lets a caller ask a running loop to stop after its current scan.
#[derive(Clone, Default)]
pub struct CancellationFlag(Arc<AtomicBool>);

impl CancellationFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Builds the four-step deploy DAG (build -> sync ∥ session -> execute)
/// over an injected [`Nix`]/[`RemoteExecutor`] pair, targeting `nodes`.
pub fn build_deployment_workflow<N, R>(nix: Arc<N>, executor: Arc<R>, config_path: String, nodes: Vec<Node>) -> Workflow
where
    N: Nix + 'static,
    R: RemoteExecutor + 'static,
{
    let build = {
        let nix = nix.clone();
        let config_path = config_path.clone();
        Step::new("build", vec![], true, move |_ctx, _completed| {
            let nix = nix.clone();
            let config_path = config_path.clone();
            Box::pin(async move {
                let fingerprint = nix.build(&config_path).await.map_err(|e| chimera_orchestrator::StepError(e.to_string()))?;
                Ok(serde_json::json!(fingerprint.as_str()))
            })
        })
    };

    let sync = {
        let executor = executor.clone();
        let config_path = config_path.clone();
        let nodes = nodes.clone();
        Step::new("sync", vec!["build".to_string()], true, move |_ctx, _completed| {
            let executor = executor.clone();
            let config_path = config_path.clone();
            let nodes = nodes.clone();
            Box::pin(async move {
                executor
                    .sync_artifact(&nodes, &config_path)
                    .await
                    .map_err(|e| chimera_orchestrator::StepError(e.to_string()))?;
                Ok(serde_json::json!(true))
            })
        })
    };

    let session = {
        let nix = nix.clone();
        let config_path = config_path.clone();
        Step::new("session", vec!["build".to_string()], true, move |_ctx, _completed| {
            let nix = nix.clone();
            let config_path = config_path.clone();
            Box::pin(async move {
                let wrapper = nix
                    .shell(&config_path, "nixos-rebuild switch")
                    .await
                    .map_err(|e| chimera_orchestrator::StepError(e.to_string()))?;
                Ok(serde_json::json!(wrapper))
            })
        })
    };

    let execute = {
        let executor = executor.clone();
        let nodes = nodes.clone();
        Step::new("execute", vec!["sync".to_string(), "session".to_string()], true, move |_ctx, completed| {
            let executor = executor.clone();
            let nodes = nodes.clone();
            Box::pin(async move {
                let command = completed.get("session").and_then(|v| v.as_str()).unwrap_or("nixos-rebuild switch").to_string();
                executor
                    .exec_command(&nodes, &command)
                    .await
                    .map_err(|e| chimera_orchestrator::StepError(e.to_string()))?;
                Ok(serde_json::json!(true))
            })
        })
    };

    Workflow::new(vec![build, sync, session, execute])
}

/// Drives the repeated scan-then-heal cycle over a fleet.
pub struct AutonomousHealingLoop<N, R> {
    nix: Arc<N>,
    executor: Arc<R>,
    nodes: Vec<Node>,
    config_path: String,
    interval: Duration,
    run_once: bool,
}

impl<N, R> AutonomousHealingLoop<N, R>
where
    N: Nix + 'static,
    R: RemoteExecutor + 'static,
{
    pub fn new(nix: N, executor: R, nodes: Vec<Node>, config_path: impl Into<String>, interval: Duration, run_once: bool) -> Self {
        Self {
            nix: Arc::new(nix),
            executor: Arc::new(executor),
            nodes,
            config_path: config_path.into(),
            interval,
            run_once,
        }
    }

    /// Runs the loop until `run_once` is satisfied or `cancellation` fires.
    /// Never retries the initial expected-fingerprint resolution: a
    /// failure there aborts before the loop starts, per the healing
    /// protocol's error-handling policy.
    pub async fn run(&self, cancellation: CancellationFlag) -> Result<(), HealError> {
        let expected = self
            .nix
            .build(&self.config_path)
            .await
            .map_err(HealError::ExpectedFingerprintUnavailable)?;

        loop {
            let reports = self.scan(&expected).await;
            let drifted: Vec<Node> = reports.iter().filter(|r| !r.is_congruent).map(|r| r.node.clone()).collect();

            if !drifted.is_empty() {
                info!(count = drifted.len(), "drift detected, dispatching deploy workflow");
                let workflow = build_deployment_workflow(self.nix.clone(), self.executor.clone(), self.config_path.clone(), drifted);
                match workflow.run(&Context::new()).await {
                    Ok(_) => info!("healing deploy completed"),
                    Err(OrchestrationError::CriticalStepFailed { name, cause }) => {
                        warn!(step = name, error = %cause, "healing deploy aborted");
                    }
                    Err(e) => warn!(error = %e, "healing deploy failed"),
                }
            }

            if self.run_once || cancellation.is_cancelled() {
                break;
            }
            tokio::time::sleep(self.interval).await;
        }

        Ok(())
    }

    async fn scan(&self, expected: &chimera_types::Fingerprint) -> Vec<CongruenceReport> {
        let futures = self.nodes.iter().map(|node| async move {
            match self.executor.current_fingerprint(node).await {
                Ok(Some(actual)) if &actual == expected => CongruenceReport::congruent(node.clone(), expected.clone()),
                Ok(actual) => CongruenceReport::drifted(node.clone(), expected.clone(), actual, "fingerprint mismatch"),
                Err(e) => CongruenceReport::drifted(node.clone(), expected.clone(), None, e.to_string()),
            }
        });
        futures_util::future::join_all(futures).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use chimera_ports::{RemoteExecError, RemoteExecutor};
    use chimera_types::Fingerprint;
    use parking_lot::Mutex;

    struct FakeNix {
        fingerprint: Fingerprint,
    }

    #[async_trait]
    impl Nix for FakeNix {
        async fn build(&self, _path: &str) -> Result<Fingerprint, NixError> {
            Ok(self.fingerprint.clone())
        }
        async fn instantiate(&self, _path: &str) -> Result<String, NixError> {
            Ok("drv-path".to_string())
        }
        async fn shell(&self, _path: &str, command: &str) -> Result<String, NixError> {
            Ok(command.to_string())
        }
    }

    struct FakeExecutor {
        /// Reports this fingerprint for every node until `heal` runs, then congruent.
        drifted_fingerprint: Fingerprint,
        expected: Fingerprint,
        sync_calls: Mutex<u32>,
    }

    #[async_trait]
    impl RemoteExecutor for FakeExecutor {
        async fn sync_artifact(&self, _nodes: &[Node], _artifact_path: &str) -> Result<(), RemoteExecError> {
            *self.sync_calls.lock() += 1;
            Ok(())
        }
        async fn exec_command(&self, _nodes: &[Node], _command: &str) -> Result<(), RemoteExecError> {
            Ok(())
        }
        async fn current_fingerprint(&self, _node: &Node) -> Result<Option<Fingerprint>, RemoteExecError> {
            if *self.sync_calls.lock() > 0 {
                Ok(Some(self.expected.clone()))
            } else {
                Ok(Some(self.drifted_fingerprint.clone()))
            }
        }
        async fn rollback(&self, _nodes: &[Node], _generation: Option<&str>) -> Result<(), RemoteExecError> {
            Ok(())
        }
    }

    fn fp(s: &str) -> Fingerprint {
        Fingerprint::parse(s).unwrap()
    }

    #[tokio::test]
    async fn heals_a_drifted_node_exactly_once_with_run_once() {
        let expected = fp("aaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa");
        let drifted = fp("bbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbb");
        let nix = FakeNix { fingerprint: expected.clone() };
        let executor = FakeExecutor {
            drifted_fingerprint: drifted,
            expected: expected.clone(),
            sync_calls: Mutex::new(0),
        };
        let node = Node::parse("web-1").unwrap();
        let loop_ = AutonomousHealingLoop::new(nix, executor, vec![node.clone()], "/etc/nixos/config.nix", Duration::from_secs(1), true);

        loop_.run(CancellationFlag::new()).await.unwrap();
        assert_eq!(*loop_.executor.sync_calls.lock(), 1);

        let reports = loop_.scan(&expected).await;
        assert!(reports[0].is_congruent);
    }

    #[tokio::test]
    async fn aborts_before_starting_when_expected_fingerprint_unavailable() {
        struct FailingNix;
        #[async_trait]
        impl Nix for FailingNix {
            async fn build(&self, _path: &str) -> Result<Fingerprint, NixError> {
                Err(NixError::NotInstalled)
            }
            async fn instantiate(&self, _path: &str) -> Result<String, NixError> {
                unreachable!()
            }
            async fn shell(&self, _path: &str, _command: &str) -> Result<String, NixError> {
                unreachable!()
            }
        }

        let executor = FakeExecutor {
            drifted_fingerprint: fp("bbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbb"),
            expected: fp("aaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa"),
            sync_calls: Mutex::new(0),
        };
        let loop_ = AutonomousHealingLoop::new(FailingNix, executor, vec![], "/etc/nixos/config.nix", Duration::from_secs(1), true);
        assert!(matches!(loop_.run(CancellationFlag::new()).await, Err(HealError::ExpectedFingerprintUnavailable(_))));
    }
}
