//! Universal invariants that must hold across every crate in the
//! workspace, independent of any single end-to-end scenario.

use std::sync::Arc;

use async_trait::async_trait;
use chimera_analytics::{PredictiveAnalytics, RiskLevel};
use chimera_domain::deployment::{Deployment, DeploymentStatus, NixConfig};
use chimera_domain::playbook::{Playbook, PlaybookStep};
use chimera_drift::{DriftDetectionService, HealingAction};
use chimera_events::DomainEventKind;
use chimera_orchestrator::{Context, OrchestrationError, Step, StepError, Workflow};
use chimera_ports::{DriftDetector, DriftDetectorError};
use chimera_registry::{AgentStatus, NodeHealth, Registry};
use chimera_types::{CongruenceReport, Fingerprint, Node, SessionId, Severity};
use chrono::Utc;

fn fp(s: &str) -> Fingerprint {
    Fingerprint::parse(s).unwrap()
}

// ─── Value type round-trips ─────────────────────────────────────────────────────

#[test]
fn node_parse_display_round_trips() {
    for raw in ["web-1", "deploy@db-1.internal:2222", "admin@[2001:db8::1]:22"] {
        let node = Node::parse(raw).unwrap();
        assert_eq!(Node::parse(&node.to_string()).unwrap(), node);
    }
}

#[test]
fn fingerprint_round_trips_and_rejects_invalid_shapes() {
    let valid = "abc123def456abc123def456abc1234";
    let h = fp(valid);
    assert_eq!(fp(&h.as_str().to_string()), h);

    assert!(Fingerprint::parse("too-short").is_err());
    assert!(Fingerprint::parse("not-hex-zzzzzzzzzzzzzzzzzzzzzzzzzzzzzzz").is_err());
}

// ─── Deployment aggregate: events determine final state ────────────────────────

#[test]
fn deployment_event_sequence_uniquely_determines_final_state() {
    let session = SessionId::parse("sess-invariant").unwrap();
    let config = NixConfig::new(std::env::temp_dir()).unwrap();

    let completed = Deployment::new(session.clone(), config.clone())
        .start_build()
        .unwrap()
        .complete_build(fp("abc123def456abc123def456abc1234"))
        .unwrap()
        .complete()
        .unwrap();

    assert_eq!(completed.status(), DeploymentStatus::Completed);
    let kinds: Vec<_> = completed.events().iter().map(|e| e.kind()).collect();
    assert_eq!(kinds, vec![DomainEventKind::Started, DomainEventKind::BuildCompleted, DomainEventKind::Completed]);

    let failed = Deployment::new(session, config).start_build().unwrap().fail("build error");
    assert_eq!(failed.status(), DeploymentStatus::Failed);
    assert_eq!(failed.events().iter().map(|e| e.kind()).collect::<Vec<_>>(), vec![DomainEventKind::Started, DomainEventKind::Failed]);
}

// ─── Playbook validation gates execution ────────────────────────────────────────

#[tokio::test]
async fn invalid_playbook_always_fails_with_every_step_skipped() {
    let playbook = Playbook {
        id: "pb".to_string(),
        name: "bad".to_string(),
        description: String::new(),
        author: "ops".to_string(),
        version: "1.0.0".to_string(),
        tags: vec![],
        target_os: "nixos".to_string(),
        steps: vec![PlaybookStep {
            name: "wipe".to_string(),
            command: "rm -rf /".to_string(),
            timeout_seconds: 5,
            rollback_on_failure: false,
        }],
    };

    assert!(!playbook.validate().is_empty());

    let engine = chimera_playbook::PlaybookEngine::new();
    let result = engine.execute(&playbook).await;
    assert_eq!(result.status, chimera_playbook::PlaybookExecutionStatus::Failed);
    assert!(result.step_results.iter().all(|r| r.status == chimera_playbook::StepStatus::Skipped));
}

// ─── DAG orchestrator: total result or single critical failure ─────────────────

#[tokio::test]
async fn acyclic_workflow_either_completes_every_step_or_fails_exactly_one() {
    let names = ["a", "b", "c"];
    let steps: Vec<Step> = names
        .iter()
        .map(|n| Step::new(*n, vec![], true, |_ctx, _completed| Box::pin(async { Ok(serde_json::json!(true)) })))
        .collect();
    let workflow = Workflow::new(steps);
    let results = workflow.run(&Context::new()).await.unwrap();
    let mut keys: Vec<&str> = results.keys().map(String::as_str).collect();
    keys.sort_unstable();
    assert_eq!(keys, names);

    let failing = Step::new("b", vec![], true, |_ctx, _completed| Box::pin(async { Err(StepError("boom".to_string())) }));
    let workflow = Workflow::new(vec![failing]);
    let err = workflow.run(&Context::new()).await.unwrap_err();
    assert!(matches!(err, OrchestrationError::CriticalStepFailed { name, .. } if name == "b"));
}

// ─── Drift service: congruent → no action, unreachable → critical rollback ─────

struct CongruentDetector;

#[async_trait]
impl DriftDetector for CongruentDetector {
    async fn check_node(&self, node: &Node, expected: &Fingerprint) -> Result<CongruenceReport, DriftDetectorError> {
        Ok(CongruenceReport::congruent(node.clone(), expected.clone()))
    }
    async fn get_actual_fingerprint(&self, _node: &Node) -> Result<Option<Fingerprint>, DriftDetectorError> {
        Ok(None)
    }
}

struct UnreachableDetector;

#[async_trait]
impl DriftDetector for UnreachableDetector {
    async fn check_node(&self, _node: &Node, _expected: &Fingerprint) -> Result<CongruenceReport, DriftDetectorError> {
        Err(DriftDetectorError::TransportError("connection refused".to_string()))
    }
    async fn get_actual_fingerprint(&self, _node: &Node) -> Result<Option<Fingerprint>, DriftDetectorError> {
        Ok(None)
    }
}

#[tokio::test]
async fn congruent_node_needs_no_action_unreachable_node_is_critical_rollback() {
    let node = Node::parse("web-1").unwrap();
    let expected = fp("abc123def456abc123def456abc1234");

    let congruent_service = DriftDetectionService::new(CongruentDetector);
    let analysis = congruent_service.analyze(&node, &expected).await;
    assert_eq!(analysis.healing_action, HealingAction::None);

    let unreachable_service = DriftDetectionService::new(UnreachableDetector);
    let analysis = unreachable_service.analyze(&node, &expected).await;
    assert_eq!(analysis.severity, Severity::Critical);
    assert_eq!(analysis.healing_action, HealingAction::Rollback);
}

// ─── Predictive analytics: empty baseline, monotonic with drift history ────────

#[test]
fn empty_history_baseline_and_monotonic_with_recent_drift() {
    let analytics = PredictiveAnalytics::new(168);
    let quiet_node = Node::parse("web-quiet").unwrap();
    let baseline = analytics.assess_risk(&quiet_node);
    assert_eq!(baseline.score, 0.0);
    assert_eq!(baseline.level, RiskLevel::Low);
    assert!((baseline.predicted_drift_probability - 0.05).abs() < f64::EPSILON);

    let noisy_node = Node::parse("web-noisy").unwrap();
    let now = Utc::now();
    for i in 0..10 {
        analytics.record_drift(noisy_node.clone(), Severity::Critical, Some(now - chrono::Duration::hours(i)));
    }
    let noisy = analytics.assess_risk(&noisy_node);
    assert!(noisy.score > baseline.score);
}

// ─── Registry: healing command round trip, concurrent writes all land ──────────

#[test]
fn healing_command_pops_exactly_once() {
    let registry = Registry::new();
    registry.set_healing_command("web-1", "systemctl restart openclaw");
    assert_eq!(registry.pop_healing_command("web-1").as_deref(), Some("systemctl restart openclaw"));
    assert_eq!(registry.pop_healing_command("web-1"), None);
}

#[tokio::test]
async fn concurrent_health_updates_for_distinct_nodes_all_land() {
    let registry = Arc::new(Registry::new());
    let mut set = tokio::task::JoinSet::new();

    for i in 0..50 {
        let registry = registry.clone();
        set.spawn(async move {
            registry.update_health(NodeHealth::new(format!("web-{i}"), AgentStatus::Healthy));
        });
    }

    while set.join_next().await.is_some() {}

    assert_eq!(registry.total_count(), 50);
    for i in 0..50 {
        assert!(registry.get(&format!("web-{i}")).is_some());
    }
}
