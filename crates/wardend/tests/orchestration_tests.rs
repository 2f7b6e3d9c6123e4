//! End-to-end orchestration tests.
//!
//! Deterministic: every port is faked (scripted engine, in-memory adapter,
//! recording notifier). No network, no LLM.

use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::Arc;
use warden_common::{
    AlertPolicy, Decision, DecisionEngine, EngineError, MonitorConfig, Resource, ResourceStatus,
    ScriptedEngine, Severity, ToolCall, ToolSpec, Transcript, TranscriptEntry,
    DEFAULT_MANAGED_LABEL,
};
use wardend::adapter::{FakeAdapter, RestartBehavior};
use wardend::dispatch::DispatchLoop;
use wardend::escalation::{CycleMode, DeliveryOutcome, DiagnosisDepth, EscalationEngine};
use wardend::healer::Healer;
use wardend::notifier::RecordingNotifier;
use wardend::tools::monitoring_registry;
use warden_common::{HealthSnapshot, Resolution};

fn resource(name: &str, status: ResourceStatus) -> Resource {
    let mut labels = BTreeMap::new();
    labels.insert(DEFAULT_MANAGED_LABEL.to_string(), "prod".to_string());
    labels.insert("role".to_string(), "app".to_string());
    Resource {
        id: format!("id-{}", name),
        name: name.to_string(),
        status,
        image: "app:latest".to_string(),
        labels,
        exit_code: Some(1),
    }
}

fn monitor_config(critical: &[&str]) -> MonitorConfig {
    MonitorConfig {
        retry_delay_secs: 0,
        critical_resources: critical.iter().map(|s| s.to_string()).collect(),
        ..MonitorConfig::default()
    }
}

fn escalation(
    adapter: Arc<FakeAdapter>,
    notifier: Arc<RecordingNotifier>,
    critical: &[&str],
) -> EscalationEngine {
    let monitor = monitor_config(critical);
    let healer = Arc::new(Healer::new(adapter, &monitor));
    EscalationEngine::new(healer, notifier, None, AlertPolicy::default(), monitor)
}

fn snapshot_of(stopped: Vec<Resource>) -> HealthSnapshot {
    HealthSnapshot::from_partition(Vec::new(), stopped)
}

// ---------------------------------------------------------------------------
// Escalation scenarios
// ---------------------------------------------------------------------------

/// Non-critical resource, heal mode, restart succeeds on attempt 2 of 3:
/// Success severity, suppressed by the default policy.
#[tokio::test]
async fn test_heal_succeeds_on_second_attempt_and_is_suppressed() {
    let adapter = Arc::new(FakeAdapter::new());
    adapter.insert(resource("r1", ResourceStatus::Stopped));
    adapter.script_restarts(
        "r1",
        vec![RestartBehavior::StayStopped, RestartBehavior::Succeed],
    );
    let notifier = Arc::new(RecordingNotifier::new());
    let engine = escalation(adapter.clone(), notifier.clone(), &[]);

    let reports = engine
        .run_cycle(
            &snapshot_of(vec![resource("r1", ResourceStatus::Stopped)]),
            CycleMode::Heal,
            DiagnosisDepth::Full,
        )
        .await;

    assert_eq!(reports.len(), 1);
    let report = &reports[0];
    assert_eq!(report.resolution, Resolution::Healed { attempts: 2 });
    assert_eq!(report.attempts.len(), 2);
    assert_eq!(report.alert.severity, Severity::Success);
    assert_eq!(report.delivery, DeliveryOutcome::Suppressed);
    assert_eq!(notifier.sent_count(), 0);
    assert_eq!(adapter.restart_count("r1"), 2);
}

/// Critical resource, heal mode, restart always fails: three attempts,
/// Critical severity, exactly one send.
#[tokio::test]
async fn test_exhausted_critical_heal_sends_exactly_once() {
    let adapter = Arc::new(FakeAdapter::new());
    adapter.insert(resource("r2", ResourceStatus::Stopped));
    adapter.script_restarts(
        "r2",
        vec![
            RestartBehavior::Fail("restart refused".into()),
            RestartBehavior::Fail("restart refused".into()),
            RestartBehavior::Fail("restart refused".into()),
        ],
    );
    let notifier = Arc::new(RecordingNotifier::new());
    let engine = escalation(adapter.clone(), notifier.clone(), &["r2"]);

    let reports = engine
        .run_cycle(
            &snapshot_of(vec![resource("r2", ResourceStatus::Stopped)]),
            CycleMode::Heal,
            DiagnosisDepth::Full,
        )
        .await;

    assert_eq!(adapter.restart_count("r2"), 3);
    assert!(matches!(
        reports[0].resolution,
        Resolution::Exhausted { attempts: 3, .. }
    ));
    assert_eq!(reports[0].alert.severity, Severity::Critical);
    assert_eq!(notifier.sent_count(), 1);
}

/// Report-only mode on a critical resource: no restart, Critical alert
/// whose text references the skipped healing.
#[tokio::test]
async fn test_report_only_mode_alerts_without_restarting() {
    let adapter = Arc::new(FakeAdapter::new());
    adapter.insert(resource("r3", ResourceStatus::Stopped));
    let notifier = Arc::new(RecordingNotifier::new());
    let engine = escalation(adapter.clone(), notifier.clone(), &["r3"]);

    let reports = engine
        .run_cycle(
            &snapshot_of(vec![resource("r3", ResourceStatus::Stopped)]),
            CycleMode::Check,
            DiagnosisDepth::Full,
        )
        .await;

    assert!(adapter.restart_calls().is_empty());
    assert_eq!(reports[0].resolution, Resolution::Reported);
    assert_eq!(reports[0].alert.severity, Severity::Critical);
    assert!(reports[0].alert.body.contains("no healing attempted"));
    assert_eq!(notifier.sent_count(), 1);
    assert!(notifier.sent()[0].subject.contains("no healing attempted"));
}

/// Two stopped resources in one heal cycle resolve independently: one
/// heals (suppressed), one exhausts (sent).
#[tokio::test]
async fn test_mixed_cycle_resolves_each_resource_independently() {
    let adapter = Arc::new(FakeAdapter::new());
    adapter.insert(resource("good", ResourceStatus::Stopped));
    adapter.insert(resource("bad", ResourceStatus::Stopped));
    adapter.script_restarts(
        "bad",
        vec![
            RestartBehavior::Fail("x".into()),
            RestartBehavior::Fail("x".into()),
            RestartBehavior::Fail("x".into()),
        ],
    );
    let notifier = Arc::new(RecordingNotifier::new());
    let engine = escalation(adapter.clone(), notifier.clone(), &[]);

    let reports = engine
        .run_cycle(
            &snapshot_of(vec![
                resource("bad", ResourceStatus::Stopped),
                resource("good", ResourceStatus::Stopped),
            ]),
            CycleMode::Heal,
            DiagnosisDepth::Full,
        )
        .await;

    assert_eq!(reports.len(), 2);
    // reports are sorted by name
    assert!(matches!(reports[0].resolution, Resolution::Exhausted { .. }));
    assert_eq!(reports[1].resolution, Resolution::Healed { attempts: 1 });
    assert_eq!(notifier.sent_count(), 1, "only the exhausted incident sends");
}

// ---------------------------------------------------------------------------
// Dispatch loop scenarios
// ---------------------------------------------------------------------------

fn dispatch_setup() -> (Arc<FakeAdapter>, Arc<wardend::registry::ToolRegistry>) {
    let adapter = Arc::new(FakeAdapter::new());
    adapter.insert(resource("prod-web-01", ResourceStatus::Running));
    let registry = Arc::new(monitoring_registry(adapter.clone(), DEFAULT_MANAGED_LABEL));
    (adapter, registry)
}

/// Engine answers directly: one engine call, zero dispatches.
#[tokio::test]
async fn test_direct_answer_uses_single_engine_call() {
    let (_adapter, registry) = dispatch_setup();
    let engine = Arc::new(ScriptedEngine::always(Decision::Answer(
        "everything is fine".into(),
    )));
    let dispatch = DispatchLoop::new(engine.clone(), registry, 3);

    let answer = dispatch.run("how is the fleet?").await.unwrap();
    assert_eq!(answer, "everything is fine");
    assert_eq!(engine.call_count(), 1);
}

/// max_iterations = 2 against an engine that always wants tools: two
/// tool-bearing rounds, then exactly one final no-tool call.
#[tokio::test]
async fn test_engine_call_bound_holds_for_tool_hungry_engine() {
    let (_adapter, registry) = dispatch_setup();
    let engine = Arc::new(ScriptedEngine::always(Decision::Actions {
        text: None,
        calls: vec![ToolCall::new("list_all_resources", serde_json::json!({}))],
    }));
    let dispatch = DispatchLoop::new(engine.clone(), registry, 2);

    let _ = dispatch.run("keep digging").await.unwrap();

    assert_eq!(engine.call_count(), 3, "max_iterations + 1 calls");
    let offered = engine.tools_offered();
    assert!(offered[0] > 0 && offered[1] > 0);
    assert_eq!(*offered.last().unwrap(), 0, "final call withholds tools");
}

/// Engine that checks the transcript invariant on every call: any model
/// entry with N calls is immediately followed by exactly its N results, in
/// issue order, before anything else.
struct OrderAssertingEngine {
    inner: ScriptedEngine,
}

fn assert_ordering(transcript: &Transcript) {
    let entries = transcript.entries();
    let mut i = 0;
    while i < entries.len() {
        if let TranscriptEntry::Model { tool_calls, .. } = &entries[i] {
            for (offset, call) in tool_calls.iter().enumerate() {
                match entries.get(i + 1 + offset) {
                    Some(TranscriptEntry::ToolOutput(result)) => {
                        assert_eq!(
                            result.correlation_id, call.correlation_id,
                            "result order must match call issue order"
                        );
                    }
                    other => panic!(
                        "expected tool output at offset {}, found {:?}",
                        i + 1 + offset,
                        other
                    ),
                }
            }
            i += 1 + tool_calls.len();
        } else {
            i += 1;
        }
    }
}

#[async_trait]
impl DecisionEngine for OrderAssertingEngine {
    async fn decide(
        &self,
        transcript: &Transcript,
        tools: &[ToolSpec],
    ) -> Result<Decision, EngineError> {
        assert_ordering(transcript);
        self.inner.decide(transcript, tools).await
    }
}

#[tokio::test]
async fn test_transcript_ordering_invariant_held_across_rounds() {
    let (_adapter, registry) = dispatch_setup();
    let engine = Arc::new(OrderAssertingEngine {
        inner: ScriptedEngine::new(vec![
            Ok(Decision::Actions {
                text: Some("checking".into()),
                calls: vec![
                    ToolCall::new("list_all_resources", serde_json::json!({})),
                    ToolCall::new(
                        "get_resource_status",
                        serde_json::json!({"name": "prod-web-01"}),
                    ),
                ],
            }),
            Ok(Decision::Actions {
                text: None,
                calls: vec![ToolCall::new(
                    "check_unhealthy_resources",
                    serde_json::json!({}),
                )],
            }),
            Ok(Decision::Answer("done".into())),
        ]),
    });
    let dispatch = DispatchLoop::new(engine, registry, 5);

    let answer = dispatch.run("deep check").await.unwrap();
    assert_eq!(answer, "done");
}

/// An engine transport failure aborts the loop immediately; nothing is
/// dispatched afterwards and nothing retries the engine.
#[tokio::test]
async fn test_engine_failure_propagates_without_retry() {
    let (adapter, registry) = dispatch_setup();
    let engine = Arc::new(ScriptedEngine::new(vec![
        Ok(Decision::Actions {
            text: None,
            calls: vec![ToolCall::new("list_all_resources", serde_json::json!({}))],
        }),
        Err(EngineError::Http("connection refused".into())),
    ]));
    let dispatch = DispatchLoop::new(engine.clone(), registry, 5);

    let result = dispatch.run("q").await;
    assert!(matches!(result, Err(EngineError::Http(_))));
    assert_eq!(engine.call_count(), 2);
    assert!(adapter.restart_calls().is_empty());
}

// ---------------------------------------------------------------------------
// Diagnosis flows into alerts
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_diagnosis_text_lands_in_alert_body() {
    let adapter = Arc::new(FakeAdapter::new());
    adapter.insert(resource("r3", ResourceStatus::Stopped));
    let notifier = Arc::new(RecordingNotifier::new());
    let monitor = monitor_config(&[]);
    let healer = Arc::new(Healer::new(adapter.clone(), &monitor));

    let scripted: Arc<dyn DecisionEngine> = Arc::new(ScriptedEngine::always(Decision::Answer(
        "out of memory, raise the limit".into(),
    )));
    let agent = Arc::new(wardend::diagnosis::DiagnosisAgent::new(
        scripted,
        adapter,
        DEFAULT_MANAGED_LABEL,
        3,
    ));
    let engine = EscalationEngine::new(
        healer,
        notifier.clone(),
        Some(agent),
        AlertPolicy::default(),
        monitor,
    );

    let reports = engine
        .run_cycle(
            &snapshot_of(vec![resource("r3", ResourceStatus::Stopped)]),
            CycleMode::Check,
            DiagnosisDepth::Quick,
        )
        .await;

    assert_eq!(reports[0].diagnosis.len(), 1);
    assert!(reports[0]
        .alert
        .body
        .contains("out of memory, raise the limit"));
    assert!(notifier.sent()[0].body.contains("quick diagnosis"));
}

/// Engine downtime degrades diagnosis to nothing; the incident still
/// resolves and alerts.
#[tokio::test]
async fn test_engine_downtime_does_not_block_escalation() {
    let adapter = Arc::new(FakeAdapter::new());
    adapter.insert(resource("r3", ResourceStatus::Stopped));
    let notifier = Arc::new(RecordingNotifier::new());
    let monitor = monitor_config(&[]);
    let healer = Arc::new(Healer::new(adapter.clone(), &monitor));

    let dead: Arc<dyn DecisionEngine> = Arc::new(ScriptedEngine::always_error(
        EngineError::Timeout(120),
    ));
    let agent = Arc::new(wardend::diagnosis::DiagnosisAgent::new(
        dead,
        adapter,
        DEFAULT_MANAGED_LABEL,
        3,
    ));
    let engine = EscalationEngine::new(
        healer,
        notifier.clone(),
        Some(agent),
        AlertPolicy::default(),
        monitor,
    );

    let reports = engine
        .run_cycle(
            &snapshot_of(vec![resource("r3", ResourceStatus::Stopped)]),
            CycleMode::Heal,
            DiagnosisDepth::Full,
        )
        .await;

    assert_eq!(reports.len(), 1);
    assert!(reports[0].diagnosis.is_empty());
    assert_eq!(reports[0].resolution, Resolution::Healed { attempts: 1 });
}
