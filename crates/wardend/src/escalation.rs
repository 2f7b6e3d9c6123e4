//! Incident escalation engine.
//!
//! Converts a health snapshot's stopped resources into remediation actions
//! and exactly one alert per incident resolution. Report-only cycles alert
//! without touching resources; heal cycles run the healing retry engine
//! first and classify severity from the outcome. Stopped resources are
//! processed concurrently; an in-flight guard keeps overlapping cycles from
//! double-processing the same unresolved incident.

use crate::diagnosis::DiagnosisAgent;
use crate::healer::Healer;
use crate::notifier::Notifier;
use serde::Serialize;
use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use tokio::sync::watch;
use tokio::task::JoinSet;
use tracing::{info, warn};
use warden_common::{
    Alert, AlertPolicy, HealingAttempt, HealthSnapshot, MonitorConfig, Resolution, Resource,
    Severity,
};

/// Whether a cycle may mutate resources
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleMode {
    /// Report-only: alert, never restart
    Check,
    /// Diagnose, restart with retries, then alert on the outcome
    Heal,
}

/// How much engine-grounded diagnosis a cycle runs per incident
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiagnosisDepth {
    /// Multi-step analysis for one-shot runs
    Full,
    /// Single quick step for continuous cycles
    Quick,
}

/// What happened to the incident's alert
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum DeliveryOutcome {
    Sent,
    /// Policy said record-only; `send` was never invoked
    Suppressed,
    /// Delivery failed; the resolution stands, only the notification is lost
    Failed(String),
}

/// Full record of one incident resolution
#[derive(Debug, Clone, Serialize)]
pub struct IncidentReport {
    pub resource: Resource,
    pub resolution: Resolution,
    pub attempts: Vec<HealingAttempt>,
    /// Titled diagnosis sections, in the order they ran
    pub diagnosis: Vec<(String, String)>,
    pub alert: Alert,
    pub delivery: DeliveryOutcome,
}

#[derive(Clone)]
pub struct EscalationEngine {
    healer: Arc<Healer>,
    notifier: Arc<dyn Notifier>,
    diagnosis: Option<Arc<DiagnosisAgent>>,
    policy: AlertPolicy,
    monitor: MonitorConfig,
    in_flight: Arc<Mutex<HashSet<String>>>,
    cancel: watch::Receiver<bool>,
}

impl EscalationEngine {
    pub fn new(
        healer: Arc<Healer>,
        notifier: Arc<dyn Notifier>,
        diagnosis: Option<Arc<DiagnosisAgent>>,
        policy: AlertPolicy,
        monitor: MonitorConfig,
    ) -> Self {
        let (_tx, cancel) = watch::channel(false);
        Self {
            healer,
            notifier,
            diagnosis,
            policy,
            monitor,
            in_flight: Arc::new(Mutex::new(HashSet::new())),
            cancel,
        }
    }

    /// Use an external cancellation signal; checked between resources, never
    /// mid-attempt.
    pub fn with_cancel(mut self, cancel: watch::Receiver<bool>) -> Self {
        self.cancel = cancel;
        self
    }

    fn cancelled(&self) -> bool {
        *self.cancel.borrow()
    }

    fn claim(&self, name: &str) -> bool {
        self.in_flight.lock().unwrap().insert(name.to_string())
    }

    fn release(&self, name: &str) {
        self.in_flight.lock().unwrap().remove(name);
    }

    /// Process every stopped resource in the snapshot. Incidents run
    /// concurrently; each owns its retry counter and delays. Reports come
    /// back sorted by resource name for stable downstream handling.
    pub async fn run_cycle(
        &self,
        snapshot: &HealthSnapshot,
        mode: CycleMode,
        depth: DiagnosisDepth,
    ) -> Vec<IncidentReport> {
        let mut tasks = JoinSet::new();

        for resource in &snapshot.stopped_resources {
            if self.cancelled() {
                info!("cycle cancelled, skipping remaining resources");
                break;
            }
            if !self.claim(&resource.name) {
                info!(
                    resource = %resource.name,
                    "incident already in flight from an overlapping cycle, skipping"
                );
                continue;
            }

            let engine = self.clone();
            let resource = resource.clone();
            tasks.spawn(async move {
                let report = engine.resolve_incident(resource, mode, depth).await;
                engine.release(&report.resource.name);
                report
            });
        }

        let mut reports = Vec::new();
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(report) => reports.push(report),
                Err(e) => warn!(error = %e, "incident task failed to join"),
            }
        }
        reports.sort_by(|a, b| a.resource.name.cmp(&b.resource.name));
        reports
    }

    /// Drive one incident to resolution and exactly one notification
    /// attempt (subject to the suppression policy).
    async fn resolve_incident(
        &self,
        resource: Resource,
        mode: CycleMode,
        depth: DiagnosisDepth,
    ) -> IncidentReport {
        info!(
            resource = %resource.name,
            status = %resource.status,
            role = resource.role(),
            mode = ?mode,
            "incident detected"
        );

        let mut sections = Vec::new();
        self.run_pre_diagnosis(&resource, mode, depth, &mut sections)
            .await;

        let (resolution, attempts) = match mode {
            CycleMode::Check => (Resolution::Reported, Vec::new()),
            CycleMode::Heal => {
                let report = self.healer.heal(&resource.name).await;
                self.run_post_diagnosis(&resource, &report.resolution, depth, &mut sections)
                    .await;
                (report.resolution, report.attempts)
            }
        };

        let alert = self.build_alert(&resource, &resolution, &attempts, &sections);
        let delivery = self.deliver(&alert).await;

        IncidentReport {
            resource,
            resolution,
            attempts,
            diagnosis: sections,
            alert,
            delivery,
        }
    }

    async fn run_pre_diagnosis(
        &self,
        resource: &Resource,
        mode: CycleMode,
        depth: DiagnosisDepth,
        sections: &mut Vec<(String, String)>,
    ) {
        let Some(agent) = &self.diagnosis else {
            return;
        };

        match (mode, depth) {
            (CycleMode::Check, DiagnosisDepth::Full) => {
                Self::record(sections, "status detail", agent.status_detail(resource).await);
                Self::record(sections, "log analysis", agent.log_analysis(resource).await);
                Self::record(sections, "root cause", agent.root_cause(resource).await);
            }
            (CycleMode::Heal, DiagnosisDepth::Full) => {
                Self::record(
                    sections,
                    "failure analysis",
                    agent.failure_analysis(resource).await,
                );
                Self::record(
                    sections,
                    "restart safety",
                    agent.restart_safety(resource).await,
                );
            }
            (_, DiagnosisDepth::Quick) => {
                Self::record(
                    sections,
                    "quick diagnosis",
                    agent.quick_diagnosis(resource).await,
                );
            }
        }
    }

    async fn run_post_diagnosis(
        &self,
        resource: &Resource,
        resolution: &Resolution,
        depth: DiagnosisDepth,
        sections: &mut Vec<(String, String)>,
    ) {
        let Some(agent) = &self.diagnosis else {
            return;
        };
        if depth != DiagnosisDepth::Full {
            return;
        }

        match resolution {
            Resolution::Healed { .. } => {
                Self::record(
                    sections,
                    "recovery verification",
                    agent.verify_recovery(resource).await,
                );
            }
            Resolution::Exhausted { attempts, .. } => {
                Self::record(
                    sections,
                    "healing failure analysis",
                    agent.why_heal_failed(resource, *attempts).await,
                );
            }
            Resolution::Missing | Resolution::Reported => {}
        }
    }

    /// Diagnosis is advisory: failures are logged and the cycle moves on.
    fn record(
        sections: &mut Vec<(String, String)>,
        title: &str,
        outcome: Result<String, warden_common::EngineError>,
    ) {
        match outcome {
            Ok(text) if !text.is_empty() => sections.push((title.to_string(), text)),
            Ok(_) => {}
            Err(e) => warn!(step = title, error = %e, "diagnosis step unavailable"),
        }
    }

    fn build_alert(
        &self,
        resource: &Resource,
        resolution: &Resolution,
        attempts: &[HealingAttempt],
        sections: &[(String, String)],
    ) -> Alert {
        let critical = self.monitor.is_critical(&resource.name);
        let dedup_key = format!("{}:{}", resource.id, resolution.kind());

        let (severity, subject, mut body) = match resolution {
            Resolution::Reported => {
                let severity = if critical {
                    Severity::Critical
                } else {
                    Severity::Warning
                };
                (
                    severity,
                    format!("Resource {} down (no healing attempted)", resource.name),
                    format!(
                        "Resource alert: {}\n\n\
                         Status: DOWN ({})\n\
                         Severity: {}\n\
                         Mode: check only - no healing attempted (awaiting manual intervention)\n\n\
                         Details:\n\
                         - Role: {}\n\
                         - Environment: {}\n",
                        resource.name,
                        resource.status,
                        severity,
                        resource.role(),
                        resource.environment(),
                    ),
                )
            }
            Resolution::Healed {
                attempts: attempt_count,
            } => {
                let new_status = attempts
                    .last()
                    .and_then(|a| a.new_status)
                    .map(|s| s.to_string())
                    .unwrap_or_else(|| "running".to_string());
                (
                    Severity::Success,
                    format!(
                        "Resource {} auto-healed after {} attempt(s)",
                        resource.name, attempt_count
                    ),
                    format!(
                        "Resource alert: {}\n\n\
                         Status: resource was DOWN but has been auto-restarted\n\
                         Action taken: automatic restart\n\
                         Result: SUCCESS\n\n\
                         Details:\n\
                         - Old status: {}\n\
                         - New status: {}\n\
                         - Restart attempts: {}\n\
                         - Role: {}\n\n\
                         No further action required. System is operational.\n",
                        resource.name,
                        resource.status,
                        new_status,
                        attempt_count,
                        resource.role(),
                    ),
                )
            }
            Resolution::Exhausted {
                attempts: attempt_count,
                last_error,
            } => (
                // An automated remediation failure always warrants human
                // attention, whatever the resource's own criticality says.
                Severity::Critical,
                format!(
                    "URGENT: resource {} down, auto-heal failed",
                    resource.name
                ),
                format!(
                    "CRITICAL INCIDENT\n\n\
                     Resource: {}\n\
                     Status: DOWN\n\n\
                     Auto-healing result: FAILED\n\
                     Error: {}\n\
                     Attempts: {}\n\n\
                     ACTION REQUIRED:\n\
                     This resource requires immediate manual intervention.\n\n\
                     Suggested actions:\n\
                     1. Check the resource logs\n\
                     2. Inspect the resource configuration\n\
                     3. Check host resources: disk space, memory\n\
                     4. Review application logs for errors\n",
                    resource.name, last_error, attempt_count,
                ),
            ),
            Resolution::Missing => (
                Severity::Critical,
                format!(
                    "URGENT: resource {} down, auto-heal failed",
                    resource.name
                ),
                format!(
                    "CRITICAL INCIDENT\n\n\
                     Resource: {}\n\
                     Status: DOWN\n\n\
                     Auto-healing result: FAILED\n\
                     Error: resource not found in the inventory\n\
                     Attempts: 0\n\n\
                     ACTION REQUIRED:\n\
                     The resource has disappeared from the inventory and needs manual\n\
                     investigation.\n",
                    resource.name,
                ),
            ),
        };

        if !sections.is_empty() {
            body.push_str("\nDiagnosis:\n");
            for (title, text) in sections {
                body.push_str(&format!("\n== {} ==\n{}\n", title, text));
            }
        }

        Alert::new(&self.policy, severity, subject, body, dedup_key)
    }

    async fn deliver(&self, alert: &Alert) -> DeliveryOutcome {
        if !alert.should_transmit {
            info!(
                severity = %alert.severity,
                dedup_key = %alert.dedup_key,
                "alert recorded, transmission suppressed by policy"
            );
            return DeliveryOutcome::Suppressed;
        }

        match self.notifier.send(alert).await {
            Ok(()) => DeliveryOutcome::Sent,
            Err(e) => {
                // Delivery failure degrades to a local record; the incident
                // is still resolved.
                warn!(error = %e, dedup_key = %alert.dedup_key, "alert delivery failed");
                DeliveryOutcome::Failed(e.to_string())
            }
        }
    }

    /// Periodic fleet summary (Info; record-only under the default policy).
    pub async fn send_summary(
        &self,
        snapshot: &HealthSnapshot,
        healed: &[(String, u32)],
    ) -> DeliveryOutcome {
        let mut body = format!(
            "Monitoring summary report\n\n\
             Resource status:\n\
             - Total: {}\n\
             - Running: {}\n\
             - Stopped: {}\n\n\
             Auto-healing actions this cycle: {}\n",
            snapshot.total,
            snapshot.running,
            snapshot.stopped,
            healed.len(),
        );
        if !healed.is_empty() {
            body.push_str("\nHealed resources:\n");
            for (name, attempts) in healed {
                body.push_str(&format!("  - {} (attempts: {})\n", name, attempts));
            }
        }
        let alert = Alert::new(
            &self.policy,
            Severity::Info,
            "Warden monitoring summary",
            body,
            "summary",
        );
        self.deliver(&alert).await
    }
}
