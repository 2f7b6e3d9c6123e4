//! Monitoring cycle driver.
//!
//! One cycle = one snapshot, then incident processing. One-shot runs use
//! full diagnosis; continuous mode repeats on a fixed interval with the
//! lighter quick diagnosis, and a shutdown signal lets the current cycle
//! finish before the loop stops.

use crate::adapter::AdapterError;
use crate::diagnosis::DiagnosisAgent;
use crate::escalation::{CycleMode, DiagnosisDepth, EscalationEngine, IncidentReport};
use crate::health::HealthAggregator;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, info, warn};
use warden_common::HealthSnapshot;

/// Result of one monitoring cycle
#[derive(Debug)]
pub struct CycleOutcome {
    pub snapshot: HealthSnapshot,
    pub reports: Vec<IncidentReport>,
}

impl CycleOutcome {
    pub fn healed(&self) -> usize {
        self.reports
            .iter()
            .filter(|r| r.resolution.succeeded())
            .count()
    }

    /// Healed resource names with the attempt count that recovered each
    pub fn healed_resources(&self) -> Vec<(String, u32)> {
        self.reports
            .iter()
            .filter_map(|r| match r.resolution {
                warden_common::Resolution::Healed { attempts } => {
                    Some((r.resource.name.clone(), attempts))
                }
                _ => None,
            })
            .collect()
    }
}

pub struct Orchestrator {
    aggregator: Arc<HealthAggregator>,
    escalation: EscalationEngine,
    diagnosis: Option<Arc<DiagnosisAgent>>,
    interval: Duration,
    shutdown: watch::Receiver<bool>,
}

impl Orchestrator {
    pub fn new(
        aggregator: Arc<HealthAggregator>,
        escalation: EscalationEngine,
        diagnosis: Option<Arc<DiagnosisAgent>>,
        interval: Duration,
        shutdown: watch::Receiver<bool>,
    ) -> Self {
        Self {
            aggregator,
            escalation,
            diagnosis,
            interval,
            shutdown,
        }
    }

    async fn cycle(
        &self,
        mode: CycleMode,
        depth: DiagnosisDepth,
    ) -> Result<CycleOutcome, AdapterError> {
        let snapshot = self.aggregator.snapshot().await?;
        info!(
            running = snapshot.running,
            total = snapshot.total,
            stopped = snapshot.stopped,
            "resource status"
        );

        let reports = if snapshot.all_healthy() {
            info!("all resources healthy");
            Vec::new()
        } else {
            self.escalation.run_cycle(&snapshot, mode, depth).await
        };

        Ok(CycleOutcome { snapshot, reports })
    }

    /// One cycle with full diagnosis. In check mode a healthy fleet still
    /// gets an engine-written summary, logged for the operator.
    pub async fn run_once(&self, mode: CycleMode) -> Result<CycleOutcome, AdapterError> {
        let outcome = self.cycle(mode, DiagnosisDepth::Full).await?;

        if outcome.snapshot.all_healthy() && mode == CycleMode::Check {
            if let Some(agent) = &self.diagnosis {
                match agent.fleet_summary().await {
                    Ok(summary) => info!(%summary, "fleet health summary"),
                    Err(e) => debug!(error = %e, "fleet summary unavailable"),
                }
            }
        }

        for report in &outcome.reports {
            info!(
                resource = %report.resource.name,
                resolution = report.resolution.kind(),
                delivery = ?report.delivery,
                "incident resolved"
            );
        }
        Ok(outcome)
    }

    /// Repeat cycles until the shutdown signal fires. The cycle in flight
    /// always completes; the signal is honored at the next boundary.
    pub async fn run_continuous(&self, mode: CycleMode) {
        let mut cycles = 0u64;
        let mut shutdown = self.shutdown.clone();

        loop {
            cycles += 1;
            info!(cycle = cycles, mode = ?mode, "monitoring cycle started");

            match self.cycle(mode, DiagnosisDepth::Quick).await {
                Ok(outcome) => {
                    let _ = self
                        .escalation
                        .send_summary(&outcome.snapshot, &outcome.healed_resources())
                        .await;
                }
                Err(e) => warn!(error = %e, "monitoring cycle failed"),
            }

            if *shutdown.borrow() {
                break;
            }
            debug!(secs = self.interval.as_secs(), "next check scheduled");
            tokio::select! {
                _ = tokio::time::sleep(self.interval) => {}
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        break;
                    }
                }
            }
        }

        info!(cycles, "monitoring stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapter::FakeAdapter;
    use crate::healer::Healer;
    use crate::notifier::RecordingNotifier;
    use std::collections::BTreeMap;
    use warden_common::{
        AlertPolicy, MonitorConfig, Resource, ResourceStatus, DEFAULT_MANAGED_LABEL,
    };

    fn resource(name: &str, status: ResourceStatus) -> Resource {
        let mut labels = BTreeMap::new();
        labels.insert(DEFAULT_MANAGED_LABEL.to_string(), "prod".to_string());
        Resource {
            id: name.to_string(),
            name: name.to_string(),
            status,
            image: String::new(),
            labels,
            exit_code: None,
        }
    }

    fn orchestrator(
        adapter: Arc<FakeAdapter>,
        notifier: Arc<RecordingNotifier>,
    ) -> Orchestrator {
        let monitor = MonitorConfig {
            retry_delay_secs: 0,
            ..MonitorConfig::default()
        };
        let aggregator = Arc::new(HealthAggregator::new(
            adapter.clone(),
            DEFAULT_MANAGED_LABEL,
        ));
        let healer = Arc::new(Healer::new(adapter, &monitor));
        let escalation =
            EscalationEngine::new(healer, notifier, None, AlertPolicy::default(), monitor);
        let (_tx, rx) = watch::channel(false);
        Orchestrator::new(aggregator, escalation, None, Duration::from_secs(30), rx)
    }

    #[tokio::test]
    async fn test_healthy_fleet_produces_no_reports() {
        let adapter = Arc::new(FakeAdapter::new());
        adapter.insert(resource("a", ResourceStatus::Running));
        let notifier = Arc::new(RecordingNotifier::new());

        let outcome = orchestrator(adapter, notifier.clone())
            .run_once(CycleMode::Check)
            .await
            .unwrap();

        assert!(outcome.reports.is_empty());
        assert_eq!(notifier.sent_count(), 0);
    }

    #[tokio::test]
    async fn test_heal_cycle_restores_and_counts() {
        let adapter = Arc::new(FakeAdapter::new());
        adapter.insert(resource("a", ResourceStatus::Stopped));
        let notifier = Arc::new(RecordingNotifier::new());

        let outcome = orchestrator(adapter.clone(), notifier)
            .run_once(CycleMode::Heal)
            .await
            .unwrap();

        assert_eq!(outcome.reports.len(), 1);
        assert_eq!(outcome.healed(), 1);
        assert_eq!(adapter.status_of("a"), Some(ResourceStatus::Running));
    }
}
