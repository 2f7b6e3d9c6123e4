//! Healing retry engine.
//!
//! One [`Healer::heal`] call resolves one incident: restart, re-read status,
//! retry on failure up to the configured bound, with a fixed wait between
//! attempts. Each invocation owns its attempt counter and its delay, so
//! concurrent incidents never serialize on each other's waits.

use crate::adapter::{AdapterError, ResourceAdapter};
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use warden_common::{
    AttemptOutcome, HealingAttempt, HealingReport, MonitorConfig, Resolution, ResourceStatus,
};

pub struct Healer {
    adapter: Arc<dyn ResourceAdapter>,
    max_attempts: u32,
    restart_timeout_secs: u64,
    retry_delay: Duration,
}

impl Healer {
    pub fn new(adapter: Arc<dyn ResourceAdapter>, config: &MonitorConfig) -> Self {
        Self {
            adapter,
            max_attempts: config.max_restart_attempts.max(1),
            restart_timeout_secs: config.restart_timeout_secs,
            retry_delay: Duration::from_secs(config.retry_delay_secs),
        }
    }

    /// Drive one incident to a terminal state.
    ///
    /// A resource that is missing before the first attempt short-circuits to
    /// `Resolution::Missing` with zero attempts. Adapter errors during an
    /// attempt count as failed attempts and are retried within the bound.
    pub async fn heal(&self, name: &str) -> HealingReport {
        let previous_status = match self.adapter.get(name).await {
            Ok(resource) => resource.status,
            Err(AdapterError::NotFound(_)) => {
                warn!(resource = name, "healing skipped, resource not found");
                return HealingReport {
                    resource: name.to_string(),
                    previous_status: ResourceStatus::Unknown,
                    attempts: Vec::new(),
                    resolution: Resolution::Missing,
                };
            }
            Err(e) => {
                // Status unreadable; the restart attempts themselves decide.
                warn!(resource = name, error = %e, "could not read status before healing");
                ResourceStatus::Unknown
            }
        };

        let mut attempts = Vec::new();
        let mut last_error = String::new();

        for attempt in 1..=self.max_attempts {
            if attempt > 1 {
                tokio::time::sleep(self.retry_delay).await;
            }

            let (new_status, error) = self.attempt_restart(name).await;

            if matches!(new_status, Some(ResourceStatus::Running)) {
                attempts.push(HealingAttempt {
                    resource: name.to_string(),
                    attempt,
                    outcome: AttemptOutcome::Recovered,
                    previous_status,
                    new_status,
                    at: Utc::now(),
                });
                info!(resource = name, attempt, "healing succeeded");
                return HealingReport {
                    resource: name.to_string(),
                    previous_status,
                    attempts,
                    resolution: Resolution::Healed { attempts: attempt },
                };
            }

            last_error = error.unwrap_or_else(|| {
                format!(
                    "resource still {} after restart",
                    new_status.unwrap_or(ResourceStatus::Unknown)
                )
            });
            let outcome = if attempt == self.max_attempts {
                AttemptOutcome::Fatal(last_error.clone())
            } else {
                AttemptOutcome::Retryable(last_error.clone())
            };
            warn!(resource = name, attempt, error = %last_error, "restart attempt failed");
            attempts.push(HealingAttempt {
                resource: name.to_string(),
                attempt,
                outcome,
                previous_status,
                new_status,
                at: Utc::now(),
            });
        }

        HealingReport {
            resource: name.to_string(),
            previous_status,
            attempts,
            resolution: Resolution::Exhausted {
                attempts: self.max_attempts,
                last_error,
            },
        }
    }

    /// One restart plus a status re-read. Returns the observed status (when
    /// one could be read) and the error text (when something failed).
    async fn attempt_restart(&self, name: &str) -> (Option<ResourceStatus>, Option<String>) {
        match self.adapter.restart(name, self.restart_timeout_secs).await {
            Ok(_) => match self.adapter.get(name).await {
                Ok(resource) => (Some(resource.status), None),
                Err(e) => (None, Some(format!("status re-read failed: {}", e))),
            },
            Err(e) => (None, Some(e.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapter::{FakeAdapter, RestartBehavior};
    use std::collections::BTreeMap;
    use warden_common::{Resource, DEFAULT_MANAGED_LABEL};

    fn stopped(name: &str) -> Resource {
        let mut labels = BTreeMap::new();
        labels.insert(DEFAULT_MANAGED_LABEL.to_string(), "prod".to_string());
        Resource {
            id: name.to_string(),
            name: name.to_string(),
            status: ResourceStatus::Stopped,
            image: String::new(),
            labels,
            exit_code: Some(137),
        }
    }

    fn config(max_attempts: u32) -> MonitorConfig {
        MonitorConfig {
            max_restart_attempts: max_attempts,
            retry_delay_secs: 0,
            ..MonitorConfig::default()
        }
    }

    #[tokio::test]
    async fn test_success_on_second_attempt_records_two() {
        let adapter = Arc::new(FakeAdapter::new());
        adapter.insert(stopped("web"));
        adapter.script_restarts(
            "web",
            vec![RestartBehavior::StayStopped, RestartBehavior::Succeed],
        );

        let healer = Healer::new(adapter.clone(), &config(3));
        let report = healer.heal("web").await;

        assert_eq!(report.resolution, Resolution::Healed { attempts: 2 });
        assert_eq!(report.attempts_made(), 2);
        assert_eq!(adapter.restart_count("web"), 2);
        assert_eq!(report.previous_status, ResourceStatus::Stopped);
        assert_eq!(report.new_status(), Some(ResourceStatus::Running));
    }

    #[tokio::test]
    async fn test_exhaustion_never_exceeds_bound() {
        let adapter = Arc::new(FakeAdapter::new());
        adapter.insert(stopped("db"));
        adapter.script_restarts(
            "db",
            vec![
                RestartBehavior::Fail("daemon busy".into()),
                RestartBehavior::Fail("daemon busy".into()),
                RestartBehavior::Fail("daemon busy".into()),
                RestartBehavior::Fail("daemon busy".into()),
            ],
        );

        let healer = Healer::new(adapter.clone(), &config(3));
        let report = healer.heal("db").await;

        assert_eq!(adapter.restart_count("db"), 3, "bound is three restarts");
        match report.resolution {
            Resolution::Exhausted {
                attempts,
                ref last_error,
            } => {
                assert_eq!(attempts, 3);
                assert!(last_error.contains("daemon busy"));
            }
            ref other => panic!("expected exhaustion, got {:?}", other),
        }
        assert!(matches!(
            report.attempts.last().unwrap().outcome,
            AttemptOutcome::Fatal(_)
        ));
    }

    #[tokio::test]
    async fn test_missing_resource_makes_no_attempts() {
        let adapter = Arc::new(FakeAdapter::new());
        let healer = Healer::new(adapter.clone(), &config(3));

        let report = healer.heal("ghost").await;

        assert_eq!(report.resolution, Resolution::Missing);
        assert!(report.attempts.is_empty());
        assert_eq!(adapter.restart_count("ghost"), 0);
    }

    #[tokio::test]
    async fn test_adapter_error_counts_as_failed_attempt() {
        let adapter = Arc::new(FakeAdapter::new());
        adapter.insert(stopped("cache"));
        adapter.script_restarts(
            "cache",
            vec![
                RestartBehavior::Fail("connection reset".into()),
                RestartBehavior::Succeed,
            ],
        );

        let healer = Healer::new(adapter, &config(3));
        let report = healer.heal("cache").await;

        assert_eq!(report.resolution, Resolution::Healed { attempts: 2 });
        assert!(matches!(
            report.attempts[0].outcome,
            AttemptOutcome::Retryable(_)
        ));
    }
}
