//! Engine-grounded diagnosis of failing resources.
//!
//! Thin question layer over the dispatch loop: each method phrases one
//! diagnostic question, runs it through the monitoring tool set, and returns
//! the engine's text. Callers treat failures as missing diagnosis, never as
//! cycle failures.

use crate::adapter::ResourceAdapter;
use crate::dispatch::DispatchLoop;
use crate::prompts;
use crate::tools::monitoring_registry;
use std::sync::Arc;
use warden_common::{DecisionEngine, EngineError, Resource};

pub struct DiagnosisAgent {
    dispatch: DispatchLoop,
}

impl DiagnosisAgent {
    pub fn new(
        engine: Arc<dyn DecisionEngine>,
        adapter: Arc<dyn ResourceAdapter>,
        managed_label: &str,
        max_iterations: u32,
    ) -> Self {
        let registry = Arc::new(monitoring_registry(adapter, managed_label));
        Self {
            dispatch: DispatchLoop::new(engine, registry, max_iterations),
        }
    }

    /// Free-form monitoring question
    pub async fn ask(&self, question: &str) -> Result<String, EngineError> {
        self.dispatch
            .run(&prompts::monitoring_instruction(question))
            .await
    }

    pub async fn status_detail(&self, resource: &Resource) -> Result<String, EngineError> {
        self.ask(&format!(
            "Get detailed status of {} including when it stopped and its exit code",
            resource.name
        ))
        .await
    }

    pub async fn log_analysis(&self, resource: &Resource) -> Result<String, EngineError> {
        self.ask(&format!(
            "Show me the last 15 lines of logs from {} and identify any errors or warnings",
            resource.name
        ))
        .await
    }

    pub async fn root_cause(&self, resource: &Resource) -> Result<String, EngineError> {
        self.ask(&format!(
            "Based on the status and logs of {}, what are the most likely causes for this \
             failure? Consider: configuration issues, resource constraints, dependency \
             failures, or application errors.",
            resource.name
        ))
        .await
    }

    pub async fn failure_analysis(&self, resource: &Resource) -> Result<String, EngineError> {
        self.ask(&format!(
            "Resource {} is {}. Check its logs for the last 20 lines and tell me what caused \
             it to fail. Look for error messages, exit codes, or crash logs.",
            resource.name, resource.status
        ))
        .await
    }

    pub async fn restart_safety(&self, resource: &Resource) -> Result<String, EngineError> {
        self.ask(&format!(
            "Based on the failure of {}, is it safe to restart? Are there any configuration \
             issues or dependencies that need fixing first?",
            resource.name
        ))
        .await
    }

    pub async fn verify_recovery(&self, resource: &Resource) -> Result<String, EngineError> {
        self.ask(&format!(
            "Resource {} was just restarted. Check its current status and recent logs to \
             verify it's running properly without errors.",
            resource.name
        ))
        .await
    }

    pub async fn why_heal_failed(
        &self,
        resource: &Resource,
        attempts: u32,
    ) -> Result<String, EngineError> {
        self.ask(&format!(
            "Resource {} failed to restart after {} attempts. Check logs and status to \
             determine why the restart failed. What manual intervention is needed?",
            resource.name, attempts
        ))
        .await
    }

    pub async fn quick_diagnosis(&self, resource: &Resource) -> Result<String, EngineError> {
        self.ask(&format!(
            "Resource {} is {}. Quick diagnosis: check the last 10 log lines and identify \
             the issue.",
            resource.name, resource.status
        ))
        .await
    }

    pub async fn fleet_summary(&self) -> Result<String, EngineError> {
        self.ask("All resources are running. Provide a brief health summary and any recommendations.")
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapter::FakeAdapter;
    use std::collections::BTreeMap;
    use warden_common::{Decision, ResourceStatus, ScriptedEngine, DEFAULT_MANAGED_LABEL};

    fn stopped_db() -> Resource {
        let mut labels = BTreeMap::new();
        labels.insert(DEFAULT_MANAGED_LABEL.to_string(), "prod".to_string());
        Resource {
            id: "id-db".into(),
            name: "prod-db-01".into(),
            status: ResourceStatus::Stopped,
            image: "postgres:16".into(),
            labels,
            exit_code: Some(1),
        }
    }

    #[tokio::test]
    async fn test_diagnosis_returns_engine_text() {
        let engine = Arc::new(ScriptedEngine::always(Decision::Answer(
            "disk full, clear /var".into(),
        )));
        let adapter = Arc::new(FakeAdapter::new());
        let agent = DiagnosisAgent::new(engine, adapter, DEFAULT_MANAGED_LABEL, 3);

        let text = agent.root_cause(&stopped_db()).await.unwrap();
        assert_eq!(text, "disk full, clear /var");
    }

    #[tokio::test]
    async fn test_diagnosis_surfaces_engine_failure() {
        let engine = Arc::new(ScriptedEngine::always_error(
            warden_common::EngineError::Http("connection refused".into()),
        ));
        let adapter = Arc::new(FakeAdapter::new());
        let agent = DiagnosisAgent::new(engine, adapter, DEFAULT_MANAGED_LABEL, 3);

        assert!(agent.quick_diagnosis(&stopped_db()).await.is_err());
    }
}
