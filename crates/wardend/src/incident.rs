//! Engine-directed incident response.
//!
//! For incidents phrased in natural language ("prod-db-01 is down, fix it"),
//! the engine gets one decision over the incident tool set. Either it picks
//! an action, which is dispatched and reported, or it answers with reasoning
//! and no action is taken.

use crate::healer::Healer;
use crate::health::HealthAggregator;
use crate::prompts;
use crate::registry::ToolRegistry;
use crate::tools::incident_registry;
use serde::Serialize;
use std::sync::Arc;
use tracing::info;
use warden_common::{Decision, DecisionEngine, EngineError, Transcript};

/// What the responder did about an incident
#[derive(Debug, Clone, Serialize)]
pub enum IncidentAction {
    /// Engine chose a tool; payload is the dispatched result
    Executed {
        tool: String,
        result: serde_json::Value,
    },
    /// Engine answered without requesting any action
    NoAction { reasoning: String },
}

pub struct IncidentResponder {
    engine: Arc<dyn DecisionEngine>,
    registry: Arc<ToolRegistry>,
}

impl IncidentResponder {
    pub fn new(
        engine: Arc<dyn DecisionEngine>,
        healer: Arc<Healer>,
        aggregator: Arc<HealthAggregator>,
    ) -> Self {
        Self {
            engine,
            registry: Arc::new(incident_registry(healer, aggregator)),
        }
    }

    /// One decision, at most one dispatched action.
    pub async fn respond(&self, description: &str) -> Result<IncidentAction, EngineError> {
        let transcript = Transcript::new(prompts::incident_instruction(description));
        let decision = self
            .engine
            .decide(&transcript, &self.registry.specs())
            .await?;

        match decision {
            Decision::Answer(reasoning) => Ok(IncidentAction::NoAction { reasoning }),
            Decision::Actions { text, calls } => {
                // The responder honors the first requested action only; the
                // incident set's tools are self-contained.
                let Some(call) = calls.first() else {
                    return Ok(IncidentAction::NoAction {
                        reasoning: text.unwrap_or_default(),
                    });
                };
                info!(tool = %call.name, "incident responder dispatching engine-chosen action");
                let result = self.registry.dispatch(call).await;
                Ok(IncidentAction::Executed {
                    tool: call.name.clone(),
                    result: result.payload_json(),
                })
            }
        }
    }
}
