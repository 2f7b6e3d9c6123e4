//! Tool-dispatch loop.
//!
//! Drives a bounded conversation between the decision engine and the tool
//! registry. Each round the engine either answers (done) or requests tool
//! calls, which are dispatched sequentially in issue order and appended to
//! the transcript as one group. After `max_iterations` tool-bearing rounds
//! the engine gets exactly one final call with tools withheld, so the loop
//! terminates after at most `max_iterations + 1` engine calls no matter what
//! the engine does.

use crate::registry::ToolRegistry;
use std::sync::Arc;
use tracing::{debug, info};
use warden_common::{Decision, DecisionEngine, EngineError, Transcript};

pub struct DispatchLoop {
    engine: Arc<dyn DecisionEngine>,
    registry: Arc<ToolRegistry>,
    max_iterations: u32,
}

impl DispatchLoop {
    pub fn new(
        engine: Arc<dyn DecisionEngine>,
        registry: Arc<ToolRegistry>,
        max_iterations: u32,
    ) -> Self {
        Self {
            engine,
            registry,
            max_iterations: max_iterations.max(1),
        }
    }

    /// Run one grounded conversation and return the engine's final text.
    ///
    /// Engine failures surface immediately: without the engine there is no
    /// grounded answer, and retrying it here would only add cost.
    pub async fn run(&self, instruction: &str) -> Result<String, EngineError> {
        let mut transcript = Transcript::new(instruction);
        let tools = self.registry.specs();

        for iteration in 1..=self.max_iterations {
            let decision = self.engine.decide(&transcript, &tools).await?;

            let (text, calls) = match decision {
                Decision::Answer(text) => {
                    debug!(iteration, "engine answered directly");
                    return Ok(text);
                }
                Decision::Actions { text, calls } => (text, calls),
            };

            // Sequential on purpose: later calls in the same round may assume
            // the side effects of earlier ones have already landed.
            let mut round = Vec::with_capacity(calls.len());
            for call in calls {
                let result = self.registry.dispatch(&call).await;
                round.push((call, result));
            }
            info!(iteration, dispatched = round.len(), "completed tool round");
            transcript.push_round(text, round);
        }

        // Iteration budget spent; force a final answer with tools withheld.
        debug!(
            max_iterations = self.max_iterations,
            "iteration budget exhausted, requesting final answer"
        );
        match self.engine.decide(&transcript, &[]).await? {
            Decision::Answer(text) => Ok(text),
            Decision::Actions { text, .. } => Ok(text.unwrap_or_default()),
        }
    }
}
