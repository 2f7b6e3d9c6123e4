//! Decision engine abstraction.
//!
//! The dispatch loop treats the engine as an opaque function from a
//! transcript to a decision: either a final answer or a batch of tool
//! calls. The real implementation speaks the Ollama chat API; a scripted
//! client exists for deterministic tests.

use crate::config::LlmConfig;
use crate::transcript::{ToolCall, Transcript, TranscriptEntry};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Declared shape of one tool offered to the engine
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolSpec {
    pub name: String,
    pub description: String,
    /// JSON Schema object describing the named arguments
    pub parameters: serde_json::Value,
}

impl ToolSpec {
    /// Wire form for the chat API tools array
    pub fn to_wire(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "function",
            "function": {
                "name": self.name,
                "description": self.description,
                "parameters": self.parameters,
            }
        })
    }
}

/// What the engine decided to do with the transcript so far
#[derive(Debug, Clone)]
pub enum Decision {
    /// Final text; ends the dispatch loop
    Answer(String),
    /// Requested tool invocations, in issue order
    Actions {
        text: Option<String>,
        calls: Vec<ToolCall>,
    },
}

/// Engine failures. None of these are retried by the dispatch loop: repeated
/// calls are unlikely to help and each one has cost.
#[derive(Debug, Clone, thiserror::Error)]
pub enum EngineError {
    #[error("decision engine is disabled in configuration")]
    Disabled,

    #[error("HTTP error: {0}")]
    Http(String),

    #[error("request timeout after {0} seconds")]
    Timeout(u64),

    #[error("malformed engine response: {0}")]
    Malformed(String),

    #[error("engine returned an empty response")]
    Empty,
}

/// Opaque decision function over a transcript
#[async_trait]
pub trait DecisionEngine: Send + Sync {
    /// Produce a decision for the transcript. An empty `tools` slice
    /// withholds tool-calling entirely; the engine must answer in text.
    async fn decide(
        &self,
        transcript: &Transcript,
        tools: &[ToolSpec],
    ) -> Result<Decision, EngineError>;
}

/// Decision engine backed by the Ollama chat API
pub struct OllamaEngine {
    config: LlmConfig,
    client: reqwest::Client,
}

impl OllamaEngine {
    pub fn new(config: LlmConfig) -> Result<Self, EngineError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| EngineError::Http(format!("failed to create HTTP client: {}", e)))?;
        Ok(Self { config, client })
    }

    /// Map transcript entries to chat messages.
    ///
    /// The transcript's ordering invariant (model entry immediately before
    /// its results) is exactly the order the chat API expects, so this is a
    /// straight fold.
    fn messages(transcript: &Transcript) -> Vec<serde_json::Value> {
        transcript
            .entries()
            .iter()
            .map(|entry| match entry {
                TranscriptEntry::User(text) => serde_json::json!({
                    "role": "user",
                    "content": text,
                }),
                TranscriptEntry::Model { text, tool_calls } => serde_json::json!({
                    "role": "assistant",
                    "content": text.clone().unwrap_or_default(),
                    "tool_calls": tool_calls.iter().map(|c| serde_json::json!({
                        "function": {
                            "name": c.name,
                            "arguments": c.arguments,
                        }
                    })).collect::<Vec<_>>(),
                }),
                TranscriptEntry::ToolOutput(result) => serde_json::json!({
                    "role": "tool",
                    "content": serde_json::json!({
                        "correlation_id": result.correlation_id,
                        "result": result.payload_json(),
                    })
                    .to_string(),
                }),
            })
            .collect()
    }

    fn parse_decision(message: &serde_json::Value) -> Result<Decision, EngineError> {
        let content = message
            .get("content")
            .and_then(|v| v.as_str())
            .unwrap_or("")
            .trim()
            .to_string();

        let calls: Vec<ToolCall> = message
            .get("tool_calls")
            .and_then(|v| v.as_array())
            .map(|arr| {
                arr.iter()
                    .filter_map(|item| {
                        let function = item.get("function")?;
                        let name = function.get("name")?.as_str()?.to_string();
                        let arguments = function
                            .get("arguments")
                            .cloned()
                            .unwrap_or_else(|| serde_json::json!({}));
                        let call = match item.get("id").and_then(|v| v.as_str()) {
                            Some(id) => ToolCall::new(name, arguments).with_correlation_id(id),
                            None => ToolCall::new(name, arguments),
                        };
                        Some(call)
                    })
                    .collect()
            })
            .unwrap_or_default();

        if !calls.is_empty() {
            let text = if content.is_empty() { None } else { Some(content) };
            return Ok(Decision::Actions { text, calls });
        }
        if content.is_empty() {
            return Err(EngineError::Empty);
        }
        Ok(Decision::Answer(content))
    }
}

#[async_trait]
impl DecisionEngine for OllamaEngine {
    async fn decide(
        &self,
        transcript: &Transcript,
        tools: &[ToolSpec],
    ) -> Result<Decision, EngineError> {
        if !self.config.enabled {
            return Err(EngineError::Disabled);
        }

        let url = format!("{}/api/chat", self.config.endpoint);
        let mut body = serde_json::json!({
            "model": self.config.model,
            "messages": Self::messages(transcript),
            "stream": false,
        });
        if !tools.is_empty() {
            body["tools"] = serde_json::Value::Array(tools.iter().map(ToolSpec::to_wire).collect());
        }

        let response = self.client.post(&url).json(&body).send().await.map_err(|e| {
            if e.is_timeout() {
                EngineError::Timeout(self.config.timeout_secs)
            } else {
                EngineError::Http(format!("request failed: {}", e))
            }
        })?;

        if !response.status().is_success() {
            return Err(EngineError::Http(format!(
                "HTTP {} from engine",
                response.status()
            )));
        }

        let json: serde_json::Value = response
            .json()
            .await
            .map_err(|e| EngineError::Malformed(format!("unparseable response body: {}", e)))?;

        let message = json
            .get("message")
            .ok_or_else(|| EngineError::Malformed("response has no message".to_string()))?;

        let decision = Self::parse_decision(message)?;
        if tools.is_empty() {
            // Tool-calling was withheld; flatten a stray Actions decision to
            // whatever text came with it.
            if let Decision::Actions { text, .. } = &decision {
                return Ok(Decision::Answer(text.clone().unwrap_or_default()));
            }
        }
        Ok(decision)
    }
}

/// Scripted decision engine for tests.
///
/// Replays a fixed queue of decisions and records, per call, how many tools
/// were offered, so tests can assert both the call bound and that the final
/// forced call withheld tools.
pub struct ScriptedEngine {
    responses: std::sync::Mutex<Vec<Result<Decision, EngineError>>>,
    offered: std::sync::Mutex<Vec<usize>>,
}

impl ScriptedEngine {
    pub fn new(responses: Vec<Result<Decision, EngineError>>) -> Self {
        Self {
            responses: std::sync::Mutex::new(responses),
            offered: std::sync::Mutex::new(Vec::new()),
        }
    }

    /// An engine that repeats one decision forever
    pub fn always(decision: Decision) -> Self {
        Self::new(vec![Ok(decision)])
    }

    pub fn always_error(error: EngineError) -> Self {
        Self::new(vec![Err(error)])
    }

    pub fn call_count(&self) -> usize {
        self.offered.lock().unwrap().len()
    }

    /// Number of tools offered on each recorded call, in order
    pub fn tools_offered(&self) -> Vec<usize> {
        self.offered.lock().unwrap().clone()
    }
}

#[async_trait]
impl DecisionEngine for ScriptedEngine {
    async fn decide(
        &self,
        _transcript: &Transcript,
        tools: &[ToolSpec],
    ) -> Result<Decision, EngineError> {
        self.offered.lock().unwrap().push(tools.len());

        let mut responses = self.responses.lock().unwrap();
        if responses.is_empty() {
            return Err(EngineError::Empty);
        }
        if responses.len() == 1 {
            responses[0].clone()
        } else {
            responses.remove(0)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_answer_decision() {
        let message = serde_json::json!({
            "role": "assistant",
            "content": "All resources are healthy.",
        });
        match OllamaEngine::parse_decision(&message).unwrap() {
            Decision::Answer(text) => assert_eq!(text, "All resources are healthy."),
            other => panic!("expected answer, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_actions_decision() {
        let message = serde_json::json!({
            "role": "assistant",
            "content": "",
            "tool_calls": [{
                "function": {
                    "name": "get_resource_logs",
                    "arguments": {"name": "prod-db-01", "lines": 15},
                }
            }],
        });
        match OllamaEngine::parse_decision(&message).unwrap() {
            Decision::Actions { text, calls } => {
                assert!(text.is_none());
                assert_eq!(calls.len(), 1);
                assert_eq!(calls[0].name, "get_resource_logs");
                assert!(calls[0].correlation_id.starts_with("tc_"));
            }
            other => panic!("expected actions, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_engine_supplied_id_round_trips() {
        let message = serde_json::json!({
            "role": "assistant",
            "content": "",
            "tool_calls": [{
                "id": "call_0",
                "function": {"name": "list_all_resources", "arguments": {}},
            }],
        });
        match OllamaEngine::parse_decision(&message).unwrap() {
            Decision::Actions { calls, .. } => assert_eq!(calls[0].correlation_id, "call_0"),
            other => panic!("expected actions, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_empty_is_an_error() {
        let message = serde_json::json!({"role": "assistant", "content": ""});
        assert!(matches!(
            OllamaEngine::parse_decision(&message),
            Err(EngineError::Empty)
        ));
    }

    #[tokio::test]
    async fn test_scripted_engine_replays_and_counts() {
        let engine = ScriptedEngine::new(vec![
            Ok(Decision::Answer("first".into())),
            Err(EngineError::Timeout(5)),
        ]);
        let transcript = Transcript::new("q");

        let first = engine.decide(&transcript, &[]).await.unwrap();
        assert!(matches!(first, Decision::Answer(t) if t == "first"));
        assert!(engine.decide(&transcript, &[]).await.is_err());
        assert_eq!(engine.call_count(), 2);
    }

    #[tokio::test]
    async fn test_scripted_engine_records_tools_offered() {
        let engine = ScriptedEngine::always(Decision::Answer("ok".into()));
        let transcript = Transcript::new("q");
        let spec = ToolSpec {
            name: "list_all_resources".into(),
            description: "list".into(),
            parameters: serde_json::json!({"type": "object", "properties": {}}),
        };

        engine.decide(&transcript, &[spec]).await.unwrap();
        engine.decide(&transcript, &[]).await.unwrap();
        assert_eq!(engine.tools_offered(), vec![1, 0]);
    }

    #[test]
    fn test_tool_spec_wire_shape() {
        let spec = ToolSpec {
            name: "restart_resource_with_retry".into(),
            description: "restart with retries".into(),
            parameters: serde_json::json!({
                "type": "object",
                "properties": {"name": {"type": "string"}},
                "required": ["name"],
            }),
        };
        let wire = spec.to_wire();
        assert_eq!(wire["type"], "function");
        assert_eq!(wire["function"]["name"], "restart_resource_with_retry");
    }
}
