//! Conversation transcript for the tool-dispatch loop.
//!
//! The transcript is an append-only log with one structural invariant: a
//! model entry that issued N tool calls is immediately followed by its N
//! tool results, in issue order, before anything else is appended. The only
//! way to add a tool-bearing round is [`Transcript::push_round`], which
//! appends the model entry and its paired results as one group, so the
//! invariant holds by construction.

use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

/// One tool invocation requested by the decision engine
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCall {
    pub name: String,
    /// JSON object of named arguments
    pub arguments: serde_json::Value,
    /// Opaque token from the engine, round-tripped unchanged
    pub correlation_id: String,
}

impl ToolCall {
    /// Build a call with a synthesized correlation id.
    ///
    /// Engines that do not supply call ids get one generated here so the
    /// registry and transcript never see an id-less call.
    pub fn new(name: impl Into<String>, arguments: serde_json::Value) -> Self {
        Self {
            name: name.into(),
            arguments,
            correlation_id: format!("tc_{}", Uuid::new_v4()),
        }
    }

    pub fn with_correlation_id(mut self, id: impl Into<String>) -> Self {
        self.correlation_id = id.into();
        self
    }
}

/// Failure modes of a single tool dispatch
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
pub enum ToolError {
    #[error("unknown tool: {0}")]
    UnknownTool(String),

    #[error("invalid arguments for {tool}: {reason}")]
    InvalidArguments { tool: String, reason: String },

    #[error("adapter error: {0}")]
    Adapter(String),
}

/// Outcome of one dispatched tool call.
///
/// Exactly one of payload or error exists, carried by the Result.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolResult {
    pub correlation_id: String,
    pub outcome: Result<serde_json::Value, ToolError>,
}

impl ToolResult {
    pub fn ok(correlation_id: impl Into<String>, payload: serde_json::Value) -> Self {
        Self {
            correlation_id: correlation_id.into(),
            outcome: Ok(payload),
        }
    }

    pub fn err(correlation_id: impl Into<String>, error: ToolError) -> Self {
        Self {
            correlation_id: correlation_id.into(),
            outcome: Err(error),
        }
    }

    pub fn is_ok(&self) -> bool {
        self.outcome.is_ok()
    }

    /// Render the outcome as a single JSON value for feeding back to the
    /// engine; errors become `{"error": "..."}` objects.
    pub fn payload_json(&self) -> serde_json::Value {
        match &self.outcome {
            Ok(payload) => payload.clone(),
            Err(e) => serde_json::json!({ "error": e.to_string() }),
        }
    }
}

/// One entry in the conversation log
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum TranscriptEntry {
    /// Instruction text that seeded the conversation
    User(String),
    /// Engine output: free text and/or requested tool calls
    Model {
        text: Option<String>,
        tool_calls: Vec<ToolCall>,
    },
    /// Result of one dispatched call
    ToolOutput(ToolResult),
}

/// Append-only conversation log for one dispatch-loop invocation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Transcript {
    entries: Vec<TranscriptEntry>,
}

impl Transcript {
    /// Seed a transcript with one user message
    pub fn new(user_text: impl Into<String>) -> Self {
        Self {
            entries: vec![TranscriptEntry::User(user_text.into())],
        }
    }

    pub fn entries(&self) -> &[TranscriptEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Append one tool-bearing round: the model entry followed by its paired
    /// results, in issue order. Taking call/result pairs keeps the model
    /// message and its results together and ordered.
    pub fn push_round(
        &mut self,
        text: Option<String>,
        round: Vec<(ToolCall, ToolResult)>,
    ) {
        let (calls, results): (Vec<ToolCall>, Vec<ToolResult>) = round.into_iter().unzip();
        self.entries.push(TranscriptEntry::Model {
            text,
            tool_calls: calls,
        });
        self.entries
            .extend(results.into_iter().map(TranscriptEntry::ToolOutput));
    }

    /// The seeding user text, if any
    pub fn user_text(&self) -> Option<&str> {
        self.entries.iter().find_map(|e| match e {
            TranscriptEntry::User(text) => Some(text.as_str()),
            _ => None,
        })
    }
}
