//! Tool registry - the fixed capability set offered to the decision engine.
//!
//! `dispatch` is the isolation boundary: whatever a handler does, the caller
//! gets a `ToolResult` back. Unknown names and bad arguments become error
//! results, handler failures are wrapped, nothing escapes.

use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::debug;
use warden_common::{ToolCall, ToolError, ToolResult, ToolSpec};

/// One registered capability
#[async_trait]
pub trait ToolHandler: Send + Sync {
    async fn call(&self, args: serde_json::Value) -> Result<serde_json::Value, ToolError>;
}

struct RegisteredTool {
    spec: ToolSpec,
    handler: Arc<dyn ToolHandler>,
}

/// Name → capability map, shared immutably once built
#[derive(Default)]
pub struct ToolRegistry {
    tools: BTreeMap<String, RegisteredTool>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, spec: ToolSpec, handler: Arc<dyn ToolHandler>) {
        self.tools
            .insert(spec.name.clone(), RegisteredTool { spec, handler });
    }

    pub fn contains(&self, name: &str) -> bool {
        self.tools.contains_key(name)
    }

    /// Declared specs, for offering to the engine
    pub fn specs(&self) -> Vec<ToolSpec> {
        self.tools.values().map(|t| t.spec.clone()).collect()
    }

    /// Execute one call. Never fails past this boundary: every outcome is a
    /// `ToolResult` carrying either the payload or a structured error.
    pub async fn dispatch(&self, call: &ToolCall) -> ToolResult {
        let tool = match self.tools.get(&call.name) {
            Some(tool) => tool,
            None => {
                return ToolResult::err(
                    call.correlation_id.clone(),
                    ToolError::UnknownTool(call.name.clone()),
                );
            }
        };

        if let Err(error) = validate_arguments(&tool.spec, &call.arguments) {
            return ToolResult::err(call.correlation_id.clone(), error);
        }

        debug!(tool = %call.name, correlation_id = %call.correlation_id, "dispatching tool call");
        match tool.handler.call(call.arguments.clone()).await {
            Ok(payload) => ToolResult::ok(call.correlation_id.clone(), payload),
            Err(error) => ToolResult::err(call.correlation_id.clone(), error),
        }
    }
}

/// Check a call's arguments against the tool's declared parameter schema:
/// required keys must be present, declared primitive types must match.
fn validate_arguments(spec: &ToolSpec, arguments: &serde_json::Value) -> Result<(), ToolError> {
    let args = match arguments {
        serde_json::Value::Object(map) => map,
        serde_json::Value::Null => {
            return match required_keys(spec).is_empty() {
                true => Ok(()),
                false => Err(ToolError::InvalidArguments {
                    tool: spec.name.clone(),
                    reason: "arguments missing".to_string(),
                }),
            };
        }
        _ => {
            return Err(ToolError::InvalidArguments {
                tool: spec.name.clone(),
                reason: "arguments must be an object".to_string(),
            });
        }
    };

    for key in required_keys(spec) {
        if !args.contains_key(&key) {
            return Err(ToolError::InvalidArguments {
                tool: spec.name.clone(),
                reason: format!("missing required argument '{}'", key),
            });
        }
    }

    let properties = spec
        .parameters
        .get("properties")
        .and_then(|v| v.as_object());
    if let Some(properties) = properties {
        for (key, value) in args {
            let declared = properties
                .get(key)
                .and_then(|p| p.get("type"))
                .and_then(|t| t.as_str());
            let ok = match declared {
                Some("string") => value.is_string(),
                Some("integer") => value.is_i64() || value.is_u64(),
                Some("number") => value.is_number(),
                Some("boolean") => value.is_boolean(),
                _ => true,
            };
            if !ok {
                return Err(ToolError::InvalidArguments {
                    tool: spec.name.clone(),
                    reason: format!(
                        "argument '{}' should be {}",
                        key,
                        declared.unwrap_or("unconstrained")
                    ),
                });
            }
        }
    }

    Ok(())
}

fn required_keys(spec: &ToolSpec) -> Vec<String> {
    spec.parameters
        .get("required")
        .and_then(|v| v.as_array())
        .map(|arr| {
            arr.iter()
                .filter_map(|v| v.as_str().map(String::from))
                .collect()
        })
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Echo;

    #[async_trait]
    impl ToolHandler for Echo {
        async fn call(&self, args: serde_json::Value) -> Result<serde_json::Value, ToolError> {
            Ok(serde_json::json!({ "echo": args }))
        }
    }

    struct Exploding;

    #[async_trait]
    impl ToolHandler for Exploding {
        async fn call(&self, _args: serde_json::Value) -> Result<serde_json::Value, ToolError> {
            Err(ToolError::Adapter("connection refused".to_string()))
        }
    }

    fn spec(name: &str) -> ToolSpec {
        ToolSpec {
            name: name.to_string(),
            description: "test tool".to_string(),
            parameters: serde_json::json!({
                "type": "object",
                "properties": {
                    "name": {"type": "string"},
                    "lines": {"type": "integer"},
                },
                "required": ["name"],
            }),
        }
    }

    fn registry() -> ToolRegistry {
        let mut registry = ToolRegistry::new();
        registry.register(spec("echo"), Arc::new(Echo));
        registry.register(spec("explode"), Arc::new(Exploding));
        registry
    }

    #[tokio::test]
    async fn test_unknown_tool_is_an_error_result() {
        let registry = registry();
        let call = ToolCall::new("missing", serde_json::json!({"name": "x"}));
        let result = registry.dispatch(&call).await;
        assert!(matches!(
            result.outcome,
            Err(ToolError::UnknownTool(ref n)) if n == "missing"
        ));
    }

    #[tokio::test]
    async fn test_handler_error_is_wrapped_not_propagated() {
        let registry = registry();
        let call = ToolCall::new("explode", serde_json::json!({"name": "x"}));
        let result = registry.dispatch(&call).await;
        assert!(matches!(result.outcome, Err(ToolError::Adapter(_))));
        assert_eq!(result.correlation_id, call.correlation_id);
    }

    #[tokio::test]
    async fn test_missing_required_argument_rejected() {
        let registry = registry();
        let call = ToolCall::new("echo", serde_json::json!({}));
        let result = registry.dispatch(&call).await;
        assert!(matches!(
            result.outcome,
            Err(ToolError::InvalidArguments { .. })
        ));
    }

    #[tokio::test]
    async fn test_wrong_argument_type_rejected() {
        let registry = registry();
        let call = ToolCall::new("echo", serde_json::json!({"name": "x", "lines": "ten"}));
        let result = registry.dispatch(&call).await;
        assert!(matches!(
            result.outcome,
            Err(ToolError::InvalidArguments { .. })
        ));
    }

    #[tokio::test]
    async fn test_valid_call_reaches_handler() {
        let registry = registry();
        let call = ToolCall::new("echo", serde_json::json!({"name": "x", "lines": 10}));
        let result = registry.dispatch(&call).await;
        assert!(result.is_ok());
        assert_eq!(
            result.outcome.unwrap()["echo"]["name"],
            serde_json::json!("x")
        );
    }

    #[test]
    fn test_specs_lists_registered_tools() {
        let registry = registry();
        let names: Vec<String> = registry.specs().into_iter().map(|s| s.name).collect();
        assert_eq!(names, vec!["echo".to_string(), "explode".to_string()]);
    }
}
