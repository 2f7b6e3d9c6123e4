//! Built-in tool sets offered to the decision engine.
//!
//! The monitoring set is read-only (listing, status, logs); the incident set
//! adds the restart capability. A missing resource is a *finding*, reported
//! in the payload the way an operator would read it; only infrastructure
//! failures become tool errors.

use crate::adapter::{AdapterError, ResourceAdapter};
use crate::healer::Healer;
use crate::health::HealthAggregator;
use crate::registry::{ToolHandler, ToolRegistry};
use async_trait::async_trait;
use std::sync::Arc;
use warden_common::{ListFilter, Resource, ResourceStatus, ToolError, ToolSpec};

const DEFAULT_LOG_LINES: usize = 20;

fn summary(resource: &Resource) -> serde_json::Value {
    serde_json::json!({
        "name": resource.name,
        "id": resource.id,
        "status": resource.status,
        "image": resource.image,
        "environment": resource.environment(),
        "role": resource.role(),
        "health": if resource.is_running() { "healthy" } else { "unhealthy" },
    })
}

fn not_found(name: &str) -> serde_json::Value {
    serde_json::json!({ "error": format!("resource '{}' not found", name) })
}

fn adapter_error(e: AdapterError) -> ToolError {
    ToolError::Adapter(e.to_string())
}

fn name_arg(args: &serde_json::Value, tool: &str) -> Result<String, ToolError> {
    args.get("name")
        .and_then(|v| v.as_str())
        .map(String::from)
        .ok_or_else(|| ToolError::InvalidArguments {
            tool: tool.to_string(),
            reason: "missing required argument 'name'".to_string(),
        })
}

struct ListAllResources {
    adapter: Arc<dyn ResourceAdapter>,
    managed_label: String,
}

#[async_trait]
impl ToolHandler for ListAllResources {
    async fn call(&self, _args: serde_json::Value) -> Result<serde_json::Value, ToolError> {
        let resources = self
            .adapter
            .list(&ListFilter::managed(&self.managed_label))
            .await
            .map_err(adapter_error)?;
        Ok(serde_json::json!({
            "total": resources.len(),
            "resources": resources.iter().map(summary).collect::<Vec<_>>(),
        }))
    }
}

struct ListRunningResources {
    adapter: Arc<dyn ResourceAdapter>,
    managed_label: String,
}

#[async_trait]
impl ToolHandler for ListRunningResources {
    async fn call(&self, _args: serde_json::Value) -> Result<serde_json::Value, ToolError> {
        let resources = self
            .adapter
            .list(&ListFilter {
                label_present: Some(self.managed_label.clone()),
                status: Some(ResourceStatus::Running),
            })
            .await
            .map_err(adapter_error)?;
        Ok(serde_json::json!({
            "total": resources.len(),
            "resources": resources.iter().map(summary).collect::<Vec<_>>(),
        }))
    }
}

struct GetResourceStatus {
    adapter: Arc<dyn ResourceAdapter>,
}

#[async_trait]
impl ToolHandler for GetResourceStatus {
    async fn call(&self, args: serde_json::Value) -> Result<serde_json::Value, ToolError> {
        let name = name_arg(&args, "get_resource_status")?;
        match self.adapter.get(&name).await {
            Ok(resource) => {
                let mut detail = summary(&resource);
                detail["exit_code"] = serde_json::json!(resource.exit_code);
                Ok(detail)
            }
            Err(AdapterError::NotFound(_)) => Ok(not_found(&name)),
            Err(e) => Err(adapter_error(e)),
        }
    }
}

struct GetResourceLogs {
    adapter: Arc<dyn ResourceAdapter>,
}

#[async_trait]
impl ToolHandler for GetResourceLogs {
    async fn call(&self, args: serde_json::Value) -> Result<serde_json::Value, ToolError> {
        let name = name_arg(&args, "get_resource_logs")?;
        let lines = args
            .get("lines")
            .and_then(|v| v.as_u64())
            .map(|n| n as usize)
            .unwrap_or(DEFAULT_LOG_LINES);

        match self.adapter.logs(&name, lines).await {
            Ok(logs) => Ok(serde_json::json!({
                "resource": name,
                "log_count": logs.len(),
                "logs": logs,
            })),
            Err(AdapterError::NotFound(_)) => Ok(not_found(&name)),
            Err(e) => Err(adapter_error(e)),
        }
    }
}

struct CheckUnhealthyResources {
    adapter: Arc<dyn ResourceAdapter>,
    managed_label: String,
}

#[async_trait]
impl ToolHandler for CheckUnhealthyResources {
    async fn call(&self, _args: serde_json::Value) -> Result<serde_json::Value, ToolError> {
        let resources = self
            .adapter
            .list(&ListFilter::managed(&self.managed_label))
            .await
            .map_err(adapter_error)?;

        let unhealthy: Vec<serde_json::Value> = resources
            .iter()
            .filter(|r| !r.is_running())
            .map(|r| {
                let mut detail = summary(r);
                detail["exit_code"] = serde_json::json!(r.exit_code);
                detail
            })
            .collect();

        Ok(serde_json::json!({
            "total_checked": resources.len(),
            "unhealthy_count": unhealthy.len(),
            "unhealthy_resources": unhealthy,
            "all_healthy": unhealthy.is_empty(),
        }))
    }
}

struct RestartResourceWithRetry {
    healer: Arc<Healer>,
}

#[async_trait]
impl ToolHandler for RestartResourceWithRetry {
    async fn call(&self, args: serde_json::Value) -> Result<serde_json::Value, ToolError> {
        let name = name_arg(&args, "restart_resource_with_retry")?;
        let report = self.healer.heal(&name).await;
        serde_json::to_value(&report)
            .map_err(|e| ToolError::Adapter(format!("unserializable report: {}", e)))
    }
}

struct CheckResourceHealth {
    aggregator: Arc<HealthAggregator>,
}

#[async_trait]
impl ToolHandler for CheckResourceHealth {
    async fn call(&self, _args: serde_json::Value) -> Result<serde_json::Value, ToolError> {
        let snapshot = self.aggregator.snapshot().await.map_err(adapter_error)?;
        serde_json::to_value(&snapshot)
            .map_err(|e| ToolError::Adapter(format!("unserializable snapshot: {}", e)))
    }
}

fn no_params() -> serde_json::Value {
    serde_json::json!({ "type": "object", "properties": {} })
}

fn name_params(with_lines: bool) -> serde_json::Value {
    let mut properties = serde_json::json!({
        "name": { "type": "string", "description": "Resource name" },
    });
    if with_lines {
        properties["lines"] = serde_json::json!({
            "type": "integer",
            "description": "How many trailing log lines to return",
        });
    }
    serde_json::json!({
        "type": "object",
        "properties": properties,
        "required": ["name"],
    })
}

/// Read-only tool set for health diagnosis
pub fn monitoring_registry(
    adapter: Arc<dyn ResourceAdapter>,
    managed_label: &str,
) -> ToolRegistry {
    let mut registry = ToolRegistry::new();

    registry.register(
        ToolSpec {
            name: "list_all_resources".into(),
            description: "List every managed resource, running or not".into(),
            parameters: no_params(),
        },
        Arc::new(ListAllResources {
            adapter: adapter.clone(),
            managed_label: managed_label.to_string(),
        }),
    );
    registry.register(
        ToolSpec {
            name: "list_running_resources".into(),
            description: "List only the managed resources currently running".into(),
            parameters: no_params(),
        },
        Arc::new(ListRunningResources {
            adapter: adapter.clone(),
            managed_label: managed_label.to_string(),
        }),
    );
    registry.register(
        ToolSpec {
            name: "get_resource_status".into(),
            description: "Detailed status of one resource, including exit code".into(),
            parameters: name_params(false),
        },
        Arc::new(GetResourceStatus {
            adapter: adapter.clone(),
        }),
    );
    registry.register(
        ToolSpec {
            name: "get_resource_logs".into(),
            description: "Recent log lines from one resource".into(),
            parameters: name_params(true),
        },
        Arc::new(GetResourceLogs {
            adapter: adapter.clone(),
        }),
    );
    registry.register(
        ToolSpec {
            name: "check_unhealthy_resources".into(),
            description: "Find all managed resources that are down".into(),
            parameters: no_params(),
        },
        Arc::new(CheckUnhealthyResources {
            adapter,
            managed_label: managed_label.to_string(),
        }),
    );

    registry
}

/// Tool set for engine-directed incident response: health check plus the
/// restart capability
pub fn incident_registry(healer: Arc<Healer>, aggregator: Arc<HealthAggregator>) -> ToolRegistry {
    let mut registry = ToolRegistry::new();

    registry.register(
        ToolSpec {
            name: "restart_resource_with_retry".into(),
            description: "Restart a resource, retrying up to the configured bound".into(),
            parameters: name_params(false),
        },
        Arc::new(RestartResourceWithRetry { healer }),
    );
    registry.register(
        ToolSpec {
            name: "check_resource_health".into(),
            description: "Snapshot of the managed fleet: counts and stopped resources".into(),
            parameters: no_params(),
        },
        Arc::new(CheckResourceHealth { aggregator }),
    );

    registry
}
