//! Resource adapter - access port to the inventory.
//!
//! Everything the daemon knows about live resources flows through
//! [`ResourceAdapter`]. The HTTP implementation talks to the inventory
//! service; [`FakeAdapter`] backs deterministic tests.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;
use warden_common::{ListFilter, Resource, ResourceStatus};

/// Inventory access failures
#[derive(Debug, Clone, thiserror::Error)]
pub enum AdapterError {
    /// Target resource absent; terminal for the operation, never retried
    #[error("resource not found: {0}")]
    NotFound(String),

    /// Transport-level failure; retryable only within the healing bound
    #[error("inventory transport error: {0}")]
    Transport(String),

    #[error("inventory returned HTTP {code}")]
    Status { code: u16 },
}

/// Port to the resource inventory
#[async_trait]
pub trait ResourceAdapter: Send + Sync {
    async fn list(&self, filter: &ListFilter) -> Result<Vec<Resource>, AdapterError>;

    async fn get(&self, name: &str) -> Result<Resource, AdapterError>;

    /// Restart the resource and report the status it settled in
    async fn restart(&self, name: &str, timeout_secs: u64)
        -> Result<ResourceStatus, AdapterError>;

    async fn logs(&self, name: &str, max_lines: usize) -> Result<Vec<String>, AdapterError>;
}

/// Adapter over the HTTP inventory service
pub struct HttpResourceAdapter {
    base: String,
    client: reqwest::Client,
}

impl HttpResourceAdapter {
    pub fn new(endpoint: &str) -> Result<Self, AdapterError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| AdapterError::Transport(format!("failed to create HTTP client: {}", e)))?;
        Ok(Self {
            base: endpoint.trim_end_matches('/').to_string(),
            client,
        })
    }

    async fn get_json(&self, url: &str, name: &str) -> Result<serde_json::Value, AdapterError> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| AdapterError::Transport(e.to_string()))?;

        match response.status().as_u16() {
            404 => Err(AdapterError::NotFound(name.to_string())),
            code if !(200..300).contains(&code) => Err(AdapterError::Status { code }),
            _ => response
                .json()
                .await
                .map_err(|e| AdapterError::Transport(format!("unparseable body: {}", e))),
        }
    }
}

#[async_trait]
impl ResourceAdapter for HttpResourceAdapter {
    async fn list(&self, filter: &ListFilter) -> Result<Vec<Resource>, AdapterError> {
        let mut url = format!("{}/resources", self.base);
        if let Some(status) = filter.status {
            url.push_str(&format!("?status={}", status));
        }

        let json = self.get_json(&url, "").await?;
        let resources: Vec<Resource> = serde_json::from_value(
            json.get("resources").cloned().unwrap_or_default(),
        )
        .map_err(|e| AdapterError::Transport(format!("bad listing shape: {}", e)))?;

        // The inventory filters by status; the label filter is ours.
        Ok(resources
            .into_iter()
            .filter(|r| filter.matches(r))
            .collect())
    }

    async fn get(&self, name: &str) -> Result<Resource, AdapterError> {
        let url = format!("{}/resources/{}/status", self.base, name);
        let json = self.get_json(&url, name).await?;
        serde_json::from_value(json)
            .map_err(|e| AdapterError::Transport(format!("bad resource shape: {}", e)))
    }

    async fn restart(
        &self,
        name: &str,
        timeout_secs: u64,
    ) -> Result<ResourceStatus, AdapterError> {
        let url = format!("{}/resources/{}/restart", self.base, name);
        let response = self
            .client
            .post(&url)
            .json(&serde_json::json!({ "timeout_secs": timeout_secs }))
            .send()
            .await
            .map_err(|e| AdapterError::Transport(e.to_string()))?;

        match response.status().as_u16() {
            404 => Err(AdapterError::NotFound(name.to_string())),
            code if !(200..300).contains(&code) => Err(AdapterError::Status { code }),
            _ => {
                let json: serde_json::Value = response
                    .json()
                    .await
                    .map_err(|e| AdapterError::Transport(format!("unparseable body: {}", e)))?;
                let raw = json.get("status").and_then(|v| v.as_str()).unwrap_or("");
                Ok(ResourceStatus::from_raw(raw))
            }
        }
    }

    async fn logs(&self, name: &str, max_lines: usize) -> Result<Vec<String>, AdapterError> {
        let url = format!("{}/resources/{}/logs?lines={}", self.base, name, max_lines);
        let json = self.get_json(&url, name).await?;
        serde_json::from_value(json.get("logs").cloned().unwrap_or_default())
            .map_err(|e| AdapterError::Transport(format!("bad logs shape: {}", e)))
    }
}

/// What a scripted restart does to the fake's stored resource
#[derive(Debug, Clone)]
pub enum RestartBehavior {
    /// Resource comes back running
    Succeed,
    /// Restart "succeeds" but the resource stays down
    StayStopped,
    /// Restart call itself fails
    Fail(String),
}

/// In-memory adapter for tests.
///
/// Holds resources behind a mutex and replays scripted restart behaviors
/// per resource, recording every restart call.
#[derive(Default)]
pub struct FakeAdapter {
    resources: Mutex<HashMap<String, Resource>>,
    restart_script: Mutex<HashMap<String, Vec<RestartBehavior>>>,
    restart_calls: Mutex<Vec<String>>,
    logs: Mutex<HashMap<String, Vec<String>>>,
}

impl FakeAdapter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, resource: Resource) {
        self.resources
            .lock()
            .unwrap()
            .insert(resource.name.clone(), resource);
    }

    pub fn set_logs(&self, name: &str, lines: Vec<String>) {
        self.logs.lock().unwrap().insert(name.to_string(), lines);
    }

    /// Queue restart behaviors for a resource, consumed one per call; an
    /// empty queue defaults to [`RestartBehavior::Succeed`].
    pub fn script_restarts(&self, name: &str, behaviors: Vec<RestartBehavior>) {
        self.restart_script
            .lock()
            .unwrap()
            .insert(name.to_string(), behaviors);
    }

    /// Names passed to restart, in call order
    pub fn restart_calls(&self) -> Vec<String> {
        self.restart_calls.lock().unwrap().clone()
    }

    pub fn restart_count(&self, name: &str) -> usize {
        self.restart_calls
            .lock()
            .unwrap()
            .iter()
            .filter(|n| n.as_str() == name)
            .count()
    }

    pub fn status_of(&self, name: &str) -> Option<ResourceStatus> {
        self.resources.lock().unwrap().get(name).map(|r| r.status)
    }
}

#[async_trait]
impl ResourceAdapter for FakeAdapter {
    async fn list(&self, filter: &ListFilter) -> Result<Vec<Resource>, AdapterError> {
        let resources = self.resources.lock().unwrap();
        let mut listed: Vec<Resource> = resources
            .values()
            .filter(|r| filter.matches(r))
            .cloned()
            .collect();
        listed.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(listed)
    }

    async fn get(&self, name: &str) -> Result<Resource, AdapterError> {
        self.resources
            .lock()
            .unwrap()
            .get(name)
            .cloned()
            .ok_or_else(|| AdapterError::NotFound(name.to_string()))
    }

    async fn restart(
        &self,
        name: &str,
        _timeout_secs: u64,
    ) -> Result<ResourceStatus, AdapterError> {
        self.restart_calls.lock().unwrap().push(name.to_string());

        let behavior = {
            let mut script = self.restart_script.lock().unwrap();
            match script.get_mut(name) {
                Some(queue) if !queue.is_empty() => queue.remove(0),
                _ => RestartBehavior::Succeed,
            }
        };

        let mut resources = self.resources.lock().unwrap();
        let resource = resources
            .get_mut(name)
            .ok_or_else(|| AdapterError::NotFound(name.to_string()))?;

        match behavior {
            RestartBehavior::Succeed => {
                resource.status = ResourceStatus::Running;
                Ok(ResourceStatus::Running)
            }
            RestartBehavior::StayStopped => Ok(resource.status),
            RestartBehavior::Fail(reason) => Err(AdapterError::Transport(reason)),
        }
    }

    async fn logs(&self, name: &str, max_lines: usize) -> Result<Vec<String>, AdapterError> {
        if !self.resources.lock().unwrap().contains_key(name) {
            return Err(AdapterError::NotFound(name.to_string()));
        }
        let logs = self.logs.lock().unwrap();
        let lines = logs.get(name).cloned().unwrap_or_default();
        let start = lines.len().saturating_sub(max_lines);
        Ok(lines[start..].to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;
    use warden_common::DEFAULT_MANAGED_LABEL;

    fn managed(name: &str, status: ResourceStatus) -> Resource {
        let mut labels = BTreeMap::new();
        labels.insert(DEFAULT_MANAGED_LABEL.to_string(), "prod".to_string());
        Resource {
            id: format!("id-{}", name),
            name: name.to_string(),
            status,
            image: "app:latest".to_string(),
            labels,
            exit_code: None,
        }
    }

    #[tokio::test]
    async fn test_fake_list_applies_filter() {
        let adapter = FakeAdapter::new();
        adapter.insert(managed("a", ResourceStatus::Running));
        adapter.insert(managed("b", ResourceStatus::Stopped));

        let stopped = adapter
            .list(&ListFilter {
                label_present: Some(DEFAULT_MANAGED_LABEL.to_string()),
                status: Some(ResourceStatus::Stopped),
            })
            .await
            .unwrap();
        assert_eq!(stopped.len(), 1);
        assert_eq!(stopped[0].name, "b");
    }

    #[tokio::test]
    async fn test_fake_restart_script_consumed_in_order() {
        let adapter = FakeAdapter::new();
        adapter.insert(managed("web", ResourceStatus::Stopped));
        adapter.script_restarts(
            "web",
            vec![RestartBehavior::StayStopped, RestartBehavior::Succeed],
        );

        assert_eq!(
            adapter.restart("web", 10).await.unwrap(),
            ResourceStatus::Stopped
        );
        assert_eq!(
            adapter.restart("web", 10).await.unwrap(),
            ResourceStatus::Running
        );
        assert_eq!(adapter.restart_count("web"), 2);
    }

    #[tokio::test]
    async fn test_fake_unknown_resource_is_not_found() {
        let adapter = FakeAdapter::new();
        assert!(matches!(
            adapter.get("ghost").await,
            Err(AdapterError::NotFound(_))
        ));
        assert!(matches!(
            adapter.restart("ghost", 10).await,
            Err(AdapterError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_fake_logs_tail() {
        let adapter = FakeAdapter::new();
        adapter.insert(managed("web", ResourceStatus::Running));
        adapter.set_logs(
            "web",
            vec!["one".into(), "two".into(), "three".into()],
        );
        let tail = adapter.logs("web", 2).await.unwrap();
        assert_eq!(tail, vec!["two".to_string(), "three".to_string()]);
    }
}
