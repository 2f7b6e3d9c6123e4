//! HTTP inventory service.
//!
//! Serves a small in-memory fleet over the read-only query API plus a
//! restart endpoint, for demos and integration tests. The daemon core never
//! depends on these shapes directly, only on the `ResourceAdapter` port.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tower_http::trace::TraceLayer;
use tracing::info;
use warden_common::{Resource, ResourceStatus, DEFAULT_MANAGED_LABEL};

/// Deterministic per-resource metrics
#[derive(Debug, Clone, Serialize)]
pub struct ResourceMetrics {
    pub cpu_percent: f64,
    pub memory_percent: f64,
    pub disk_percent: f64,
}

impl Default for ResourceMetrics {
    fn default() -> Self {
        Self {
            cpu_percent: 12.5,
            memory_percent: 40.0,
            disk_percent: 55.0,
        }
    }
}

/// One inventory entry
#[derive(Debug, Clone)]
pub struct StoredResource {
    pub resource: Resource,
    pub logs: Vec<String>,
    pub metrics: ResourceMetrics,
    /// When false, restarts leave the resource down (for exercising the
    /// exhaustion path end-to-end)
    pub heals_on_restart: bool,
}

impl StoredResource {
    pub fn new(resource: Resource) -> Self {
        Self {
            resource,
            logs: Vec::new(),
            metrics: ResourceMetrics::default(),
            heals_on_restart: true,
        }
    }

    pub fn with_logs(mut self, logs: Vec<String>) -> Self {
        self.logs = logs;
        self
    }

    pub fn stuck(mut self) -> Self {
        self.heals_on_restart = false;
        self
    }
}

/// Shared inventory store behind the router
#[derive(Clone, Default)]
pub struct InventoryState {
    inner: Arc<RwLock<BTreeMap<String, StoredResource>>>,
}

impl InventoryState {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert(&self, stored: StoredResource) {
        self.inner
            .write()
            .await
            .insert(stored.resource.name.clone(), stored);
    }

    pub async fn status_of(&self, name: &str) -> Option<ResourceStatus> {
        self.inner.read().await.get(name).map(|s| s.resource.status)
    }

    /// A small fleet with one stopped database, mirroring a typical demo
    /// environment
    pub async fn seeded_demo() -> Self {
        fn managed(
            id: &str,
            name: &str,
            role: &str,
            status: ResourceStatus,
            image: &str,
        ) -> Resource {
            let mut labels = BTreeMap::new();
            labels.insert(DEFAULT_MANAGED_LABEL.to_string(), "prod".to_string());
            labels.insert("role".to_string(), role.to_string());
            Resource {
                id: id.to_string(),
                name: name.to_string(),
                status,
                image: image.to_string(),
                labels,
                exit_code: if status.is_running() { None } else { Some(137) },
            }
        }

        let state = Self::new();
        state
            .insert(
                StoredResource::new(managed(
                    "3f9a1c2b4d5e",
                    "prod-web-01",
                    "web",
                    ResourceStatus::Running,
                    "nginx:1.27",
                ))
                .with_logs(vec![
                    "[INFO] Application started successfully".into(),
                    "[INFO] Scheduled task completed: DailyBackup".into(),
                ]),
            )
            .await;
        state
            .insert(
                StoredResource::new(managed(
                    "8c7d0e1f2a3b",
                    "prod-db-01",
                    "db",
                    ResourceStatus::Stopped,
                    "postgres:16",
                ))
                .with_logs(vec![
                    "[WARNING] High memory usage detected: 91%".into(),
                    "[ERROR] Connection timeout to storage backend".into(),
                    "[ERROR] Failed to start service: HealthService".into(),
                ]),
            )
            .await;
        state
            .insert(
                StoredResource::new(managed(
                    "5b6c9d8e7f0a",
                    "cache-01",
                    "cache",
                    ResourceStatus::Running,
                    "redis:7",
                ))
                .with_logs(vec!["[INFO] Ready to accept connections".into()]),
            )
            .await;
        state
    }
}

type ApiError = (StatusCode, Json<serde_json::Value>);

fn not_found(name: &str) -> ApiError {
    (
        StatusCode::NOT_FOUND,
        Json(serde_json::json!({ "error": format!("resource '{}' not found", name) })),
    )
}

#[derive(Debug, Deserialize)]
struct ListQuery {
    status: Option<String>,
}

async fn list_resources(
    State(state): State<InventoryState>,
    Query(query): Query<ListQuery>,
) -> Json<serde_json::Value> {
    let store = state.inner.read().await;
    let wanted = query.status.as_deref().map(ResourceStatus::from_raw);

    let resources: Vec<&Resource> = store
        .values()
        .map(|s| &s.resource)
        .filter(|r| wanted.map_or(true, |w| r.status == w))
        .collect();

    Json(serde_json::json!({
        "total": resources.len(),
        "resources": resources,
    }))
}

/// Look up by name first, id second
fn find(store: &BTreeMap<String, StoredResource>, key: &str) -> Option<StoredResource> {
    if let Some(stored) = store.get(key) {
        return Some(stored.clone());
    }
    store.values().find(|s| s.resource.id == key).cloned()
}

async fn resource_status(
    State(state): State<InventoryState>,
    Path(name): Path<String>,
) -> Result<Json<Resource>, ApiError> {
    let store = state.inner.read().await;
    let stored = find(&store, &name).ok_or_else(|| not_found(&name))?;
    Ok(Json(stored.resource))
}

#[derive(Debug, Deserialize)]
struct LogsQuery {
    lines: Option<usize>,
}

async fn resource_logs(
    State(state): State<InventoryState>,
    Path(name): Path<String>,
    Query(query): Query<LogsQuery>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let store = state.inner.read().await;
    let stored = find(&store, &name).ok_or_else(|| not_found(&name))?;

    let mut logs = stored.logs.clone();
    if !stored.resource.is_running() {
        // A down resource always shows its failure at the head of the tail.
        logs.insert(0, "[CRITICAL] Resource not responding".to_string());
        logs.insert(1, "[ERROR] Connection refused on primary port".to_string());
    }

    let lines = query.lines.unwrap_or(10);
    let start = logs.len().saturating_sub(lines);
    let tail = logs[start..].to_vec();

    Ok(Json(serde_json::json!({
        "resource": stored.resource.name,
        "log_count": tail.len(),
        "logs": tail,
    })))
}

async fn resource_metrics(
    State(state): State<InventoryState>,
    Path(name): Path<String>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let store = state.inner.read().await;
    let stored = find(&store, &name).ok_or_else(|| not_found(&name))?;
    let m = &stored.metrics;

    Ok(Json(serde_json::json!({
        "resource": stored.resource.name,
        "current": m,
        "average": {
            "cpu_percent": m.cpu_percent * 0.8,
            "memory_percent": m.memory_percent * 0.9,
            "disk_percent": m.disk_percent,
        },
    })))
}

#[derive(Debug, Default, Deserialize)]
struct RestartRequest {
    #[serde(default)]
    #[allow(dead_code)]
    timeout_secs: Option<u64>,
}

async fn restart_resource(
    State(state): State<InventoryState>,
    Path(name): Path<String>,
    _body: Option<Json<RestartRequest>>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let mut store = state.inner.write().await;

    let key = match find(&store, &name) {
        Some(stored) => stored.resource.name,
        None => return Err(not_found(&name)),
    };
    let stored = store.get_mut(&key).ok_or_else(|| not_found(&name))?;

    if stored.heals_on_restart {
        stored.resource.status = ResourceStatus::Running;
        stored.resource.exit_code = None;
    }
    info!(resource = %key, status = %stored.resource.status, "restart requested");

    Ok(Json(serde_json::json!({
        "resource": key,
        "status": stored.resource.status,
    })))
}

pub fn router(state: InventoryState) -> Router {
    Router::new()
        .route("/resources", get(list_resources))
        .route("/resources/:name/status", get(resource_status))
        .route("/resources/:name/logs", get(resource_logs))
        .route("/resources/:name/metrics", get(resource_metrics))
        .route("/resources/:name/restart", post(restart_resource))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
}

/// Bind and serve until the process stops
pub async fn serve(state: InventoryState, addr: &str) -> anyhow::Result<()> {
    let app = router(state);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("inventory listening on http://{}", addr);
    axum::serve(listener, app).await?;
    Ok(())
}
