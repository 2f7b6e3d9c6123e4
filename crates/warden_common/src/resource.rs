//! Managed resource model.
//!
//! A resource is one monitored unit (a container) known to the inventory.
//! Only resources carrying the managed marker label are in scope for
//! monitoring and healing.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Label that marks a resource as managed by warden
pub const DEFAULT_MANAGED_LABEL: &str = "environment";

/// Lifecycle status as reported by the inventory
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResourceStatus {
    Running,
    Stopped,
    Unknown,
}

impl ResourceStatus {
    /// Map a raw inventory status string to a typed status.
    ///
    /// Inventories report container runtime states ("running", "exited",
    /// "paused", "down", ...); anything that is a known non-running state
    /// is Stopped, anything unrecognized is Unknown.
    pub fn from_raw(raw: &str) -> Self {
        match raw.trim().to_ascii_lowercase().as_str() {
            "running" => Self::Running,
            "exited" | "stopped" | "paused" | "down" | "dead" | "created" => Self::Stopped,
            _ => Self::Unknown,
        }
    }

    pub fn is_running(&self) -> bool {
        matches!(self, Self::Running)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Running => "running",
            Self::Stopped => "stopped",
            Self::Unknown => "unknown",
        }
    }
}

impl std::fmt::Display for ResourceStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One monitored unit with its identity, status and labels
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Resource {
    pub id: String,
    pub name: String,
    pub status: ResourceStatus,
    #[serde(default)]
    pub image: String,
    #[serde(default)]
    pub labels: BTreeMap<String, String>,
    /// Exit code of the last run, when the inventory knows it
    #[serde(default)]
    pub exit_code: Option<i64>,
}

impl Resource {
    /// Whether this resource carries the managed marker label
    pub fn is_managed(&self, marker: &str) -> bool {
        self.labels.contains_key(marker)
    }

    /// Deployment role from labels ("web", "db", ...), "unknown" if absent
    pub fn role(&self) -> &str {
        self.labels.get("role").map(String::as_str).unwrap_or("unknown")
    }

    /// Environment label value ("prod", "staging", ...), "unknown" if absent
    pub fn environment(&self) -> &str {
        self.labels
            .get(DEFAULT_MANAGED_LABEL)
            .map(String::as_str)
            .unwrap_or("unknown")
    }

    pub fn is_running(&self) -> bool {
        self.status.is_running()
    }
}

/// Filter for inventory listings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ListFilter {
    /// Only resources carrying this label key
    pub label_present: Option<String>,
    /// Only resources in this status
    pub status: Option<ResourceStatus>,
}

impl ListFilter {
    pub fn managed(marker: &str) -> Self {
        Self {
            label_present: Some(marker.to_string()),
            status: None,
        }
    }

    pub fn matches(&self, resource: &Resource) -> bool {
        if let Some(marker) = &self.label_present {
            if !resource.is_managed(marker) {
                return false;
            }
        }
        if let Some(status) = self.status {
            if resource.status != status {
                return false;
            }
        }
        true
    }
}
