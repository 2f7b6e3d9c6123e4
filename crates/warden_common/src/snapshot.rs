//! Health snapshot of the managed fleet.

use crate::resource::Resource;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Point-in-time partition of the managed fleet.
///
/// Built fresh each monitoring cycle from a live inventory listing; never
/// mutated incrementally.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthSnapshot {
    pub taken_at: DateTime<Utc>,
    pub total: usize,
    pub running: usize,
    pub stopped: usize,
    /// Stopped resources in listing order
    pub stopped_resources: Vec<Resource>,
}

impl HealthSnapshot {
    pub fn from_partition(running: Vec<Resource>, stopped: Vec<Resource>) -> Self {
        Self {
            taken_at: Utc::now(),
            total: running.len() + stopped.len(),
            running: running.len(),
            stopped: stopped.len(),
            stopped_resources: stopped,
        }
    }

    pub fn all_healthy(&self) -> bool {
        self.stopped == 0
    }
}
