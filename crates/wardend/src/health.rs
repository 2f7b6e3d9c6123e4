//! Health aggregator - partitions the managed fleet into running/stopped.

use crate::adapter::{AdapterError, ResourceAdapter};
use std::sync::Arc;
use tracing::debug;
use warden_common::{HealthSnapshot, ListFilter};

/// Builds fleet snapshots from live inventory listings.
///
/// Each call re-queries the adapter; nothing is cached between cycles.
pub struct HealthAggregator {
    adapter: Arc<dyn ResourceAdapter>,
    managed_label: String,
}

impl HealthAggregator {
    pub fn new(adapter: Arc<dyn ResourceAdapter>, managed_label: impl Into<String>) -> Self {
        Self {
            adapter,
            managed_label: managed_label.into(),
        }
    }

    pub async fn snapshot(&self) -> Result<HealthSnapshot, AdapterError> {
        let resources = self
            .adapter
            .list(&ListFilter::managed(&self.managed_label))
            .await?;

        let (running, stopped): (Vec<_>, Vec<_>) =
            resources.into_iter().partition(|r| r.is_running());

        let snapshot = HealthSnapshot::from_partition(running, stopped);
        debug!(
            total = snapshot.total,
            running = snapshot.running,
            stopped = snapshot.stopped,
            "built health snapshot"
        );
        Ok(snapshot)
    }
}
