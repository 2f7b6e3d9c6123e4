//! Healing attempt records and incident resolutions.
//!
//! One `HealingReport` covers one incident from detection to its terminal
//! state; the attempt sequence is owned by the escalation engine for the
//! duration of that resolution and discarded once the alert is out.

use crate::resource::ResourceStatus;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Outcome of a single restart attempt
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum AttemptOutcome {
    /// Post-restart status read back as running
    Recovered,
    /// Attempt failed but the retry budget is not exhausted
    Retryable(String),
    /// Attempt failed and no further attempts will be made
    Fatal(String),
}

/// One restart attempt against one resource
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealingAttempt {
    pub resource: String,
    /// 1-based; a not-found short circuit records no attempts at all
    pub attempt: u32,
    pub outcome: AttemptOutcome,
    pub previous_status: ResourceStatus,
    pub new_status: Option<ResourceStatus>,
    pub at: DateTime<Utc>,
}

/// Terminal state of one incident
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Resolution {
    /// Restart brought the resource back; `attempts` is the count that did it
    Healed { attempts: u32 },
    /// Retry budget spent and the resource is still down
    Exhausted { attempts: u32, last_error: String },
    /// Resource was not found at all; zero attempts made
    Missing,
    /// Report-only cycle, no healing attempted
    Reported,
}

impl Resolution {
    pub fn succeeded(&self) -> bool {
        matches!(self, Self::Healed { .. })
    }

    /// Short token used in alert dedup keys
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Healed { .. } => "healed",
            Self::Exhausted { .. } => "exhausted",
            Self::Missing => "missing",
            Self::Reported => "reported",
        }
    }
}

/// Full record of one incident's remediation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealingReport {
    pub resource: String,
    pub previous_status: ResourceStatus,
    pub attempts: Vec<HealingAttempt>,
    pub resolution: Resolution,
}

impl HealingReport {
    pub fn attempts_made(&self) -> u32 {
        self.attempts.len() as u32
    }

    /// Status after the final attempt, when one was observed
    pub fn new_status(&self) -> Option<ResourceStatus> {
        self.attempts.last().and_then(|a| a.new_status)
    }
}
