//! Alert model and the severity transmit policy.
//!
//! The escalation engine decides *whether* an alert leaves the process; the
//! notifier only carries it. Suppressed alerts are still recorded for audit.

use serde::{Deserialize, Serialize};

/// Alert severity, in the order operators triage them
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Severity {
    Info,
    Warning,
    Critical,
    /// A previously failing resource recovered on its own power
    Success,
}

impl Severity {
    pub fn tag(&self) -> &'static str {
        match self {
            Self::Info => "INFO",
            Self::Warning => "WARNING",
            Self::Critical => "CRITICAL",
            Self::Success => "SUCCESS",
        }
    }
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.tag())
    }
}

/// Which severities actually transmit.
///
/// Info and Success default to record-only so routine cycles do not spam the
/// operators; flip `notify_success` to surface auto-healed incidents.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlertPolicy {
    #[serde(default)]
    pub notify_info: bool,
    #[serde(default = "default_true")]
    pub notify_warning: bool,
    #[serde(default = "default_true")]
    pub notify_critical: bool,
    #[serde(default)]
    pub notify_success: bool,
}

fn default_true() -> bool {
    true
}

impl Default for AlertPolicy {
    fn default() -> Self {
        Self {
            notify_info: false,
            notify_warning: true,
            notify_critical: true,
            notify_success: false,
        }
    }
}

impl AlertPolicy {
    pub fn should_transmit(&self, severity: Severity) -> bool {
        match severity {
            Severity::Info => self.notify_info,
            Severity::Warning => self.notify_warning,
            Severity::Critical => self.notify_critical,
            Severity::Success => self.notify_success,
        }
    }
}

/// One outbound (or suppressed) notification
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Alert {
    pub severity: Severity,
    pub subject: String,
    pub body: String,
    /// Resource id plus resolution kind; overlapping cycles use this to
    /// avoid double-sending for the same unresolved incident
    pub dedup_key: String,
    /// Derived from the policy at creation time
    pub should_transmit: bool,
}

impl Alert {
    pub fn new(
        policy: &AlertPolicy,
        severity: Severity,
        subject: impl Into<String>,
        body: impl Into<String>,
        dedup_key: impl Into<String>,
    ) -> Self {
        Self {
            severity,
            subject: subject.into(),
            body: body.into(),
            dedup_key: dedup_key.into(),
            should_transmit: policy.should_transmit(severity),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_policy_table() {
        let policy = AlertPolicy::default();
        assert!(!policy.should_transmit(Severity::Info));
        assert!(policy.should_transmit(Severity::Warning));
        assert!(policy.should_transmit(Severity::Critical));
        assert!(!policy.should_transmit(Severity::Success));
    }

    #[test]
    fn test_success_transmit_is_a_knob() {
        let policy = AlertPolicy {
            notify_success: true,
            ..AlertPolicy::default()
        };
        let alert = Alert::new(&policy, Severity::Success, "s", "b", "r1:healed");
        assert!(alert.should_transmit);
    }

    #[test]
    fn test_alert_derives_transmit_from_policy() {
        let policy = AlertPolicy::default();
        let info = Alert::new(&policy, Severity::Info, "s", "b", "k");
        let critical = Alert::new(&policy, Severity::Critical, "s", "b", "k");
        assert!(!info.should_transmit);
        assert!(critical.should_transmit);
    }
}
