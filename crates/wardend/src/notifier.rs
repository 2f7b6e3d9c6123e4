//! Alert delivery.
//!
//! The notifier only carries alerts; suppression decisions are made by the
//! escalation engine before `send` is ever called. Failures come back as
//! typed errors, never as panics, and are recorded by the caller rather than
//! retried.

use async_trait::async_trait;
use chrono::Utc;
use lettre::{
    message::header::ContentType, transport::smtp::authentication::Credentials,
    AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor,
};
use std::sync::Mutex;
use tracing::info;
use warden_common::{Alert, EmailConfig};

#[derive(Debug, Clone, thiserror::Error)]
pub enum NotifyError {
    #[error("notifier not configured: {0}")]
    NotConfigured(String),

    #[error("email build error: {0}")]
    Build(String),

    #[error("SMTP error: {0}")]
    Smtp(String),
}

/// Outbound alert channel
#[async_trait]
pub trait Notifier: Send + Sync {
    /// Deliver to the configured recipient
    async fn send(&self, alert: &Alert) -> Result<(), NotifyError> {
        self.send_to(alert, None).await
    }

    /// Deliver to an explicit recipient instead of the configured one
    async fn send_to(&self, alert: &Alert, recipient: Option<&str>)
        -> Result<(), NotifyError>;
}

/// SMTP email notifier (STARTTLS relay with credentials)
pub struct EmailNotifier {
    config: EmailConfig,
}

impl EmailNotifier {
    pub fn new(config: EmailConfig) -> Self {
        Self { config }
    }

    fn body_with_footer(alert: &Alert) -> String {
        format!(
            "{}\n\nSent by warden at {} UTC\n",
            alert.body.trim_end(),
            Utc::now().format("%Y-%m-%d %H:%M:%S")
        )
    }
}

#[async_trait]
impl Notifier for EmailNotifier {
    async fn send_to(
        &self,
        alert: &Alert,
        recipient: Option<&str>,
    ) -> Result<(), NotifyError> {
        let to = recipient.unwrap_or(&self.config.to);
        if self.config.from.is_empty() || to.is_empty() {
            return Err(NotifyError::NotConfigured(
                "email from/to addresses are not set".to_string(),
            ));
        }

        let email = Message::builder()
            .from(self
                .config
                .from
                .parse()
                .map_err(|e| NotifyError::Build(format!("from address: {}", e)))?)
            .to(to
                .parse()
                .map_err(|e| NotifyError::Build(format!("to address: {}", e)))?)
            .subject(format!("[{}] {}", alert.severity, alert.subject))
            .header(ContentType::TEXT_PLAIN)
            .body(Self::body_with_footer(alert))
            .map_err(|e| NotifyError::Build(e.to_string()))?;

        let username = self
            .config
            .username
            .clone()
            .unwrap_or_else(|| self.config.from.clone());
        let credentials = Credentials::new(username, self.config.password.clone());

        let mailer = AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&self.config.smtp_host)
            .map_err(|e| NotifyError::Smtp(format!("relay setup: {}", e)))?
            .port(self.config.smtp_port)
            .credentials(credentials)
            .build();

        mailer
            .send(email)
            .await
            .map_err(|e| NotifyError::Smtp(e.to_string()))?;

        info!(%to, severity = %alert.severity, "alert email sent");
        Ok(())
    }
}

/// Recording notifier for tests: captures alerts and the recipient each was
/// addressed to, optionally failing every send with a fixed error.
#[derive(Default)]
pub struct RecordingNotifier {
    sent: Mutex<Vec<(Alert, Option<String>)>>,
    fail_with: Option<String>,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing(reason: &str) -> Self {
        Self {
            sent: Mutex::new(Vec::new()),
            fail_with: Some(reason.to_string()),
        }
    }

    pub fn sent(&self) -> Vec<Alert> {
        self.sent.lock().unwrap().iter().map(|(a, _)| a.clone()).collect()
    }

    /// Recipient overrides seen, in send order (None = configured default)
    pub fn recipients(&self) -> Vec<Option<String>> {
        self.sent.lock().unwrap().iter().map(|(_, r)| r.clone()).collect()
    }

    pub fn sent_count(&self) -> usize {
        self.sent.lock().unwrap().len()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn send_to(
        &self,
        alert: &Alert,
        recipient: Option<&str>,
    ) -> Result<(), NotifyError> {
        if let Some(reason) = &self.fail_with {
            return Err(NotifyError::Smtp(reason.clone()));
        }
        self.sent
            .lock()
            .unwrap()
            .push((alert.clone(), recipient.map(String::from)));
        Ok(())
    }
}
