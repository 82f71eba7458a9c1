//! # Mailers
//!
//! Implementations of the core's `ReminderMailer` seam.
//!
//! - [`WebhookMailer`] POSTs each reminder as JSON to an email provider.
//! - [`LogMailer`] only logs the rendered reminder (development default).
//!
//! Both are blocking. In the server they are only called from
//! `tokio::task::spawn_blocking`.

use crate::config::MailConfig;
use dunning_core::{MailError, Reminder, ReminderMailer};
use serde::Serialize;
use std::sync::{Arc, OnceLock};
use std::time::Duration;

/// Mailer shared between requests.
pub type SharedMailer = Arc<dyn ReminderMailer + Send + Sync>;

// =============================================================================
// WEBHOOK MAILER
// =============================================================================

/// JSON body posted to the provider.
#[derive(Debug, Serialize)]
pub struct WebhookPayload<'a> {
    pub from: &'a str,
    pub to: &'a str,
    pub template: &'a str,
    pub subject: String,
    pub text: String,
    pub variables: &'a Reminder,
}

impl<'a> WebhookPayload<'a> {
    #[must_use]
    pub fn new(from: &'a str, reminder: &'a Reminder) -> Self {
        Self {
            from,
            to: &reminder.to,
            template: reminder.template(),
            subject: reminder.subject(),
            text: reminder.body(),
            variables: reminder,
        }
    }
}

pub struct WebhookMailer {
    url: String,
    token: Option<String>,
    from: String,
    timeout: Duration,
    /// Built on first send so it is created on a blocking thread.
    client: OnceLock<reqwest::blocking::Client>,
}

impl WebhookMailer {
    #[must_use]
    pub fn new(url: impl Into<String>, from: impl Into<String>, timeout: Duration) -> Self {
        Self {
            url: url.into(),
            token: None,
            from: from.into(),
            timeout,
            client: OnceLock::new(),
        }
    }

    #[must_use]
    pub fn with_token(mut self, token: Option<String>) -> Self {
        self.token = token.filter(|t| !t.is_empty());
        self
    }

    #[must_use]
    pub fn url(&self) -> &str {
        &self.url
    }

    fn client(&self) -> Result<&reqwest::blocking::Client, MailError> {
        if let Some(client) = self.client.get() {
            return Ok(client);
        }
        let built = reqwest::blocking::Client::builder()
            .timeout(self.timeout)
            .build()
            .map_err(|e| MailError::Transport(e.to_string()))?;
        Ok(self.client.get_or_init(|| built))
    }
}

impl std::fmt::Debug for WebhookMailer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WebhookMailer")
            .field("url", &self.url)
            .field("from", &self.from)
            .field("timeout", &self.timeout)
            .field("token", &self.token.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

impl ReminderMailer for WebhookMailer {
    fn send_reminder(&self, reminder: &Reminder) -> Result<(), MailError> {
        let mut request = self
            .client()?
            .post(&self.url)
            .json(&WebhookPayload::new(&self.from, reminder));
        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }

        let response = request
            .send()
            .map_err(|e| MailError::Transport(e.to_string()))?;
        let status = response.status();
        if status.is_success() {
            return Ok(());
        }
        let detail = response.text().unwrap_or_default();
        let detail: String = detail.chars().take(200).collect();
        Err(MailError::Rejected(format!("HTTP {}: {}", status, detail)))
    }
}

// =============================================================================
// LOG MAILER
// =============================================================================

/// Logs reminders instead of sending them.
#[derive(Debug, Clone, Default)]
pub struct LogMailer;

impl ReminderMailer for LogMailer {
    fn send_reminder(&self, reminder: &Reminder) -> Result<(), MailError> {
        tracing::info!(
            event = "reminder_logged",
            to = %reminder.to,
            invoice_id = reminder.invoice_id.0,
            stage = %reminder.stage,
            subject = %reminder.subject(),
            "No mail webhook configured, reminder logged only"
        );
        Ok(())
    }
}

// =============================================================================
// CONSTRUCTION
// =============================================================================

/// Pick the mailer for a configuration.
#[must_use]
pub fn build_mailer(config: &MailConfig) -> SharedMailer {
    match config.webhook_url.as_deref().filter(|u| !u.is_empty()) {
        Some(url) => {
            tracing::info!(url = %url, "Reminders delivered through mail webhook");
            Arc::new(
                WebhookMailer::new(url, &config.from, Duration::from_secs(config.timeout_secs))
                    .with_token(config.token.clone()),
            )
        }
        None => {
            tracing::warn!("DUNNING_MAIL_WEBHOOK not set, reminders will only be logged");
            Arc::new(LogMailer)
        }
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use dunning_core::{Client, ClientId, InvoiceId, Money, ReminderStage};

    fn reminder() -> Reminder {
        let client = Client::new(ClientId(3), "Globex", "ap@globex.test");
        Reminder::for_client(
            &client,
            InvoiceId(41),
            ReminderStage::FinalNoticeAndSuspension,
            10,
            Money::from_cents(99_900),
        )
        .expect("reminder")
    }

    #[test]
    fn payload_carries_rendered_text() {
        let reminder = reminder();
        let payload = WebhookPayload::new("billing@acme.test", &reminder);
        let json = serde_json::to_value(&payload).expect("serialize");

        assert_eq!(json["to"], "ap@globex.test");
        assert_eq!(json["template"], "invoice_final_notice");
        assert_eq!(json["variables"]["stage"], "final_notice_and_suspension");
        assert!(json["subject"].as_str().is_some_and(|s| s.contains("#41")));
    }

    #[test]
    fn debug_redacts_token() {
        let mailer = WebhookMailer::new("https://mail.test", "a@b.test", Duration::from_secs(1))
            .with_token(Some("s3cret".into()));
        let debug = format!("{:?}", mailer);
        assert!(!debug.contains("s3cret"));
        assert!(debug.contains("<redacted>"));
    }

    #[test]
    fn log_mailer_always_succeeds() {
        assert!(LogMailer.send_reminder(&reminder()).is_ok());
    }

    #[test]
    fn unreachable_webhook_is_a_transport_error() {
        let mailer =
            WebhookMailer::new("http://127.0.0.1:9/send", "a@b.test", Duration::from_millis(200));
        let result = mailer.send_reminder(&reminder());
        assert!(matches!(result, Err(MailError::Transport(_))));
    }

    #[test]
    fn build_without_webhook_logs() {
        let mailer = build_mailer(&MailConfig::default());
        assert!(mailer.send_reminder(&reminder()).is_ok());
    }
}
