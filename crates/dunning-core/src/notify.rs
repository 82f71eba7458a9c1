//! # Reminder Notifications
//!
//! The email seam of the engine. The engine builds a [`Reminder`] and hands it
//! to a [`ReminderMailer`]; delivery belongs to whatever provider sits behind
//! the trait. Subject and body templates live here so every mailer renders
//! the same text.

use crate::system::ReminderStage;
use crate::{Client, InvoiceId, Money};
use serde::{Deserialize, Serialize};
use thiserror::Error;

// =============================================================================
// MAIL ERRORS
// =============================================================================

/// Failure reported by a mailer. Never fatal to an escalation pass.
#[derive(Debug, Error)]
pub enum MailError {
    /// The provider accepted the connection but refused the message.
    #[error("Mail provider rejected the message: {0}")]
    Rejected(String),

    /// The provider could not be reached.
    #[error("Mail transport failure: {0}")]
    Transport(String),

    /// The client has no usable email address.
    #[error("Client has no email address")]
    MissingRecipient,
}

// =============================================================================
// REMINDER
// =============================================================================

/// A reminder email, ready to render.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reminder {
    pub to: String,
    pub client_name: String,
    pub stage: ReminderStage,
    pub invoice_id: InvoiceId,
    pub days_overdue: u32,
    pub amount: Money,
}

impl Reminder {
    /// Build the reminder for `client` at `stage`.
    ///
    /// # Errors
    ///
    /// `MissingRecipient` if the client's email address is blank.
    pub fn for_client(
        client: &Client,
        invoice_id: InvoiceId,
        stage: ReminderStage,
        days_overdue: u32,
        amount: Money,
    ) -> Result<Self, MailError> {
        let to = client.email.trim();
        if to.is_empty() {
            return Err(MailError::MissingRecipient);
        }
        Ok(Self {
            to: to.to_string(),
            client_name: client.name.clone(),
            stage,
            invoice_id,
            days_overdue,
            amount,
        })
    }

    /// Template key, for providers that render server-side.
    #[must_use]
    pub fn template(&self) -> &'static str {
        match self.stage {
            ReminderStage::None => "none",
            ReminderStage::FirstReminder => "invoice_reminder",
            ReminderStage::SuspensionWarning => "invoice_suspension_warning",
            ReminderStage::FinalNoticeAndSuspension => "invoice_final_notice",
        }
    }

    #[must_use]
    pub fn subject(&self) -> String {
        match self.stage {
            ReminderStage::None => format!("Invoice {}", self.invoice_id),
            ReminderStage::FirstReminder => {
                format!("Reminder: invoice {} is overdue", self.invoice_id)
            }
            ReminderStage::SuspensionWarning => format!(
                "Action required: invoice {} is {} days overdue",
                self.invoice_id, self.days_overdue
            ),
            ReminderStage::FinalNoticeAndSuspension => format!(
                "Final notice: account suspended for invoice {}",
                self.invoice_id
            ),
        }
    }

    #[must_use]
    pub fn body(&self) -> String {
        let greeting = format!("Hello {},", self.client_name);
        let summary = format!(
            "Invoice {} for {} is now {} days past due.",
            self.invoice_id, self.amount, self.days_overdue
        );
        let action = match self.stage {
            ReminderStage::None => "No action is needed.",
            ReminderStage::FirstReminder => {
                "Please arrange payment at your earliest convenience. Until it is settled, \
                 your portal access is limited to invoices and payments."
            }
            ReminderStage::SuspensionWarning => {
                "Your account will be suspended if payment is not received within the \
                 next few days."
            }
            ReminderStage::FinalNoticeAndSuspension => {
                "Your account has been suspended. Pay the outstanding balance and contact \
                 us to restore access."
            }
        };
        format!("{greeting}\n\n{summary}\n{action}\n")
    }
}

// =============================================================================
// MAILER TRAIT
// =============================================================================

/// Delivers reminder emails.
///
/// Implementations must not retry internally; the engine treats a failure as
/// "not delivered" and the next scheduled pass tries again.
pub trait ReminderMailer {
    fn send_reminder(&self, reminder: &Reminder) -> Result<(), MailError>;
}

impl<M: ReminderMailer + ?Sized> ReminderMailer for &M {
    fn send_reminder(&self, reminder: &Reminder) -> Result<(), MailError> {
        (**self).send_reminder(reminder)
    }
}

impl<M: ReminderMailer + ?Sized> ReminderMailer for std::sync::Arc<M> {
    fn send_reminder(&self, reminder: &Reminder) -> Result<(), MailError> {
        (**self).send_reminder(reminder)
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ClientId;

    fn reminder(stage: ReminderStage) -> Reminder {
        let client = Client::new(ClientId(1), "Northwind", "ap@northwind.test");
        Reminder::for_client(&client, InvoiceId(12), stage, 8, Money::from_cents(45_000))
            .expect("reminder")
    }

    #[test]
    fn blank_email_is_missing_recipient() {
        let client = Client::new(ClientId(1), "Northwind", "   ");
        let result = Reminder::for_client(
            &client,
            InvoiceId(1),
            ReminderStage::FirstReminder,
            3,
            Money::default(),
        );
        assert!(matches!(result, Err(MailError::MissingRecipient)));
    }

    #[test]
    fn templates_differ_per_stage() {
        let first = reminder(ReminderStage::FirstReminder);
        let warning = reminder(ReminderStage::SuspensionWarning);
        let last = reminder(ReminderStage::FinalNoticeAndSuspension);

        assert_ne!(first.template(), warning.template());
        assert_ne!(warning.template(), last.template());
        assert!(last.subject().starts_with("Final notice"));
        assert!(warning.subject().contains("8 days overdue"));
    }

    #[test]
    fn body_mentions_amount_and_name() {
        let body = reminder(ReminderStage::SuspensionWarning).body();
        assert!(body.starts_with("Hello Northwind,"));
        assert!(body.contains("450.00"));
        assert!(body.contains("#12"));
    }
}
