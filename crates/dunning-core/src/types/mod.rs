//! # Core Type Definitions
//!
//! This module contains the records the escalation engine reads and writes:
//! - Identifiers (`ClientId`, `InvoiceId`)
//! - Money in integer minor units (`Money`)
//! - Ledger records (`Client`, `Invoice`, `InvoiceStatus`, `NotificationMark`)
//! - Error types (`DunningError`)
//!
//! ## Conventions
//!
//! - Amounts are integer cents; no floating-point anywhere in the ledger
//! - Identifiers implement `Ord` so every collection can be a `BTreeMap`
//! - Timestamps are `DateTime<Utc>`; the engine never reads the clock itself

use crate::system::ReminderStage;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

// =============================================================================
// IDENTIFIERS
// =============================================================================

/// Unique identifier for a client account.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ClientId(pub u64);

/// Unique identifier for an invoice.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct InvoiceId(pub u64);

impl std::fmt::Display for ClientId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::fmt::Display for InvoiceId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

// =============================================================================
// MONEY
// =============================================================================

/// An amount in minor currency units (cents).
/// Uses saturating arithmetic so ledger totals never overflow.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
pub struct Money(pub i64);

impl Money {
    /// Create an amount from cents.
    #[must_use]
    pub const fn from_cents(cents: i64) -> Self {
        Self(cents)
    }

    /// Get the raw amount in cents.
    #[must_use]
    pub const fn cents(self) -> i64 {
        self.0
    }

    /// Add two amounts with saturating arithmetic.
    #[must_use]
    pub const fn saturating_add(self, other: Money) -> Self {
        Self(self.0.saturating_add(other.0))
    }
}

impl std::fmt::Display for Money {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let sign = if self.0 < 0 { "-" } else { "" };
        let abs = self.0.unsigned_abs();
        write!(f, "{}{}.{:02}", sign, abs / 100, abs % 100)
    }
}

// =============================================================================
// CLIENT
// =============================================================================

/// A client account as seen by the escalation engine.
///
/// The suspension fields are mutated only by the engine (auto-suspension)
/// or by an explicit admin action.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Client {
    pub id: ClientId,
    pub name: String,
    /// Reminder recipient.
    pub email: String,
    #[serde(default)]
    pub suspended: bool,
    #[serde(default)]
    pub suspended_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub suspension_reason: Option<String>,
}

impl Client {
    /// Create an active (not suspended) client.
    #[must_use]
    pub fn new(id: ClientId, name: impl Into<String>, email: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            email: email.into(),
            suspended: false,
            suspended_at: None,
            suspension_reason: None,
        }
    }

    /// Mark the client suspended. Returns `false` if it already was.
    ///
    /// The first suspension wins: `suspended_at` and the reason are never
    /// overwritten by a repeated call.
    pub fn suspend(&mut self, at: DateTime<Utc>, reason: impl Into<String>) -> bool {
        if self.suspended {
            return false;
        }
        self.suspended = true;
        self.suspended_at = Some(at);
        self.suspension_reason = Some(reason.into());
        true
    }

    /// Clear the suspension. Returns `false` if the client was not suspended.
    pub fn lift_suspension(&mut self) -> bool {
        if !self.suspended {
            return false;
        }
        self.suspended = false;
        self.suspended_at = None;
        self.suspension_reason = None;
        true
    }
}

// =============================================================================
// INVOICE
// =============================================================================

/// Payment status of an invoice.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InvoiceStatus {
    /// Issued and awaiting payment.
    Open,
    /// Fully paid. Terminal and immutable.
    Paid,
    /// Cancelled by an administrator. Never escalated.
    Void,
}

impl InvoiceStatus {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            InvoiceStatus::Open => "open",
            InvoiceStatus::Paid => "paid",
            InvoiceStatus::Void => "void",
        }
    }
}

/// An invoice issued to a client when a billing period closes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Invoice {
    pub id: InvoiceId,
    pub client_id: ClientId,
    /// Due date. `None` only for malformed upstream records; the engine skips those.
    #[serde(default)]
    pub due_date: Option<DateTime<Utc>>,
    pub total_amount: Money,
    pub status: InvoiceStatus,
    #[serde(default)]
    pub paid_at: Option<DateTime<Utc>>,
}

impl Invoice {
    /// Create an open invoice.
    #[must_use]
    pub fn open(
        id: InvoiceId,
        client_id: ClientId,
        due_date: DateTime<Utc>,
        total_amount: Money,
    ) -> Self {
        Self {
            id,
            client_id,
            due_date: Some(due_date),
            total_amount,
            status: InvoiceStatus::Open,
            paid_at: None,
        }
    }

    /// Whether the invoice still counts towards escalation.
    #[must_use]
    pub fn is_outstanding(&self) -> bool {
        self.status == InvoiceStatus::Open
    }

    /// Apply a payment event.
    ///
    /// # Errors
    ///
    /// - `InvoiceAlreadyPaid` if the invoice is already paid
    /// - `InvalidRecord` if the invoice was voided
    pub fn mark_paid(&mut self, at: DateTime<Utc>) -> Result<(), DunningError> {
        match self.status {
            InvoiceStatus::Paid => Err(DunningError::InvoiceAlreadyPaid(self.id)),
            InvoiceStatus::Void => Err(DunningError::InvalidRecord(format!(
                "invoice {} is void and cannot be paid",
                self.id
            ))),
            InvoiceStatus::Open => {
                self.status = InvoiceStatus::Paid;
                self.paid_at = Some(at);
                Ok(())
            }
        }
    }
}

// =============================================================================
// NOTIFICATION MARK
// =============================================================================

/// The highest reminder stage already delivered for an invoice.
///
/// Persisted so that repeated runs never send the same stage twice.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationMark {
    pub invoice_id: InvoiceId,
    pub stage: ReminderStage,
    pub notified_at: DateTime<Utc>,
}

// =============================================================================
// ERROR TYPES
// =============================================================================

/// Errors that can occur in the Dunning system.
///
/// - No silent failures
/// - Use `Result<T, DunningError>` for fallible operations
/// - The engine never panics; a failing record never aborts a batch
#[derive(Debug, Error)]
pub enum DunningError {
    /// A record is malformed and cannot be processed.
    #[error("Invalid record: {0}")]
    InvalidRecord(String),

    /// The requested client does not exist.
    #[error("Client not found: {0}")]
    ClientNotFound(ClientId),

    /// The requested invoice does not exist.
    #[error("Invoice not found: {0}")]
    InvoiceNotFound(InvoiceId),

    /// Paid invoices are immutable.
    #[error("Invoice {0} is already paid")]
    InvoiceAlreadyPaid(InvoiceId),

    /// A serialization error occurred.
    #[error("Serialization error: {0}")]
    SerializationError(String),

    /// A deserialization error occurred.
    #[error("Deserialization error: {0}")]
    DeserializationError(String),

    /// A storage or I/O error occurred.
    #[error("I/O error: {0}")]
    IoError(String),

    /// Configuration could not be loaded.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

// =============================================================================
// TESTS
// =============================================================================
