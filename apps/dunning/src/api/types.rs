//! # API Request/Response Types
//!
//! JSON structures for the HTTP API.

use chrono::{DateTime, Utc};
use dunning_core::{
    BatchReport, Client, EscalationOutcome, EscalationState, FailedRecord, Invoice, LedgerSummary,
    SkippedRecord, StageCounts,
};
use serde::{Deserialize, Serialize};

// =============================================================================
// HEALTH RESPONSE
// =============================================================================

/// Health check response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}

impl Default for HealthResponse {
    fn default() -> Self {
        Self {
            status: "ok".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}

// =============================================================================
// STATUS RESPONSE
// =============================================================================

/// Ledger status response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusResponse {
    pub client_count: usize,
    pub suspended_clients: usize,
    pub outstanding_invoices: usize,
    pub invalid_invoices: usize,
    /// Outstanding amount in cents.
    pub outstanding_cents: i64,
    pub stages: StageCounts,
    pub last_run_at: Option<DateTime<Utc>>,
    pub persistent: bool,
}

impl StatusResponse {
    #[must_use]
    pub fn new(summary: LedgerSummary, persistent: bool) -> Self {
        Self {
            client_count: summary.client_count,
            suspended_clients: summary.suspended_clients,
            outstanding_invoices: summary.outstanding_invoices,
            invalid_invoices: summary.invalid_invoices,
            outstanding_cents: summary.outstanding_amount.cents(),
            stages: summary.stages,
            last_run_at: summary.last_run_at,
            persistent,
        }
    }
}

// =============================================================================
// ESCALATION RUN
// =============================================================================

/// Optional body of `POST /escalations/run`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RunRequest {
    /// Evaluate as of this instant instead of the server clock.
    #[serde(default)]
    pub at: Option<DateTime<Utc>>,
}

/// Result of an escalation pass.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunResponse {
    pub evaluated_at: DateTime<Utc>,
    pub processed: usize,
    pub reminders_sent: usize,
    pub reminders_failed: usize,
    pub suspensions: usize,
    pub deferred: usize,
    pub outcomes: Vec<EscalationOutcome>,
    pub skipped: Vec<SkippedRecord>,
    pub failed: Vec<FailedRecord>,
}

impl From<BatchReport> for RunResponse {
    fn from(report: BatchReport) -> Self {
        Self {
            evaluated_at: report.evaluated_at,
            processed: report.processed(),
            reminders_sent: report.reminders_sent(),
            reminders_failed: report.reminders_failed(),
            suspensions: report.suspensions(),
            deferred: report.deferred,
            outcomes: report.outcomes,
            skipped: report.skipped,
            failed: report.failed,
        }
    }
}

// =============================================================================
// CLIENT & INVOICE
// =============================================================================

/// A client with its invoices.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientResponse {
    pub client: Client,
    pub escalation_state: EscalationState,
    pub invoices: Vec<Invoice>,
}

/// Result of `POST /clients/{id}/unsuspend`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UnsuspendResponse {
    pub client_id: u64,
    /// False if the client was not suspended.
    pub lifted: bool,
}

/// Optional body of `POST /invoices/{id}/payment`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PaymentRequest {
    #[serde(default)]
    pub paid_at: Option<DateTime<Utc>>,
}

// =============================================================================
// ERRORS
// =============================================================================

/// Error body returned with any 4xx/5xx from a handler.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}
