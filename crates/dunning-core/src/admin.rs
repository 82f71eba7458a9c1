//! # Admin & Payment Actions
//!
//! The state transitions that happen outside the escalation engine: lifting a
//! suspension, applying a payment event, and seeding the ledger from an
//! import file.

use crate::primitives::MAX_IMPORT_RECORDS;
use crate::store::LedgerStore;
use crate::{Client, ClientId, DunningError, Invoice, InvoiceId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Lift a client's suspension (SUSPENDED -> ACTIVE).
///
/// Notification marks are kept: if the invoice is still unpaid and past the
/// final threshold, the next pass suspends again without re-sending the final
/// notice.
///
/// Returns `Ok(false)` if the client was not suspended.
pub fn lift_suspension<S: LedgerStore + ?Sized>(
    store: &mut S,
    client_id: ClientId,
) -> Result<bool, DunningError> {
    let lifted = store.unsuspend_client(client_id)?;
    if lifted {
        tracing::info!(
            event = "suspension_lifted",
            client_id = client_id.0,
            "Suspension lifted by administrator"
        );
    }
    Ok(lifted)
}

/// Apply a payment event to an invoice and return the updated record.
///
/// # Errors
///
/// - `InvoiceNotFound` for an unknown id
/// - `InvoiceAlreadyPaid` if it was already paid
/// - `InvalidRecord` if it was voided
pub fn record_payment<S: LedgerStore + ?Sized>(
    store: &mut S,
    invoice_id: InvoiceId,
    paid_at: DateTime<Utc>,
) -> Result<Invoice, DunningError> {
    let mut invoice = store
        .invoice(invoice_id)?
        .ok_or(DunningError::InvoiceNotFound(invoice_id))?;
    invoice.mark_paid(paid_at)?;
    store.upsert_invoice(invoice.clone())?;
    tracing::info!(
        event = "invoice_paid",
        invoice_id = invoice_id.0,
        client_id = invoice.client_id.0,
        "Payment recorded"
    );
    Ok(invoice)
}

// =============================================================================
// IMPORT
// =============================================================================

/// A batch of records to seed or update the ledger with.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerImport {
    #[serde(default)]
    pub clients: Vec<Client>,
    #[serde(default)]
    pub invoices: Vec<Invoice>,
}

/// Counts from an import.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImportSummary {
    pub clients: usize,
    pub invoices: usize,
}

/// Upsert clients, then invoices.
///
/// # Errors
///
/// - `InvalidRecord` if the import exceeds `MAX_IMPORT_RECORDS`
/// - `InvoiceAlreadyPaid` if an invoice would overwrite a paid one
///
/// Records written before the failing one stay written.
pub fn import<S: LedgerStore + ?Sized>(
    store: &mut S,
    batch: LedgerImport,
) -> Result<ImportSummary, DunningError> {
    let total = batch.clients.len().saturating_add(batch.invoices.len());
    if total > MAX_IMPORT_RECORDS {
        return Err(DunningError::InvalidRecord(format!(
            "import of {} records exceeds maximum {}",
            total, MAX_IMPORT_RECORDS
        )));
    }

    let mut summary = ImportSummary::default();
    for client in batch.clients {
        store.upsert_client(client)?;
        summary.clients += 1;
    }
    for invoice in batch.invoices {
        store.upsert_invoice(invoice)?;
        summary.invoices += 1;
    }
    Ok(summary)
}

// =============================================================================
// TESTS
// =============================================================================
