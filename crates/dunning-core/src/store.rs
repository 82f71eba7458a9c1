//! # Ledger Store
//!
//! The persistence seam of the escalation engine.
//!
//! `LedgerStore` is everything the engine, the access resolver and the admin
//! actions need from a database. `MemoryLedger` is the reference
//! implementation; `RedbLedger` (in `storage`) is the durable one.

use crate::system::ReminderStage;
use crate::{Client, ClientId, DunningError, Invoice, InvoiceId, InvoiceStatus, NotificationMark};
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;

// =============================================================================
// LEDGERSTORE TRAIT
// =============================================================================

/// The LedgerStore trait defines the records the engine reads and writes.
///
/// All operations return `Result<T, DunningError>` so in-memory and
/// persistent backends are interchangeable. Every read returns owned data
/// freshly loaded from the backend.
pub trait LedgerStore {
    /// Look up a client by id.
    fn client(&self, id: ClientId) -> Result<Option<Client>, DunningError>;

    /// All clients, ordered by id.
    fn clients(&self) -> Result<Vec<Client>, DunningError>;

    /// Insert or replace a client record.
    fn upsert_client(&mut self, client: Client) -> Result<(), DunningError>;

    /// Look up an invoice by id.
    fn invoice(&self, id: InvoiceId) -> Result<Option<Invoice>, DunningError>;

    /// Insert or replace an invoice record.
    ///
    /// Replacing a paid invoice fails with `InvoiceAlreadyPaid`.
    fn upsert_invoice(&mut self, invoice: Invoice) -> Result<(), DunningError>;

    /// All invoices of one client, ordered by id.
    fn invoices_for_client(&self, client: ClientId) -> Result<Vec<Invoice>, DunningError>;

    /// All open invoices, ordered by id.
    fn outstanding_invoices(&self) -> Result<Vec<Invoice>, DunningError>;

    /// Highest stage already notified for an invoice.
    fn notification_mark(
        &self,
        invoice: InvoiceId,
    ) -> Result<Option<NotificationMark>, DunningError>;

    /// Persist a notification mark. A lower stage never replaces a higher one.
    fn record_notification(&mut self, mark: NotificationMark) -> Result<(), DunningError>;

    /// Check-then-set suspension.
    ///
    /// Returns `Ok(true)` if the client was suspended by this call and
    /// `Ok(false)` if it was already suspended (nothing written).
    fn suspend_client(
        &mut self,
        id: ClientId,
        at: DateTime<Utc>,
        reason: &str,
    ) -> Result<bool, DunningError>;

    /// Clear a suspension. Returns `Ok(false)` if the client was not suspended.
    fn unsuspend_client(&mut self, id: ClientId) -> Result<bool, DunningError>;

    /// Timestamp of the last completed escalation pass.
    fn last_run_at(&self) -> Result<Option<DateTime<Utc>>, DunningError>;

    /// Record the completion of an escalation pass.
    fn record_run(&mut self, at: DateTime<Utc>) -> Result<(), DunningError>;
}

/// Reject an upsert that would modify a paid invoice.
pub(crate) fn guard_paid_invoice(
    existing: Option<&Invoice>,
    replacement: &Invoice,
) -> Result<(), DunningError> {
    match existing {
        Some(current) if current.status == InvoiceStatus::Paid && current != replacement => {
            Err(DunningError::InvoiceAlreadyPaid(current.id))
        }
        _ => Ok(()),
    }
}

/// Keep the higher of an existing mark and a new one.
pub(crate) fn merge_mark(
    existing: Option<NotificationMark>,
    incoming: NotificationMark,
) -> NotificationMark {
    match existing {
        Some(current) if current.stage >= incoming.stage => current,
        _ => incoming,
    }
}

// =============================================================================
// IN-MEMORY LEDGER
// =============================================================================

/// In-memory ledger backed by `BTreeMap`s. Volatile; used by tests, the
/// `memory` backend and as a reference for the durable store.
#[derive(Debug, Clone, Default)]
pub struct MemoryLedger {
    clients: BTreeMap<ClientId, Client>,
    invoices: BTreeMap<InvoiceId, Invoice>,
    marks: BTreeMap<InvoiceId, NotificationMark>,
    last_run_at: Option<DateTime<Utc>>,
}

impl MemoryLedger {
    /// Create an empty ledger.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Highest stage notified for the invoice, if any (infallible shortcut).
    #[must_use]
    pub fn notified_stage(&self, invoice: InvoiceId) -> Option<ReminderStage> {
        self.marks.get(&invoice).map(|m| m.stage)
    }
}

impl LedgerStore for MemoryLedger {
    fn client(&self, id: ClientId) -> Result<Option<Client>, DunningError> {
        Ok(self.clients.get(&id).cloned())
    }

    fn clients(&self) -> Result<Vec<Client>, DunningError> {
        Ok(self.clients.values().cloned().collect())
    }

    fn upsert_client(&mut self, client: Client) -> Result<(), DunningError> {
        self.clients.insert(client.id, client);
        Ok(())
    }

    fn invoice(&self, id: InvoiceId) -> Result<Option<Invoice>, DunningError> {
        Ok(self.invoices.get(&id).cloned())
    }

    fn upsert_invoice(&mut self, invoice: Invoice) -> Result<(), DunningError> {
        guard_paid_invoice(self.invoices.get(&invoice.id), &invoice)?;
        self.invoices.insert(invoice.id, invoice);
        Ok(())
    }

    fn invoices_for_client(&self, client: ClientId) -> Result<Vec<Invoice>, DunningError> {
        Ok(self
            .invoices
            .values()
            .filter(|i| i.client_id == client)
            .cloned()
            .collect())
    }

    fn outstanding_invoices(&self) -> Result<Vec<Invoice>, DunningError> {
        Ok(self
            .invoices
            .values()
            .filter(|i| i.is_outstanding())
            .cloned()
            .collect())
    }

    fn notification_mark(
        &self,
        invoice: InvoiceId,
    ) -> Result<Option<NotificationMark>, DunningError> {
        Ok(self.marks.get(&invoice).cloned())
    }

    fn record_notification(&mut self, mark: NotificationMark) -> Result<(), DunningError> {
        let merged = merge_mark(self.marks.remove(&mark.invoice_id), mark);
        self.marks.insert(merged.invoice_id, merged);
        Ok(())
    }

    fn suspend_client(
        &mut self,
        id: ClientId,
        at: DateTime<Utc>,
        reason: &str,
    ) -> Result<bool, DunningError> {
        let client = self
            .clients
            .get_mut(&id)
            .ok_or(DunningError::ClientNotFound(id))?;
        Ok(client.suspend(at, reason))
    }

    fn unsuspend_client(&mut self, id: ClientId) -> Result<bool, DunningError> {
        let client = self
            .clients
            .get_mut(&id)
            .ok_or(DunningError::ClientNotFound(id))?;
        Ok(client.lift_suspension())
    }

    fn last_run_at(&self) -> Result<Option<DateTime<Utc>>, DunningError> {
        Ok(self.last_run_at)
    }

    fn record_run(&mut self, at: DateTime<Utc>) -> Result<(), DunningError> {
        self.last_run_at = Some(at);
        Ok(())
    }
}

// =============================================================================
// TESTS
// =============================================================================
