//! # Ledger Summary
//!
//! Aggregate counts for status pages and metrics.

use crate::overdue::days_overdue;
use crate::store::LedgerStore;
use crate::system::ReminderStage;
use crate::{DunningError, Money};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Outstanding invoices per reminder stage.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageCounts {
    pub none: usize,
    pub first_reminder: usize,
    pub suspension_warning: usize,
    pub final_notice_and_suspension: usize,
}

impl StageCounts {
    fn bump(&mut self, stage: ReminderStage) {
        let slot = match stage {
            ReminderStage::None => &mut self.none,
            ReminderStage::FirstReminder => &mut self.first_reminder,
            ReminderStage::SuspensionWarning => &mut self.suspension_warning,
            ReminderStage::FinalNoticeAndSuspension => &mut self.final_notice_and_suspension,
        };
        *slot = slot.saturating_add(1);
    }

    /// Count for a given stage.
    #[must_use]
    pub fn get(&self, stage: ReminderStage) -> usize {
        match stage {
            ReminderStage::None => self.none,
            ReminderStage::FirstReminder => self.first_reminder,
            ReminderStage::SuspensionWarning => self.suspension_warning,
            ReminderStage::FinalNoticeAndSuspension => self.final_notice_and_suspension,
        }
    }
}

/// Snapshot of the ledger at an instant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerSummary {
    pub client_count: usize,
    pub suspended_clients: usize,
    pub outstanding_invoices: usize,
    /// Outstanding invoices without a due date; skipped by every pass.
    pub invalid_invoices: usize,
    pub outstanding_amount: Money,
    pub stages: StageCounts,
    pub last_run_at: Option<DateTime<Utc>>,
}

impl LedgerSummary {
    /// Compute the summary from a store.
    pub fn collect<S: LedgerStore + ?Sized>(
        store: &S,
        now: DateTime<Utc>,
    ) -> Result<Self, DunningError> {
        let clients = store.clients()?;
        let suspended_clients = clients.iter().filter(|c| c.suspended).count();

        let mut stages = StageCounts::default();
        let mut invalid_invoices = 0usize;
        let mut outstanding_amount = Money::default();
        let outstanding = store.outstanding_invoices()?;
        for invoice in &outstanding {
            outstanding_amount = outstanding_amount.saturating_add(invoice.total_amount);
            match invoice.due_date {
                Some(due) => stages.bump(ReminderStage::from_days_overdue(days_overdue(due, now))),
                None => invalid_invoices += 1,
            }
        }

        Ok(Self {
            client_count: clients.len(),
            suspended_clients,
            outstanding_invoices: outstanding.len(),
            invalid_invoices,
            outstanding_amount,
            stages,
            last_run_at: store.last_run_at()?,
        })
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryLedger;
    use crate::{Client, ClientId, Invoice, InvoiceId};
    use chrono::{Duration, TimeZone};

    #[test]
    fn summary_buckets_by_stage() {
        let now = Utc
            .with_ymd_and_hms(2026, 10, 1, 0, 0, 0)
            .single()
            .expect("valid timestamp");
        let mut store = MemoryLedger::new();
        store
            .upsert_client(Client::new(ClientId(1), "Acme", "ap@acme.test"))
            .expect("client");
        store
            .suspend_client(ClientId(1), now, "overdue")
            .expect("suspend");

        for (id, days) in [(1u64, 1i64), (2, 4), (3, 5), (4, 12)] {
            store
                .upsert_invoice(Invoice::open(
                    InvoiceId(id),
                    ClientId(1),
                    now - Duration::days(days),
                    Money::from_cents(1_000),
                ))
                .expect("invoice");
        }
        let mut broken = Invoice::open(InvoiceId(5), ClientId(1), now, Money::from_cents(1));
        broken.due_date = None;
        store.upsert_invoice(broken).expect("invoice");

        let summary = LedgerSummary::collect(&store, now).expect("summary");
        assert_eq!(summary.client_count, 1);
        assert_eq!(summary.suspended_clients, 1);
        assert_eq!(summary.outstanding_invoices, 5);
        assert_eq!(summary.invalid_invoices, 1);
        assert_eq!(summary.outstanding_amount, Money::from_cents(4_001));
        assert_eq!(summary.stages.get(ReminderStage::None), 1);
        assert_eq!(summary.stages.get(ReminderStage::FirstReminder), 2);
        assert_eq!(summary.stages.get(ReminderStage::SuspensionWarning), 0);
        assert_eq!(summary.stages.get(ReminderStage::FinalNoticeAndSuspension), 1);
        assert!(summary.last_run_at.is_none());
    }
}
