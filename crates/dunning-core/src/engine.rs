//! # Escalation Engine
//!
//! Walks outstanding invoices, sends the reminder each stage calls for, and
//! suspends clients that reach the final stage.
//!
//! ## Guarantees
//!
//! - Each stage is emailed at most once per invoice: a [`NotificationMark`]
//!   is persisted after every successful send and consulted before the next.
//! - A mailer failure never blocks suspension. The mark is not written, so
//!   the next pass retries the email.
//! - Suspension is a check-then-set in the store. An already-suspended client
//!   is left untouched and receives no further email from the engine.
//! - One bad record never aborts a batch: it is reported as skipped or failed
//!   and the pass moves on.

use crate::notify::{Reminder, ReminderMailer};
use crate::overdue::days_overdue;
use crate::primitives::MAX_BATCH_SIZE;
use crate::store::LedgerStore;
use crate::system::{EscalationState, ReminderStage};
use crate::{Client, ClientId, DunningError, Invoice, InvoiceId, NotificationMark};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

// =============================================================================
// OUTCOMES
// =============================================================================

/// What happened to the reminder email for one invoice.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReminderDelivery {
    /// The invoice is below the first threshold, or no longer open.
    NotDue,
    /// This stage (or a later one) was already emailed.
    AlreadyNotified,
    /// Sent now.
    Sent,
    /// The mailer failed; retried on the next pass.
    Failed,
    /// The client is suspended; the engine sends nothing more.
    Suppressed,
}

/// What happened to the client's suspension flag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SuspensionChange {
    Unchanged,
    Suspended,
    AlreadySuspended,
}

/// Result of evaluating one (client, invoice) pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EscalationOutcome {
    pub invoice_id: InvoiceId,
    pub client_id: ClientId,
    pub days_overdue: u32,
    pub stage: ReminderStage,
    pub reminder: ReminderDelivery,
    pub suspension: SuspensionChange,
    /// Mailer error text when `reminder == Failed`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mail_error: Option<String>,
}

/// Why a record was not evaluated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    MissingDueDate,
    MissingClient,
    NotOutstanding,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkippedRecord {
    pub invoice_id: InvoiceId,
    pub reason: SkipReason,
}

/// A record whose evaluation hit a store error. Retried on the next pass.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailedRecord {
    pub invoice_id: InvoiceId,
    pub client_id: ClientId,
    pub error: String,
}

/// Summary of one escalation pass.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchReport {
    pub evaluated_at: DateTime<Utc>,
    pub outcomes: Vec<EscalationOutcome>,
    pub skipped: Vec<SkippedRecord>,
    pub failed: Vec<FailedRecord>,
    /// Candidates beyond `MAX_BATCH_SIZE`, left for the next pass.
    pub deferred: usize,
}

impl BatchReport {
    fn new(evaluated_at: DateTime<Utc>) -> Self {
        Self {
            evaluated_at,
            outcomes: Vec::new(),
            skipped: Vec::new(),
            failed: Vec::new(),
            deferred: 0,
        }
    }

    /// Number of records evaluated without error.
    #[must_use]
    pub fn processed(&self) -> usize {
        self.outcomes.len()
    }

    #[must_use]
    pub fn reminders_sent(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|o| o.reminder == ReminderDelivery::Sent)
            .count()
    }

    #[must_use]
    pub fn reminders_failed(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|o| o.reminder == ReminderDelivery::Failed)
            .count()
    }

    #[must_use]
    pub fn suspensions(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|o| o.suspension == SuspensionChange::Suspended)
            .count()
    }

    /// Ids of the records the next pass must retry.
    #[must_use]
    pub fn retry_ids(&self) -> Vec<InvoiceId> {
        self.failed.iter().map(|f| f.invoice_id).collect()
    }
}

// =============================================================================
// CANDIDATES
// =============================================================================

/// An outstanding invoice paired with its client, as pulled from the store.
/// `client` is `None` when the invoice points at an unknown client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EscalationCandidate {
    pub invoice: Invoice,
    pub client: Option<Client>,
}

/// Pair every outstanding invoice with its client.
pub fn collect_candidates<S: LedgerStore + ?Sized>(
    store: &S,
) -> Result<Vec<EscalationCandidate>, DunningError> {
    let mut clients: BTreeMap<ClientId, Option<Client>> = BTreeMap::new();
    let mut candidates = Vec::new();
    for invoice in store.outstanding_invoices()? {
        let client = match clients.get(&invoice.client_id) {
            Some(cached) => cached.clone(),
            None => {
                let loaded = store.client(invoice.client_id)?;
                clients.insert(invoice.client_id, loaded.clone());
                loaded
            }
        };
        candidates.push(EscalationCandidate { invoice, client });
    }
    Ok(candidates)
}

/// Where a client stands on the escalation ladder.
pub fn escalation_state<S: LedgerStore + ?Sized>(
    store: &S,
    client: &Client,
) -> Result<EscalationState, DunningError> {
    let mut highest = None;
    for invoice in store.invoices_for_client(client.id)? {
        if !invoice.is_outstanding() {
            continue;
        }
        if let Some(mark) = store.notification_mark(invoice.id)? {
            highest = highest.max(Some(mark.stage));
        }
    }
    Ok(EscalationState::derive(client.suspended, highest))
}

/// Reason string stored on an automatic suspension.
#[must_use]
pub fn suspension_reason(invoice: InvoiceId, days: u32) -> String {
    format!(
        "Automatically suspended: invoice {} is {} days overdue",
        invoice, days
    )
}

// =============================================================================
// ENGINE
// =============================================================================

/// The escalation executor. Stateless apart from its mailer; all state lives
/// in the store passed to each call.
#[derive(Debug, Clone)]
pub struct EscalationEngine<M> {
    mailer: M,
}

impl<M: ReminderMailer> EscalationEngine<M> {
    #[must_use]
    pub fn new(mailer: M) -> Self {
        Self { mailer }
    }

    /// Evaluate one (client, invoice) pair at `now` and apply its effects.
    ///
    /// # Errors
    ///
    /// - `InvalidRecord` if the invoice has no due date or belongs to another client
    /// - Any store error while reading or writing the mark or the suspension
    pub fn execute<S: LedgerStore + ?Sized>(
        &self,
        store: &mut S,
        client: &Client,
        invoice: &Invoice,
        now: DateTime<Utc>,
    ) -> Result<EscalationOutcome, DunningError> {
        let due = invoice.due_date.ok_or_else(|| {
            DunningError::InvalidRecord(format!("invoice {} has no due date", invoice.id))
        })?;
        if invoice.client_id != client.id {
            return Err(DunningError::InvalidRecord(format!(
                "invoice {} belongs to client {}, not {}",
                invoice.id, invoice.client_id, client.id
            )));
        }

        let days = days_overdue(due, now);
        let stage = ReminderStage::from_days_overdue(days);
        let mut outcome = EscalationOutcome {
            invoice_id: invoice.id,
            client_id: client.id,
            days_overdue: days,
            stage,
            reminder: ReminderDelivery::NotDue,
            suspension: SuspensionChange::Unchanged,
            mail_error: None,
        };

        if !invoice.is_outstanding() {
            return Ok(outcome);
        }

        if client.suspended {
            if stage.sends_reminder() {
                outcome.reminder = ReminderDelivery::Suppressed;
            }
            outcome.suspension = SuspensionChange::AlreadySuspended;
            tracing::debug!(
                invoice_id = invoice.id.0,
                client_id = client.id.0,
                "Client already suspended, nothing to do"
            );
            return Ok(outcome);
        }

        if stage.sends_reminder() {
            let notified = store.notification_mark(invoice.id)?.map(|m| m.stage);
            if notified.is_some_and(|s| s >= stage) {
                outcome.reminder = ReminderDelivery::AlreadyNotified;
            } else {
                match self.deliver(client, invoice, stage, days) {
                    Ok(()) => {
                        store.record_notification(NotificationMark {
                            invoice_id: invoice.id,
                            stage,
                            notified_at: now,
                        })?;
                        outcome.reminder = ReminderDelivery::Sent;
                        tracing::info!(
                            event = "reminder_sent",
                            invoice_id = invoice.id.0,
                            client_id = client.id.0,
                            stage = %stage,
                            days_overdue = days,
                            "Reminder sent"
                        );
                    }
                    Err(e) => {
                        tracing::warn!(
                            event = "reminder_failed",
                            invoice_id = invoice.id.0,
                            client_id = client.id.0,
                            stage = %stage,
                            error = %e,
                            "Reminder delivery failed, continuing"
                        );
                        outcome.reminder = ReminderDelivery::Failed;
                        outcome.mail_error = Some(e.to_string());
                    }
                }
            }
        }

        if stage.is_terminal() {
            let reason = suspension_reason(invoice.id, days);
            if store.suspend_client(client.id, now, &reason)? {
                outcome.suspension = SuspensionChange::Suspended;
                tracing::info!(
                    event = "client_suspended",
                    invoice_id = invoice.id.0,
                    client_id = client.id.0,
                    days_overdue = days,
                    "Client automatically suspended"
                );
            } else {
                outcome.suspension = SuspensionChange::AlreadySuspended;
            }
        }

        Ok(outcome)
    }

    fn deliver(
        &self,
        client: &Client,
        invoice: &Invoice,
        stage: ReminderStage,
        days: u32,
    ) -> Result<(), crate::notify::MailError> {
        let reminder =
            Reminder::for_client(client, invoice.id, stage, days, invoice.total_amount)?;
        self.mailer.send_reminder(&reminder)
    }

    /// Evaluate a batch of candidates.
    ///
    /// Candidates are processed oldest-due first within each client. The
    /// client record is re-read from the store before each evaluation so a
    /// suspension made earlier in the pass is seen by later invoices.
    pub fn run_batch<S: LedgerStore + ?Sized>(
        &self,
        store: &mut S,
        mut candidates: Vec<EscalationCandidate>,
        now: DateTime<Utc>,
    ) -> BatchReport {
        let mut report = BatchReport::new(now);

        candidates.sort_by(|a, b| {
            (a.invoice.client_id, a.invoice.due_date, a.invoice.id).cmp(&(
                b.invoice.client_id,
                b.invoice.due_date,
                b.invoice.id,
            ))
        });
        if candidates.len() > MAX_BATCH_SIZE {
            report.deferred = candidates.len() - MAX_BATCH_SIZE;
            candidates.truncate(MAX_BATCH_SIZE);
            tracing::warn!(
                deferred = report.deferred,
                "Batch limit reached, remaining invoices deferred to the next run"
            );
        }

        for candidate in candidates {
            let invoice = candidate.invoice;
            let skip = if invoice.due_date.is_none() {
                Some(SkipReason::MissingDueDate)
            } else if candidate.client.is_none() {
                Some(SkipReason::MissingClient)
            } else if !invoice.is_outstanding() {
                Some(SkipReason::NotOutstanding)
            } else {
                None
            };
            let (Some(snapshot), None) = (candidate.client, skip) else {
                let reason = skip.unwrap_or(SkipReason::MissingClient);
                tracing::warn!(
                    invoice_id = invoice.id.0,
                    reason = ?reason,
                    "Skipping invalid escalation record"
                );
                report.skipped.push(SkippedRecord {
                    invoice_id: invoice.id,
                    reason,
                });
                continue;
            };

            let client = match store.client(snapshot.id) {
                Ok(Some(fresh)) => fresh,
                Ok(None) => snapshot,
                Err(e) => {
                    record_failure(&mut report, &invoice, snapshot.id, &e);
                    continue;
                }
            };

            match self.execute(store, &client, &invoice, now) {
                Ok(outcome) => report.outcomes.push(outcome),
                Err(e) => record_failure(&mut report, &invoice, client.id, &e),
            }
        }

        tracing::info!(
            processed = report.processed(),
            reminders_sent = report.reminders_sent(),
            reminders_failed = report.reminders_failed(),
            suspensions = report.suspensions(),
            skipped = report.skipped.len(),
            failed = report.failed.len(),
            "Escalation pass complete"
        );
        report
    }

    /// Run a full pass over the store's outstanding invoices and record it.
    ///
    /// # Errors
    ///
    /// Only if the candidate list itself cannot be loaded. Per-record errors
    /// are reported in the returned `BatchReport`.
    pub fn run<S: LedgerStore + ?Sized>(
        &self,
        store: &mut S,
        now: DateTime<Utc>,
    ) -> Result<BatchReport, DunningError> {
        let candidates = collect_candidates(store)?;
        let report = self.run_batch(store, candidates, now);
        if let Err(e) = store.record_run(now) {
            tracing::error!(
                event = "run_record_failed",
                error = %e,
                "Failed to record escalation run timestamp"
            );
        }
        Ok(report)
    }
}

fn record_failure(
    report: &mut BatchReport,
    invoice: &Invoice,
    client_id: ClientId,
    error: &DunningError,
) {
    tracing::error!(
        event = "escalation_failed",
        invoice_id = invoice.id.0,
        client_id = client_id.0,
        error = %error,
        "Escalation failed for record, will retry next run"
    );
    report.failed.push(FailedRecord {
        invoice_id: invoice.id,
        client_id,
        error: error.to_string(),
    });
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notify::MailError;
    use crate::store::MemoryLedger;
    use crate::Money;
    use chrono::{Duration, TimeZone};
    use std::cell::RefCell;

    #[derive(Default)]
    struct Outbox {
        sent: RefCell<Vec<Reminder>>,
    }

    impl ReminderMailer for Outbox {
        fn send_reminder(&self, reminder: &Reminder) -> Result<(), MailError> {
            self.sent.borrow_mut().push(reminder.clone());
            Ok(())
        }
    }

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 8, 15, 6, 0, 0)
            .single()
            .expect("valid timestamp")
    }

    fn setup(days_ago: i64) -> (MemoryLedger, Client, Invoice) {
        let client = Client::new(ClientId(1), "Acme", "ap@acme.test");
        let invoice = Invoice::open(
            InvoiceId(100),
            ClientId(1),
            now() - Duration::days(days_ago),
            Money::from_cents(12_500),
        );
        let mut store = MemoryLedger::new();
        store.upsert_client(client.clone()).expect("client");
        store.upsert_invoice(invoice.clone()).expect("invoice");
        (store, client, invoice)
    }

    #[test]
    fn below_threshold_does_nothing() {
        let (mut store, client, invoice) = setup(2);
        let outbox = Outbox::default();
        let engine = EscalationEngine::new(&outbox);

        let outcome = engine
            .execute(&mut store, &client, &invoice, now())
            .expect("execute");

        assert_eq!(outcome.stage, ReminderStage::None);
        assert_eq!(outcome.reminder, ReminderDelivery::NotDue);
        assert!(outbox.sent.borrow().is_empty());
        assert!(store.notified_stage(InvoiceId(100)).is_none());
    }

    #[test]
    fn skipped_stages_send_only_the_current_one() {
        let (mut store, client, invoice) = setup(8);
        let outbox = Outbox::default();
        let engine = EscalationEngine::new(&outbox);

        engine
            .execute(&mut store, &client, &invoice, now())
            .expect("execute");

        let sent = outbox.sent.borrow();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].stage, ReminderStage::SuspensionWarning);
    }

    #[test]
    fn each_stage_fires_once_as_time_passes() {
        let (mut store, client, invoice) = setup(0);
        let outbox = Outbox::default();
        let engine = EscalationEngine::new(&outbox);

        for day in 0..=12 {
            let at = now() + Duration::days(day);
            let current = store.client(client.id).expect("get").expect("exists");
            engine
                .execute(&mut store, &current, &invoice, at)
                .expect("execute");
        }

        let stages: Vec<_> = outbox.sent.borrow().iter().map(|r| r.stage).collect();
        assert_eq!(
            stages,
            vec![
                ReminderStage::FirstReminder,
                ReminderStage::SuspensionWarning,
                ReminderStage::FinalNoticeAndSuspension,
            ]
        );
        let client = store.client(client.id).expect("get").expect("exists");
        assert!(client.suspended);
        assert_eq!(client.suspended_at, Some(now() + Duration::days(10)));
    }

    #[test]
    fn foreign_invoice_is_rejected() {
        let (mut store, _, invoice) = setup(5);
        let stranger = Client::new(ClientId(2), "Other", "x@other.test");
        let engine = EscalationEngine::new(Outbox::default());

        let result = engine.execute(&mut store, &stranger, &invoice, now());
        assert!(matches!(result, Err(DunningError::InvalidRecord(_))));
    }

    #[test]
    fn state_follows_the_ladder() {
        let (mut store, client, _) = setup(8);
        let engine = EscalationEngine::new(Outbox::default());
        assert_eq!(
            escalation_state(&store, &client).expect("state"),
            EscalationState::Active
        );

        engine.run(&mut store, now()).expect("run");
        assert_eq!(
            escalation_state(&store, &client).expect("state"),
            EscalationState::Warned
        );

        engine
            .run(&mut store, now() + Duration::days(2))
            .expect("run");
        let client = store.client(client.id).expect("get").expect("exists");
        assert_eq!(
            escalation_state(&store, &client).expect("state"),
            EscalationState::Suspended
        );
    }

    #[test]
    fn suspension_reason_names_invoice() {
        assert_eq!(
            suspension_reason(InvoiceId(7), 11),
            "Automatically suspended: invoice #7 is 11 days overdue"
        );
    }

    #[test]
    fn run_records_timestamp() {
        let (mut store, _, _) = setup(4);
        let engine = EscalationEngine::new(Outbox::default());

        let report = engine.run(&mut store, now()).expect("run");
        assert_eq!(report.processed(), 1);
        assert_eq!(report.reminders_sent(), 1);
        assert_eq!(store.last_run_at().expect("last run"), Some(now()));
    }

    #[test]
    fn later_invoices_see_suspension_from_earlier_ones() {
        let (mut store, _, _) = setup(12);
        store
            .upsert_invoice(Invoice::open(
                InvoiceId(101),
                ClientId(1),
                now() - Duration::days(4),
                Money::from_cents(100),
            ))
            .expect("invoice");
        let outbox = Outbox::default();
        let engine = EscalationEngine::new(&outbox);

        let report = engine.run(&mut store, now()).expect("run");

        assert_eq!(report.suspensions(), 1);
        assert_eq!(outbox.sent.borrow().len(), 1);
        let second = report
            .outcomes
            .iter()
            .find(|o| o.invoice_id == InvoiceId(101))
            .expect("second invoice evaluated");
        assert_eq!(second.reminder, ReminderDelivery::Suppressed);
    }
}
