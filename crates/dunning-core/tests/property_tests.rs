//! # Property-Based Tests
//!
//! Invariants of the overdue clock, the stage ladder and the access resolver.

use chrono::{DateTime, Duration, TimeZone, Utc};
use dunning_core::primitives::{FINAL_NOTICE_DAYS, FIRST_REMINDER_DAYS, SUSPENSION_WARNING_DAYS};
use dunning_core::{
    AccessLevel, Client, ClientId, EscalationEngine, Invoice, InvoiceId, LedgerStore, MailError,
    MemoryLedger, Money, Reminder, ReminderMailer, ReminderStage, days_overdue,
    resolve_access_level,
};
use proptest::prelude::*;

fn epoch() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0)
        .single()
        .expect("valid timestamp")
}

struct NullMailer;

impl ReminderMailer for NullMailer {
    fn send_reminder(&self, _reminder: &Reminder) -> Result<(), MailError> {
        Ok(())
    }
}

// =============================================================================
// PROPERTY TESTS
// =============================================================================

proptest! {
    /// A due date never counts as overdue on its own instant.
    #[test]
    fn due_date_is_zero_days_overdue(offset_ms in 0i64..10_000_000_000) {
        let due = epoch() + Duration::milliseconds(offset_ms);
        prop_assert_eq!(days_overdue(due, due), 0);
    }

    /// Days overdue never decreases as the clock moves forward.
    #[test]
    fn days_overdue_is_monotonic(
        a in 0i64..5_000_000_000,
        b in 0i64..5_000_000_000,
    ) {
        let (early, late) = if a <= b { (a, b) } else { (b, a) };
        let due = epoch();
        let d1 = days_overdue(due, due + Duration::milliseconds(early));
        let d2 = days_overdue(due, due + Duration::milliseconds(late));
        prop_assert!(d1 <= d2);
    }

    /// Any instant before the due date is zero days overdue.
    #[test]
    fn before_due_is_not_overdue(ms_before in 1i64..5_000_000_000) {
        let due = epoch();
        prop_assert_eq!(days_overdue(due, due - Duration::milliseconds(ms_before)), 0);
    }

    /// The stage is a step function of days overdue.
    #[test]
    fn stage_is_a_step_function(days in 0u32..1_000) {
        let expected = if days >= FINAL_NOTICE_DAYS {
            ReminderStage::FinalNoticeAndSuspension
        } else if days >= SUSPENSION_WARNING_DAYS {
            ReminderStage::SuspensionWarning
        } else if days >= FIRST_REMINDER_DAYS {
            ReminderStage::FirstReminder
        } else {
            ReminderStage::None
        };
        prop_assert_eq!(ReminderStage::from_days_overdue(days), expected);
    }

    /// Stages only ever move up as an invoice ages.
    #[test]
    fn stage_is_monotonic(a in 0u32..100, b in 0u32..100) {
        let (low, high) = if a <= b { (a, b) } else { (b, a) };
        prop_assert!(
            ReminderStage::from_days_overdue(low) <= ReminderStage::from_days_overdue(high)
        );
    }

    /// Blocked if and only if suspended, whatever the invoices look like.
    #[test]
    fn blocked_iff_suspended(
        suspended in any::<bool>(),
        ages in proptest::collection::vec(0i64..60, 0..8),
    ) {
        let now = epoch();
        let mut client = Client::new(ClientId(1), "Acme", "ap@acme.test");
        if suspended {
            client.suspend(now, "manual");
        }
        let invoices: Vec<Invoice> = ages
            .iter()
            .enumerate()
            .map(|(i, &age)| {
                Invoice::open(
                    InvoiceId(i as u64),
                    ClientId(1),
                    now - Duration::days(age),
                    Money::from_cents(100),
                )
            })
            .collect();

        let level = resolve_access_level(&client, &invoices, now);
        prop_assert_eq!(level == AccessLevel::Blocked, suspended);
    }

    /// Running a pass twice at the same instant changes nothing the second time.
    #[test]
    fn second_pass_is_a_no_op(age in 0i64..30) {
        let now = epoch();
        let mut store = MemoryLedger::new();
        store
            .upsert_client(Client::new(ClientId(1), "Acme", "ap@acme.test"))
            .expect("client");
        store
            .upsert_invoice(Invoice::open(
                InvoiceId(1),
                ClientId(1),
                now - Duration::days(age),
                Money::from_cents(100),
            ))
            .expect("invoice");
        let engine = EscalationEngine::new(NullMailer);

        engine.run(&mut store, now).expect("first");
        let snapshot = store.clone();
        let second = engine.run(&mut store, now).expect("second");

        prop_assert_eq!(second.reminders_sent(), 0);
        prop_assert_eq!(second.suspensions(), 0);
        prop_assert_eq!(
            store.client(ClientId(1)).expect("get"),
            snapshot.client(ClientId(1)).expect("get")
        );
    }
}
