//! # Access Level Resolver
//!
//! Decides what a client may do in the portal, from the suspension flag and
//! the overdue state of its outstanding invoices.
//!
//! | Condition | Access |
//! |-----------|--------|
//! | `suspended` | `blocked` |
//! | any outstanding invoice ≥ 3 days overdue | `invoice_only` |
//! | otherwise | `full` |
//!
//! Three days overdue restricts the portal to invoices and payments. There is
//! no banner-only tier: a client either has full access or is restricted.

use crate::overdue::days_overdue;
use crate::primitives::FIRST_REMINDER_DAYS;
use crate::store::LedgerStore;
use crate::{Client, ClientId, DunningError, Invoice};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Client-facing permission tier. `Blocked` if and only if the client is
/// suspended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccessLevel {
    Full,
    InvoiceOnly,
    Blocked,
}

impl AccessLevel {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            AccessLevel::Full => "full",
            AccessLevel::InvoiceOnly => "invoice_only",
            AccessLevel::Blocked => "blocked",
        }
    }
}

impl std::fmt::Display for AccessLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What the frontend needs to render banners and blocks.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessReport {
    pub access_level: AccessLevel,
    pub restriction_message: Option<String>,
    pub has_overdue_invoices: bool,
    /// Days overdue of the oldest outstanding invoice (0 if none).
    pub overdue_days: u32,
}

impl AccessReport {
    /// The unrestricted report, also used when the check itself fails.
    #[must_use]
    pub fn full() -> Self {
        Self {
            access_level: AccessLevel::Full,
            restriction_message: None,
            has_overdue_invoices: false,
            overdue_days: 0,
        }
    }
}

/// Largest `days_overdue` among outstanding invoices with a due date.
#[must_use]
pub fn max_days_overdue(invoices: &[Invoice], now: DateTime<Utc>) -> u32 {
    invoices
        .iter()
        .filter(|i| i.is_outstanding())
        .filter_map(|i| i.due_date)
        .map(|due| days_overdue(due, now))
        .max()
        .unwrap_or(0)
}

/// Resolve the access level for a client given its invoices.
#[must_use]
pub fn resolve_access_level(
    client: &Client,
    invoices: &[Invoice],
    now: DateTime<Utc>,
) -> AccessLevel {
    if client.suspended {
        AccessLevel::Blocked
    } else if max_days_overdue(invoices, now) >= FIRST_REMINDER_DAYS {
        AccessLevel::InvoiceOnly
    } else {
        AccessLevel::Full
    }
}

/// Build the full access report for a client.
#[must_use]
pub fn access_report(client: &Client, invoices: &[Invoice], now: DateTime<Utc>) -> AccessReport {
    let overdue_days = max_days_overdue(invoices, now);
    let access_level = resolve_access_level(client, invoices, now);

    let restriction_message = match access_level {
        AccessLevel::Full => None,
        AccessLevel::InvoiceOnly => Some(format!(
            "Your account has an invoice {} days overdue. Access is limited to invoices \
             and payments until it is paid.",
            overdue_days
        )),
        AccessLevel::Blocked => Some(
            client
                .suspension_reason
                .clone()
                .unwrap_or_else(|| "Your account is suspended. Please contact billing.".into()),
        ),
    };

    AccessReport {
        access_level,
        restriction_message,
        has_overdue_invoices: overdue_days > 0,
        overdue_days,
    }
}

/// Load a client and its invoices from the store and build its report.
///
/// # Errors
///
/// `ClientNotFound` for an unknown id, or any store error. Callers facing
/// end users should fail open with [`AccessReport::full`].
pub fn check_access<S: LedgerStore + ?Sized>(
    store: &S,
    client_id: ClientId,
    now: DateTime<Utc>,
) -> Result<AccessReport, DunningError> {
    let client = store
        .client(client_id)?
        .ok_or(DunningError::ClientNotFound(client_id))?;
    let invoices = store.invoices_for_client(client_id)?;
    Ok(access_report(&client, &invoices, now))
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{InvoiceId, Money};
    use chrono::{Duration, TimeZone};

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 7, 20, 10, 0, 0)
            .single()
            .expect("valid timestamp")
    }

    fn client() -> Client {
        Client::new(ClientId(1), "Acme", "ap@acme.test")
    }

    fn invoice(id: u64, days_ago: i64) -> Invoice {
        Invoice::open(
            InvoiceId(id),
            ClientId(1),
            now() - Duration::days(days_ago),
            Money::from_cents(1_000),
        )
    }

    #[test]
    fn no_invoices_is_full() {
        assert_eq!(resolve_access_level(&client(), &[], now()), AccessLevel::Full);
        assert_eq!(access_report(&client(), &[], now()), AccessReport::full());
    }

    #[test]
    fn two_days_overdue_is_still_full() {
        let report = access_report(&client(), &[invoice(1, 2)], now());
        assert_eq!(report.access_level, AccessLevel::Full);
        assert!(report.has_overdue_invoices);
        assert_eq!(report.overdue_days, 2);
        assert!(report.restriction_message.is_none());
    }

    #[test]
    fn three_days_overdue_restricts_to_invoices() {
        let report = access_report(&client(), &[invoice(1, 3)], now());
        assert_eq!(report.access_level, AccessLevel::InvoiceOnly);
        assert!(report.restriction_message.is_some());
    }

    #[test]
    fn oldest_invoice_drives_overdue_days() {
        let report = access_report(&client(), &[invoice(1, 1), invoice(2, 8)], now());
        assert_eq!(report.overdue_days, 8);
    }

    #[test]
    fn paid_invoices_are_ignored() {
        let mut paid = invoice(1, 30);
        paid.mark_paid(now()).expect("pay");
        assert_eq!(resolve_access_level(&client(), &[paid], now()), AccessLevel::Full);
    }

    #[test]
    fn blocked_iff_suspended() {
        let mut suspended = client();
        suspended.suspend(now(), "Automatically suspended");

        assert_eq!(resolve_access_level(&suspended, &[], now()), AccessLevel::Blocked);
        assert_ne!(
            resolve_access_level(&client(), &[invoice(1, 400)], now()),
            AccessLevel::Blocked
        );

        let report = access_report(&suspended, &[], now());
        assert_eq!(report.restriction_message.as_deref(), Some("Automatically suspended"));
    }

    #[test]
    fn missing_due_date_is_ignored() {
        let mut broken = invoice(1, 30);
        broken.due_date = None;
        assert_eq!(max_days_overdue(&[broken], now()), 0);
    }
}
