//! # Overdue Calculator
//!
//! `days_overdue` is the single clock-dependent quantity in the system.
//! Every stage and access decision is derived from it.

use crate::primitives::MILLIS_PER_DAY;
use chrono::{DateTime, Utc};

/// Whole days an invoice is overdue at `now`, rounded up.
///
/// `max(0, ceil((now - due_date) / 1 day))`. An invoice due exactly now, or
/// in the future, is 0 days overdue; one millisecond past the due date counts
/// as day 1.
#[must_use]
pub fn days_overdue(due_date: DateTime<Utc>, now: DateTime<Utc>) -> u32 {
    let elapsed = now.signed_duration_since(due_date).num_milliseconds();
    if elapsed <= 0 {
        return 0;
    }
    let days = elapsed.saturating_add(MILLIS_PER_DAY - 1) / MILLIS_PER_DAY;
    u32::try_from(days).unwrap_or(u32::MAX)
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn due() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 5, 1, 0, 0, 0)
            .single()
            .expect("valid timestamp")
    }

    #[test]
    fn due_now_is_zero() {
        assert_eq!(days_overdue(due(), due()), 0);
    }

    #[test]
    fn not_yet_due_is_zero() {
        assert_eq!(days_overdue(due(), due() - Duration::days(5)), 0);
    }

    #[test]
    fn whole_days_are_exact() {
        assert_eq!(days_overdue(due(), due() + Duration::days(3)), 3);
        assert_eq!(days_overdue(due(), due() + Duration::days(10)), 10);
    }

    #[test]
    fn partial_day_rounds_up() {
        assert_eq!(days_overdue(due(), due() + Duration::milliseconds(1)), 1);
        assert_eq!(days_overdue(due(), due() + Duration::hours(49)), 3);
    }
}
