//! # Reminder Stages
//!
//! The escalation ladder an overdue invoice climbs, and the per-client state
//! it implies.
//!
//! ## Stage Definitions
//!
//! | Stage | Days overdue | Effect |
//! |-------|--------------|--------|
//! | `none` | 0..3 | Nothing |
//! | `first_reminder` | 3..7 | Reminder email |
//! | `suspension_warning` | 7..10 | Warning email |
//! | `final_notice_and_suspension` | 10.. | Final notice + auto-suspension |
//!
//! Thresholds are inclusive-lower, exclusive-upper. A stage is a bucket, not an
//! event: the engine fires each stage at most once per invoice.

use crate::primitives::{FINAL_NOTICE_DAYS, FIRST_REMINDER_DAYS, SUSPENSION_WARNING_DAYS};
use serde::{Deserialize, Serialize};

// =============================================================================
// REMINDER STAGE
// =============================================================================

/// Escalation stage of a single invoice. Ordered by severity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReminderStage {
    None,
    FirstReminder,
    SuspensionWarning,
    FinalNoticeAndSuspension,
}

impl ReminderStage {
    /// All stages in ascending order.
    pub const ALL: [ReminderStage; 4] = [
        ReminderStage::None,
        ReminderStage::FirstReminder,
        ReminderStage::SuspensionWarning,
        ReminderStage::FinalNoticeAndSuspension,
    ];

    /// Resolve the stage for a number of days overdue.
    #[must_use]
    pub fn from_days_overdue(days: u32) -> Self {
        if days >= FINAL_NOTICE_DAYS {
            ReminderStage::FinalNoticeAndSuspension
        } else if days >= SUSPENSION_WARNING_DAYS {
            ReminderStage::SuspensionWarning
        } else if days >= FIRST_REMINDER_DAYS {
            ReminderStage::FirstReminder
        } else {
            ReminderStage::None
        }
    }

    /// Wire name, as used in the API and in metrics labels.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            ReminderStage::None => "none",
            ReminderStage::FirstReminder => "first_reminder",
            ReminderStage::SuspensionWarning => "suspension_warning",
            ReminderStage::FinalNoticeAndSuspension => "final_notice_and_suspension",
        }
    }

    /// Human-readable stage name.
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            ReminderStage::None => "Current",
            ReminderStage::FirstReminder => "First Reminder",
            ReminderStage::SuspensionWarning => "Suspension Warning",
            ReminderStage::FinalNoticeAndSuspension => "Final Notice",
        }
    }

    /// Minimum days overdue for this stage.
    #[must_use]
    pub fn threshold(&self) -> u32 {
        match self {
            ReminderStage::None => 0,
            ReminderStage::FirstReminder => FIRST_REMINDER_DAYS,
            ReminderStage::SuspensionWarning => SUSPENSION_WARNING_DAYS,
            ReminderStage::FinalNoticeAndSuspension => FINAL_NOTICE_DAYS,
        }
    }

    #[must_use]
    pub fn next(&self) -> Option<ReminderStage> {
        match self {
            ReminderStage::None => Some(ReminderStage::FirstReminder),
            ReminderStage::FirstReminder => Some(ReminderStage::SuspensionWarning),
            ReminderStage::SuspensionWarning => Some(ReminderStage::FinalNoticeAndSuspension),
            ReminderStage::FinalNoticeAndSuspension => None,
        }
    }

    #[must_use]
    pub fn previous(&self) -> Option<ReminderStage> {
        match self {
            ReminderStage::None => None,
            ReminderStage::FirstReminder => Some(ReminderStage::None),
            ReminderStage::SuspensionWarning => Some(ReminderStage::FirstReminder),
            ReminderStage::FinalNoticeAndSuspension => Some(ReminderStage::SuspensionWarning),
        }
    }

    /// Check if this stage is terminal (final notice).
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, ReminderStage::FinalNoticeAndSuspension)
    }

    /// Whether reaching this stage sends an email.
    #[must_use]
    pub fn sends_reminder(&self) -> bool {
        !matches!(self, ReminderStage::None)
    }

    /// Days left until the next stage fires, given the current days overdue.
    #[must_use]
    pub fn days_until_next(days: u32) -> Option<u32> {
        Self::from_days_overdue(days)
            .next()
            .map(|next| next.threshold().saturating_sub(days))
    }
}

impl std::fmt::Display for ReminderStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// ESCALATION STATE
// =============================================================================

/// Per-client position on the escalation ladder.
///
/// ```text
/// ACTIVE --(>=3d)--> FIRST_REMINDED --(>=7d)--> WARNED --(>=10d)--> SUSPENDED
/// SUSPENDED --(admin unsuspend)--> ACTIVE
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EscalationState {
    Active,
    FirstReminded,
    Warned,
    Suspended,
}

impl EscalationState {
    /// Derive the state from the suspension flag and the highest stage
    /// already notified across the client's outstanding invoices.
    #[must_use]
    pub fn derive(suspended: bool, highest_notified: Option<ReminderStage>) -> Self {
        if suspended {
            return EscalationState::Suspended;
        }
        match highest_notified {
            None | Some(ReminderStage::None) => EscalationState::Active,
            Some(ReminderStage::FirstReminder) => EscalationState::FirstReminded,
            Some(ReminderStage::SuspensionWarning) => EscalationState::Warned,
            // A final notice without the flag means an admin lifted the suspension.
            Some(ReminderStage::FinalNoticeAndSuspension) => EscalationState::Active,
        }
    }

    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            EscalationState::Active => "active",
            EscalationState::FirstReminded => "first_reminded",
            EscalationState::Warned => "warned",
            EscalationState::Suspended => "suspended",
        }
    }
}

impl std::fmt::Display for EscalationState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn boundaries_are_inclusive_lower() {
        assert_eq!(ReminderStage::from_days_overdue(0), ReminderStage::None);
        assert_eq!(ReminderStage::from_days_overdue(2), ReminderStage::None);
        assert_eq!(ReminderStage::from_days_overdue(3), ReminderStage::FirstReminder);
        assert_eq!(ReminderStage::from_days_overdue(6), ReminderStage::FirstReminder);
        assert_eq!(ReminderStage::from_days_overdue(7), ReminderStage::SuspensionWarning);
        assert_eq!(ReminderStage::from_days_overdue(9), ReminderStage::SuspensionWarning);
        assert_eq!(
            ReminderStage::from_days_overdue(10),
            ReminderStage::FinalNoticeAndSuspension
        );
        assert_eq!(
            ReminderStage::from_days_overdue(u32::MAX),
            ReminderStage::FinalNoticeAndSuspension
        );
    }

    #[test]
    fn thresholds_round_trip() {
        for stage in ReminderStage::ALL {
            assert_eq!(ReminderStage::from_days_overdue(stage.threshold()), stage);
        }
    }

    #[test]
    fn next_and_previous_are_inverse() {
        for stage in ReminderStage::ALL {
            if let Some(next) = stage.next() {
                assert_eq!(next.previous(), Some(stage));
                assert!(next > stage);
            } else {
                assert!(stage.is_terminal());
            }
        }
    }

    #[test]
    fn only_none_is_silent() {
        assert!(!ReminderStage::None.sends_reminder());
        assert!(ReminderStage::FirstReminder.sends_reminder());
        assert!(ReminderStage::FinalNoticeAndSuspension.sends_reminder());
    }

    #[test]
    fn days_until_next_stage() {
        assert_eq!(ReminderStage::days_until_next(0), Some(3));
        assert_eq!(ReminderStage::days_until_next(4), Some(3));
        assert_eq!(ReminderStage::days_until_next(9), Some(1));
        assert_eq!(ReminderStage::days_until_next(10), None);
    }

    #[test]
    fn state_derivation() {
        assert_eq!(EscalationState::derive(false, None), EscalationState::Active);
        assert_eq!(
            EscalationState::derive(false, Some(ReminderStage::FirstReminder)),
            EscalationState::FirstReminded
        );
        assert_eq!(
            EscalationState::derive(false, Some(ReminderStage::SuspensionWarning)),
            EscalationState::Warned
        );
        assert_eq!(
            EscalationState::derive(true, Some(ReminderStage::FirstReminder)),
            EscalationState::Suspended
        );
        assert_eq!(
            EscalationState::derive(false, Some(ReminderStage::FinalNoticeAndSuspension)),
            EscalationState::Active
        );
    }

    #[test]
    fn stage_serializes_snake_case() {
        let json = serde_json::to_string(&ReminderStage::FinalNoticeAndSuspension)
            .expect("serialize stage");
        assert_eq!(json, "\"final_notice_and_suspension\"");
    }
}
