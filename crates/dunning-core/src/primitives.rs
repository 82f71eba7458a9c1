//! # Escalation Primitives
//!
//! Thresholds and bounds shared by the engine and the service layer.

/// Days overdue at which the first reminder is sent.
pub const FIRST_REMINDER_DAYS: u32 = 3;

/// Days overdue at which the suspension warning is sent.
pub const SUSPENSION_WARNING_DAYS: u32 = 7;

/// Days overdue at which the final notice is sent and the client is suspended.
pub const FINAL_NOTICE_DAYS: u32 = 10;

/// Milliseconds in one overdue day.
pub const MILLIS_PER_DAY: i64 = 24 * 60 * 60 * 1000;

/// Maximum number of invoices evaluated in one escalation pass.
///
/// Anything beyond this is left for the next scheduled run.
pub const MAX_BATCH_SIZE: usize = 10_000;

/// Maximum number of records accepted by a single import.
pub const MAX_IMPORT_RECORDS: usize = 100_000;
