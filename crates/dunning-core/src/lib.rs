//! # dunning-core
//!
//! The overdue invoice escalation engine for Dunning - THE LOGIC.
//!
//! Given a ledger of clients and invoices and an explicit `now`, the engine:
//! - computes how many days each outstanding invoice is overdue
//! - maps that to a reminder stage (3 / 7 / 10 day thresholds)
//! - emails each stage exactly once per invoice
//! - suspends the client at the final stage
//! - derives the client's portal access level (full / invoice-only / blocked)
//!
//! ## Architectural Constraints
//!
//! - No async, no network: side effects go through the `LedgerStore` and
//!   `ReminderMailer` traits, implemented by the caller
//! - The clock is always a parameter; nothing here calls `Utc::now()`
//! - Integer money only; no floating-point arithmetic
//! - Every pass is safe to re-run: effects are idempotent per stage

// =============================================================================
// MODULES
// =============================================================================

pub mod access;
pub mod admin;
pub mod engine;
pub mod notify;
pub mod overdue;
pub mod primitives;
pub mod session;
pub mod storage;
pub mod store;
pub mod system;
pub mod types;

// =============================================================================
// RE-EXPORTS: Core Types (from types module)
// =============================================================================

pub use types::{
    Client, ClientId, DunningError, Invoice, InvoiceId, InvoiceStatus, Money, NotificationMark,
};

// =============================================================================
// RE-EXPORTS: Engine
// =============================================================================

pub use access::{AccessLevel, AccessReport, access_report, check_access, resolve_access_level};
pub use admin::{ImportSummary, LedgerImport, import, lift_suspension, record_payment};
pub use engine::{
    BatchReport, EscalationCandidate, EscalationEngine, EscalationOutcome, FailedRecord,
    ReminderDelivery, SkipReason, SkippedRecord, SuspensionChange, collect_candidates,
    escalation_state,
};
pub use notify::{MailError, Reminder, ReminderMailer};
pub use overdue::days_overdue;
pub use session::{Ledger, StorageBackend};
pub use storage::RedbLedger;
pub use store::{LedgerStore, MemoryLedger};

// =============================================================================
// RE-EXPORTS: System (from system module)
// =============================================================================

pub use system::{EscalationState, LedgerSummary, ReminderStage, StageCounts};
