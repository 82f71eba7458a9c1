//! # System Module
//!
//! Reminder stages, per-client escalation state, and ledger-wide summaries.
//!
//! Everything here is a pure function of stored records and an explicit
//! `now`; nothing in this module writes to the store.

mod stage;
mod summary;

pub use stage::*;
pub use summary::*;
