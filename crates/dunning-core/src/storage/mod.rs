//! # Durable Storage
//!
//! Persistent `LedgerStore` implementations.

mod redb_ledger;

pub use redb_ledger::RedbLedger;
