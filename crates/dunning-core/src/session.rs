//! # Ledger Session
//!
//! `Ledger` is the handle the service layer owns: it hides which storage
//! backend is in use behind the `LedgerStore` trait.
//!
//! ## Storage Backends
//!
//! - `InMemory`: `MemoryLedger` (fast, volatile)
//! - `Persistent`: `RedbLedger` (disk-backed, ACID)

use crate::storage::RedbLedger;
use crate::store::{LedgerStore, MemoryLedger};
use crate::{Client, ClientId, DunningError, Invoice, InvoiceId, NotificationMark};
use chrono::{DateTime, Utc};
use std::path::Path;

/// Storage backend for a Ledger.
#[derive(Debug)]
pub enum StorageBackend {
    /// In-memory ledger (fast, volatile).
    InMemory(MemoryLedger),
    /// Disk-backed ledger using redb (ACID, persistent).
    Persistent(RedbLedger),
}

impl Default for StorageBackend {
    fn default() -> Self {
        Self::InMemory(MemoryLedger::new())
    }
}

/// A Ledger owns one storage backend and forwards every `LedgerStore` call
/// to it.
///
/// Note: Ledger does NOT implement Clone; the redb handle cannot be shared
/// that way. Wrap it in `Arc<RwLock<_>>` to share it.
#[derive(Debug, Default)]
pub struct Ledger {
    backend: StorageBackend,
}

impl Ledger {
    /// Create a new empty ledger with in-memory storage.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Wrap an existing in-memory ledger.
    #[must_use]
    pub fn with_memory(ledger: MemoryLedger) -> Self {
        Self {
            backend: StorageBackend::InMemory(ledger),
        }
    }

    /// Open (or create) a redb-backed ledger at `path`.
    pub fn with_redb(path: impl AsRef<Path>) -> Result<Self, DunningError> {
        Ok(Self {
            backend: StorageBackend::Persistent(RedbLedger::open(path)?),
        })
    }

    /// Whether the ledger writes through to disk.
    #[must_use]
    pub fn is_persistent(&self) -> bool {
        matches!(self.backend, StorageBackend::Persistent(_))
    }

    /// Access the storage backend.
    #[must_use]
    pub fn backend(&self) -> &StorageBackend {
        &self.backend
    }

    fn store(&self) -> &dyn LedgerStore {
        match &self.backend {
            StorageBackend::InMemory(ledger) => ledger,
            StorageBackend::Persistent(ledger) => ledger,
        }
    }

    fn store_mut(&mut self) -> &mut dyn LedgerStore {
        match &mut self.backend {
            StorageBackend::InMemory(ledger) => ledger,
            StorageBackend::Persistent(ledger) => ledger,
        }
    }
}

impl LedgerStore for Ledger {
    fn client(&self, id: ClientId) -> Result<Option<Client>, DunningError> {
        self.store().client(id)
    }

    fn clients(&self) -> Result<Vec<Client>, DunningError> {
        self.store().clients()
    }

    fn upsert_client(&mut self, client: Client) -> Result<(), DunningError> {
        self.store_mut().upsert_client(client)
    }

    fn invoice(&self, id: InvoiceId) -> Result<Option<Invoice>, DunningError> {
        self.store().invoice(id)
    }

    fn upsert_invoice(&mut self, invoice: Invoice) -> Result<(), DunningError> {
        self.store_mut().upsert_invoice(invoice)
    }

    fn invoices_for_client(&self, client: ClientId) -> Result<Vec<Invoice>, DunningError> {
        self.store().invoices_for_client(client)
    }

    fn outstanding_invoices(&self) -> Result<Vec<Invoice>, DunningError> {
        self.store().outstanding_invoices()
    }

    fn notification_mark(
        &self,
        invoice: InvoiceId,
    ) -> Result<Option<NotificationMark>, DunningError> {
        self.store().notification_mark(invoice)
    }

    fn record_notification(&mut self, mark: NotificationMark) -> Result<(), DunningError> {
        self.store_mut().record_notification(mark)
    }

    fn suspend_client(
        &mut self,
        id: ClientId,
        at: DateTime<Utc>,
        reason: &str,
    ) -> Result<bool, DunningError> {
        self.store_mut().suspend_client(id, at, reason)
    }

    fn unsuspend_client(&mut self, id: ClientId) -> Result<bool, DunningError> {
        self.store_mut().unsuspend_client(id)
    }

    fn last_run_at(&self) -> Result<Option<DateTime<Utc>>, DunningError> {
        self.store().last_run_at()
    }

    fn record_run(&mut self, at: DateTime<Utc>) -> Result<(), DunningError> {
        self.store_mut().record_run(at)
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn default_is_in_memory() {
        let ledger = Ledger::new();
        assert!(!ledger.is_persistent());
        assert!(matches!(ledger.backend(), StorageBackend::InMemory(_)));
    }

    #[test]
    fn redb_backend_is_persistent() {
        let dir = tempdir().expect("tempdir");
        let mut ledger = Ledger::with_redb(dir.path().join("ledger.db")).expect("open");
        assert!(ledger.is_persistent());

        ledger
            .upsert_client(Client::new(ClientId(1), "Acme", "ap@acme.test"))
            .expect("upsert");
        assert_eq!(ledger.clients().expect("clients").len(), 1);
    }
}
