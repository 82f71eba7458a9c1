//! # redb-backed Ledger Storage
//!
//! A disk-backed ledger using the redb embedded database, providing:
//! - ACID transactions (each mutation commits on its own)
//! - Crash safety (copy-on-write B-trees)
//! - MVCC (concurrent readers, single writer)
//!
//! Records are stored as postcard bytes keyed by their numeric id. The
//! suspension check-then-set and the notification-mark merge both run inside
//! a single write transaction, so a crashed or overlapping pass can never
//! overwrite `suspended_at` or regress a mark.

use crate::store::{LedgerStore, guard_paid_invoice, merge_mark};
use crate::{Client, ClientId, DunningError, Invoice, InvoiceId, NotificationMark};
use chrono::{DateTime, Utc};
use redb::{Database, ReadableDatabase, ReadableTable, TableDefinition};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::path::Path;

/// A table of postcard-encoded records keyed by numeric id.
type RecordTable = TableDefinition<'static, u64, &'static [u8]>;

/// Table for clients: ClientId(u64) -> postcard Client
const CLIENTS: RecordTable = TableDefinition::new("clients");

/// Table for invoices: InvoiceId(u64) -> postcard Invoice
const INVOICES: RecordTable = TableDefinition::new("invoices");

/// Table for notification marks: InvoiceId(u64) -> postcard NotificationMark
const MARKS: RecordTable = TableDefinition::new("notification_marks");

/// Table for metadata: key string -> value i64
const METADATA: TableDefinition<&str, i64> = TableDefinition::new("metadata");

const LAST_RUN_KEY: &str = "last_run_at_millis";

fn io_err(e: impl std::fmt::Display) -> DunningError {
    DunningError::IoError(e.to_string())
}

fn encode<T: Serialize>(value: &T) -> Result<Vec<u8>, DunningError> {
    postcard::to_allocvec(value).map_err(|e| DunningError::SerializationError(e.to_string()))
}

fn decode<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, DunningError> {
    postcard::from_bytes(bytes).map_err(|e| DunningError::DeserializationError(e.to_string()))
}

/// A disk-backed ledger store using redb.
pub struct RedbLedger {
    db: Database,
}

impl std::fmt::Debug for RedbLedger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedbLedger").finish_non_exhaustive()
    }
}

impl RedbLedger {
    /// Open or create a ledger database at the given path.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, DunningError> {
        let db = Database::create(path.as_ref()).map_err(io_err)?;

        // Initialize tables if they don't exist
        {
            let write_txn = db.begin_write().map_err(io_err)?;
            let _ = write_txn.open_table(CLIENTS).map_err(io_err)?;
            let _ = write_txn.open_table(INVOICES).map_err(io_err)?;
            let _ = write_txn.open_table(MARKS).map_err(io_err)?;
            let _ = write_txn.open_table(METADATA).map_err(io_err)?;
            write_txn.commit().map_err(io_err)?;
        }

        Ok(Self { db })
    }

    /// Compact the database file.
    pub fn compact(&mut self) -> Result<(), DunningError> {
        self.db.compact().map_err(io_err)?;
        Ok(())
    }

    fn get<T: DeserializeOwned>(
        &self,
        table: RecordTable,
        key: u64,
    ) -> Result<Option<T>, DunningError> {
        let read_txn = self.db.begin_read().map_err(io_err)?;
        let table = read_txn.open_table(table).map_err(io_err)?;
        let bytes = table
            .get(key)
            .map_err(io_err)?
            .map(|guard| guard.value().to_vec());
        bytes.as_deref().map(decode).transpose()
    }

    fn scan<T: DeserializeOwned>(
        &self,
        table: RecordTable,
        mut keep: impl FnMut(&T) -> bool,
    ) -> Result<Vec<T>, DunningError> {
        let read_txn = self.db.begin_read().map_err(io_err)?;
        let table = read_txn.open_table(table).map_err(io_err)?;
        let mut out = Vec::new();
        for entry in table.iter().map_err(io_err)? {
            let (_, value) = entry.map_err(io_err)?;
            let record: T = decode(value.value())?;
            if keep(&record) {
                out.push(record);
            }
        }
        Ok(out)
    }

    fn put<T: Serialize>(
        &mut self,
        table: RecordTable,
        key: u64,
        value: &T,
    ) -> Result<(), DunningError> {
        let bytes = encode(value)?;
        let write_txn = self.db.begin_write().map_err(io_err)?;
        {
            let mut table = write_txn.open_table(table).map_err(io_err)?;
            table.insert(key, bytes.as_slice()).map_err(io_err)?;
        }
        write_txn.commit().map_err(io_err)
    }

    /// Load a client inside a write transaction, apply `change`, and write it
    /// back only if `change` reports a modification.
    fn update_client(
        &mut self,
        id: ClientId,
        change: impl FnOnce(&mut Client) -> bool,
    ) -> Result<bool, DunningError> {
        let write_txn = self.db.begin_write().map_err(io_err)?;
        let changed = {
            let mut table = write_txn.open_table(CLIENTS).map_err(io_err)?;
            let bytes = table
                .get(id.0)
                .map_err(io_err)?
                .map(|guard| guard.value().to_vec())
                .ok_or(DunningError::ClientNotFound(id))?;
            let mut client: Client = decode(&bytes)?;
            let changed = change(&mut client);
            if changed {
                let encoded = encode(&client)?;
                table.insert(id.0, encoded.as_slice()).map_err(io_err)?;
            }
            changed
        };
        if changed {
            write_txn.commit().map_err(io_err)?;
        } else {
            write_txn.abort().map_err(io_err)?;
        }
        Ok(changed)
    }
}

impl LedgerStore for RedbLedger {
    fn client(&self, id: ClientId) -> Result<Option<Client>, DunningError> {
        self.get(CLIENTS, id.0)
    }

    fn clients(&self) -> Result<Vec<Client>, DunningError> {
        self.scan(CLIENTS, |_: &Client| true)
    }

    fn upsert_client(&mut self, client: Client) -> Result<(), DunningError> {
        self.put(CLIENTS, client.id.0, &client)
    }

    fn invoice(&self, id: InvoiceId) -> Result<Option<Invoice>, DunningError> {
        self.get(INVOICES, id.0)
    }

    fn upsert_invoice(&mut self, invoice: Invoice) -> Result<(), DunningError> {
        let bytes = encode(&invoice)?;
        let write_txn = self.db.begin_write().map_err(io_err)?;
        {
            let mut table = write_txn.open_table(INVOICES).map_err(io_err)?;
            let existing = table
                .get(invoice.id.0)
                .map_err(io_err)?
                .map(|guard| guard.value().to_vec());
            let existing: Option<Invoice> = existing.as_deref().map(decode).transpose()?;
            guard_paid_invoice(existing.as_ref(), &invoice)?;
            table.insert(invoice.id.0, bytes.as_slice()).map_err(io_err)?;
        }
        write_txn.commit().map_err(io_err)
    }

    fn invoices_for_client(&self, client: ClientId) -> Result<Vec<Invoice>, DunningError> {
        self.scan(INVOICES, |invoice: &Invoice| invoice.client_id == client)
    }

    fn outstanding_invoices(&self) -> Result<Vec<Invoice>, DunningError> {
        self.scan(INVOICES, Invoice::is_outstanding)
    }

    fn notification_mark(
        &self,
        invoice: InvoiceId,
    ) -> Result<Option<NotificationMark>, DunningError> {
        self.get(MARKS, invoice.0)
    }

    fn record_notification(&mut self, mark: NotificationMark) -> Result<(), DunningError> {
        let write_txn = self.db.begin_write().map_err(io_err)?;
        {
            let mut table = write_txn.open_table(MARKS).map_err(io_err)?;
            let existing = table
                .get(mark.invoice_id.0)
                .map_err(io_err)?
                .map(|guard| guard.value().to_vec());
            let existing: Option<NotificationMark> =
                existing.as_deref().map(decode).transpose()?;
            let merged = merge_mark(existing, mark);
            let encoded = encode(&merged)?;
            table
                .insert(merged.invoice_id.0, encoded.as_slice())
                .map_err(io_err)?;
        }
        write_txn.commit().map_err(io_err)
    }

    fn suspend_client(
        &mut self,
        id: ClientId,
        at: DateTime<Utc>,
        reason: &str,
    ) -> Result<bool, DunningError> {
        self.update_client(id, |client| client.suspend(at, reason))
    }

    fn unsuspend_client(&mut self, id: ClientId) -> Result<bool, DunningError> {
        self.update_client(id, Client::lift_suspension)
    }

    fn last_run_at(&self) -> Result<Option<DateTime<Utc>>, DunningError> {
        let read_txn = self.db.begin_read().map_err(io_err)?;
        let table = read_txn.open_table(METADATA).map_err(io_err)?;
        let millis = table
            .get(LAST_RUN_KEY)
            .map_err(io_err)?
            .map(|guard| guard.value());
        Ok(millis.and_then(DateTime::<Utc>::from_timestamp_millis))
    }

    fn record_run(&mut self, at: DateTime<Utc>) -> Result<(), DunningError> {
        let write_txn = self.db.begin_write().map_err(io_err)?;
        {
            let mut table = write_txn.open_table(METADATA).map_err(io_err)?;
            table
                .insert(LAST_RUN_KEY, at.timestamp_millis())
                .map_err(io_err)?;
        }
        write_txn.commit().map_err(io_err)
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Money;
    use crate::system::ReminderStage;
    use chrono::TimeZone;
    use tempfile::tempdir;

    fn at(day: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 6, day, 8, 30, 0)
            .single()
            .expect("valid timestamp")
    }

    #[test]
    fn records_survive_reopen() {
        let dir = tempdir().expect("tempdir");
        let path = dir.path().join("ledger.db");

        {
            let mut ledger = RedbLedger::open(&path).expect("open");
            ledger
                .upsert_client(Client::new(ClientId(7), "Studio", "pay@studio.test"))
                .expect("client");
            ledger
                .upsert_invoice(Invoice::open(
                    InvoiceId(70),
                    ClientId(7),
                    at(1),
                    Money::from_cents(9_900),
                ))
                .expect("invoice");
            ledger
                .record_notification(NotificationMark {
                    invoice_id: InvoiceId(70),
                    stage: ReminderStage::FirstReminder,
                    notified_at: at(4),
                })
                .expect("mark");
            ledger.record_run(at(4)).expect("run");
        }

        let ledger = RedbLedger::open(&path).expect("reopen");
        let client = ledger.client(ClientId(7)).expect("get").expect("exists");
        assert_eq!(client.name, "Studio");
        assert_eq!(ledger.outstanding_invoices().expect("outstanding").len(), 1);
        assert_eq!(
            ledger
                .notification_mark(InvoiceId(70))
                .expect("mark")
                .map(|m| m.stage),
            Some(ReminderStage::FirstReminder)
        );
        assert_eq!(ledger.last_run_at().expect("last run"), Some(at(4)));
    }

    #[test]
    fn suspension_keeps_first_timestamp() {
        let dir = tempdir().expect("tempdir");
        let mut ledger = RedbLedger::open(dir.path().join("ledger.db")).expect("open");
        ledger
            .upsert_client(Client::new(ClientId(1), "Acme", "ap@acme.test"))
            .expect("client");

        assert!(ledger.suspend_client(ClientId(1), at(11), "first").expect("suspend"));
        assert!(!ledger.suspend_client(ClientId(1), at(12), "second").expect("suspend"));

        let client = ledger.client(ClientId(1)).expect("get").expect("exists");
        assert!(client.suspended);
        assert_eq!(client.suspended_at, Some(at(11)));
        assert_eq!(client.suspension_reason.as_deref(), Some("first"));

        assert!(ledger.unsuspend_client(ClientId(1)).expect("unsuspend"));
        assert!(!ledger.unsuspend_client(ClientId(1)).expect("unsuspend"));
    }

    #[test]
    fn suspend_missing_client_is_an_error() {
        let dir = tempdir().expect("tempdir");
        let mut ledger = RedbLedger::open(dir.path().join("ledger.db")).expect("open");
        assert!(matches!(
            ledger.suspend_client(ClientId(3), at(1), "x"),
            Err(DunningError::ClientNotFound(ClientId(3)))
        ));
    }

    #[test]
    fn paid_invoice_is_immutable_on_disk() {
        let dir = tempdir().expect("tempdir");
        let mut ledger = RedbLedger::open(dir.path().join("ledger.db")).expect("open");
        let mut invoice = Invoice::open(InvoiceId(5), ClientId(1), at(1), Money::from_cents(10));
        invoice.mark_paid(at(2)).expect("pay");
        ledger.upsert_invoice(invoice).expect("store");

        let reopened = Invoice::open(InvoiceId(5), ClientId(1), at(1), Money::from_cents(10));
        assert!(matches!(
            ledger.upsert_invoice(reopened),
            Err(DunningError::InvoiceAlreadyPaid(InvoiceId(5)))
        ));
        assert!(ledger.outstanding_invoices().expect("outstanding").is_empty());
    }

    #[test]
    fn marks_merge_to_highest_stage() {
        let dir = tempdir().expect("tempdir");
        let mut ledger = RedbLedger::open(dir.path().join("ledger.db")).expect("open");
        for stage in [
            ReminderStage::SuspensionWarning,
            ReminderStage::FirstReminder,
        ] {
            ledger
                .record_notification(NotificationMark {
                    invoice_id: InvoiceId(1),
                    stage,
                    notified_at: at(8),
                })
                .expect("mark");
        }
        let mark = ledger.notification_mark(InvoiceId(1)).expect("mark");
        assert_eq!(mark.map(|m| m.stage), Some(ReminderStage::SuspensionWarning));
    }

    #[test]
    fn compact_keeps_records() {
        let dir = tempdir().expect("tempdir");
        let mut ledger = RedbLedger::open(dir.path().join("ledger.db")).expect("open");
        for id in 1..=20 {
            ledger
                .upsert_client(Client::new(ClientId(id), "Acme", "ap@acme.test"))
                .expect("client");
        }

        ledger.compact().expect("compact");
        assert_eq!(ledger.clients().expect("clients").len(), 20);
    }
}
