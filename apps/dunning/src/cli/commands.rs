//! # CLI Command Implementations

use super::Backend;
use crate::api::{self, AppState};
use crate::config::AppConfig;
use crate::mailer::build_mailer;
use chrono::{DateTime, Utc};
use dunning_core::{
    BatchReport, ClientId, DunningError, EscalationEngine, InvoiceId, Ledger, LedgerImport,
    LedgerStore, LedgerSummary, ReminderDelivery, ReminderStage, SuspensionChange, check_access,
    escalation_state, import, lift_suspension, record_payment,
};
use std::path::{Path, PathBuf};

/// Maximum size of an import file (100 MB).
const MAX_IMPORT_FILE_SIZE: u64 = 100 * 1024 * 1024;

/// Global options every command needs.
#[derive(Debug, Clone)]
pub struct Context {
    pub database: PathBuf,
    pub backend: Backend,
    pub config: Option<PathBuf>,
    pub json_mode: bool,
    pub verbose: bool,
}

impl Context {
    fn config(&self) -> Result<AppConfig, DunningError> {
        AppConfig::load(self.config.as_deref())
    }

    fn ledger(&self) -> Result<Ledger, DunningError> {
        open_ledger(&self.database, self.backend)
    }

    /// Warn when a mutating command runs against a throwaway ledger.
    fn warn_if_ephemeral(&self) {
        if self.backend == Backend::Memory {
            tracing::warn!("Memory backend: changes are discarded when the command exits");
        }
    }
}

/// Print a value as pretty JSON.
fn print_json(value: &serde_json::Value) {
    println!("{}", serde_json::to_string_pretty(value).unwrap_or_default());
}

// =============================================================================
// SERVER COMMAND
// =============================================================================

/// Start the HTTP server.
pub async fn cmd_server(
    ctx: &Context,
    host: Option<String>,
    port: Option<u16>,
    seed: Option<&Path>,
) -> Result<(), DunningError> {
    let mut config = ctx.config()?;
    if let Some(host) = host {
        config.server.host = host;
    }
    if let Some(port) = port {
        config.server.port = port;
    }

    let mut ledger = ctx.ledger()?;
    if let Some(seed) = seed {
        let summary = import(&mut ledger, read_import_file(seed)?)?;
        tracing::info!(
            clients = summary.clients,
            invoices = summary.invoices,
            "Ledger seeded"
        );
    }

    println!("Dunning Escalation Server Starting...");
    println!();
    println!("Configuration:");
    println!("  Host:     {}", config.server.host);
    println!("  Port:     {}", config.server.port);
    println!("  Backend:  {}", ctx.backend.as_str());
    println!("  Database: {:?}", ctx.database);
    println!(
        "  Mail:     {}",
        config.mail.webhook_url.as_deref().unwrap_or("log only")
    );
    println!();
    println!("Endpoints:");
    println!("  POST /escalations/run          - Run an escalation pass");
    println!("  GET  /clients/{{id}}/access      - Portal access level");
    println!("  POST /clients/{{id}}/unsuspend   - Lift a suspension");
    println!("  POST /invoices/{{id}}/payment    - Record a payment");
    println!("  GET  /status                   - Ledger summary");
    println!("  GET  /health                   - Health check");
    println!();
    println!("Press Ctrl+C to stop");
    println!();

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let state = AppState::new(ledger, build_mailer(&config.mail), config.security);
    api::run_server(&addr, state).await
}

// =============================================================================
// RUN COMMAND
// =============================================================================

/// Run one escalation pass, as a cron job would.
pub async fn cmd_run(ctx: &Context, at: DateTime<Utc>) -> Result<(), DunningError> {
    ctx.warn_if_ephemeral();
    let config = ctx.config()?;
    let mut ledger = ctx.ledger()?;
    let mailer = build_mailer(&config.mail);

    // The mailer may block on network I/O.
    let report = tokio::task::spawn_blocking(move || {
        EscalationEngine::new(mailer).run(&mut ledger, at)
    })
    .await
    .map_err(|e| DunningError::IoError(format!("Escalation task failed: {}", e)))??;

    print_report(&report, ctx.json_mode, ctx.verbose);
    Ok(())
}

fn print_report(report: &BatchReport, json_mode: bool, verbose: bool) {
    if json_mode {
        print_json(&serde_json::json!({
            "evaluated_at": report.evaluated_at,
            "processed": report.processed(),
            "reminders_sent": report.reminders_sent(),
            "reminders_failed": report.reminders_failed(),
            "suspensions": report.suspensions(),
            "skipped": report.skipped,
            "failed": report.failed,
            "deferred": report.deferred,
            "outcomes": report.outcomes,
        }));
        return;
    }

    println!("Escalation pass at {}", report.evaluated_at.to_rfc3339());
    println!("==========================================");
    println!("Processed:        {}", report.processed());
    println!("Reminders sent:   {}", report.reminders_sent());
    println!("Reminders failed: {}", report.reminders_failed());
    println!("Suspensions:      {}", report.suspensions());
    println!("Skipped:          {}", report.skipped.len());
    println!("Failed:           {}", report.failed.len());
    if report.deferred > 0 {
        println!("Deferred:         {}", report.deferred);
    }

    if verbose {
        println!();
        for outcome in &report.outcomes {
            if outcome.reminder == ReminderDelivery::NotDue
                && outcome.suspension == SuspensionChange::Unchanged
            {
                continue;
            }
            println!(
                "  invoice {} (client {}): {} days, {}, reminder {:?}, suspension {:?}",
                outcome.invoice_id,
                outcome.client_id,
                outcome.days_overdue,
                outcome.stage,
                outcome.reminder,
                outcome.suspension
            );
        }
        for skipped in &report.skipped {
            println!("  invoice {} skipped: {:?}", skipped.invoice_id, skipped.reason);
        }
        for failed in &report.failed {
            println!("  invoice {} failed: {}", failed.invoice_id, failed.error);
        }
    }
}

// =============================================================================
// STATUS COMMAND
// =============================================================================

/// Show ledger summary.
pub fn cmd_status(ctx: &Context) -> Result<(), DunningError> {
    let ledger = ctx.ledger()?;
    let summary = LedgerSummary::collect(&ledger, Utc::now())?;

    if ctx.json_mode {
        print_json(&serde_json::json!({
            "database": ctx.database.to_string_lossy(),
            "backend": ctx.backend.as_str(),
            "clients": summary.client_count,
            "suspended_clients": summary.suspended_clients,
            "outstanding_invoices": summary.outstanding_invoices,
            "invalid_invoices": summary.invalid_invoices,
            "outstanding_cents": summary.outstanding_amount.cents(),
            "stages": summary.stages,
            "last_run_at": summary.last_run_at,
        }));
        return Ok(());
    }

    println!("Dunning Ledger Status");
    println!("=====================");
    println!("Database: {:?}", ctx.database);
    println!("Backend:  {}", ctx.backend.as_str());
    println!();
    println!("Clients:              {}", summary.client_count);
    println!("Suspended:            {}", summary.suspended_clients);
    println!("Outstanding invoices: {}", summary.outstanding_invoices);
    println!("Outstanding amount:   {}", summary.outstanding_amount);
    if summary.invalid_invoices > 0 {
        println!("Missing due date:     {}", summary.invalid_invoices);
    }
    println!();
    for stage in ReminderStage::ALL {
        println!("  {:<28} {}", stage.name(), summary.stages.get(stage));
    }
    println!();
    match summary.last_run_at {
        Some(at) => println!("Last run: {}", at.to_rfc3339()),
        None => println!("Last run: never"),
    }

    Ok(())
}

// =============================================================================
// ACCESS COMMAND
// =============================================================================

/// Show a client's access level. Unlike the HTTP endpoint this does not fail
/// open: an operator wants to see the error.
pub fn cmd_access(ctx: &Context, client: u64, at: DateTime<Utc>) -> Result<(), DunningError> {
    let ledger = ctx.ledger()?;
    let report = check_access(&ledger, ClientId(client), at)?;
    let state = match ledger.client(ClientId(client))? {
        Some(record) => escalation_state(&ledger, &record)?,
        None => return Err(DunningError::ClientNotFound(ClientId(client))),
    };

    if ctx.json_mode {
        print_json(&serde_json::json!({
            "client_id": client,
            "escalation_state": state,
            "access_level": report.access_level,
            "restriction_message": report.restriction_message,
            "has_overdue_invoices": report.has_overdue_invoices,
            "overdue_days": report.overdue_days,
        }));
        return Ok(());
    }

    println!("Client {}: {} ({})", client, report.access_level, state);
    println!("Days overdue: {}", report.overdue_days);
    if let Some(message) = report.restriction_message {
        println!("{}", message);
    }
    Ok(())
}

// =============================================================================
// IMPORT COMMAND
// =============================================================================

/// Import clients and invoices.
pub fn cmd_import(ctx: &Context, file: &Path) -> Result<(), DunningError> {
    ctx.warn_if_ephemeral();
    let batch = read_import_file(file)?;
    let mut ledger = ctx.ledger()?;
    let summary = import(&mut ledger, batch)?;

    if ctx.json_mode {
        print_json(&serde_json::json!({
            "clients": summary.clients,
            "invoices": summary.invoices,
        }));
    } else {
        println!(
            "Imported {} clients and {} invoices",
            summary.clients, summary.invoices
        );
    }
    Ok(())
}

/// Read and parse a JSON import file.
pub fn read_import_file(path: &Path) -> Result<LedgerImport, DunningError> {
    let validated = validate_file_path(path)?;

    let metadata = std::fs::metadata(&validated)
        .map_err(|e| DunningError::IoError(format!("Cannot read file metadata: {}", e)))?;
    if metadata.len() > MAX_IMPORT_FILE_SIZE {
        return Err(DunningError::InvalidRecord(format!(
            "File size {} bytes exceeds maximum allowed {} bytes",
            metadata.len(),
            MAX_IMPORT_FILE_SIZE
        )));
    }

    let data = std::fs::read(&validated)
        .map_err(|e| DunningError::IoError(format!("Read file: {}", e)))?;
    serde_json::from_slice(&data)
        .map_err(|e| DunningError::DeserializationError(format!("Invalid import file: {}", e)))
}

/// Canonicalize `path` and make sure it is a regular file.
fn validate_file_path(path: &Path) -> Result<PathBuf, DunningError> {
    let canonical = path.canonicalize().map_err(|e| {
        DunningError::IoError(format!("Invalid file path '{}': {}", path.display(), e))
    })?;

    if !canonical.is_file() {
        return Err(DunningError::IoError(format!(
            "Path '{}' is not a regular file",
            path.display()
        )));
    }

    Ok(canonical)
}

// =============================================================================
// ADMIN COMMANDS
// =============================================================================

/// Record a payment.
pub fn cmd_pay(ctx: &Context, invoice: u64, at: DateTime<Utc>) -> Result<(), DunningError> {
    ctx.warn_if_ephemeral();
    let mut ledger = ctx.ledger()?;
    let paid = record_payment(&mut ledger, InvoiceId(invoice), at)?;

    if ctx.json_mode {
        print_json(&serde_json::to_value(&paid).unwrap_or_default());
    } else {
        println!("Invoice {} marked paid at {}", paid.id, at.to_rfc3339());
    }
    Ok(())
}

/// Lift a suspension.
pub fn cmd_unsuspend(ctx: &Context, client: u64) -> Result<(), DunningError> {
    ctx.warn_if_ephemeral();
    let mut ledger = ctx.ledger()?;
    let lifted = lift_suspension(&mut ledger, ClientId(client))?;

    if ctx.json_mode {
        print_json(&serde_json::json!({ "client_id": client, "lifted": lifted }));
    } else if lifted {
        println!("Client {} is no longer suspended", client);
    } else {
        println!("Client {} was not suspended", client);
    }
    Ok(())
}

// =============================================================================
// INIT COMMAND
// =============================================================================

/// Initialize a new database.
pub fn cmd_init(ctx: &Context, force: bool) -> Result<(), DunningError> {
    if ctx.backend == Backend::Memory {
        println!("Memory backend needs no initialization");
        return Ok(());
    }

    if ctx.database.exists() {
        if !force {
            return Err(DunningError::IoError(
                "Database already exists. Use --force to overwrite.".to_string(),
            ));
        }
        std::fs::remove_file(&ctx.database)
            .map_err(|e| DunningError::IoError(format!("Remove existing database: {}", e)))?;
    }

    let _ledger = Ledger::with_redb(&ctx.database)?;
    println!("Initialized new redb database at {:?}", ctx.database);
    Ok(())
}

// =============================================================================
// HELPER FUNCTIONS
// =============================================================================

/// Open the ledger for a backend.
pub fn open_ledger(db_path: &Path, backend: Backend) -> Result<Ledger, DunningError> {
    match backend {
        Backend::Redb => Ledger::with_redb(db_path),
        Backend::Memory => Ok(Ledger::new()),
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn context(dir: &tempfile::TempDir) -> Context {
        Context {
            database: dir.path().join("ledger.db"),
            backend: Backend::Redb,
            config: None,
            json_mode: true,
            verbose: false,
        }
    }

    const IMPORT: &str = r#"{
        "clients": [
            { "id": 1, "name": "Acme", "email": "ap@acme.test" }
        ],
        "invoices": [
            {
                "id": 10,
                "client_id": 1,
                "due_date": "2026-10-01T00:00:00Z",
                "total_amount": 125000,
                "status": "open"
            }
        ]
    }"#;

    #[test]
    fn import_file_round_trip() {
        let dir = tempfile::tempdir().expect("tempdir");
        let file = dir.path().join("seed.json");
        std::fs::write(&file, IMPORT).expect("write");
        let ctx = context(&dir);

        cmd_import(&ctx, &file).expect("import");

        let ledger = ctx.ledger().expect("open");
        let invoice = ledger.invoice(InvoiceId(10)).expect("get").expect("exists");
        assert_eq!(invoice.total_amount.cents(), 125_000);
        assert!(ledger.client(ClientId(1)).expect("get").is_some());
    }

    #[test]
    fn import_rejects_directories() {
        let dir = tempfile::tempdir().expect("tempdir");
        assert!(read_import_file(dir.path()).is_err());
    }

    #[test]
    fn import_rejects_malformed_json() {
        let dir = tempfile::tempdir().expect("tempdir");
        let file = dir.path().join("bad.json");
        std::fs::write(&file, "{ not json").expect("write");
        assert!(matches!(
            read_import_file(&file),
            Err(DunningError::DeserializationError(_))
        ));
    }

    #[test]
    fn init_refuses_to_overwrite() {
        let dir = tempfile::tempdir().expect("tempdir");
        let ctx = context(&dir);
        cmd_init(&ctx, false).expect("first init");
        assert!(cmd_init(&ctx, false).is_err());
        cmd_init(&ctx, true).expect("forced init");
    }

    #[test]
    fn pay_then_unsuspend() {
        let dir = tempfile::tempdir().expect("tempdir");
        let file = dir.path().join("seed.json");
        std::fs::write(&file, IMPORT).expect("write");
        let ctx = context(&dir);
        cmd_import(&ctx, &file).expect("import");

        let at = Utc::now();
        cmd_pay(&ctx, 10, at).expect("pay");
        assert!(matches!(
            cmd_pay(&ctx, 10, at),
            Err(DunningError::InvoiceAlreadyPaid(_))
        ));
        cmd_unsuspend(&ctx, 1).expect("unsuspend");
    }
}
