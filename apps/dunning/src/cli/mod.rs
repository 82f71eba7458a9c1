//! # Dunning CLI Module
//!
//! ## Available Commands
//!
//! - `server` - Start the HTTP server
//! - `run` - Run one escalation pass (for cron)
//! - `status` - Show ledger summary
//! - `access` - Show a client's portal access level
//! - `import` - Load clients and invoices from a JSON file
//! - `pay` - Record a payment for an invoice
//! - `unsuspend` - Lift a client's suspension
//! - `init` - Initialize a new database

mod commands;

use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand, ValueEnum};
use dunning_core::DunningError;
use std::path::PathBuf;

pub use commands::*;

// =============================================================================
// CLI STRUCTURE
// =============================================================================

/// Dunning - overdue invoice reminders and automatic suspension.
#[derive(Parser, Debug)]
#[command(name = "dunning")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Suppress banner output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Path to a TOML configuration file
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Path to the ledger database
    #[arg(short = 'D', long, global = true, default_value = "dunning.db")]
    pub database: PathBuf,

    /// Storage backend
    #[arg(short = 'B', long, global = true, value_enum, default_value_t = Backend::Redb)]
    pub backend: Backend,

    /// Output in JSON format (for programmatic access)
    #[arg(long, global = true)]
    pub json_mode: bool,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Option<Commands>,
}

/// Where the ledger lives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Backend {
    /// redb ACID database file
    Redb,
    /// In-memory, discarded on exit
    Memory,
}

impl Backend {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Backend::Redb => "redb",
            Backend::Memory => "memory",
        }
    }
}

/// Available CLI commands.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Start HTTP server
    Server {
        /// Host to bind to (overrides the config file)
        #[arg(short = 'H', long)]
        host: Option<String>,

        /// Port to bind to (overrides the config file)
        #[arg(short, long)]
        port: Option<u16>,

        /// JSON file imported into the ledger before serving
        #[arg(long)]
        seed: Option<PathBuf>,
    },

    /// Run one escalation pass
    Run {
        /// Evaluate as of this RFC 3339 instant instead of now
        #[arg(long)]
        at: Option<DateTime<Utc>>,
    },

    /// Show ledger summary
    Status,

    /// Show a client's portal access level
    Access {
        /// Client ID
        #[arg(long)]
        client: u64,

        /// Evaluate as of this RFC 3339 instant instead of now
        #[arg(long)]
        at: Option<DateTime<Utc>>,
    },

    /// Load clients and invoices from a JSON file
    Import {
        /// Path to the input file
        #[arg(short, long)]
        file: PathBuf,
    },

    /// Record a payment for an invoice
    Pay {
        /// Invoice ID
        #[arg(long)]
        invoice: u64,

        /// Payment time (RFC 3339), defaults to now
        #[arg(long)]
        at: Option<DateTime<Utc>>,
    },

    /// Lift a client's suspension
    Unsuspend {
        /// Client ID
        #[arg(long)]
        client: u64,
    },

    /// Initialize a new empty database
    Init {
        /// Overwrite an existing database
        #[arg(short, long)]
        force: bool,
    },
}

// =============================================================================
// COMMAND EXECUTION
// =============================================================================

/// Execute the CLI with parsed arguments.
pub async fn execute(cli: Cli) -> Result<(), DunningError> {
    let ctx = Context {
        database: cli.database,
        backend: cli.backend,
        config: cli.config,
        json_mode: cli.json_mode,
        verbose: cli.verbose,
    };

    match cli.command {
        Some(Commands::Server { host, port, seed }) => {
            cmd_server(&ctx, host, port, seed.as_deref()).await
        }
        Some(Commands::Run { at }) => cmd_run(&ctx, at.unwrap_or_else(Utc::now)).await,
        Some(Commands::Status) | None => cmd_status(&ctx),
        Some(Commands::Access { client, at }) => {
            cmd_access(&ctx, client, at.unwrap_or_else(Utc::now))
        }
        Some(Commands::Import { file }) => cmd_import(&ctx, &file),
        Some(Commands::Pay { invoice, at }) => cmd_pay(&ctx, invoice, at.unwrap_or_else(Utc::now)),
        Some(Commands::Unsuspend { client }) => cmd_unsuspend(&ctx, client),
        Some(Commands::Init { force }) => cmd_init(&ctx, force),
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let cli = Cli::try_parse_from(["dunning", "status"]).expect("parse");
        assert_eq!(cli.backend, Backend::Redb);
        assert_eq!(cli.database, PathBuf::from("dunning.db"));
        assert!(matches!(cli.command, Some(Commands::Status)));
    }

    #[test]
    fn run_accepts_rfc3339_instant() {
        let cli = Cli::try_parse_from([
            "dunning",
            "--backend",
            "memory",
            "run",
            "--at",
            "2026-10-19T02:00:00Z",
        ])
        .expect("parse");
        assert_eq!(cli.backend, Backend::Memory);
        assert!(matches!(
            cli.command,
            Some(Commands::Run { at: Some(at) }) if at.to_rfc3339() == "2026-10-19T02:00:00+00:00"
        ));
    }

    #[test]
    fn access_requires_client() {
        assert!(Cli::try_parse_from(["dunning", "access"]).is_err());
    }

    #[test]
    fn unknown_backend_is_rejected() {
        assert!(Cli::try_parse_from(["dunning", "--backend", "file", "status"]).is_err());
    }
}
