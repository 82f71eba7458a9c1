//! # Dunning - Overdue Invoice Escalation Server
//!
//! Sends staged reminders for overdue invoices and suspends clients that stay
//! unpaid past the final threshold.
//!
//! ## Architecture
//!
//! ```text
//! ┌────────────────────────────────────────────────────────────────┐
//! │                     apps/dunning (THE BINARY)                  │
//! │                                                                │
//! │  ┌─────────────┐    ┌─────────────┐    ┌──────────────────┐    │
//! │  │    CLI      │    │  HTTP API   │    │  Webhook Mailer  │    │
//! │  │   (clap)    │    │   (axum)    │    │    (reqwest)     │    │
//! │  └──────┬──────┘    └──────┬──────┘    └────────┬─────────┘    │
//! │         │                  │                    │              │
//! │         └──────────────────┼────────────────────┘              │
//! │                            ▼                                   │
//! │                    ┌───────────────┐                           │
//! │                    │ dunning-core  │                           │
//! │                    │  (THE LOGIC)  │                           │
//! │                    └───────────────┘                           │
//! └────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//!
//! ```bash
//! # Start the HTTP server
//! dunning server --host 0.0.0.0 --port 8080
//!
//! # Daily cron
//! dunning run
//!
//! # Operator commands
//! dunning status
//! dunning access --client 42
//! dunning import -f ledger.json
//! ```

use clap::Parser;
use dunning::cli;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

// =============================================================================
// APPLICATION ENTRY POINT
// =============================================================================

#[tokio::main]
async fn main() {
    // DUNNING_LOG_FORMAT=json enables machine-parseable output.
    let log_format = std::env::var("DUNNING_LOG_FORMAT").unwrap_or_else(|_| "text".to_string());

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "dunning=info,dunning_core=info,tower_http=debug".into());

    match log_format.as_str() {
        "json" => {
            tracing_subscriber::registry()
                .with(filter)
                .with(tracing_subscriber::fmt::layer().json())
                .init();
        }
        _ => {
            tracing_subscriber::registry()
                .with(filter)
                .with(tracing_subscriber::fmt::layer())
                .init();
        }
    }

    let cli = cli::Cli::parse();

    if !cli.quiet && !cli.json_mode {
        print_banner();
    }

    if let Err(e) = cli::execute(cli).await {
        tracing::error!("Error: {}", e);
        std::process::exit(1);
    }
}

/// Print the startup banner.
fn print_banner() {
    println!(
        r#"
  ██████╗ ██╗   ██╗███╗   ██╗███╗   ██╗██╗███╗   ██╗ ██████╗
  ██╔══██╗██║   ██║████╗  ██║████╗  ██║██║████╗  ██║██╔════╝
  ██║  ██║██║   ██║██╔██╗ ██║██╔██╗ ██║██║██╔██╗ ██║██║  ███╗
  ██║  ██║██║   ██║██║╚██╗██║██║╚██╗██║██║██║╚██╗██║██║   ██║
  ██████╔╝╚██████╔╝██║ ╚████║██║ ╚████║██║██║ ╚████║╚██████╔╝
  ╚═════╝  ╚═════╝ ╚═╝  ╚═══╝╚═╝  ╚═══╝╚═╝╚═╝  ╚═══╝ ╚═════╝

  Overdue Invoice Escalation v{}

  Remind • Restrict • Suspend
"#,
        env!("CARGO_PKG_VERSION")
    );
}
