//! # API Endpoint Handlers

use super::{
    AppState,
    error::ApiError,
    types::{
        ClientResponse, HealthResponse, PaymentRequest, RunRequest, RunResponse, StatusResponse,
        UnsuspendResponse,
    },
};
use axum::{
    Json,
    body::Bytes,
    extract::{Path, State},
    http::header,
    response::IntoResponse,
};
use chrono::{DateTime, Utc};
use dunning_core::{
    AccessReport, BatchReport, ClientId, DunningError, EscalationEngine, Invoice, InvoiceId,
    LedgerStore, LedgerSummary, ReminderStage, check_access, escalation_state, lift_suspension,
    record_payment,
};
use serde::de::DeserializeOwned;
use std::fmt::Write as _;
use std::sync::Arc;
use std::time::Duration;

/// Parse an optional JSON body. An empty body yields the default.
fn parse_optional_body<T: DeserializeOwned + Default>(body: &Bytes) -> Result<T, ApiError> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(T::default());
    }
    serde_json::from_slice(body)
        .map_err(|e| ApiError::bad_request(format!("Invalid JSON body: {}", e)))
}

// =============================================================================
// HEALTH HANDLER
// =============================================================================

pub async fn health_handler() -> impl IntoResponse {
    Json(HealthResponse::default())
}

// =============================================================================
// STATUS & METRICS
// =============================================================================

/// Ledger summary as of now.
pub async fn status_handler(
    State(state): State<AppState>,
) -> Result<Json<StatusResponse>, ApiError> {
    let ledger = state.ledger.read().await;
    let summary = LedgerSummary::collect(&*ledger, Utc::now())?;
    Ok(Json(StatusResponse::new(summary, ledger.is_persistent())))
}

/// Prometheus text exposition of the ledger summary.
pub async fn metrics_handler(State(state): State<AppState>) -> Result<impl IntoResponse, ApiError> {
    let summary = {
        let ledger = state.ledger.read().await;
        LedgerSummary::collect(&*ledger, Utc::now())?
    };
    Ok((
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        render_metrics(&summary),
    ))
}

/// Render a summary in the Prometheus text format.
#[must_use]
pub fn render_metrics(summary: &LedgerSummary) -> String {
    let mut out = String::new();
    let mut gauge = |name: &str, help: &str, value: i64| {
        let _ = writeln!(out, "# HELP {name} {help}");
        let _ = writeln!(out, "# TYPE {name} gauge");
        let _ = writeln!(out, "{name} {value}");
    };
    gauge(
        "dunning_clients",
        "Clients in the ledger.",
        summary.client_count as i64,
    );
    gauge(
        "dunning_clients_suspended",
        "Clients currently suspended.",
        summary.suspended_clients as i64,
    );
    gauge(
        "dunning_invoices_outstanding",
        "Open invoices.",
        summary.outstanding_invoices as i64,
    );
    gauge(
        "dunning_invoices_invalid",
        "Open invoices without a due date.",
        summary.invalid_invoices as i64,
    );
    gauge(
        "dunning_outstanding_amount_cents",
        "Total open balance in cents.",
        summary.outstanding_amount.cents(),
    );
    gauge(
        "dunning_last_run_timestamp_seconds",
        "Unix time of the last escalation pass (0 if never).",
        summary.last_run_at.map_or(0, |t| t.timestamp()),
    );

    let _ = writeln!(
        out,
        "# HELP dunning_invoices_by_stage Open invoices per reminder stage."
    );
    let _ = writeln!(out, "# TYPE dunning_invoices_by_stage gauge");
    for stage in ReminderStage::ALL {
        let _ = writeln!(
            out,
            "dunning_invoices_by_stage{{stage=\"{}\"}} {}",
            stage.as_str(),
            summary.stages.get(stage)
        );
    }
    out
}

// =============================================================================
// CLIENT HANDLERS
// =============================================================================

/// Client record with its invoices.
pub async fn client_handler(
    State(state): State<AppState>,
    Path(client_id): Path<u64>,
) -> Result<Json<ClientResponse>, ApiError> {
    let id = ClientId(client_id);
    let ledger = state.ledger.read().await;
    let client = ledger.client(id)?.ok_or(DunningError::ClientNotFound(id))?;
    let escalation_state = escalation_state(&*ledger, &client)?;
    let invoices = ledger.invoices_for_client(id)?;
    Ok(Json(ClientResponse {
        client,
        escalation_state,
        invoices,
    }))
}

/// Longest an access check waits for the ledger. An escalation pass holds the
/// write lock while it mails, so the check fails open instead of queueing.
pub const ACCESS_LOCK_TIMEOUT: Duration = Duration::from_millis(250);

/// Portal access check. Fails open: any error yields full access.
pub async fn access_handler(
    State(state): State<AppState>,
    Path(client_id): Path<u64>,
) -> Json<AccessReport> {
    let Ok(ledger) = tokio::time::timeout(ACCESS_LOCK_TIMEOUT, state.ledger.read()).await else {
        tracing::error!(
            event = "access_check_failed",
            client_id,
            reason = "ledger_busy",
            "Ledger busy, granting full access"
        );
        return Json(AccessReport::full());
    };
    let result = check_access(&*ledger, ClientId(client_id), Utc::now());
    Json(access_or_full(client_id, result))
}

/// Collapse a failed access check to full access.
fn access_or_full(client_id: u64, result: Result<AccessReport, DunningError>) -> AccessReport {
    match result {
        Ok(report) => report,
        Err(DunningError::ClientNotFound(_)) => {
            tracing::debug!(client_id, "Access check for unknown client");
            AccessReport::full()
        }
        Err(e) => {
            tracing::error!(
                event = "access_check_failed",
                client_id,
                error = %e,
                "Access check failed, granting full access"
            );
            AccessReport::full()
        }
    }
}

/// Administrator lifts a suspension.
pub async fn unsuspend_handler(
    State(state): State<AppState>,
    Path(client_id): Path<u64>,
) -> Result<Json<UnsuspendResponse>, ApiError> {
    let mut ledger = state.ledger.write().await;
    let lifted = lift_suspension(&mut *ledger, ClientId(client_id))?;
    Ok(Json(UnsuspendResponse { client_id, lifted }))
}

// =============================================================================
// PAYMENT HANDLER
// =============================================================================

/// Payment event for an invoice.
pub async fn payment_handler(
    State(state): State<AppState>,
    Path(invoice_id): Path<u64>,
    body: Bytes,
) -> Result<Json<Invoice>, ApiError> {
    let request: PaymentRequest = parse_optional_body(&body)?;
    let paid_at = request.paid_at.unwrap_or_else(Utc::now);
    let mut ledger = state.ledger.write().await;
    let invoice = record_payment(&mut *ledger, InvoiceId(invoice_id), paid_at)?;
    Ok(Json(invoice))
}

// =============================================================================
// ESCALATION HANDLER
// =============================================================================

/// Scheduler trigger: run an escalation pass.
pub async fn run_handler(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<Json<RunResponse>, ApiError> {
    let request: RunRequest = parse_optional_body(&body)?;
    let at = request.at.unwrap_or_else(Utc::now);
    tracing::info!(event = "escalation_triggered", at = %at, "Escalation pass requested");
    let report = run_escalation(&state, at).await?;
    Ok(Json(RunResponse::from(report)))
}

/// Run a pass on the blocking pool, holding the ledger write lock throughout.
pub async fn run_escalation(state: &AppState, at: DateTime<Utc>) -> Result<BatchReport, ApiError> {
    let ledger = Arc::clone(&state.ledger);
    let mailer = Arc::clone(&state.mailer);
    tokio::task::spawn_blocking(move || {
        let mut ledger = ledger.blocking_write();
        EscalationEngine::new(mailer).run(&mut *ledger, at)
    })
    .await
    .map_err(|e| ApiError::internal(format!("Escalation task failed: {}", e)))?
    .map_err(ApiError::from)
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use dunning_core::{AccessLevel, MemoryLedger, Money};

    #[test]
    fn empty_body_is_default() {
        let request: RunRequest = parse_optional_body(&Bytes::from_static(b"  \n")).expect("parse");
        assert!(request.at.is_none());
    }

    #[test]
    fn malformed_body_is_bad_request() {
        let result: Result<RunRequest, _> = parse_optional_body(&Bytes::from_static(b"{"));
        let err = result.expect_err("should fail");
        assert_eq!(err.status, axum::http::StatusCode::BAD_REQUEST);
    }

    #[test]
    fn storage_error_fails_open() {
        let report = access_or_full(7, Err(DunningError::IoError("redb: corrupted page".into())));
        assert_eq!(report, AccessReport::full());
    }

    #[test]
    fn unknown_client_fails_open() {
        let report = access_or_full(7, Err(DunningError::ClientNotFound(ClientId(7))));
        assert_eq!(report, AccessReport::full());
    }

    #[test]
    fn successful_check_passes_through() {
        let blocked = AccessReport {
            access_level: AccessLevel::Blocked,
            restriction_message: Some("Suspended".into()),
            has_overdue_invoices: true,
            overdue_days: 12,
        };
        assert_eq!(access_or_full(7, Ok(blocked.clone())), blocked);
    }

    #[test]
    fn metrics_list_every_stage() {
        let summary =
            LedgerSummary::collect(&MemoryLedger::new(), Utc::now()).expect("summary");
        let text = render_metrics(&summary);
        for stage in ReminderStage::ALL {
            assert!(text.contains(&format!("stage=\"{}\"", stage.as_str())));
        }
        assert!(text.contains("dunning_clients 0"));
        assert_eq!(summary.outstanding_amount, Money::default());
    }
}
