//! # Dunning HTTP API Module
//!
//! The HTTP surface of the escalation service, built on axum.
//!
//! ## Endpoints
//!
//! Public:
//! - `GET /health` - Health check
//!
//! Protected by the API key:
//! - `GET /clients/{id}/access` - Portal access level for a client (fails open)
//! - `POST /escalations/run` - Run an escalation pass (scheduler trigger)
//! - `GET /status` - Ledger summary
//! - `GET /metrics` - Prometheus metrics
//! - `GET /clients/{id}` - Client record and invoices
//! - `POST /clients/{id}/unsuspend` - Lift a suspension
//! - `POST /invoices/{id}/payment` - Record a payment

mod auth;
mod error;
mod handlers;
mod middleware;
mod types;

pub use auth::keys_match;
pub use error::{ApiError, status_for};
pub use handlers::{ACCESS_LOCK_TIMEOUT, render_metrics, run_escalation};
pub use middleware::{GlobalRateLimiter, create_rate_limiter};
pub use types::{
    ClientResponse, ErrorResponse, HealthResponse, PaymentRequest, RunRequest, RunResponse,
    StatusResponse, UnsuspendResponse,
};

use crate::config::SecurityConfig;
use crate::mailer::SharedMailer;
use axum::{
    Router,
    http::{HeaderValue, Method, header},
    middleware as axum_middleware,
    routing::{get, post},
};
use dunning_core::{DunningError, Ledger};
use std::sync::Arc;
use tokio::sync::RwLock;
use tower::ServiceBuilder;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

/// Request bodies are small JSON documents.
const MAX_BODY_BYTES: usize = 1024 * 1024;

// =============================================================================
// SERVER STATE
// =============================================================================

/// Shared server state.
#[derive(Clone)]
pub struct AppState {
    pub ledger: Arc<RwLock<Ledger>>,
    pub mailer: SharedMailer,
    pub security: Arc<SecurityConfig>,
}

impl AppState {
    #[must_use]
    pub fn new(ledger: Ledger, mailer: SharedMailer, security: SecurityConfig) -> Self {
        Self {
            ledger: Arc::new(RwLock::new(ledger)),
            mailer,
            security: Arc::new(security),
        }
    }

    /// The API key protected routes require, if any.
    #[must_use]
    pub fn api_key(&self) -> Option<&str> {
        self.security.api_key()
    }
}

// =============================================================================
// CORS CONFIGURATION
// =============================================================================

/// Build the CORS layer from `cors_origins`.
///
/// - `*` allows every origin
/// - unset means localhost only
/// - otherwise a comma-separated list of origins
fn build_cors_layer(origins: Option<&str>) -> CorsLayer {
    match origins.map(str::trim) {
        Some("*") => {
            tracing::warn!("CORS: Allowing ALL origins. This is insecure for production!");
            CorsLayer::permissive()
        }
        Some(origins) => {
            let allowed: Vec<HeaderValue> = origins
                .split(',')
                .filter_map(|s| {
                    let trimmed = s.trim();
                    match trimmed.parse::<HeaderValue>() {
                        Ok(hv) if !trimmed.is_empty() => {
                            tracing::info!("CORS: Allowing origin: {}", trimmed);
                            Some(hv)
                        }
                        Ok(_) => None,
                        Err(e) => {
                            tracing::warn!("CORS: Invalid origin '{}': {}", trimmed, e);
                            None
                        }
                    }
                })
                .collect();

            if allowed.is_empty() {
                tracing::warn!("CORS: No valid origins configured, defaulting to localhost only");
                build_localhost_cors()
            } else {
                CorsLayer::new()
                    .allow_origin(allowed)
                    .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
                    .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION])
            }
        }
        None => build_localhost_cors(),
    }
}

fn build_localhost_cors() -> CorsLayer {
    let origins: Vec<HeaderValue> = [
        "http://localhost:3000",
        "http://localhost:8080",
        "http://127.0.0.1:3000",
        "http://127.0.0.1:8080",
    ]
    .into_iter()
    .filter_map(|o| o.parse::<HeaderValue>().ok())
    .collect();

    CorsLayer::new()
        .allow_origin(origins)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION])
}

// =============================================================================
// ROUTER CREATION
// =============================================================================

/// Create the router with all endpoints and middleware.
///
/// Middleware stack (outer to inner):
/// 1. Tracing
/// 2. CORS
/// 3. Body limit
/// 4. Rate limiting (if enabled)
/// 5. Authentication (protected routes only)
pub fn create_router(state: AppState) -> Router {
    let rate_limit = state.security.rate_limit;
    let cors = build_cors_layer(state.security.cors_origins.as_deref());

    if state.api_key().is_some() {
        tracing::info!("API key authentication enabled");
    } else {
        tracing::warn!(
            "API key authentication DISABLED - the escalation trigger, access checks and admin \
             routes are publicly accessible! Set DUNNING_API_KEY to enable authentication."
        );
    }

    let protected = Router::new()
        .route("/status", get(handlers::status_handler))
        .route("/metrics", get(handlers::metrics_handler))
        .route("/escalations/run", post(handlers::run_handler))
        .route("/clients/{id}", get(handlers::client_handler))
        .route("/clients/{id}/access", get(handlers::access_handler))
        .route("/clients/{id}/unsuspend", post(handlers::unsuspend_handler))
        .route("/invoices/{id}/payment", post(handlers::payment_handler))
        .route_layer(axum_middleware::from_fn_with_state(
            state.clone(),
            auth::require_api_key,
        ));

    let mut router = Router::new()
        .route("/health", get(handlers::health_handler))
        .merge(protected);

    if rate_limit > 0 {
        tracing::info!("Rate limiting enabled: {} requests/second", rate_limit);
        router = router.layer(axum_middleware::from_fn_with_state(
            create_rate_limiter(rate_limit),
            middleware::rate_limit_middleware,
        ));
    } else {
        tracing::info!("Rate limiting disabled");
    }

    router
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(cors)
                .layer(axum::extract::DefaultBodyLimit::max(MAX_BODY_BYTES)),
        )
        .with_state(state)
}

// =============================================================================
// SERVER STARTUP
// =============================================================================

/// Start the HTTP server and serve until Ctrl+C.
pub async fn run_server(addr: &str, state: AppState) -> Result<(), DunningError> {
    let router = create_router(state);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|e| DunningError::IoError(format!("Bind failed: {}", e)))?;

    tracing::info!("Dunning HTTP server listening on {}", addr);

    axum::serve(listener, router)
        .with_graceful_shutdown(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!("Failed to listen for shutdown signal: {}", e);
            }
            tracing::info!("Shutdown signal received");
        })
        .await
        .map_err(|e| DunningError::IoError(format!("Server error: {}", e)))
}
