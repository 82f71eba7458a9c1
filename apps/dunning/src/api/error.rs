//! # API Errors
//!
//! Maps core errors onto HTTP status codes.

use super::types::ErrorResponse;
use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use dunning_core::DunningError;

/// A handler failure: status code plus a message for the body.
#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub message: String,
}

impl ApiError {
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message: message.into(),
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            message: message.into(),
        }
    }
}

#[must_use]
pub fn status_for(error: &DunningError) -> StatusCode {
    match error {
        DunningError::ClientNotFound(_) | DunningError::InvoiceNotFound(_) => {
            StatusCode::NOT_FOUND
        }
        DunningError::InvoiceAlreadyPaid(_) => StatusCode::CONFLICT,
        DunningError::InvalidRecord(_) | DunningError::DeserializationError(_) => {
            StatusCode::BAD_REQUEST
        }
        DunningError::SerializationError(_)
        | DunningError::IoError(_)
        | DunningError::InvalidConfig(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl From<DunningError> for ApiError {
    fn from(error: DunningError) -> Self {
        let status = status_for(&error);
        if status.is_server_error() {
            tracing::error!(error = %error, "Request failed");
            // Storage details stay in the log.
            return Self::internal("Internal storage error");
        }
        Self {
            status,
            message: error.to_string(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (
            self.status,
            Json(ErrorResponse {
                error: self.message,
            }),
        )
            .into_response()
    }
}

// =============================================================================
// TESTS
// =============================================================================
