//! Unified error handling with Sentry integration.
//!
//! Route handlers return `Result<T, AppError>`. Every error renders as a
//! machine-readable JSON body so the storefront UI can show an accurate
//! message; server-side failures are captured to Sentry before responding.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use thiserror::Error;

use crate::ledger::{LedgerError, RedeemError};

/// Application-level error type for the loyalty service.
#[derive(Debug, Error)]
pub enum AppError {
    /// Caller is not authenticated.
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// Malformed request from the client.
    #[error("Bad request: {0}")]
    BadRequest(String),

    /// Redemption failed (business rule or remote failure).
    #[error("Redeem error: {0}")]
    Redeem(#[from] RedeemError),

    /// A ledger write failed.
    #[error("Ledger error: {0}")]
    Ledger(#[from] LedgerError),

    /// Internal server error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        // Capture server-side failures to Sentry
        if matches!(
            self,
            Self::Ledger(_) | Self::Internal(_) | Self::Redeem(RedeemError::Ledger(_))
        ) {
            let event_id = sentry::capture_error(&self);
            tracing::error!(
                error = %self,
                sentry_event_id = %event_id,
                "Request error"
            );
        }

        let (status, body) = match &self {
            Self::Unauthorized(message) => {
                (StatusCode::UNAUTHORIZED, json!({ "error": message }))
            }
            Self::BadRequest(message) => (StatusCode::BAD_REQUEST, json!({ "error": message })),
            Self::Redeem(RedeemError::InvalidTier) => (
                StatusCode::BAD_REQUEST,
                json!({ "error": "Invalid voucher level" }),
            ),
            Self::Redeem(RedeemError::InsufficientPoints { required, available }) => (
                StatusCode::BAD_REQUEST,
                json!({
                    "error": "Insufficient points",
                    "required": required,
                    "available": available,
                }),
            ),
            // Remote details stay out of client responses
            Self::Ledger(_) | Self::Redeem(RedeemError::Ledger(_)) => (
                StatusCode::BAD_GATEWAY,
                json!({ "error": "External service error" }),
            ),
            Self::Internal(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                json!({ "error": "Internal server error" }),
            ),
        };

        (status, Json(body)).into_response()
    }
}

/// Result type alias for `AppError`.
pub type Result<T> = std::result::Result<T, AppError>;
