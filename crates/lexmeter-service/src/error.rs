//! API error types and responses.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

use lexmeter_core::{Decision, EntitlementError};
use lexmeter_store::StoreError;

use crate::engine::EngineError;

/// API error type.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// Unauthorized - missing or invalid credentials.
    #[error("unauthorized")]
    Unauthorized,

    /// Resource not found.
    #[error("not found: {0}")]
    NotFound(String),

    /// Bad request - invalid input.
    #[error("bad request: {0}")]
    BadRequest(String),

    /// Conflict - duplicate or concurrent write.
    #[error("conflict: {0}")]
    Conflict(String),

    /// The action needs a paid plan.
    #[error("payment required: {0}")]
    PaymentRequired(String),

    /// The entitlement gate denied the action.
    #[error("feature not available")]
    Denied(Decision),

    /// A purchase that does not map to any plan.
    #[error("invalid mapping: {0}")]
    InvalidMapping(String),

    /// Internal server error.
    #[error("internal error: {0}")]
    Internal(String),
}

/// JSON error response body.
#[derive(Debug, Serialize)]
struct ErrorResponse {
    error: ErrorBody,
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    code: String,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<serde_json::Value>,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code, message, details) = match &self {
            Self::Unauthorized => (
                StatusCode::UNAUTHORIZED,
                "unauthorized",
                self.to_string(),
                None,
            ),
            Self::NotFound(msg) => (StatusCode::NOT_FOUND, "not_found", msg.clone(), None),
            Self::BadRequest(msg) => (StatusCode::BAD_REQUEST, "bad_request", msg.clone(), None),
            Self::Conflict(msg) => (StatusCode::CONFLICT, "conflict", msg.clone(), None),
            Self::PaymentRequired(msg) => (
                StatusCode::PAYMENT_REQUIRED,
                "payment_required",
                msg.clone(),
                None,
            ),
            Self::Denied(decision) => (
                StatusCode::PAYMENT_REQUIRED,
                "feature_locked",
                decision
                    .reason
                    .map_or_else(|| self.to_string(), |reason| reason.to_string()),
                serde_json::to_value(decision).ok(),
            ),
            Self::InvalidMapping(msg) => (
                StatusCode::UNPROCESSABLE_ENTITY,
                "invalid_mapping",
                msg.clone(),
                None,
            ),
            Self::Internal(msg) => {
                tracing::error!(error = %msg, "Internal server error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "internal_error",
                    "An internal error occurred".to_string(),
                    None,
                )
            }
        };

        let body = ErrorResponse {
            error: ErrorBody {
                code: code.to_string(),
                message,
                details,
            },
        };

        (status, Json(body)).into_response()
    }
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound => Self::NotFound("record not found".into()),
            StoreError::Conflict { user_id } => {
                Self::Conflict(format!("plan for {user_id} changed concurrently, retry"))
            }
            StoreError::Duplicate { key } => Self::Conflict(format!("{key} already exists")),
            StoreError::Database(msg) | StoreError::Serialization(msg) => Self::Internal(msg),
        }
    }
}

impl From<EntitlementError> for ApiError {
    fn from(err: EntitlementError) -> Self {
        match err {
            EntitlementError::UnknownProduct { .. } | EntitlementError::UnknownPlan(_) => {
                Self::InvalidMapping(err.to_string())
            }
            EntitlementError::UnknownPromoCode(code) => {
                Self::NotFound(format!("promo code not found: {code}"))
            }
            EntitlementError::InvalidStatusTransition { .. } => Self::Conflict(err.to_string()),
            EntitlementError::InvalidWindow { .. }
            | EntitlementError::InvalidMonthYear(_)
            | EntitlementError::InvalidId(_) => Self::BadRequest(err.to_string()),
        }
    }
}

impl From<EngineError> for ApiError {
    fn from(err: EngineError) -> Self {
        match err {
            EngineError::Store(err) => err.into(),
            EngineError::Entitlement(err) => err.into(),
            EngineError::PlanActive { .. } => Self::Conflict(err.to_string()),
        }
    }
}
