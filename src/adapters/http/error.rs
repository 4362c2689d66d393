//! Maps broker errors onto HTTP responses.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};
use tracing::error;

use crate::application::BrokerError;
use crate::domain::foundation::ValidationError;

/// Standard error body.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// Error code for programmatic handling.
    pub error_code: String,
    /// Human-readable error message.
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl ErrorResponse {
    pub fn new(error_code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            error_code: error_code.into(),
            message: message.into(),
            details: None,
        }
    }

    pub fn with_details(
        error_code: impl Into<String>,
        message: impl Into<String>,
        details: serde_json::Value,
    ) -> Self {
        Self {
            error_code: error_code.into(),
            message: message.into(),
            details: Some(details),
        }
    }
}

/// API error type that converts broker errors to HTTP responses.
#[derive(Debug)]
pub struct ApiError(BrokerError);

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match &self.0 {
            BrokerError::Validation(_) => StatusCode::BAD_REQUEST,
            BrokerError::NotFound { .. } => StatusCode::NOT_FOUND,
            BrokerError::InvalidTransition(_)
            | BrokerError::StaleEvent { .. }
            | BrokerError::ContactBlocked(_) => StatusCode::CONFLICT,
            BrokerError::NoCapacityAvailable => StatusCode::SERVICE_UNAVAILABLE,
            BrokerError::Infrastructure(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<BrokerError> for ApiError {
    fn from(err: BrokerError) -> Self {
        Self(err)
    }
}

impl From<ValidationError> for ApiError {
    fn from(err: ValidationError) -> Self {
        Self(BrokerError::from(err))
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let code = self.0.code().to_string();

        let body = match &self.0 {
            BrokerError::Infrastructure(err) => {
                error!(error = %err, "Request failed on infrastructure error");
                ErrorResponse::new(code, "internal error")
            }
            BrokerError::StaleEvent {
                event_at,
                last_applied_at,
                ..
            } => ErrorResponse::with_details(
                code,
                self.0.to_string(),
                serde_json::json!({
                    "event_at": event_at,
                    "last_applied_at": last_applied_at,
                }),
            ),
            other => ErrorResponse::new(code, other.to_string()),
        };

        (status, Json(body)).into_response()
    }
}
