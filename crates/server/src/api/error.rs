//! Error responses shared by the API handlers.

use axum::{http::StatusCode, Json};
use serde::Serialize;

use parcelhub_core::{DispatchError, Identity, MeasurementError};

/// Error body returned by every failing endpoint.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

pub type ApiError = (StatusCode, Json<ErrorResponse>);

pub type ApiResult<T> = Result<T, ApiError>;

pub fn error_response(status: StatusCode, message: impl Into<String>) -> ApiError {
    (
        status,
        Json(ErrorResponse {
            error: message.into(),
        }),
    )
}

pub fn bad_request(message: impl Into<String>) -> ApiError {
    error_response(StatusCode::BAD_REQUEST, message)
}

/// Map a dispatch failure to its HTTP status.
pub fn dispatch_error(e: DispatchError) -> ApiError {
    let status = match &e {
        DispatchError::Validation(_) => StatusCode::BAD_REQUEST,
        DispatchError::Conflict(_) | DispatchError::InvalidState { .. } => StatusCode::CONFLICT,
        DispatchError::NotFound { .. } => StatusCode::NOT_FOUND,
        DispatchError::Forbidden(_) => StatusCode::FORBIDDEN,
        DispatchError::Database(_) => {
            tracing::error!(error = %e, "Dispatch store failure");
            StatusCode::INTERNAL_SERVER_ERROR
        }
    };
    error_response(status, e.to_string())
}

/// Map a measurement failure to its HTTP status.
pub fn measurement_error(e: MeasurementError) -> ApiError {
    let status = match &e {
        MeasurementError::NotConfigured => StatusCode::SERVICE_UNAVAILABLE,
        _ => StatusCode::BAD_GATEWAY,
    };
    error_response(status, e.to_string())
}

/// Reject non-admin callers of read-only admin endpoints.
pub fn require_admin(identity: &Identity) -> ApiResult<()> {
    if identity.is_admin() {
        Ok(())
    } else {
        Err(error_response(
            StatusCode::FORBIDDEN,
            format!("User {} is not an administrator", identity.user_id),
        ))
    }
}
