use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use domain::services::DeviceAuthError;
use domain::AlarmError;
use serde::Serialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Rate limited")]
    RateLimited,

    #[error("Internal error: {0}")]
    Internal(String),

    #[error("Service unavailable: {0}")]
    ServiceUnavailable(String),
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: String,
    message: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error_code, message) = match &self {
            ApiError::Unauthorized(msg) => (StatusCode::UNAUTHORIZED, "unauthorized", msg.clone()),
            ApiError::Forbidden(msg) => (StatusCode::FORBIDDEN, "forbidden", msg.clone()),
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, "not_found", msg.clone()),
            ApiError::Conflict(msg) => (StatusCode::CONFLICT, "conflict", msg.clone()),
            ApiError::Validation(msg) => (StatusCode::BAD_REQUEST, "validation_error", msg.clone()),
            ApiError::RateLimited => (
                StatusCode::TOO_MANY_REQUESTS,
                "rate_limited",
                "Too many requests. Please try again later.".into(),
            ),
            ApiError::Internal(msg) => {
                tracing::error!("Internal error: {}", msg);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "internal_error",
                    "An internal error occurred, please retry".into(),
                )
            }
            ApiError::ServiceUnavailable(msg) => (
                StatusCode::SERVICE_UNAVAILABLE,
                "service_unavailable",
                msg.clone(),
            ),
        };

        let body = ErrorBody {
            error: error_code.into(),
            message,
        };

        (status, Json(body)).into_response()
    }
}

impl From<AlarmError> for ApiError {
    fn from(err: AlarmError) -> Self {
        match err {
            AlarmError::Unauthenticated(msg) => ApiError::Unauthorized(msg),
            AlarmError::Forbidden(msg) => ApiError::Forbidden(msg),
            AlarmError::NotFound(msg) => ApiError::NotFound(msg),
            AlarmError::Conflict(msg) => ApiError::Conflict(msg),
            AlarmError::Validation(msg) => ApiError::Validation(msg),
            AlarmError::Internal(msg) => ApiError::Internal(msg),
        }
    }
}

impl From<DeviceAuthError> for ApiError {
    fn from(err: DeviceAuthError) -> Self {
        // The response never says which part of the credential was wrong.
        match err {
            DeviceAuthError::MissingCredentials => {
                ApiError::Unauthorized("Missing device credentials".to_string())
            }
            DeviceAuthError::UnknownDevice | DeviceAuthError::InvalidSecret => {
                ApiError::Unauthorized("Invalid device credentials".to_string())
            }
        }
    }
}

impl From<validator::ValidationErrors> for ApiError {
    fn from(errors: validator::ValidationErrors) -> Self {
        AlarmError::from(errors).into()
    }
}
