//! API error type
//!
//! Every handler returns `Result<_, ApiError>`; the response body is always
//! `{"error": message}`, plus `"field"` for label validation errors.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use olab_core::error::{AuthError, SessionError, StoreError, ValidationError};
use serde_json::json;
use thiserror::Error;
use tracing::{error, warn};

#[derive(Error, Debug)]
pub enum ApiError {
    #[error("{0}")]
    BadRequest(String),

    /// Label rejected before any write
    #[error("{0}")]
    Validation(ValidationError),

    #[error("{0}")]
    Unauthorized(String),

    #[error("Admin access required")]
    Forbidden,

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    Conflict(String),

    /// The backend failed or answered with an error
    #[error("{0}")]
    Backend(String),

    #[error("{0}")]
    Timeout(String),

    #[error("{0}")]
    Internal(String),
}

impl From<ValidationError> for ApiError {
    fn from(e: ValidationError) -> Self {
        ApiError::Validation(e)
    }
}

impl From<StoreError> for ApiError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::NotFound(what) => ApiError::NotFound(format!("Not found: {}", what)),
            StoreError::Timeout => ApiError::Timeout(e.to_string()),
            StoreError::Network(_) | StoreError::Api { .. } | StoreError::Parse(_) => {
                ApiError::Backend(e.to_string())
            }
            StoreError::Database(_) | StoreError::InvalidRow(_) => ApiError::Internal(e.to_string()),
        }
    }
}

impl From<AuthError> for ApiError {
    fn from(e: AuthError) -> Self {
        match e {
            AuthError::InvalidCredentials | AuthError::SessionExpired | AuthError::NotSignedIn => {
                ApiError::Unauthorized(e.to_string())
            }
            AuthError::AlreadyRegistered => ApiError::Conflict(e.to_string()),
            AuthError::InvalidInput(msg) => ApiError::BadRequest(msg),
            AuthError::Store(e) => e.into(),
        }
    }
}

impl From<SessionError> for ApiError {
    fn from(e: SessionError) -> Self {
        match e {
            SessionError::Validation(v) => ApiError::Validation(v),
            SessionError::Load(StoreError::Timeout) | SessionError::Write(StoreError::Timeout) => {
                ApiError::Timeout(e.to_string())
            }
            SessionError::Load(_) | SessionError::Write(_) => ApiError::Backend(e.to_string()),
            SessionError::NoProperty | SessionError::NoSentence(_) => {
                ApiError::Conflict(e.to_string())
            }
            SessionError::Store(e) => e.into(),
        }
    }
}

impl From<olab_common::Error> for ApiError {
    fn from(e: olab_common::Error) -> Self {
        match e {
            olab_common::Error::InvalidInput(msg) => ApiError::BadRequest(msg),
            olab_common::Error::NotFound(what) => ApiError::NotFound(what),
            other => ApiError::Internal(other.to_string()),
        }
    }
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
            ApiError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            ApiError::Forbidden => StatusCode::FORBIDDEN,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Conflict(_) => StatusCode::CONFLICT,
            ApiError::Backend(_) => StatusCode::BAD_GATEWAY,
            ApiError::Timeout(_) => StatusCode::GATEWAY_TIMEOUT,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            error!(status = %status, "Request failed: {}", self);
        } else if status == StatusCode::UNAUTHORIZED {
            warn!("Unauthorized request: {}", self);
        }

        let body = match &self {
            ApiError::Validation(v) => json!({
                "error": v.to_string(),
                "field": v.field(),
            }),
            other => json!({ "error": other.to_string() }),
        };
        (status, Json(body)).into_response()
    }
}
