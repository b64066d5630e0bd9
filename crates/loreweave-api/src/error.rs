use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use thiserror::Error;
use tracing::{debug, error};

use uuid::Uuid;

use loreweave_db::{Rejection, StoreError};
use loreweave_types::api::ErrorBody;

/// Everything a handler can fail with, mapped onto an HTTP status and a
/// `{error, message}` JSON body.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error(transparent)]
    Rejected(#[from] Rejection),

    #[error("invalid credentials")]
    Unauthorized,

    #[error("email address has not been verified")]
    Unverified,

    #[error("verification code is invalid or has expired")]
    InvalidCode,

    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Rejected(r) => Self::Rejected(r),
            StoreError::Internal(e) => Self::Internal(e),
        }
    }
}

impl ApiError {
    fn status_and_code(&self) -> (StatusCode, &'static str) {
        match self {
            Self::Rejected(r) => {
                let status = match r {
                    Rejection::NotFound(_) => StatusCode::NOT_FOUND,
                    Rejection::SelfVote | Rejection::Forbidden => StatusCode::FORBIDDEN,
                    Rejection::Duplicate
                    | Rejection::NotYourTurn
                    | Rejection::AlreadyExists(_) => StatusCode::CONFLICT,
                    Rejection::InvalidType
                    | Rejection::NoCharacter
                    | Rejection::InvalidInput(_) => StatusCode::BAD_REQUEST,
                };
                (status, r.code())
            }
            Self::Unauthorized => (StatusCode::UNAUTHORIZED, "UNAUTHORIZED"),
            Self::Unverified => (StatusCode::FORBIDDEN, "EMAIL_NOT_VERIFIED"),
            Self::InvalidCode => (StatusCode::BAD_REQUEST, "INVALID_CODE"),
            Self::Internal(_) => (StatusCode::INTERNAL_SERVER_ERROR, "SERVER_ERROR"),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code) = self.status_and_code();

        let message = match &self {
            Self::Internal(e) => {
                error!("request failed: {:#}", e);
                "internal server error".to_string()
            }
            other => {
                debug!(code, "request rejected: {}", other);
                other.to_string()
            }
        };

        let body = ErrorBody {
            error: code.to_string(),
            message,
        };
        (status, Json(body)).into_response()
    }
}

/// Parse an id from the request path. A value that is not a UUID names no
/// stored record, so it is reported as `what` not found.
pub fn path_id(raw: &str, what: &'static str) -> Result<Uuid, ApiError> {
    raw.parse().map_err(|_| Rejection::NotFound(what).into())
}
