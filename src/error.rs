use axum::{
    Json,
    http::{StatusCode, header},
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use utoipa::ToSchema;

use crate::repository::RepoError;

/// ErrorBody
///
/// Structured JSON error response body. Every non-2xx response from the API
/// uses this shape, so clients can branch on `error.code` without parsing
/// human-readable text.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ErrorBody {
    pub error: ErrorDetail,
}

/// ErrorDetail
///
/// Inner error payload: a machine-readable code plus a display message.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ErrorDetail {
    /// Machine-readable error code (e.g. "DUPLICATE_IDENTITY").
    pub code: String,
    /// Human-readable error message.
    pub message: String,
}

/// ApiError
///
/// The application-level error taxonomy, mapped to HTTP responses by the
/// `IntoResponse` impl below.
///
/// The three authentication variants (`InvalidCredentials`, `TokenExpired`,
/// `TokenInvalid`) are kept distinct internally so tests and logs can tell
/// them apart, but they are indistinguishable on the wire: all three produce
/// the same 401 body and code, so a caller can never learn whether the email,
/// the password, or the token was the failing piece.
#[derive(Error, Debug)]
pub enum ApiError {
    /// Malformed input, rejected before reaching storage (422).
    #[error("validation error: {0}")]
    Validation(String),

    /// The email already has a credential; client-correctable (409).
    #[error("email already registered")]
    DuplicateIdentity,

    /// The applicant already holds an admit card for some unit (409).
    #[error("applicant already holds an admit card")]
    DuplicateAdmitCard,

    /// Email unknown or password digest mismatch (401).
    #[error("invalid authentication credentials")]
    InvalidCredentials,

    /// Session token past its expiry instant (401).
    #[error("session token expired")]
    TokenExpired,

    /// Session token failed the integrity check, or its subject no longer
    /// maps to an applicant (401).
    #[error("session token invalid")]
    TokenInvalid,

    /// The referenced exam unit does not exist (404).
    #[error("exam unit not found")]
    UnitNotFound,

    /// A requested record does not exist (404).
    #[error("{0} not found")]
    NotFound(String),

    /// The configured roll ceiling is reached; fatal to the request (503).
    #[error("exam roll number space exhausted")]
    AllocationExhausted,

    /// Storage unavailable or a transaction aborted (500). The detail is
    /// logged server-side and never returned to the client.
    #[error("persistence failure: {0}")]
    Persistence(String),
}

impl ApiError {
    /// Return the HTTP status code and machine-readable error code for this error.
    fn status_and_code(&self) -> (StatusCode, &'static str) {
        match self {
            Self::Validation(_) => (StatusCode::UNPROCESSABLE_ENTITY, "VALIDATION_ERROR"),
            Self::DuplicateIdentity => (StatusCode::CONFLICT, "DUPLICATE_IDENTITY"),
            Self::DuplicateAdmitCard => (StatusCode::CONFLICT, "DUPLICATE_ADMIT_CARD"),
            // One code for every authentication failure: which check failed
            // is never revealed to the caller.
            Self::InvalidCredentials | Self::TokenExpired | Self::TokenInvalid => {
                (StatusCode::UNAUTHORIZED, "INVALID_CREDENTIALS")
            }
            Self::UnitNotFound => (StatusCode::NOT_FOUND, "UNIT_NOT_FOUND"),
            Self::NotFound(_) => (StatusCode::NOT_FOUND, "NOT_FOUND"),
            Self::AllocationExhausted => (StatusCode::SERVICE_UNAVAILABLE, "ALLOCATION_EXHAUSTED"),
            Self::Persistence(_) => (StatusCode::INTERNAL_SERVER_ERROR, "PERSISTENCE_ERROR"),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code) = self.status_and_code();

        // Never expose storage details, and never let an auth failure hint
        // at which check rejected the request.
        let message = match &self {
            Self::Persistence(_) => "a storage error occurred".to_string(),
            Self::InvalidCredentials | Self::TokenExpired | Self::TokenInvalid => {
                "invalid authentication credentials".to_string()
            }
            other => other.to_string(),
        };

        // Log server-side errors for operator visibility.
        match &self {
            Self::Persistence(_) => tracing::error!(error = %self, "persistence failure"),
            Self::AllocationExhausted => tracing::warn!(error = %self, "roll allocation exhausted"),
            _ => {}
        }

        let body = ErrorBody {
            error: ErrorDetail {
                code: code.to_string(),
                message,
            },
        };

        let mut response = (status, Json(body)).into_response();
        if status == StatusCode::UNAUTHORIZED {
            response.headers_mut().insert(
                header::WWW_AUTHENTICATE,
                header::HeaderValue::from_static("Bearer"),
            );
        }
        response
    }
}

/// Convert repository errors to API errors.
///
/// This mapping covers the handler-level repository calls. The roll allocator
/// does its own finer-grained mapping because a `DuplicateRoll` means "retry"
/// there, not "fail".
impl From<RepoError> for ApiError {
    fn from(err: RepoError) -> Self {
        match err {
            RepoError::DuplicateEmail => Self::DuplicateIdentity,
            RepoError::CardAlreadyIssued => Self::DuplicateAdmitCard,
            RepoError::MissingUnit => Self::UnitNotFound,
            RepoError::MissingApplicant => {
                Self::Validation("applicant does not exist".to_string())
            }
            RepoError::MissingCenter => {
                Self::Validation("exam center does not exist".to_string())
            }
            // A roll conflict escaping the allocator's retry loop is a bug in
            // the calling code; surface it as a storage failure.
            RepoError::DuplicateRoll => {
                Self::Persistence("unhandled exam roll conflict".to_string())
            }
            RepoError::Db(e) => Self::Persistence(e.to_string()),
        }
    }
}
