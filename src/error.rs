//! # Error Handling
//!
//! Two layers of errors:
//! - `CeremonyError`: what went wrong inside a registration/authentication
//!   ceremony. This is the protocol-level taxonomy.
//! - `AppError`: what the HTTP layer returns. Converts into a JSON response
//!   with the right status code.
//!
//! ## Status Code Convention
//! - 400: every protocol/verification failure
//! - 401: "not authenticated" queries
//! - 500: backend failures (details logged, never sent to the client)

use crate::db::StoreError;
use crate::session::SessionError;
use crate::webauthn::challenge::BinderError;
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

/// Ceremony-level failures
///
/// Every variant is terminal for the attempt: nothing was committed and the
/// bound challenge is gone, so a retry starts over with `start`.
///
/// The `#[error(...)]` messages are shown to users as-is.
#[derive(Error, Debug)]
pub enum CeremonyError {
    #[error("No account found with this email. Please create an account first.")]
    UnknownIdentity,

    /// Email empty after trimming
    #[error("Please enter an email address.")]
    InvalidIdentity,

    #[error("Email already registered. Please use the login page instead.")]
    DuplicateIdentity,

    #[error("Credential already registered")]
    DuplicateCredential,

    #[error("No passkeys found for this account. Please try registering again.")]
    NoCredentials,

    #[error("Authenticator not found")]
    UnknownCredential,

    /// Challenge missing, expired, already used, or bound to someone else
    #[error("Invalid session")]
    InvalidSession,

    /// Signature/attestation rejected, malformed response, or counter replay
    #[error("Verification failed")]
    VerificationFailed,

    #[error("Store error: {0}")]
    Store(#[source] StoreError),

    #[error(transparent)]
    Session(#[from] SessionError),
}

/// Map store outcomes onto the ceremony taxonomy
///
/// A counter regression reaching this point means a concurrent login won
/// the race; it is treated like any other replay.
impl From<StoreError> for CeremonyError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::AlreadyExists => CeremonyError::DuplicateIdentity,
            StoreError::UnknownIdentity => CeremonyError::UnknownIdentity,
            StoreError::DuplicateCredential => CeremonyError::DuplicateCredential,
            StoreError::UnknownCredential => CeremonyError::UnknownCredential,
            StoreError::CounterRegression(_) => CeremonyError::VerificationFailed,
            other => CeremonyError::Store(other),
        }
    }
}

impl From<BinderError> for CeremonyError {
    fn from(e: BinderError) -> Self {
        match e {
            BinderError::Mismatch | BinderError::Expired => CeremonyError::InvalidSession,
            BinderError::Session(e) => CeremonyError::Session(e),
        }
    }
}

/// Application-wide error type
#[derive(Error, Debug)]
pub enum AppError {
    /// Registration/authentication ceremony failures
    #[error(transparent)]
    Ceremony(#[from] CeremonyError),

    /// Session transport failures outside a ceremony
    #[error(transparent)]
    Session(#[from] SessionError),

    /// Store failures outside a ceremony
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    /// Bad request errors (400)
    #[error("{0}")]
    BadRequest(String),

    /// Not logged in (401)
    #[error("{0}")]
    Unauthorized(String),
}

impl AppError {
    fn internal(detail: &dyn std::fmt::Display) -> (StatusCode, String) {
        // Log the detail, return a generic message (don't leak internals)
        tracing::error!("Internal error: {}", detail);
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            "Internal server error".to_string(),
        )
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_message) = match &self {
            AppError::Ceremony(CeremonyError::Store(e)) => Self::internal(e),
            AppError::Ceremony(CeremonyError::Session(e)) => Self::internal(e),
            AppError::Ceremony(e) => (StatusCode::BAD_REQUEST, e.to_string()),
            AppError::Session(e) => Self::internal(e),
            AppError::Store(e) => Self::internal(e),
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
            AppError::Unauthorized(msg) => (StatusCode::UNAUTHORIZED, msg.clone()),
        };

        // Format: { "error": "error message here" }
        let body = Json(json!({
            "error": error_message,
        }));

        (status, body).into_response()
    }
}

/// Convenience type alias for Results using AppError
pub type AppResult<T> = Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ceremony_failures_are_bad_requests() {
        let response = AppError::from(CeremonyError::VerificationFailed).into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let response = AppError::from(CeremonyError::InvalidSession).into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let response = AppError::from(CeremonyError::InvalidIdentity).into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn backend_failures_are_internal() {
        let response =
            AppError::from(CeremonyError::Store(StoreError::Corrupt("x".into()))).into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn unauthorized_is_401() {
        let response = AppError::Unauthorized("Not authenticated".into()).into_response();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[test]
    fn store_errors_map_to_ceremony_taxonomy() {
        assert!(matches!(
            CeremonyError::from(StoreError::DuplicateCredential),
            CeremonyError::DuplicateCredential
        ));
        assert!(matches!(
            CeremonyError::from(StoreError::CounterRegression(
                crate::webauthn::counter::CounterRegression {
                    stored: 5,
                    reported: 5
                }
            )),
            CeremonyError::VerificationFailed
        ));
        assert!(matches!(
            CeremonyError::from(BinderError::Expired),
            CeremonyError::InvalidSession
        ));
    }
}
